//! Canonical schema constants for structured logging and events
//!
//! Field names read back by the test capture layer and by log assertions.
//! `tracing` needs literal field names, so the logging macros and the
//! manager spell the same keys inline.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Persistence context
pub const FIELD_TABLE: &str = "table";
pub const FIELD_OBJECT_ID: &str = "object_id";
pub const FIELD_SCHEMA_VERSION: &str = "schema_version";

// Collection sizes
pub const FIELD_ROW_COUNT: &str = "row_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

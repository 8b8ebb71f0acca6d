#![allow(clippy::unwrap_used, clippy::expect_used)]

use dtstore_core::errors::{DtsError, ExError, ExErrorKind};
use dtstore_core::logging_facility::test_capture::init_test_capture;
use dtstore_core::{log_op_end, log_op_error, log_op_start};
use dtstore_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_COMPONENT, FIELD_DURATION_MS, FIELD_ERR_CODE,
    FIELD_ERR_KIND, FIELD_ROW_COUNT, FIELD_TABLE,
};

#[test]
fn test_start_and_end_events_carry_fields() {
    let capture = init_test_capture();
    let op_name = "logging_start_end_unique_1";

    log_op_start!(op_name, table = "widgets");
    log_op_end!(op_name, duration_ms = 42, row_count = 3u64);

    let events = capture.events_for(op_name);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event.as_deref(), Some(EVENT_START));
    assert!(events[0].field(FIELD_COMPONENT).is_some());
    assert_eq!(events[0].field(FIELD_TABLE), Some("widgets"));
    assert_eq!(events[1].event.as_deref(), Some(EVENT_END));
    assert_eq!(events[1].field(FIELD_DURATION_MS), Some("42"));
    assert_eq!(events[1].field(FIELD_ROW_COUNT), Some("3"));
}

#[test]
fn test_error_event_includes_kind_and_code() {
    let capture = init_test_capture();
    let op_name = "logging_error_unique_2";

    let err = DtsError::NotPersisted {
        entity: "Widget".to_string(),
    };
    log_op_error!(op_name, err, duration_ms = 5);

    capture.assert_event_exists(op_name, EVENT_END_ERROR);
    let event = capture
        .events_for(op_name)
        .into_iter()
        .find(|e| e.event.as_deref() == Some(EVENT_END_ERROR))
        .expect("Should have error event");
    assert_eq!(event.field(FIELD_ERR_CODE), Some("ERR_NOT_PERSISTED"));
    assert_eq!(event.field(FIELD_ERR_KIND), Some("NotPersisted"));
    assert_eq!(event.level, tracing::Level::ERROR);
}

#[test]
fn test_error_macro_accepts_ex_error() {
    let capture = init_test_capture();
    let op_name = "logging_ex_error_unique_3";

    let err = ExError::new(ExErrorKind::Migration).with_message("step 2 failed");
    log_op_error!(op_name, err.clone(), duration_ms = 1, table = "widgets");

    let events = capture.events_for(op_name);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field(FIELD_ERR_CODE), Some("ERR_MIGRATION"));
    assert_eq!(events[0].field(FIELD_TABLE), Some("widgets"));
}

#[test]
fn test_capture_counts_by_predicate() {
    let capture = init_test_capture();
    let op1_name = "logging_count_op1_unique_4";
    let op2_name = "logging_count_op2_unique_4";

    log_op_start!(op1_name);
    log_op_start!(op2_name);
    log_op_end!(op1_name, duration_ms = 10);

    let start_count = capture.count_events(|e| {
        e.event.as_deref() == Some(EVENT_START)
            && (e.op.as_deref() == Some(op1_name) || e.op.as_deref() == Some(op2_name))
    });
    let end_count = capture.count_events(|e| {
        e.event.as_deref() == Some(EVENT_END) && e.op.as_deref() == Some(op1_name)
    });

    assert_eq!(start_count, 2);
    assert_eq!(end_count, 1);
}

#[test]
#[should_panic(expected = "Expected event")]
fn test_assert_event_exists_fails_for_missing_event() {
    let capture = init_test_capture();
    capture.assert_event_exists("logging_nonexistent_op_unique_999", EVENT_START);
}

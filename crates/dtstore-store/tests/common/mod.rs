#![allow(dead_code)]

use dtstore_core::{
    Codec, Executor, ObjectIdSlot, Persistable, PropertyMapBuilder, Result, SchemaVersion,
};
use dtstore_store::{SqliteConnector, SqliteManager};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Widget {
    pub id: ObjectIdSlot,
    pub name: String,
    pub weight: f64,
    pub count: i64,
    pub active: bool,
    pub nickname: Option<String>,
    pub payload: Vec<u8>,
}

impl Persistable for Widget {
    fn table_name() -> &'static str {
        "widgets"
    }

    fn describe(props: &mut PropertyMapBuilder<Self>) {
        props
            .property("name", "text", |w| &w.name, |w| &mut w.name)
            .property("weight", "real", |w| &w.weight, |w| &mut w.weight)
            .property("count", "integer", |w| &w.count, |w| &mut w.count)
            .property("active", "boolean", |w| &w.active, |w| &mut w.active)
            .property("nickname", "text", |w| &w.nickname, |w| &mut w.nickname)
            .property("payload", "blob", |w| &w.payload, |w| &mut w.payload);
    }

    fn object_id_slot(&self) -> &ObjectIdSlot {
        &self.id
    }

    fn object_id_slot_mut(&mut self) -> &mut ObjectIdSlot {
        &mut self.id
    }
}

pub fn widget(name: &str, count: i64) -> Widget {
    Widget {
        name: name.to_string(),
        weight: count as f64 * 0.5,
        count,
        active: count % 2 == 0,
        ..Widget::default()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// Entity with one custom-typed and one JSON-coded property
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Marker {
    pub id: ObjectIdSlot,
    pub label: String,
    pub at: Point,
    pub tags: Vec<String>,
}

impl Persistable for Marker {
    fn table_name() -> &'static str {
        "markers"
    }

    fn describe(props: &mut PropertyMapBuilder<Self>) {
        props
            .property("label", "text", |m| &m.label, |m| &mut m.label)
            .property("at", "Point", |m| &m.at, |m| &mut m.at)
            .property("tags", "Tags", |m| &m.tags, |m| &mut m.tags);
    }

    fn object_id_slot(&self) -> &ObjectIdSlot {
        &self.id
    }

    fn object_id_slot_mut(&mut self) -> &mut ObjectIdSlot {
        &mut self.id
    }
}

/// Stores a point as two integer columns `<key>_x` and `<key>_y`
pub fn point_codec() -> Codec {
    Codec::for_type::<Point, _, _>(
        |key, p, params| {
            params.insert(format!("{key}_x"), p.x);
            params.insert(format!("{key}_y"), p.y);
            Ok(())
        },
        |key, row| {
            Ok(Point {
                x: row.value(&format!("{key}_x"))?.as_i64().unwrap_or_default(),
                y: row.value(&format!("{key}_y"))?.as_i64().unwrap_or_default(),
            })
        },
    )
}

pub const WIDGETS_DDL: &str = "CREATE TABLE IF NOT EXISTS widgets (
    objectId INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    weight REAL,
    count INTEGER,
    active INTEGER,
    nickname TEXT,
    payload BLOB
)";

pub const MARKERS_DDL: &str = "CREATE TABLE IF NOT EXISTS markers (
    objectId INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT,
    at_x INTEGER,
    at_y INTEGER,
    tags TEXT
)";

/// Migration to version 1: widgets and markers tables
pub fn migrate_v1(exec: &mut dyn Executor, current: SchemaVersion) -> Result<SchemaVersion> {
    if current < SchemaVersion::new(1) {
        exec.execute_batch(WIDGETS_DDL)?;
        exec.execute_batch(MARKERS_DDL)?;
    }
    Ok(SchemaVersion::new(1).max(current))
}

/// Scratch directory plus a store path inside it
pub struct Scratch {
    pub dir: TempDir,
    pub path: PathBuf,
}

pub fn scratch() -> Scratch {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    Scratch { dir, path }
}

/// Manager with `Widget` registered, not yet open
pub fn widget_manager() -> SqliteManager {
    let mut manager = SqliteManager::new(SqliteConnector::default());
    manager.register_managed_class::<Widget>().unwrap();
    manager
}

/// Manager with `Widget` registered and a fresh store open at version 1
pub fn open_widget_store() -> (SqliteManager, Scratch) {
    let scratch = scratch();
    let mut manager = widget_manager();
    manager.open(&scratch.path, migrate_v1).unwrap();
    (manager, scratch)
}

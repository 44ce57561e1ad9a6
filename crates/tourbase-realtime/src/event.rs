//! Row-change events decoded from the CDC feed
//!
//! One event per row-level insert/update/delete, keyed by table name.
//! Consumers receive the full event and decide for themselves whether it
//! warrants a refetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decoded row image, as delivered on the wire
pub type RecordSnapshot = serde_json::Value;

/// Type of database change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A database change event
///
/// `record` is the post-change row; for [`ChangeOp::Delete`] it holds the
/// last known values instead. `previous` is the pre-change row and is only
/// present for updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique event ID
    pub id: Uuid,
    /// Table name
    pub table: String,
    /// Type of change
    pub op: ChangeOp,
    /// Primary-key value of the affected row
    pub record_id: String,
    /// Row image after the change (last known values for Delete)
    pub record: RecordSnapshot,
    /// Row image before the change (Update only)
    pub previous: Option<RecordSnapshot>,
    /// Timestamp of the change
    pub commit_timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an INSERT event
    pub fn insert(table: &str, record: RecordSnapshot) -> Self {
        let record_id = primary_key_of(&record);
        Self {
            id: Uuid::new_v4(),
            table: table.to_string(),
            op: ChangeOp::Insert,
            record_id,
            record,
            previous: None,
            commit_timestamp: Utc::now(),
        }
    }

    /// Create an UPDATE event
    pub fn update(table: &str, previous: RecordSnapshot, record: RecordSnapshot) -> Self {
        let record_id = primary_key_of(&record);
        Self {
            id: Uuid::new_v4(),
            table: table.to_string(),
            op: ChangeOp::Update,
            record_id,
            record,
            previous: Some(previous),
            commit_timestamp: Utc::now(),
        }
    }

    /// Create a DELETE event
    pub fn delete(table: &str, record: RecordSnapshot) -> Self {
        let record_id = primary_key_of(&record);
        Self {
            id: Uuid::new_v4(),
            table: table.to_string(),
            op: ChangeOp::Delete,
            record_id,
            record,
            previous: None,
            commit_timestamp: Utc::now(),
        }
    }

    /// Field value from the post-change row
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.record.get(name)
    }

    /// Field value from the pre-change row
    pub fn previous_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.previous.as_ref().and_then(|p| p.get(name))
    }

    /// Whether `name` differs between the pre- and post-change rows.
    ///
    /// Inserts and deletes have no pre-change row to compare against and
    /// always count as changed.
    pub fn field_changed(&self, name: &str) -> bool {
        match &self.previous {
            Some(previous) => previous.get(name) != self.record.get(name),
            None => true,
        }
    }
}

/// Primary-key value of a row image, stringified
fn primary_key_of(record: &RecordSnapshot) -> String {
    match record.get("id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

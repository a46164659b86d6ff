//! # Remote Wire Protocol
//!
//! Typed mapping between the remote JSON todo shape and [`Task`].
//!
//! ## Translation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   JSON value ──► TodoPayload ──► RemoteTask ──► Task                   │
//! │                  (wire DTO,      (validated:    (missing fields from   │
//! │                   all optional)   id + title)    the local copy)       │
//! │                                                                         │
//! │   id            number | string        → String                        │
//! │   title         string                 → trimmed, 1..=100 chars        │
//! │   completed     bool | absent          → false when absent             │
//! │   createdAt     ISO-8601 | absent      → local copy, else now          │
//! │   updatedAt     ISO-8601 | absent      → never before the local copy   │
//! │   dueDate       ISO-8601 | null | absent → set | cleared | kept        │
//! │   reminderDate  ISO-8601 | null | absent → set | cleared | kept        │
//! │   reminderEnabled bool | absent        → kept when absent              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records that fail validation inside a listing are skipped with a warning;
//! a single-record response that fails is an [`RemoteError::InvalidPayload`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use tasksync_core::validation::validate_title;
use tasksync_core::Task;

use crate::error::RemoteError;

// =============================================================================
// Remote Id
// =============================================================================

/// A remote id as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(u64),
    Text(String),
}

impl RemoteId {
    /// Numeric ids are sent as JSON numbers, anything else as a string.
    pub fn parse(value: &str) -> Self {
        match value.parse::<u64>() {
            Ok(n) => RemoteId::Number(n),
            Err(_) => RemoteId::Text(value.to_string()),
        }
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{}", n),
            RemoteId::Text(s) => write!(f, "{}", s),
        }
    }
}

// =============================================================================
// Wire DTOs
// =============================================================================

/// A todo exactly as the remote sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPayload {
    #[serde(default)]
    pub id: Option<RemoteId>,

    #[serde(default)]
    pub user_id: Option<RemoteId>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub completed: Option<bool>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "deserialize_present")]
    pub due_date: Option<Option<DateTime<Utc>>>,

    #[serde(default, deserialize_with = "deserialize_present")]
    pub reminder_date: Option<Option<DateTime<Utc>>>,

    #[serde(default)]
    pub reminder_enabled: Option<bool>,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body of `POST /todos`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    pub title: String,
    pub completed: bool,
    pub user_id: RemoteId,
}

impl CreateTodoRequest {
    pub fn new(title: &str, user_id: &str) -> Self {
        CreateTodoRequest {
            title: title.to_string(),
            completed: false,
            user_id: RemoteId::parse(user_id),
        }
    }
}

// =============================================================================
// Remote Task
// =============================================================================

/// A remote record that passed boundary validation.
///
/// Optional fields are `None` when the remote did not send them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub reminder_date: Option<Option<DateTime<Utc>>>,
    pub reminder_enabled: Option<bool>,
}

impl RemoteTask {
    /// A minimal record with only the required fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>, completed: bool) -> Self {
        RemoteTask {
            id: id.into(),
            title: title.into(),
            completed,
            created_at: None,
            updated_at: None,
            due_date: None,
            reminder_date: None,
            reminder_enabled: None,
        }
    }

    /// Translates into a [`Task`] field by field.
    ///
    /// Fields the remote omitted are taken from `existing`, the local copy
    /// under the same id. `updated_at` never moves behind the local copy.
    pub fn into_task(self, existing: Option<&Task>, now: DateTime<Utc>) -> Task {
        let created_at = self
            .created_at
            .or_else(|| existing.map(|t| t.created_at))
            .unwrap_or(now);

        let updated_at = match (self.updated_at, existing) {
            (Some(remote), Some(local)) => remote.max(local.updated_at),
            (Some(remote), None) => remote,
            (None, Some(local)) => local.updated_at,
            (None, None) => now,
        };

        let due_date = match self.due_date {
            Some(value) => value,
            None => existing.and_then(|t| t.due_date),
        };
        let reminder_date = match self.reminder_date {
            Some(value) => value,
            None => existing.and_then(|t| t.reminder_date),
        };
        let reminder_enabled = self
            .reminder_enabled
            .or_else(|| existing.map(|t| t.reminder_enabled))
            .unwrap_or(false);

        Task {
            id: self.id,
            title: self.title,
            completed: self.completed,
            created_at,
            updated_at,
            due_date,
            reminder_date,
            reminder_enabled,
        }
    }
}

impl TryFrom<TodoPayload> for RemoteTask {
    type Error = RemoteError;

    fn try_from(payload: TodoPayload) -> Result<Self, Self::Error> {
        let id = match payload.id {
            Some(id) => id.to_string(),
            None => return Err(RemoteError::InvalidPayload("missing id".into())),
        };
        if id.trim().is_empty() {
            return Err(RemoteError::InvalidPayload("empty id".into()));
        }

        let raw_title = payload.title.unwrap_or_default();
        let title = validate_title(&raw_title)
            .map_err(|e| RemoteError::InvalidPayload(format!("task {}: {}", id, e)))?;

        Ok(RemoteTask {
            id,
            title,
            completed: payload.completed.unwrap_or(false),
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            due_date: payload.due_date,
            reminder_date: payload.reminder_date,
            reminder_enabled: payload.reminder_enabled,
        })
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decodes a listing, skipping records that fail validation.
pub fn decode_list(body: Value) -> Result<Vec<RemoteTask>, RemoteError> {
    let items = match body {
        Value::Array(items) => items,
        other => {
            return Err(RemoteError::InvalidPayload(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut tasks = Vec::with_capacity(items.len());
    for item in items {
        match decode_value(item) {
            Ok(task) => tasks.push(task),
            Err(e) => warn!(error = %e, "Skipping unmappable remote record"),
        }
    }
    Ok(tasks)
}

/// Decodes a single-record response.
///
/// Some servers omit the id in update responses; `fallback_id` fills it in.
pub fn decode_one(body: Value, fallback_id: Option<&str>) -> Result<RemoteTask, RemoteError> {
    let mut payload: TodoPayload = serde_json::from_value(body)
        .map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;

    if payload.id.is_none() {
        payload.id = fallback_id.map(RemoteId::parse);
    }
    RemoteTask::try_from(payload)
}

fn decode_value(value: Value) -> Result<RemoteTask, RemoteError> {
    let payload: TodoPayload =
        serde_json::from_value(value).map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;
    RemoteTask::try_from(payload)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_listing_skips_invalid_records() {
        let body = json!([
            { "userId": 1, "id": 1, "title": "delectus aut autem", "completed": false },
            { "userId": 1, "id": "abc", "title": "string id", "completed": true },
            { "userId": 1, "title": "no id" },
            { "userId": 1, "id": 4, "title": "   " },
            { "userId": 1, "id": 5, "title": "x".repeat(101) },
            "not an object"
        ]);

        let tasks = decode_list(body).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "1");
        assert_eq!(tasks[1].id, "abc");
        assert!(tasks[1].completed);
    }

    #[test]
    fn test_listing_must_be_an_array() {
        let err = decode_list(json!({ "id": 1 })).unwrap_err();
        assert!(matches!(err, RemoteError::InvalidPayload(_)));
    }

    #[test]
    fn test_decode_one_uses_fallback_id() {
        let task = decode_one(json!({ "title": "Updated" }), Some("7")).unwrap();
        assert_eq!(task.id, "7");
        assert_eq!(task.title, "Updated");

        assert!(decode_one(json!({ "title": "Updated" }), None).is_err());
    }

    #[test]
    fn test_into_task_fills_from_local_copy() {
        let created = Utc::now() - Duration::days(1);
        let mut local = Task::new_local("Dentist", created).unwrap().with_id("3");
        local.due_date = Some(created + Duration::days(2));
        local.reminder_enabled = true;
        local.updated_at = created + Duration::hours(1);

        let remote = decode_one(
            json!({ "id": 3, "title": "Dentist at 9", "completed": true }),
            None,
        )
        .unwrap();
        let now = Utc::now();
        let task = remote.into_task(Some(&local), now);

        assert_eq!(task.id, "3");
        assert_eq!(task.title, "Dentist at 9");
        assert!(task.completed);
        assert_eq!(task.created_at, created);
        assert_eq!(task.updated_at, local.updated_at);
        assert_eq!(task.due_date, local.due_date);
        assert!(task.reminder_enabled);
    }

    #[test]
    fn test_into_task_explicit_null_clears_date() {
        let now = Utc::now();
        let mut local = Task::new_local("Dentist", now).unwrap().with_id("3");
        local.due_date = Some(now);

        let remote = decode_one(json!({ "id": 3, "title": "Dentist", "dueDate": null }), None)
            .unwrap();
        assert_eq!(remote.due_date, Some(None));
        assert_eq!(remote.into_task(Some(&local), now).due_date, None);
    }

    #[test]
    fn test_new_record_stamped_now() {
        let now = Utc::now();
        let task = RemoteTask::new("1", "Fresh", true).into_task(None, now);
        assert_eq!(task.created_at, now);
        assert_eq!(task.updated_at, now);
        assert!(!task.reminder_enabled);
    }

    #[test]
    fn test_updated_at_never_behind_local() {
        let now = Utc::now();
        let mut local = Task::new_local("Skewed", now).unwrap().with_id("9");
        local.updated_at = now + Duration::minutes(5);

        let mut remote = RemoteTask::new("9", "Skewed", false);
        remote.updated_at = Some(now);
        assert_eq!(remote.into_task(Some(&local), now).updated_at, local.updated_at);
    }

    #[test]
    fn test_create_request_wire_format() {
        let body = serde_json::to_value(CreateTodoRequest::new("Buy milk", "1")).unwrap();
        assert_eq!(body, json!({ "title": "Buy milk", "completed": false, "userId": 1 }));

        let body = serde_json::to_value(CreateTodoRequest::new("Buy milk", "u-7")).unwrap();
        assert_eq!(body["userId"], "u-7");
    }
}

//! # Reconciliation
//!
//! Deterministic merge of an authoritative remote listing with the local
//! task list.
//!
//! ## Merge Rule: local wins until confirmed, then remote wins
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each remote task (first occurrence of an id only):                │
//! │     pending delete for id?      → drop                                 │
//! │     pending update for id?      → keep LOCAL copy (if any)             │
//! │     otherwise                   → take REMOTE payload                  │
//! │                                                                         │
//! │  for each local task not already placed:                               │
//! │     temporary id (local_…)?     → keep (remote never saw it)           │
//! │     pending update for id?      → keep                                 │
//! │     otherwise                   → drop (deleted remotely)              │
//! │                                                                         │
//! │  order: kept local-only tasks first (their local order),               │
//! │         then remote order                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};

use crate::change::{ChangeKind, PendingChange};
use crate::types::Task;

/// Ids that still have unconfirmed local intent, built from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingMarkers {
    pub updated: HashSet<String>,
    pub deleted: HashSet<String>,
}

impl PendingMarkers {
    pub fn from_changes(changes: &[PendingChange]) -> Self {
        let mut markers = PendingMarkers::default();

        for change in changes {
            let id = change.entity_id().to_string();
            match change.kind() {
                // Adds always carry a temporary id, covered by the id rule
                ChangeKind::Add => {}
                ChangeKind::Update => {
                    markers.updated.insert(id);
                }
                ChangeKind::Delete => {
                    markers.deleted.insert(id);
                }
            }
        }

        markers
    }

    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Merges a remote listing into the local list.
///
/// The result never holds the same id twice.
pub fn merge_remote(local: &[Task], remote: Vec<Task>, pending: &PendingMarkers) -> Vec<Task> {
    let local_by_id: HashMap<&str, &Task> = local.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut from_remote = Vec::with_capacity(remote.len());

    for task in remote {
        if placed.contains(&task.id) || pending.deleted.contains(&task.id) {
            continue;
        }

        let chosen = match local_by_id.get(task.id.as_str()) {
            Some(local_task) if pending.updated.contains(&task.id) => (*local_task).clone(),
            _ => task,
        };

        placed.insert(chosen.id.clone());
        from_remote.push(chosen);
    }

    let mut merged: Vec<Task> = Vec::with_capacity(local.len() + from_remote.len());
    for task in local {
        if placed.contains(&task.id) {
            continue;
        }
        if task.is_local() || pending.updated.contains(&task.id) {
            placed.insert(task.id.clone());
            merged.push(task.clone());
        }
    }

    merged.extend(from_remote);
    merged
}

/// Removes duplicate ids, keeping the copy with the latest `updated_at`.
///
/// Order of first appearance is preserved.
pub fn dedupe_by_id(tasks: Vec<Task>) -> Vec<Task> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Task> = Vec::with_capacity(tasks.len());

    for task in tasks {
        match index.get(&task.id) {
            Some(&pos) => {
                if task.updated_at > unique[pos].updated_at {
                    unique[pos] = task;
                }
            }
            None => {
                index.insert(task.id.clone(), unique.len());
                unique.push(task);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn server_task(id: &str, title: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: title.to_string(),
            completed: false,
            created_at: now,
            updated_at: now,
            due_date: None,
            reminder_date: None,
            reminder_enabled: false,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_remote_wins_for_confirmed_ids() {
        let local = vec![server_task("1", "old title")];
        let remote = vec![server_task("1", "new title")];

        let merged = merge_remote(&local, remote, &PendingMarkers::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "new title");
    }

    #[test]
    fn test_unconfirmed_local_tasks_are_preserved_at_head() {
        let pending = Task::new_local("Buy milk", Utc::now()).unwrap();
        let local = vec![pending.clone(), server_task("1", "a")];
        let remote = vec![server_task("1", "a"), server_task("2", "b")];

        let merged = merge_remote(&local, remote, &PendingMarkers::default());
        assert_eq!(ids(&merged), vec![pending.id.as_str(), "1", "2"]);
    }

    #[test]
    fn test_server_ids_missing_remotely_are_dropped() {
        let local = vec![server_task("1", "a"), server_task("3", "gone")];
        let remote = vec![server_task("1", "a")];

        let merged = merge_remote(&local, remote, &PendingMarkers::default());
        assert_eq!(ids(&merged), vec!["1"]);
    }

    #[test]
    fn test_pending_markers_protect_local_intent() {
        let mut edited = server_task("1", "edited offline");
        edited.updated_at = edited.updated_at + Duration::seconds(30);
        let local = vec![edited.clone(), server_task("2", "deleted offline")];
        let remote = vec![
            server_task("1", "stale"),
            server_task("2", "deleted offline"),
            server_task("3", "new remotely"),
        ];

        let now = Utc::now();
        let changes = vec![
            PendingChange::update(edited.clone(), now),
            PendingChange::delete("2", now),
        ];
        let markers = PendingMarkers::from_changes(&changes);

        let merged = merge_remote(&local, remote, &markers);
        assert_eq!(ids(&merged), vec!["1", "3"]);
        assert_eq!(merged[0].title, "edited offline");
    }

    #[test]
    fn test_merge_never_duplicates_ids() {
        let local = vec![server_task("1", "a"), server_task("2", "b")];
        let remote = vec![
            server_task("2", "b"),
            server_task("2", "b again"),
            server_task("1", "a"),
        ];

        let merged = merge_remote(&local, remote, &PendingMarkers::default());
        let unique: HashSet<&str> = ids(&merged).into_iter().collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(ids(&merged), vec!["2", "1"]);
    }

    #[test]
    fn test_dedupe_keeps_latest_copy() {
        let older = server_task("1", "older");
        let mut newer = server_task("1", "newer");
        newer.updated_at = older.updated_at + Duration::seconds(1);

        let unique = dedupe_by_id(vec![older, server_task("2", "b"), newer]);
        assert_eq!(ids(&unique), vec!["1", "2"]);
        assert_eq!(unique[0].title, "newer");
    }
}

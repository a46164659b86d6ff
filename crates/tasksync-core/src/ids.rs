//! # Task Identifiers
//!
//! Two id spaces coexist:
//!
//! ```text
//! local_1760451234567_3f9a0c1e   ← minted on this device, not yet confirmed
//! 201                            ← assigned by the remote service
//! ```
//!
//! A temporary id is replaced by the server id once the remote confirms the
//! `add`. Anything carrying [`LOCAL_ID_PREFIX`] has never been seen by the
//! remote.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Prefix marking a locally-minted, unconfirmed task id.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Mints a temporary id from the creation time and 8 random hex digits.
pub fn mint_local_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", LOCAL_ID_PREFIX, now.timestamp_millis(), &random[..8])
}

/// Returns true if the id was minted locally and never confirmed.
#[inline]
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_ids_are_local_and_unique() {
        let now = Utc::now();
        let a = mint_local_id(now);
        let b = mint_local_id(now);

        assert!(is_local_id(&a));
        assert!(a.contains(&now.timestamp_millis().to_string()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_server_ids_are_not_local() {
        assert!(!is_local_id("201"));
        assert!(!is_local_id("task_1"));
    }
}

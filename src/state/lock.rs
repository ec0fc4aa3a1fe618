//! State locking.
//!
//! A lock file next to the state keeps two `apply` runs from interleaving
//! writes against the same stack. Locks expire so a crashed run does not
//! wedge the stack forever.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300;

/// Contents of the lock file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    /// Unique lock identifier, needed to release the lock.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock stops counting.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a fresh lock for `holder`, acquired now.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        Self::acquired(holder, Utc::now())
    }

    fn acquired(holder: &str, at: DateTime<Utc>) -> Self {
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: at,
            expires_at: at + Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Whether the lock no longer counts.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Seconds left before expiry, zero once expired.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (lock {}, {}s left)",
            self.holder,
            self.lock_id,
            self.remaining_secs()
        )
    }
}

/// Holder identifier for this process: `host:pid:suffix`.
#[must_use]
pub fn generate_holder_id() -> String {
    let host = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().into_owned());
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

    format!("{host}:{}:{suffix}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lock_is_live() {
        let lock = LockInfo::new("ci-runner");
        assert_eq!(lock.holder, "ci-runner");
        assert!(!lock.is_expired());
        assert!(lock.remaining_secs() > LOCK_EXPIRY_SECS - 5);
        assert!(lock.to_string().starts_with("ci-runner (lock "));
    }

    #[test]
    fn test_expiry_boundary() {
        let at = Utc::now();
        let lock = LockInfo::acquired("ci-runner", at);
        let expiry = at + Duration::seconds(LOCK_EXPIRY_SECS);

        assert!(!lock.is_expired_at(expiry));
        assert!(lock.is_expired_at(expiry + Duration::seconds(1)));
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        assert_ne!(id1, id2);
        assert!(id1.contains(&format!(":{}:", std::process::id())));
    }
}

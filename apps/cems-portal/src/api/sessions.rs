//! # Session Registry
//!
//! In-memory wizard sessions with idle expiry and a size cap.
//!
//! Every lookup takes the current time so expiry is decided by the caller's
//! clock. An entry idle for `ttl` or longer is gone; inserting into a full
//! registry drops the least recently touched entry first.

use cems_core::WizardState;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Idle time after which a session is discarded (one hour).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Maximum number of live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// One browser's wizard.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub state: WizardState,
    /// Wrong OTP submissions so far. Only logged; attempts are unlimited.
    pub failed_otp_attempts: u32,
    /// Last request that used this session.
    pub touched: Instant,
}

impl SessionEntry {
    /// A fresh wizard on the login page.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            state: WizardState::new(),
            failed_otp_attempts: 0,
            touched: now,
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.touched) >= ttl
    }
}

/// Live sessions by id.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    entries: BTreeMap<String, SessionEntry>,
    ttl: Duration,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionRegistry {
    /// Empty registry. A cap of 0 is treated as 1.
    #[must_use]
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Number of stored sessions, expired ones not yet swept included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a new session, sweeping expired entries and making room first.
    pub fn insert(&mut self, id: String, entry: SessionEntry, now: Instant) {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| !e.is_expired(now, ttl));
        let expired = before.saturating_sub(self.entries.len());
        if expired > 0 {
            tracing::info!(expired, "Expired sessions discarded");
        }

        while self.entries.len() >= self.max_sessions {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
            tracing::warn!(session = %oldest, "Session limit reached, oldest session discarded");
        }

        self.entries.insert(id, entry);
    }

    /// The live session `id`, marked as used at `now`.
    ///
    /// An expired entry is removed and reported as missing.
    pub fn touch(&mut self, id: &str, now: Instant) -> Option<&mut SessionEntry> {
        if self
            .entries
            .get(id)
            .is_some_and(|e| e.is_expired(now, self.ttl))
        {
            self.entries.remove(id);
            tracing::info!(session = %id, "Session expired");
            return None;
        }

        let entry = self.entries.get_mut(id)?;
        entry.touched = now;
        Some(entry)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn later(now: Instant, secs: u64) -> Instant {
        now.checked_add(Duration::from_secs(secs)).unwrap()
    }

    #[test]
    fn touch_refreshes_idle_time() {
        let t0 = Instant::now();
        let mut sessions = SessionRegistry::new(Duration::from_secs(10), 8);
        sessions.insert("a".to_string(), SessionEntry::new(t0), t0);

        assert!(sessions.touch("a", later(t0, 9)).is_some());
        // Idle time counts from the last touch.
        assert!(sessions.touch("a", later(t0, 18)).is_some());
        assert!(sessions.touch("a", later(t0, 28)).is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn insert_sweeps_expired_sessions() {
        let t0 = Instant::now();
        let mut sessions = SessionRegistry::new(Duration::from_secs(10), 8);
        sessions.insert("a".to_string(), SessionEntry::new(t0), t0);
        sessions.insert("b".to_string(), SessionEntry::new(later(t0, 5)), later(t0, 5));

        let t = later(t0, 12);
        sessions.insert("c".to_string(), SessionEntry::new(t), t);

        assert_eq!(sessions.len(), 2);
        assert!(sessions.touch("a", t).is_none());
        assert!(sessions.touch("b", t).is_some());
    }

    #[test]
    fn full_registry_drops_least_recently_touched() {
        let t0 = Instant::now();
        let mut sessions = SessionRegistry::new(Duration::from_secs(3600), 2);
        sessions.insert("a".to_string(), SessionEntry::new(t0), t0);
        sessions.insert("b".to_string(), SessionEntry::new(later(t0, 1)), later(t0, 1));
        assert!(sessions.touch("a", later(t0, 2)).is_some());

        let t = later(t0, 3);
        sessions.insert("c".to_string(), SessionEntry::new(t), t);

        assert_eq!(sessions.len(), 2);
        assert!(sessions.touch("b", t).is_none());
        assert!(sessions.touch("a", t).is_some());
        assert!(sessions.touch("c", t).is_some());
    }

    #[test]
    fn zero_cap_still_holds_one_session() {
        let t0 = Instant::now();
        let mut sessions = SessionRegistry::new(Duration::from_secs(60), 0);
        sessions.insert("a".to_string(), SessionEntry::new(t0), t0);
        sessions.insert("b".to_string(), SessionEntry::new(t0), t0);
        assert_eq!(sessions.len(), 1);
        assert!(sessions.touch("b", t0).is_some());
    }
}

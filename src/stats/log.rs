//! Session statistics.
//!
//! Tracks what the agent did with the sensor and the permission platform,
//! so a user can audit when and how often step data was read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current process, optionally persisted across runs.
#[derive(Debug)]
pub struct SessionStats {
    /// Tracking sessions successfully started
    sessions_started: AtomicU64,
    /// Listener registrations tried, including refused rates
    registration_attempts: AtomicU64,
    /// Sensor events applied to the counters
    events_accepted: AtomicU64,
    /// Sensor events that arrived while idle or for a stale session
    events_discarded: AtomicU64,
    /// Step updates the script layer was not attached to receive
    updates_dropped: AtomicU64,
    permission_requests: AtomicU64,
    permission_grants: AtomicU64,
    permission_denials: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            registration_attempts: AtomicU64::new(0),
            events_accepted: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            updates_dropped: AtomicU64::new(0),
            permission_requests: AtomicU64::new(0),
            permission_grants: AtomicU64::new(0),
            permission_denials: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create statistics that continue from the totals saved at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous session stats: {}", e);
        }

        stats
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registration_attempt(&self) {
        self.registration_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_accepted(&self) {
        self.events_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_discarded(&self) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_dropped(&self) {
        self.updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_permission_request(&self) {
        self.permission_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_permission_decision(&self, granted: bool) {
        if granted {
            self.permission_grants.fetch_add(1, Ordering::Relaxed);
        } else {
            self.permission_denials.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            registration_attempts: self.registration_attempts.load(Ordering::Relaxed),
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            permission_requests: self.permission_requests.load(Ordering::Relaxed),
            permission_grants: self.permission_grants.load(Ordering::Relaxed),
            permission_denials: self.permission_denials.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Tracking sessions started: {}\n\
             - Sensor registrations attempted: {}\n\
             - Step events accepted: {}\n\
             - Step events discarded: {}\n\
             - Step updates dropped: {}\n\
             - Permission requests: {} ({} granted, {} denied)\n\
             - Uptime: {} seconds",
            stats.sessions_started,
            stats.registration_attempts,
            stats.events_accepted,
            stats.events_discarded,
            stats.updates_dropped,
            stats.permission_requests,
            stats.permission_grants,
            stats.permission_denials,
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                sessions_started: stats.sessions_started,
                registration_attempts: stats.registration_attempts,
                events_accepted: stats.events_accepted,
                events_discarded: stats.events_discarded,
                updates_dropped: stats.updates_dropped,
                permission_requests: stats.permission_requests,
                permission_grants: stats.permission_grants,
                permission_denials: stats.permission_denials,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.registration_attempts
                    .store(persisted.registration_attempts, Ordering::Relaxed);
                self.events_accepted
                    .store(persisted.events_accepted, Ordering::Relaxed);
                self.events_discarded
                    .store(persisted.events_discarded, Ordering::Relaxed);
                self.updates_dropped
                    .store(persisted.updates_dropped, Ordering::Relaxed);
                self.permission_requests
                    .store(persisted.permission_requests, Ordering::Relaxed);
                self.permission_grants
                    .store(persisted.permission_grants, Ordering::Relaxed);
                self.permission_denials
                    .store(persisted.permission_denials, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.sessions_started,
            &self.registration_attempts,
            &self.events_accepted,
            &self.events_discarded,
            &self.updates_dropped,
            &self.permission_requests,
            &self.permission_grants,
            &self.permission_denials,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub sessions_started: u64,
    pub registration_attempts: u64,
    pub events_accepted: u64,
    pub events_discarded: u64,
    pub updates_dropped: u64,
    pub permission_requests: u64,
    pub permission_grants: u64,
    pub permission_denials: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sessions_started: u64,
    registration_attempts: u64,
    events_accepted: u64,
    events_discarded: u64,
    updates_dropped: u64,
    permission_requests: u64,
    permission_grants: u64,
    permission_denials: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = SessionStats::new();

        stats.record_event_accepted();
        stats.record_event_accepted();
        stats.record_event_discarded();
        stats.record_permission_decision(true);
        stats.record_permission_decision(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_accepted, 2);
        assert_eq!(snapshot.events_discarded, 1);
        assert_eq!(snapshot.permission_grants, 1);
        assert_eq!(snapshot.permission_denials, 1);
    }

    #[test]
    fn test_reset() {
        let stats = SessionStats::new();
        stats.record_session_started();
        stats.record_registration_attempt();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sessions_started, 0);
        assert_eq!(snapshot.registration_attempts, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("step-sensor-stats-{}", uuid::Uuid::new_v4()))
            .join("session_stats.json");

        let stats = SessionStats::with_persistence(path.clone());
        stats.record_session_started();
        stats.record_event_accepted();
        stats.save().unwrap();

        let reloaded = SessionStats::with_persistence(path.clone());
        assert_eq!(reloaded.snapshot().sessions_started, 1);
        assert_eq!(reloaded.snapshot().events_accepted, 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionStats::new().summary();
        assert!(summary.contains("Step events accepted"));
        assert!(summary.contains("Permission requests"));
    }
}

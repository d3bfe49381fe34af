//! Statistics module for the Step Sensor Agent.
//!
//! Records how the agent used the step sensor and the permission platform.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, SessionStats, SharedSessionStats,
    StatsSnapshot,
};

//! Step accumulation.
//!
//! Pure transitions turning raw sensor events into session-relative steps
//! and distance. Every function here is total: there are no error states.

use crate::sensor::types::{SensorEvent, StepSemantics};
use serde::{Deserialize, Serialize};

/// Average adult step length in meters.
pub const DEFAULT_STEP_LENGTH_METERS: f64 = 0.7;

/// Whether a tracking session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Idle,
    Tracking,
}

impl TrackingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingStatus::Idle => "idle",
            TrackingStatus::Tracking => "tracking",
        }
    }
}

/// Counters for one tracking session.
///
/// Invariants: `steps_since_start >= 0` and
/// `total_distance == steps_since_start * step_length_meters`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub status: TrackingStatus,
    /// First positive cumulative reading of the session; 0 for pulse sensors
    pub baseline: Option<i64>,
    pub cumulative_total: i64,
    pub steps_since_start: i64,
    pub total_distance: f64,
    pub step_length_meters: f64,
}

impl TrackingState {
    pub fn new(step_length_meters: f64) -> Self {
        Self {
            status: TrackingStatus::Idle,
            baseline: None,
            cumulative_total: 0,
            steps_since_start: 0,
            total_distance: 0.0,
            step_length_meters,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_LENGTH_METERS)
    }
}

/// Apply one sensor event.
pub fn apply(state: TrackingState, event: &SensorEvent) -> TrackingState {
    let mut next = state;

    match event.semantics() {
        StepSemantics::Cumulative => {
            let reading = event.value as i64;
            match state.baseline {
                // A reading of 0 is treated as "no data yet".
                None if reading > 0 => {
                    next.baseline = Some(reading);
                    next.cumulative_total = reading;
                }
                None => return state,
                Some(_) if reading == state.cumulative_total => return state,
                Some(_) => next.cumulative_total = reading,
            }
        }
        StepSemantics::Pulse => {
            // Each pulse is a delta of one step, never a restated total.
            next.baseline.get_or_insert(0);
            next.cumulative_total += 1;
        }
    }

    next.steps_since_start = (next.cumulative_total - next.baseline.unwrap_or(0)).max(0);
    next.total_distance = distance(next.steps_since_start, next.step_length_meters);
    next
}

/// Zero the counters, keeping status and step length.
pub fn reset(state: TrackingState) -> TrackingState {
    TrackingState {
        baseline: None,
        cumulative_total: 0,
        steps_since_start: 0,
        total_distance: 0.0,
        ..state
    }
}

/// Change the step length and recompute distance from the current steps.
pub fn rescale(state: TrackingState, step_length_meters: f64) -> TrackingState {
    TrackingState {
        step_length_meters,
        total_distance: distance(state.steps_since_start, step_length_meters),
        ..state
    }
}

fn distance(steps: i64, step_length_meters: f64) -> f64 {
    steps as f64 * step_length_meters
}

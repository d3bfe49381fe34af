//! The `stepUpdate` event stream.
//!
//! Delivery is best effort: an update the receiving side cannot take is
//! dropped, and the next one supersedes it.

use crate::core::accumulator::TrackingState;
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event name seen by the script layer.
pub const STEP_UPDATE_EVENT: &str = "stepUpdate";

/// Payload pushed on every accepted sensor event and once on start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    pub steps: i64,
    pub distance: f64,
    pub steps_since_start: i64,
}

impl From<&TrackingState> for StepUpdate {
    fn from(state: &TrackingState) -> Self {
        Self {
            steps: state.steps_since_start,
            distance: state.total_distance,
            steps_since_start: state.steps_since_start,
        }
    }
}

/// Why an update did not reach the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Nothing is attached to receive updates
    Detached,
    /// The receiver is not keeping up
    Full,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Detached => write!(f, "No receiver attached"),
            DeliveryError::Full => write!(f, "Receiver is full"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Receiving end of the step update stream.
///
/// Called with the controller's lock held: implementations must not block
/// and must not call back into the controller.
pub trait StepUpdateSink: Send {
    fn deliver(&self, update: &StepUpdate) -> Result<(), DeliveryError>;
}

impl StepUpdateSink for Sender<StepUpdate> {
    fn deliver(&self, update: &StepUpdate) -> Result<(), DeliveryError> {
        // Don't block if the channel is full - just drop the update
        self.try_send(*update).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Disconnected(_) => DeliveryError::Detached,
        })
    }
}

#[cfg(feature = "server")]
impl StepUpdateSink for tokio::sync::broadcast::Sender<StepUpdate> {
    fn deliver(&self, update: &StepUpdate) -> Result<(), DeliveryError> {
        self.send(*update)
            .map(|_| ())
            .map_err(|_| DeliveryError::Detached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_payload_field_names() {
        let update = StepUpdate {
            steps: 3,
            distance: 2.1,
            steps_since_start: 3,
        };
        let json = serde_json::to_value(update).unwrap();
        assert_eq!(json["steps"], 3);
        assert_eq!(json["stepsSinceStart"], 3);
        assert!(json.get("distance").is_some());
    }

    #[test]
    fn test_channel_sink_drops_when_full_or_detached() {
        let (tx, rx) = bounded(1);
        let update = StepUpdate::from(&TrackingState::default());

        assert!(tx.deliver(&update).is_ok());
        assert_eq!(tx.deliver(&update), Err(DeliveryError::Full));
        drop(rx);
        assert_eq!(tx.deliver(&update), Err(DeliveryError::Detached));
    }
}

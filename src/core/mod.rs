//! Core functionality for the Step Sensor Agent.
//!
//! This module contains:
//! - Step accumulation from raw sensor events
//! - The tracking controller owning the sensor registration
//! - The step update stream pushed to the script layer

pub mod accumulator;
pub mod controller;
pub mod updates;

// Re-export commonly used types
pub use accumulator::{TrackingState, TrackingStatus, DEFAULT_STEP_LENGTH_METERS};
pub use controller::{ControllerConfig, StartOutcome, StartStatus, TrackingController, TrackingError};
pub use updates::{DeliveryError, StepUpdate, StepUpdateSink, STEP_UPDATE_EVENT};

//! Step sensor access for the Step Sensor Agent.
//!
//! This module abstracts the two hardware step sensor variants behind one
//! capability and provides an in-process simulation of the host service.

pub mod simulated;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use simulated::SimulatedSensorService;
pub use source::{SensorListener, SensorService, SensorSource};
pub use types::{
    SamplingRate, SensorCapability, SensorEvent, SensorHandle, SensorKind, StepSemantics,
    DEFAULT_RATE_LADDER,
};

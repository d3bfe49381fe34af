//! Runtime permission handling for the Step Sensor Agent.
//!
//! Reading step data requires the activity recognition grant on newer
//! platform revisions. The gate defers and replays calls around the prompt.

pub mod gate;
pub mod simulated;

// Re-export commonly used types
pub use gate::{
    GateError, GatedRequest, Invocation, OperationId, PendingOperation, PermissionCallback,
    PermissionGate, PermissionPlatform, PermissionState,
};
pub use simulated::{requires_runtime_grant, SimulatedPermissionPlatform, RUNTIME_GRANT_MIN_API_LEVEL};

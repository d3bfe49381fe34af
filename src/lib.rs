//! Step Sensor Agent - step counting on top of hardware step sensors.
//!
//! This library turns low-level step sensor events into a session step
//! count and walked distance, exposes them to an embedded script layer
//! through a call/event interface, and manages the runtime permission
//! needed to read the sensor.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Step Sensor Agent                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │   Sensor    │──▶│   Tracking   │──▶│ Accumulator  │       │
//! │  │   Source    │   │  Controller  │   │ (steps, m)   │       │
//! │  └─────────────┘   └──────────────┘   └──────────────┘       │
//! │                           ▲                   │              │
//! │                           │                   ▼              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │   Script    │──▶│  Permission  │   │  stepUpdate  │       │
//! │  │   calls     │   │     Gate     │   │    stream    │       │
//! │  └─────────────┘   └──────────────┘   └──────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use step_sensor_agent::{
//!     bridge::{PluginCall, StepCounterPlugin},
//!     core::{ControllerConfig, TrackingController},
//!     permission::{PermissionGate, SimulatedPermissionPlatform},
//!     sensor::{SensorKind, SensorSource, SimulatedSensorService},
//!     stats::create_shared_stats,
//! };
//!
//! let stats = create_shared_stats();
//! let sensors = Arc::new(SimulatedSensorService::new(&[SensorKind::StepDetectorPulse]));
//! let controller = Arc::new(TrackingController::new(
//!     SensorSource::new(sensors),
//!     ControllerConfig::default(),
//!     stats.clone(),
//! ));
//! let gate = PermissionGate::new(Arc::new(SimulatedPermissionPlatform::new(28)), stats);
//! let plugin = StepCounterPlugin::load(controller, gate);
//!
//! let (call, answer) = PluginCall::with_channel("startTracking", serde_json::json!({}));
//! plugin.dispatch(call);
//! println!("{:?}", answer.recv());
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod bridge;
pub mod config;
pub mod core;
pub mod permission;
pub mod sensor;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use bridge::{CallRejection, CallResponse, ErrorCode, PluginCall, StepCounterPlugin};
pub use config::{Config, SensorConfig};
pub use core::{StepUpdate, TrackingController, TrackingError, TrackingState, TrackingStatus};
pub use permission::{GateError, Invocation, PermissionGate, PermissionPlatform, PermissionState};
pub use sensor::{SensorEvent, SensorKind, SensorService, SensorSource};
pub use stats::{SessionStats, SharedSessionStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lock a mutex, recovering the data if a holder panicked.
///
/// Guarded state is only ever replaced wholesale by total functions, so a
/// poisoned lock still holds a consistent value.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

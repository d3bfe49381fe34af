//! Bridge between the tracking core and the embedded script layer.

pub mod plugin;

// Re-export commonly used types
pub use plugin::{
    CallRejection, CallResponse, CallResult, ErrorCode, PluginCall, StepCounterPlugin,
    GET_STEPS, RESET, SET_STEP_LENGTH, START_TRACKING, STOP_TRACKING,
};

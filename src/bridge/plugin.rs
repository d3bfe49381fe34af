//! Call surface exposed to the embedded script layer.
//!
//! Each call is answered exactly once through its responder, either with
//! `{steps, distance, status}` or with a rejection. Calls that read the step
//! sensor go through the [`PermissionGate`] and may be answered long after
//! they were dispatched.

use crate::core::{StartStatus, TrackingController, TrackingError, TrackingState};
use crate::permission::{GateError, GatedRequest, Invocation, PermissionGate};
use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const START_TRACKING: &str = "startTracking";
pub const STOP_TRACKING: &str = "stopTracking";
pub const GET_STEPS: &str = "getSteps";
pub const RESET: &str = "reset";
pub const SET_STEP_LENGTH: &str = "setStepLength";

/// Successful answer to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub steps: i64,
    pub distance: f64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_length: Option<f64>,
}

impl CallResponse {
    pub fn from_state(state: &TrackingState, status: &str) -> Self {
        Self {
            steps: state.steps_since_start,
            distance: state.total_distance,
            status: status.to_string(),
            sensor_type: None,
            step_length: None,
        }
    }
}

/// Stable rejection codes seen by the script layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SensorUnavailable,
    RegistrationFailed,
    PermissionDenied,
    PermissionRequestInProgress,
    InvalidArgument,
    UnknownMethod,
    /// The call was dropped without being answered
    Internal,
}

/// Failed answer to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRejection {
    pub code: ErrorCode,
    pub message: String,
}

impl CallRejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CallRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for CallRejection {}

impl From<TrackingError> for CallRejection {
    fn from(error: TrackingError) -> Self {
        let code = match error {
            TrackingError::SensorUnavailable => ErrorCode::SensorUnavailable,
            TrackingError::RegistrationFailed { .. } => ErrorCode::RegistrationFailed,
            TrackingError::InvalidArgument(_) => ErrorCode::InvalidArgument,
        };
        Self::new(code, error.to_string())
    }
}

impl From<GateError> for CallRejection {
    fn from(error: GateError) -> Self {
        let code = match error {
            GateError::PermissionDenied => ErrorCode::PermissionDenied,
            GateError::PermissionRequestInProgress => ErrorCode::PermissionRequestInProgress,
        };
        Self::new(code, error.to_string())
    }
}

pub type CallResult = Result<CallResponse, CallRejection>;

type Responder = Box<dyn FnOnce(CallResult) + Send>;

/// One invocation from the script layer.
pub struct PluginCall {
    method: String,
    options: Value,
    responder: Responder,
}

impl PluginCall {
    pub fn new(
        method: impl Into<String>,
        options: Value,
        responder: impl FnOnce(CallResult) + Send + 'static,
    ) -> Self {
        Self {
            method: method.into(),
            options,
            responder: Box::new(responder),
        }
    }

    /// A call whose answer arrives on the returned receiver.
    pub fn with_channel(method: impl Into<String>, options: Value) -> (Self, Receiver<CallResult>) {
        let (tx, rx) = bounded(1);
        let call = Self::new(method, options, move |result| {
            let _ = tx.send(result);
        });
        (call, rx)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.options.get(key).and_then(Value::as_f64)
    }

    pub fn resolve(self, response: CallResponse) {
        (self.responder)(Ok(response));
    }

    pub fn reject(self, rejection: impl Into<CallRejection>) {
        let rejection = rejection.into();
        tracing::debug!(method = %self.method, code = ?rejection.code, "Call rejected");
        (self.responder)(Err(rejection));
    }
}

impl fmt::Debug for PluginCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCall")
            .field("method", &self.method)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl GatedRequest for PluginCall {
    fn label(&self) -> &str {
        &self.method
    }

    fn fail(self, error: GateError) {
        self.reject(error);
    }
}

/// The step counter plugin as seen by the script layer.
pub struct StepCounterPlugin {
    controller: Arc<TrackingController>,
    gate: PermissionGate,
}

impl StepCounterPlugin {
    pub fn new(controller: Arc<TrackingController>, gate: PermissionGate) -> Self {
        Self { controller, gate }
    }

    /// Create the plugin and log what the platform offers.
    pub fn load(controller: Arc<TrackingController>, gate: PermissionGate) -> Self {
        if gate.requires_runtime_grant() {
            tracing::info!(
                state = ?gate.permission_state(),
                "Platform requires the activity recognition grant"
            );
        } else {
            tracing::info!("Platform needs no runtime grant for step data");
        }

        if let Err(e) = controller.capability() {
            tracing::error!("{}", e);
        }

        Self::new(controller, gate)
    }

    pub fn controller(&self) -> &Arc<TrackingController> {
        &self.controller
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Route a call by method name.
    ///
    /// Returns [`Invocation::Executed`] for calls answered synchronously,
    /// including rejections that are not permission related.
    pub fn dispatch(&self, call: PluginCall) -> Invocation {
        match call.method() {
            START_TRACKING => self.start_tracking(call),
            GET_STEPS => self.get_steps(call),
            STOP_TRACKING => {
                self.stop_tracking(call);
                Invocation::Executed
            }
            RESET => {
                self.reset(call);
                Invocation::Executed
            }
            SET_STEP_LENGTH => {
                self.set_step_length(call);
                Invocation::Executed
            }
            other => {
                let message = format!("unknown method {other}");
                call.reject(CallRejection::new(ErrorCode::UnknownMethod, message));
                Invocation::Executed
            }
        }
    }

    pub fn get_steps(&self, call: PluginCall) -> Invocation {
        let controller = Arc::clone(&self.controller);
        self.gate
            .invoke(call, move |call| execute_get_steps(&controller, call))
    }

    pub fn start_tracking(&self, call: PluginCall) -> Invocation {
        let controller = Arc::clone(&self.controller);
        self.gate
            .invoke(call, move |call| execute_start_tracking(&controller, call))
    }

    pub fn stop_tracking(&self, call: PluginCall) {
        let state = self.controller.stop();
        call.resolve(CallResponse::from_state(&state, "stopped"));
    }

    pub fn reset(&self, call: PluginCall) {
        let state = self.controller.reset();
        call.resolve(CallResponse::from_state(&state, "reset"));
    }

    pub fn set_step_length(&self, call: PluginCall) {
        let Some(length) = call.get_f64("length") else {
            call.reject(CallRejection::new(
                ErrorCode::InvalidArgument,
                "missing numeric option `length`",
            ));
            return;
        };

        match self.controller.set_step_length(length) {
            Ok(state) => call.resolve(CallResponse {
                step_length: Some(state.step_length_meters),
                ..CallResponse::from_state(&state, state.status.as_str())
            }),
            Err(e) => call.reject(e),
        }
    }

    /// Release the sensor when the host tears the plugin down.
    pub fn handle_on_destroy(&self) {
        self.controller.stop();
    }
}

fn execute_get_steps(controller: &TrackingController, call: PluginCall) {
    if let Err(e) = controller.capability() {
        call.reject(e);
        return;
    }

    let state = controller.snapshot();
    tracing::debug!(steps = state.steps_since_start, distance = state.total_distance, "Returning steps");
    call.resolve(CallResponse::from_state(&state, state.status.as_str()));
}

fn execute_start_tracking(controller: &TrackingController, call: PluginCall) {
    match controller.start() {
        Ok(outcome) => {
            let sensor_type = match outcome.status {
                StartStatus::Started => Some(outcome.capability.kind.label().to_string()),
                StartStatus::AlreadyTracking => None,
            };
            call.resolve(CallResponse {
                sensor_type,
                ..CallResponse::from_state(&outcome.snapshot, outcome.status.as_str())
            });
        }
        Err(e) => call.reject(e),
    }
}

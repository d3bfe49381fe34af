//! In-process permission platform.
//!
//! Prompts are recorded instead of shown; the embedding code answers them
//! with [`SimulatedPermissionPlatform::decide`].

use crate::lock;
use crate::permission::gate::{PermissionCallback, PermissionPlatform, PermissionState};
use std::sync::Mutex;

/// First platform API level that enforces the activity recognition grant.
pub const RUNTIME_GRANT_MIN_API_LEVEL: u32 = 29;

/// Whether a platform at `api_level` needs the runtime grant.
pub fn requires_runtime_grant(api_level: u32) -> bool {
    api_level >= RUNTIME_GRANT_MIN_API_LEVEL
}

pub struct SimulatedPermissionPlatform {
    api_level: u32,
    state: Mutex<PermissionState>,
    waiting: Mutex<Vec<PermissionCallback>>,
}

impl SimulatedPermissionPlatform {
    pub fn new(api_level: u32) -> Self {
        Self {
            api_level,
            state: Mutex::new(PermissionState::Unknown),
            waiting: Mutex::new(Vec::new()),
        }
    }

    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    pub fn set_state(&self, state: PermissionState) {
        *lock(&self.state) = state;
    }

    /// Prompts shown and not yet answered.
    pub fn outstanding_requests(&self) -> usize {
        lock(&self.waiting).len()
    }

    /// Answer every outstanding prompt as the user would.
    ///
    /// Returns the number of prompts answered.
    pub fn decide(&self, granted: bool) -> usize {
        self.set_state(if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        });
        self.deliver_without_granting(granted)
    }

    /// Invoke the outstanding callbacks without touching the stored state.
    ///
    /// Models a platform whose callback disagrees with its later query.
    pub fn deliver_without_granting(&self, granted: bool) -> usize {
        let callbacks: Vec<PermissionCallback> = std::mem::take(&mut *lock(&self.waiting));
        let count = callbacks.len();
        // Callbacks may issue new prompts; no lock is held here.
        for callback in callbacks {
            callback(granted);
        }
        count
    }
}

impl PermissionPlatform for SimulatedPermissionPlatform {
    fn requires_runtime_grant(&self) -> bool {
        requires_runtime_grant(self.api_level)
    }

    fn query_permission(&self) -> PermissionState {
        *lock(&self.state)
    }

    fn request_permission(&self, on_decision: PermissionCallback) {
        lock(&self.waiting).push(on_decision);
    }
}

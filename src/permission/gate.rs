//! Runtime permission gate.
//!
//! Operations that read the step sensor need the activity recognition grant
//! on platforms that enforce it. When the grant is missing the gate parks
//! the call as a [`PendingOperation`], asks the platform, and later either
//! replays or fails it. At most one call is parked at a time.

use crate::lock;
use crate::stats::SharedSessionStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Platform answer to "may this app read step data?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

/// Callback receiving the user's decision.
pub type PermissionCallback = Box<dyn FnOnce(bool) + Send>;

/// Permission operations provided by the host platform.
pub trait PermissionPlatform: Send + Sync {
    /// Whether this platform revision enforces the runtime grant at all.
    fn requires_runtime_grant(&self) -> bool;

    fn query_permission(&self) -> PermissionState;

    /// Show the permission prompt. `on_decision` is invoked once the user
    /// answers, possibly on another thread, possibly never.
    fn request_permission(&self, on_decision: PermissionCallback);
}

/// Errors a gated call can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// The user refused the grant
    PermissionDenied,
    /// Another call is already waiting on the prompt
    PermissionRequestInProgress,
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::PermissionDenied => write!(f, "Activity recognition permission is required"),
            GateError::PermissionRequestInProgress => {
                write!(f, "A permission request is already in progress")
            }
        }
    }
}

impl std::error::Error for GateError {}

/// A request that can be failed by the gate without running its operation.
pub trait GatedRequest: Send + 'static {
    /// Name used in logs.
    fn label(&self) -> &str {
        "operation"
    }

    /// Complete the request with `error`.
    fn fail(self, error: GateError);
}

/// Identifier of a parked call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What happened to a call passed to [`PermissionGate::invoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// The operation ran
    Executed,
    /// Parked until the platform delivers a decision; do not resubmit
    Pending(OperationId),
    /// Failed immediately; the request was already completed with the error
    Rejected(GateError),
}

type Resume = Box<dyn FnOnce(&PermissionGate, bool) + Send>;

/// A call parked while the permission prompt is showing.
pub struct PendingOperation {
    pub id: OperationId,
    pub label: String,
    resume: Resume,
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

struct GateInner {
    platform: Arc<dyn PermissionPlatform>,
    pending: Mutex<Option<PendingOperation>>,
    stats: SharedSessionStats,
}

/// Wraps operations that need the runtime grant.
#[derive(Clone)]
pub struct PermissionGate {
    inner: Arc<GateInner>,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn PermissionPlatform>, stats: SharedSessionStats) -> Self {
        Self {
            inner: Arc::new(GateInner {
                platform,
                pending: Mutex::new(None),
                stats,
            }),
        }
    }

    /// Current platform state, queried fresh.
    pub fn permission_state(&self) -> PermissionState {
        self.inner.platform.query_permission()
    }

    pub fn requires_runtime_grant(&self) -> bool {
        self.inner.platform.requires_runtime_grant()
    }

    /// Id of the parked call, if any.
    pub fn pending_operation(&self) -> Option<OperationId> {
        lock(&self.inner.pending).as_ref().map(|p| p.id)
    }

    /// Run `op(request)` once the grant is present.
    pub fn invoke<R, F>(&self, request: R, op: F) -> Invocation
    where
        R: GatedRequest,
        F: FnOnce(R) + Send + 'static,
    {
        let state = self.inner.platform.query_permission();
        if state == PermissionState::Granted || !self.inner.platform.requires_runtime_grant() {
            op(request);
            return Invocation::Executed;
        }

        let label = request.label().to_string();
        let parked = {
            let mut pending = lock(&self.inner.pending);
            match pending.as_ref() {
                Some(existing) => Err((request, existing.id)),
                None => {
                    let id = OperationId::new();
                    *pending = Some(PendingOperation {
                        id,
                        label: label.clone(),
                        resume: Box::new(move |gate: &PermissionGate, granted: bool| {
                            if granted {
                                gate.invoke(request, op);
                            } else {
                                request.fail(GateError::PermissionDenied);
                            }
                        }),
                    });
                    Ok(id)
                }
            }
        };

        let id = match parked {
            Ok(id) => id,
            Err((request, waiting)) => {
                tracing::warn!(
                    operation = %label,
                    %waiting,
                    "Permission request already in progress, rejecting call"
                );
                request.fail(GateError::PermissionRequestInProgress);
                return Invocation::Rejected(GateError::PermissionRequestInProgress);
            }
        };

        tracing::info!(operation = %label, ?state, %id, "Requesting activity recognition permission");
        self.inner.stats.record_permission_request();

        let gate = Arc::downgrade(&self.inner);
        self.inner
            .platform
            .request_permission(Box::new(move |granted: bool| {
                if let Some(inner) = gate.upgrade() {
                    PermissionGate { inner }.on_permission_decision(granted);
                }
            }));

        // A platform may answer before `request_permission` returns.
        match self.pending_operation() {
            Some(parked) => Invocation::Pending(parked),
            None if self.inner.platform.query_permission() == PermissionState::Granted => {
                Invocation::Executed
            }
            None => Invocation::Rejected(GateError::PermissionDenied),
        }
    }

    /// Deliver the platform's decision for the parked call.
    ///
    /// A decision with nothing parked is ignored.
    pub fn on_permission_decision(&self, granted: bool) {
        // Cleared before resuming so the replay can itself be parked again.
        let pending = lock(&self.inner.pending).take();
        let Some(pending) = pending else {
            tracing::debug!(granted, "Permission decision with no pending operation");
            return;
        };

        self.inner.stats.record_permission_decision(granted);
        if granted {
            tracing::info!(operation = %pending.label, id = %pending.id, "Permission granted, replaying call");
        } else {
            tracing::warn!(operation = %pending.label, id = %pending.id, "Permission denied");
        }
        (pending.resume)(self, granted);
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("pending", &self.pending_operation())
            .finish_non_exhaustive()
    }
}

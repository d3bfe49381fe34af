//! HTTP development bridge for the step counter plugin.
//!
//! Runs the plugin against the simulated sensor and permission platform so
//! a script layer can be developed on a machine without step hardware:
//! - Calls are forwarded via `POST /call/{method}`
//! - The permission prompt is answered via `POST /permission`
//! - Hardware steps are injected via `POST /sensor`
//! - `stepUpdate` events are long-polled via `GET /updates/next`
//!
//! # Architecture
//!
//! ```text
//! Script layer ──→ POST /call/startTracking ──→ plugin ──→ gate ──→ controller
//!      ↑                                                               │
//!      └──────────────── GET /updates/next ←── broadcast ←─────────────┘
//! ```

use crate::bridge::{CallRejection, ErrorCode, PluginCall, StepCounterPlugin};
use crate::config::Config;
use crate::core::{StepUpdate, TrackingController};
use crate::permission::{PermissionGate, SimulatedPermissionPlatform};
use crate::sensor::{SensorEvent, SensorKind, SensorSource, SimulatedSensorService};
use crate::stats::{create_shared_stats, SharedSessionStats, StatsSnapshot};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tower_http::cors::{Any, CorsLayer};

/// Buffered updates per long-poll subscriber.
const UPDATE_BUFFER: usize = 64;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Sensor kinds the simulated device exposes
    pub sensors: Vec<SensorKind>,
    /// Boot-lifetime total of the simulated step counter
    pub boot_count: u64,
    /// Agent configuration (step length, rate ladder, API level)
    pub agent: Config,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, sensors: Vec<SensorKind>, agent: Config) -> Self {
        Self {
            port,
            sensors,
            boot_count: 0,
            agent,
        }
    }
}

/// Shared server state
pub struct ServerState {
    plugin: StepCounterPlugin,
    sensors: Arc<SimulatedSensorService>,
    permissions: Arc<SimulatedPermissionPlatform>,
    updates: broadcast::Sender<StepUpdate>,
    stats: SharedSessionStats,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: &ServerConfig) -> Self {
        let stats = create_shared_stats();
        let sensors = Arc::new(
            SimulatedSensorService::new(&config.sensors).with_boot_count(config.boot_count),
        );
        let permissions = Arc::new(SimulatedPermissionPlatform::new(
            config.agent.permission.platform_api_level,
        ));

        let controller = Arc::new(TrackingController::new(
            SensorSource::new(sensors.clone()),
            config.agent.controller_config(),
            stats.clone(),
        ));
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        controller.attach_sink(updates.clone());

        let gate = PermissionGate::new(permissions.clone(), stats.clone());

        Self {
            plugin: StepCounterPlugin::load(controller, gate),
            sensors,
            permissions,
            updates,
            stats,
        }
    }
}

/// Permission decision posted by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub granted: bool,
}

/// Hardware event injected into the simulated sensor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorInjection {
    /// Raw cumulative reading; omitted for a single physical step
    #[serde(default)]
    pub value: Option<f64>,
}

/// Number of callbacks or listeners reached
#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub delivered: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorCode::UnknownMethod => StatusCode::NOT_FOUND,
        ErrorCode::PermissionRequestInProgress => StatusCode::CONFLICT,
        ErrorCode::SensorUnavailable | ErrorCode::RegistrationFailed => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /call/:method
///
/// Answers once the call resolves; a call waiting on the permission prompt
/// holds the request open until `POST /permission` arrives.
async fn call(
    State(state): State<Arc<ServerState>>,
    Path(method): Path<String>,
    Json(options): Json<serde_json::Value>,
) -> Response {
    let (tx, rx) = oneshot::channel();
    let plugin_call = PluginCall::new(method.clone(), options, move |result| {
        let _ = tx.send(result);
    });

    let invocation = state.plugin.dispatch(plugin_call);
    tracing::debug!(%method, ?invocation, "Dispatched call");

    match rx.await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(rejection)) => (status_for(rejection.code), Json(rejection)).into_response(),
        Err(_) => {
            tracing::error!(%method, "Call dropped without an answer");
            let rejection = CallRejection::new(ErrorCode::Internal, "call was never answered");
            (status_for(rejection.code), Json(rejection)).into_response()
        }
    }
}

/// POST /permission
async fn permission(
    State(state): State<Arc<ServerState>>,
    Json(decision): Json<PermissionDecision>,
) -> Json<DeliveryReport> {
    let delivered = state.permissions.decide(decision.granted);
    tracing::info!(granted = decision.granted, delivered, "Permission decision posted");
    Json(DeliveryReport { delivered })
}

/// POST /sensor
async fn sensor(
    State(state): State<Arc<ServerState>>,
    Json(injection): Json<SensorInjection>,
) -> Json<DeliveryReport> {
    let delivered = match injection.value {
        Some(value) => state.sensors.emit(SensorEvent::cumulative(value)),
        None => state.sensors.step(),
    };
    Json(DeliveryReport { delivered })
}

/// GET /updates/next
async fn next_update(State(state): State<Arc<ServerState>>) -> Response {
    let mut updates = state.updates.subscribe();
    loop {
        match updates.recv().await {
            Ok(update) => return Json(update).into_response(),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Long-poll subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        }
    }
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

/// Run the HTTP server
pub async fn run(config: ServerConfig) -> anyhow::Result<(SocketAddr, oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config));

    let app = Router::new()
        .route("/health", get(health))
        .route("/call/:method", post(call))
        .route("/permission", post(permission))
        .route("/sensor", post(sensor))
        .route("/updates/next", get(next_update))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    HeaderValue::from_static("capacitor://localhost"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Step sensor bridge listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
        state.plugin.handle_on_destroy();
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(status_for(ErrorCode::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCode::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorCode::UnknownMethod), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorCode::PermissionRequestInProgress),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(ErrorCode::SensorUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(ErrorCode::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

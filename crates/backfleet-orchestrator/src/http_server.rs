//! Metadata HTTP Server
//!
//! This module provides the orchestrator's metadata service using axum.
//! Workers register their bound ports here and downstream tooling reads the
//! registry back.
//!
//! # Endpoints
//!
//! - `POST /register` - strict `{host_addr, name, traffic_type, port}` body
//! - `GET /backends` - every bound backend as text, or JSON with `?json`
//! - `GET /backends/{edge,http,passthrough,reencrypt}` - one traffic type, text
//! - `GET /__health` - liveness
//! - `GET /__ready` - 200 once every backend has registered, 503 before

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use backfleet_common::{BoundBackend, FleetError, Result, TrafficType};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::barrier::{ReadinessBarrier, RegistrationObserver};
use crate::registry::Registry;

/// Shared state behind every metadata endpoint.
pub struct MetadataState {
    registry: Registry,
    barrier: Arc<ReadinessBarrier>,
    observer: Arc<dyn RegistrationObserver>,
    /// Serializes registrations so the observer never runs concurrently with itself
    write_lock: Mutex<()>,
}

impl MetadataState {
    /// Creates state whose registration observer is the barrier itself.
    pub fn new(registry: Registry, barrier: Arc<ReadinessBarrier>) -> Self {
        Self {
            registry,
            observer: barrier.clone(),
            barrier,
            write_lock: Mutex::new(()),
        }
    }

    /// Replaces the registration observer.
    pub fn with_observer(mut self, observer: Arc<dyn RegistrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn barrier(&self) -> &Arc<ReadinessBarrier> {
        &self.barrier
    }

    /// Accepts one registration.
    ///
    /// The backend must belong to the topology with the same traffic type and
    /// carry a non-zero port. Rejected registrations leave the registry and the
    /// barrier untouched. A repeat registration replaces the stored port but
    /// is not reported to the observer again.
    ///
    /// # Returns
    /// The port previously registered under the same name, if any.
    pub async fn register(&self, bound: BoundBackend) -> Result<Option<u16>> {
        let expected = self
            .registry
            .topology()
            .get(&bound.name)
            .ok_or_else(|| FleetError::InvalidRegistration(format!("unknown backend {}", bound.name)))?;

        if expected.traffic_type != bound.traffic_type {
            return Err(FleetError::InvalidRegistration(format!(
                "backend {} is {}, not {}",
                bound.name, expected.traffic_type, bound.traffic_type
            )));
        }
        if bound.port == 0 {
            return Err(FleetError::InvalidRegistration(format!(
                "backend {} registered port 0",
                bound.name
            )));
        }

        let _guard = self.write_lock.lock().await;
        let previous = self.registry.store(&bound.name, bound.port);

        // Only a backend's first registration counts towards readiness.
        match previous {
            None => self.observer.on_registered(&bound),
            Some(old) => {
                tracing::warn!("{} re-registered, port {} -> {}", bound.name, old, bound.port);
            }
        }
        Ok(previous)
    }
}

/// HTTP server exposing a [`MetadataState`].
pub struct MetadataServer {
    state: Arc<MetadataState>,
}

impl MetadataServer {
    pub fn new(state: Arc<MetadataState>) -> Self {
        Self { state }
    }

    /// Builds the axum router for the metadata endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/register", post(handle_register))
            .route("/backends", get(handle_backends))
            .route("/backends/:traffic_type", get(handle_backends_for_type))
            .route("/__health", get(health_check))
            .route("/__ready", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Binds the listener without serving yet.
    ///
    /// Connections that arrive before [`serve`](Self::serve) is called wait in
    /// the kernel backlog instead of being refused.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to bind to {}: {}", addr, e)))
    }

    /// Serves requests on an already bound listener until the server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| FleetError::Transport(format!("Failed to get local addr: {}", e)))?;
        info!("Metadata server listening on {}", local_addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| FleetError::Transport(format!("Server error: {}", e)))
    }
}

/// Maps an error onto the status code the caller should see.
fn error_response(err: FleetError) -> (StatusCode, String) {
    let status = match err {
        FleetError::InvalidRegistration(_)
        | FleetError::UnknownTrafficType(_)
        | FleetError::JsonSerialization(_) => StatusCode::BAD_REQUEST,
        FleetError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("{}\n", err))
}

async fn handle_register(
    State(state): State<Arc<MetadataState>>,
    body: Bytes,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    let bound: BoundBackend = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid registration: {}\n", e)))?;

    state.register(bound).await.map_err(error_response)?;
    Ok(StatusCode::OK)
}

async fn handle_backends(
    State(state): State<Arc<MetadataState>>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Response, (StatusCode, String)> {
    if params.contains_key("json") {
        let body = state.registry.render_json().map_err(error_response)?;
        Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
    } else {
        let body = state.registry.render_text(None).map_err(error_response)?;
        Ok(body.into_response())
    }
}

async fn handle_backends_for_type(
    State(state): State<Arc<MetadataState>>,
    Path(traffic_type): Path<String>,
) -> std::result::Result<String, (StatusCode, String)> {
    let traffic_type: TrafficType = traffic_type
        .parse()
        .map_err(|e: FleetError| (StatusCode::NOT_FOUND, format!("{}\n", e)))?;

    state
        .registry
        .render_text(Some(traffic_type))
        .map_err(error_response)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_check(State(state): State<Arc<MetadataState>>) -> impl IntoResponse {
    let barrier = &state.barrier;
    if barrier.is_released() {
        (StatusCode::OK, "ready\n".to_string())
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("waiting for {}/{} backends\n", barrier.count(), barrier.expected()),
        )
    }
}

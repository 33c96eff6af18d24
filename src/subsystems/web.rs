//! Web server subsystem.
//!
//! # Responsibilities
//! - Serve status and plugin listings over HTTP
//! - Accept events and publish them onto the event bus
//! - Shut down gracefully: stop accepting, finish in-flight requests
//!
//! # Routes
//! - `GET /health`
//! - `GET /status`
//! - `GET /plugins`
//! - `POST /events`

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::common::{Event, StopSignal};
use crate::config::WebConfig;
use crate::lifecycle::startup::Dependencies;
use crate::subsystems::{Subsystem, SubsystemError, SubsystemKind};

/// HTTP server bound at construction, served by `run()`.
pub struct WebServer {
    listener: Mutex<Option<std::net::TcpListener>>,
    local_addr: SocketAddr,
    request_timeout: Duration,
    deps: Arc<Dependencies>,
    stop: StopSignal,
    finished: StopSignal,
}

impl WebServer {
    /// Bind the configured address. Binding here lets a taken port fail the
    /// build instead of the running task.
    pub fn new(config: WebConfig, deps: Arc<Dependencies>) -> Result<Self, SubsystemError> {
        let bind_error = |source| SubsystemError::Bind {
            address: config.bind_address.clone(),
            source,
        };
        let listener = std::net::TcpListener::bind(&config.bind_address).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            deps,
            stop: StopSignal::new(),
            finished: StopSignal::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn serve(&self) -> Result<(), SubsystemError> {
        let listener = self
            .listener
            .lock()
            .expect("web listener mutex poisoned")
            .take()
            .ok_or_else(|| SubsystemError::Other("web server already ran".into()))?;
        let listener = tokio::net::TcpListener::from_std(listener).map_err(SubsystemError::Serve)?;

        tracing::info!(address = %self.local_addr, "Web server listening");

        let app = build_router(self.deps.clone(), self.request_timeout);
        let stop = self.stop.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.wait().await })
            .await
            .map_err(SubsystemError::Serve)?;

        tracing::info!("Web server stopped");
        Ok(())
    }
}

#[async_trait]
impl Subsystem for WebServer {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::WebServer
    }

    async fn run(self: Arc<Self>) -> Result<(), SubsystemError> {
        let result = self.serve().await;
        self.finished.trigger();
        result
    }

    /// Stop accepting connections and wait for in-flight requests, at most
    /// one request timeout.
    async fn stop(&self) -> Result<(), SubsystemError> {
        self.stop.trigger();
        tokio::time::timeout(self.request_timeout, self.finished.wait())
            .await
            .map_err(|_| SubsystemError::Other("in-flight requests did not finish".into()))
    }
}

#[allow(deprecated)]
fn build_router(deps: Arc<Dependencies>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/plugins", get(plugins))
        .route("/events", post(publish_event))
        .with_state(deps)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct ModeStatus {
    bot: bool,
    web: bool,
    feeds: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PoolStatus {
    size: usize,
    available: usize,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    mode: ModeStatus,
    plugins: usize,
    commands: usize,
    pool: PoolStatus,
    queue_depth: usize,
}

async fn status(State(deps): State<Arc<Dependencies>>) -> Json<StatusBody> {
    Json(StatusBody {
        mode: ModeStatus {
            bot: deps.mode.run_bot(),
            web: deps.mode.run_web(),
            feeds: deps.mode.feed_names().iter().cloned().collect(),
        },
        plugins: deps.registry.len(),
        commands: deps.commands.len(),
        pool: PoolStatus {
            size: deps.pool.size(),
            available: deps.pool.available(),
        },
        queue_depth: deps.mqueue.len(),
    })
}

#[derive(Debug, Serialize)]
struct PluginEntry {
    name: String,
    capabilities: Vec<String>,
    commands: Vec<String>,
}

async fn plugins(State(deps): State<Arc<Dependencies>>) -> Json<Vec<PluginEntry>> {
    let entries = deps
        .registry
        .all()
        .iter()
        .map(|plugin| PluginEntry {
            name: plugin.name().to_string(),
            capabilities: plugin
                .capabilities()
                .iter()
                .map(|c| format!("{c:?}"))
                .collect(),
            commands: plugin.commands().into_iter().map(|c| c.name).collect(),
        })
        .collect();
    Json(entries)
}

async fn publish_event(
    State(deps): State<Arc<Dependencies>>,
    Json(event): Json<Event>,
) -> Response {
    let name = event.name.clone();
    match deps.events.publish(event) {
        Ok(()) => {
            tracing::debug!(event = %name, "Event accepted");
            (StatusCode::ACCEPTED, Json(json!({ "accepted": name }))).into_response()
        }
        Err(e) => {
            tracing::warn!(event = %name, error = %e, "Event rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

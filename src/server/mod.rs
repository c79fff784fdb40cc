//! # HTTP surface
//!
//! | Route            | Purpose                                       |
//! |------------------|-----------------------------------------------|
//! | `GET <endpoint>` | WebSocket upgrade; one hub subscriber per socket |
//! | `GET /metrics`   | Prometheus text exposition of [`Metrics`]     |
//! | `GET /health`    | JSON status and live subscriber count         |
//!
//! The server follows the pipeline's shutdown token: once it is cancelled no
//! new connection is accepted, and open sockets end as the hub closes their
//! buffers. [`shutdown_within`] stops the pipeline and the server under one
//! shared deadline.

mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{HubHandle, RunningPipeline};
use crate::error::RuntimeError;
use crate::metrics::Metrics;

/// Per-connection WebSocket timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WsTimers {
    /// Bound on every frame write.
    pub write_timeout: Duration,
    /// Silence after which a peer is considered gone.
    pub pong_timeout: Duration,
    /// Ping period; below `pong_timeout`.
    pub ping_interval: Duration,
}

impl Default for WsTimers {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    hub: HubHandle,
    metrics: Arc<Metrics>,
    timers: WsTimers,
}

impl AppState {
    pub fn new(hub: HubHandle, metrics: Arc<Metrics>, timers: WsTimers) -> Self {
        Self {
            hub,
            metrics,
            timers,
        }
    }
}

/// Builds the router with the WebSocket route mounted at `ws_endpoint`.
pub fn router(ws_endpoint: &str, state: AppState) -> Router {
    Router::new()
        .route(ws_endpoint, get(ws::upgrade))
        .route("/metrics", get(prometheus_metrics))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves `router` on `listener` until `shutdown` is cancelled and every open
/// connection has finished.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), RuntimeError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
        .await
        .map_err(RuntimeError::Server)?;
    info!("http server stopped");
    Ok(())
}

/// Stops `pipeline` and waits for the `http` task spawned around [`serve`].
///
/// Both run concurrently against a single deadline `grace` from now, so the
/// whole stop takes at most `grace`. A server still running at the deadline is
/// aborted and reported as `http-server` in [`RuntimeError::GraceExceeded`],
/// next to any pipeline stages that overran.
pub async fn shutdown_within(
    grace: Duration,
    pipeline: RunningPipeline,
    mut http: JoinHandle<Result<(), RuntimeError>>,
) -> Result<(), RuntimeError> {
    let deadline = Instant::now() + grace;
    let (stopped, served) = tokio::join!(
        pipeline.shutdown(grace),
        time::timeout_at(deadline, &mut http)
    );

    let served = match served {
        Ok(Ok(res)) => res,
        Ok(Err(e)) => Err(RuntimeError::Server(std::io::Error::other(e))),
        Err(_) => {
            warn!(?grace, "http server did not stop within grace; aborting");
            http.abort();
            Err(RuntimeError::GraceExceeded {
                grace,
                stuck: vec!["http-server".to_owned()],
            })
        }
    };

    match (stopped, served) {
        (
            Err(RuntimeError::GraceExceeded { mut stuck, .. }),
            Err(RuntimeError::GraceExceeded { stuck: server, .. }),
        ) => {
            stuck.extend(server);
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
        (stopped, served) => stopped.and(served),
    }
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    debug!("serving metrics");
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    subscribers: Option<usize>,
}

async fn health(State(state): State<AppState>) -> Response {
    match state.hub.subscriber_count().await {
        Ok(n) => Json(HealthBody {
            status: "ok",
            subscribers: Some(n),
        })
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody {
                status: e.as_label(),
                subscribers: None,
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::{Pipeline, PipelineConfig};
    use crate::queue::{MemoryQueue, QueueClient};

    fn pipeline() -> RunningPipeline {
        let clients: Vec<Arc<dyn QueueClient>> = vec![Arc::new(MemoryQueue::new())];
        Pipeline::new(PipelineConfig::default(), clients, Arc::new(Metrics::new()))
            .unwrap()
            .start()
    }

    #[tokio::test(start_paused = true)]
    async fn server_following_the_token_stops_cleanly() {
        let pipeline = pipeline();
        let token = pipeline.shutdown_token();
        let http = tokio::spawn(async move {
            token.cancelled().await;
            Ok(())
        });

        shutdown_within(Duration::from_secs(5), pipeline, http)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_server_shares_the_pipeline_deadline() {
        let grace = Duration::from_secs(5);
        let http = tokio::spawn(std::future::pending::<Result<(), RuntimeError>>());

        let started = Instant::now();
        let err = shutdown_within(grace, pipeline(), http).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed >= grace, "{elapsed:?}");
        assert!(elapsed < grace * 2, "took {elapsed:?}, more than one grace");
        match err {
            RuntimeError::GraceExceeded { stuck, .. } => {
                assert_eq!(stuck, vec!["http-server".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

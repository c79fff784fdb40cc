//! queuecast binary entry point.
//!
//! Usage: queuecast -c <config.yaml>

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use queuecast::server::{self, AppState, WsTimers};
use queuecast::{
    Config, LogFormat, Metrics, Pipeline, QueueClient, RuntimeError, init_logging,
    wait_for_shutdown_signal,
};

/// Fans a pull-based message queue out to WebSocket subscribers.
#[derive(Parser, Debug)]
#[command(name = "queuecast", version)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config", env = "QUEUECAST_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match Config::load(&args.config).map_err(RuntimeError::from) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging(LogFormat::default());
            error!(path = %args.config.display(), "invalid configuration");
            return failed(&e);
        }
    };
    init_logging(cfg.log_format);
    info!(path = %args.config.display(), "configuration loaded");

    match run(cfg).await {
        Ok(()) => {
            info!("queuecast finished");
            ExitCode::SUCCESS
        }
        Err(e) => failed(&e),
    }
}

fn failed(e: &RuntimeError) -> ExitCode {
    error!(error = %e, label = e.as_label(), "queuecast failed");
    ExitCode::FAILURE
}

async fn run(cfg: Config) -> Result<(), RuntimeError> {
    info!(
        queue = %cfg.source_queue,
        connections = cfg.connection_num,
        ws_endpoint = %cfg.ws_endpoint,
        ws_port = cfg.ws_port,
        sampling_rate = cfg.sampling_rate,
        "starting"
    );

    let clients = connect_queue(&cfg).await?;
    let metrics = Arc::new(Metrics::new());
    let pipeline = Pipeline::new(cfg.pipeline(), clients, metrics.clone())?.start();

    let addr = cfg.bind_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(source) => {
            let err = RuntimeError::Bind { addr, source };
            if let Err(e) = pipeline.shutdown(cfg.shutdown_grace()).await {
                warn!(error = %e, "pipeline did not stop cleanly after bind failure");
            }
            return Err(err);
        }
    };

    let timers = WsTimers {
        write_timeout: cfg.ws.write_timeout(),
        pong_timeout: cfg.ws.pong_timeout(),
        ping_interval: cfg.ws.ping_interval(),
    };
    let state = AppState::new(pipeline.hub().clone(), metrics, timers);
    let router = server::router(&cfg.ws_endpoint, state);
    let mut http = tokio::spawn(server::serve(listener, router, pipeline.shutdown_token()));

    let signal = tokio::select! {
        res = wait_for_shutdown_signal() => res,
        res = &mut http => {
            // Server ended without a shutdown request.
            let served = res.unwrap_or_else(|e| Err(RuntimeError::Server(std::io::Error::other(e))));
            let stopped = pipeline.shutdown(cfg.shutdown_grace()).await;
            return served.and(stopped);
        }
    };

    let stopped = server::shutdown_within(cfg.shutdown_grace(), pipeline, http).await;
    signal.and(stopped)
}

#[cfg(feature = "sqs")]
async fn connect_queue(cfg: &Config) -> Result<Vec<Arc<dyn QueueClient>>, RuntimeError> {
    queuecast::SqsQueue::connect_pool(&cfg.sqs_options(), cfg.connection_num)
        .await
        .map_err(RuntimeError::Startup)
}

#[cfg(not(feature = "sqs"))]
async fn connect_queue(cfg: &Config) -> Result<Vec<Arc<dyn QueueClient>>, RuntimeError> {
    warn!(queue = %cfg.source_queue, "built without a queue transport");
    Err(RuntimeError::Startup(queuecast::QueueError::Unsupported(
        "rebuild with `--features sqs`",
    )))
}

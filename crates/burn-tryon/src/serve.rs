//! HTTP job server
//!
//! Only available with the `serve` feature.
//!
//! # Endpoints
//!
//! - `GET /` - service banner
//! - `GET /health` - liveness
//! - `POST /virtual_try_on` - enqueue a [`TryOnJob`], answers 202
//!
//! Handlers never run inference. Jobs go through a bounded queue to a single
//! worker thread that owns the pipeline, so at most one inference runs per
//! device. A full queue answers 503.
//!
//! # Example
//!
//! ```ignore
//! use burn_tryon::serve::{ServeConfig, run_server};
//!
//! let pipeline = TryOnPipeline::<TryOnBackend>::reference(&device);
//! run_server(pipeline, ServeConfig::default()).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

use crate::job::{
    LocalDiskSink, LogNotifier, Notifier, OutputLayout, ResultSink, TryOnJob, run_job,
    timestamp_now,
};
use crate::pipeline::{TryOnConfig, TryOnPipeline};

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Server bind error: {0}")]
    Bind(String),

    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Server configuration, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Root of the result layout
    pub output_dir: PathBuf,
    /// Jobs waiting for the worker before requests are refused
    pub queue_capacity: usize,
    /// Per-job pipeline configuration
    pub pipeline: TryOnConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            output_dir: PathBuf::from("./vton_output"),
            queue_capacity: 16,
            pipeline: TryOnConfig {
                steps: 15,
                seed: Some(42),
                ..TryOnConfig::default()
            },
        }
    }
}

impl ServeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ServeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

struct ServerState {
    jobs: mpsc::Sender<TryOnJob>,
}

/// Response for an accepted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAccepted {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ErrorResponse {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

/// Run inference jobs from `jobs` until every sender is dropped
pub fn spawn_worker<B, S, N>(
    pipeline: TryOnPipeline<B>,
    mut jobs: mpsc::Receiver<TryOnJob>,
    config: TryOnConfig,
    sink: S,
    notifier: N,
) -> JoinHandle<()>
where
    B: Backend + 'static,
    S: ResultSink + 'static,
    N: Notifier + 'static,
{
    std::thread::spawn(move || {
        while let Some(job) = jobs.blocking_recv() {
            match run_job(&pipeline, &job, &config, &sink, &notifier) {
                Ok(outcome) => info!(
                    user = %job.username,
                    location = %outcome.location,
                    object_key = %outcome.object_key,
                    "Job finished"
                ),
                Err(e) => error!(user = %job.username, "Job failed: {}", e),
            }
        }
        info!("Job queue closed, worker exiting");
    })
}

/// Router over a job queue
pub fn router(jobs: mpsc::Sender<TryOnJob>) -> Router {
    let state = Arc::new(ServerState { jobs });

    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .route("/virtual_try_on", post(virtual_try_on))
        .with_state(state)
}

/// Run the HTTP server with a local-disk sink and log notifications
pub async fn run_server<B: Backend + 'static>(
    pipeline: TryOnPipeline<B>,
    config: ServeConfig,
) -> Result<(), ServeError> {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let sink = LocalDiskSink::new(OutputLayout::new(&config.output_dir));
    let _worker = spawn_worker(pipeline, receiver, config.pipeline.clone(), sink, LogNotifier);

    let app = router(sender);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServeError::Bind(e.to_string()))?;

    info!(
        "Server listening on http://{} ({} steps, queue {})",
        addr, config.pipeline.steps, config.queue_capacity
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| ServeError::Bind(e.to_string()))?;

    Ok(())
}

async fn home() -> &'static str {
    "Virtual Try On"
}

async fn health_check() -> &'static str {
    "ok"
}

/// Validate, stamp and enqueue a job
async fn virtual_try_on(
    State(state): State<Arc<ServerState>>,
    Json(mut job): Json<TryOnJob>,
) -> Result<(StatusCode, Json<JobAccepted>), ErrorResponse> {
    job.validate()
        .map_err(|e| ErrorResponse::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    let timestamp = job.timestamp.get_or_insert_with(timestamp_now).clone();
    let user = job.username.clone();

    match state.jobs.try_send(job) {
        Ok(()) => {
            info!(%user, %timestamp, "Job queued");
            Ok((
                StatusCode::ACCEPTED,
                Json(JobAccepted {
                    message: "VTON started successfully".to_string(),
                    timestamp,
                }),
            ))
        }
        Err(TrySendError::Full(_)) => {
            warn!(%user, "Job queue full");
            Err(ErrorResponse::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "job queue is full",
            ))
        }
        Err(TrySendError::Closed(_)) => {
            error!("Job worker is not running");
            Err(ErrorResponse::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "job worker is not running",
            ))
        }
    }
}

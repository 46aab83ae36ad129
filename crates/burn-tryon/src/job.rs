//! Try-on jobs: request payload, output layout, persistence and notification

use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn_tryon_image::{ConditioningError, Garment, load_image};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::TryOnError;
use crate::pipeline::{TryOnConfig, TryOnPipeline};

/// Timestamp format used in result paths and notifications
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Local time formatted with [`TIMESTAMP_FORMAT`]
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Failed to load inputs: {0}")]
    Conditioning(#[from] ConditioningError),

    #[error("Try-on failed: {0}")]
    Pipeline(#[from] TryOnError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode result: {0}")]
    Encode(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notification failed: {0}")]
    Notify(String),
}

/// One try-on request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryOnJob {
    pub person_image_path: PathBuf,
    pub upper_cloth_path: PathBuf,
    #[serde(default)]
    pub lower_cloth_path: Option<PathBuf>,
    pub mask_image_path: PathBuf,
    pub cloth_type: String,
    pub username: String,
    /// Assigned at submission when absent
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TryOnJob {
    /// Reject names that would escape the output root
    pub fn validate(&self) -> Result<(), JobError> {
        for (field, value) in [("username", &self.username), ("cloth_type", &self.cloth_type)] {
            if value.is_empty() || value.contains(['/', '\\']) || value == ".." || value == "." {
                return Err(JobError::InvalidJob(format!("bad {}: {:?}", field, value)));
            }
        }
        if let Some(ts) = &self.timestamp {
            if ts.is_empty() || ts.contains(['/', '\\', '.']) {
                return Err(JobError::InvalidJob(format!("bad timestamp: {:?}", ts)));
            }
        }
        Ok(())
    }

    /// Upper garment alone, or upper and lower stacked
    pub fn load_garment(&self) -> Result<Garment, ConditioningError> {
        let upper = load_image(&self.upper_cloth_path)?;
        let lower = match &self.lower_cloth_path {
            Some(path) => Some(load_image(path)?),
            None => None,
        };
        Garment::from_parts(Some(upper), lower)
    }
}

/// Directory layout for results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new("./vton_output")
    }
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{user}/{user}_{cloth_type}_{timestamp}.jpg`
    pub fn local_path(&self, user: &str, cloth_type: &str, timestamp: &str) -> PathBuf {
        self.root
            .join(user)
            .join(format!("{}_{}_{}.jpg", user, cloth_type, timestamp))
    }

    /// `users/{user}/vton_result/{timestamp}/result.jpg`
    pub fn object_key(user: &str, timestamp: &str) -> String {
        format!("users/{}/vton_result/{}/result.jpg", user, timestamp)
    }
}

/// Destination for finished images
pub trait ResultSink: Send {
    /// Store the image and return where it went
    fn store(
        &self,
        image: &RgbImage,
        user: &str,
        cloth_type: &str,
        timestamp: &str,
    ) -> Result<String, JobError>;
}

/// Writes JPEG files under an [`OutputLayout`]
#[derive(Debug, Clone, Default)]
pub struct LocalDiskSink {
    layout: OutputLayout,
}

impl LocalDiskSink {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }
}

impl ResultSink for LocalDiskSink {
    fn store(
        &self,
        image: &RgbImage,
        user: &str,
        cloth_type: &str,
        timestamp: &str,
    ) -> Result<String, JobError> {
        let path = self.layout.local_path(user, cloth_type, timestamp);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save_with_format(&path, ImageFormat::Jpeg)?;
        Ok(path.display().to_string())
    }
}

/// Completion message sent to downstream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryOnNotification {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub initial_timestamp: String,
}

pub trait Notifier: Send {
    fn notify(&self, notification: &TryOnNotification) -> Result<(), JobError>;
}

/// Emits the notification payload as a log event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &TryOnNotification) -> Result<(), JobError> {
        let payload = serde_json::to_string(notification)?;
        info!(%payload, "try-on result ready");
        Ok(())
    }
}

/// Result of a completed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub timestamp: String,
    /// Where the sink stored the image
    pub location: String,
    /// Object-storage key for the result
    pub object_key: String,
}

/// Load inputs, run the pipeline, store the result and notify
pub fn run_job<B: Backend>(
    pipeline: &TryOnPipeline<B>,
    job: &TryOnJob,
    config: &TryOnConfig,
    sink: &dyn ResultSink,
    notifier: &dyn Notifier,
) -> Result<JobOutcome, JobError> {
    job.validate()?;
    let timestamp = job.timestamp.clone().unwrap_or_else(timestamp_now);
    info!(
        user = %job.username,
        cloth_type = %job.cloth_type,
        %timestamp,
        "Starting try-on job"
    );

    let person = load_image(&job.person_image_path)?;
    let mask = load_image(&job.mask_image_path)?;
    let garment = job.load_garment()?;

    let image = pipeline.generate(&person, garment, &mask, config)?;
    let location = sink.store(&image, &job.username, &job.cloth_type, &timestamp)?;
    info!(%location, "Saved try-on result");

    notifier.notify(&TryOnNotification {
        user_id: job.username.clone(),
        initial_timestamp: timestamp.clone(),
    })?;

    Ok(JobOutcome {
        object_key: OutputLayout::object_key(&job.username, &timestamp),
        timestamp,
        location,
    })
}

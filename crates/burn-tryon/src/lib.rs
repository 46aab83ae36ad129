//! burn-tryon: Virtual Garment Try-On in Pure Rust
//!
//! Conditional latent diffusion for try-on: the masked person and the garment
//! are encoded, concatenated along the height axis, denoised together under
//! classifier-free guidance, and the person half is decoded back to pixels.
//!
//! The pretrained units (encoder, decoder, denoiser) are injected through
//! traits. A parameter-free reference pipeline runs the whole procedure
//! without weights.
//!
//! # Backend Selection
//!
//! - `ndarray`: CPU backend (default)
//! - `tch`: PyTorch backend via libtorch
//! - `wgpu`: WebGPU backend
//! - `cuda`: native CUDA backend
//!
//! # Example
//!
//! ```ignore
//! use burn_tryon::backends::{NdArray, NdArrayDevice};
//! use burn_tryon::conditioning::{Garment, load_image};
//! use burn_tryon::{TryOnConfig, TryOnPipeline};
//!
//! let device = NdArrayDevice::Cpu;
//! let pipeline = TryOnPipeline::<NdArray<f32>>::new(encoder, decoder, unet, &device);
//!
//! let person = load_image("person.jpg")?;
//! let mask = load_image("mask.png")?;
//! let garment = Garment::Single(load_image("shirt.jpg")?);
//!
//! let config = TryOnConfig::default().with_steps(30).with_seed(42);
//! let image = pipeline.generate(&person, garment, &mask, &config)?;
//! image.save("result.jpg")?;
//! ```
//!
//! # HTTP Server
//!
//! With the `serve` feature, [`serve::run_server`] accepts jobs over HTTP and
//! runs them on a single worker.

pub use burn_tryon_image as conditioning;
pub use burn_tryon_samplers as samplers;
pub use burn_tryon_vae as vae;

pub mod backends;
pub mod compositor;
pub mod denoiser;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod safety;

#[cfg(feature = "serve")]
pub mod serve;

pub use compositor::{LatentComposite, downsample_mask_nearest, split_person_half};
pub use denoiser::{Denoiser, PassthroughDenoiser};
pub use error::TryOnError;
pub use job::{
    JobError, JobOutcome, LocalDiskSink, LogNotifier, Notifier, OutputLayout, ResultSink,
    TryOnJob, TryOnNotification, run_job, timestamp_now,
};
pub use pipeline::{
    DebugConfig, InferenceState, SchedulerKind, StepInfo, StepOutput, TryOnConfig, TryOnPipeline,
    tensor_stats,
};
pub use safety::{Placeholder, SafetyChecker, apply_safety_filter};

pub use burn_tryon_image::{CanonicalImages, ConditionedTensors, Garment};

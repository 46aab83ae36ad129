//! Noise schedules and denoising schedulers for burn-tryon

pub mod scheduler;
pub mod ddim;
pub mod euler;
pub mod guidance;
pub mod noise;

pub use scheduler::{BetaSchedule, NoiseSchedule, ScheduleConfig, ScheduleError, Scheduler};
pub use ddim::{DdimConfig, DdimScheduler};
pub use euler::{EulerConfig, EulerScheduler};
pub use guidance::{apply_guidance, expand_for_guidance, guidance_enabled, split_guidance_batch};
pub use noise::NoiseGenerator;

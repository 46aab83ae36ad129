//! burn-tryon CLI
//!
//! Command-line interface for virtual try-on in pure Rust.
//!
//! - `generate`: run one try-on and save the image
//! - `prepare`: write the canonical person/garment/mask images
//! - `serve`: HTTP job server
//! - `info`: list compiled backends and defaults

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use burn::prelude::*;
use burn_tryon::backends;
use burn_tryon::conditioning::{CanonicalImages, Garment, load_image};
use burn_tryon::{DebugConfig, SchedulerKind, StepOutput, TryOnConfig, TryOnPipeline};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Float precision for inference
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Precision {
    /// 32-bit float (most stable, all backends)
    #[default]
    F32,
    /// 16-bit float (less memory; wgpu and tch only)
    F16,
}

/// Compute device for inference
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Device {
    /// Auto-detect best available (libtorch CUDA > WGPU > CPU)
    #[default]
    Auto,
    /// CPU via ndarray
    #[cfg(feature = "ndarray")]
    Cpu,
    /// WebGPU (Vulkan/Metal/DX12)
    #[cfg(feature = "wgpu")]
    Wgpu,
    /// libtorch (CUDA when available)
    #[cfg(feature = "tch")]
    Tch,
}

/// Scheduler algorithm
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum SchedulerArg {
    /// DDIM (eta controls stochasticity)
    #[default]
    Ddim,
    /// Euler discrete (deterministic)
    Euler,
}

impl SchedulerArg {
    fn to_pipeline(self) -> SchedulerKind {
        match self {
            Self::Ddim => SchedulerKind::Ddim,
            Self::Euler => SchedulerKind::Euler,
        }
    }
}

#[derive(Parser)]
#[command(name = "burn-tryon")]
#[command(about = "Virtual garment try-on with latent diffusion in pure Rust")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dress the person in the garment and save the result
    Generate(GenerateArgs),

    /// Write the canonical inputs the pipeline would see
    Prepare {
        #[command(flatten)]
        inputs: InputArgs,

        /// Directory for person.png, garment.png and mask.png
        #[arg(short, long, default_value = "prepared")]
        out_dir: PathBuf,
    },

    /// Run the HTTP job server
    #[cfg(feature = "serve")]
    Serve(ServeArgs),

    /// Show compiled backends and defaults
    Info,
}

#[derive(Args)]
struct InputArgs {
    /// Person photo
    #[arg(long)]
    person: PathBuf,

    /// Garment image (upper garment when --lower is given)
    #[arg(long)]
    garment: PathBuf,

    /// Lower garment, stacked under --garment
    #[arg(long)]
    lower: Option<PathBuf>,

    /// Mask image, white where the garment goes
    #[arg(long)]
    mask: PathBuf,

    /// Target width (multiple of 8)
    #[arg(long, default_value_t = 768)]
    width: usize,

    /// Target height (multiple of 8)
    #[arg(long, default_value_t = 1024)]
    height: usize,
}

impl InputArgs {
    fn load(&self) -> Result<(DynamicImage, Garment, DynamicImage)> {
        let person = load(&self.person, "person")?;
        let upper = load(&self.garment, "garment")?;
        let lower = self
            .lower
            .as_deref()
            .map(|path| load(path, "lower garment"))
            .transpose()?;
        let mask = load(&self.mask, "mask")?;
        Ok((person, Garment::from_parts(Some(upper), lower)?, mask))
    }
}

fn load(path: &Path, what: &str) -> Result<DynamicImage> {
    load_image(path).with_context(|| format!("Failed to load {} image {}", what, path.display()))
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Output image path
    #[arg(short, long, default_value = "tryon.jpg")]
    output: PathBuf,

    /// Number of denoising steps
    #[arg(long, env = "NUM_STEP", default_value_t = 50)]
    steps: usize,

    /// Guidance scale (guidance is off at 1.0 and below)
    #[arg(long, default_value_t = 2.5)]
    guidance: f64,

    /// Random seed (entropy when absent)
    #[arg(long, env = "TRYON_SEED")]
    seed: Option<u64>,

    /// Scheduler algorithm
    #[arg(long, value_enum, default_value = "ddim")]
    scheduler: SchedulerArg,

    /// DDIM eta (0 = deterministic)
    #[arg(long, default_value_t = 1.0)]
    eta: f64,

    /// Float precision
    #[arg(long, value_enum, default_value = "f32")]
    precision: Precision,

    /// Compute device (auto = detect best available)
    #[arg(long, value_enum, default_value = "auto")]
    device: Device,

    /// Debug modes (comma-separated): timing, nan, sampler, all
    ///
    /// Examples: --debug  --debug timing  --debug sampler,nan
    #[arg(long, value_delimiter = ',', num_args = 0.., default_missing_value = "all")]
    debug: Vec<String>,
}

impl GenerateArgs {
    fn to_config(&self, flags: &DebugFlags) -> TryOnConfig {
        TryOnConfig {
            width: self.inputs.width,
            height: self.inputs.height,
            steps: self.steps,
            guidance_scale: self.guidance,
            seed: self.seed,
            scheduler: self.scheduler.to_pipeline(),
            eta: self.eta,
            safety_check: false,
            debug: flags.to_pipeline_config(),
        }
    }
}

#[cfg(feature = "serve")]
#[derive(Args)]
struct ServeArgs {
    /// JSON server config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Result root directory
    #[arg(long, env = "TRYON_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Denoising steps per job
    #[arg(long, env = "NUM_STEP")]
    steps: Option<usize>,

    /// Seed for every job
    #[arg(long, env = "TRYON_SEED")]
    seed: Option<u64>,

    /// Jobs allowed to wait for the worker
    #[arg(long)]
    queue_capacity: Option<usize>,

    #[arg(long, value_enum, default_value = "f32")]
    precision: Precision,

    #[arg(long, value_enum, default_value = "auto")]
    device: Device,
}

#[cfg(feature = "serve")]
impl ServeArgs {
    fn to_config(&self) -> Result<burn_tryon::serve::ServeConfig> {
        let mut config = match &self.config {
            Some(path) => burn_tryon::serve::ServeConfig::from_file(path)?,
            None => burn_tryon::serve::ServeConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(steps) = self.steps {
            config.pipeline.steps = steps;
        }
        if let Some(seed) = self.seed {
            config.pipeline.seed = Some(seed);
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        Ok(config)
    }
}

/// Debug flags parsed from --debug option
struct DebugFlags {
    timing: bool,
    nan: bool,
    sampler: bool,
}

impl DebugFlags {
    fn from_args(debug: &[String]) -> Self {
        let all = debug.iter().any(|s| s == "all");
        Self {
            timing: all || debug.iter().any(|s| s == "timing"),
            nan: all || debug.iter().any(|s| s == "nan"),
            sampler: all || debug.iter().any(|s| s == "sampler"),
        }
    }

    fn to_pipeline_config(&self) -> DebugConfig {
        DebugConfig {
            sampler: self.sampler,
            nan: self.nan,
        }
    }
}

/// Resolve Auto device to a concrete device
fn resolve_device(requested: Device) -> Result<Device> {
    if !matches!(requested, Device::Auto) {
        return Ok(requested);
    }
    #[cfg(feature = "tch")]
    if matches!(backends::tch_device(), backends::LibTorchDevice::Cuda(_)) {
        info!("Auto-detected libtorch CUDA");
        return Ok(Device::Tch);
    }
    #[cfg(feature = "wgpu")]
    if backends::wgpu_available() {
        info!("Auto-detected WGPU");
        return Ok(Device::Wgpu);
    }
    #[cfg(feature = "ndarray")]
    {
        info!("Using CPU backend");
        return Ok(Device::Cpu);
    }
    #[allow(unreachable_code)]
    {
        bail!("No backend available. Enable the 'ndarray', 'wgpu' or 'tch' feature.")
    }
}

/// Call `$run::<Backend>(args.., &device)` for the resolved device and precision
macro_rules! with_backend {
    ($device:expr, $precision:expr, $run:ident($($arg:expr),*)) => {{
        match (resolve_device($device)?, $precision) {
            #[cfg(feature = "ndarray")]
            (Device::Cpu, Precision::F32) => {
                $run::<backends::NdArray<f32>>(
                    $($arg,)* &backends::NdArrayDevice::Cpu
                )
            }
            #[cfg(feature = "ndarray")]
            (Device::Cpu, Precision::F16) => {
                bail!("f16 is not supported on the CPU backend, use --precision f32")
            }
            #[cfg(feature = "wgpu")]
            (Device::Wgpu, Precision::F32) => {
                $run::<backends::Wgpu<f32, i32>>($($arg,)* &backends::WgpuDevice::default())
            }
            #[cfg(feature = "wgpu")]
            (Device::Wgpu, Precision::F16) => {
                $run::<backends::Wgpu<half::f16, i32>>(
                    $($arg,)* &backends::WgpuDevice::default()
                )
            }
            #[cfg(feature = "tch")]
            (Device::Tch, Precision::F32) => {
                $run::<backends::LibTorch<f32>>($($arg,)* &backends::tch_device())
            }
            #[cfg(feature = "tch")]
            (Device::Tch, Precision::F16) => {
                $run::<backends::LibTorch<half::f16>>($($arg,)* &backends::tch_device())
            }
            (Device::Auto, _) => bail!("Device was not resolved"),
        }
    }};
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn reference_pipeline<B: Backend>(device: &B::Device) -> TryOnPipeline<B> {
    warn!(
        "No pretrained units are bundled; running the reference codec and passthrough denoiser"
    );
    TryOnPipeline::reference(device)
}

/// Try-on with a specific backend
fn run_generate_impl<B: Backend>(args: &GenerateArgs, device: &B::Device) -> Result<()> {
    let flags = DebugFlags::from_args(&args.debug);
    let total_start = Instant::now();
    let pb = progress_bar()?;

    pb.set_message("Loading images...");
    pb.set_position(2);
    let (person, garment, mask) = args.inputs.load()?;

    let config = args.to_config(&flags);
    config.validate(8)?;
    let pipeline = reference_pipeline::<B>(device);

    pb.set_message("Denoising...");
    pb.set_position(5);
    let start = Instant::now();
    let mut step_start = Instant::now();
    let image = pipeline.generate_with_callback(
        &person,
        garment,
        &mask,
        &config,
        StepOutput::None,
        |step| {
            let progress = 5 + (step.step + 1) * 90 / step.total_steps;
            pb.set_position(progress as u64);
            pb.set_message(format!("Step {}/{}", step.step + 1, step.total_steps));

            if flags.timing {
                debug!(
                    "step {} (t={}): {:?}",
                    step.step,
                    step.timestep,
                    step_start.elapsed()
                );
                step_start = Instant::now();
            }
        },
    )?;
    if flags.timing {
        info!("inference ({} steps): {:?}", config.steps, start.elapsed());
    }

    pb.set_message("Saving image...");
    pb.set_position(97);
    image
        .save(&args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;
    pb.finish_and_clear();

    let output_path = args
        .output
        .canonicalize()
        .unwrap_or_else(|_| args.output.clone());
    println!("Saved to: {}", output_path.display());

    if flags.timing {
        info!("total: {:?}", total_start.elapsed());
    }
    Ok(())
}

fn run_prepare(inputs: &InputArgs, out_dir: &Path) -> Result<()> {
    let (person, garment, mask) = inputs.load()?;
    let canonical = CanonicalImages::prepare(
        &person,
        garment,
        &mask,
        inputs.width as u32,
        inputs.height as u32,
    )?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    canonical.person.save(out_dir.join("person.png"))?;
    canonical.garment.save(out_dir.join("garment.png"))?;
    canonical.mask.save(out_dir.join("mask.png"))?;

    let (w, h) = canonical.dimensions();
    println!("Wrote {}x{} inputs to {}", w, h, out_dir.display());
    Ok(())
}

/// Server with a specific backend
#[cfg(feature = "serve")]
fn run_serve_impl<B: Backend>(
    config: &burn_tryon::serve::ServeConfig,
    device: &B::Device,
) -> Result<()> {
    config.pipeline.validate(8)?;
    let pipeline = reference_pipeline::<B>(device);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    runtime.block_on(burn_tryon::serve::run_server(pipeline, config.clone()))?;
    Ok(())
}

fn print_info() {
    println!("burn-tryon: Virtual try-on in pure Rust\n");
    println!("Available backends:");
    for name in ["ndarray", "wgpu", "tch", "cuda"] {
        let enabled = backends::enabled_backends().contains(&name);
        println!(
            "  - {} ({})",
            name,
            if enabled { "enabled" } else { "not enabled" }
        );
    }

    let config = TryOnConfig::default();
    println!("\nDefaults:");
    println!("  Size:      {}x{}", config.width, config.height);
    println!("  Steps:     {}", config.steps);
    println!("  Guidance:  {}", config.guidance_scale);
    println!("  Scheduler: {:?} (eta {})", config.scheduler, config.eta);

    println!("\nSchedulers:");
    println!("  - DDIM (ddim)");
    println!("  - Euler discrete (euler)");

    #[cfg(feature = "serve")]
    println!("\nServer: burn-tryon serve (POST /virtual_try_on)");
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Application entry point
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Generate(args) => {
            println!("burn-tryon: Virtual try-on in pure Rust\n");
            println!("Configuration:");
            println!("  Size:      {}x{}", args.inputs.width, args.inputs.height);
            println!("  Steps:     {}", args.steps);
            println!("  Guidance:  {}", args.guidance);
            println!("  Scheduler: {:?}", args.scheduler);
            println!("  Seed:      {:?}", args.seed);
            println!("  Precision: {:?}", args.precision);
            println!("  Device:    {:?}", args.device);
            println!();

            with_backend!(args.device, args.precision, run_generate_impl(&args))
        }

        Commands::Prepare { inputs, out_dir } => run_prepare(&inputs, &out_dir),

        #[cfg(feature = "serve")]
        Commands::Serve(args) => {
            let config = args.to_config()?;
            with_backend!(args.device, args.precision, run_serve_impl(&config))
        }

        Commands::Info => {
            print_info();
            Ok(())
        }
    }
}

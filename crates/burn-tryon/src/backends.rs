//! Compute backends enabled through cargo features
//!
//! - `ndarray`: CPU (default)
//! - `tch`: libtorch, CUDA when available
//! - `wgpu`: WebGPU
//! - `cuda`: native CUDA

#[cfg(feature = "ndarray")]
pub use burn_ndarray::{NdArray, NdArrayDevice};

#[cfg(feature = "tch")]
pub use burn_tch::{LibTorch, LibTorchDevice};

#[cfg(feature = "wgpu")]
pub use burn_wgpu::{Wgpu, WgpuDevice};

#[cfg(feature = "cuda")]
pub use burn_cuda::{Cuda, CudaDevice};

/// First CUDA device when libtorch sees one, else CPU
#[cfg(feature = "tch")]
pub fn tch_device() -> LibTorchDevice {
    if burn_tch::is_cuda_available() {
        LibTorchDevice::Cuda(0)
    } else {
        LibTorchDevice::Cpu
    }
}

/// Whether a WGPU adapter can be created
#[cfg(feature = "wgpu")]
pub fn wgpu_available() -> bool {
    // WgpuDevice::default() may panic without an adapter
    std::panic::catch_unwind(|| {
        let _ = WgpuDevice::default();
    })
    .is_ok()
}

/// Names of the backends compiled into this build
pub fn enabled_backends() -> Vec<&'static str> {
    let mut names = Vec::new();
    if cfg!(feature = "ndarray") {
        names.push("ndarray");
    }
    if cfg!(feature = "tch") {
        names.push("tch");
    }
    if cfg!(feature = "wgpu") {
        names.push("wgpu");
    }
    if cfg!(feature = "cuda") {
        names.push("cuda");
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_backends_match_features() {
        let names = enabled_backends();
        assert_eq!(names.contains(&"ndarray"), cfg!(feature = "ndarray"));
        assert_eq!(names.contains(&"tch"), cfg!(feature = "tch"));
        assert_eq!(names.contains(&"wgpu"), cfg!(feature = "wgpu"));
    }

    #[test]
    #[cfg(feature = "ndarray")]
    fn test_cpu_backend_runs_pipeline() {
        let pipeline = crate::TryOnPipeline::<NdArray<f32>>::reference(&NdArrayDevice::Cpu);
        assert_eq!(pipeline.schedule().num_train_steps(), 1000);
    }

    #[test]
    #[cfg(feature = "tch")]
    fn test_tch_device_follows_cuda_availability() {
        let cuda = matches!(tch_device(), LibTorchDevice::Cuda(_));
        assert_eq!(cuda, burn_tch::is_cuda_available());
    }
}

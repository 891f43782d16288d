use burn::backend::ndarray::{NdArray, NdArrayDevice};

/// Default CPU backend (single precision).
pub type CpuBackend = NdArray<f32>;

pub fn init_cpu_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

#[cfg(feature = "gpu")]
pub type WgpuBackend = burn::backend::Wgpu;

#[cfg(feature = "gpu")]
pub fn init_gpu_device() -> burn::backend::wgpu::WgpuDevice {
    // Metal is picked automatically on macOS when available
    burn::backend::wgpu::WgpuDevice::default()
}

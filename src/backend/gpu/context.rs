use anyhow::Context as _;

use crate::config::BackendOptions;

/// Headless device and queue.
///
/// Recognised options: `power_preference` (`low` / `high`) and
/// `force_fallback_adapter` (`true` / `false`).
#[derive(Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn new(options: &BackendOptions) -> anyhow::Result<Self> {
        // The instance is a handle to our GPU
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::debug!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let power_preference = match options.get("power_preference") {
            Some("high") => wgpu::PowerPreference::HighPerformance,
            Some("low") => wgpu::PowerPreference::LowPower,
            _ => wgpu::PowerPreference::default(),
        };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: options
                    .get_parsed("force_fallback_adapter")
                    .unwrap_or(false),
            })
            .await
            .context("no suitable GPU adapter")?;
        let adapter_info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("interactive-3d device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await
            .context("requesting a device")?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }
}

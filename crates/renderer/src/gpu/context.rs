use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::types::RendererError;

pub(crate) struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    /// Adapter supports device-side timestamps and the device was created
    /// with them enabled.
    pub timestamps: bool,
}

impl GpuContext {
    pub(crate) fn new(window: Arc<Window>) -> Result<Self, RendererError> {
        let initial_size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|err| graphics(format!("failed to create rendering surface: {err}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| graphics(format!("failed to find a suitable GPU adapter: {err}")))?;

        let adapter_info = adapter.get_info();
        let timestamps = adapter
            .features()
            .contains(wgpu::Features::TIMESTAMP_QUERY);
        tracing::info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            timestamps,
            "selected GPU adapter"
        );

        let mut required_features = wgpu::Features::empty();
        if timestamps {
            required_features |= wgpu::Features::TIMESTAMP_QUERY;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("vas device"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|err| graphics(format!("failed to create GPU device: {err}")))?;

        let size = PhysicalSize::new(initial_size.width.max(1), initial_size.height.max(1));
        let mut config = surface
            .get_default_config(&adapter, size.width, size.height)
            .ok_or_else(|| graphics("surface is not supported by the selected adapter".into()))?;
        config.present_mode = uncapped_present_mode(&surface.get_capabilities(&adapter).present_modes);
        surface.configure(&device, &config);
        tracing::debug!(format = ?config.format, present_mode = ?config.present_mode, "configured surface");

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            timestamps,
        })
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Re-applies the current configuration after the surface was lost.
    pub(crate) fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}

/// Prefers modes that do not wait for vblank so the measured frame rate is
/// not capped at the display refresh rate. Fifo is always available.
fn uncapped_present_mode(modes: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

fn graphics(message: String) -> RendererError {
    RendererError::GraphicsContext(message)
}

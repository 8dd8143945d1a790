use crate::error::GraphicsInitError;

/// Device and queue the pipeline records into. Window and surface creation
/// stay with the caller; [`GpuContext::headless`] exists for tests and the
/// demo binary.
#[derive(Clone)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    pub async fn headless() -> Result<Self, GraphicsInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        let mut limits = wgpu::Limits::default().using_resolution(adapter.limits());
        limits.max_bind_groups = limits.max_bind_groups.max(4);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("DeferredDevice"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self { device, queue })
    }

    /// Runs `build` inside validation and out-of-memory error scopes and
    /// turns any captured error into [`GraphicsInitError::Validation`].
    ///
    /// Blocks on the scope futures; only call this outside the frame path.
    pub(crate) fn validated<T>(
        &self,
        label: &str,
        build: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, GraphicsInitError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = build(&self.device);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            Some(err) => Err(GraphicsInitError::Validation {
                label: label.to_owned(),
                message: err.to_string(),
            }),
            None => Ok(value),
        }
    }
}

use crate::error::GraphicsInitError;
use crate::renderer::context::GpuContext;
use crate::renderer::internal::buffers::MemoryAccounting;

pub(crate) const SCENE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Offscreen images owned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// Albedo during the geometry pass, fogged final color afterwards.
    Diffuse,
    Normal,
    WorldPosition,
    Ssao,
    SsaoPing,
    Light,
    ShadowDepth,
}

impl RenderTarget {
    pub const COUNT: usize = 7;

    pub const ALL: [RenderTarget; Self::COUNT] = [
        RenderTarget::Diffuse,
        RenderTarget::Normal,
        RenderTarget::WorldPosition,
        RenderTarget::Ssao,
        RenderTarget::SsaoPing,
        RenderTarget::Light,
        RenderTarget::ShadowDepth,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Preferred format. `WorldPosition` drops to half precision on devices
    /// that cannot render to it.
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            RenderTarget::Diffuse => wgpu::TextureFormat::Rgba8Unorm,
            RenderTarget::Normal => wgpu::TextureFormat::Rgba16Float,
            RenderTarget::WorldPosition => wgpu::TextureFormat::Rgba32Float,
            RenderTarget::Ssao | RenderTarget::SsaoPing => wgpu::TextureFormat::R8Unorm,
            RenderTarget::Light => wgpu::TextureFormat::Rgba16Float,
            RenderTarget::ShadowDepth => wgpu::TextureFormat::Depth32Float,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderTarget::Diffuse => "DiffuseTarget",
            RenderTarget::Normal => "NormalTarget",
            RenderTarget::WorldPosition => "WorldPositionTarget",
            RenderTarget::Ssao => "SsaoTarget",
            RenderTarget::SsaoPing => "SsaoPingTarget",
            RenderTarget::Light => "LightTarget",
            RenderTarget::ShadowDepth => "ShadowDepthTarget",
        }
    }

    /// Value the target holds after the frame's clear stage. SSAO targets
    /// clear to 1.0 (fully unoccluded) so lighting reads no occlusion when
    /// the SSAO stage is skipped.
    pub fn clear_value(self) -> f64 {
        match self {
            RenderTarget::Ssao | RenderTarget::SsaoPing | RenderTarget::ShadowDepth => 1.0,
            _ => 0.0,
        }
    }

    pub fn is_depth(self) -> bool {
        self.format().is_depth_stencil_format()
    }
}

pub(crate) const POSITION_FALLBACK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Picks the world-position format by creating a one-texel attachment of
/// the preferred format under an error scope.
pub(crate) fn world_position_format(context: &GpuContext) -> wgpu::TextureFormat {
    let preferred = RenderTarget::WorldPosition.format();
    let created = context.validated("WorldPositionFormat", |device| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("WorldPositionFormatCheck"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: preferred,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        })
    });
    match created {
        Ok(texture) => {
            texture.destroy();
            preferred
        }
        Err(err) => {
            log::warn!(
                "{:?} is not renderable here ({}). Storing world positions as {:?}.",
                preferred,
                err,
                POSITION_FALLBACK_FORMAT
            );
            POSITION_FALLBACK_FORMAT
        }
    }
}

/// Resolution of every target for one output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TargetSizes {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) ssao: (u32, u32),
    pub(crate) shadow: u32,
}

impl TargetSizes {
    pub(crate) fn extent(&self, target: RenderTarget) -> (u32, u32) {
        match target {
            RenderTarget::Ssao | RenderTarget::SsaoPing => self.ssao,
            RenderTarget::ShadowDepth => (self.shadow, self.shadow),
            _ => (self.width, self.height),
        }
    }

    pub(crate) fn validate(&self, limit: u32) -> Result<(), GraphicsInitError> {
        let shadow = (self.shadow, self.shadow);
        for (width, height) in [(self.width, self.height), self.ssao, shadow] {
            if width == 0 || height == 0 || width > limit || height > limit {
                return Err(GraphicsInitError::InvalidTargetSize {
                    width,
                    height,
                    limit,
                });
            }
        }
        Ok(())
    }
}

struct TargetTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bytes: u64,
}

impl TargetTexture {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        format: wgpu::TextureFormat,
        (width, height): (u32, u32),
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let texel = format.block_copy_size(None).unwrap_or(4) as u64;
        let bytes = width as u64 * height as u64 * texel;
        accounting.acquire(label, bytes);

        Self {
            texture,
            view,
            bytes,
        }
    }

    fn destroy(self, label: &str, accounting: &mut MemoryAccounting) {
        self.texture.destroy();
        accounting.release(label, self.bytes);
    }
}

/// The fixed set of offscreen targets plus the scene depth buffer.
pub(crate) struct RenderTargets {
    targets: Vec<TargetTexture>,
    depth: TargetTexture,
    sizes: TargetSizes,
    position_format: wgpu::TextureFormat,
}

impl RenderTargets {
    pub(crate) fn new(
        device: &wgpu::Device,
        sizes: TargetSizes,
        position_format: wgpu::TextureFormat,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let format = |target: RenderTarget| match target {
            RenderTarget::WorldPosition => position_format,
            _ => target.format(),
        };
        let targets = RenderTarget::ALL
            .iter()
            .map(|&target| {
                TargetTexture::new(
                    device,
                    target.label(),
                    format(target),
                    sizes.extent(target),
                    accounting,
                )
            })
            .collect();
        let depth = TargetTexture::new(
            device,
            "SceneDepth",
            SCENE_DEPTH_FORMAT,
            (sizes.width, sizes.height),
            accounting,
        );

        log::info!(
            "Created render targets {}x{} (ssao {}x{}, shadow {})",
            sizes.width,
            sizes.height,
            sizes.ssao.0,
            sizes.ssao.1,
            sizes.shadow
        );

        Self {
            targets,
            depth,
            sizes,
            position_format,
        }
    }

    /// Destroys every target and recreates it at the new sizes.
    pub(crate) fn recreate(
        &mut self,
        device: &wgpu::Device,
        sizes: TargetSizes,
        accounting: &mut MemoryAccounting,
    ) {
        self.release(accounting);
        *self = Self::new(device, sizes, self.position_format, accounting);
    }

    pub(crate) fn release(&mut self, accounting: &mut MemoryAccounting) {
        for (target, texture) in RenderTarget::ALL.iter().zip(self.targets.drain(..)) {
            texture.destroy(target.label(), accounting);
        }
        self.depth.texture.destroy();
        accounting.release("SceneDepth", self.depth.bytes);
        self.depth.bytes = 0;
    }

    pub(crate) fn view(&self, target: RenderTarget) -> &wgpu::TextureView {
        &self.targets[target.index()].view
    }

    pub(crate) fn texture(&self, target: RenderTarget) -> &wgpu::Texture {
        &self.targets[target.index()].texture
    }

    pub(crate) fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }

    pub(crate) fn sizes(&self) -> TargetSizes {
        self.sizes
    }

    pub(crate) fn position_format(&self) -> wgpu::TextureFormat {
        self.position_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> TargetSizes {
        TargetSizes {
            width: 800,
            height: 600,
            ssao: (400, 300),
            shadow: 1024,
        }
    }

    #[test]
    fn ssao_targets_use_their_own_extent() {
        let sizes = sizes();
        assert_eq!(sizes.extent(RenderTarget::Ssao), (400, 300));
        assert_eq!(sizes.extent(RenderTarget::SsaoPing), (400, 300));
        assert_eq!(sizes.extent(RenderTarget::Normal), (800, 600));
        assert_eq!(sizes.extent(RenderTarget::ShadowDepth), (1024, 1024));
    }

    #[test]
    fn validate_rejects_zero_and_oversized_targets() {
        assert!(sizes().validate(2048).is_ok());
        assert!(matches!(
            sizes().validate(1000),
            Err(GraphicsInitError::InvalidTargetSize { width: 1024, .. })
        ));
        let zero = TargetSizes {
            width: 0,
            ..sizes()
        };
        assert!(zero.validate(2048).is_err());
    }

    #[test]
    fn gbuffer_fits_color_attachment_budget() {
        let bytes: u32 = [
            RenderTarget::Diffuse,
            RenderTarget::Normal,
            RenderTarget::WorldPosition,
        ]
        .iter()
        .map(|target| target.format().target_pixel_byte_cost().unwrap_or(0))
        .sum();
        assert!(bytes <= wgpu::Limits::default().max_color_attachment_bytes_per_sample);
    }

    fn gpu() -> Option<GpuContext> {
        pollster::block_on(GpuContext::headless()).ok()
    }

    #[test]
    fn chosen_position_format_builds_every_target() {
        let Some(context) = gpu() else {
            return;
        };
        let format = world_position_format(&context);
        assert!(
            format == RenderTarget::WorldPosition.format() || format == POSITION_FALLBACK_FORMAT
        );

        let mut accounting = MemoryAccounting::default();
        let targets = context
            .validated("RenderTargets", |device| {
                RenderTargets::new(device, sizes(), format, &mut accounting)
            })
            .expect("targets should be accepted");
        assert_eq!(targets.position_format(), format);
        assert_eq!(targets.texture(RenderTarget::WorldPosition).format(), format);
        assert!(accounting.current() > 0);
    }

    #[test]
    fn rejected_targets_surface_as_errors() {
        let Some(context) = gpu() else {
            return;
        };
        let limit = context.device.limits().max_texture_dimension_2d;
        let oversized = TargetSizes {
            width: limit + 1,
            height: 8,
            ssao: (4, 4),
            shadow: 16,
        };

        let mut accounting = MemoryAccounting::default();
        let result = context.validated("RenderTargets", |device| {
            RenderTargets::new(device, oversized, POSITION_FALLBACK_FORMAT, &mut accounting)
        });
        assert!(matches!(result, Err(GraphicsInitError::Validation { .. })));
    }

    #[test]
    fn position_fallback_is_renderable_without_downlevel_flags() {
        let features = POSITION_FALLBACK_FORMAT.guaranteed_format_features(wgpu::Features::empty());
        assert!(features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert_eq!(POSITION_FALLBACK_FORMAT.components(), 4);
    }

    #[test]
    fn target_indices_match_declaration_order() {
        for (index, target) in RenderTarget::ALL.iter().enumerate() {
            assert_eq!(target.index(), index);
        }
        assert!(RenderTarget::ShadowDepth.is_depth());
        assert!(!RenderTarget::Light.is_depth());
    }
}

use crate::renderer::internal::targets::{RenderTarget, SCENE_DEPTH_FORMAT};
use crate::renderer::vertex::Vertex;

/// Depth bias of shadow-map rasterization, in depth units and slope
/// multiples.
const SHADOW_CONSTANT_BIAS: i32 = 2;
const SHADOW_SLOPE_BIAS: f32 = 2.0;

/// Adds every light's contribution into the light target.
pub(crate) const ADDITIVE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// How a program's primitives are fed and culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Scene meshes, back faces culled.
    Mesh,
    /// Light sphere or cone. Front faces are culled so the camera may sit
    /// inside the volume.
    LightVolume,
    /// Vertex-index generated triangles, no vertex buffer.
    Fullscreen,
}

/// Builds the render programs of the deferred pipeline. Color attachments
/// are named by [`RenderTarget`] so formats always match the targets the
/// pass writes.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    shape: Shape,
    vertex_entry: &'a str,
    fragment_entry: Option<&'a str>,
    targets: Vec<Option<wgpu::ColorTargetState>>,
    depth: Option<wgpu::DepthStencilState>,
    constants: &'a [(&'a str, f64)],
}

impl<'a> PipelineBuilder<'a> {
    fn new(
        device: &'a wgpu::Device,
        label: &'a str,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
        shape: Shape,
        vertex_entry: &'a str,
    ) -> Self {
        Self {
            device,
            label,
            layout,
            shader,
            shape,
            vertex_entry,
            fragment_entry: None,
            targets: Vec::new(),
            depth: None,
            constants: &[],
        }
    }

    /// Program drawing scene meshes from `vertex_entry`.
    pub fn mesh(
        device: &'a wgpu::Device,
        label: &'a str,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
        vertex_entry: &'a str,
    ) -> Self {
        Self::new(device, label, layout, shader, Shape::Mesh, vertex_entry)
    }

    pub fn light_volume(
        device: &'a wgpu::Device,
        label: &'a str,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
        vertex_entry: &'a str,
    ) -> Self {
        Self::new(device, label, layout, shader, Shape::LightVolume, vertex_entry)
    }

    pub fn fullscreen(
        device: &'a wgpu::Device,
        label: &'a str,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
        vertex_entry: &'a str,
    ) -> Self {
        Self::new(device, label, layout, shader, Shape::Fullscreen, vertex_entry)
    }

    pub fn fragment(mut self, entry: &'a str) -> Self {
        self.fragment_entry = Some(entry);
        self
    }

    /// Appends color attachments in the order the fragment entry writes
    /// them.
    pub fn writes(self, targets: &[RenderTarget]) -> Self {
        targets
            .iter()
            .fold(self, |builder, target| builder.writes_format(target.format()))
    }

    /// Appends one color attachment whose format was resolved at runtime.
    pub fn writes_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.targets.push(Some(wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        }));
        self
    }

    /// Accumulates into every color attachment instead of overwriting.
    pub fn additive(mut self) -> Self {
        for target in self.targets.iter_mut().flatten() {
            target.blend = Some(ADDITIVE_BLEND);
        }
        self
    }

    /// Tests and writes the scene depth buffer.
    pub fn scene_depth(mut self) -> Self {
        self.depth = Some(wgpu::DepthStencilState {
            format: SCENE_DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });
        self
    }

    /// Renders into the shadow map with slope-scaled bias.
    pub fn shadow_depth(mut self) -> Self {
        self.depth = Some(wgpu::DepthStencilState {
            format: RenderTarget::ShadowDepth.format(),
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: SHADOW_CONSTANT_BIAS,
                slope_scale: SHADOW_SLOPE_BIAS,
                clamp: 0.0,
            },
        });
        self
    }

    /// Override constants baked into the program.
    pub fn constants(mut self, constants: &'a [(&'a str, f64)]) -> Self {
        self.constants = constants;
        self
    }

    pub fn build(self) -> wgpu::RenderPipeline {
        let vertex_layouts = match self.shape {
            Shape::Mesh | Shape::LightVolume => vec![Vertex::layout()],
            Shape::Fullscreen => Vec::new(),
        };
        let cull_mode = match self.shape {
            Shape::Mesh => Some(wgpu::Face::Back),
            Shape::LightVolume => Some(wgpu::Face::Front),
            Shape::Fullscreen => None,
        };
        let options = wgpu::PipelineCompilationOptions {
            constants: self.constants,
            zero_initialize_workgroup_memory: true,
        };

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(self.label),
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: self.shader,
                    entry_point: Some(self.vertex_entry),
                    buffers: &vertex_layouts,
                    compilation_options: options.clone(),
                },
                fragment: self.fragment_entry.map(|entry| wgpu::FragmentState {
                    module: self.shader,
                    entry_point: Some(entry),
                    targets: &self.targets,
                    compilation_options: options,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    ..Default::default()
                },
                depth_stencil: self.depth,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }
}

use std::ops::Range;

use crate::error::GraphicsInitError;
use crate::renderer::context::GpuContext;
use crate::renderer::internal::buffers::{storage_layout_entry, DynamicBuffer, MemoryAccounting};
use crate::renderer::internal::shaders::{ShaderLibrary, ShaderProgram};
use crate::renderer::internal::targets::{RenderTarget, RenderTargets};
use crate::renderer::lights::LightRaw;
use crate::renderer::mesh::Mesh;
use crate::renderer::passes::{begin_color_pass, texture_entry, view_entry};
use crate::renderer::pipeline_builder::PipelineBuilder;

/// Light volumes, unshadowed directional lights and ambient, all added into
/// the light target.
pub(crate) struct LightingPass {
    lights: DynamicBuffer<LightRaw>,
    lights_layout: wgpu::BindGroupLayout,
    lights_bind_group: wgpu::BindGroup,
    gbuffer_layout: wgpu::BindGroupLayout,
    gbuffer_bind_group: wgpu::BindGroup,
    linear_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    pipeline_layout: wgpu::PipelineLayout,
    point_pipeline: wgpu::RenderPipeline,
    spot_pipeline: wgpu::RenderPipeline,
    directional_pipeline: wgpu::RenderPipeline,
    ambient_pipeline: wgpu::RenderPipeline,
    ambient_strength: f32,
    sphere: Mesh,
    cone: Mesh,
}

impl LightingPass {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        context: &GpuContext,
        shaders: &ShaderLibrary,
        view_layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
        sphere: Mesh,
        cone: Mesh,
        light_capacity: usize,
        ambient_strength: f32,
        accounting: &mut MemoryAccounting,
    ) -> Result<Self, GraphicsInitError> {
        let device = &context.device;
        let lights = DynamicBuffer::new(
            device,
            "LightBuffer",
            wgpu::BufferUsages::STORAGE,
            light_capacity,
            accounting,
        );
        let lights_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LightsBindLayout"),
            entries: &[storage_layout_entry(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
        });
        let lights_bind_group = Self::create_lights_bind_group(device, &lights_layout, &lights);

        let gbuffer_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LightingGBufferLayout"),
            entries: &[
                texture_entry(0, false),
                texture_entry(1, false),
                texture_entry(2, false),
                texture_entry(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("LightingLinearSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let gbuffer_bind_group = Self::create_gbuffer_bind_group(
            device,
            &gbuffer_layout,
            targets,
            &linear_sampler,
            &shadow_sampler,
        );

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("LightingPipelineLayout"),
            bind_group_layouts: &[view_layout, &gbuffer_layout, &lights_layout],
            push_constant_ranges: &[],
        });

        let shader = shaders.module(ShaderProgram::Lighting);
        let volume = |label: &str, fragment: &str| {
            PipelineBuilder::light_volume(device, label, &pipeline_layout, shader, "vs_volume")
                .fragment(fragment)
                .writes(&[RenderTarget::Light])
                .additive()
                .build()
        };
        let point_pipeline = volume("PointLightPipeline", "fs_point");
        let spot_pipeline = volume("SpotLightPipeline", "fs_spot");
        let directional_pipeline = PipelineBuilder::fullscreen(
            device,
            "DirectionalLightPipeline",
            &pipeline_layout,
            shader,
            "vs_fullscreen",
        )
        .fragment("fs_directional")
        .writes(&[RenderTarget::Light])
        .additive()
        .build();
        let ambient_pipeline =
            Self::build_ambient(context, shaders, &pipeline_layout, ambient_strength)?;

        Ok(Self {
            lights,
            lights_layout,
            lights_bind_group,
            gbuffer_layout,
            gbuffer_bind_group,
            linear_sampler,
            shadow_sampler,
            pipeline_layout,
            point_pipeline,
            spot_pipeline,
            directional_pipeline,
            ambient_pipeline,
            ambient_strength,
            sphere,
            cone,
        })
    }

    fn create_lights_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        lights: &DynamicBuffer<LightRaw>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LightsBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: lights.buffer().as_entire_binding(),
            }],
        })
    }

    fn create_gbuffer_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
        linear_sampler: &wgpu::Sampler,
        shadow_sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LightingGBufferBindGroup"),
            layout,
            entries: &[
                view_entry(0, targets.view(RenderTarget::WorldPosition)),
                view_entry(1, targets.view(RenderTarget::Normal)),
                view_entry(2, targets.view(RenderTarget::Diffuse)),
                view_entry(3, targets.view(RenderTarget::Ssao)),
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(linear_sampler),
                },
                view_entry(5, targets.view(RenderTarget::ShadowDepth)),
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(shadow_sampler),
                },
            ],
        })
    }

    fn build_ambient(
        context: &GpuContext,
        shaders: &ShaderLibrary,
        layout: &wgpu::PipelineLayout,
        strength: f32,
    ) -> Result<wgpu::RenderPipeline, GraphicsInitError> {
        let constants = [("AMBIENT_STRENGTH", strength as f64)];
        context.validated("AmbientPipeline", |device| {
            PipelineBuilder::fullscreen(
                device,
                "AmbientPipeline",
                layout,
                shaders.module(ShaderProgram::Lighting),
                "vs_fullscreen",
            )
            .fragment("fs_ambient")
            .writes(&[RenderTarget::Light])
            .additive()
            .constants(&constants)
            .build()
        })
    }

    /// Bakes a new ambient strength. On failure the previous program stays.
    pub(crate) fn rebuild_ambient(
        &mut self,
        context: &GpuContext,
        shaders: &ShaderLibrary,
        strength: f32,
    ) -> Result<(), GraphicsInitError> {
        if !(strength.is_finite() && strength >= 0.0) {
            return Err(GraphicsInitError::Validation {
                label: "AmbientPipeline".to_owned(),
                message: format!("ambient strength {strength} must be finite and non-negative"),
            });
        }
        self.ambient_pipeline =
            Self::build_ambient(context, shaders, &self.pipeline_layout, strength)?;
        self.ambient_strength = strength;
        log::info!("Rebuilt ambient program with strength {strength}");
        Ok(())
    }

    /// Strength baked into the current ambient program.
    pub(crate) fn ambient_strength(&self) -> f32 {
        self.ambient_strength
    }

    pub(crate) fn rebind(&mut self, device: &wgpu::Device, targets: &RenderTargets) {
        self.gbuffer_bind_group = Self::create_gbuffer_bind_group(
            device,
            &self.gbuffer_layout,
            targets,
            &self.linear_sampler,
            &self.shadow_sampler,
        );
    }

    pub(crate) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        lights: &[LightRaw],
        accounting: &mut MemoryAccounting,
    ) {
        let staged = self.lights.staged_mut();
        staged.clear();
        staged.extend_from_slice(lights);
        if self.lights.upload(device, queue, accounting) {
            self.lights_bind_group =
                Self::create_lights_bind_group(device, &self.lights_layout, &self.lights);
        }
    }

    pub(crate) fn light_capacity(&self) -> usize {
        self.lights.capacity()
    }

    pub(crate) fn gbuffer_layout(&self) -> &wgpu::BindGroupLayout {
        &self.gbuffer_layout
    }

    pub(crate) fn lights_layout(&self) -> &wgpu::BindGroupLayout {
        &self.lights_layout
    }

    /// Groups 1 and 2, shared with the shadowed directional program.
    pub(crate) fn bind_inputs(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_bind_group(1, &self.gbuffer_bind_group, &[]);
        pass.set_bind_group(2, &self.lights_bind_group, &[]);
    }

    fn record_volumes(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
        view_bind_group: &wgpu::BindGroup,
        pipeline: &wgpu::RenderPipeline,
        mesh: &Mesh,
        lights: Range<u32>,
    ) -> u32 {
        let mut pass = begin_color_pass(encoder, label, target);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, view_bind_group, &[]);
        self.bind_inputs(&mut pass);
        pass.set_vertex_buffer(0, mesh.vbuf.slice(..));
        pass.set_index_buffer(mesh.ibuf.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, lights);
        1
    }

    pub(crate) fn record_spot(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        view_bind_group: &wgpu::BindGroup,
        lights: Range<u32>,
    ) -> u32 {
        self.record_volumes(
            encoder,
            "SpotLightPass",
            target,
            view_bind_group,
            &self.spot_pipeline,
            &self.cone,
            lights,
        )
    }

    pub(crate) fn record_point(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        view_bind_group: &wgpu::BindGroup,
        lights: Range<u32>,
    ) -> u32 {
        self.record_volumes(
            encoder,
            "PointLightPass",
            target,
            view_bind_group,
            &self.point_pipeline,
            &self.sphere,
            lights,
        )
    }

    /// One fullscreen triangle per light, instanced.
    pub(crate) fn record_directional(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        view_bind_group: &wgpu::BindGroup,
        lights: Range<u32>,
    ) {
        let mut pass = begin_color_pass(encoder, "DirectionalLightPass", target);
        pass.set_pipeline(&self.directional_pipeline);
        pass.set_bind_group(0, view_bind_group, &[]);
        self.bind_inputs(&mut pass);
        pass.draw(0..3, lights);
    }

    pub(crate) fn record_ambient(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        view_bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = begin_color_pass(encoder, "AmbientPass", target);
        pass.set_pipeline(&self.ambient_pipeline);
        pass.set_bind_group(0, view_bind_group, &[]);
        self.bind_inputs(&mut pass);
        pass.draw(0..3, 0..1);
    }

    pub(crate) fn release(&mut self, accounting: &mut MemoryAccounting) {
        self.lights.release(accounting);
        self.sphere.release(accounting);
        self.cone.release(accounting);
    }
}

use crate::error::GraphicsInitError;
use crate::renderer::context::GpuContext;
use crate::renderer::internal::shaders::{ShaderLibrary, ShaderProgram};
use crate::renderer::internal::targets::{RenderTarget, RenderTargets};
use crate::renderer::passes::{begin_color_pass, texture_entry, view_entry};
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::tunables::FogParams;

struct FogPrograms {
    composite: wgpu::RenderPipeline,
    sky: wgpu::RenderPipeline,
}

/// Fog composite of Light and WorldPosition into Diffuse, plus the sky dome.
/// Fog values are baked into both programs.
pub(crate) struct CompositePass {
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    pipeline_layout: wgpu::PipelineLayout,
    programs: FogPrograms,
    fog: FogParams,
}

impl CompositePass {
    pub(crate) fn new(
        context: &GpuContext,
        shaders: &ShaderLibrary,
        view_layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
        fog: &FogParams,
    ) -> Result<Self, GraphicsInitError> {
        let device = &context.device;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CompositeBindLayout"),
            entries: &[texture_entry(0, false), texture_entry(1, false)],
        });
        let bind_group = Self::create_bind_group(device, &layout, targets);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("CompositePipelineLayout"),
            bind_group_layouts: &[view_layout, &layout],
            push_constant_ranges: &[],
        });
        let programs = Self::build_programs(context, shaders, &pipeline_layout, fog)?;

        Ok(Self {
            layout,
            bind_group,
            pipeline_layout,
            programs,
            fog: *fog,
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CompositeBindGroup"),
            layout,
            entries: &[
                view_entry(0, targets.view(RenderTarget::Light)),
                view_entry(1, targets.view(RenderTarget::WorldPosition)),
            ],
        })
    }

    fn build_programs(
        context: &GpuContext,
        shaders: &ShaderLibrary,
        layout: &wgpu::PipelineLayout,
        fog: &FogParams,
    ) -> Result<FogPrograms, GraphicsInitError> {
        let constants = fog.constants();
        context.validated("FogComposite", |device| {
            let build = |label: &str, fragment: &str| {
                PipelineBuilder::fullscreen(
                    device,
                    label,
                    layout,
                    shaders.module(ShaderProgram::Composite),
                    "vs_fullscreen",
                )
                .fragment(fragment)
                .writes(&[RenderTarget::Diffuse])
                .constants(&constants)
                .build()
            };
            FogPrograms {
                composite: build("FogCompositePipeline", "fs_composite"),
                sky: build("SkyDomePipeline", "fs_sky"),
            }
        })
    }

    /// Bakes new fog values. On failure the previous programs stay.
    pub(crate) fn rebuild(
        &mut self,
        context: &GpuContext,
        shaders: &ShaderLibrary,
        fog: &FogParams,
    ) -> Result<(), GraphicsInitError> {
        self.programs = Self::build_programs(context, shaders, &self.pipeline_layout, fog)?;
        self.fog = *fog;
        log::info!(
            "Rebuilt fog programs: color {:?}, distance {}..{}",
            fog.color,
            fog.min_distance,
            fog.max_distance
        );
        Ok(())
    }

    /// Fog values baked into the current programs.
    pub(crate) fn fog(&self) -> FogParams {
        self.fog
    }

    pub(crate) fn rebind(&mut self, device: &wgpu::Device, targets: &RenderTargets) {
        self.bind_group = Self::create_bind_group(device, &self.layout, targets);
    }

    fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        targets: &RenderTargets,
        view_bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = begin_color_pass(encoder, label, targets.view(RenderTarget::Diffuse));
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, view_bind_group, &[]);
        pass.set_bind_group(1, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub(crate) fn record_composite(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
        view_bind_group: &wgpu::BindGroup,
    ) {
        self.record(
            encoder,
            "FogCompositePass",
            &self.programs.composite,
            targets,
            view_bind_group,
        );
    }

    pub(crate) fn record_sky(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
        view_bind_group: &wgpu::BindGroup,
    ) {
        self.record(
            encoder,
            "SkyDomePass",
            &self.programs.sky,
            targets,
            view_bind_group,
        );
    }
}

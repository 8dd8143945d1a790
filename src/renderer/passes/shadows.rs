use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::renderer::camera::ViewUniform;
use crate::renderer::internal::buffers::{
    uniform_layout_entry, MemoryAccounting, UniformBuffer, ViewBuffer,
};
use crate::renderer::internal::shaders::{ShaderLibrary, ShaderProgram};
use crate::renderer::internal::targets::RenderTarget;
use crate::renderer::lights::DirectionalLight;
use crate::renderer::passes::lighting::LightingPass;
use crate::renderer::passes::begin_color_pass;
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::plan::CascadePlan;

pub(crate) const MAX_CASCADES: usize = 2;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct CascadeUniform {
    view_proj: [[f32; 4]; 4],
    direction: [f32; 4],
    color_intensity: [f32; 4],
    /// border, cascade index, cascade count, shadow-map texel size
    params: [f32; 4],
}

fn light_view(view_projection: &Mat4) -> ViewUniform {
    ViewUniform {
        view_proj: view_projection.to_cols_array_2d(),
        view: Mat4::IDENTITY.to_cols_array_2d(),
        inv_view_proj: view_projection.inverse().to_cols_array_2d(),
        position: [0.0, 0.0, 0.0, 1.0],
        viewport: [0.0; 4],
    }
}

struct CascadeSlot {
    view: UniformBuffer<ViewUniform>,
    view_bind_group: wgpu::BindGroup,
    lighting: UniformBuffer<CascadeUniform>,
    lighting_bind_group: wgpu::BindGroup,
}

/// Per-cascade light views and the shadowed directional program. The
/// depth-only rendering itself is the geometry machinery's.
pub(crate) struct ShadowPass {
    cascades: Vec<CascadeSlot>,
    pipeline: wgpu::RenderPipeline,
}

impl ShadowPass {
    pub(crate) fn new(
        device: &wgpu::Device,
        shaders: &ShaderLibrary,
        view_buffer: &ViewBuffer,
        lighting: &LightingPass,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let cascade_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CascadeBindLayout"),
            entries: &[uniform_layout_entry::<CascadeUniform>(
                0,
                wgpu::ShaderStages::FRAGMENT,
            )],
        });

        let cascades = (0..MAX_CASCADES)
            .map(|_| {
                let view = UniformBuffer::new(
                    device,
                    "CascadeView",
                    &light_view(&Mat4::IDENTITY),
                    accounting,
                );
                let view_bind_group = view_buffer.bind(device, "CascadeViewBindGroup", &view);
                let lighting = UniformBuffer::new(
                    device,
                    "CascadeLighting",
                    &CascadeUniform::zeroed(),
                    accounting,
                );
                let lighting_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("CascadeBindGroup"),
                    layout: &cascade_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: lighting.binding(),
                    }],
                });
                CascadeSlot {
                    view,
                    view_bind_group,
                    lighting,
                    lighting_bind_group,
                }
            })
            .collect();

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ShadowedLightPipelineLayout"),
            bind_group_layouts: &[
                &view_buffer.bind_layout,
                lighting.gbuffer_layout(),
                lighting.lights_layout(),
                &cascade_layout,
            ],
            push_constant_ranges: &[],
        });
        let pipeline =
            PipelineBuilder::fullscreen(
                device,
                "ShadowedLightPipeline",
                &layout,
                shaders.module(ShaderProgram::Lighting),
                "vs_fullscreen",
            )
            .fragment("fs_shadowed")
            .writes(&[RenderTarget::Light])
            .additive()
            .build();

        Self { cascades, pipeline }
    }

    /// Writes the light views and lighting blocks of this frame's cascades.
    pub(crate) fn write(
        &self,
        queue: &wgpu::Queue,
        cascades: &[CascadePlan],
        light: &DirectionalLight,
        border: f32,
        shadow_map_size: u32,
    ) {
        let direction = light
            .direction
            .try_normalize()
            .unwrap_or(glam::Vec3::NEG_Y)
            .extend(0.0)
            .to_array();
        let texel = 1.0 / shadow_map_size.max(1) as f32;

        for (index, (slot, cascade)) in self.cascades.iter().zip(cascades).enumerate() {
            slot.view.write(queue, &light_view(&cascade.view_projection));
            slot.lighting.write(
                queue,
                &CascadeUniform {
                    view_proj: cascade.view_projection.to_cols_array_2d(),
                    direction,
                    color_intensity: light.color.extend(light.intensity).to_array(),
                    params: [border, index as f32, cascades.len() as f32, texel],
                },
            );
        }
    }

    pub(crate) fn view_bind_group(&self, cascade: usize) -> Option<&wgpu::BindGroup> {
        self.cascades.get(cascade).map(|slot| &slot.view_bind_group)
    }

    /// Adds one cascade's share of the shadowed light into `target`.
    pub(crate) fn record_lighting(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        view_bind_group: &wgpu::BindGroup,
        lighting: &LightingPass,
        cascade: usize,
    ) {
        let Some(slot) = self.cascades.get(cascade) else {
            log::warn!("No shadow cascade slot {cascade}");
            return;
        };
        let mut pass = begin_color_pass(encoder, "ShadowedLightPass", target);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, view_bind_group, &[]);
        lighting.bind_inputs(&mut pass);
        pass.set_bind_group(3, &slot.lighting_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub(crate) fn release(&self, accounting: &mut MemoryAccounting) {
        for slot in &self.cascades {
            slot.view.release(accounting);
            slot.lighting.release(accounting);
        }
    }
}

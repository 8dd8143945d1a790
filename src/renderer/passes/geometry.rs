use crate::asset::AssetCache;
use crate::renderer::internal::buffers::{storage_layout_entry, DynamicBuffer, MemoryAccounting};
use crate::renderer::internal::shaders::{ShaderLibrary, ShaderProgram};
use crate::renderer::internal::targets::RenderTarget;
use crate::renderer::material::MaterialSet;
use crate::renderer::mesh::Mesh;
use crate::renderer::passes::{draw_items, DrawCounts};
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::plan::{DrawList, FramePlan, InstanceRaw};

type JointRaw = [[f32; 4]; 4];

/// The geometry machinery: instance and joint arrays plus the G-buffer and
/// depth-only programs that read them.
pub(crate) struct GeometryPass {
    instances: DynamicBuffer<InstanceRaw>,
    joints: DynamicBuffer<JointRaw>,
    objects_layout: wgpu::BindGroupLayout,
    objects_bind_group: wgpu::BindGroup,
    gbuffer_pipeline: wgpu::RenderPipeline,
    depth_pipeline: wgpu::RenderPipeline,
}

impl GeometryPass {
    pub(crate) fn new(
        device: &wgpu::Device,
        shaders: &ShaderLibrary,
        view_layout: &wgpu::BindGroupLayout,
        material_layout: &wgpu::BindGroupLayout,
        position_format: wgpu::TextureFormat,
        instance_capacity: usize,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let instances = DynamicBuffer::new(
            device,
            "InstanceBuffer",
            wgpu::BufferUsages::STORAGE,
            instance_capacity,
            accounting,
        );
        let joints = DynamicBuffer::new(
            device,
            "JointBuffer",
            wgpu::BufferUsages::STORAGE,
            instance_capacity,
            accounting,
        );

        let objects_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ObjectsBindLayout"),
            entries: &[
                storage_layout_entry(0, wgpu::ShaderStages::VERTEX),
                storage_layout_entry(1, wgpu::ShaderStages::VERTEX),
            ],
        });
        let objects_bind_group =
            Self::create_objects_bind_group(device, &objects_layout, &instances, &joints);

        let shader = shaders.module(ShaderProgram::Geometry);
        let gbuffer_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GBufferPipelineLayout"),
            bind_group_layouts: &[view_layout, &objects_layout, material_layout],
            push_constant_ranges: &[],
        });
        let gbuffer_pipeline =
            PipelineBuilder::mesh(device, "GBufferPipeline", &gbuffer_layout, shader, "vs_main")
                .fragment("fs_main")
                .writes(&[RenderTarget::Diffuse, RenderTarget::Normal])
                .writes_format(position_format)
                .scene_depth()
                .build();

        let depth_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ShadowDepthPipelineLayout"),
            bind_group_layouts: &[view_layout, &objects_layout],
            push_constant_ranges: &[],
        });
        let depth_pipeline =
            PipelineBuilder::mesh(device, "ShadowDepthPipeline", &depth_layout, shader, "vs_depth")
                .shadow_depth()
                .build();

        Self {
            instances,
            joints,
            objects_layout,
            objects_bind_group,
            gbuffer_pipeline,
            depth_pipeline,
        }
    }

    fn create_objects_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        instances: &DynamicBuffer<InstanceRaw>,
        joints: &DynamicBuffer<JointRaw>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ObjectsBindGroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: instances.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: joints.buffer().as_entire_binding(),
                },
            ],
        })
    }

    /// Stages the frame's instance and joint records, growing either buffer
    /// first when they no longer fit.
    pub(crate) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        plan: &FramePlan,
        accounting: &mut MemoryAccounting,
    ) {
        let staged = self.instances.staged_mut();
        staged.clear();
        staged.extend_from_slice(&plan.instances);

        let staged = self.joints.staged_mut();
        staged.clear();
        staged.extend_from_slice(&plan.joints);

        let instances_grown = self.instances.upload(device, queue, accounting);
        let joints_grown = self.joints.upload(device, queue, accounting);
        if instances_grown || joints_grown {
            self.objects_bind_group = Self::create_objects_bind_group(
                device,
                &self.objects_layout,
                &self.instances,
                &self.joints,
            );
        }
    }

    pub(crate) fn instance_capacity(&self) -> usize {
        self.instances.capacity()
    }

    /// Fills Diffuse, Normal and WorldPosition; the targets were cleared by
    /// the frame's clear stage.
    pub(crate) fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: [&wgpu::TextureView; 3],
        depth: &wgpu::TextureView,
        view_bind_group: &wgpu::BindGroup,
        draws: &DrawList,
        meshes: &AssetCache<Mesh>,
        materials: &AssetCache<MaterialSet>,
    ) -> DrawCounts {
        let attachment = |view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("GeometryPass"),
            color_attachments: &[
                attachment(targets[0]),
                attachment(targets[1]),
                attachment(targets[2]),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.gbuffer_pipeline);
        pass.set_bind_group(0, view_bind_group, &[]);
        pass.set_bind_group(1, &self.objects_bind_group, &[]);

        DrawCounts {
            singles: draw_items(&mut pass, &draws.singles, meshes, materials, true),
            batches: draw_items(&mut pass, &draws.batches, meshes, materials, true),
        }
    }

    /// Depth-only rerun of the machinery into a cleared shadow map.
    pub(crate) fn record_depth(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        shadow_map: &wgpu::TextureView,
        light_view_bind_group: &wgpu::BindGroup,
        draws: &DrawList,
        meshes: &AssetCache<Mesh>,
        materials: &AssetCache<MaterialSet>,
    ) -> u32 {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ShadowDepthPass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: shadow_map,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.depth_pipeline);
        pass.set_bind_group(0, light_view_bind_group, &[]);
        pass.set_bind_group(1, &self.objects_bind_group, &[]);

        draw_items(&mut pass, &draws.singles, meshes, materials, false)
            + draw_items(&mut pass, &draws.batches, meshes, materials, false)
    }

    pub(crate) fn release(&mut self, accounting: &mut MemoryAccounting) {
        self.instances.release(accounting);
        self.joints.release(accounting);
    }
}

//! GPU side of a frame: pipelines, bind groups and pass recording.

pub(crate) mod composite;
pub(crate) mod geometry;
pub(crate) mod lighting;
pub(crate) mod shadows;
pub(crate) mod ssao;

use crate::asset::AssetCache;
use crate::renderer::material::MaterialSet;
use crate::renderer::mesh::Mesh;
use crate::renderer::plan::DrawItem;

pub(crate) fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn view_entry(binding: u32, view: &wgpu::TextureView) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::TextureView(view),
    }
}

/// Single-target pass that keeps the target's contents.
pub(crate) fn begin_color_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            depth_slice: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

/// Draw calls issued for one draw list.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DrawCounts {
    pub(crate) singles: u32,
    pub(crate) batches: u32,
}

/// Issues one indexed draw per material sub-range of every item. Material
/// bind groups go to group 2 unless `bind_materials` is off (depth-only).
pub(crate) fn draw_items(
    pass: &mut wgpu::RenderPass<'_>,
    items: &[DrawItem],
    meshes: &AssetCache<Mesh>,
    materials: &AssetCache<MaterialSet>,
    bind_materials: bool,
) -> u32 {
    let mut draws = 0;
    for item in items {
        let Some(mesh) = meshes.get(item.mesh) else {
            log::warn!("Skipping draw of unknown mesh {:?}", item.mesh);
            continue;
        };
        let material_set = if bind_materials {
            match materials.get(item.material_set) {
                Some(set) if !set.is_empty() => Some(set),
                _ => {
                    log::warn!("Skipping draw with unknown material set {:?}", item.material_set);
                    continue;
                }
            }
        } else {
            None
        };

        pass.set_vertex_buffer(0, mesh.vbuf.slice(..));
        pass.set_index_buffer(mesh.ibuf.slice(..), wgpu::IndexFormat::Uint32);
        let instances = item.first_instance..item.first_instance + item.instance_count;
        for subset in &mesh.subsets {
            if let Some(set) = material_set {
                pass.set_bind_group(2, set.bind_group(subset.material), &[]);
            }
            pass.draw_indexed(subset.start..subset.start + subset.count, 0, instances.clone());
            draws += 1;
        }
    }
    draws
}

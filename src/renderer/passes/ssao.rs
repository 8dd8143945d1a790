use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::renderer::internal::buffers::{uniform_layout_entry, MemoryAccounting, UniformBuffer};
use crate::renderer::internal::shaders::{ShaderLibrary, ShaderProgram};
use crate::renderer::internal::targets::{RenderTarget, RenderTargets, TargetSizes};
use crate::renderer::passes::{begin_color_pass, texture_entry, view_entry};
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::plan::{BlurDirection, BlurPass};
use crate::renderer::tunables::SsaoParams;

pub(crate) const SSAO_SAMPLE_COUNT: usize = 14;
const NOISE_TEXTURE_SIZE: u32 = 64;
const RANDOM_SEED: u64 = 0x5eed_a0a0;
pub(crate) const BLUR_RADIUS: usize = 5;
const BLUR_SIGMA: f32 = 3.0;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct SsaoUniform {
    offsets: [[f32; 4]; SSAO_SAMPLE_COUNT],
    occlusion: [f32; 4],
    sizes: [f32; 4],
    projection: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct BlurUniform {
    direction: [f32; 4],
    sizes: [f32; 4],
    weights: [[f32; 4]; 2],
}

/// Kernel offsets: the eight cube corners and six axis directions,
/// normalized and scaled by a random length in [0.25, 1].
pub(crate) fn sample_offsets(rng: &mut impl Rng) -> [Vec3; SSAO_SAMPLE_COUNT] {
    let mut offsets = [Vec3::ZERO; SSAO_SAMPLE_COUNT];
    let corners = (0..8).map(|i| {
        Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        )
    });
    let axes = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    for (slot, direction) in offsets.iter_mut().zip(corners.chain(axes)) {
        *slot = direction.normalize() * rng.gen_range(0.25f32..=1.0);
    }
    offsets
}

/// Center weight followed by the side weights of a normalized Gaussian.
pub(crate) fn blur_weights() -> [f32; BLUR_RADIUS + 1] {
    let mut weights = [0.0; BLUR_RADIUS + 1];
    for (i, weight) in weights.iter_mut().enumerate() {
        let x = i as f32;
        *weight = (-(x * x) / (2.0 * BLUR_SIGMA * BLUR_SIGMA)).exp();
    }
    let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    for weight in &mut weights {
        *weight /= total;
    }
    weights
}

fn noise_texels(rng: &mut impl Rng) -> Vec<u8> {
    let texels = (NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE) as usize;
    let mut data = Vec::with_capacity(texels * 4);
    for _ in 0..texels {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let encode = |value: f32| ((value * 0.5 + 0.5) * 255.0).round() as u8;
        data.extend_from_slice(&[encode(angle.cos()), encode(angle.sin()), encode(0.0), 255]);
    }
    data
}

/// Ambient occlusion into `Ssao` and its separable, edge-aware blur.
pub(crate) struct SsaoPass {
    offsets: [Vec3; SSAO_SAMPLE_COUNT],
    uniform: UniformBuffer<SsaoUniform>,
    blur_uniforms: [UniformBuffer<BlurUniform>; 2],
    noise: wgpu::Texture,
    noise_view: wgpu::TextureView,
    layout: wgpu::BindGroupLayout,
    blur_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    blur_bind_groups: [wgpu::BindGroup; 2],
    pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
}

impl SsaoPass {
    pub(crate) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shaders: &ShaderLibrary,
        view_layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
        accounting: &mut MemoryAccounting,
    ) -> Self {
        let mut rng = SmallRng::seed_from_u64(RANDOM_SEED);
        let offsets = sample_offsets(&mut rng);
        let noise = Self::create_noise_texture(device, queue, &noise_texels(&mut rng), accounting);
        let noise_view = noise.create_view(&wgpu::TextureViewDescriptor::default());

        let uniform = UniformBuffer::new(
            device,
            "SsaoUniform",
            &SsaoUniform::zeroed(),
            accounting,
        );
        let blur_uniforms = [
            UniformBuffer::new(device, "SsaoBlurHorizontal", &BlurUniform::zeroed(), accounting),
            UniformBuffer::new(device, "SsaoBlurVertical", &BlurUniform::zeroed(), accounting),
        ];

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SsaoBindLayout"),
            entries: &[
                texture_entry(0, false),
                texture_entry(1, false),
                texture_entry(2, false),
                uniform_layout_entry::<SsaoUniform>(3, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SsaoBlurBindLayout"),
            entries: &[
                texture_entry(0, false),
                texture_entry(1, false),
                texture_entry(2, false),
                uniform_layout_entry::<BlurUniform>(3, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SsaoPipelineLayout"),
            bind_group_layouts: &[view_layout, &layout],
            push_constant_ranges: &[],
        });
        let pipeline = PipelineBuilder::fullscreen(
            device,
            "SsaoPipeline",
            &pipeline_layout,
            shaders.module(ShaderProgram::Ssao),
            "vs_quad",
        )
        .fragment("fs_ssao")
        .writes(&[RenderTarget::Ssao])
        .build();

        let blur_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SsaoBlurPipelineLayout"),
            bind_group_layouts: &[&blur_layout],
            push_constant_ranges: &[],
        });
        let blur_pipeline = PipelineBuilder::fullscreen(
            device,
            "SsaoBlurPipeline",
            &blur_pipeline_layout,
            shaders.module(ShaderProgram::SsaoBlur),
            "vs_quad",
        )
        .fragment("fs_blur")
        .writes(&[RenderTarget::Ssao])
        .build();

        let (bind_group, blur_bind_groups) = Self::create_bind_groups(
            device,
            &layout,
            &blur_layout,
            targets,
            &noise_view,
            &uniform,
            &blur_uniforms,
        );

        Self {
            offsets,
            uniform,
            blur_uniforms,
            noise,
            noise_view,
            layout,
            blur_layout,
            bind_group,
            blur_bind_groups,
            pipeline,
            blur_pipeline,
        }
    }

    fn create_noise_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texels: &[u8],
        accounting: &mut MemoryAccounting,
    ) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width: NOISE_TEXTURE_SIZE,
            height: NOISE_TEXTURE_SIZE,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("SsaoNoiseTexture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * NOISE_TEXTURE_SIZE),
                rows_per_image: Some(NOISE_TEXTURE_SIZE),
            },
            size,
        );
        accounting.acquire("SsaoNoiseTexture", texels.len() as u64);

        texture
    }

    fn create_bind_groups(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        blur_layout: &wgpu::BindGroupLayout,
        targets: &RenderTargets,
        noise_view: &wgpu::TextureView,
        uniform: &UniformBuffer<SsaoUniform>,
        blur_uniforms: &[UniformBuffer<BlurUniform>; 2],
    ) -> (wgpu::BindGroup, [wgpu::BindGroup; 2]) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SsaoBindGroup"),
            layout,
            entries: &[
                view_entry(0, targets.view(RenderTarget::Normal)),
                view_entry(1, targets.view(RenderTarget::WorldPosition)),
                view_entry(2, noise_view),
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform.binding(),
                },
            ],
        });

        let blur_group = |label, source, uniform: &UniformBuffer<BlurUniform>| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: blur_layout,
                entries: &[
                    view_entry(0, targets.view(source)),
                    view_entry(1, targets.view(RenderTarget::Normal)),
                    view_entry(2, targets.view(RenderTarget::WorldPosition)),
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: uniform.binding(),
                    },
                ],
            })
        };
        let blur_bind_groups = [
            blur_group("SsaoBlurHorizontalBindGroup", RenderTarget::Ssao, &blur_uniforms[0]),
            blur_group("SsaoBlurVerticalBindGroup", RenderTarget::SsaoPing, &blur_uniforms[1]),
        ];

        (bind_group, blur_bind_groups)
    }

    /// Rebinds the G-buffer after the targets were recreated.
    pub(crate) fn rebind(&mut self, device: &wgpu::Device, targets: &RenderTargets) {
        let (bind_group, blur_bind_groups) = Self::create_bind_groups(
            device,
            &self.layout,
            &self.blur_layout,
            targets,
            &self.noise_view,
            &self.uniform,
            &self.blur_uniforms,
        );
        self.bind_group = bind_group;
        self.blur_bind_groups = blur_bind_groups;
    }

    /// Recomputes both uniform blocks; called when a parameter, the field of
    /// view or the target sizes change.
    pub(crate) fn write_params(
        &self,
        queue: &wgpu::Queue,
        params: &SsaoParams,
        fov_y: f32,
        sizes: &TargetSizes,
    ) {
        let mut offsets = [[0.0; 4]; SSAO_SAMPLE_COUNT];
        for (raw, offset) in offsets.iter_mut().zip(&self.offsets) {
            *raw = offset.extend(0.0).to_array();
        }
        let size_block = [
            sizes.ssao.0 as f32,
            sizes.ssao.1 as f32,
            sizes.width as f32,
            sizes.height as f32,
        ];
        let aspect = sizes.width as f32 / sizes.height.max(1) as f32;

        self.uniform.write(
            queue,
            &SsaoUniform {
                offsets,
                occlusion: [
                    params.radius,
                    params.epsilon,
                    params.fade_start,
                    params.fade_end,
                ],
                sizes: size_block,
                projection: [(fov_y * 0.5).tan(), aspect, 0.0, 0.0],
            },
        );

        let weights = blur_weights();
        let packed = [
            [weights[0], weights[1], weights[2], weights[3]],
            [weights[4], weights[5], 0.0, 0.0],
        ];
        for (uniform, direction) in self
            .blur_uniforms
            .iter()
            .zip([BlurDirection::Horizontal, BlurDirection::Vertical])
        {
            let [x, y] = direction.step();
            uniform.write(
                queue,
                &BlurUniform {
                    direction: [x, y, 0.0, 0.0],
                    sizes: size_block,
                    weights: packed,
                },
            );
        }
    }

    pub(crate) fn record_ssao(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
        view_bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = begin_color_pass(encoder, "SsaoPass", targets.view(RenderTarget::Ssao));
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, view_bind_group, &[]);
        pass.set_bind_group(1, &self.bind_group, &[]);
        pass.draw(0..6, 0..1);
    }

    pub(crate) fn record_blur(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
        blur: BlurPass,
    ) {
        let bind_group = match blur.direction {
            BlurDirection::Horizontal => &self.blur_bind_groups[0],
            BlurDirection::Vertical => &self.blur_bind_groups[1],
        };
        let label = match blur.direction {
            BlurDirection::Horizontal => "SsaoBlurHorizontal",
            BlurDirection::Vertical => "SsaoBlurVertical",
        };
        let mut pass = begin_color_pass(encoder, label, targets.view(blur.destination));
        pass.set_pipeline(&self.blur_pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..6, 0..1);
    }

    pub(crate) fn release(&self, accounting: &mut MemoryAccounting) {
        self.uniform.release(accounting);
        for uniform in &self.blur_uniforms {
            uniform.release(accounting);
        }
        self.noise.destroy();
        accounting.release(
            "SsaoNoiseTexture",
            (NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE * 4) as u64,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// CPU rendition of one directional blur pass: taps on a different
    /// surface are skipped and the sum is renormalized.
    fn blur_line(values: &[f32], surface: &[u32]) -> Vec<f32> {
        let weights = blur_weights();
        let last = values.len() as isize - 1;
        (0..values.len())
            .map(|center| {
                let mut total = values[center] * weights[0];
                let mut used = weights[0];
                for offset in 1..=BLUR_RADIUS as isize {
                    for tap in [center as isize - offset, center as isize + offset] {
                        let tap = tap.clamp(0, last) as usize;
                        if surface[tap] == surface[center] {
                            total += values[tap] * weights[offset as usize];
                            used += weights[offset as usize];
                        }
                    }
                }
                total / used
            })
            .collect()
    }

    #[test]
    fn offsets_are_scaled_unit_directions() {
        let mut rng = SmallRng::seed_from_u64(7);
        let offsets = sample_offsets(&mut rng);
        for offset in offsets {
            let length = offset.length();
            assert!((0.25..=1.0 + 1e-5).contains(&length), "length {length}");
        }
        // the six axis samples keep their axis
        assert_relative_eq!(offsets[8].y, 0.0);
        assert!(offsets[8].x > 0.0);
        assert!(offsets[13].z < 0.0);
    }

    #[test]
    fn offsets_are_deterministic_for_a_seed() {
        let a = sample_offsets(&mut SmallRng::seed_from_u64(RANDOM_SEED));
        let b = sample_offsets(&mut SmallRng::seed_from_u64(RANDOM_SEED));
        assert_eq!(a, b);
    }

    #[test]
    fn blur_weights_are_normalized_and_decreasing() {
        let weights = blur_weights();
        let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);
        assert!(weights.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn blur_is_idempotent_on_constant_input() {
        let values = vec![0.6; 32];
        let surface = vec![0; 32];
        let mut current = values.clone();
        for _ in 0..8 {
            current = blur_line(&current, &surface);
        }
        for value in current {
            assert_relative_eq!(value, 0.6, epsilon = 1e-5);
        }
    }

    #[test]
    fn blur_does_not_cross_surface_edges() {
        let mut values = vec![1.0; 20];
        values[10..].fill(0.0);
        let mut surface = vec![0; 20];
        surface[10..].fill(1);

        let blurred = blur_line(&values, &surface);
        assert_relative_eq!(blurred[9], 1.0, epsilon = 1e-6);
        assert_relative_eq!(blurred[10], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn noise_has_one_texel_per_cell() {
        let texels = noise_texels(&mut SmallRng::seed_from_u64(1));
        assert_eq!(texels.len(), (NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE * 4) as usize);
        assert!(texels.chunks_exact(4).all(|texel| texel[3] == 255));
    }
}

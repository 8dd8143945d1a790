//! End-to-end frames on a real device. Skipped when the machine has no
//! adapter or the adapter rejects the pipeline's targets or programs.

use deferred_pipeline::{
    Aabb, Camera, DeferredPipeline, DirectionalLight, EmbeddedResources, FrameState, GpuContext,
    GraphicsInitError, MaterialTextures, PipelineConfig, PointLight, RenderTarget, Renderable, SettingsRegistry,
    TextureImage,
};
use glam::{Mat4, Vec3};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn config() -> PipelineConfig {
    PipelineConfig {
        width: WIDTH,
        height: HEIGHT,
        shadow_map_size: 256,
        instance_capacity: 2,
        light_capacity: 2,
        clear_color: [0.0, 0.0, 1.0, 1.0],
        ..PipelineConfig::default()
    }
}

fn pipeline(registry: &mut SettingsRegistry) -> Option<(DeferredPipeline, EmbeddedResources)> {
    let _ = env_logger::builder().is_test(true).try_init();

    let context = match pollster::block_on(GpuContext::headless()) {
        Ok(context) => context,
        Err(err) => {
            eprintln!("skipping: no GPU adapter ({err})");
            return None;
        }
    };
    let resources = EmbeddedResources::new();
    match DeferredPipeline::new(context, config(), &resources, registry) {
        Ok(pipeline) => Some((pipeline, resources)),
        // the adapter turned down a target or program; anything else is a bug
        Err(err @ GraphicsInitError::Validation { .. }) => {
            eprintln!("skipping: adapter rejected the pipeline ({err})");
            None
        }
        Err(err) => panic!("pipeline failed to build: {err}"),
    }
}

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 2.0, 6.0),
        Vec3::ZERO,
        Vec3::Y,
        60f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    )
}

/// Copies an Rgba8 target back to the CPU, one row of `WIDTH` pixels each.
fn read_rgba8(context: &GpuContext, texture: &wgpu::Texture) -> Vec<[u8; 4]> {
    let unpadded = WIDTH * 4;
    let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback"),
        size: (padded * HEIGHT) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ReadbackEncoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(HEIGHT),
            },
        },
        wgpu::Extent3d {
            width: WIDTH,
            height: HEIGHT,
            depth_or_array_layers: 1,
        },
    );
    context.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    context
        .device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .expect("device poll failed");
    receiver
        .recv()
        .expect("map callback dropped")
        .expect("buffer mapping failed");

    let data = slice.get_mapped_range();
    let pixels = data
        .chunks(padded as usize)
        .flat_map(|row| {
            row[..unpadded as usize]
                .chunks_exact(4)
                .map(|texel| [texel[0], texel[1], texel[2], texel[3]])
        })
        .collect();
    drop(data);
    buffer.unmap();
    pixels
}

#[test]
fn empty_frame_only_clears() {
    let mut registry = SettingsRegistry::new();
    let Some((mut pipeline, _resources)) = pipeline(&mut registry) else {
        return;
    };
    let context = pipeline.context().clone();

    let stats = pipeline.render_deferred();
    assert_eq!(stats.geometry_draws(), 0);
    assert_eq!(stats.instances_populated, 0);
    assert_eq!(stats.ssao_passes, 0);
    assert_eq!(stats.blur_passes, 0);
    assert_eq!(stats.fullscreen_passes, 0);
    assert_eq!(pipeline.frame_state(), FrameState::Idle);

    let pixels = read_rgba8(&context, pipeline.render_target_texture(RenderTarget::Diffuse));
    assert_eq!(pixels.len(), (WIDTH * HEIGHT) as usize);
    assert!(pixels.iter().all(|&pixel| pixel == [0, 0, 255, 255]));
}

#[test]
fn lit_cube_runs_every_stage() {
    let mut registry = SettingsRegistry::new();
    let Some((mut pipeline, resources)) = pipeline(&mut registry) else {
        return;
    };
    let context = pipeline.context().clone();

    let cube = pipeline.load_mesh(&resources, "cube").expect("cube model");
    let bounds = pipeline.mesh_bounds(cube).expect("cube bounds");
    let material = pipeline.create_material_set(&[MaterialTextures {
        diffuse: Some(TextureImage::solid([255, 0, 0, 255])),
        ..MaterialTextures::default()
    }]);

    pipeline.update_camera(camera());
    pipeline.add_renderable(Renderable::new(cube, material, Mat4::IDENTITY, bounds));
    pipeline.set_lights(
        Vec::new(),
        vec![PointLight {
            position: Vec3::new(1.5, 1.5, 1.5),
            color: Vec3::ONE,
            intensity: 1.0,
            range: 6.0,
        }],
        vec![DirectionalLight {
            direction: Vec3::new(0.3, -1.0, 0.2),
            color: Vec3::ONE,
            intensity: 1.0,
            casts_shadow: true,
        }],
    );
    pipeline.render_sky_dome();

    let stats = pipeline.render_deferred();
    assert_eq!(stats.individual_draws, 1);
    assert_eq!(stats.instanced_draws, 0);
    assert_eq!(stats.ssao_passes, 1);
    assert_eq!(stats.blur_passes, 8);
    assert_eq!(stats.light_volume_draws, 1);
    assert!(stats.shadow_draws >= 1);
    assert!(stats.fullscreen_passes >= 3);
    assert_eq!(pipeline.frame_state(), FrameState::Idle);

    // the cube covers the center, the sky the top-left corner
    let pixels = read_rgba8(&context, pipeline.render_target_texture(RenderTarget::Diffuse));
    let center = pixels[(HEIGHT / 2 * WIDTH + WIDTH / 2) as usize];
    assert!(center[0] > center[2], "center pixel {center:?} is not red");
    assert_ne!(pixels[0], [0, 0, 255, 255]);
}

#[test]
fn instance_buffer_grows_and_memory_is_tracked() {
    let mut registry = SettingsRegistry::new();
    let Some((mut pipeline, resources)) = pipeline(&mut registry) else {
        return;
    };
    let cube = pipeline.load_mesh(&resources, "cube").expect("cube model");
    let material = pipeline.create_material_set(&[MaterialTextures::default()]);
    let unit = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));

    let before = pipeline.memory_usage();
    assert!(before > 0);

    pipeline.update_camera(camera());
    for x in 0..10 {
        let world = Mat4::from_translation(Vec3::new(x as f32 * 0.3 - 1.5, 0.0, 0.0));
        pipeline.add_renderable(Renderable::new(cube, material, world, unit));
    }
    let stats = pipeline.render_deferred();

    assert_eq!(stats.instanced_draws, 1);
    assert_eq!(stats.instances_populated, 10);
    assert_eq!(pipeline.instance_capacity(), 15);
    assert!(pipeline.memory_usage() > before);
    assert!(pipeline.peak_memory_usage() >= pipeline.memory_usage());

    // nothing submitted: the frame after is clear-only
    let stats = pipeline.render_deferred();
    assert_eq!(stats.geometry_draws(), 0);
    assert_eq!(pipeline.instance_capacity(), 15);
}

#[test]
fn resize_rebuilds_targets() {
    let mut registry = SettingsRegistry::new();
    let Some((mut pipeline, _resources)) = pipeline(&mut registry) else {
        return;
    };
    let before = pipeline.memory_usage();

    pipeline.resize(WIDTH * 2, HEIGHT * 2).expect("resize");
    let size = pipeline.render_target_texture(RenderTarget::Diffuse).size();
    assert_eq!((size.width, size.height), (WIDTH * 2, HEIGHT * 2));
    assert!(pipeline.memory_usage() > before);

    assert!(pipeline.resize(0, HEIGHT).is_err());
    pipeline.render_deferred();
}

#[test]
fn setting_changes_apply_on_the_next_frame() {
    let mut registry = SettingsRegistry::new();
    let Some((mut pipeline, _resources)) = pipeline(&mut registry) else {
        return;
    };
    let initial_fog = pipeline.fog();

    registry.set("lighting.ambient_strength", 0.5f32);
    // min past max: the whole fog batch is rejected
    registry.set("fog.color", "0.9, 0.9, 0.9");
    registry.set("fog.min_distance", 20000.0f32);
    assert_eq!(pipeline.ambient_strength(), 0.2);
    pipeline.render_deferred();
    assert_eq!(pipeline.frame_state(), FrameState::Idle);
    assert_eq!(pipeline.ambient_strength(), 0.5);
    assert_eq!(pipeline.fog(), initial_fog);

    registry.set("fog.color", "0.2, 0.3, 0.4");
    registry.set("lighting.ambient_strength", -3.0f32);
    pipeline.render_deferred();
    assert_eq!(pipeline.fog().color, Vec3::new(0.2, 0.3, 0.4));
    assert_eq!(pipeline.fog().min_distance, initial_fog.min_distance);
    assert_eq!(pipeline.ambient_strength(), 0.5);
}

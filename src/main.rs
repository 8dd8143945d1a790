mod demo_scenes;

use demo_scenes::DemoScene;
use deferred_pipeline::{
    DeferredPipeline, EmbeddedResources, GpuContext, PipelineConfig, SettingsRegistry,
};
use log::info;

const ACTIVE_SCENE: DemoScene = DemoScene::Grid { size: 6 };
const FRAME_COUNT: u32 = 120;

fn run() -> Result<(), Box<dyn std::error::Error>> {
    deferred_pipeline::init_logging();

    let config = PipelineConfig::load_from_path("pipeline.json");
    let mut registry = SettingsRegistry::load_from_path("tweakables.json");
    let resources = EmbeddedResources::new();

    let context = pollster::block_on(GpuContext::headless())?;
    let aspect = config.width as f32 / config.height as f32;
    let mut pipeline = DeferredPipeline::new(context, config, &resources, &mut registry)?;

    let scene = ACTIVE_SCENE.build(&mut pipeline, &resources)?;
    for frame in 0..FRAME_COUNT {
        if frame == FRAME_COUNT / 2 {
            // exercises the fog rebuild path mid-run
            registry.set("fog.color", "0.7,0.6,0.5");
        }
        scene.submit(&mut pipeline, frame as f32 * 0.02, aspect);
        if frame == 0 {
            pipeline.render_sky_dome();
        }
        let stats = pipeline.render_deferred();
        if frame % 30 == 0 {
            info!("Frame {frame}: {stats:?}");
        }
    }

    info!(
        "Rendered {} frames, GPU memory {} bytes (peak {})",
        FRAME_COUNT,
        pipeline.memory_usage(),
        pipeline.peak_memory_usage()
    );
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Application error: {err}");
        std::process::exit(1);
    }
}

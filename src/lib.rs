pub mod asset;
pub mod error;
pub mod renderer;
pub mod resources;
pub mod settings;
pub mod tweakables;

pub use error::{GraphicsInitError, MeshDecodeError, SettingsError};
pub use renderer::{
    Aabb, Camera, CascadeExtents, DeferredPipeline, DirectionalLight, FrameState, FrameStats,
    GpuContext, MaterialTextures, MeshData, PointLight, RenderTarget, Renderable, SettingChange,
    SpotLight, TextureImage,
};
pub use resources::{EmbeddedResources, ResourceProvider};
pub use settings::PipelineConfig;
pub use tweakables::{SettingValue, SettingsRegistry};

/// Installs the `env_logger` backend with `info` as the default level.
/// `RUST_LOG` still overrides it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub mod batches;
pub mod camera;
pub mod cascade;
pub mod collector;
pub mod context;
pub mod deferred;
pub mod frame;
pub mod lights;
pub mod material;
pub mod mesh;
pub mod plan;
pub mod primitives;
pub mod renderable;
pub mod tunables;
pub mod vertex;
pub mod visibility;

pub(crate) mod internal;
pub(crate) mod passes;
pub(crate) mod pipeline_builder;

pub use camera::{Camera, ViewUniform};
pub use cascade::CascadeExtents;
pub use context::GpuContext;
pub use deferred::{DeferredPipeline, SettingChange};
pub use frame::{FrameState, FrameStats};
pub use internal::targets::RenderTarget;
pub use lights::{DirectionalLight, PointLight, SpotLight};
pub use material::{MaterialSet, MaterialTextures, TextureImage};
pub use mesh::{Mesh, MeshData, MeshSubset};
pub use renderable::{Aabb, Renderable};
pub use vertex::Vertex;

//! Resource layer boundary: shader sources and model buffers by name.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::renderer::primitives::{cube_mesh, light_cone_mesh, light_sphere_mesh, plane_mesh};
use crate::renderer::MeshData;

/// Model identifiers the pipeline itself resolves at construction.
pub const LIGHT_SPHERE_MODEL: &str = "light_sphere";
pub const LIGHT_CONE_MODEL: &str = "light_cone";

pub trait ResourceProvider {
    fn shader_source(&self, name: &str) -> Option<Cow<'_, str>>;
    fn model_buffer(&self, name: &str) -> Option<Cow<'_, [u8]>>;
}

/// Ships the crate's own WGSL programs and generates the built-in models.
/// Extra models can be registered for tests and demos.
#[derive(Default)]
pub struct EmbeddedResources {
    models: HashMap<String, Vec<u8>>,
    shader_overrides: HashMap<String, String>,
}

impl EmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, name: &str, mesh: &MeshData) -> Self {
        self.models.insert(name.to_owned(), mesh.to_bytes());
        self
    }

    pub fn with_shader(mut self, name: &str, source: &str) -> Self {
        self.shader_overrides
            .insert(name.to_owned(), source.to_owned());
        self
    }
}

impl ResourceProvider for EmbeddedResources {
    fn shader_source(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(source) = self.shader_overrides.get(name) {
            return Some(Cow::Borrowed(source));
        }
        let source = match name {
            "geometry" => include_str!("shader/geometry.wgsl"),
            "ssao" => include_str!("shader/ssao.wgsl"),
            "ssao_blur" => include_str!("shader/ssao_blur.wgsl"),
            "lighting" => include_str!("shader/lighting.wgsl"),
            "composite" => include_str!("shader/composite.wgsl"),
            _ => return None,
        };
        Some(Cow::Borrowed(source))
    }

    fn model_buffer(&self, name: &str) -> Option<Cow<'_, [u8]>> {
        if let Some(bytes) = self.models.get(name) {
            return Some(Cow::Borrowed(bytes));
        }
        let (vertices, indices) = match name {
            LIGHT_SPHERE_MODEL => light_sphere_mesh(),
            LIGHT_CONE_MODEL => light_cone_mesh(),
            "cube" => cube_mesh(),
            "plane" => plane_mesh(1.0),
            _ => return None,
        };
        Some(Cow::Owned(
            MeshData::single_subset(vertices, indices).to_bytes(),
        ))
    }
}

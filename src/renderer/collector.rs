use crate::renderer::lights::{DirectionalLight, LightSet, PointLight, SpotLight};
use crate::renderer::renderable::Renderable;

/// Submissions for the frame being built. Holds nothing across frames.
#[derive(Debug, Default)]
pub struct FrameCollector {
    renderables: Vec<Renderable>,
    lights: LightSet,
    sky_dome: bool,
}

impl FrameCollector {
    pub fn add_renderable(&mut self, renderable: Renderable) {
        self.renderables.push(renderable);
    }

    pub fn set_lights(
        &mut self,
        spot: Vec<SpotLight>,
        point: Vec<PointLight>,
        directional: Vec<DirectionalLight>,
    ) {
        self.lights = LightSet {
            spot,
            point,
            directional,
        };
    }

    pub fn request_sky_dome(&mut self) {
        self.sky_dome = true;
    }

    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    pub fn sky_dome_requested(&self) -> bool {
        self.sky_dome
    }

    /// Called once the frame has been recorded.
    pub fn clear(&mut self) {
        self.renderables.clear();
        self.lights.clear();
        self.sky_dome = false;
    }
}

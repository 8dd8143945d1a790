use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Per-frame camera supplied by the scene layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    /// Vertical field of view in radians. The SSAO kernel is rebuilt when it
    /// changes.
    pub fov_y: f32,
}

impl Camera {
    pub fn look_at(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            view: Mat4::look_at_rh(position, target, up),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            fov_y,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 2.0, 10.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            20000.0,
        )
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ViewUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub position: [f32; 4],
    /// width, height, 1/width, 1/height of the output targets.
    pub viewport: [f32; 4],
}

impl ViewUniform {
    pub fn new(camera: &Camera, width: u32, height: u32) -> Self {
        let view_proj = camera.view_projection();
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
            viewport: [w, h, 1.0 / w, 1.0 / h],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_uniform_is_224_bytes() {
        // three mat4x4<f32> + two vec4<f32>
        assert_eq!(std::mem::size_of::<ViewUniform>(), 224);
    }

    #[test]
    fn view_uniform_records_viewport_reciprocals() {
        let uniform = ViewUniform::new(&Camera::default(), 200, 100);
        assert_eq!(uniform.viewport, [200.0, 100.0, 0.005, 0.01]);
    }
}

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, world space.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// At most one directional light per frame is shadowed: the first one
    /// with this flag set while shadow mapping is enabled.
    pub casts_shadow: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    /// Half-angles in radians.
    pub inner_angle: f32,
    pub outer_angle: f32,
}

/// Lights submitted for the current frame.
#[derive(Clone, Default, Debug)]
pub struct LightSet {
    pub spot: Vec<SpotLight>,
    pub point: Vec<PointLight>,
    pub directional: Vec<DirectionalLight>,
}

impl LightSet {
    pub fn clear(&mut self) {
        self.spot.clear();
        self.point.clear();
        self.directional.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.spot.is_empty() && self.point.is_empty() && self.directional.is_empty()
    }

    pub fn shadow_caster(&self) -> Option<usize> {
        self.directional.iter().position(|light| light.casts_shadow)
    }
}

pub const LIGHT_KIND_POINT: f32 = 0.0;
pub const LIGHT_KIND_SPOT: f32 = 1.0;
pub const LIGHT_KIND_DIRECTIONAL: f32 = 2.0;

/// GPU record shared by every light type. `model` places the light volume
/// (unused for directional lights).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct LightRaw {
    pub model: [[f32; 4]; 4],
    pub position_range: [f32; 4],
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
    /// cos(inner), cos(outer), kind, unused
    pub cone: [f32; 4],
}

impl LightRaw {
    pub fn from_point(light: &PointLight) -> Self {
        let model = Mat4::from_scale_rotation_translation(
            Vec3::splat(light.range),
            Quat::IDENTITY,
            light.position,
        );
        Self {
            model: model.to_cols_array_2d(),
            position_range: light.position.extend(light.range).to_array(),
            direction: [0.0; 4],
            color_intensity: light.color.extend(light.intensity).to_array(),
            cone: [1.0, 1.0, LIGHT_KIND_POINT, 0.0],
        }
    }

    pub fn from_spot(light: &SpotLight) -> Self {
        let mut inner = light.inner_angle;
        let mut outer = light.outer_angle;
        if inner > outer {
            std::mem::swap(&mut inner, &mut outer);
        }
        let direction = light.direction.try_normalize().unwrap_or(Vec3::NEG_Z);

        Self {
            model: spot_volume_transform(light.position, direction, light.range, outer)
                .to_cols_array_2d(),
            position_range: light.position.extend(light.range).to_array(),
            direction: direction.extend(0.0).to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
            cone: [inner.cos(), outer.cos(), LIGHT_KIND_SPOT, 0.0],
        }
    }

    pub fn from_directional(light: &DirectionalLight) -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            position_range: [0.0; 4],
            direction: light
                .direction
                .try_normalize()
                .unwrap_or(Vec3::NEG_Y)
                .extend(0.0)
                .to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
            cone: [1.0, 1.0, LIGHT_KIND_DIRECTIONAL, 0.0],
        }
    }
}

/// Maps the unit cone (apex at origin, base radius 1 at z = 1) onto a spot
/// light's range and outer angle.
pub fn spot_volume_transform(position: Vec3, direction: Vec3, range: f32, outer: f32) -> Mat4 {
    let radius = range * outer.clamp(0.0, 1.5).tan();
    let rotation = Quat::from_rotation_arc(Vec3::Z, direction);
    Mat4::from_scale_rotation_translation(Vec3::new(radius, radius, range), rotation, position)
}

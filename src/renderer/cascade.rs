use glam::{Mat4, Vec2, Vec3};

/// Orthographic extents of the two shadow cascades, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeExtents {
    pub big: f32,
    pub small: f32,
    /// 1 renders only the big cascade.
    pub count: u32,
}

impl CascadeExtents {
    pub fn new(big: f32, small: f32) -> Self {
        Self {
            big,
            small,
            count: 2,
        }
    }

    /// Extents in render order: big first, then small.
    pub fn active(&self) -> Vec<f32> {
        match self.count {
            0 | 1 => vec![self.big],
            _ => vec![self.big, self.small],
        }
    }

    pub fn border(&self) -> f32 {
        border_fraction(self.small, self.big)
    }
}

/// Fraction of the big cascade's shadow-map UV range, measured in from each
/// edge, outside of which the small cascade has no coverage.
pub fn border_fraction(small: f32, big: f32) -> f32 {
    if big <= 0.0 {
        return 0.0;
    }
    0.5 - 0.5 * (small / big)
}

/// Whether cascade `index` of `count` shades a point that lands on `uv` in
/// that cascade's own shadow map. The big cascade (index 0) skips the inner
/// square the small cascade covers; the small cascade takes its whole map.
/// `fs_shadowed` applies the same test per pixel.
pub fn cascade_shades(index: u32, count: u32, border: f32, uv: Vec2) -> bool {
    if count < 2 {
        return true;
    }
    let within = |low: f32, high: f32| {
        uv.cmpge(Vec2::splat(low)).all() && uv.cmple(Vec2::splat(high)).all()
    };
    match index {
        0 => !within(border, 1.0 - border),
        _ => within(0.0, 1.0),
    }
}

/// Light view-projection for one cascade: the eye sits half an extent
/// behind the camera along the light direction and the orthographic box
/// is `extent` wide and deep.
pub fn cascade_view_projection(camera_position: Vec3, light_direction: Vec3, extent: f32) -> Mat4 {
    let direction = light_direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let half = extent * 0.5;
    let eye = camera_position - direction * half;
    let up = if direction.dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };

    let view = Mat4::look_at_rh(eye, eye + direction, up);
    let projection = Mat4::orthographic_rh(-half, half, -half, half, 0.0, extent);
    projection * view
}

use glam::{Mat4, Vec3, Vec4};

use crate::renderer::renderable::Renderable;

/// Corners with `w` at or below this are behind the eye.
const MIN_CLIP_W: f32 = 1e-6;

/// One face of the clip volume in normalized device coordinates. A point is
/// inside when `sign * ndc[axis] + offset >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlane {
    pub axis: usize,
    pub offset: f32,
    pub sign: f32,
}

/// x and y in [-1, 1], z in [0, 1] (wgpu depth range). The near plane comes
/// first; corners behind the eye only fail that one.
pub const CLIP_PLANES: [ClipPlane; 6] = [
    ClipPlane { axis: 2, offset: 0.0, sign: 1.0 },
    ClipPlane { axis: 2, offset: 1.0, sign: -1.0 },
    ClipPlane { axis: 0, offset: 1.0, sign: 1.0 },
    ClipPlane { axis: 0, offset: 1.0, sign: -1.0 },
    ClipPlane { axis: 1, offset: 1.0, sign: 1.0 },
    ClipPlane { axis: 1, offset: 1.0, sign: -1.0 },
];
const NEAR_PLANE: usize = 0;

impl ClipPlane {
    fn contains(&self, ndc: Vec3) -> bool {
        self.sign * ndc[self.axis] + self.offset >= 0.0
    }
}

/// Conservative frustum test of a renderable's model-space box.
pub fn is_visible(renderable: &Renderable, view_projection: &Mat4) -> bool {
    is_box_visible(&renderable.bounds, &(*view_projection * renderable.world))
}

/// A box is culled only when all eight corners fail the same plane.
pub fn is_box_visible(corners: &[Vec3; 8], model_view_projection: &Mat4) -> bool {
    let clip: [Vec4; 8] = corners.map(|corner| *model_view_projection * corner.extend(1.0));

    for (plane_index, plane) in CLIP_PLANES.iter().enumerate() {
        let all_outside = clip.iter().all(|point| {
            if point.w <= MIN_CLIP_W {
                return plane_index == NEAR_PLANE;
            }
            !plane.contains(point.truncate() / point.w)
        });
        if all_outside {
            return false;
        }
    }
    true
}

/// Indices of the renderables that pass the frustum test, in submission
/// order.
pub fn visible_indices(renderables: &[Renderable], view_projection: &Mat4) -> Vec<usize> {
    renderables
        .iter()
        .enumerate()
        .filter(|(_, renderable)| is_visible(renderable, view_projection))
        .map(|(index, _)| index)
        .collect()
}

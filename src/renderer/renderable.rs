use glam::{Mat4, Vec3, Vec4};

use crate::asset::Handle;
use crate::renderer::material::MaterialSet;
use crate::renderer::mesh::Mesh;

/// Axis-aligned box in model space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::new(Vec3::ZERO, Vec3::ZERO);
        };
        points.fold(Self::new(first, first), |bounds, point| {
            Self::new(bounds.min.min(point), bounds.max.max(point))
        })
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

/// One object submitted for the current frame.
#[derive(Debug, Clone)]
pub struct Renderable {
    pub mesh: Handle<Mesh>,
    pub world: Mat4,
    pub world_inv_transpose: Mat4,
    pub material_set: Handle<MaterialSet>,
    /// Joint matrices for skinned meshes.
    pub pose: Option<Vec<Mat4>>,
    pub tint: Vec4,
    pub animated: bool,
    /// Model-space bounding box corners.
    pub bounds: [Vec3; 8],
}

impl Renderable {
    pub fn new(
        mesh: Handle<Mesh>,
        material_set: Handle<MaterialSet>,
        world: Mat4,
        bounds: Aabb,
    ) -> Self {
        Self {
            mesh,
            world,
            world_inv_transpose: world.inverse().transpose(),
            material_set,
            pose: None,
            tint: Vec4::ONE,
            animated: false,
            bounds: bounds.corners(),
        }
    }

    pub fn with_tint(mut self, tint: Vec4) -> Self {
        self.tint = tint;
        self
    }

    /// Marks the renderable as animated; it will always be drawn
    /// individually with this pose.
    pub fn with_pose(mut self, pose: Vec<Mat4>) -> Self {
        self.pose = Some(pose);
        self.animated = true;
        self
    }

    pub fn translation(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }
}

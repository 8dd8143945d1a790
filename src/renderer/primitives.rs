use super::vertex::{v, Vertex};
use glam::Vec3;
use std::f32::consts::PI;

/// UV sphere of radius `radius`, counter-clockwise when seen from outside.
pub fn sphere_mesh(segments: u32, rings: u32, radius: f32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let normal = [ring_radius * theta.cos(), y, ring_radius * theta.sin()];
            let pos = [normal[0] * radius, normal[1] * radius, normal[2] * radius];
            let uv = [
                segment as f32 / segments as f32,
                ring as f32 / rings as f32,
            ];
            vertices.push(v(pos, normal, uv));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, current + 1, next]);
            indices.extend_from_slice(&[current + 1, next + 1, next]);
        }
    }

    (vertices, indices)
}

/// Cone with its apex at the origin opening along +Z; the base circle of
/// radius `radius` lies in the plane z = 1.
pub fn cone_mesh(segments: u32, radius: f32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = vec![v([0.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.5, 0.0])];
    let mut indices = Vec::new();

    for segment in 0..segments {
        let theta = 2.0 * PI * segment as f32 / segments as f32;
        let (sin, cos) = theta.sin_cos();
        let normal = Vec3::new(cos, sin, -radius).normalize();
        vertices.push(v(
            [cos * radius, sin * radius, 1.0],
            normal.to_array(),
            [segment as f32 / segments as f32, 1.0],
        ));
    }

    let center = vertices.len() as u32;
    vertices.push(v([0.0, 0.0, 1.0], [0.0, 0.0, 1.0], [0.5, 0.5]));

    for segment in 0..segments {
        let current = 1 + segment;
        let next = 1 + (segment + 1) % segments;
        indices.extend_from_slice(&[0, next, current]);
        indices.extend_from_slice(&[center, current, next]);
    }

    (vertices, indices)
}

/// Unit cube centered on the origin, four vertices per face.
pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, u axis, v axis) with u x v == normal
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, u, w)) in faces.into_iter().enumerate() {
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (su, sw) in corners {
            let pos = (normal + u * su + w * sw) * 0.5;
            vertices.push(v(
                pos.to_array(),
                normal.to_array(),
                [(su + 1.0) * 0.5, (1.0 - sw) * 0.5],
            ));
        }
        let o = face as u32 * 4;
        indices.extend_from_slice(&[o, o + 1, o + 2, o, o + 2, o + 3]);
    }

    (vertices, indices)
}

/// Square in the XZ plane facing +Y, `size` units across.
pub fn plane_mesh(size: f32) -> (Vec<Vertex>, Vec<u32>) {
    let h = size * 0.5;
    let n = [0.0, 1.0, 0.0];
    let vertices = vec![
        v([-h, 0.0, -h], n, [0.0, 0.0]),
        v([-h, 0.0, h], n, [0.0, 1.0]),
        v([h, 0.0, h], n, [1.0, 1.0]),
        v([h, 0.0, -h], n, [1.0, 0.0]),
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

const LIGHT_SEGMENTS: u32 = 16;
const LIGHT_RINGS: u32 = 12;

const LIGHT_SPHERE_ENLARGE: f32 = 1.1;

/// Sphere that encloses the unit sphere despite its flat facets, so a
/// point light scaled by its range covers every lit pixel.
pub fn light_sphere_mesh() -> (Vec<Vertex>, Vec<u32>) {
    sphere_mesh(LIGHT_SEGMENTS, LIGHT_RINGS, LIGHT_SPHERE_ENLARGE)
}

/// Unit cone (base radius 1 at z = 1) with the base polygon pushed out to
/// circumscribe the circle.
pub fn light_cone_mesh() -> (Vec<Vertex>, Vec<u32>) {
    cone_mesh(LIGHT_SEGMENTS, 1.0 / (PI / LIGHT_SEGMENTS as f32).cos())
}

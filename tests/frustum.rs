//! Soundness of the visibility filter: nothing with a point inside the
//! view volume may be culled.

use deferred_pipeline::asset::Handle;
use deferred_pipeline::renderer::visibility::{is_box_visible, is_visible, visible_indices};
use deferred_pipeline::{Aabb, Camera, Renderable};
use glam::{Mat4, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 5.0, 20.0),
        Vec3::ZERO,
        Vec3::Y,
        50f32.to_radians(),
        16.0 / 9.0,
        0.5,
        200.0,
    )
}

fn inside_ndc(view_projection: Mat4, point: Vec3) -> bool {
    let clip = view_projection * point.extend(1.0);
    if clip.w <= 0.0 {
        return false;
    }
    let ndc = clip.truncate() / clip.w;
    ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && (0.0..=1.0).contains(&ndc.z)
}

#[test]
fn boxes_touching_the_frustum_are_never_culled() {
    let view_projection = camera().view_projection();
    let mut rng = SmallRng::seed_from_u64(42);

    let mut checked = 0;
    for _ in 0..2000 {
        let center = Vec3::new(
            rng.gen_range(-80.0..80.0),
            rng.gen_range(-40.0..40.0),
            rng.gen_range(-220.0..40.0),
        );
        let half = Vec3::new(
            rng.gen_range(0.1..6.0),
            rng.gen_range(0.1..6.0),
            rng.gen_range(0.1..6.0),
        );
        let bounds = Aabb::new(center - half, center + half);
        let corners = bounds.corners();

        if corners.iter().any(|&corner| inside_ndc(view_projection, corner))
            || inside_ndc(view_projection, center)
        {
            checked += 1;
            assert!(
                is_box_visible(&corners, &view_projection),
                "culled a box overlapping the frustum: {bounds:?}"
            );
        }
    }
    assert!(checked > 50, "too few overlapping samples ({checked})");
}

#[test]
fn boxes_entirely_behind_the_camera_are_culled() {
    let view_projection = camera().view_projection();
    let bounds = Aabb::new(Vec3::new(-1.0, 4.0, 30.0), Vec3::new(1.0, 6.0, 32.0));
    assert!(!is_box_visible(&bounds.corners(), &view_projection));
}

#[test]
fn box_enclosing_the_camera_is_visible() {
    let view_projection = camera().view_projection();
    let bounds = Aabb::new(Vec3::splat(-500.0), Vec3::splat(500.0));
    assert!(is_box_visible(&bounds.corners(), &view_projection));
}

#[test]
fn world_transform_moves_the_box() {
    let view_projection = camera().view_projection();
    let unit = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
    let near = Renderable::new(Handle::new(0), Handle::new(0), Mat4::IDENTITY, unit);
    let far_off = Renderable::new(
        Handle::new(0),
        Handle::new(0),
        Mat4::from_translation(Vec3::new(0.0, 0.0, 500.0)),
        unit,
    );

    assert!(is_visible(&near, &view_projection));
    assert!(!is_visible(&far_off, &view_projection));
    assert_eq!(visible_indices(&[far_off, near], &view_projection), vec![1]);
}

//! Whole-frame planning through the collector: a mixed scene walked stage
//! by stage the way the pipeline records it.

use deferred_pipeline::asset::Handle;
use deferred_pipeline::renderer::collector::FrameCollector;
use deferred_pipeline::renderer::frame::{FrameFeatures, FrameStateMachine};
use deferred_pipeline::renderer::plan::{plan_frame, ClearKind, FramePlan, PassKind, PlanInputs};
use deferred_pipeline::{
    Aabb, Camera, CascadeExtents, DirectionalLight, FrameState, PointLight, Renderable,
    RenderTarget, SpotLight,
};
use glam::{Mat4, Vec3};

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 8.0, 25.0),
        Vec3::ZERO,
        Vec3::Y,
        60f32.to_radians(),
        16.0 / 9.0,
        0.1,
        1000.0,
    )
}

fn cube(mesh: usize, material_set: usize, position: Vec3) -> Renderable {
    Renderable::new(
        Handle::new(mesh),
        Handle::new(material_set),
        Mat4::from_translation(position),
        Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
    )
}

fn populated_collector() -> FrameCollector {
    let mut collector = FrameCollector::default();
    for x in -3i32..=3 {
        for z in -3..=3 {
            let material_set = (x + z).rem_euclid(2) as usize;
            let position = Vec3::new(x as f32 * 2.0, 0.5, z as f32 * 2.0);
            collector.add_renderable(cube(0, material_set, position));
        }
    }
    collector.add_renderable(cube(1, 0, Vec3::new(0.0, 3.0, 0.0)));
    collector.add_renderable(
        cube(2, 1, Vec3::new(4.0, 1.0, 4.0)).with_pose(vec![Mat4::IDENTITY; 3]),
    );
    // behind the camera
    collector.add_renderable(cube(0, 0, Vec3::new(0.0, 8.0, 60.0)));

    collector.set_lights(
        vec![SpotLight {
            position: Vec3::new(0.0, 6.0, 0.0),
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 2.0,
            range: 12.0,
            inner_angle: 20f32.to_radians(),
            outer_angle: 30f32.to_radians(),
        }],
        vec![
            PointLight {
                position: Vec3::new(3.0, 2.0, 0.0),
                color: Vec3::X,
                intensity: 1.0,
                range: 5.0,
            },
            PointLight {
                position: Vec3::new(-3.0, 2.0, 0.0),
                color: Vec3::Z,
                intensity: 1.0,
                range: 5.0,
            },
        ],
        vec![
            DirectionalLight {
                direction: Vec3::new(0.3, -1.0, 0.2),
                color: Vec3::ONE,
                intensity: 1.0,
                casts_shadow: true,
            },
            DirectionalLight {
                direction: Vec3::new(-0.5, -1.0, 0.0),
                color: Vec3::splat(0.3),
                intensity: 0.5,
                casts_shadow: false,
            },
        ],
    );
    collector.request_sky_dome();
    collector
}

fn plan(collector: &FrameCollector, ssao: bool, shadows: bool) -> FramePlan {
    plan_frame(&PlanInputs {
        renderables: collector.renderables(),
        lights: collector.lights(),
        camera: &camera(),
        ssao_enabled: ssao,
        shadows_enabled: shadows,
        cascades: CascadeExtents::new(400.0, 60.0),
        sky_dome: collector.sky_dome_requested(),
    })
}

#[test]
fn mixed_scene_walks_every_stage_in_order() {
    let collector = populated_collector();
    let plan = plan(&collector, true, true);

    let mut frame = FrameStateMachine::default();
    frame.begin(plan.features);
    for stage in &plan.stages {
        if stage.stage != FrameState::Cleared {
            frame.advance(stage.stage);
        }
    }
    frame.advance(FrameState::Idle);
    assert_eq!(frame.state(), FrameState::Idle);

    let stages: Vec<_> = plan.stages.iter().map(|stage| stage.stage).collect();
    assert_eq!(
        stages,
        vec![
            FrameState::Cleared,
            FrameState::GeometryDone,
            FrameState::SsaoDone,
            FrameState::ShadowDone,
            FrameState::LightingDone,
            FrameState::Composited,
        ]
    );
}

#[test]
fn culled_object_gets_no_instance_record() {
    let collector = populated_collector();
    let plan = plan(&collector, false, false);

    // 49 grid cubes, one single mesh, one animated; the one behind is culled
    assert_eq!(plan.geometry.instance_count(), 51);
    for item in plan.geometry.iter() {
        assert!((item.first_instance + item.instance_count) as usize <= plan.instances.len());
    }
}

#[test]
fn grid_batches_per_material_and_singles_stay_separate() {
    let collector = populated_collector();
    let plan = plan(&collector, false, false);

    let grid_runs: Vec<_> = plan
        .geometry
        .batches
        .iter()
        .filter(|item| item.mesh == Handle::new(0))
        .collect();
    assert_eq!(grid_runs.len(), 2);
    assert_eq!(
        grid_runs.iter().map(|item| item.instance_count).sum::<u32>(),
        49
    );

    assert_eq!(plan.geometry.singles.len(), 2);
    assert!(plan.geometry.singles.iter().all(|item| item.instance_count == 1));
    assert_eq!(plan.joints.len(), 3);
}

#[test]
fn light_records_are_grouped_by_kind() {
    let collector = populated_collector();
    let plan = plan(&collector, true, true);

    assert_eq!(plan.spot_range, 0..1);
    assert_eq!(plan.point_range, 1..3);
    // the shadow caster is lit by its own pass
    assert_eq!(plan.directional_range, 3..4);
    assert_eq!(plan.lights.len(), 4);

    assert_eq!(
        plan.passes(FrameState::LightingDone),
        &[
            PassKind::SpotVolumes,
            PassKind::PointVolumes,
            PassKind::Directional,
            PassKind::Ambient,
        ]
    );
}

#[test]
fn cascade_draws_never_exceed_camera_draws() {
    let collector = populated_collector();
    let plan = plan(&collector, true, true);

    assert_eq!(plan.cascades.len(), 2);
    assert!(plan.cascades[0].extent > plan.cascades[1].extent);
    for cascade in &plan.cascades {
        assert!(cascade.draws.instance_count() <= plan.geometry.instance_count());
        assert!(!cascade.draws.is_empty());
    }
    assert_eq!(
        plan.passes(FrameState::ShadowDone),
        &[
            PassKind::ShadowDepth { cascade: 0 },
            PassKind::ShadowLighting { cascade: 0 },
            PassKind::ShadowDepth { cascade: 1 },
            PassKind::ShadowLighting { cascade: 1 },
        ]
    );
}

#[test]
fn disabling_features_drops_their_stages() {
    let collector = populated_collector();
    let plan = plan(&collector, false, false);

    assert_eq!(
        plan.features,
        FrameFeatures {
            ssao: false,
            shadows: false
        }
    );
    assert!(!plan.has_stage(FrameState::SsaoDone));
    assert!(!plan.has_stage(FrameState::ShadowDone));
    assert!(plan.cascades.is_empty());
    // both suns now go through the plain directional pass
    assert_eq!(plan.directional_range.len(), 2);
}

#[test]
fn cleared_collector_plans_a_clear_only_frame() {
    let mut collector = populated_collector();
    collector.clear();
    let plan = plan(&collector, true, true);

    assert!(plan.geometry.is_empty());
    assert!(plan.instances.is_empty());
    assert!(plan.lights.is_empty());
    assert_eq!(
        plan.passes(FrameState::Cleared),
        &[
            PassKind::Clear(ClearKind::GBuffer),
            PassKind::Clear(ClearKind::Light),
            PassKind::Clear(ClearKind::Ssao),
            PassKind::Clear(ClearKind::ShadowDepth),
        ]
    );
    assert!(plan.passes(FrameState::Composited).is_empty());
    assert_eq!(RenderTarget::Ssao.clear_value(), 1.0);
    assert_eq!(RenderTarget::ShadowDepth.clear_value(), 1.0);
}

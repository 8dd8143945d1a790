//! CPU side of a frame: cull, sort and populate everything the encoder
//! needs, and lay out the passes of each stage.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::asset::Handle;
use crate::renderer::batches::{self, SortedBatches};
use crate::renderer::camera::Camera;
use crate::renderer::cascade::{cascade_view_projection, CascadeExtents};
use crate::renderer::frame::{FrameFeatures, FrameState};
use crate::renderer::internal::targets::RenderTarget;
use crate::renderer::lights::{DirectionalLight, LightRaw, LightSet};
use crate::renderer::material::MaterialSet;
use crate::renderer::mesh::Mesh;
use crate::renderer::renderable::Renderable;
use crate::renderer::visibility;

pub const SSAO_BLUR_ITERATIONS: usize = 4;

/// Per-instance record read by the geometry program through
/// `instance_index`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct InstanceRaw {
    pub world: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub tint: [f32; 4],
    /// first joint, joint count, unused, unused
    pub skin: [u32; 4],
}

impl InstanceRaw {
    fn new(renderable: &Renderable, joint_offset: u32, joint_count: u32) -> Self {
        Self {
            world: renderable.world.to_cols_array_2d(),
            normal: renderable.world_inv_transpose.to_cols_array_2d(),
            tint: renderable.tint.to_array(),
            skin: [joint_offset, joint_count, 0, 0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    pub mesh: Handle<Mesh>,
    pub material_set: Handle<MaterialSet>,
    pub first_instance: u32,
    pub instance_count: u32,
}

/// Draws of one geometry-machinery pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    pub singles: Vec<DrawItem>,
    pub batches: Vec<DrawItem>,
}

impl DrawList {
    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrawItem> {
        self.singles.iter().chain(self.batches.iter())
    }

    pub fn instance_count(&self) -> u32 {
        self.iter().map(|item| item.instance_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadePlan {
    pub extent: f32,
    pub view_projection: Mat4,
    pub draws: DrawList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl BlurDirection {
    pub fn step(self) -> [f32; 2] {
        match self {
            BlurDirection::Horizontal => [1.0, 0.0],
            BlurDirection::Vertical => [0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurPass {
    pub direction: BlurDirection,
    pub source: RenderTarget,
    pub destination: RenderTarget,
}

/// Ping-pong schedule: each iteration blurs SSAO horizontally into the ping
/// target and back vertically, so the result always ends in `Ssao`.
pub fn blur_schedule() -> Vec<BlurPass> {
    (0..SSAO_BLUR_ITERATIONS)
        .flat_map(|_| {
            [
                BlurPass {
                    direction: BlurDirection::Horizontal,
                    source: RenderTarget::Ssao,
                    destination: RenderTarget::SsaoPing,
                },
                BlurPass {
                    direction: BlurDirection::Vertical,
                    source: RenderTarget::SsaoPing,
                    destination: RenderTarget::Ssao,
                },
            ]
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearKind {
    GBuffer,
    Light,
    Ssao,
    ShadowDepth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Clear(ClearKind),
    Geometry,
    Ssao,
    Blur(BlurPass),
    ShadowDepth { cascade: usize },
    ShadowLighting { cascade: usize },
    SpotVolumes,
    PointVolumes,
    Directional,
    Ambient,
    Composite,
    SkyDome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub stage: FrameState,
    pub passes: Vec<PassKind>,
}

pub struct PlanInputs<'a> {
    pub renderables: &'a [Renderable],
    pub lights: &'a LightSet,
    pub camera: &'a Camera,
    pub ssao_enabled: bool,
    pub shadows_enabled: bool,
    pub cascades: CascadeExtents,
    pub sky_dome: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub features: FrameFeatures,
    pub sorted: SortedBatches,
    pub geometry: DrawList,
    pub cascades: Vec<CascadePlan>,
    pub shadow_light: Option<DirectionalLight>,
    pub instances: Vec<InstanceRaw>,
    pub joints: Vec<[[f32; 4]; 4]>,
    pub lights: Vec<LightRaw>,
    pub spot_range: Range<u32>,
    pub point_range: Range<u32>,
    pub directional_range: Range<u32>,
    pub stages: Vec<StagePlan>,
}

impl FramePlan {
    pub fn passes(&self, stage: FrameState) -> &[PassKind] {
        self.stages
            .iter()
            .find(|plan| plan.stage == stage)
            .map(|plan| plan.passes.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_stage(&self, stage: FrameState) -> bool {
        self.stages.iter().any(|plan| plan.stage == stage)
    }
}

pub fn plan_frame(inputs: &PlanInputs<'_>) -> FramePlan {
    let renderables = inputs.renderables;
    let view_projection = inputs.camera.view_projection();

    let visible = visibility::visible_indices(renderables, &view_projection);
    let sorted = batches::sort(renderables, &visible, inputs.camera.position);

    let mut populator = InstancePopulator::new(renderables);
    let geometry = populator.populate(&sorted, None);

    let caster = if inputs.shadows_enabled {
        inputs.lights.shadow_caster()
    } else {
        None
    };
    let shadow_light = caster.map(|index| inputs.lights.directional[index]);

    let cascades = match shadow_light {
        Some(light) if !geometry.is_empty() => inputs
            .cascades
            .active()
            .into_iter()
            .map(|extent| {
                let view_projection =
                    cascade_view_projection(inputs.camera.position, light.direction, extent);
                CascadePlan {
                    extent,
                    view_projection,
                    draws: populator.populate(&sorted, Some(&view_projection)),
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut lights = Vec::with_capacity(
        inputs.lights.spot.len() + inputs.lights.point.len() + inputs.lights.directional.len(),
    );
    let spot_range = append_range(&mut lights, inputs.lights.spot.iter().map(LightRaw::from_spot));
    let point_range =
        append_range(&mut lights, inputs.lights.point.iter().map(LightRaw::from_point));
    let directional_range = append_range(
        &mut lights,
        inputs
            .lights
            .directional
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != caster)
            .map(|(_, light)| LightRaw::from_directional(light)),
    );

    let features = FrameFeatures {
        ssao: inputs.ssao_enabled,
        shadows: shadow_light.is_some(),
    };

    let mut plan = FramePlan {
        features,
        sorted,
        geometry,
        cascades,
        shadow_light,
        instances: populator.instances,
        joints: populator.joints,
        lights,
        spot_range,
        point_range,
        directional_range,
        stages: Vec::new(),
    };
    plan.stages = layout_stages(&plan, inputs.sky_dome);
    plan
}

fn append_range(
    lights: &mut Vec<LightRaw>,
    records: impl Iterator<Item = LightRaw>,
) -> Range<u32> {
    let start = lights.len() as u32;
    lights.extend(records);
    start..lights.len() as u32
}

fn layout_stages(plan: &FramePlan, sky_dome: bool) -> Vec<StagePlan> {
    let has_geometry = !plan.geometry.is_empty();

    FrameState::sequence(plan.features)
        .into_iter()
        .map(|stage| {
            let mut passes = Vec::new();
            match stage {
                FrameState::Cleared => passes.extend(
                    [
                        ClearKind::GBuffer,
                        ClearKind::Light,
                        ClearKind::Ssao,
                        ClearKind::ShadowDepth,
                    ]
                    .map(PassKind::Clear),
                ),
                FrameState::GeometryDone if has_geometry => passes.push(PassKind::Geometry),
                FrameState::SsaoDone if has_geometry => {
                    passes.push(PassKind::Ssao);
                    passes.extend(blur_schedule().into_iter().map(PassKind::Blur));
                }
                FrameState::ShadowDone => {
                    for cascade in 0..plan.cascades.len() {
                        passes.push(PassKind::ShadowDepth { cascade });
                        passes.push(PassKind::ShadowLighting { cascade });
                    }
                }
                FrameState::LightingDone if has_geometry => {
                    if !plan.spot_range.is_empty() {
                        passes.push(PassKind::SpotVolumes);
                    }
                    if !plan.point_range.is_empty() {
                        passes.push(PassKind::PointVolumes);
                    }
                    if !plan.directional_range.is_empty() {
                        passes.push(PassKind::Directional);
                    }
                    passes.push(PassKind::Ambient);
                }
                FrameState::Composited => {
                    if has_geometry {
                        passes.push(PassKind::Composite);
                    }
                    if sky_dome {
                        passes.push(PassKind::SkyDome);
                    }
                }
                _ => {}
            }
            StagePlan { stage, passes }
        })
        .collect()
}

/// Appends instance and joint records for draw lists.
struct InstancePopulator<'a> {
    renderables: &'a [Renderable],
    instances: Vec<InstanceRaw>,
    joints: Vec<[[f32; 4]; 4]>,
    /// Instance record of each renderable, once written.
    written: Vec<Option<u32>>,
}

impl<'a> InstancePopulator<'a> {
    fn new(renderables: &'a [Renderable]) -> Self {
        Self {
            renderables,
            instances: Vec::new(),
            joints: Vec::new(),
            written: vec![None; renderables.len()],
        }
    }

    /// Builds a draw list from the camera-sorted batches. With a
    /// `view_projection`, members outside it are skipped; batch membership
    /// itself never changes.
    fn populate(&mut self, sorted: &SortedBatches, view_projection: Option<&Mat4>) -> DrawList {
        let renderables = self.renderables;
        let passes = |index: usize| match view_projection {
            Some(vp) => visibility::is_visible(&renderables[index], vp),
            None => true,
        };

        let singles: Vec<usize> = sorted.singles.iter().copied().filter(|&i| passes(i)).collect();
        let mut list = DrawList::default();
        for index in singles {
            let first_instance = self.record_for(index);
            let renderable = &renderables[index];
            list.singles.push(DrawItem {
                mesh: renderable.mesh,
                material_set: renderable.material_set,
                first_instance,
                instance_count: 1,
            });
        }

        for batch in &sorted.instanced {
            let mut members: Vec<usize> =
                batch.members.iter().copied().filter(|&i| passes(i)).collect();
            // stable, so members keep their mesh-sorted order within a run
            members.sort_by_key(|&index| renderables[index].material_set.index());

            for run in material_runs(&members, renderables) {
                let first_instance = self.instances.len() as u32;
                self.instances.extend(
                    run.iter()
                        .map(|&index| InstanceRaw::new(&renderables[index], 0, 0)),
                );
                list.batches.push(DrawItem {
                    mesh: batch.mesh,
                    material_set: renderables[run[0]].material_set,
                    first_instance,
                    instance_count: run.len() as u32,
                });
            }
        }
        list
    }

    /// Singles get one record per frame, shared by every pass that draws
    /// them; animated ones also append their pose to the joint array.
    fn record_for(&mut self, index: usize) -> u32 {
        if let Some(record) = self.written[index] {
            return record;
        }
        let renderable = &self.renderables[index];
        let (joint_offset, joint_count) = match renderable.pose.as_deref() {
            Some(pose) if renderable.animated && !pose.is_empty() => {
                let offset = self.joints.len() as u32;
                self.joints
                    .extend(pose.iter().map(|joint| joint.to_cols_array_2d()));
                (offset, pose.len() as u32)
            }
            _ => (0, 0),
        };
        let record = self.instances.len() as u32;
        self.instances
            .push(InstanceRaw::new(renderable, joint_offset, joint_count));
        self.written[index] = Some(record);
        record
    }
}

/// Splits `members` (sorted by material set) into runs sharing one set.
fn material_runs<'m>(members: &'m [usize], renderables: &[Renderable]) -> Vec<&'m [usize]> {
    let mut runs = Vec::new();
    let mut start = 0;
    while start < members.len() {
        let set = renderables[members[start]].material_set;
        let len = members[start..]
            .iter()
            .take_while(|&&index| renderables[index].material_set == set)
            .count();
        runs.push(&members[start..start + len]);
        start += len;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::lights::PointLight;
    use crate::renderer::renderable::Aabb;
    use glam::{Vec3, Vec4};

    fn camera() -> Camera {
        Camera::look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            1.0,
            0.1,
            1000.0,
        )
    }

    fn renderable(mesh: usize, material_set: usize, position: Vec3) -> Renderable {
        Renderable::new(
            Handle::new(mesh),
            Handle::new(material_set),
            Mat4::from_translation(position),
            Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
        )
    }

    fn sun() -> DirectionalLight {
        DirectionalLight {
            direction: Vec3::new(0.2, -1.0, 0.1),
            color: Vec3::ONE,
            intensity: 1.0,
            casts_shadow: true,
        }
    }

    fn plan(renderables: &[Renderable], lights: &LightSet, ssao: bool, shadows: bool) -> FramePlan {
        plan_frame(&PlanInputs {
            renderables,
            lights,
            camera: &camera(),
            ssao_enabled: ssao,
            shadows_enabled: shadows,
            cascades: CascadeExtents::new(200.0, 30.0),
            sky_dome: false,
        })
    }

    #[test]
    fn empty_frame_only_clears() {
        let plan = plan(&[], &LightSet::default(), true, true);

        assert!(plan.geometry.is_empty());
        assert_eq!(
            plan.passes(FrameState::Cleared),
            &[
                PassKind::Clear(ClearKind::GBuffer),
                PassKind::Clear(ClearKind::Light),
                PassKind::Clear(ClearKind::Ssao),
                PassKind::Clear(ClearKind::ShadowDepth),
            ]
        );
        for plan_stage in plan.stages.iter().skip(1) {
            assert!(plan_stage.passes.is_empty(), "{:?}", plan_stage.stage);
        }
        assert!(plan.instances.is_empty());
    }

    #[test]
    fn single_animated_object_is_drawn_individually_with_pose() {
        let pose = vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::X)];
        let renderables = vec![renderable(0, 0, Vec3::ZERO).with_pose(pose.clone())];
        let plan = plan(&renderables, &LightSet::default(), false, false);

        assert!(plan.sorted.instanced.is_empty());
        assert_eq!(plan.geometry.singles.len(), 1);
        assert!(plan.geometry.batches.is_empty());

        let record = plan.instances[plan.geometry.singles[0].first_instance as usize];
        assert_eq!(record.skin[1], 2);
        assert_eq!(plan.joints.len(), 2);
        assert_eq!(plan.joints[1], pose[1].to_cols_array_2d());
    }

    #[test]
    fn visible_same_mesh_objects_share_one_instanced_draw() {
        let mut renderables: Vec<_> = (0..4)
            .map(|i| renderable(5, 0, Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        // behind the camera
        renderables.push(renderable(5, 0, Vec3::new(0.0, 0.0, 50.0)));

        let plan = plan(&renderables, &LightSet::default(), false, false);
        assert!(plan.geometry.singles.is_empty());
        assert_eq!(plan.geometry.batches.len(), 1);
        assert_eq!(plan.geometry.batches[0].instance_count, 4);
        assert_eq!(plan.instances.len(), 4);
    }

    #[test]
    fn batches_split_by_material_set() {
        let renderables = vec![
            renderable(1, 0, Vec3::new(-1.0, 0.0, 0.0)),
            renderable(1, 3, Vec3::new(0.0, 0.0, 0.0)),
            renderable(1, 0, Vec3::new(1.0, 0.0, 0.0)),
        ];
        let plan = plan(&renderables, &LightSet::default(), false, false);

        let counts: Vec<_> = plan
            .geometry
            .batches
            .iter()
            .map(|item| (item.material_set.index(), item.instance_count))
            .collect();
        assert_eq!(counts, vec![(0, 2), (3, 1)]);
        assert_eq!(plan.geometry.batches[1].first_instance, 2);
    }

    #[test]
    fn tint_reaches_the_instance_record() {
        let renderables = vec![
            renderable(1, 0, Vec3::ZERO).with_tint(Vec4::new(1.0, 0.0, 0.0, 1.0)),
            renderable(1, 0, Vec3::X),
        ];
        let plan = plan(&renderables, &LightSet::default(), false, false);
        assert_eq!(plan.instances[0].tint, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn ssao_disabled_has_no_ssao_stage() {
        let renderables = vec![renderable(0, 0, Vec3::ZERO)];
        let plan = plan(&renderables, &LightSet::default(), false, false);

        assert!(!plan.has_stage(FrameState::SsaoDone));
        assert!(plan
            .stages
            .iter()
            .flat_map(|stage| stage.passes.iter())
            .all(|pass| !matches!(pass, PassKind::Ssao | PassKind::Blur(_))));
        assert!(plan
            .passes(FrameState::Cleared)
            .contains(&PassKind::Clear(ClearKind::Ssao)));
    }

    #[test]
    fn ssao_enabled_runs_eight_blur_passes_ending_in_ssao() {
        let renderables = vec![renderable(0, 0, Vec3::ZERO)];
        let plan = plan(&renderables, &LightSet::default(), true, false);

        let blurs: Vec<_> = plan
            .passes(FrameState::SsaoDone)
            .iter()
            .filter_map(|pass| match pass {
                PassKind::Blur(blur) => Some(*blur),
                _ => None,
            })
            .collect();
        assert_eq!(blurs.len(), 8);
        assert_eq!(blurs.last().map(|b| b.destination), Some(RenderTarget::Ssao));
    }

    #[test]
    fn shadowed_sun_gets_two_cascades_and_leaves_the_directional_list() {
        let renderables = vec![renderable(0, 0, Vec3::ZERO), renderable(2, 0, Vec3::X)];
        let mut lights = LightSet::default();
        lights.directional.push(sun());
        lights.directional.push(DirectionalLight {
            casts_shadow: false,
            ..sun()
        });
        lights.point.push(PointLight {
            position: Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 4.0,
        });

        let plan = plan(&renderables, &lights, false, true);
        assert_eq!(plan.cascades.len(), 2);
        assert_eq!(plan.cascades[0].extent, 200.0);
        assert_eq!(plan.directional_range.len(), 1);
        assert_eq!(plan.point_range, 0..1);
        assert_eq!(
            plan.passes(FrameState::ShadowDone),
            &[
                PassKind::ShadowDepth { cascade: 0 },
                PassKind::ShadowLighting { cascade: 0 },
                PassKind::ShadowDepth { cascade: 1 },
                PassKind::ShadowLighting { cascade: 1 },
            ]
        );
        // singles reuse their geometry-pass records
        assert_eq!(
            plan.cascades[0].draws.singles[0].first_instance,
            plan.geometry.singles[0].first_instance
        );
    }

    #[test]
    fn shadows_disabled_light_the_caster_without_shadow() {
        let renderables = vec![renderable(0, 0, Vec3::ZERO)];
        let mut lights = LightSet::default();
        lights.directional.push(sun());

        let plan = plan(&renderables, &lights, false, false);
        assert!(!plan.has_stage(FrameState::ShadowDone));
        assert!(plan.shadow_light.is_none());
        assert_eq!(plan.directional_range, 0..1);
    }

    #[test]
    fn sky_dome_is_drawn_after_composite() {
        let renderables = vec![renderable(0, 0, Vec3::ZERO)];
        let plan = plan_frame(&PlanInputs {
            renderables: &renderables,
            lights: &LightSet::default(),
            camera: &camera(),
            ssao_enabled: false,
            shadows_enabled: false,
            cascades: CascadeExtents::new(200.0, 30.0),
            sky_dome: true,
        });
        assert_eq!(
            plan.passes(FrameState::Composited),
            &[PassKind::Composite, PassKind::SkyDome]
        );
    }

    #[test]
    fn blur_schedule_alternates_targets() {
        let schedule = blur_schedule();
        for pair in schedule.chunks_exact(2) {
            assert_eq!(pair[0].direction, BlurDirection::Horizontal);
            assert_eq!(pair[0].destination, pair[1].source);
            assert_eq!(pair[1].destination, pair[0].source);
        }
    }
}

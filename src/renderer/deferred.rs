use crossbeam_channel::{Receiver, Sender};

use crate::asset::{AssetCache, Handle};
use crate::error::GraphicsInitError;
use crate::renderer::camera::{Camera, ViewUniform};
use crate::renderer::cascade::CascadeExtents;
use crate::renderer::collector::FrameCollector;
use crate::renderer::context::GpuContext;
use crate::renderer::frame::{FrameState, FrameStateMachine, FrameStats};
use crate::renderer::internal::buffers::{MemoryAccounting, ViewBuffer};
use crate::renderer::internal::shaders::ShaderLibrary;
use crate::renderer::internal::targets::{
    world_position_format, RenderTarget, RenderTargets, TargetSizes,
};
use crate::renderer::lights::{DirectionalLight, PointLight, SpotLight};
use crate::renderer::material::{MaterialBinder, MaterialSet, MaterialTextures};
use crate::renderer::mesh::{Mesh, MeshData};
use crate::renderer::passes::composite::CompositePass;
use crate::renderer::passes::geometry::GeometryPass;
use crate::renderer::passes::lighting::LightingPass;
use crate::renderer::passes::shadows::ShadowPass;
use crate::renderer::passes::ssao::SsaoPass;
use crate::renderer::plan::{plan_frame, ClearKind, FramePlan, PassKind, PlanInputs};
use crate::renderer::renderable::{Aabb, Renderable};
use crate::renderer::tunables::{self, FogParams, SsaoParams, WATCHED_SETTINGS};
use crate::resources::{ResourceProvider, LIGHT_CONE_MODEL, LIGHT_SPHERE_MODEL};
use crate::settings::{scaled_extent, PipelineConfig};
use crate::tweakables::{SettingValue, SettingsRegistry};

/// A registry mutation queued by the pipeline's listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    pub name: String,
    pub value: SettingValue,
}

/// What a batch of setting changes invalidates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SettingEffects {
    pub(crate) ssao: bool,
    pub(crate) ambient: bool,
    pub(crate) fog: bool,
    pub(crate) cascades: bool,
}

impl SettingEffects {
    pub(crate) fn of(name: &str) -> Self {
        let mut effects = Self::default();
        match name {
            tunables::SSAO_RADIUS
            | tunables::SSAO_EPSILON
            | tunables::SSAO_FADE_START
            | tunables::SSAO_FADE_END => effects.ssao = true,
            tunables::AMBIENT_STRENGTH => effects.ambient = true,
            tunables::FOG_COLOR | tunables::FOG_MIN_DISTANCE | tunables::FOG_MAX_DISTANCE => {
                effects.fog = true
            }
            tunables::SHADOW_CASCADES => effects.cascades = true,
            _ => {}
        }
        effects
    }

    pub(crate) fn merge(self, other: Self) -> Self {
        Self {
            ssao: self.ssao || other.ssao,
            ambient: self.ambient || other.ambient,
            fog: self.fog || other.fog,
            cascades: self.cascades || other.cascades,
        }
    }
}

/// Moves queued changes into the pipeline's mirror of the settings.
pub(crate) fn drain_changes(
    changes: &Receiver<SettingChange>,
    tweaks: &mut SettingsRegistry,
) -> SettingEffects {
    let mut effects = SettingEffects::default();
    for change in changes.try_iter() {
        effects = effects.merge(SettingEffects::of(&change.name));
        tweaks.set(&change.name, change.value);
    }
    effects
}

/// Re-reads the fog settings and hands them to `rebuild`. If either step
/// fails the mirrored fog settings go back to `active`, so a later change
/// is judged against the fog actually in use.
pub(crate) fn refresh_fog(
    tweaks: &mut SettingsRegistry,
    active: &FogParams,
    rebuild: impl FnOnce(&FogParams) -> Result<(), GraphicsInitError>,
) -> Option<FogParams> {
    let rebuilt = FogParams::from_registry(tweaks)
        .map_err(|err| err.to_string())
        .and_then(|fog| {
            rebuild(&fog)
                .map(|()| fog)
                .map_err(|err| err.to_string())
        });
    match rebuilt {
        Ok(fog) => Some(fog),
        Err(err) => {
            log::warn!("Keeping previous fog programs: {err}");
            active.write_to(tweaks);
            None
        }
    }
}

/// Ambient counterpart of [`refresh_fog`].
pub(crate) fn refresh_ambient(
    tweaks: &mut SettingsRegistry,
    active: f32,
    rebuild: impl FnOnce(f32) -> Result<(), GraphicsInitError>,
) -> Option<f32> {
    let strength = tunables::ambient_strength(tweaks);
    match rebuild(strength) {
        Ok(()) => Some(strength),
        Err(err) => {
            log::warn!("Keeping previous ambient program: {err}");
            tweaks.set(tunables::AMBIENT_STRENGTH, active);
            None
        }
    }
}

/// Deferred renderer: G-buffer fill, SSAO, cascaded directional shadows,
/// light accumulation and a fog composite into the diffuse target.
///
/// Submissions (`add_renderable`, `set_lights`, `render_sky_dome`) only
/// apply to the next [`DeferredPipeline::render_deferred`].
pub struct DeferredPipeline {
    context: GpuContext,
    config: PipelineConfig,
    shaders: ShaderLibrary,
    accounting: MemoryAccounting,
    targets: RenderTargets,
    view: ViewBuffer,
    camera: Camera,
    ssao_fov: f32,
    collector: FrameCollector,
    frame: FrameStateMachine,
    meshes: AssetCache<Mesh>,
    materials: AssetCache<MaterialSet>,
    material_binder: MaterialBinder,
    geometry: GeometryPass,
    ssao: SsaoPass,
    shadows: ShadowPass,
    lighting: LightingPass,
    composite: CompositePass,
    ssao_enabled: bool,
    shadows_enabled: bool,
    cascades: CascadeExtents,
    cascade_border: f32,
    tweaks: SettingsRegistry,
    ssao_params: SsaoParams,
    changes: Receiver<SettingChange>,
}

fn load_model(
    resources: &dyn ResourceProvider,
    name: &str,
) -> Result<MeshData, GraphicsInitError> {
    let bytes = resources
        .model_buffer(name)
        .ok_or_else(|| GraphicsInitError::MissingModel(name.to_owned()))?;
    MeshData::from_bytes(&bytes).map_err(|source| GraphicsInitError::InvalidModel {
        name: name.to_owned(),
        source,
    })
}

fn target_sizes(config: &PipelineConfig) -> TargetSizes {
    TargetSizes {
        width: config.width,
        height: config.height,
        ssao: config.ssao_extent(),
        shadow: config.shadow_map_size,
    }
}

impl DeferredPipeline {
    /// Builds every target, buffer and program. Listeners for the tunable
    /// settings are registered on `registry`; their changes are applied at
    /// the start of the next frame.
    pub fn new(
        context: GpuContext,
        config: PipelineConfig,
        resources: &dyn ResourceProvider,
        registry: &mut SettingsRegistry,
    ) -> Result<Self, GraphicsInitError> {
        let config = config.validate();
        let sizes = target_sizes(&config);
        sizes.validate(context.device.limits().max_texture_dimension_2d)?;

        let shaders = ShaderLibrary::load(&context, resources)?;
        let sphere_data = load_model(resources, LIGHT_SPHERE_MODEL)?;
        let cone_data = load_model(resources, LIGHT_CONE_MODEL)?;

        let (sender, changes) = crossbeam_channel::unbounded();
        let mut tweaks = Self::watch_settings(registry, &sender);
        let ssao_params = SsaoParams::from_registry(&tweaks);
        let fog = FogParams::from_registry(&tweaks).unwrap_or_else(|err| {
            log::warn!("Invalid fog settings ({err}). Using default fog.");
            let fog = FogParams::default();
            fog.write_to(&mut tweaks);
            fog
        });

        // device objects below are created under error scopes
        let mut accounting = MemoryAccounting::default();
        let position_format = world_position_format(&context);
        let targets = context.validated("RenderTargets", |device| {
            RenderTargets::new(device, sizes, position_format, &mut accounting)
        })?;
        let camera = Camera::default();
        let view = context.validated("ViewBuffer", |device| {
            ViewBuffer::new(
                device,
                &ViewUniform::new(&camera, sizes.width, sizes.height),
                &mut accounting,
            )
        })?;

        let (sphere, cone) = context.validated("LightVolumeMeshes", |device| {
            (
                Mesh::upload(device, LIGHT_SPHERE_MODEL, &sphere_data, &mut accounting),
                Mesh::upload(device, LIGHT_CONE_MODEL, &cone_data, &mut accounting),
            )
        })?;

        let material_binder = context.validated("MaterialBinder", MaterialBinder::new)?;
        let geometry = context.validated("GeometryPass", |device| {
            GeometryPass::new(
                device,
                &shaders,
                &view.bind_layout,
                &material_binder.layout,
                position_format,
                config.instance_capacity,
                &mut accounting,
            )
        })?;
        let ssao = context.validated("SsaoPass", |device| {
            SsaoPass::new(
                device,
                &context.queue,
                &shaders,
                &view.bind_layout,
                &targets,
                &mut accounting,
            )
        })?;
        let lighting = context.validated("LightingPass", |_| {
            LightingPass::new(
                &context,
                &shaders,
                &view.bind_layout,
                &targets,
                sphere,
                cone,
                config.light_capacity,
                tunables::ambient_strength(&tweaks),
                &mut accounting,
            )
        })??;
        let shadows = context.validated("ShadowPass", |device| {
            ShadowPass::new(device, &shaders, &view, &lighting, &mut accounting)
        })?;
        let composite = context.validated("CompositePass", |_| {
            CompositePass::new(&context, &shaders, &view.bind_layout, &targets, &fog)
        })??;

        let mut cascades = CascadeExtents::new(config.shadow_big_extent, config.shadow_small_extent);
        cascades.count = tunables::cascade_count(&tweaks);

        ssao.write_params(&context.queue, &ssao_params, camera.fov_y, &sizes);

        log::info!(
            "Deferred pipeline ready at {}x{} ({} bytes of GPU memory)",
            sizes.width,
            sizes.height,
            accounting.current()
        );

        Ok(Self {
            ssao_enabled: config.enable_ssao,
            shadows_enabled: config.enable_shadows,
            cascade_border: cascades.border(),
            context,
            config,
            shaders,
            accounting,
            targets,
            view,
            ssao_fov: camera.fov_y,
            camera,
            collector: FrameCollector::default(),
            frame: FrameStateMachine::default(),
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
            material_binder,
            geometry,
            ssao,
            shadows,
            lighting,
            composite,
            cascades,
            tweaks,
            ssao_params,
            changes,
        })
    }

    /// Copies the watched values into a private mirror and subscribes to
    /// their changes.
    fn watch_settings(
        registry: &mut SettingsRegistry,
        sender: &Sender<SettingChange>,
    ) -> SettingsRegistry {
        let mut tweaks = SettingsRegistry::new();
        for name in WATCHED_SETTINGS {
            if let Some(value) = registry.query(name) {
                tweaks.set(name, value.clone());
            }
            let sender = sender.clone();
            registry.set_listener(
                name,
                Box::new(move |name, value| {
                    // unsubscribes once the pipeline is gone
                    sender
                        .send(SettingChange {
                            name: name.to_owned(),
                            value: value.clone(),
                        })
                        .is_ok()
                }),
            );
        }
        tweaks
    }

    pub fn add_renderable(&mut self, renderable: Renderable) {
        self.collector.add_renderable(renderable);
    }

    pub fn set_lights(
        &mut self,
        spot: Vec<SpotLight>,
        point: Vec<PointLight>,
        directional: Vec<DirectionalLight>,
    ) {
        self.collector.set_lights(spot, point, directional);
    }

    pub fn update_camera(&mut self, camera: Camera) {
        self.camera = camera;
        if camera.fov_y != self.ssao_fov {
            self.ssao_fov = camera.fov_y;
            self.ssao.write_params(
                &self.context.queue,
                &self.ssao_params,
                camera.fov_y,
                &self.targets.sizes(),
            );
        }
    }

    /// Draws the sky dome behind the geometry of the next frame only.
    pub fn render_sky_dome(&mut self) {
        self.collector.request_sky_dome();
    }

    pub fn enable_ssao(&mut self, enabled: bool) {
        self.ssao_enabled = enabled;
    }

    pub fn enable_shadow_map(&mut self, enabled: bool) {
        self.shadows_enabled = enabled;
    }

    pub fn set_cascade_extents(&mut self, big: f32, small: f32) {
        if !(small > 0.0 && small <= big && big.is_finite()) {
            log::warn!("Ignoring cascade extents big={big} small={small}");
            return;
        }
        self.cascades.big = big;
        self.cascades.small = small;
        self.cascade_border = self.cascades.border();
        log::info!(
            "Cascade extents {big}/{small}, border {:.3}",
            self.cascade_border
        );
    }

    pub fn cascade_extents(&self) -> CascadeExtents {
        self.cascades
    }

    pub fn cascade_border(&self) -> f32 {
        self.cascade_border
    }

    pub fn create_mesh(&mut self, label: &str, data: &MeshData) -> Handle<Mesh> {
        let mesh = Mesh::upload(&self.context.device, label, data, &mut self.accounting);
        self.meshes.insert(mesh)
    }

    pub fn load_mesh(
        &mut self,
        resources: &dyn ResourceProvider,
        name: &str,
    ) -> Result<Handle<Mesh>, GraphicsInitError> {
        let data = load_model(resources, name)?;
        Ok(self.create_mesh(name, &data))
    }

    pub fn mesh_bounds(&self, mesh: Handle<Mesh>) -> Option<Aabb> {
        self.meshes.get(mesh).map(|mesh| mesh.bounds)
    }

    pub fn create_material_set(&mut self, materials: &[MaterialTextures]) -> Handle<MaterialSet> {
        let set = self.material_binder.create_set(
            &self.context.device,
            &self.context.queue,
            materials,
            &mut self.accounting,
        );
        self.materials.insert(set)
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn render_target(&self, target: RenderTarget) -> &wgpu::TextureView {
        self.targets.view(target)
    }

    pub fn render_target_texture(&self, target: RenderTarget) -> &wgpu::Texture {
        self.targets.texture(target)
    }

    /// Fog values the composite programs currently use.
    pub fn fog(&self) -> FogParams {
        self.composite.fog()
    }

    pub fn ambient_strength(&self) -> f32 {
        self.lighting.ambient_strength()
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame.state()
    }

    /// Bytes of GPU memory currently owned by the pipeline.
    pub fn memory_usage(&self) -> u64 {
        self.accounting.current()
    }

    pub fn peak_memory_usage(&self) -> u64 {
        self.accounting.peak()
    }

    pub fn instance_capacity(&self) -> usize {
        self.geometry.instance_capacity()
    }

    pub fn light_capacity(&self) -> usize {
        self.lighting.light_capacity()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsInitError> {
        let sizes = TargetSizes {
            width,
            height,
            ssao: scaled_extent(width, height, self.config.ssao_scale),
            shadow: self.config.shadow_map_size,
        };
        if sizes == self.targets.sizes() {
            return Ok(());
        }
        sizes.validate(self.context.device.limits().max_texture_dimension_2d)?;

        self.context.validated("ResizeTargets", |device| {
            self.targets.recreate(device, sizes, &mut self.accounting);
            self.ssao.rebind(device, &self.targets);
            self.lighting.rebind(device, &self.targets);
            self.composite.rebind(device, &self.targets);
        })?;
        self.ssao.write_params(
            &self.context.queue,
            &self.ssao_params,
            self.camera.fov_y,
            &sizes,
        );
        self.config.width = width;
        self.config.height = height;
        Ok(())
    }

    /// Applies queued setting changes. Failed program rebuilds keep the
    /// previous program and its values.
    pub fn apply_setting_changes(&mut self) {
        let effects = drain_changes(&self.changes, &mut self.tweaks);

        if effects.ssao {
            self.ssao_params = SsaoParams::from_registry(&self.tweaks);
            self.ssao.write_params(
                &self.context.queue,
                &self.ssao_params,
                self.camera.fov_y,
                &self.targets.sizes(),
            );
        }
        if effects.ambient {
            let active = self.lighting.ambient_strength();
            refresh_ambient(&mut self.tweaks, active, |strength| {
                self.lighting
                    .rebuild_ambient(&self.context, &self.shaders, strength)
            });
        }
        if effects.fog {
            let active = self.composite.fog();
            refresh_fog(&mut self.tweaks, &active, |fog| {
                self.composite.rebuild(&self.context, &self.shaders, fog)
            });
        }
        if effects.cascades {
            self.cascades.count = tunables::cascade_count(&self.tweaks);
        }
    }

    /// Renders everything submitted since the last frame and clears the
    /// submissions.
    pub fn render_deferred(&mut self) -> FrameStats {
        self.apply_setting_changes();

        let plan = plan_frame(&PlanInputs {
            renderables: self.collector.renderables(),
            lights: self.collector.lights(),
            camera: &self.camera,
            ssao_enabled: self.ssao_enabled,
            shadows_enabled: self.shadows_enabled,
            cascades: self.cascades,
            sky_dome: self.collector.sky_dome_requested(),
        });

        let device = &self.context.device;
        let queue = &self.context.queue;
        self.geometry.upload(device, queue, &plan, &mut self.accounting);
        self.lighting.upload(device, queue, &plan.lights, &mut self.accounting);

        let sizes = self.targets.sizes();
        self.view.uniform.write(
            queue,
            &ViewUniform::new(&self.camera, sizes.width, sizes.height),
        );
        if let Some(light) = &plan.shadow_light {
            self.shadows.write(
                queue,
                &plan.cascades,
                light,
                self.cascade_border,
                sizes.shadow,
            );
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("DeferredFrame"),
        });
        let mut stats = FrameStats {
            instances_populated: plan.instances.len() as u32,
            ..FrameStats::default()
        };

        for stage in &plan.stages {
            if stage.stage == FrameState::Cleared {
                self.frame.begin(plan.features);
            } else {
                self.frame.advance(stage.stage);
            }
            for pass in &stage.passes {
                self.record_pass(&mut encoder, &plan, *pass, &mut stats);
            }
        }
        self.frame.advance(FrameState::Idle);

        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.collector.clear();

        log::debug!("Frame stats: {stats:?}");
        stats
    }

    fn record_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        plan: &FramePlan,
        pass: PassKind,
        stats: &mut FrameStats,
    ) {
        let view_bind_group = &self.view.bind_group;
        let light_target = self.targets.view(RenderTarget::Light);
        match pass {
            PassKind::Clear(kind) => self.record_clear(encoder, kind),
            PassKind::Geometry => {
                let counts = self.geometry.record(
                    encoder,
                    [
                        self.targets.view(RenderTarget::Diffuse),
                        self.targets.view(RenderTarget::Normal),
                        self.targets.view(RenderTarget::WorldPosition),
                    ],
                    self.targets.depth_view(),
                    view_bind_group,
                    &plan.geometry,
                    &self.meshes,
                    &self.materials,
                );
                stats.individual_draws += counts.singles;
                stats.instanced_draws += counts.batches;
            }
            PassKind::Ssao => {
                self.ssao.record_ssao(encoder, &self.targets, view_bind_group);
                stats.ssao_passes += 1;
            }
            PassKind::Blur(blur) => {
                self.ssao.record_blur(encoder, &self.targets, blur);
                stats.blur_passes += 1;
            }
            PassKind::ShadowDepth { cascade } => {
                let (Some(cascade_plan), Some(light_view)) = (
                    plan.cascades.get(cascade),
                    self.shadows.view_bind_group(cascade),
                ) else {
                    return;
                };
                stats.shadow_draws += self.geometry.record_depth(
                    encoder,
                    self.targets.view(RenderTarget::ShadowDepth),
                    light_view,
                    &cascade_plan.draws,
                    &self.meshes,
                    &self.materials,
                );
            }
            PassKind::ShadowLighting { cascade } => {
                self.shadows.record_lighting(
                    encoder,
                    light_target,
                    view_bind_group,
                    &self.lighting,
                    cascade,
                );
                stats.fullscreen_passes += 1;
            }
            PassKind::SpotVolumes => {
                stats.light_volume_draws += self.lighting.record_spot(
                    encoder,
                    light_target,
                    view_bind_group,
                    plan.spot_range.clone(),
                );
            }
            PassKind::PointVolumes => {
                stats.light_volume_draws += self.lighting.record_point(
                    encoder,
                    light_target,
                    view_bind_group,
                    plan.point_range.clone(),
                );
            }
            PassKind::Directional => {
                self.lighting.record_directional(
                    encoder,
                    light_target,
                    view_bind_group,
                    plan.directional_range.clone(),
                );
                stats.fullscreen_passes += 1;
            }
            PassKind::Ambient => {
                self.lighting
                    .record_ambient(encoder, light_target, view_bind_group);
                stats.fullscreen_passes += 1;
            }
            PassKind::Composite => {
                self.composite
                    .record_composite(encoder, &self.targets, view_bind_group);
                stats.fullscreen_passes += 1;
            }
            PassKind::SkyDome => {
                self.composite
                    .record_sky(encoder, &self.targets, view_bind_group);
                stats.fullscreen_passes += 1;
            }
        }
    }

    fn record_clear(&self, encoder: &mut wgpu::CommandEncoder, kind: ClearKind) {
        let clear = |target: RenderTarget| {
            let value = target.clear_value();
            let color = match target {
                RenderTarget::Diffuse => {
                    let [r, g, b, a] = self.config.clear_color;
                    wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }
                }
                _ => wgpu::Color {
                    r: value,
                    g: value,
                    b: value,
                    a: value,
                },
            };
            Some(wgpu::RenderPassColorAttachment {
                view: self.targets.view(target),
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })
        };
        let clear_depth = |view| {
            Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            })
        };

        let (label, color_attachments, depth_stencil_attachment) = match kind {
            ClearKind::GBuffer => (
                "ClearGBuffer",
                vec![
                    clear(RenderTarget::Diffuse),
                    clear(RenderTarget::Normal),
                    clear(RenderTarget::WorldPosition),
                ],
                clear_depth(self.targets.depth_view()),
            ),
            ClearKind::Light => ("ClearLight", vec![clear(RenderTarget::Light)], None),
            ClearKind::Ssao => (
                "ClearSsao",
                vec![clear(RenderTarget::Ssao), clear(RenderTarget::SsaoPing)],
                None,
            ),
            ClearKind::ShadowDepth => (
                "ClearShadowDepth",
                Vec::new(),
                clear_depth(self.targets.view(RenderTarget::ShadowDepth)),
            ),
        };

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
}

impl Drop for DeferredPipeline {
    fn drop(&mut self) {
        self.geometry.release(&mut self.accounting);
        self.ssao.release(&mut self.accounting);
        self.shadows.release(&mut self.accounting);
        self.lighting.release(&mut self.accounting);
        self.view.uniform.release(&mut self.accounting);
        self.targets.release(&mut self.accounting);
        for mesh in self.meshes.drain() {
            mesh.release(&mut self.accounting);
        }
        for set in self.materials.drain() {
            set.release(&mut self.accounting);
        }
        log::info!(
            "Released deferred pipeline (peak {} bytes, {} still accounted)",
            self.accounting.peak(),
            self.accounting.current()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_effects_route_by_name() {
        assert!(SettingEffects::of(tunables::SSAO_RADIUS).ssao);
        assert!(SettingEffects::of(tunables::FOG_COLOR).fog);
        assert!(SettingEffects::of(tunables::FOG_MAX_DISTANCE).fog);
        assert!(SettingEffects::of(tunables::AMBIENT_STRENGTH).ambient);
        assert!(SettingEffects::of(tunables::SHADOW_CASCADES).cascades);
        assert_eq!(SettingEffects::of("unrelated"), SettingEffects::default());
    }

    #[test]
    fn merged_effects_accumulate() {
        let merged = SettingEffects::of(tunables::SSAO_EPSILON)
            .merge(SettingEffects::of(tunables::FOG_MIN_DISTANCE));
        assert!(merged.ssao && merged.fog);
        assert!(!merged.ambient && !merged.cascades);
    }

    #[test]
    fn every_watched_setting_has_an_effect() {
        for name in WATCHED_SETTINGS {
            assert_ne!(SettingEffects::of(name), SettingEffects::default(), "{name}");
        }
    }

    #[test]
    fn rejected_fog_range_does_not_block_a_later_color() {
        let mut registry = SettingsRegistry::new();
        let (sender, changes) = crossbeam_channel::unbounded();
        let mut tweaks = DeferredPipeline::watch_settings(&mut registry, &sender);
        let active = FogParams::default();
        let mut rebuilt = Vec::new();

        registry.set(tunables::FOG_MIN_DISTANCE, 20000.0f32);
        assert!(drain_changes(&changes, &mut tweaks).fog);
        let applied = refresh_fog(&mut tweaks, &active, |fog| {
            rebuilt.push(*fog);
            Ok(())
        });
        assert_eq!(applied, None);
        assert!(rebuilt.is_empty());
        assert_eq!(FogParams::from_registry(&tweaks), Ok(active));

        registry.set(tunables::FOG_COLOR, "0.2, 0.3, 0.4");
        assert!(drain_changes(&changes, &mut tweaks).fog);
        let applied = refresh_fog(&mut tweaks, &active, |fog| {
            rebuilt.push(*fog);
            Ok(())
        });
        let expected = FogParams {
            color: glam::Vec3::new(0.2, 0.3, 0.4),
            ..active
        };
        assert_eq!(applied, Some(expected));
        assert_eq!(rebuilt, vec![expected]);
    }

    #[test]
    fn failed_rebuilds_restore_the_active_values() {
        let mut tweaks = SettingsRegistry::new();
        tweaks.set(tunables::FOG_COLOR, "1, 0, 0");
        let active = FogParams::default();
        let applied = refresh_fog(&mut tweaks, &active, |_| {
            Err(GraphicsInitError::Validation {
                label: "FogComposite".to_owned(),
                message: "rejected".to_owned(),
            })
        });
        assert_eq!(applied, None);
        assert_eq!(FogParams::from_registry(&tweaks), Ok(active));

        tweaks.set(tunables::AMBIENT_STRENGTH, -1.0f32);
        let applied = refresh_ambient(&mut tweaks, 0.2, |strength| {
            if strength < 0.0 {
                Err(GraphicsInitError::Validation {
                    label: "AmbientPipeline".to_owned(),
                    message: "negative".to_owned(),
                })
            } else {
                Ok(())
            }
        });
        assert_eq!(applied, None);
        assert_eq!(tunables::ambient_strength(&tweaks), 0.2);
    }

    #[test]
    fn listeners_unsubscribe_after_the_pipeline_is_gone() {
        let mut registry = SettingsRegistry::new();
        registry.set(tunables::SSAO_RADIUS, 9.0f32);
        let (sender, changes) = crossbeam_channel::unbounded();
        let tweaks = DeferredPipeline::watch_settings(&mut registry, &sender);
        assert_eq!(tweaks.query_f32(tunables::SSAO_RADIUS, 0.0), 9.0);
        for name in WATCHED_SETTINGS {
            assert_eq!(registry.listener_count(name), 1, "{name}");
        }

        drop(sender);
        drop(changes);
        for name in WATCHED_SETTINGS {
            registry.set(name, 1.0f32);
            assert_eq!(registry.listener_count(name), 0, "{name}");
        }
    }

    #[test]
    fn missing_models_are_reported_by_name() {
        struct NoModels;
        impl ResourceProvider for NoModels {
            fn shader_source(&self, _: &str) -> Option<std::borrow::Cow<'_, str>> {
                None
            }
            fn model_buffer(&self, _: &str) -> Option<std::borrow::Cow<'_, [u8]>> {
                None
            }
        }
        match load_model(&NoModels, LIGHT_SPHERE_MODEL) {
            Err(GraphicsInitError::MissingModel(name)) => assert_eq!(name, LIGHT_SPHERE_MODEL),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn corrupt_models_are_rejected() {
        struct Corrupt;
        impl ResourceProvider for Corrupt {
            fn shader_source(&self, _: &str) -> Option<std::borrow::Cow<'_, str>> {
                None
            }
            fn model_buffer(&self, _: &str) -> Option<std::borrow::Cow<'_, [u8]>> {
                Some(std::borrow::Cow::Borrowed(b"not a model at all"))
            }
        }
        assert!(matches!(
            load_model(&Corrupt, LIGHT_CONE_MODEL),
            Err(GraphicsInitError::InvalidModel { .. })
        ));
    }
}

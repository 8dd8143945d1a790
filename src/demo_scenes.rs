use glam::{Mat4, Quat, Vec3, Vec4};
use log::info;

use deferred_pipeline::{
    Camera, DeferredPipeline, DirectionalLight, EmbeddedResources, GraphicsInitError,
    MaterialTextures, PointLight, Renderable, SpotLight, TextureImage,
};

/// Scenes the demo binary can render.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum DemoScene {
    /// A single ground plane lit by the sun.
    Simple,
    /// `size` x `size` cubes sharing one mesh, so they batch.
    Grid { size: i32 },
}

/// Scene handles built once and resubmitted every frame.
pub struct SceneState {
    renderables: Vec<Renderable>,
    spot: Vec<SpotLight>,
    point: Vec<PointLight>,
    directional: Vec<DirectionalLight>,
}

impl DemoScene {
    pub fn build(
        self,
        pipeline: &mut DeferredPipeline,
        resources: &EmbeddedResources,
    ) -> Result<SceneState, GraphicsInitError> {
        let cube = pipeline.load_mesh(resources, "cube")?;
        let plane = pipeline.load_mesh(resources, "plane")?;
        let checker = pipeline.create_material_set(&[MaterialTextures {
            diffuse: Some(TextureImage::checkerboard(
                64,
                8,
                [200, 200, 200, 255],
                [90, 90, 90, 255],
            )),
            ..MaterialTextures::default()
        }]);
        let plain = pipeline.create_material_set(&[MaterialTextures::default()]);

        let plane_bounds = pipeline.mesh_bounds(plane).unwrap_or_else(unit_bounds);
        let cube_bounds = pipeline.mesh_bounds(cube).unwrap_or_else(unit_bounds);

        let mut renderables = vec![Renderable::new(
            plane,
            checker,
            Mat4::from_scale(Vec3::new(200.0, 1.0, 200.0)),
            plane_bounds,
        )];

        let size = match self {
            DemoScene::Simple => 0,
            DemoScene::Grid { size } => size,
        };
        for x in -size..=size {
            for z in -size..=size {
                let position = Vec3::new(x as f32 * 4.0, 1.0, z as f32 * 4.0);
                let rotation = Quat::from_rotation_y((x * z) as f32 * 0.3);
                let tint = Vec4::new(
                    0.5 + 0.5 * (x as f32 * 0.7).sin(),
                    0.6,
                    0.5 + 0.5 * (z as f32 * 0.9).cos(),
                    1.0,
                );
                renderables.push(
                    Renderable::new(
                        cube,
                        plain,
                        Mat4::from_rotation_translation(rotation, position),
                        cube_bounds,
                    )
                    .with_tint(tint),
                );
            }
        }
        info!(
            "Built {:?} with {} renderables",
            self,
            renderables.len()
        );

        Ok(SceneState {
            renderables,
            spot: vec![SpotLight {
                position: Vec3::new(0.0, 12.0, 0.0),
                direction: Vec3::NEG_Y,
                color: Vec3::new(1.0, 0.9, 0.7),
                intensity: 3.0,
                range: 30.0,
                inner_angle: 20f32.to_radians(),
                outer_angle: 30f32.to_radians(),
            }],
            point: vec![
                PointLight {
                    position: Vec3::new(6.0, 3.0, 6.0),
                    color: Vec3::new(1.0, 0.3, 0.2),
                    intensity: 2.0,
                    range: 12.0,
                },
                PointLight {
                    position: Vec3::new(-6.0, 3.0, -6.0),
                    color: Vec3::new(0.2, 0.4, 1.0),
                    intensity: 2.0,
                    range: 12.0,
                },
            ],
            directional: vec![DirectionalLight {
                direction: Vec3::new(-0.4, -1.0, -0.3),
                color: Vec3::ONE,
                intensity: 1.0,
                casts_shadow: true,
            }],
        })
    }
}

fn unit_bounds() -> deferred_pipeline::Aabb {
    deferred_pipeline::Aabb::new(Vec3::splat(-1.0), Vec3::ONE)
}

impl SceneState {
    /// Queues the scene for the next frame, orbiting the camera by `time`.
    pub fn submit(&self, pipeline: &mut DeferredPipeline, time: f32, aspect: f32) {
        let eye = Vec3::new(time.cos() * 30.0, 14.0, time.sin() * 30.0);
        pipeline.update_camera(Camera::look_at(
            eye,
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            aspect,
            0.1,
            20000.0,
        ));
        for renderable in &self.renderables {
            pipeline.add_renderable(renderable.clone());
        }
        pipeline.set_lights(
            self.spot.clone(),
            self.point.clone(),
            self.directional.clone(),
        );
    }
}

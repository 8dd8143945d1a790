//! Registry-backed parameters of the SSAO, ambient, fog and shadow passes.

use glam::Vec3;

use crate::tweakables::SettingsRegistry;

pub const SSAO_RADIUS: &str = "ssao.radius";
pub const SSAO_EPSILON: &str = "ssao.epsilon";
pub const SSAO_FADE_START: &str = "ssao.fade_start";
pub const SSAO_FADE_END: &str = "ssao.fade_end";
pub const AMBIENT_STRENGTH: &str = "lighting.ambient_strength";
pub const FOG_COLOR: &str = "fog.color";
pub const FOG_MIN_DISTANCE: &str = "fog.min_distance";
pub const FOG_MAX_DISTANCE: &str = "fog.max_distance";
pub const SHADOW_CASCADES: &str = "shadow.cascades";

/// Every setting the pipeline listens to.
pub const WATCHED_SETTINGS: [&str; 9] = [
    SSAO_RADIUS,
    SSAO_EPSILON,
    SSAO_FADE_START,
    SSAO_FADE_END,
    AMBIENT_STRENGTH,
    FOG_COLOR,
    FOG_MIN_DISTANCE,
    FOG_MAX_DISTANCE,
    SHADOW_CASCADES,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsaoParams {
    pub radius: f32,
    pub epsilon: f32,
    pub fade_start: f32,
    pub fade_end: f32,
}

impl Default for SsaoParams {
    fn default() -> Self {
        Self {
            radius: 15.0,
            epsilon: 4.0,
            fade_start: 3.0,
            fade_end: 10.0,
        }
    }
}

impl SsaoParams {
    pub fn from_registry(registry: &SettingsRegistry) -> Self {
        let defaults = Self::default();
        Self {
            radius: registry.query_f32(SSAO_RADIUS, defaults.radius),
            epsilon: registry.query_f32(SSAO_EPSILON, defaults.epsilon),
            fade_start: registry.query_f32(SSAO_FADE_START, defaults.fade_start),
            fade_end: registry.query_f32(SSAO_FADE_END, defaults.fade_end),
        }
    }
}

pub const DEFAULT_AMBIENT_STRENGTH: f32 = 0.2;

pub fn ambient_strength(registry: &SettingsRegistry) -> f32 {
    registry.query_f32(AMBIENT_STRENGTH, DEFAULT_AMBIENT_STRENGTH)
}

pub fn cascade_count(registry: &SettingsRegistry) -> u32 {
    let count = registry.query_f32(SHADOW_CASCADES, 2.0);
    if count < 1.5 {
        1
    } else {
        2
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogParams {
    pub color: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for FogParams {
    fn default() -> Self {
        Self {
            color: Vec3::new(0.5, 0.6, 0.7),
            min_distance: 500.0,
            max_distance: 15000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FogParamError {
    #[error("fog color {0:?} is not three comma-separated numbers")]
    MalformedColor(String),
    #[error("fog distances {min}..{max} are not an increasing finite range")]
    InvalidRange { min: f32, max: f32 },
}

impl FogParams {
    /// Reads the fog settings. Unlike the other tunables a malformed value
    /// is an error, so the caller can keep the previous fog program.
    pub fn from_registry(registry: &SettingsRegistry) -> Result<Self, FogParamError> {
        let defaults = Self::default();
        let color = match registry.query(FOG_COLOR) {
            Some(value) => match value.as_str() {
                Some(text) => parse_color(text)?,
                None => return Err(FogParamError::MalformedColor(format!("{value:?}"))),
            },
            None => defaults.color,
        };
        let min_distance = registry.query_f32(FOG_MIN_DISTANCE, defaults.min_distance);
        let max_distance = registry.query_f32(FOG_MAX_DISTANCE, defaults.max_distance);

        if !(min_distance.is_finite() && max_distance.is_finite() && min_distance < max_distance) {
            return Err(FogParamError::InvalidRange {
                min: min_distance,
                max: max_distance,
            });
        }

        Ok(Self {
            color,
            min_distance,
            max_distance,
        })
    }

    /// Writes these values back under the fog setting names.
    pub fn write_to(&self, registry: &mut SettingsRegistry) {
        let Vec3 { x, y, z } = self.color;
        registry.set(FOG_COLOR, format!("{x},{y},{z}"));
        registry.set(FOG_MIN_DISTANCE, self.min_distance);
        registry.set(FOG_MAX_DISTANCE, self.max_distance);
    }

    /// Values for the composite program's override constants.
    pub fn constants(&self) -> [(&'static str, f64); 5] {
        [
            ("FOG_R", self.color.x as f64),
            ("FOG_G", self.color.y as f64),
            ("FOG_B", self.color.z as f64),
            ("FOG_MIN", self.min_distance as f64),
            ("FOG_MAX", self.max_distance as f64),
        ]
    }
}

fn parse_color(text: &str) -> Result<Vec3, FogParamError> {
    let components: Vec<f32> = text
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| FogParamError::MalformedColor(text.to_owned()))?;
    match components.as_slice() {
        [r, g, b] if components.iter().all(|c| c.is_finite()) => Ok(Vec3::new(*r, *g, *b)),
        _ => Err(FogParamError::MalformedColor(text.to_owned())),
    }
}

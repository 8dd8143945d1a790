use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Construction-time configuration of the deferred pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "PipelineConfig::default_width")]
    pub width: u32,
    #[serde(default = "PipelineConfig::default_height")]
    pub height: u32,
    /// Resolution of the SSAO targets relative to the output, in `(0, 1]`.
    #[serde(default = "PipelineConfig::default_ssao_scale")]
    pub ssao_scale: f32,
    #[serde(default = "PipelineConfig::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default = "PipelineConfig::default_shadow_big_extent")]
    pub shadow_big_extent: f32,
    #[serde(default = "PipelineConfig::default_shadow_small_extent")]
    pub shadow_small_extent: f32,
    #[serde(default = "PipelineConfig::default_instance_capacity")]
    pub instance_capacity: usize,
    #[serde(default = "PipelineConfig::default_light_capacity")]
    pub light_capacity: usize,
    #[serde(default = "PipelineConfig::default_enabled")]
    pub enable_ssao: bool,
    #[serde(default = "PipelineConfig::default_enabled")]
    pub enable_shadows: bool,
    #[serde(default = "PipelineConfig::default_clear_color")]
    pub clear_color: [f32; 4],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            height: Self::default_height(),
            ssao_scale: Self::default_ssao_scale(),
            shadow_map_size: Self::default_shadow_map_size(),
            shadow_big_extent: Self::default_shadow_big_extent(),
            shadow_small_extent: Self::default_shadow_small_extent(),
            instance_capacity: Self::default_instance_capacity(),
            light_capacity: Self::default_light_capacity(),
            enable_ssao: Self::default_enabled(),
            enable_shadows: Self::default_enabled(),
            clear_color: Self::default_clear_color(),
        }
    }
}

impl PipelineConfig {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<PipelineConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded pipeline config from {:?}", path);
                    config.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default pipeline config.",
                        path, err
                    );
                    PipelineConfig::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Pipeline config file {:?} not found. Using default config.",
                    path
                );
                PipelineConfig::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default pipeline config.",
                    path, err
                );
                PipelineConfig::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.width == 0 || self.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.width = Self::default_width();
            self.height = Self::default_height();
        }

        if !(self.ssao_scale > 0.0 && self.ssao_scale <= 1.0) {
            warn!(
                "SSAO scale {} is outside (0, 1]. Using default value.",
                self.ssao_scale
            );
            self.ssao_scale = Self::default_ssao_scale();
        }

        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        let extents_valid = self.shadow_small_extent.is_finite()
            && self.shadow_big_extent.is_finite()
            && self.shadow_small_extent > 0.0
            && self.shadow_small_extent <= self.shadow_big_extent;
        if !extents_valid {
            warn!(
                "Cascade extents big={} small={} are invalid. Using defaults.",
                self.shadow_big_extent, self.shadow_small_extent
            );
            self.shadow_big_extent = Self::default_shadow_big_extent();
            self.shadow_small_extent = Self::default_shadow_small_extent();
        }

        if self.instance_capacity == 0 {
            self.instance_capacity = Self::default_instance_capacity();
        }
        if self.light_capacity == 0 {
            self.light_capacity = Self::default_light_capacity();
        }

        self
    }

    /// Dimensions of the SSAO targets, never smaller than one texel.
    pub fn ssao_extent(&self) -> (u32, u32) {
        scaled_extent(self.width, self.height, self.ssao_scale)
    }

    const fn default_width() -> u32 {
        1280
    }

    const fn default_height() -> u32 {
        720
    }

    const fn default_ssao_scale() -> f32 {
        0.5
    }

    const fn default_shadow_map_size() -> u32 {
        2048
    }

    const fn default_shadow_big_extent() -> f32 {
        20000.0
    }

    const fn default_shadow_small_extent() -> f32 {
        3000.0
    }

    const fn default_instance_capacity() -> usize {
        256
    }

    const fn default_light_capacity() -> usize {
        32
    }

    const fn default_enabled() -> bool {
        true
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }
}

pub(crate) fn scaled_extent(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale_dim = |dim: u32| ((dim as f32 * scale).round() as u32).max(1);
    (scale_dim(width), scale_dim(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_config() -> PipelineConfig {
        PipelineConfig {
            width: 0,
            height: 0,
            ssao_scale: 1.5,
            shadow_map_size: 0,
            shadow_big_extent: 100.0,
            shadow_small_extent: 500.0,
            instance_capacity: 0,
            light_capacity: 0,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_config().validate();
        let defaults = PipelineConfig::default();

        assert_eq!(validated.width, defaults.width);
        assert_eq!(validated.height, defaults.height);
        assert_eq!(validated.ssao_scale, defaults.ssao_scale);
        assert_eq!(validated.shadow_map_size, defaults.shadow_map_size);
        assert_eq!(validated.shadow_big_extent, defaults.shadow_big_extent);
        assert_eq!(validated.shadow_small_extent, defaults.shadow_small_extent);
        assert_eq!(validated.instance_capacity, defaults.instance_capacity);
        assert_eq!(validated.light_capacity, defaults.light_capacity);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = PipelineConfig {
            width: 1920,
            height: 1080,
            ssao_scale: 1.0,
            shadow_map_size: 4096,
            shadow_big_extent: 5000.0,
            shadow_small_extent: 1000.0,
            instance_capacity: 8,
            light_capacity: 4,
            enable_ssao: false,
            enable_shadows: false,
            clear_color: [0.2, 0.3, 0.4, 1.0],
        };

        assert_eq!(valid.clone().validate(), valid);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{ "width": 640 }"#).unwrap();
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 720);
        assert!(config.enable_ssao);
        assert_eq!(config.shadow_big_extent, 20000.0);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = PipelineConfig::load_from_path("definitely/not/here.json");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn ssao_extent_is_scaled_and_clamped() {
        let config = PipelineConfig {
            width: 1280,
            height: 720,
            ssao_scale: 0.5,
            ..PipelineConfig::default()
        };
        assert_eq!(config.ssao_extent(), (640, 360));
        assert_eq!(scaled_extent(1, 1, 0.25), (1, 1));
    }
}

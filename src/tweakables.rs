//! Named, tweakable parameters with change notification.
//!
//! Listeners run synchronously inside [`SettingsRegistry::set`], on whatever
//! thread performs the mutation. They must not assume a frame is in flight.

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Number(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SettingValue::Number(value) => Some(*value as f32),
            SettingValue::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(text) => Some(text),
            SettingValue::Number(_) => None,
        }
    }
}

impl From<f32> for SettingValue {
    fn from(value: f32) -> Self {
        SettingValue::Number(value as f64)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Number(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_owned())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

/// Change callback. Returning `false` unsubscribes it.
pub type SettingListener = Box<dyn FnMut(&str, &SettingValue) -> bool + Send>;

#[derive(Default)]
pub struct SettingsRegistry {
    values: HashMap<String, SettingValue>,
    listeners: HashMap<String, Vec<SettingListener>>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a flat JSON object of `name -> number | string`.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let root: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(entries) = root else {
            return Err(SettingsError::NotAnObject);
        };

        let mut registry = Self::new();
        for (name, value) in entries {
            match serde_json::from_value::<SettingValue>(value) {
                Ok(value) => {
                    registry.values.insert(name, value);
                }
                Err(err) => warn!("Ignoring setting {name:?}: {err}"),
            }
        }
        Ok(registry)
    }

    /// Loads a registry from disk, falling back to an empty registry (and
    /// therefore to every consumer's defaults) when the file is missing or
    /// malformed.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(registry) => {
                    info!(
                        "Loaded {} tweakable settings from {:?}",
                        registry.values.len(),
                        path
                    );
                    registry
                }
                Err(err) => {
                    warn!("Failed to parse {:?} ({}). Using default settings.", path, err);
                    Self::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Settings file {:?} not found. Using default settings.", path);
                Self::new()
            }
            Err(err) => {
                warn!("Failed to read {:?} ({}). Using default settings.", path, err);
                Self::new()
            }
        }
    }

    pub fn query(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    /// Numeric lookup; missing or non-numeric values yield `default`.
    pub fn query_f32(&self, name: &str, default: f32) -> f32 {
        self.query(name)
            .and_then(SettingValue::as_f32)
            .unwrap_or(default)
    }

    pub fn query_str(&self, name: &str) -> Option<&str> {
        self.query(name).and_then(SettingValue::as_str)
    }

    /// Inserts `value` only when `name` has no value yet. Does not notify.
    pub fn register_default(&mut self, name: &str, value: impl Into<SettingValue>) {
        self.values
            .entry(name.to_owned())
            .or_insert_with(|| value.into());
    }

    /// Stores the value and fires every listener registered for `name`,
    /// dropping those that ask to be removed.
    pub fn set(&mut self, name: &str, value: impl Into<SettingValue>) {
        let value = value.into();
        if let Some(listeners) = self.listeners.get_mut(name) {
            listeners.retain_mut(|listener| listener(name, &value));
        }
        self.values.insert(name.to_owned(), value);
    }

    pub fn set_listener(&mut self, name: &str, listener: SettingListener) {
        self.listeners
            .entry(name.to_owned())
            .or_default()
            .push(listener);
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.get(name).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn query_f32_falls_back_to_default() {
        let mut registry = SettingsRegistry::new();
        assert_eq!(registry.query_f32("ssao.radius", 15.0), 15.0);

        registry.set("ssao.radius", 7.5f32);
        assert_eq!(registry.query_f32("ssao.radius", 15.0), 7.5);

        registry.set("ssao.radius", "not a number");
        assert_eq!(registry.query_f32("ssao.radius", 15.0), 15.0);
    }

    #[test]
    fn listeners_fire_synchronously_with_new_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut registry = SettingsRegistry::new();
        registry.set_listener(
            "fog.min_distance",
            Box::new(move |name, value| {
                sink.lock()
                    .unwrap()
                    .push((name.to_owned(), value.as_f32()));
                true
            }),
        );

        registry.set("fog.min_distance", 250.0f32);
        registry.set("fog.max_distance", 900.0f32);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("fog.min_distance".to_owned(), Some(250.0))]);
    }

    #[test]
    fn listeners_returning_false_are_dropped() {
        let mut registry = SettingsRegistry::new();
        let mut remaining = 2;
        registry.set_listener(
            "ssao.radius",
            Box::new(move |_, _| {
                remaining -= 1;
                remaining > 0
            }),
        );
        registry.set_listener("ssao.radius", Box::new(|_, _| true));

        registry.set("ssao.radius", 1.0f32);
        assert_eq!(registry.listener_count("ssao.radius"), 2);
        registry.set("ssao.radius", 2.0f32);
        assert_eq!(registry.listener_count("ssao.radius"), 1);
        assert_eq!(registry.listener_count("fog.color"), 0);
    }

    #[test]
    fn register_default_does_not_overwrite() {
        let mut registry = SettingsRegistry::new();
        registry.set("lighting.ambient_strength", 0.4f32);
        registry.register_default("lighting.ambient_strength", 0.2f32);
        assert_eq!(registry.query_f32("lighting.ambient_strength", 0.0), 0.4);
    }

    #[test]
    fn from_json_reads_numbers_and_strings() {
        let registry =
            SettingsRegistry::from_json_str(r#"{ "ssao.radius": 12, "fog.color": "1,0,0" }"#)
                .unwrap();
        assert_eq!(registry.query_f32("ssao.radius", 0.0), 12.0);
        assert_eq!(registry.query_str("fog.color"), Some("1,0,0"));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(
            SettingsRegistry::from_json_str("[1, 2]"),
            Err(SettingsError::NotAnObject)
        ));
    }
}

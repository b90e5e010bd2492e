use crate::core::schema::ALL_SENSORS;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown setting '{key}'")]
    UnknownKey { key: String },

    #[error("Invalid value '{value}' for '{key}': expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}

pub const KNOWN_KEYS: &[&str] = &[
    "theme",
    "show_histogram",
    "rgb_histogram",
    "histogram_type",
    "active_sensors",
    "last_dir",
];

/// User preferences. Keys missing from the settings file take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: String,
    pub show_histogram: bool,
    pub rgb_histogram: bool,
    pub histogram_type: String,
    pub active_sensors: Vec<String>,
    pub last_dir: String,
    /// Keys this version does not know about, written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            show_histogram: true,
            rgb_histogram: true,
            histogram_type: "step".to_string(),
            active_sensors: ALL_SENSORS.iter().map(|s| s.to_string()).collect(),
            last_dir: String::new(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    pub fn is_dark(&self) -> bool {
        self.theme != "light"
    }

    pub fn toggle_theme(&mut self) {
        self.theme = if self.is_dark() { "light" } else { "dark" }.to_string();
    }

    /// Header text for the active sensor filter.
    pub fn sensor_filter_label(&self) -> String {
        if self.active_sensors.len() == ALL_SENSORS.len() {
            "All sensors".to_string()
        } else if self.active_sensors.is_empty() {
            "No sensors".to_string()
        } else {
            self.active_sensors.join(", ")
        }
    }

    /// Current value of a known key, formatted for display.
    pub fn get(&self, key: &str) -> Result<String, SettingsError> {
        let value = match key {
            "theme" => self.theme.clone(),
            "show_histogram" => self.show_histogram.to_string(),
            "rgb_histogram" => self.rgb_histogram.to_string(),
            "histogram_type" => self.histogram_type.clone(),
            "active_sensors" => self.active_sensors.join(", "),
            "last_dir" => self.last_dir.clone(),
            _ => {
                return Err(SettingsError::UnknownKey {
                    key: key.to_string(),
                });
            }
        };
        Ok(value)
    }

    /// Set a known key from its textual form.
    ///
    /// `active_sensors` takes a comma separated list of sensor labels, or
    /// `all`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let value = value.trim();
        match key {
            "theme" => self.theme = one_of(key, value, &["dark", "light"])?,
            "show_histogram" => self.show_histogram = parse_bool(key, value)?,
            "rgb_histogram" => self.rgb_histogram = parse_bool(key, value)?,
            "histogram_type" => self.histogram_type = one_of(key, value, &["step", "bar"])?,
            "active_sensors" => self.active_sensors = parse_sensors(key, value)?,
            "last_dir" => self.last_dir = value.to_string(),
            _ => {
                return Err(SettingsError::UnknownKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn one_of(key: &str, value: &str, allowed: &[&str]) -> Result<String, SettingsError> {
    let lowered = value.to_lowercase();
    if allowed.contains(&lowered.as_str()) {
        Ok(lowered)
    } else {
        Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: allowed.join(" or "),
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "true or false".to_string(),
        }),
    }
}

fn parse_sensors(key: &str, value: &str) -> Result<Vec<String>, SettingsError> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(ALL_SENSORS.iter().map(|s| s.to_string()).collect());
    }

    let mut sensors: Vec<String> = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some(sensor) = ALL_SENSORS.iter().find(|s| s.eq_ignore_ascii_case(part)) else {
            return Err(SettingsError::InvalidValue {
                key: key.to_string(),
                value: part.to_string(),
                expected: format!("one of {} or 'all'", ALL_SENSORS.join(", ")),
            });
        };
        if !sensors.iter().any(|s| s == sensor) {
            sensors.push(sensor.to_string());
        }
    }
    // Keep generation order regardless of input order.
    sensors.sort_by_key(|s| ALL_SENSORS.iter().position(|known| *known == s.as_str()));
    Ok(sensors)
}

/// JSON-backed settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings merged over the defaults. Never fails: an unreadable or
    /// invalid file yields the defaults.
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            return Settings::default();
        }
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "Ignoring settings file {}: {}",
                    self.path.display(),
                    e
                );
                Settings::default()
            }
        }
    }

    fn try_load(&self) -> Result<Settings, SettingsError> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the full settings mapping, indented by four spaces.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let mut json = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, formatter);
        settings.serialize(&mut serializer)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

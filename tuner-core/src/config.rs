//! # Configuration Module
//!
//! Settings a caller hands to a tuning session: how sensitive the detector
//! is, which tuning preset to compare against, auto or manual string
//! selection, and how the spectral analyzer is dimensioned. Configurations
//! are stored as pretty-printed JSON.

use crate::error::ConfigError;
use crate::pitch::{DEFAULT_SENSITIVITY_DB, SearchBand};
use crate::strings::{self, TargetMode, TuningPreset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Dimensions of the spectral analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerSettings {
    /// Transform size in samples. 8192 at 44.1 kHz gives ~5.4 Hz bins,
    /// which parabolic interpolation refines to well under 1 Hz.
    pub fft_size: usize,
    pub sample_rate: u32,
    /// Noise floor in dB; quieter bins are raised to this value.
    pub min_db: f32,
    /// Top of the byte-scaled display range in dB.
    pub max_db: f32,
    /// Weight of the previous snapshot when smoothing, in [0, 1).
    pub smoothing: f32,
    /// Frequencies searched for the fundamental.
    pub band: SearchBand,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            fft_size: 8192,
            sample_rate: 44100,
            min_db: -90.0,
            max_db: -10.0,
            smoothing: 0.3,
            band: SearchBand::default(),
        }
    }
}

impl AnalyzerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(ConfigError::InvalidSetting(format!(
                "fft_size must be a power of two of at least 32, got {}",
                self.fft_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSetting("sample_rate must be positive".into()));
        }
        if !(self.min_db < self.max_db) {
            return Err(ConfigError::InvalidSetting(format!(
                "min_db ({}) must be below max_db ({})",
                self.min_db, self.max_db
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::InvalidSetting(format!(
                "smoothing must be in [0, 1), got {}",
                self.smoothing
            )));
        }
        self.band
            .validate(self.sample_rate)
            .map_err(ConfigError::InvalidSetting)?;
        Ok(())
    }
}

/// Named sensitivity levels. Lower floors accept quieter, noisier peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    #[serde(alias = "High")]
    High,
    #[serde(alias = "Medium")]
    Medium,
    #[serde(alias = "Low")]
    Low,
}

impl Sensitivity {
    pub fn decibels(self) -> f32 {
        match self {
            Sensitivity::High => -40.0,
            Sensitivity::Medium => DEFAULT_SENSITIVITY_DB,
            Sensitivity::Low => -60.0,
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensitivity::High => "high",
            Sensitivity::Medium => "medium",
            Sensitivity::Low => "low",
        };
        f.write_str(name)
    }
}

impl FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Sensitivity::High),
            "medium" => Ok(Sensitivity::Medium),
            "low" => Ok(Sensitivity::Low),
            other => Err(format!("unknown sensitivity '{other}'")),
        }
    }
}

/// Detector floor given as a named level or as a decibel value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensitivitySetting {
    Level(Sensitivity),
    Decibels(f32),
}

impl Default for SensitivitySetting {
    fn default() -> Self {
        SensitivitySetting::Level(Sensitivity::Medium)
    }
}

impl SensitivitySetting {
    pub fn decibels(self) -> f32 {
        match self {
            SensitivitySetting::Level(level) => level.decibels(),
            SensitivitySetting::Decibels(db) => db,
        }
    }

    pub fn validate(self) -> Result<(), ConfigError> {
        let db = self.decibels();
        if !db.is_finite() || db > 0.0 {
            return Err(ConfigError::InvalidSetting(format!(
                "sensitivity must be a negative dB floor, got {db}"
            )));
        }
        Ok(())
    }
}

impl FromStr for SensitivitySetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(level) = s.parse::<Sensitivity>() {
            return Ok(SensitivitySetting::Level(level));
        }
        let db: f32 = s.trim().parse().map_err(|_| {
            ConfigError::InvalidSetting(format!(
                "sensitivity must be high, medium, low or a number of dB, got '{s}'"
            ))
        })?;
        let setting = SensitivitySetting::Decibels(db);
        setting.validate()?;
        Ok(setting)
    }
}

/// A built-in preset referenced by name, or a preset spelled out inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresetChoice {
    Named(String),
    Custom(TuningPreset),
}

impl Default for PresetChoice {
    fn default() -> Self {
        PresetChoice::Named(strings::STANDARD.to_string())
    }
}

impl PresetChoice {
    pub fn resolve(&self) -> Result<TuningPreset, ConfigError> {
        match self {
            PresetChoice::Named(name) => strings::preset(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownPreset(name.clone())),
            PresetChoice::Custom(preset) => {
                preset.validate()?;
                Ok(preset.clone())
            }
        }
    }
}

/// Everything a tuning session needs from its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunerConfig {
    /// Floor a spectral peak must exceed to count as a note.
    pub sensitivity: SensitivitySetting,
    pub preset: PresetChoice,
    pub mode: TargetMode,
    pub analyzer: AnalyzerSettings,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            sensitivity: SensitivitySetting::default(),
            preset: PresetChoice::default(),
            mode: TargetMode::Auto,
            analyzer: AnalyzerSettings::default(),
        }
    }
}

impl TunerConfig {
    /// Loads and validates a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TunerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        log::info!("Loaded tuner config from {}", path.display());
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every setting and returns the resolved tuning preset.
    pub fn validate(&self) -> Result<TuningPreset, ConfigError> {
        self.sensitivity.validate()?;
        self.analyzer.validate()?;

        let preset = self.preset.resolve()?;
        self.mode.validate(&preset)?;
        Ok(preset)
    }
}

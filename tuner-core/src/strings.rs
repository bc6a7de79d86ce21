//! # Guitar Strings Module
//!
//! Tuning presets, the built-in preset catalog and the string matcher that
//! decides which string the player is most likely tuning.
//!
//! ## Target selection
//! - [`TargetMode::Auto`]: pick the preset string nearest the detected pitch
//! - [`TargetMode::Manual`]: the caller fixed a string; no matching happens

use crate::error::ConfigError;
use crate::note::{self, PitchClass};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Name of the default preset.
pub const STANDARD: &str = "Standard";

/// One open string of a tuning preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunedString {
    pub note: PitchClass,
    /// Target frequency in Hz.
    pub frequency: f64,
    /// String number, 6 (lowest) to 1 (highest).
    pub string: u8,
}

impl TunedString {
    /// Deviation of `frequency` from this string's target, in cents.
    pub fn cents_from(&self, frequency: f64) -> f64 {
        note::cents_deviation(frequency, self.frequency)
    }
}

/// An ordered set of target strings, lowest string first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningPreset {
    pub name: String,
    pub strings: Vec<TunedString>,
}

impl TuningPreset {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for s in &self.strings {
            if !(1..=6).contains(&s.string) {
                return Err(ConfigError::InvalidSetting(format!(
                    "preset {} has string number {} outside 1-6",
                    self.name, s.string
                )));
            }
            if !(s.frequency.is_finite() && s.frequency > 0.0) {
                return Err(ConfigError::InvalidSetting(format!(
                    "preset {} has invalid frequency {} for string {}",
                    self.name, s.frequency, s.string
                )));
            }
        }
        Ok(())
    }

    /// Looks up a string by its number.
    pub fn string(&self, number: u8) -> Option<&TunedString> {
        self.strings.iter().find(|s| s.string == number)
    }

    /// Returns the string whose target is closest to `frequency`.
    ///
    /// Ties go to the string listed first. `None` only for an empty preset.
    pub fn nearest_string(&self, frequency: f64) -> Option<&TunedString> {
        let mut nearest: Option<(&TunedString, f64)> = None;
        for s in &self.strings {
            let difference = (frequency - s.frequency).abs();
            match nearest {
                None => nearest = Some((s, difference)),
                Some((_, smallest)) if difference < smallest => nearest = Some((s, difference)),
                _ => {}
            }
        }
        nearest.map(|(s, _)| s)
    }

    /// Resolves the string being tuned under `mode`.
    pub fn target(&self, mode: TargetMode, frequency: f64) -> Option<&TunedString> {
        match mode {
            TargetMode::Auto => self.nearest_string(frequency),
            TargetMode::Manual { string } => self.string(string),
        }
    }
}

/// How the string being tuned is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetMode {
    #[default]
    Auto,
    Manual { string: u8 },
}

impl TargetMode {
    /// Manual mode must name a string that exists in `preset`.
    pub fn validate(&self, preset: &TuningPreset) -> Result<(), ConfigError> {
        match *self {
            TargetMode::Auto => Ok(()),
            TargetMode::Manual { string } if preset.string(string).is_some() => Ok(()),
            TargetMode::Manual { string } => Err(ConfigError::UnknownString {
                preset: preset.name.clone(),
                string,
            }),
        }
    }
}

fn preset_of(name: &str, strings: [(PitchClass, f64); 6]) -> TuningPreset {
    TuningPreset {
        name: name.to_string(),
        strings: strings
            .into_iter()
            .zip((1..=6).rev())
            .map(|((note, frequency), string)| TunedString {
                note,
                frequency,
                string,
            })
            .collect(),
    }
}

/// Built-in presets in display order.
static PRESETS: Lazy<Vec<TuningPreset>> = Lazy::new(|| {
    use PitchClass::{A, B, D, E, G};
    vec![
        preset_of(
            STANDARD,
            [(E, 82.41), (A, 110.00), (D, 146.83), (G, 196.00), (B, 246.94), (E, 329.63)],
        ),
        preset_of(
            "Drop D",
            [(D, 73.42), (A, 110.00), (D, 146.83), (G, 196.00), (B, 246.94), (E, 329.63)],
        ),
        preset_of(
            "Open G",
            [(D, 73.42), (G, 98.00), (D, 146.83), (G, 196.00), (B, 246.94), (D, 293.66)],
        ),
        preset_of(
            "DADGAD",
            [(D, 73.42), (A, 110.00), (D, 146.83), (G, 196.00), (A, 220.00), (D, 293.66)],
        ),
    ]
});

pub fn presets() -> &'static [TuningPreset] {
    &PRESETS
}

/// Finds a built-in preset by name, ignoring case.
pub fn preset(name: &str) -> Option<&'static TuningPreset> {
    let name = name.trim();
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

fn position(name: &str) -> usize {
    PRESETS
        .iter()
        .position(|p| p.name.eq_ignore_ascii_case(name.trim()))
        .unwrap_or(0)
}

/// The preset after `name`, wrapping to the first. Unknown names count as
/// the first preset.
pub fn next_preset(name: &str) -> &'static TuningPreset {
    &PRESETS[(position(name) + 1) % PRESETS.len()]
}

/// The preset before `name`, wrapping to the last.
pub fn previous_preset(name: &str) -> &'static TuningPreset {
    let len = PRESETS.len();
    &PRESETS[(position(name) + len - 1) % len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn standard() -> &'static TuningPreset {
        preset(STANDARD).unwrap()
    }

    #[test]
    fn standard_tuning_layout() {
        let p = standard();
        let numbers: Vec<u8> = p.strings.iter().map(|s| s.string).collect();
        assert_eq!(numbers, vec![6, 5, 4, 3, 2, 1]);
        assert_eq!(p.string(6).unwrap().frequency, 82.41);
        assert_eq!(p.string(1).unwrap().note, PitchClass::E);
        assert!(presets().iter().all(|p| p.validate().is_ok()));
    }

    #[test]
    fn matcher_picks_the_closest_string() {
        let s = standard().nearest_string(83.0).unwrap();
        assert_eq!(s.string, 6);
        assert_eq!(s.frequency, 82.41);

        assert_eq!(standard().nearest_string(150.0).unwrap().string, 4);
        assert_eq!(standard().nearest_string(900.0).unwrap().string, 1);
        assert_eq!(standard().nearest_string(10.0).unwrap().string, 6);
    }

    #[test]
    fn ties_go_to_the_first_string() {
        let preset = TuningPreset {
            name: "Tie".into(),
            strings: vec![
                TunedString { note: PitchClass::A, frequency: 100.0, string: 2 },
                TunedString { note: PitchClass::B, frequency: 120.0, string: 1 },
            ],
        };
        assert_eq!(preset.nearest_string(110.0).unwrap().string, 2);
    }

    #[test]
    fn empty_preset_matches_nothing() {
        let preset = TuningPreset { name: "Empty".into(), strings: vec![] };
        assert!(preset.nearest_string(110.0).is_none());
    }

    #[test]
    fn manual_mode_bypasses_matching() {
        let p = standard();
        let target = p.target(TargetMode::Manual { string: 1 }, 83.0).unwrap();
        assert_eq!(target.frequency, 329.63);
        assert_eq!(p.target(TargetMode::Auto, 83.0).unwrap().string, 6);
        assert!(p.target(TargetMode::Manual { string: 7 }, 83.0).is_none());
    }

    #[test]
    fn preset_navigation_wraps() {
        assert_eq!(next_preset("Standard").name, "Drop D");
        assert_eq!(next_preset("dadgad").name, "Standard");
        assert_eq!(previous_preset("Standard").name, "DADGAD");
        assert_eq!(previous_preset("Open G").name, "Drop D");
    }

    #[test]
    fn string_relative_cents() {
        let a = standard().string(5).unwrap();
        assert_abs_diff_eq!(a.cents_from(110.0), 0.0, epsilon = 1e-9);
        assert!(a.cents_from(111.0) > 0.0);
        assert!(a.cents_from(109.0) < 0.0);
    }

    #[test]
    fn mode_serializes_with_a_kind_tag() {
        let json = serde_json::to_string(&TargetMode::Manual { string: 6 }).unwrap();
        assert_eq!(json, r#"{"kind":"manual","string":6}"#);
        let auto: TargetMode = serde_json::from_str(r#"{"kind":"auto"}"#).unwrap();
        assert_eq!(auto, TargetMode::Auto);
    }

    #[test]
    fn invalid_custom_preset() {
        let preset = TuningPreset {
            name: "Broken".into(),
            strings: vec![TunedString { note: PitchClass::E, frequency: -1.0, string: 6 }],
        };
        assert!(preset.validate().is_err());
    }
}

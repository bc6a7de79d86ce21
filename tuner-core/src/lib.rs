// tuner-core/src/lib.rs

//! The core logic for the guitar tuner.
//! This crate is responsible for audio capture, spectral analysis, pitch
//! detection and note naming. It is completely headless and contains no
//! GUI code.

pub mod accuracy;
pub mod audio;
pub mod config;
pub mod error;
pub mod note;
pub mod pitch;
pub mod session;
pub mod spectrum;
pub mod strings;

pub use accuracy::{Accuracy, AccuracyTier, classify};
pub use audio::{AnalyzerHandle, CaptureBackend, CaptureConstraints, CpalBackend, acquire};
pub use config::{AnalyzerSettings, Sensitivity, SensitivitySetting, TunerConfig};
pub use error::{AcquireError, ConfigError};
pub use note::{NoteReading, PitchClass, frequency_to_note};
pub use pitch::PitchDetector;
pub use session::{TunerReading, TunerSession};
pub use spectrum::MagnitudeSpectrum;
pub use strings::{TargetMode, TunedString, TuningPreset};

/// The pitch found in a single analysis frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchEstimate {
    /// The detected frequency in Hz.
    pub frequency: f64,
    /// The name of the nearest note, e.g. `"A4"`.
    pub note: String,
    /// The deviation from the nearest note in cents, within [-50, 50].
    pub cents: i32,
    /// The pitch class of the nearest note.
    pub pitch_class: PitchClass,
    /// The scientific octave number of the nearest note (A4 is octave 4).
    pub octave: i32,
}

impl PitchEstimate {
    /// Names the note nearest to `frequency`; `None` for non-positive input.
    pub fn from_frequency(frequency: f64) -> Option<Self> {
        let reading = frequency_to_note(frequency)?;
        Some(Self {
            frequency,
            note: reading.name(),
            cents: reading.cents,
            pitch_class: reading.pitch_class,
            octave: reading.octave,
        })
    }
}

//! # Tuning Session
//!
//! One listening session: owns the audio input while listening and runs
//! the analysis pipeline once per tick.
//!
//! ```text
//! AnalyzerHandle::sample -> PitchDetector::detect -> accuracy::classify
//!                                                 -> TuningPreset::target
//! ```
//!
//! Every tick is independent. A tick without a clear note yields `None` and
//! the next tick simply tries again.

use crate::PitchEstimate;
use crate::accuracy::{self, Accuracy};
use crate::audio::{self, AnalyzerHandle, CaptureBackend, CaptureConstraints};
use crate::config::{AnalyzerSettings, TunerConfig};
use crate::error::{AcquireError, ConfigError};
use crate::pitch::PitchDetector;
use crate::spectrum::MagnitudeSpectrum;
use crate::strings::{self, TargetMode, TunedString, TuningPreset};

/// Result of one successful analysis tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerReading {
    pub estimate: PitchEstimate,
    /// Classification of the note-relative cents.
    pub accuracy: Accuracy,
    /// The string being tuned, if the preset has one for this mode.
    pub target: Option<TunedString>,
    /// Deviation of the detected frequency from `target`, in cents.
    pub target_cents: Option<f64>,
}

/// Runs detection, classification and string selection on one spectrum.
pub fn analyze_spectrum(
    spectrum: &MagnitudeSpectrum,
    detector: &PitchDetector,
    preset: &TuningPreset,
    mode: TargetMode,
) -> Option<TunerReading> {
    let estimate = detector.detect(spectrum)?;
    let accuracy = accuracy::classify(estimate.cents);
    let target = preset.target(mode, estimate.frequency).cloned();
    let target_cents = target.as_ref().map(|s| s.cents_from(estimate.frequency));

    Some(TunerReading {
        estimate,
        accuracy,
        target,
        target_cents,
    })
}

/// A tuner bound to one capture backend.
///
/// The device is claimed by [`start`](Self::start) and released by
/// [`stop`](Self::stop), by a stream fault, or when the session is dropped.
pub struct TunerSession<B: CaptureBackend> {
    backend: B,
    constraints: CaptureConstraints,
    settings: AnalyzerSettings,
    detector: PitchDetector,
    preset: TuningPreset,
    mode: TargetMode,
    analyzer: Option<AnalyzerHandle<B::Stream>>,
}

impl<B: CaptureBackend> TunerSession<B> {
    pub fn new(backend: B, config: &TunerConfig) -> Result<Self, ConfigError> {
        let preset = config.validate()?;
        let constraints = CaptureConstraints {
            sample_rate: config.analyzer.sample_rate,
            ..CaptureConstraints::default()
        };
        Ok(Self {
            backend,
            constraints,
            settings: config.analyzer.clone(),
            detector: PitchDetector::new(config.sensitivity.decibels())
                .with_band(config.analyzer.band),
            preset,
            mode: config.mode,
            analyzer: None,
        })
    }

    /// Claims the audio input. Does nothing if already listening.
    pub fn start(&mut self) -> Result<(), AcquireError> {
        if self.is_listening() {
            return Ok(());
        }
        // A handle left behind by a faulted stream is already released.
        self.analyzer = None;

        let handle = audio::acquire(&mut self.backend, &self.constraints, &self.settings)?;
        self.analyzer = Some(handle);
        log::info!(
            "Listening with preset {} ({:?}), sensitivity {} dB",
            self.preset.name,
            self.mode,
            self.detector.sensitivity_db()
        );
        Ok(())
    }

    /// Releases the audio input. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.analyzer.take() {
            handle.release();
            log::info!("Stopped listening");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.analyzer.as_ref().is_some_and(|h| h.is_acquired())
    }

    /// Analyzes the newest audio.
    ///
    /// # Returns
    /// * `Some(reading)` - A note was detected this tick
    /// * `None` - Not listening, no new audio, or no note above the floor
    pub fn tick(&mut self) -> Option<TunerReading> {
        let handle = self.analyzer.as_mut()?;
        let spectrum = handle.sample();
        if !handle.is_acquired() {
            log::warn!("Audio input lost, listening stopped");
            self.stop();
            return None;
        }
        analyze_spectrum(&spectrum?, &self.detector, &self.preset, self.mode)
    }

    pub fn preset(&self) -> &TuningPreset {
        &self.preset
    }

    pub fn mode(&self) -> TargetMode {
        self.mode
    }

    pub fn sensitivity_db(&self) -> f32 {
        self.detector.sensitivity_db()
    }

    pub fn set_sensitivity_db(&mut self, sensitivity_db: f32) -> Result<(), ConfigError> {
        if !sensitivity_db.is_finite() {
            return Err(ConfigError::InvalidSetting(format!(
                "sensitivity_db must be finite, got {sensitivity_db}"
            )));
        }
        self.detector.set_sensitivity_db(sensitivity_db);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: TargetMode) -> Result<(), ConfigError> {
        mode.validate(&self.preset)?;
        self.mode = mode;
        Ok(())
    }

    /// Switches presets. A manual string must also exist in the new preset.
    pub fn set_preset(&mut self, preset: TuningPreset) -> Result<(), ConfigError> {
        preset.validate()?;
        self.mode.validate(&preset)?;
        log::info!("Tuning preset changed to {}", preset.name);
        self.preset = preset;
        Ok(())
    }

    /// Moves to the next built-in preset.
    pub fn next_preset(&mut self) -> Result<(), ConfigError> {
        self.set_preset(strings::next_preset(&self.preset.name).clone())
    }

    /// Moves to the previous built-in preset.
    pub fn previous_preset(&mut self) -> Result<(), ConfigError> {
        self.set_preset(strings::previous_preset(&self.preset.name).clone())
    }
}

impl<B: CaptureBackend> Drop for TunerSession<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

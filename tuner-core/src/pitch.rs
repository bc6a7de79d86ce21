//! # Pitch Detection Module
//!
//! Finds the dominant fundamental of a plucked guitar string in a decibel
//! magnitude spectrum.
//!
//! ## Algorithm
//! 1. Restrict the search to the guitar band (80-1000 Hz by default)
//! 2. Take the loudest bin in that band, rejecting the spectrum if nothing
//!    clears the sensitivity floor
//! 3. Refine the bin with parabolic interpolation over its two neighbours
//! 4. Convert the fractional bin into Hz and name the note

use crate::PitchEstimate;
use crate::spectrum::MagnitudeSpectrum;
use serde::{Deserialize, Serialize};

/// Default decibel floor a peak must exceed.
pub const DEFAULT_SENSITIVITY_DB: f32 = -50.0;

/// Frequency range searched for the fundamental.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchBand {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl Default for SearchBand {
    fn default() -> Self {
        Self {
            min_hz: 80.0,
            max_hz: 1000.0,
        }
    }
}

impl SearchBand {
    pub fn validate(&self, sample_rate: u32) -> Result<(), String> {
        let nyquist = sample_rate as f64 / 2.0;
        if !(self.min_hz > 0.0 && self.min_hz < self.max_hz && self.max_hz <= nyquist) {
            return Err(format!(
                "search band {}-{} Hz must be increasing and within 0-{} Hz",
                self.min_hz, self.max_hz, nyquist
            ));
        }
        Ok(())
    }
}

/// Spectral peak picker for guitar fundamentals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchDetector {
    sensitivity_db: f32,
    band: SearchBand,
}

impl Default for PitchDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVITY_DB)
    }
}

impl PitchDetector {
    pub fn new(sensitivity_db: f32) -> Self {
        Self {
            sensitivity_db,
            band: SearchBand::default(),
        }
    }

    pub fn with_band(mut self, band: SearchBand) -> Self {
        self.band = band;
        self
    }

    pub fn sensitivity_db(&self) -> f32 {
        self.sensitivity_db
    }

    pub fn set_sensitivity_db(&mut self, sensitivity_db: f32) {
        self.sensitivity_db = sensitivity_db;
    }

    pub fn band(&self) -> SearchBand {
        self.band
    }

    /// Detects the fundamental in `spectrum`.
    ///
    /// # Returns
    /// * `Some(estimate)` - Refined frequency with note name and cents
    /// * `None` - No bin in the search band rises above the sensitivity floor
    pub fn detect(&self, spectrum: &MagnitudeSpectrum) -> Option<PitchEstimate> {
        let peak = self.find_peak(spectrum)?;
        let bin = interpolate_peak(spectrum.bins(), peak);
        let frequency = spectrum.bin_frequency(bin);
        let estimate = PitchEstimate::from_frequency(frequency);
        if let Some(estimate) = &estimate {
            log::debug!(
                "Peak at bin {peak} ({bin:.3}) -> {:.2} Hz {} {:+} cents",
                estimate.frequency,
                estimate.note,
                estimate.cents
            );
        }
        estimate
    }

    /// Index of the loudest bin inside the search band.
    ///
    /// Only bins strictly louder than the sensitivity floor qualify. Among
    /// equally loud bins the lowest index wins.
    pub fn find_peak(&self, spectrum: &MagnitudeSpectrum) -> Option<usize> {
        let len = spectrum.len();
        let start = spectrum.bin_for_frequency(self.band.min_hz).min(len);
        let end = spectrum.bin_for_frequency(self.band.max_hz).min(len);
        if start >= end {
            return None;
        }

        let mut peak: Option<(usize, f32)> = None;
        for (offset, &magnitude) in spectrum.bins()[start..end].iter().enumerate() {
            if magnitude <= self.sensitivity_db {
                continue;
            }
            match peak {
                Some((_, loudest)) if magnitude <= loudest => {}
                _ => peak = Some((start + offset, magnitude)),
            }
        }

        if peak.is_none() {
            log::trace!("No bin above {} dB in {}..{}", self.sensitivity_db, start, end);
        }
        peak.map(|(bin, _)| bin)
    }
}

/// Refines a peak bin to sub-bin precision.
///
/// Fits a parabola through the peak and its two neighbours and returns the
/// vertex position. Falls back to the raw bin at the spectrum edges, on a
/// flat top, or when the neighbours are not finite.
pub fn interpolate_peak(bins: &[f32], peak: usize) -> f64 {
    let raw = peak as f64;
    if peak == 0 || peak + 1 >= bins.len() {
        return raw;
    }

    let y1 = bins[peak - 1] as f64;
    let y2 = bins[peak] as f64;
    let y3 = bins[peak + 1] as f64;
    if !(y1.is_finite() && y2.is_finite() && y3.is_finite()) {
        return raw;
    }

    let curvature = (y1 - 2.0 * y2 + y3) / 2.0;
    if curvature == 0.0 {
        return raw;
    }
    let slope = (y3 - y1) / 2.0;
    let offset = -slope / (2.0 * curvature);

    // A vertex further than one bin away means the three points are not a peak.
    if offset.abs() > 1.0 { raw } else { raw + offset }
}

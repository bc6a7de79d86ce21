//! # Spectrum Module
//!
//! Turns time-domain audio frames into decibel magnitude spectra for the
//! pitch detector.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - DC offset removal and Hann windowing to limit spectral leakage
//! - Exponential smoothing between consecutive snapshots
//! - Decibel conversion with a configurable noise floor

use crate::config::AnalyzerSettings;
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// A snapshot of spectral magnitudes in decibels.
///
/// Bin `i` covers the frequency `i * sample_rate / (2 * len)`, so a spectrum
/// produced by an FFT of size `N` holds `N / 2` bins up to the Nyquist
/// frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeSpectrum {
    bins: Vec<f32>,
    sample_rate: u32,
}

impl MagnitudeSpectrum {
    pub fn new(bins: Vec<f32>, sample_rate: u32) -> Self {
        Self { bins, sample_rate }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Size of the transform this spectrum came from.
    pub fn fft_size(&self) -> usize {
        self.bins.len() * 2
    }

    /// Width of one bin in Hz.
    pub fn bin_width(&self) -> f64 {
        if self.bins.is_empty() {
            return 0.0;
        }
        self.sample_rate as f64 / self.fft_size() as f64
    }

    /// Frequency in Hz of a (possibly fractional) bin index.
    pub fn bin_frequency(&self, bin: f64) -> f64 {
        bin * self.bin_width()
    }

    /// Index of the bin containing `frequency`, rounded down.
    pub fn bin_for_frequency(&self, frequency: f64) -> usize {
        let nyquist = self.sample_rate as f64 / 2.0;
        if nyquist <= 0.0 || frequency <= 0.0 {
            return 0;
        }
        (frequency * self.bins.len() as f64 / nyquist).floor() as usize
    }

    /// Rescales the decibel values linearly onto 0..=255 between `min_db`
    /// and `max_db`, clipping outside that range. Meant for level meters
    /// and spectrum displays.
    pub fn to_byte_scale(&self, min_db: f32, max_db: f32) -> Vec<u8> {
        let range = max_db - min_db;
        self.bins
            .iter()
            .map(|&db| {
                if range <= 0.0 || !db.is_finite() {
                    return if db >= max_db { u8::MAX } else { 0 };
                }
                let scaled = 255.0 * (db - min_db) / range;
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Hann window coefficients for a frame of `n` samples.
fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Stateful FFT front end producing one [`MagnitudeSpectrum`] per frame.
///
/// Linear magnitudes are blended with the previous snapshot using the
/// smoothing time constant before they are converted to decibels, so a
/// single analyzer should be used per capture session.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    sample_rate: u32,
    smoothing: f32,
    min_db: f32,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size())
            .field("sample_rate", &self.sample_rate)
            .field("smoothing", &self.smoothing)
            .field("min_db", &self.min_db)
            .finish()
    }
}

impl SpectrumAnalyzer {
    /// Plans the FFT for `settings.fft_size`. The settings are expected to
    /// have passed [`AnalyzerSettings::validate`].
    pub fn new(settings: &AnalyzerSettings) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(settings.fft_size);
        Self {
            fft,
            window: hann_window(settings.fft_size),
            sample_rate: settings.sample_rate,
            smoothing: settings.smoothing,
            min_db: settings.min_db,
            smoothed: vec![0.0; settings.fft_size / 2],
            buffer: Vec::with_capacity(settings.fft_size),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
    }

    /// Analyzes exactly one frame of `fft_size` samples.
    ///
    /// # Returns
    /// * `Some(spectrum)` - Decibel spectrum with `fft_size / 2` bins
    /// * `None` - The frame has the wrong length
    pub fn analyze(&mut self, frame: &[f32]) -> Option<MagnitudeSpectrum> {
        let n = self.fft_size();
        if frame.len() != n || n == 0 {
            log::trace!("Rejected frame of {} samples, expected {}", frame.len(), n);
            return None;
        }

        // A non-finite sample would turn every bin, and the smoothing state, into NaN.
        let mut signal: Vec<f32> = frame
            .iter()
            .map(|&sample| if sample.is_finite() { sample } else { 0.0 })
            .collect();
        remove_dc_offset(&mut signal);

        self.buffer.clear();
        self.buffer.extend(
            signal
                .iter()
                .zip(&self.window)
                .map(|(&sample, &w)| Complex { re: sample * w, im: 0.0 }),
        );
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        let tau = self.smoothing;
        let min_db = self.min_db;
        let bins = self
            .smoothed
            .iter_mut()
            .zip(&self.buffer)
            .map(|(previous, bin)| {
                let magnitude = bin.norm() * scale;
                *previous = tau * *previous + (1.0 - tau) * magnitude;
                if !previous.is_finite() {
                    *previous = 0.0;
                }
                let db = 20.0 * previous.log10();
                if db.is_finite() { db.max(min_db) } else { min_db }
            })
            .collect();

        Some(MagnitudeSpectrum::new(bins, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(frequency: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn bin_geometry_follows_sample_rate_and_size() {
        let spectrum = MagnitudeSpectrum::new(vec![-90.0; 4096], 44100);
        assert_eq!(spectrum.fft_size(), 8192);
        assert_relative_eq!(spectrum.bin_width(), 44100.0 / 8192.0);
        assert_relative_eq!(spectrum.bin_frequency(10.0), 10.0 * 44100.0 / 8192.0);
        assert_eq!(spectrum.bin_for_frequency(80.0), 14);
        assert_eq!(spectrum.bin_for_frequency(1000.0), 185);
    }

    #[test]
    fn byte_scale_clips_to_range() {
        let spectrum = MagnitudeSpectrum::new(vec![-100.0, -90.0, -50.0, -10.0, 0.0], 44100);
        assert_eq!(spectrum.to_byte_scale(-90.0, -10.0), vec![0, 0, 127, 255, 255]);
    }

    #[test]
    fn silence_sits_on_the_noise_floor() {
        let settings = AnalyzerSettings::default();
        let mut analyzer = SpectrumAnalyzer::new(&settings);
        let spectrum = analyzer.analyze(&vec![0.0; settings.fft_size]).unwrap();
        assert_eq!(spectrum.len(), settings.fft_size / 2);
        assert!(spectrum.bins().iter().all(|&db| db == settings.min_db));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let settings = AnalyzerSettings::default();
        let mut analyzer = SpectrumAnalyzer::new(&settings);
        let frame = sine(440.0, 0.5, settings.sample_rate, settings.fft_size);
        let spectrum = analyzer.analyze(&frame).unwrap();

        let (peak, _) = spectrum
            .bins()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        let expected = (440.0 / spectrum.bin_width()).round() as usize;
        assert!(peak.abs_diff(expected) <= 1, "peak {peak}, expected {expected}");
        assert!(spectrum.bins()[peak] > -30.0);
    }

    #[test]
    fn smoothing_carries_energy_into_the_next_snapshot() {
        let settings = AnalyzerSettings::default();
        let mut analyzer = SpectrumAnalyzer::new(&settings);
        let frame = sine(440.0, 0.5, settings.sample_rate, settings.fft_size);
        let loud = analyzer.analyze(&frame).unwrap();
        let decayed = analyzer.analyze(&vec![0.0; settings.fft_size]).unwrap();
        let bin = spectrum_peak(&loud);
        assert!(decayed.bins()[bin] > settings.min_db);
        assert!(decayed.bins()[bin] < loud.bins()[bin]);

        analyzer.reset();
        let cleared = analyzer.analyze(&vec![0.0; settings.fft_size]).unwrap();
        assert_eq!(cleared.bins()[bin], settings.min_db);
    }

    #[test]
    fn non_finite_samples_do_not_stick() {
        let settings = AnalyzerSettings::default();
        let mut analyzer = SpectrumAnalyzer::new(&settings);
        let clean = sine(110.0, 0.5, settings.sample_rate, settings.fft_size);
        let mut bad = clean.clone();
        bad[100] = f32::NAN;
        bad[200] = f32::INFINITY;

        let first = analyzer.analyze(&bad).unwrap();
        assert!(first.bins().iter().all(|db| db.is_finite()));

        let spectrum = analyzer.analyze(&clean).unwrap();
        let expected = (110.0 / spectrum.bin_width()).round() as usize;
        assert!(spectrum_peak(&spectrum).abs_diff(expected) <= 1);
        assert!(spectrum.bins()[expected] > -40.0);
    }

    #[test]
    fn wrong_frame_length_is_rejected() {
        let mut analyzer = SpectrumAnalyzer::new(&AnalyzerSettings::default());
        assert!(analyzer.analyze(&[0.0; 100]).is_none());
    }

    fn spectrum_peak(spectrum: &MagnitudeSpectrum) -> usize {
        spectrum
            .bins()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }
}

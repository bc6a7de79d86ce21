//! # Audio Capture Module
//!
//! The spectral analyzer: claims an audio input, buffers the incoming
//! samples and hands out decibel spectra on demand.
//!
//! ## Features
//! - Capture backends behind the [`CaptureBackend`] trait, with a CPAL
//!   (Cross-Platform Audio Library) implementation for real devices
//! - Raw, unprocessed mono input at a fixed sample rate
//! - Non-blocking snapshots: [`AnalyzerHandle::sample`] never waits
//! - Scoped device ownership: the input is released exactly once, either
//!   explicitly or when the handle is dropped

use crate::config::AnalyzerSettings;
use crate::error::AcquireError;
use crate::spectrum::{MagnitudeSpectrum, SpectrumAnalyzer};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::cell::Cell;
use std::rc::Rc;

/// Number of captured chunks that may queue up between two snapshots.
const FRAME_QUEUE_CAPACITY: usize = 256;

/// Requirements placed on the capture device.
///
/// Platform DSP (echo cancellation, automatic gain, noise suppression)
/// distorts the fundamental, so all three must stay off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: false,
            auto_gain_control: false,
            noise_suppression: false,
            sample_rate: 44100,
            channel_count: 1,
        }
    }
}

impl CaptureConstraints {
    pub fn validate(&self) -> Result<(), AcquireError> {
        if self.echo_cancellation || self.auto_gain_control || self.noise_suppression {
            return Err(AcquireError::UnsupportedFormat(
                "pitch analysis needs a raw signal; disable echo cancellation, auto gain and noise suppression".into(),
            ));
        }
        if self.channel_count != 1 {
            return Err(AcquireError::UnsupportedFormat(format!(
                "analysis runs on mono input, {} channels requested",
                self.channel_count
            )));
        }
        if self.sample_rate == 0 {
            return Err(AcquireError::UnsupportedFormat("sample rate must be positive".into()));
        }
        Ok(())
    }
}

/// Problems reported by a running stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    /// The device went away or access was revoked.
    Disconnected,
    Other(String),
}

/// Where a backend delivers mono samples and stream faults.
#[derive(Debug, Clone)]
pub struct FrameSink {
    frames: Sender<Vec<f32>>,
    faults: Sender<StreamFault>,
}

impl FrameSink {
    /// Queues a chunk of mono samples, dropping it if the consumer lags.
    pub fn push_frame(&self, samples: Vec<f32>) {
        let _ = self.frames.try_send(samples);
    }

    pub fn report_fault(&self, fault: StreamFault) {
        let _ = self.faults.try_send(fault);
    }
}

/// A running capture stream.
pub trait CaptureStream {
    /// Stops capture and frees the device. Must tolerate repeated calls.
    fn stop(&mut self);
}

/// Something that can open an input device.
pub trait CaptureBackend {
    type Stream: CaptureStream;

    /// Starts capturing mono samples at `constraints.sample_rate` into `sink`.
    ///
    /// Implementations must not leave the device claimed when they fail.
    fn open(
        &mut self,
        constraints: &CaptureConstraints,
        sink: FrameSink,
    ) -> Result<Self::Stream, AcquireError>;
}

/// Exclusive claim on an audio input plus the analyzer reading from it.
pub struct AnalyzerHandle<S: CaptureStream> {
    stream: Option<S>,
    frames: Receiver<Vec<f32>>,
    faults: Receiver<StreamFault>,
    window: Vec<f32>,
    analyzer: SpectrumAnalyzer,
}

impl<S: CaptureStream> std::fmt::Debug for AnalyzerHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerHandle")
            .field("acquired", &self.is_acquired())
            .field("buffered", &self.window.len())
            .field("analyzer", &self.analyzer)
            .finish()
    }
}

/// Claims an input through `backend` and prepares an analyzer for it.
///
/// # Errors
/// * `DeviceUnavailable` - No input device exists
/// * `PermissionDenied` - The user or OS refused access
/// * `AlreadyInUse` - The device is claimed elsewhere
/// * `UnsupportedFormat` - The constraints or settings cannot be met
pub fn acquire<B: CaptureBackend>(
    backend: &mut B,
    constraints: &CaptureConstraints,
    settings: &AnalyzerSettings,
) -> Result<AnalyzerHandle<B::Stream>, AcquireError> {
    constraints.validate()?;
    settings
        .validate()
        .map_err(|e| AcquireError::UnsupportedFormat(e.to_string()))?;
    if settings.sample_rate != constraints.sample_rate {
        return Err(AcquireError::UnsupportedFormat(format!(
            "analyzer expects {} Hz but capture is configured for {} Hz",
            settings.sample_rate, constraints.sample_rate
        )));
    }

    let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE_CAPACITY);
    let (fault_tx, fault_rx) = crossbeam_channel::bounded(8);
    let sink = FrameSink {
        frames: frame_tx,
        faults: fault_tx,
    };

    let stream = backend.open(constraints, sink)?;
    log::info!(
        "Audio input acquired: {} Hz mono, FFT size {}",
        constraints.sample_rate,
        settings.fft_size
    );

    Ok(AnalyzerHandle {
        stream: Some(stream),
        frames: frame_rx,
        faults: fault_rx,
        window: Vec::with_capacity(settings.fft_size * 2),
        analyzer: SpectrumAnalyzer::new(settings),
    })
}

impl<S: CaptureStream> AnalyzerHandle<S> {
    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns a spectrum of the latest `fft_size` samples.
    ///
    /// # Returns
    /// * `Some(spectrum)` - New audio arrived since the last call
    /// * `None` - Nothing new yet, the first window is still filling, the
    ///   handle was released, or the stream faulted (which also releases it)
    pub fn sample(&mut self) -> Option<MagnitudeSpectrum> {
        if self.stream.is_none() {
            return None;
        }

        if let Ok(fault) = self.faults.try_recv() {
            match &fault {
                StreamFault::Disconnected => log::warn!("Audio input disconnected"),
                StreamFault::Other(message) => log::warn!("Audio stream error: {message}"),
            }
            self.release();
            return None;
        }

        let mut received = false;
        while let Ok(frame) = self.frames.try_recv() {
            self.window.extend_from_slice(&frame);
            received = true;
        }
        if !received {
            return None;
        }

        let fft_size = self.analyzer.fft_size();
        if self.window.len() > fft_size {
            let excess = self.window.len() - fft_size;
            self.window.drain(..excess);
        }
        if self.window.len() < fft_size {
            return None;
        }

        self.analyzer.analyze(&self.window)
    }

    /// Stops capture and frees the device. Calling it again does nothing.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            self.window.clear();
            self.analyzer.reset();
            log::info!("Audio input released");
        }
    }
}

impl<S: CaptureStream> Drop for AnalyzerHandle<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Backend for the host's default input device.
///
/// Tracks its own claim so a second `open` while a stream is live reports
/// `AlreadyInUse` instead of stacking streams on one device.
#[derive(Debug, Default)]
pub struct CpalBackend {
    claimed: Rc<Cell<bool>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A live CPAL input stream.
pub struct CpalStream {
    stream: Option<cpal::Stream>,
    claimed: Rc<Cell<bool>>,
}

impl CaptureStream for CpalStream {
    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Error pausing stream: {e}");
            }
            drop(stream);
            self.claimed.set(false);
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CaptureBackend for CpalBackend {
    type Stream = CpalStream;

    fn open(
        &mut self,
        constraints: &CaptureConstraints,
        sink: FrameSink,
    ) -> Result<CpalStream, AcquireError> {
        constraints.validate()?;
        if self.claimed.get() {
            return Err(AcquireError::AlreadyInUse);
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AcquireError::DeviceUnavailable)?;
        log::info!(
            "Using audio input device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string())
        );

        let configs = device
            .supported_input_configs()
            .map_err(|e| match e {
                cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
                    AcquireError::DeviceUnavailable
                }
                other => classify_backend_message(&other.to_string()),
            })?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, constraints.sample_rate).ok_or_else(|| {
            AcquireError::UnsupportedFormat(format!(
                "no 32-bit float input at {} Hz",
                constraints.sample_rate
            ))
        })?;

        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(constraints.sample_rate))
            .into();
        log::info!(
            "Selected input format: {} Hz, {} channel(s)",
            constraints.sample_rate,
            channels
        );

        let fault_sink = sink.clone();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.push_frame(downmix(data, channels));
                },
                move |err| {
                    let fault = match err {
                        cpal::StreamError::DeviceNotAvailable => StreamFault::Disconnected,
                        other => StreamFault::Other(other.to_string()),
                    };
                    fault_sink.report_fault(fault);
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => AcquireError::DeviceUnavailable,
                cpal::BuildStreamError::StreamConfigNotSupported => {
                    AcquireError::UnsupportedFormat("stream configuration not supported".into())
                }
                other => classify_backend_message(&other.to_string()),
            })?;

        // On failure `stream` is dropped here, which closes the device.
        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => AcquireError::DeviceUnavailable,
            other => classify_backend_message(&other.to_string()),
        })?;

        self.claimed.set(true);
        Ok(CpalStream {
            stream: Some(stream),
            claimed: Rc::clone(&self.claimed),
        })
    }
}

/// Maps a host-specific failure message onto the acquisition taxonomy.
fn classify_backend_message(message: &str) -> AcquireError {
    let lower = message.to_ascii_lowercase();
    if ["permission", "denied", "not allowed", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        AcquireError::PermissionDenied
    } else if ["busy", "in use", "exclusive"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        AcquireError::AlreadyInUse
    } else {
        AcquireError::Backend(message.to_string())
    }
}

/// Picks a 32-bit float input configuration supporting `target_rate`,
/// preferring mono over multi-channel layouts.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| {
            c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate().0 <= target_rate
                && c.max_sample_rate().0 >= target_rate
        })
        .min_by_key(|c| c.channels())
}

/// Averages interleaved channels into one mono signal.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

//! In-memory capture device shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use tuner_core::AcquireError;
use tuner_core::audio::{CaptureBackend, CaptureConstraints, CaptureStream, FrameSink, StreamFault};

#[derive(Default)]
struct DeviceState {
    sink: Option<FrameSink>,
    claimed: bool,
    refuse_with: Option<AcquireError>,
    opens: usize,
    stops: usize,
    sample_rate: u32,
}

/// A fake microphone. Clones share the same device, so a test can keep one
/// clone to feed audio while the session owns another.
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Rc<RefCell<DeviceState>>,
}

pub struct FakeStream {
    state: Rc<RefCell<DeviceState>>,
    running: bool,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `open` fail with `err`.
    pub fn refuse(&self, err: AcquireError) {
        self.state.borrow_mut().refuse_with = Some(err);
    }

    pub fn allow(&self) {
        self.state.borrow_mut().refuse_with = None;
    }

    pub fn is_claimed(&self) -> bool {
        self.state.borrow().claimed
    }

    pub fn opens(&self) -> usize {
        self.state.borrow().opens
    }

    pub fn stops(&self) -> usize {
        self.state.borrow().stops
    }

    /// Feeds `len` samples of a sine wave into the running stream.
    pub fn play_sine(&self, frequency: f64, amplitude: f64, len: usize) {
        let state = self.state.borrow();
        let Some(sink) = &state.sink else { return };
        let rate = state.sample_rate as f64;
        let samples = (0..len)
            .map(|i| {
                (amplitude * (2.0 * std::f64::consts::PI * frequency * i as f64 / rate).sin())
                    as f32
            })
            .collect();
        sink.push_frame(samples);
    }

    /// Feeds arbitrary samples into the running stream.
    pub fn play_samples(&self, samples: Vec<f32>) {
        if let Some(sink) = &self.state.borrow().sink {
            sink.push_frame(samples);
        }
    }

    pub fn play_silence(&self, len: usize) {
        if let Some(sink) = &self.state.borrow().sink {
            sink.push_frame(vec![0.0; len]);
        }
    }

    /// Simulates the device being unplugged or access being revoked.
    pub fn disconnect(&self) {
        if let Some(sink) = &self.state.borrow().sink {
            sink.report_fault(StreamFault::Disconnected);
        }
    }
}

impl CaptureStream for FakeStream {
    fn stop(&mut self) {
        if self.running {
            self.running = false;
            let mut state = self.state.borrow_mut();
            state.claimed = false;
            state.sink = None;
            state.stops += 1;
        }
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CaptureBackend for FakeDevice {
    type Stream = FakeStream;

    fn open(
        &mut self,
        constraints: &CaptureConstraints,
        sink: FrameSink,
    ) -> Result<FakeStream, AcquireError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.refuse_with.clone() {
            return Err(err);
        }
        if state.claimed {
            return Err(AcquireError::AlreadyInUse);
        }
        state.claimed = true;
        state.opens += 1;
        state.sink = Some(sink);
        state.sample_rate = constraints.sample_rate;
        Ok(FakeStream {
            state: Rc::clone(&self.state),
            running: true,
        })
    }
}

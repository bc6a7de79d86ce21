//! # Tuning Accuracy
//!
//! Buckets a cents deviation into a display tier and a needle position.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The needle covers -50..=50 cents, half a semitone either side.
pub const NEEDLE_RANGE: i32 = 50;

/// How close a note is to its target, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccuracyTier {
    Perfect,
    VeryGood,
    Good,
    Close,
    Off,
}

impl AccuracyTier {
    /// Classifies an absolute deviation in cents.
    pub fn from_cents(cents: i32) -> Self {
        match cents.unsigned_abs() {
            0..=3 => AccuracyTier::Perfect,
            4..=8 => AccuracyTier::VeryGood,
            9..=15 => AccuracyTier::Good,
            16..=25 => AccuracyTier::Close,
            _ => AccuracyTier::Off,
        }
    }

    /// Human-readable status, independent of any colour scheme.
    pub fn label(self) -> &'static str {
        match self {
            AccuracyTier::Perfect => "Perfect",
            AccuracyTier::VeryGood => "Very Good",
            AccuracyTier::Good => "Good",
            AccuracyTier::Close => "Close",
            AccuracyTier::Off => "Off",
        }
    }

    pub fn is_in_tune(self) -> bool {
        self == AccuracyTier::Perfect
    }
}

impl fmt::Display for AccuracyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accuracy {
    pub tier: AccuracyTier,
    /// `cents` clamped to [-NEEDLE_RANGE, NEEDLE_RANGE].
    pub needle: i32,
}

pub fn classify(cents: i32) -> Accuracy {
    Accuracy {
        tier: AccuracyTier::from_cents(cents),
        needle: cents.clamp(-NEEDLE_RANGE, NEEDLE_RANGE),
    }
}

//! # Note Naming Module
//!
//! Converts frequencies into equal-tempered note names and measures how far a
//! frequency sits from the nearest semitone in cents.
//!
//! ## Conventions
//! - Reference pitch A4 = 440 Hz, 12-tone equal temperament
//! - Octave numbers change at C (scientific pitch notation)
//! - Names use sharps: C, C#, D, D#, E, F, F#, G, G#, A, A#, B
//!
//! ## Frequencies below C0
//! The mapper is total over every finite positive frequency. Inputs below C0
//! extrapolate downwards: the pitch class is still normalised into the
//! twelve chromatic names and the octave simply becomes negative (for
//! example 10 Hz is `D#-1`). The pitch detector never reports anything below
//! its 80 Hz band, so in practice this only matters to direct callers.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Concert pitch used as the tuning reference.
pub const A4_FREQUENCY: f64 = 440.0;

/// Semitones between C0 and A4.
const C0_TO_A4_SEMITONES: i32 = 57;

/// One of the twelve chromatic pitch classes, starting at C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    /// The chromatic sequence, indexed by semitone above C.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Returns the pitch class `semitones` above C, wrapping every octave.
    pub fn from_semitone(semitones: i32) -> Self {
        Self::ALL[semitones.rem_euclid(12) as usize]
    }

    /// Semitones above C (0..=11).
    pub fn semitone(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Spellings accepted when parsing a pitch class, flats included.
static PITCH_CLASS_NAMES: Lazy<BTreeMap<&'static str, PitchClass>> = Lazy::new(|| {
    let mut names: BTreeMap<&'static str, PitchClass> =
        PitchClass::ALL.iter().map(|pc| (pc.name(), *pc)).collect();
    names.insert("Db", PitchClass::CSharp);
    names.insert("Eb", PitchClass::DSharp);
    names.insert("Gb", PitchClass::FSharp);
    names.insert("Ab", PitchClass::GSharp);
    names.insert("Bb", PitchClass::ASharp);
    names
});

impl FromStr for PitchClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PITCH_CLASS_NAMES
            .get(s.trim())
            .copied()
            .ok_or_else(|| format!("unknown note name '{s}'"))
    }
}

/// The nearest equal-tempered note to a frequency and the deviation from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteReading {
    pub pitch_class: PitchClass,
    pub octave: i32,
    /// Signed deviation from `target_frequency`, always within [-50, 50].
    pub cents: i32,
    /// Exact frequency of the nearest semitone.
    pub target_frequency: f64,
}

impl NoteReading {
    /// Note name with octave, e.g. `"A4"` or `"C#3"`.
    pub fn name(&self) -> String {
        format!("{}{}", self.pitch_class, self.octave)
    }
}

/// Frequency of C0, 4.75 octaves below A4.
pub fn c0_frequency() -> f64 {
    A4_FREQUENCY * 2f64.powf(-(C0_TO_A4_SEMITONES as f64) / 12.0)
}

/// Rounds half-way values towards positive infinity.
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Maps a frequency to the nearest equal-tempered note.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
///
/// # Returns
/// * `Some(reading)` - Nearest note, its octave and the deviation in cents
/// * `None` - `frequency` is not a finite value above zero
pub fn frequency_to_note(frequency: f64) -> Option<NoteReading> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }

    let c0 = c0_frequency();
    let semitones = round_half_up(12.0 * (frequency / c0).log2());
    if !semitones.is_finite() || semitones.abs() > i32::MAX as f64 {
        return None;
    }
    let semitones = semitones as i32;

    let target_frequency = c0 * 2f64.powf(semitones as f64 / 12.0);
    let cents = round_half_up(cents_deviation(frequency, target_frequency)) as i32;
    debug_assert!((-50..=50).contains(&cents), "cents out of range: {cents}");

    Some(NoteReading {
        pitch_class: PitchClass::from_semitone(semitones),
        octave: semitones.div_euclid(12),
        cents,
        target_frequency,
    })
}

/// Equal-tempered frequency of a note, e.g. `note_frequency(PitchClass::A, 4) == 440.0`.
pub fn note_frequency(pitch_class: PitchClass, octave: i32) -> f64 {
    let from_a4 = pitch_class.semitone() - PitchClass::A.semitone() + (octave - 4) * 12;
    A4_FREQUENCY * 2f64.powf(from_a4 as f64 / 12.0)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 100 cents is one semitone.
pub fn cents_deviation(frequency: f64, target_frequency: f64) -> f64 {
    1200.0 * (frequency / target_frequency).log2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn a4_is_exact() {
        let reading = frequency_to_note(440.0).unwrap();
        assert_eq!(reading.name(), "A4");
        assert_eq!(reading.cents, 0);
        assert_relative_eq!(reading.target_frequency, 440.0, epsilon = 1e-9);
    }

    #[test]
    fn every_semitone_of_octave_four_has_zero_cents() {
        let expected = [
            "C4", "C#4", "D4", "D#4", "E4", "F4", "F#4", "G4", "G#4", "A4", "A#4", "B4",
        ];
        for (pitch_class, name) in PitchClass::ALL.iter().zip(expected) {
            let reading = frequency_to_note(note_frequency(*pitch_class, 4)).unwrap();
            assert_eq!(reading.name(), name);
            assert_eq!(reading.cents, 0, "{name}");
        }
    }

    #[test]
    fn cents_stay_bounded_across_range() {
        let mut frequency = 0.5;
        while frequency <= 5000.0 {
            let reading = frequency_to_note(frequency).unwrap();
            assert!(
                (-50..=50).contains(&reading.cents),
                "{frequency} Hz gave {} cents",
                reading.cents
            );
            assert!(PitchClass::ALL.contains(&reading.pitch_class));
            frequency += 0.37;
        }
    }

    #[test]
    fn sharp_and_flat_sides_have_matching_sign() {
        let sharp = frequency_to_note(440.0 * 2f64.powf(10.0 / 1200.0)).unwrap();
        assert_eq!(sharp.name(), "A4");
        assert_eq!(sharp.cents, 10);

        let flat = frequency_to_note(440.0 * 2f64.powf(-10.0 / 1200.0)).unwrap();
        assert_eq!(flat.name(), "A4");
        assert_eq!(flat.cents, -10);

        // Past the quarter tone the nearest semitone flips to A#4.
        let flipped = frequency_to_note(440.0 * 2f64.powf(60.0 / 1200.0)).unwrap();
        assert_eq!(flipped.name(), "A#4");
        assert_eq!(flipped.cents, -40);
    }

    #[test]
    fn guitar_strings_map_to_expected_names() {
        assert_eq!(frequency_to_note(82.41).unwrap().name(), "E2");
        assert_eq!(frequency_to_note(110.0).unwrap().name(), "A2");
        assert_eq!(frequency_to_note(146.83).unwrap().name(), "D3");
        assert_eq!(frequency_to_note(196.0).unwrap().name(), "G3");
        assert_eq!(frequency_to_note(246.94).unwrap().name(), "B3");
        assert_eq!(frequency_to_note(329.63).unwrap().name(), "E4");
    }

    #[test]
    fn non_positive_frequencies_are_rejected() {
        assert!(frequency_to_note(0.0).is_none());
        assert!(frequency_to_note(-110.0).is_none());
        assert!(frequency_to_note(f64::NAN).is_none());
        assert!(frequency_to_note(f64::INFINITY).is_none());
    }

    #[test]
    fn frequencies_below_c0_extrapolate_to_negative_octaves() {
        let reading = frequency_to_note(10.0).unwrap();
        assert_eq!(reading.octave, -1);
        assert_eq!(reading.pitch_class, PitchClass::DSharp);
        assert!((-50..=50).contains(&reading.cents));
    }

    #[test]
    fn parses_sharps_and_flats() {
        assert_eq!("F#".parse::<PitchClass>().unwrap(), PitchClass::FSharp);
        assert_eq!("Bb".parse::<PitchClass>().unwrap(), PitchClass::ASharp);
        assert!("H".parse::<PitchClass>().is_err());
    }

    #[test]
    fn cents_deviation_of_one_octave_is_1200() {
        assert_relative_eq!(cents_deviation(880.0, 440.0), 1200.0, epsilon = 1e-9);
        assert_relative_eq!(cents_deviation(220.0, 440.0), -1200.0, epsilon = 1e-9);
    }
}

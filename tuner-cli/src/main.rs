//! # Guitar Tuner - Console Front End
//!
//! Headless front end for `tuner-core`. It listens to the default input
//! device and prints the detected note, its deviation in cents, the accuracy
//! tier and the guitar string being tuned.
//!
//! ## Architecture
//! - **Main Thread**: tick loop driving the tuning session (~60 Hz)
//! - **Input Thread**: waits for Enter and signals shutdown
//! - **Communication**: Crossbeam channels and `select!`

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use std::collections::VecDeque;
use std::io::BufRead;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tuner_core::config::{PresetChoice, SensitivitySetting};
use tuner_core::{CpalBackend, TargetMode, TunerConfig, TunerReading, TunerSession, strings};

/// Interval between analysis ticks, roughly one display frame.
const TICK_INTERVAL: Duration = Duration::from_millis(16);
/// Number of readings averaged for the displayed cents.
const SMOOTHING_FACTOR: usize = 5;
/// Width of the console needle meter in characters.
const METER_WIDTH: usize = 21;
/// Consecutive empty ticks before the display reports silence.
const SILENCE_TICKS: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "guitar-tuner", about = "Real-time chromatic guitar tuner")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tuning preset (Standard, Drop D, Open G, DADGAD)
    #[arg(short, long)]
    preset: Option<String>,

    /// Sensitivity: high, medium, low, or a decibel floor such as -55
    #[arg(short, long, allow_hyphen_values = true)]
    sensitivity: Option<String>,

    /// Tune a fixed string (1-6) instead of detecting it automatically
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=6))]
    string: Option<u8>,

    /// Stop listening after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Print the built-in tuning presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_presets {
        print_presets();
        return Ok(());
    }

    let config = build_config(&cli)?;
    if let Some(path) = &cli.save_config {
        config
            .save(path)
            .with_context(|| format!("Could not save config to {}", path.display()))?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    let mut session =
        TunerSession::new(CpalBackend::new(), &config).context("Invalid tuner configuration")?;
    session.start().context("Could not start listening")?;

    println!(
        "Listening ({} tuning). Press Enter to stop.",
        session.preset().name
    );
    let result = run(&mut session, cli.seconds.map(Duration::from_secs));
    session.stop();
    result
}

/// Applies command line overrides on top of the config file (or defaults).
fn build_config(cli: &Cli) -> Result<TunerConfig> {
    let mut config = match &cli.config {
        Some(path) => TunerConfig::load(path)?,
        None => TunerConfig::default(),
    };

    if let Some(preset) = &cli.preset {
        config.preset = PresetChoice::Named(preset.clone());
    }
    if let Some(sensitivity) = &cli.sensitivity {
        config.sensitivity = sensitivity.parse::<SensitivitySetting>()?;
    }
    if let Some(string) = cli.string {
        config.mode = TargetMode::Manual { string };
    }

    config.validate()?;
    Ok(config)
}

fn print_presets() {
    for preset in strings::presets() {
        let strings = preset
            .strings
            .iter()
            .map(|s| format!("{}:{} {:.2} Hz", s.string, s.note, s.frequency))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{:<10} {}", preset.name, strings);
    }
}

/// Spawns a thread that signals once the user presses Enter.
fn spawn_stop_listener() -> Receiver<()> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        // EOF (no terminal attached) leaves the loop running until the deadline.
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                let _ = stop_tx.send(());
            }
        }
    });
    stop_rx
}

fn run(session: &mut TunerSession<CpalBackend>, limit: Option<Duration>) -> Result<()> {
    let ticker = crossbeam_channel::tick(TICK_INTERVAL);
    let deadline = match limit {
        Some(limit) => crossbeam_channel::after(limit),
        None => crossbeam_channel::never(),
    };
    let stop = spawn_stop_listener();
    let mut display = ConsoleDisplay::default();

    loop {
        select! {
            recv(ticker) -> _ => {
                let reading = match panic::catch_unwind(AssertUnwindSafe(|| session.tick())) {
                    Ok(reading) => reading,
                    Err(_) => {
                        log::error!("Analysis panicked, skipping tick");
                        None
                    }
                };
                if !session.is_listening() {
                    return Err(anyhow!("Audio input was lost"));
                }
                display.update(reading.as_ref());
            },
            recv(stop) -> _ => break,
            recv(deadline) -> _ => break,
        }
    }
    Ok(())
}

/// Smooths readings and prints a line whenever the display changes.
#[derive(Default)]
struct ConsoleDisplay {
    recent_cents: VecDeque<i32>,
    /// Note the cents in `recent_cents` belong to.
    current_note: String,
    silent_ticks: usize,
    last_line: String,
}

impl ConsoleDisplay {
    fn update(&mut self, reading: Option<&TunerReading>) {
        let line = match reading {
            Some(reading) => {
                self.silent_ticks = 0;
                if reading.estimate.note != self.current_note {
                    self.recent_cents.clear();
                    self.current_note.clone_from(&reading.estimate.note);
                }
                self.recent_cents.push_back(reading.estimate.cents);
                if self.recent_cents.len() > SMOOTHING_FACTOR {
                    self.recent_cents.pop_front();
                }
                self.format_reading(reading)
            }
            // Keep showing the last note across short gaps between snapshots.
            None if self.silent_ticks + 1 < SILENCE_TICKS && !self.last_line.is_empty() => {
                self.silent_ticks += 1;
                return;
            }
            None => {
                self.recent_cents.clear();
                self.current_note.clear();
                "No signal detected".to_string()
            }
        };

        if line != self.last_line {
            println!("{line}");
            self.last_line = line;
        }
    }

    fn smoothed_cents(&self) -> i32 {
        if self.recent_cents.is_empty() {
            return 0;
        }
        let sum: i32 = self.recent_cents.iter().sum();
        (sum as f32 / self.recent_cents.len() as f32).round() as i32
    }

    fn format_reading(&self, reading: &TunerReading) -> String {
        let cents = self.smoothed_cents();
        let accuracy = tuner_core::classify(cents);
        let target = match (&reading.target, reading.target_cents) {
            (Some(s), Some(off)) => format!(
                "  string {} ({} {:.2} Hz) {:+.0}c",
                s.string, s.note, s.frequency, off
            ),
            _ => String::new(),
        };
        format!(
            "{:<4} {:>7.1} Hz {:+3} cents {} {:<9}{}",
            reading.estimate.note,
            reading.estimate.frequency,
            cents,
            meter(accuracy.needle),
            accuracy.tier.label(),
            target
        )
    }
}

/// Draws the needle position as `[----|----]` with `^` marking the pitch.
fn meter(needle: i32) -> String {
    let half = (METER_WIDTH / 2) as f32;
    let range = tuner_core::accuracy::NEEDLE_RANGE as f32;
    let position = (half + needle as f32 / range * half).round();
    let position = position.clamp(0.0, (METER_WIDTH - 1) as f32) as usize;
    let cells: String = (0..METER_WIDTH)
        .map(|i| {
            if i == position {
                '^'
            } else if i == METER_WIDTH / 2 {
                '|'
            } else {
                '-'
            }
        })
        .collect();
    format!("[{cells}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(frequency: f64) -> TunerReading {
        let estimate = tuner_core::PitchEstimate::from_frequency(frequency).unwrap();
        TunerReading {
            accuracy: tuner_core::classify(estimate.cents),
            estimate,
            target: None,
            target_cents: None,
        }
    }

    #[test]
    fn sensitivity_flag_accepts_levels_and_decibels() {
        let cli = Cli::parse_from(["guitar-tuner", "-s", "high"]);
        assert_eq!(build_config(&cli).unwrap().sensitivity.decibels(), -40.0);
        let cli = Cli::parse_from(["guitar-tuner", "-s", "-55"]);
        assert_eq!(build_config(&cli).unwrap().sensitivity.decibels(), -55.0);
        let cli = Cli::parse_from(["guitar-tuner", "-s", "12"]);
        assert!(build_config(&cli).is_err());
        let cli = Cli::parse_from(["guitar-tuner", "-s", "loud"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn meter_marks_needle_position() {
        assert_eq!(meter(0), "[----------^----------]");
        assert_eq!(meter(-50), "[^---------|----------]");
        assert_eq!(meter(50), "[----------|---------^]");
    }

    #[test]
    fn cli_overrides_apply_to_config() {
        let cli = Cli::parse_from(["guitar-tuner", "--preset", "drop d", "-s", "low", "--string", "6"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.sensitivity.decibels(), -60.0);
        assert_eq!(config.mode, TargetMode::Manual { string: 6 });
        assert_eq!(config.validate().unwrap().name, "Drop D");
    }

    #[test]
    fn display_smooths_recent_cents() {
        let mut display = ConsoleDisplay::default();
        display.recent_cents.extend([2, 4, 6]);
        assert_eq!(display.smoothed_cents(), 4);
        display.update(None);
        assert_eq!(display.smoothed_cents(), 0);
        assert_eq!(display.last_line, "No signal detected");
    }

    #[test]
    fn smoothing_restarts_when_the_note_changes() {
        let mut display = ConsoleDisplay::default();
        // E2 sharp by roughly 40 cents.
        let sharp_e = reading(82.41 * 2f64.powf(40.0 / 1200.0));
        for _ in 0..SMOOTHING_FACTOR {
            display.update(Some(&sharp_e));
        }
        assert!(display.smoothed_cents() > 30);

        // A2 flat by 5 cents.
        let flat_a = reading(110.0 * 2f64.powf(-5.0 / 1200.0));
        display.update(Some(&flat_a));
        assert_eq!(display.recent_cents.len(), 1);
        assert_eq!(display.smoothed_cents(), -5);
        assert!(display.last_line.starts_with("A2"));
    }

    #[test]
    fn short_gaps_keep_the_last_note() {
        let mut display = ConsoleDisplay {
            last_line: "A2".to_string(),
            ..ConsoleDisplay::default()
        };
        display.recent_cents.push_back(3);
        for _ in 0..SILENCE_TICKS - 1 {
            display.update(None);
        }
        assert_eq!(display.last_line, "A2");
        display.update(None);
        assert_eq!(display.last_line, "No signal detected");
        assert!(display.recent_cents.is_empty());
    }
}

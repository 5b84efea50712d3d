use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Samples from the pitch estimator ───────────────────────────────────────

/// One reading from the external pitch estimator, produced once per tick.
///
/// `Absent` covers every "nothing detected" case the estimator can report.
/// A present sample may still be rejected by the confidence gate before it
/// reaches the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PitchSample {
    Present {
        /// Estimated fundamental in Hz
        frequency: f64,
        /// Estimator confidence, 0.0–1.0
        confidence: f64,
    },
    Absent,
}

impl PitchSample {
    pub fn present(frequency: f64, confidence: f64) -> Self {
        PitchSample::Present {
            frequency,
            confidence,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, PitchSample::Present { .. })
    }
}

impl fmt::Display for PitchSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchSample::Present {
                frequency,
                confidence,
            } => write!(f, "{:>8.2} Hz  conf={:.2}", frequency, confidence),
            PitchSample::Absent => write!(f, "   ---"),
        }
    }
}

// ─── Classified note ────────────────────────────────────────────────────────

/// A classified reading: nearest equal-tempered note plus tuning offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Pitch class and octave, sharps only (e.g. "E2", "F#3")
    pub name: String,
    /// Signed deviation from the nearest semitone. Negative = flat.
    pub cents: f64,
    /// Observed frequency in Hz
    pub frequency: f64,
    /// Estimator confidence for the sample this note came from
    pub confidence: f64,
}

impl Note {
    /// Pitch class without the octave ("F#" for "F#3").
    pub fn pitch_class(&self) -> &str {
        self.name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '-')
    }

    /// Octave number parsed back out of the name.
    pub fn octave(&self) -> Option<i32> {
        self.name[self.pitch_class().len()..].parse().ok()
    }

    pub fn is_in_tune(&self, margin_cents: f64) -> bool {
        self.cents.abs() < margin_cents
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<4} {:+6.1}¢  ({:.2} Hz)",
            self.name, self.cents, self.frequency
        )
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for one tuner or lesson session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Reference pitch for equal temperament.
pub const A4_HZ: f64 = 440.0;

/// Chromatic pitch-class names starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Standard-tuning guitar strings, index 0 = string 1 (high E).
pub const GUITAR_STRING_NAMES: [&str; 6] = ["E4", "B3", "G3", "D3", "A2", "E2"];

/// Highest fret a lesson position may name; the fretboard diagram shows 1..=12.
pub const MAX_FRET: u8 = 12;

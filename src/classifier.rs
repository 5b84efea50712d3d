//! Frequency → note classification in 12-tone equal temperament (A4 = 440 Hz).
//!
//! `classify` is the pure mapping. `NoteClassifier` wraps it with the
//! confidence gate that sits at the pitch-source boundary: a sample that is
//! absent, non-finite, non-positive or below the threshold never reaches
//! `classify` and comes out as "no note".

use crate::error::ConfigError;
use crate::types::*;
use log::trace;
use serde::{Deserialize, Serialize};

/// Result of classifying one frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Nearest semitone, counted from A4
    pub semitones_from_a4: i32,
    /// Index into `NOTE_NAMES`
    pub pitch_class: usize,
    pub octave: i32,
    /// Equal-tempered frequency of the nearest semitone
    pub reference_frequency: f64,
    /// Signed deviation from `reference_frequency`
    pub cents: f64,
}

impl Classification {
    pub fn name(&self) -> String {
        format!("{}{}", NOTE_NAMES[self.pitch_class], self.octave)
    }
}

/// Classify a frequency. Only meaningful for finite `frequency > 0`;
/// callers filter everything else out first (see `NoteClassifier::admit`).
pub fn classify(frequency: f64) -> Classification {
    let semitones = 12.0 * (frequency / A4_HZ).log2();
    let nearest = nearest_semitone(semitones);
    let reference_frequency = semitone_to_hz(nearest);
    let cents = 1200.0 * (frequency / reference_frequency).log2();
    let (pitch_class, octave) = pitch_class_and_octave(nearest);
    Classification {
        semitones_from_a4: nearest,
        pitch_class,
        octave,
        reference_frequency,
        cents,
    }
}

/// Round to the nearest semitone. Exact quarter-tone ties go away from
/// zero, i.e. away from A4.
fn nearest_semitone(semitones: f64) -> i32 {
    semitones.round() as i32
}

/// Equal-tempered frequency `n` semitones away from A4.
pub fn semitone_to_hz(n: i32) -> f64 {
    A4_HZ * 2f64.powf(n as f64 / 12.0)
}

fn pitch_class_and_octave(semitones_from_a4: i32) -> (usize, i32) {
    // Shift so 0 = C4
    let from_c4 = semitones_from_a4 + 9;
    (
        from_c4.rem_euclid(12) as usize,
        from_c4.div_euclid(12) + 4,
    )
}

/// Parse a note name ("E2", "F#3", "Bb1", "C-1") into semitones from A4.
/// Flats and enharmonic spellings such as "B#3" are accepted.
pub fn parse_note_name(name: &str) -> Result<i32, ConfigError> {
    let unknown = || ConfigError::UnknownNote {
        name: name.to_string(),
    };
    let mut chars = name.trim().chars();
    let letter = chars.next().ok_or_else(unknown)?;
    let base: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(unknown()),
    };
    let rest = chars.as_str();
    let (accidental, octave_str) = if let Some(r) = rest.strip_prefix('#') {
        (1, r)
    } else if let Some(r) = rest.strip_prefix('b') {
        (-1, r)
    } else {
        (0, rest)
    };
    let octave: i32 = octave_str.parse().map_err(|_| unknown())?;
    if !(-1..=9).contains(&octave) {
        return Err(unknown());
    }
    Ok((octave - 4) * 12 + base + accidental - 9)
}

/// Canonical (sharp-spelled) name for a semitone offset from A4.
pub fn semitone_name(semitones_from_a4: i32) -> String {
    let (pc, octave) = pitch_class_and_octave(semitones_from_a4);
    format!("{}{}", NOTE_NAMES[pc], octave)
}

// ─── Target notes ───────────────────────────────────────────────────────────

/// A note the performer is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetNote {
    /// Canonical sharp spelling, comparable with `Note::name`
    pub name: String,
    pub reference_frequency: f64,
}

impl TargetNote {
    /// Resolve a note name. Unknown names are configuration errors.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let n = parse_note_name(name)?;
        Ok(Self {
            name: semitone_name(n),
            reference_frequency: semitone_to_hz(n),
        })
    }
}

// ─── Confidence gate ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Samples below this confidence are treated as silence.
    /// 0.0 admits every present sample.
    pub confidence_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
        }
    }
}

/// Confidence-gated classifier applied to every sample from the source.
#[derive(Debug, Clone)]
pub struct NoteClassifier {
    confidence_threshold: f64,
}

impl NoteClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Turn a raw sample into a note, or `None` for "no note this tick".
    pub fn admit(&self, sample: &PitchSample) -> Option<Note> {
        let (frequency, confidence) = match *sample {
            PitchSample::Present {
                frequency,
                confidence,
            } => (frequency, confidence),
            PitchSample::Absent => return None,
        };
        if !frequency.is_finite() || frequency <= 0.0 {
            trace!("classifier: dropping invalid frequency {}", frequency);
            return None;
        }
        if !confidence.is_finite() || confidence < self.confidence_threshold {
            trace!(
                "classifier: {:.2} Hz below confidence gate ({:.2} < {:.2})",
                frequency,
                confidence,
                self.confidence_threshold
            );
            return None;
        }
        let c = classify(frequency);
        Some(Note {
            name: c.name(),
            cents: c.cents,
            frequency,
            confidence,
        })
    }
}

impl Default for NoteClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

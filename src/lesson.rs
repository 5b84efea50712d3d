//! Lesson definitions and the lesson catalog.
//!
//! Lessons are static data: authored once, validated when loaded, never
//! mutated. The built-in catalog covers the open strings and a first-position
//! chromatic exercise; a JSON catalog file can replace it.

use crate::classifier::TargetNote;
use crate::error::ConfigError;
use crate::types::MAX_FRET;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// One target the learner must sustain to advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub instruction: String,
    pub target_note: String,
    /// Guitar string, 1 (high E) to 6 (low E)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<u8>,
    /// Fret, 0 = open string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fret: Option<u8>,
}

impl Challenge {
    pub fn target(&self) -> Result<TargetNote, ConfigError> {
        TargetNote::parse(&self.target_note)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub challenges: Vec<Challenge>,
}

impl Lesson {
    /// Reject empty lessons, unknown target notes, duplicate challenge ids
    /// and positions off the fretboard.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.challenges.is_empty() {
            return Err(ConfigError::EmptyLesson {
                lesson_id: self.id.clone(),
            });
        }
        let mut seen = BTreeSet::new();
        for c in &self.challenges {
            c.target()?;
            if !seen.insert(c.id.as_str()) {
                return Err(ConfigError::DuplicateChallenge {
                    lesson_id: self.id.clone(),
                    challenge_id: c.id.clone(),
                });
            }
            if let Some(s) = c.string {
                if !(1..=6).contains(&s) {
                    return Err(ConfigError::InvalidValue {
                        field: "challenge string",
                        reason: format!("{} in challenge '{}' is not 1-6", s, c.id),
                    });
                }
            }
            if let Some(f) = c.fret {
                if f > MAX_FRET {
                    return Err(ConfigError::InvalidValue {
                        field: "challenge fret",
                        reason: format!("{} in challenge '{}' is above {}", f, c.id, MAX_FRET),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Ordered collection of lessons, keyed by stable lesson id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonCatalog {
    pub lessons: Vec<Lesson>,
}

impl LessonCatalog {
    pub fn new(lessons: Vec<Lesson>) -> Result<Self, ConfigError> {
        let catalog = Self { lessons };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Self {
        Self {
            lessons: builtin_lessons(),
        }
    }

    /// Load a catalog from JSON. Unlike progress data, a broken catalog is
    /// a configuration error and is reported.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let catalog: LessonCatalog = serde_json::from_str(&data)?;
        catalog.validate()?;
        info!(
            "Loaded {} lessons from {:?}",
            catalog.lessons.len(),
            path
        );
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for lesson in &self.lessons {
            lesson.validate()?;
            if !seen.insert(lesson.id.as_str()) {
                return Err(ConfigError::DuplicateLesson {
                    lesson_id: lesson.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn find(&self, id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id == id)
    }
}

fn challenge(id: &str, instruction: &str, note: &str, string: u8, fret: u8) -> Challenge {
    Challenge {
        id: id.into(),
        instruction: instruction.into(),
        target_note: note.into(),
        string: Some(string),
        fret: Some(fret),
    }
}

fn builtin_lessons() -> Vec<Lesson> {
    vec![
        Lesson {
            id: "lesson-1".into(),
            title: "Fundamentals: The Open Strings".into(),
            challenges: vec![
                challenge("l1c1", "Play the 1st string (high E)", "E4", 1, 0),
                challenge("l1c2", "Play the 2nd string (B)", "B3", 2, 0),
                challenge("l1c3", "Play the 3rd string (G)", "G3", 3, 0),
                challenge("l1c4", "Play the 4th string (D)", "D3", 4, 0),
                challenge("l1c5", "Play the 5th string (A)", "A2", 5, 0),
                challenge("l1c6", "Play the 6th string (low E)", "E2", 6, 0),
            ],
        },
        Lesson {
            id: "lesson-2".into(),
            title: "Fretting Hand: Chromatic Exercise".into(),
            challenges: vec![
                challenge("l2c1", "6th string, 1st fret (finger 1)", "F2", 6, 1),
                challenge("l2c2", "6th string, 2nd fret (finger 2)", "F#2", 6, 2),
                challenge("l2c3", "6th string, 3rd fret (finger 3)", "G2", 6, 3),
                challenge("l2c4", "6th string, 4th fret (finger 4)", "G#2", 6, 4),
            ],
        },
    ]
}

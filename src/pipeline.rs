//! The per-tick step shared by tuner and lesson sessions.
//!
//! Order within one tick is fixed: confidence gate + classification, then
//! target gating / challenge engine, then the display stabilizer. The step is
//! deterministic given `(now_ms, sample)`, so the sampling loop is the only
//! place that touches wall time.

use crate::challenge::{ChallengeEngine, EngineEvent, EngineState};
use crate::classifier::{NoteClassifier, TargetNote};
use crate::config::Config;
use crate::gate;
use crate::stabilizer::{DisplayFrame, SignalStabilizer};
use crate::types::{Note, PitchSample};
use log::trace;
use serde::{Deserialize, Serialize};

/// Lesson-side view of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonFrame {
    pub lesson_id: String,
    pub title: String,
    pub state: EngineState,
    pub challenge_index: usize,
    pub challenge_count: usize,
    pub instruction: Option<String>,
    pub target: Option<String>,
    pub string: Option<u8>,
    pub fret: Option<u8>,
    /// 0.0–1.0 of the current hold
    pub hold_progress: f64,
    pub events: Vec<EngineEvent>,
}

/// Everything produced for one tick. Consumed by the console display and
/// the frame recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFrame {
    pub t_ms: u64,
    pub sample: PitchSample,
    /// Classified reading after the confidence gate
    pub note: Option<Note>,
    /// Tuner target, if one was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub display: DisplayFrame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson: Option<LessonFrame>,
}

pub enum Mode {
    /// Free tuning, optionally restricted to one note
    Tuner { target: Option<TargetNote> },
    Lesson(ChallengeEngine),
}

pub struct Pipeline {
    classifier: NoteClassifier,
    stabilizer: SignalStabilizer,
    mode: Mode,
    pending_events: Vec<EngineEvent>,
}

impl Pipeline {
    pub fn tuner(config: &Config, target: Option<TargetNote>) -> Self {
        Self::new(config, Mode::Tuner { target })
    }

    pub fn lesson(config: &Config, engine: ChallengeEngine) -> Self {
        Self::new(config, Mode::Lesson(engine))
    }

    fn new(config: &Config, mode: Mode) -> Self {
        Self {
            classifier: NoteClassifier::new(config.classifier),
            stabilizer: SignalStabilizer::new(config.stabilizer),
            mode,
            pending_events: Vec::new(),
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn stabilizer(&self) -> &SignalStabilizer {
        &self.stabilizer
    }

    /// Begin the session. Start events are reported on the first frame.
    pub fn start(&mut self, now_ms: u64) {
        if let Mode::Lesson(engine) = &mut self.mode {
            let events = engine.start(now_ms);
            self.pending_events.extend(events);
        }
    }

    pub fn step(&mut self, now_ms: u64, sample: PitchSample) -> SessionFrame {
        let note = self.classifier.admit(&sample);

        let (display, target, lesson) = match &mut self.mode {
            Mode::Tuner { target } => {
                let gated = gate::filter(note.as_ref(), target.as_ref());
                let display = self.stabilizer.step(now_ms, gated.as_ref());
                (display, target.as_ref().map(|t| t.name.clone()), None)
            }
            Mode::Lesson(engine) => {
                let mut events = std::mem::take(&mut self.pending_events);
                events.extend(engine.step(now_ms, note.as_ref()));
                let display = self.stabilizer.step(now_ms, note.as_ref());
                (display, None, Some(lesson_frame(engine, now_ms, events)))
            }
        };

        trace!(
            "t={}ms  {}  → {}",
            now_ms,
            sample,
            note.as_ref()
                .map_or_else(|| "---".to_string(), |n| n.to_string())
        );

        SessionFrame {
            t_ms: now_ms,
            sample,
            note,
            target,
            display,
            lesson,
        }
    }

    /// True once a lesson has delivered its completion notice.
    pub fn is_finished(&self) -> bool {
        match &self.mode {
            Mode::Lesson(engine) => engine.is_finished(),
            Mode::Tuner { .. } => false,
        }
    }

    pub fn lesson_completed(&self) -> bool {
        match &self.mode {
            Mode::Lesson(engine) => engine.progress().completed,
            Mode::Tuner { .. } => false,
        }
    }

    pub fn pending_timers(&self) -> usize {
        let engine_timers = match &self.mode {
            Mode::Lesson(engine) => engine.pending_timers(),
            Mode::Tuner { .. } => 0,
        };
        self.stabilizer.pending_timers() + engine_timers
    }

    /// Cancel every outstanding deadline. Nothing fires after this.
    pub fn teardown(&mut self) {
        self.stabilizer.teardown();
        if let Mode::Lesson(engine) = &mut self.mode {
            engine.stop();
        }
        self.pending_events.clear();
    }
}

fn lesson_frame(engine: &ChallengeEngine, now_ms: u64, events: Vec<EngineEvent>) -> LessonFrame {
    let lesson = engine.lesson();
    let challenge = engine.current_challenge();
    LessonFrame {
        lesson_id: lesson.id.clone(),
        title: lesson.title.clone(),
        state: engine.state(),
        challenge_index: engine.progress().challenge_index,
        challenge_count: lesson.challenges.len(),
        instruction: challenge.map(|c| c.instruction.clone()),
        target: engine.current_target().map(|t| t.name.clone()),
        string: challenge.and_then(|c| c.string),
        fret: challenge.and_then(|c| c.fret),
        hold_progress: engine.hold_progress(now_ms),
        events,
    }
}

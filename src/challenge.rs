use crate::classifier::TargetNote;
use crate::error::ConfigError;
use crate::gate;
use crate::lesson::{Challenge, Lesson};
use crate::timer::OneShot;
use crate::types::Note;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Timing for hold-to-confirm and the completion acknowledgment (ms).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Continuous match required to clear a challenge
    pub hold_ms: u64,
    /// Time the completion acknowledgment stays up before the caller is told
    pub completion_grace_ms: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            hold_ms: 1200,
            completion_grace_ms: 2000,
        }
    }
}

/// Where a lesson attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum EngineState {
    AwaitingStart,
    InProgress(usize),
    HoldingCorrect(usize),
    Completed,
}

/// Mutable progress of one lesson attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonProgressState {
    pub challenge_index: usize,
    /// When the current continuous match began
    pub hold_since: Option<u64>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Started { lesson_id: String },
    MatchStarted { index: usize },
    MatchLost { index: usize, held_ms: u64 },
    ChallengeCleared { index: usize },
    /// Last challenge cleared; the acknowledgment grace period begins
    LessonFinished { lesson_id: String },
    /// Grace period over. Emitted exactly once per attempt.
    LessonComplete { lesson_id: String },
}

type CompletionCallback = Box<dyn FnMut(&str) + Send>;

/// Walks a learner through one lesson attempt.
///
/// ```text
/// AwaitingStart ─start→ InProgress(i) ─match→ HoldingCorrect(i)
///                            ↑  ←─lost──────────┘   │ held for hold_ms
///                            └── i+1 < len ←────────┤
///                                     Completed ←───┘ (last challenge)
/// ```
///
/// Readings are gated against the current challenge's target, so any other
/// note counts as "no match". Losing the match while holding forfeits the
/// partial hold. Once `Completed`, readings are ignored and, after the grace
/// period, `LessonComplete` is emitted and the completion callback runs once.
///
/// A retry is a new engine. State never carries over between attempts.
pub struct ChallengeEngine {
    lesson: Lesson,
    targets: Vec<TargetNote>,
    config: ChallengeConfig,
    state: EngineState,
    progress: LessonProgressState,
    hold: OneShot,
    grace: OneShot,
    notified: bool,
    stopped: bool,
    on_complete: Option<CompletionCallback>,
}

impl ChallengeEngine {
    /// Validate the lesson and resolve every target note up front.
    pub fn new(lesson: Lesson, config: ChallengeConfig) -> Result<Self, ConfigError> {
        lesson.validate()?;
        let targets = lesson
            .challenges
            .iter()
            .map(Challenge::target)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            lesson,
            targets,
            config,
            state: EngineState::AwaitingStart,
            progress: LessonProgressState::default(),
            hold: OneShot::new("challenge-hold"),
            grace: OneShot::new("completion-grace"),
            notified: false,
            stopped: false,
            on_complete: None,
        })
    }

    /// Register a callback run once when the attempt completes.
    pub fn on_complete(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn progress(&self) -> &LessonProgressState {
        &self.progress
    }

    /// The challenge being attempted, if any.
    pub fn current_challenge(&self) -> Option<&Challenge> {
        match self.state {
            EngineState::InProgress(i) | EngineState::HoldingCorrect(i) => {
                self.lesson.challenges.get(i)
            }
            _ => None,
        }
    }

    pub fn current_target(&self) -> Option<&TargetNote> {
        match self.state {
            EngineState::InProgress(i) | EngineState::HoldingCorrect(i) => self.targets.get(i),
            _ => None,
        }
    }

    /// Fraction of the hold completed, 0.0–1.0.
    pub fn hold_progress(&self, now_ms: u64) -> f64 {
        match (self.state, self.progress.hold_since) {
            (EngineState::HoldingCorrect(_), Some(since)) if self.config.hold_ms > 0 => {
                (now_ms.saturating_sub(since) as f64 / self.config.hold_ms as f64).min(1.0)
            }
            (EngineState::Completed, _) => 1.0,
            _ => 0.0,
        }
    }

    /// True once `LessonComplete` has been emitted.
    pub fn is_finished(&self) -> bool {
        self.notified
    }

    pub fn start(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        if self.state != EngineState::AwaitingStart || self.stopped {
            warn!(
                "lesson {}: start ignored in state {:?}",
                self.lesson.id, self.state
            );
            return Vec::new();
        }
        info!(
            "lesson {}: started at t={}ms ({} challenges)",
            self.lesson.id,
            now_ms,
            self.lesson.challenges.len()
        );
        self.state = EngineState::InProgress(0);
        self.progress = LessonProgressState::default();
        vec![EngineEvent::Started {
            lesson_id: self.lesson.id.clone(),
        }]
    }

    /// Advance one tick with this tick's reading.
    pub fn step(&mut self, now_ms: u64, reading: Option<&Note>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.stopped {
            return events;
        }

        match self.state {
            EngineState::AwaitingStart | EngineState::Completed => {}
            EngineState::InProgress(i) => {
                if gate::filter(reading, Some(&self.targets[i])).is_some() {
                    debug!(
                        "lesson {}: challenge {} matched at t={}ms",
                        self.lesson.id, i, now_ms
                    );
                    self.state = EngineState::HoldingCorrect(i);
                    self.progress.hold_since = Some(now_ms);
                    self.hold.arm(now_ms, self.config.hold_ms);
                    events.push(EngineEvent::MatchStarted { index: i });
                    self.poll_hold(now_ms, i, &mut events);
                }
            }
            EngineState::HoldingCorrect(i) => {
                if gate::filter(reading, Some(&self.targets[i])).is_some() {
                    self.poll_hold(now_ms, i, &mut events);
                } else {
                    self.hold.cancel();
                    let held_ms = self
                        .progress
                        .hold_since
                        .take()
                        .map_or(0, |since| now_ms.saturating_sub(since));
                    debug!(
                        "lesson {}: challenge {} lost after {}ms",
                        self.lesson.id, i, held_ms
                    );
                    self.state = EngineState::InProgress(i);
                    events.push(EngineEvent::MatchLost { index: i, held_ms });
                }
            }
        }

        if self.state == EngineState::Completed
            && self.grace.poll(now_ms).is_some()
            && !self.notified
        {
            self.notified = true;
            info!("lesson {}: complete", self.lesson.id);
            if let Some(cb) = self.on_complete.as_mut() {
                cb(&self.lesson.id);
            }
            events.push(EngineEvent::LessonComplete {
                lesson_id: self.lesson.id.clone(),
            });
        }

        events
    }

    fn poll_hold(&mut self, now_ms: u64, i: usize, events: &mut Vec<EngineEvent>) {
        if self.hold.poll(now_ms).is_none() {
            return;
        }
        self.progress.hold_since = None;
        events.push(EngineEvent::ChallengeCleared { index: i });
        if i + 1 < self.targets.len() {
            info!(
                "lesson {}: challenge {} cleared, next target {}",
                self.lesson.id,
                i,
                self.targets[i + 1].name
            );
            self.state = EngineState::InProgress(i + 1);
            self.progress.challenge_index = i + 1;
        } else {
            info!("lesson {}: last challenge cleared", self.lesson.id);
            self.state = EngineState::Completed;
            self.progress.completed = true;
            self.grace.arm(now_ms, self.config.completion_grace_ms);
            events.push(EngineEvent::LessonFinished {
                lesson_id: self.lesson.id.clone(),
            });
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.hold.is_armed() as usize + self.grace.is_armed() as usize
    }

    /// Abandon the attempt: cancel every deadline and ignore further readings.
    pub fn stop(&mut self) {
        if !self.stopped {
            debug!("lesson {}: stopped in state {:?}", self.lesson.id, self.state);
        }
        self.hold.cancel();
        self.grace.cancel();
        self.stopped = true;
    }
}

use crate::challenge::ChallengeConfig;
use crate::classifier::{parse_note_name, semitone_name, semitone_to_hz};
use crate::error::{ConfigError, InitError};
use crate::lesson::Lesson;
use crate::types::PitchSample;
use log::{debug, info};
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Supplier of per-tick pitch estimates.
///
/// Live implementations wrap an audio input and a pitch estimator; this
/// crate ships a scripted simulator and a recording replayer. `start` may
/// fail with an acquisition error, `stop` releases resources and must be
/// safe to call more than once.
pub trait PitchSource {
    fn start(&mut self) -> Result<(), InitError>;

    fn stop(&mut self);

    /// The sample for this tick. `None` means nothing new arrived and is
    /// treated the same as `PitchSample::Absent`.
    fn next_sample(&mut self) -> Option<PitchSample>;

    /// True when the source will never produce another sample.
    fn is_finished(&self) -> bool {
        false
    }
}

impl<S: PitchSource + ?Sized> PitchSource for Box<S> {
    fn start(&mut self) -> Result<(), InitError> {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn next_sample(&mut self) -> Option<PitchSample> {
        (**self).next_sample()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }
}

// ─── Gesture scripts ────────────────────────────────────────────────────────

/// One step of a scripted performance.
#[derive(Debug, Clone)]
pub enum Gesture {
    /// Nothing detected
    Silence { ms: u32 },
    /// Steady note, `cents` away from equal temperament
    Play { note: String, cents: f64, ms: u32 },
    /// Pitch moving linearly between two offsets (turning a tuning peg)
    Bend {
        note: String,
        from_cents: f64,
        to_cents: f64,
        ms: u32,
    },
    /// Periodic wobble around the note
    Vibrato {
        note: String,
        width_cents: f64,
        rate_hz: f64,
        ms: u32,
    },
    /// Estimator output below any sensible confidence gate
    Noise { ms: u32 },
}

impl Gesture {
    pub fn play(note: &str, cents: f64, ms: u32) -> Self {
        Gesture::Play {
            note: note.into(),
            cents,
            ms,
        }
    }
}

/// Replays a gesture script, one sample per tick.
///
/// The whole script is expanded up front, so an unknown note name is a
/// construction error rather than a mid-session surprise.
pub struct ScriptedSource {
    samples: VecDeque<PitchSample>,
    start_failure: Option<InitError>,
    running: bool,
    stopped: bool,
}

impl ScriptedSource {
    pub fn new(gestures: &[Gesture], tick_ms: u64) -> Result<Self, ConfigError> {
        let tick_ms = tick_ms.max(1);
        let mut samples = VecDeque::new();
        for gesture in gestures {
            expand(gesture, tick_ms, &mut samples)?;
        }
        debug!(
            "scripted source: {} gestures → {} ticks",
            gestures.len(),
            samples.len()
        );
        Ok(Self {
            samples,
            start_failure: None,
            running: false,
            stopped: false,
        })
    }

    /// Make `start` fail, for exercising acquisition error paths.
    pub fn failing_with(mut self, error: InitError) -> Self {
        self.start_failure = Some(error);
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl PitchSource for ScriptedSource {
    fn start(&mut self) -> Result<(), InitError> {
        if let Some(e) = self.start_failure.clone() {
            return Err(e);
        }
        info!("Scripted pitch source: {} ticks queued", self.samples.len());
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            debug!("scripted source stopped with {} ticks left", self.samples.len());
        }
        self.running = false;
        self.stopped = true;
    }

    fn next_sample(&mut self) -> Option<PitchSample> {
        if !self.running {
            return None;
        }
        self.samples.pop_front()
    }

    fn is_finished(&self) -> bool {
        self.stopped || self.samples.is_empty()
    }
}

fn ticks(ms: u32, tick_ms: u64) -> u64 {
    (ms as u64 / tick_ms).max(1)
}

fn expand(
    gesture: &Gesture,
    tick_ms: u64,
    out: &mut VecDeque<PitchSample>,
) -> Result<(), ConfigError> {
    match gesture {
        Gesture::Silence { ms } => {
            for _ in 0..ticks(*ms, tick_ms) {
                out.push_back(PitchSample::Absent);
            }
        }
        Gesture::Play { note, cents, ms } => {
            let base = note_hz(note)?;
            for _ in 0..ticks(*ms, tick_ms) {
                out.push_back(PitchSample::present(detune(base, *cents), 0.95));
            }
        }
        Gesture::Bend {
            note,
            from_cents,
            to_cents,
            ms,
        } => {
            let base = note_hz(note)?;
            let n = ticks(*ms, tick_ms);
            for i in 0..n {
                let t = if n > 1 { i as f64 / (n - 1) as f64 } else { 1.0 };
                let cents = from_cents + (to_cents - from_cents) * t;
                out.push_back(PitchSample::present(detune(base, cents), 0.93));
            }
        }
        Gesture::Vibrato {
            note,
            width_cents,
            rate_hz,
            ms,
        } => {
            let base = note_hz(note)?;
            for i in 0..ticks(*ms, tick_ms) {
                let t_sec = (i * tick_ms) as f64 / 1000.0;
                let cents = width_cents * (2.0 * PI * rate_hz * t_sec).sin();
                out.push_back(PitchSample::present(detune(base, cents), 0.92));
            }
        }
        Gesture::Noise { ms } => {
            for i in 0..ticks(*ms, tick_ms) {
                // Wandering estimate with poor confidence
                let freq = 180.0 + ((i * 37) % 400) as f64;
                out.push_back(PitchSample::present(freq, 0.2 + (i % 5) as f64 * 0.05));
            }
        }
    }
    Ok(())
}

fn note_hz(name: &str) -> Result<f64, ConfigError> {
    Ok(semitone_to_hz(parse_note_name(name)?))
}

fn detune(hz: f64, cents: f64) -> f64 {
    hz * 2f64.powf(cents / 1200.0)
}

// ─── Demo scripts ───────────────────────────────────────────────────────────

/// About 12 seconds of tuning: a flat low E brought up to pitch and held
/// until lock-in, a dropout, noise, then the A string.
pub fn tuning_demo() -> Vec<Gesture> {
    vec![
        Gesture::Silence { ms: 300 },
        Gesture::Bend {
            note: "E2".into(),
            from_cents: -38.0,
            to_cents: 0.5,
            ms: 2000,
        },
        Gesture::play("E2", 0.5, 1500),
        Gesture::Silence { ms: 1200 },
        Gesture::Noise { ms: 500 },
        Gesture::Bend {
            note: "A2".into(),
            from_cents: 27.0,
            to_cents: -1.0,
            ms: 1500,
        },
        Gesture::Vibrato {
            note: "A2".into(),
            width_cents: 3.0,
            rate_hz: 5.0,
            ms: 1500,
        },
        Gesture::Silence { ms: 1000 },
    ]
}

/// A performance of `lesson`: for each challenge a wrong neighbor note, a
/// flat attempt that drops out before the hold completes, then a clean
/// sustained note.
pub fn lesson_demo(lesson: &Lesson, config: &ChallengeConfig) -> Result<Vec<Gesture>, ConfigError> {
    let hold = clamp_ms(config.hold_ms);
    let mut script = Vec::new();
    for c in &lesson.challenges {
        let n = parse_note_name(&c.target_note)?;
        script.push(Gesture::Silence { ms: 300 });
        script.push(Gesture::play(&semitone_name(n + 1), 8.0, 400));
        script.push(Gesture::play(&c.target_note, -12.0, hold / 2));
        script.push(Gesture::Silence { ms: 100 });
        script.push(Gesture::play(&c.target_note, 1.5, hold.saturating_add(300)));
    }
    script.push(Gesture::Silence {
        ms: clamp_ms(config.completion_grace_ms).saturating_add(1000),
    });
    Ok(script)
}

fn clamp_ms(ms: u64) -> u32 {
    u32::try_from(ms).unwrap_or(u32::MAX)
}

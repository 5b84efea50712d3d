use crate::error::SessionError;
use crate::pipeline::{Pipeline, SessionFrame};
use crate::pitch_source::PitchSource;
use crate::types::{PitchSample, SessionClock};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, trace};
use std::time::Duration;

/// Asks a running session to stop. Cloneable; stopping twice is harmless.
#[derive(Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Why the sampling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Stopped,
    SourceExhausted,
    LessonComplete,
    TimeLimit,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub frames: u64,
    pub duration_ms: u64,
    pub outcome: SessionOutcome,
    pub lesson_completed: bool,
}

enum TimeBase {
    /// Real time, one tick every `tick_ms`
    Wall,
    /// Simulated time advancing one tick per sample, no sleeping
    Stepped,
}

/// The sampling loop. Pulls one sample per tick from the source, runs the
/// pipeline and sends the resulting frame to every consumer.
///
/// All session state (stabilizer, engine, timers) lives in the pipeline and
/// is owned by this loop alone. On exit, for any reason, every outstanding
/// timer is cancelled and the source is stopped before `run` returns.
pub struct Session {
    source: Box<dyn PitchSource + Send>,
    pipeline: Pipeline,
    frame_txs: Vec<Sender<SessionFrame>>,
    stop_rx: Receiver<()>,
    tick_ms: u64,
    time_base: TimeBase,
    max_duration_ms: Option<u64>,
}

impl Session {
    pub fn new(
        source: Box<dyn PitchSource + Send>,
        pipeline: Pipeline,
        frame_txs: Vec<Sender<SessionFrame>>,
        tick_ms: u64,
    ) -> (Self, StopHandle) {
        let (tx, stop_rx) = crossbeam_channel::bounded(1);
        let session = Self {
            source,
            pipeline,
            frame_txs,
            stop_rx,
            tick_ms: tick_ms.max(1),
            time_base: TimeBase::Wall,
            max_duration_ms: None,
        };
        (session, StopHandle { tx })
    }

    /// Run on simulated time: tick `n` is stamped `n * tick_ms` and the loop
    /// never sleeps. Used for replays, fast demos and tests.
    pub fn stepped(mut self) -> Self {
        self.time_base = TimeBase::Stepped;
        self
    }

    pub fn with_max_duration(mut self, max_ms: Option<u64>) -> Self {
        self.max_duration_ms = max_ms;
        self
    }

    /// Run until stopped, the source runs dry, or the lesson completes.
    /// Blocks the calling thread.
    pub fn run(mut self) -> Result<SessionSummary, SessionError> {
        if let Err(e) = self.source.start() {
            error!("Pitch source failed to start: {}", e);
            self.source.stop();
            return Err(SessionError::Acquisition(e));
        }

        let stepped = matches!(self.time_base, TimeBase::Stepped);
        info!(
            "Session running: {} Hz{}, {} consumer(s)",
            1000 / self.tick_ms,
            if stepped { " (stepped time)" } else { "" },
            self.frame_txs.len()
        );

        let clock = SessionClock::new();
        let mut frames: u64 = 0;
        let mut now_ms = 0;
        self.pipeline.start(now_ms);

        let outcome = loop {
            match self.stop_rx.try_recv() {
                Ok(()) => break SessionOutcome::Stopped,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            let sample = self.source.next_sample().unwrap_or(PitchSample::Absent);
            let frame = self.pipeline.step(now_ms, sample);
            for tx in &self.frame_txs {
                let _ = tx.send(frame.clone());
            }

            frames += 1;
            if frames % 300 == 0 {
                debug!("Session: {} frames, t={}ms", frames, now_ms);
                trace!("Latest display: {:?}", frame.display);
            }

            if self.pipeline.is_finished() {
                break SessionOutcome::LessonComplete;
            }
            // A cleared lesson keeps ticking on silence until its grace
            // period delivers the completion notice. Only a stop cuts it short.
            let awaiting_notice = self.pipeline.lesson_completed();
            if !awaiting_notice && self.source.is_finished() {
                break SessionOutcome::SourceExhausted;
            }
            if !awaiting_notice && self.max_duration_ms.is_some_and(|max| now_ms >= max) {
                break SessionOutcome::TimeLimit;
            }

            let next_tick = frames * self.tick_ms;
            if stepped {
                now_ms = next_tick;
                continue;
            }
            let wait = Duration::from_millis(next_tick.saturating_sub(clock.now_ms()));
            match self.stop_rx.recv_timeout(wait) {
                Ok(()) => break SessionOutcome::Stopped,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(wait),
            }
            now_ms = clock.now_ms().max(next_tick);
        };

        self.pipeline.teardown();
        self.source.stop();
        debug_assert_eq!(self.pipeline.pending_timers(), 0);

        let summary = SessionSummary {
            frames,
            duration_ms: now_ms,
            outcome,
            lesson_completed: self.pipeline.is_finished(),
        };
        info!(
            "Session ended ({:?}) after {} frames, {}ms",
            summary.outcome, summary.frames, summary.duration_ms
        );
        Ok(summary)
    }
}

use crate::challenge::EngineEvent;
use crate::pipeline::{LessonFrame, SessionFrame};
use crate::types::{GUITAR_STRING_NAMES, MAX_FRET};
use crossbeam_channel::Receiver;
use std::fmt::Write as _;
use std::io::{self, Write};

const METER_WIDTH: usize = 41;
const FRETS_SHOWN: u8 = MAX_FRET;

/// Renders a live ASCII dashboard of the session.
pub struct ConsoleDisplay {
    rx: Receiver<SessionFrame>,
    update_hz: u32,
    tick_ms: u64,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<SessionFrame>, update_hz: u32, tick_ms: u64) -> Self {
        Self {
            rx,
            update_hz,
            tick_ms,
        }
    }

    /// Draw until the frame channel closes. Frames carrying lesson events
    /// are always drawn so that no milestone is skipped.
    pub fn run(&self) {
        let frame_hz = 1000 / self.tick_ms.max(1);
        let skip = if self.update_hz == 0 {
            1
        } else {
            (frame_hz / self.update_hz as u64).max(1)
        };
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for frame in self.rx.iter() {
            count += 1;
            let has_events = frame.lesson.as_ref().is_some_and(|l| !l.events.is_empty());
            if count % skip != 0 && !has_events {
                continue;
            }

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H{}", render(&frame));
            let _ = stdout.flush();
        }
    }
}

/// One full dashboard for `frame`.
pub fn render(frame: &SessionFrame) -> String {
    let mut out = String::new();
    let title = match &frame.lesson {
        Some(l) => format!("STRING MASTER · {}", l.title),
        None => "STRING MASTER · Tuner".to_string(),
    };
    let _ = writeln!(out, "╔════════════════════════════════════════════════════╗");
    let _ = writeln!(out, "║  {:<50}║", title);
    let _ = writeln!(out, "╠════════════════════════════════════════════════════╣");
    let _ = writeln!(out, "  Time: {:.2}s", frame.t_ms as f64 / 1000.0);
    if let Some(target) = &frame.target {
        let _ = writeln!(out, "  Target: {}", target);
    }
    out.push('\n');

    let d = &frame.display;
    match &d.note {
        Some(note) => {
            let _ = writeln!(
                out,
                "  Note: {:<4} {:>+6.1} cents   {:>7.2} Hz",
                note.name, d.smoothed_cents, note.frequency
            );
        }
        None => {
            let _ = writeln!(out, "  Note: ---");
        }
    }
    let _ = writeln!(out, "  flat {} sharp", make_meter(d.smoothed_cents, METER_WIDTH));
    let status = match (d.locked_in, d.in_tune) {
        (true, _) => "LOCKED IN ✓",
        (false, true) => "in tune",
        _ if d.note.is_some() => "tuning...",
        _ => "",
    };
    let _ = writeln!(out, "  {}", status);

    if let Some(lesson) = &frame.lesson {
        out.push('\n');
        render_lesson(&mut out, lesson);
    }

    let _ = writeln!(out, "╚════════════════════════════════════════════════════╝");
    out
}

fn render_lesson(out: &mut String, l: &LessonFrame) {
    match (&l.instruction, &l.target) {
        (Some(instruction), Some(target)) => {
            let _ = writeln!(
                out,
                "  Challenge {}/{}: {}",
                l.challenge_index + 1,
                l.challenge_count,
                instruction
            );
            let _ = writeln!(out, "  Play: {}", target);
            let _ = writeln!(out, "  Hold {} {:.0}%", make_bar(l.hold_progress, 30), l.hold_progress * 100.0);
            if let Some(string) = l.string {
                out.push('\n');
                out.push_str(&make_fretboard(string, l.fret.unwrap_or(0)));
            }
        }
        _ if l.hold_progress >= 1.0 => {
            let _ = writeln!(out, "  All {} challenges cleared!", l.challenge_count);
        }
        _ => {
            let _ = writeln!(out, "  Waiting to start...");
        }
    }

    for event in &l.events {
        if let Some(msg) = event_message(event) {
            let _ = writeln!(out, "  » {}", msg);
        }
    }
}

fn event_message(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::ChallengeCleared { index } => Some(format!("Challenge {} cleared", index + 1)),
        EngineEvent::MatchLost { held_ms, .. } if *held_ms > 0 => {
            Some(format!("Lost it after {:.1}s, try again", *held_ms as f64 / 1000.0))
        }
        EngineEvent::LessonFinished { .. } => Some("Lesson finished!".into()),
        EngineEvent::LessonComplete { lesson_id } => Some(format!("{} complete", lesson_id)),
        _ => None,
    }
}

fn make_bar(val: f64, width: usize) -> String {
    let filled = ((val.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Needle over a -50..+50 cent scale, centre marked.
fn make_meter(cents: f64, width: usize) -> String {
    let last = width.saturating_sub(1);
    let centre = last / 2;
    let pos = (((cents.clamp(-50.0, 50.0) + 50.0) / 100.0) * last as f64).round() as usize;
    let mut meter = String::from("[");
    for i in 0..width {
        meter.push(if i == pos {
            '▼'
        } else if i == centre {
            '┃'
        } else {
            '─'
        });
    }
    meter.push(']');
    meter
}

/// Six strings, high E on top, with the position to play marked `●`
/// (`○` for an open string).
fn make_fretboard(string: u8, fret: u8) -> String {
    let mut fb = String::new();
    let _ = write!(fb, "      ");
    for f in 1..=FRETS_SHOWN {
        let _ = write!(fb, "{:^4}", f);
    }
    fb.push('\n');

    for (i, name) in GUITAR_STRING_NAMES.iter().enumerate() {
        let this_string = i + 1 == string as usize;
        let open = if this_string && fret == 0 { '○' } else { ' ' };
        let _ = write!(fb, "  {:<2}{}‖", &name[..1], open);
        for f in 1..=FRETS_SHOWN {
            let mark = if this_string && f == fret { '●' } else { '─' };
            let _ = write!(fb, "─{}─│", mark);
        }
        fb.push('\n');
    }
    fb
}

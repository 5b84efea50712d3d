use string_master::challenge::ChallengeEngine;
use string_master::classifier::TargetNote;
use string_master::config::Config;
use string_master::console_display;
use string_master::error::ConfigError;
use string_master::lesson::{Lesson, LessonCatalog};
use string_master::pipeline::{Pipeline, SessionFrame};
use string_master::pitch_source::{self, PitchSource, ScriptedSource};
use string_master::progress::{JsonFileProgressStore, ProgressStore};
use string_master::recorder::{FrameRecorder, RecordingHeader, ReplaySource};
use string_master::session::Session;

use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info, warn};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

#[derive(Parser)]
#[command(name = "string-master")]
#[command(about = "Guitar tuner and note-recognition trainer")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file (missing keys use defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimum estimator confidence to accept a reading (0 disables)
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// Lock-in margin in cents
    #[arg(long, global = true)]
    lock_margin: Option<f64>,

    /// Sampling period in ms (16–100)
    #[arg(long, global = true)]
    tick_ms: Option<u64>,

    /// Enable console display (terminal TUI)
    #[arg(long, global = true)]
    console: bool,

    /// Console display refresh rate (Hz)
    #[arg(long, global = true, default_value_t = 15)]
    display_hz: u32,

    /// Record the session as JSONL into this directory
    #[arg(long, global = true)]
    record: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long, global = true)]
    max_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Free tuning, optionally locked to one note
    Tune {
        /// Only show this note (e.g. "E2", "F#3", "Bb2")
        #[arg(long)]
        target: Option<String>,

        /// Replay a recorded session instead of the simulator
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Run on simulated time, as fast as possible
        #[arg(long)]
        fast: bool,
    },
    /// Work through a lesson
    Lesson {
        /// Lesson id, see `string-master lessons`
        id: String,

        /// Lesson catalog file (defaults to the built-in lessons)
        #[arg(long)]
        lessons: Option<PathBuf>,

        /// Progress file (defaults to the config's session.progress_path)
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Replay a recorded session instead of the simulator
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Run on simulated time, as fast as possible
        #[arg(long)]
        fast: bool,
    },
    /// List lessons and which ones are completed
    Lessons {
        #[arg(long)]
        lessons: Option<PathBuf>,

        #[arg(long)]
        progress: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::Lessons { lessons, progress } => {
            let catalog = load_catalog(lessons.as_deref())?;
            let store = JsonFileProgressStore::new(
                progress.clone().unwrap_or_else(|| config.session.progress_path.clone()),
            );
            list_lessons(&catalog, &store);
            Ok(())
        }
        Command::Tune {
            target,
            replay,
            fast,
        } => {
            let target = target.as_deref().map(TargetNote::parse).transpose()?;
            banner(&cli, &config, match &target {
                Some(t) => format!("TUNER (target {})", t.name),
                None => "TUNER".to_string(),
            });
            let source: Box<dyn PitchSource + Send> = match replay {
                Some(path) => Box::new(ReplaySource::new(path)),
                None => Box::new(ScriptedSource::new(
                    &pitch_source::tuning_demo(),
                    config.session.tick_ms,
                )?),
            };
            let pipeline = Pipeline::tuner(&config, target);
            run_session(&cli, &config, source, pipeline, "tuner", *fast)
        }
        Command::Lesson {
            id,
            lessons,
            progress,
            replay,
            fast,
        } => {
            let catalog = load_catalog(lessons.as_deref())?;
            let lesson: Lesson = catalog
                .find(id)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownLesson {
                    lesson_id: id.clone(),
                })?;
            let mut store = JsonFileProgressStore::new(
                progress.clone().unwrap_or_else(|| config.session.progress_path.clone()),
            );
            if store.completed_lesson_ids().contains(&lesson.id) {
                info!("Lesson {} already completed, practising again", lesson.id);
            }
            banner(&cli, &config, format!("LESSON {} ({})", lesson.id, lesson.title));

            let source: Box<dyn PitchSource + Send> = match replay {
                Some(path) => Box::new(ReplaySource::new(path)),
                None => Box::new(ScriptedSource::new(
                    &pitch_source::lesson_demo(&lesson, &config.challenge)?,
                    config.session.tick_ms,
                )?),
            };
            let engine = ChallengeEngine::new(lesson.clone(), config.challenge)?
                .on_complete(move |lesson_id| store.mark_lesson_complete(lesson_id));
            let pipeline = Pipeline::lesson(&config, engine);
            run_session(&cli, &config, source, pipeline, &lesson.id, *fast)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = cli.config.as_deref().map(Config::load).unwrap_or_default();
    if let Some(c) = cli.confidence {
        config.classifier.confidence_threshold = c;
    }
    if let Some(m) = cli.lock_margin {
        config.stabilizer.lock_in_margin_cents = m;
    }
    if let Some(t) = cli.tick_ms {
        config.session.tick_ms = t;
    }
    config.validate()?;
    Ok(config)
}

fn load_catalog(path: Option<&Path>) -> Result<LessonCatalog, ConfigError> {
    match path {
        Some(p) => LessonCatalog::load(p),
        None => Ok(LessonCatalog::builtin()),
    }
}

fn list_lessons(catalog: &LessonCatalog, store: &dyn ProgressStore) {
    let completed = store.completed_lesson_ids();
    println!("Lessons:");
    for lesson in &catalog.lessons {
        let mark = if completed.contains(&lesson.id) { "✓" } else { " " };
        println!(
            "  [{}] {:<10} {} ({} challenges)",
            mark,
            lesson.id,
            lesson.title,
            lesson.challenges.len()
        );
    }
    println!("{}/{} completed", completed.len(), catalog.lessons.len());
}

fn banner(cli: &Cli, config: &Config, mode: String) {
    info!("═══════════════════════════════════════════════");
    info!("  STRING MASTER v{}", env!("CARGO_PKG_VERSION"));
    info!("  Mode: {}", mode);
    info!(
        "  Sampling: {} Hz, confidence ≥ {:.2}, lock-in ±{} cents",
        1000 / config.session.tick_ms,
        config.classifier.confidence_threshold,
        config.stabilizer.lock_in_margin_cents
    );
    if cli.console { info!("  UI: Console TUI"); }
    if let Some(dir) = &cli.record { info!("  Recording → {:?}", dir); }
    info!("═══════════════════════════════════════════════");
}

fn run_session(
    cli: &Cli,
    config: &Config,
    source: Box<dyn PitchSource + Send>,
    pipeline: Pipeline,
    mode: &str,
    fast: bool,
) -> Result<(), Box<dyn Error>> {
    let tick_ms = config.session.tick_ms;

    // Channels: session → consumers
    let mut frame_txs: Vec<Sender<SessionFrame>> = Vec::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // ─── Console display (opt-in) ───────────────────────────────────
    if cli.console {
        let (tx, rx) = bounded::<SessionFrame>(256);
        frame_txs.push(tx);
        let hz = cli.display_hz;
        handles.push(thread::Builder::new().name("display".into()).spawn(move || {
            console_display::ConsoleDisplay::new(rx, hz, tick_ms).run();
        })?);
    } else {
        let (tx, rx) = bounded::<SessionFrame>(256);
        frame_txs.push(tx);
        handles.push(thread::Builder::new().name("reporter".into()).spawn(move || {
            report_milestones(rx);
        })?);
    }

    // ─── Recorder ───────────────────────────────────────────────────
    if let Some(dir) = &cli.record {
        let (tx, rx) = bounded::<SessionFrame>(4096);
        frame_txs.push(tx);
        let recorder = FrameRecorder::new(rx, dir, RecordingHeader::new(tick_ms, mode))?;
        handles.push(thread::Builder::new().name("recorder".into()).spawn(move || {
            if let Err(e) = recorder.run() {
                error!("Recording failed: {}", e);
            }
        })?);
    }

    // ─── Session ────────────────────────────────────────────────────
    let (session, _stop) = Session::new(source, pipeline, frame_txs, tick_ms);
    let session = if fast { session.stepped() } else { session };
    let session = session.with_max_duration(cli.max_secs.map(|s| s * 1000));
    let session_thread = thread::Builder::new()
        .name("session".into())
        .spawn(move || session.run())?;

    let result = session_thread
        .join()
        .map_err(|_| "session thread panicked")?;

    // The session dropped its senders, so every consumer drains and exits.
    for h in handles {
        let _ = h.join();
    }

    let summary = result?;
    if summary.lesson_completed {
        info!("Well done: {} complete", mode);
    } else if mode != "tuner" {
        warn!("Lesson {} not completed", mode);
    }
    Ok(())
}

/// Headless consumer: log lock-ins and lesson milestones.
fn report_milestones(rx: Receiver<SessionFrame>) {
    for frame in rx.iter() {
        if frame.display.just_locked {
            if let Some(note) = &frame.display.note {
                info!("Locked in on {} ({:+.1} cents)", note.name, note.cents);
            }
        }
    }
}

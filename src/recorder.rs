//! JSONL session recordings.
//!
//! A recording is one header line followed by one `SessionFrame` per tick:
//!
//! ```text
//! {"format":"string-master","version":"0.1.0","tick_ms":33,"mode":"tuner"}
//! {"t_ms":0,"sample":{"kind":"absent"},"note":null,"display":{...}}
//! ...
//! ```
//!
//! `FrameRecorder` writes them from a frame channel; `ReplaySource` feeds the
//! recorded samples back through a fresh pipeline as a `PitchSource`.

use crate::error::InitError;
use crate::pipeline::SessionFrame;
use crate::pitch_source::PitchSource;
use crate::types::PitchSample;
use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const RECORDING_FORMAT: &str = "string-master";

/// First line of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub format: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// "tuner" or the lesson id
    #[serde(default)]
    pub mode: String,
}

fn default_tick_ms() -> u64 {
    33
}

impl RecordingHeader {
    pub fn new(tick_ms: u64, mode: impl Into<String>) -> Self {
        Self {
            format: RECORDING_FORMAT.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            tick_ms,
            mode: mode.into(),
        }
    }
}

// ─── Writing ────────────────────────────────────────────────────────────────

pub struct FrameRecorder {
    rx: Receiver<SessionFrame>,
    path: PathBuf,
    header: RecordingHeader,
}

impl FrameRecorder {
    /// Prepare a recording under `output_dir` (created if needed), named
    /// after the current wall-clock second.
    pub fn new(
        rx: Receiver<SessionFrame>,
        output_dir: &Path,
        header: RecordingHeader,
    ) -> io::Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("session_{}.jsonl", timestamp));
        Ok(Self { rx, path, header })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record until the frame channel closes. Blocks the calling thread.
    pub fn run(&self) -> io::Result<u64> {
        info!("Recording session → {:?}", self.path);
        let mut writer = BufWriter::new(File::create(&self.path)?);
        let count = write_recording(&mut writer, &self.header, self.rx.iter())?;
        info!("Recording saved: {} frames → {:?}", count, self.path);
        Ok(count)
    }
}

/// Write a header and every frame from `frames`, flushing periodically.
pub fn write_recording<W: Write>(
    writer: &mut W,
    header: &RecordingHeader,
    frames: impl IntoIterator<Item = SessionFrame>,
) -> io::Result<u64> {
    serde_json::to_writer(&mut *writer, header)?;
    writeln!(writer)?;

    let mut count: u64 = 0;
    for frame in frames {
        match serde_json::to_string(&frame) {
            Ok(line) => writeln!(writer, "{}", line)?,
            Err(e) => {
                error!("Failed to serialize frame t={}ms: {}", frame.t_ms, e);
                continue;
            }
        }
        count += 1;
        if count % 1000 == 0 {
            writer.flush()?;
            debug!("Recorded {} frames", count);
        }
    }
    writer.flush()?;
    Ok(count)
}

// ─── Reading ────────────────────────────────────────────────────────────────

/// Line-by-line recording reader. Works with any `BufRead`.
pub struct RecordingReader<R: BufRead> {
    reader: R,
    pub header: RecordingHeader,
    line_buf: String,
}

impl<R: BufRead> RecordingReader<R> {
    /// Read and validate the header line.
    pub fn open(mut reader: R) -> Result<Self, String> {
        let mut first_line = String::new();
        reader
            .read_line(&mut first_line)
            .map_err(|e| format!("read header: {}", e))?;

        let first_line = first_line.trim();
        if first_line.is_empty() {
            return Err("empty file".into());
        }

        let header: RecordingHeader =
            serde_json::from_str(first_line).map_err(|e| format!("parse header: {}", e))?;
        if header.format != RECORDING_FORMAT {
            return Err(format!("unknown format: {}", header.format));
        }

        Ok(Self {
            reader,
            header,
            line_buf: String::new(),
        })
    }

    /// Next frame. `None` at EOF, `Err` for an unparseable line.
    pub fn next_frame(&mut self) -> Option<Result<SessionFrame, String>> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line_buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<SessionFrame>(trimmed)
                            .map_err(|e| format!("parse frame: {}", e)),
                    );
                }
                Err(e) => return Some(Err(format!("read line: {}", e))),
            }
        }
    }

    /// All remaining frames, skipping malformed lines.
    pub fn read_all(mut self) -> Vec<SessionFrame> {
        let mut frames = Vec::new();
        let mut skipped = 0;
        while let Some(result) = self.next_frame() {
            match result {
                Ok(frame) => frames.push(frame),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("Skipped {} malformed recording lines", skipped);
        }
        frames
    }
}

// ─── Replay ─────────────────────────────────────────────────────────────────

/// Plays back the samples of a recording, one per tick.
///
/// The file is read on `start`, so a missing or foreign file is reported as
/// an acquisition failure like any other input that cannot be opened.
pub struct ReplaySource {
    path: PathBuf,
    samples: VecDeque<PitchSample>,
    header: Option<RecordingHeader>,
    running: bool,
    loaded: bool,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            samples: VecDeque::new(),
            header: None,
            running: false,
            loaded: false,
        }
    }

    /// Header of the loaded recording, available after `start`.
    pub fn header(&self) -> Option<&RecordingHeader> {
        self.header.as_ref()
    }
}

impl PitchSource for ReplaySource {
    fn start(&mut self) -> Result<(), InitError> {
        let file = File::open(&self.path).map_err(|e| {
            InitError::device_unavailable(format!("cannot open {:?}: {}", self.path, e))
        })?;
        let reader = RecordingReader::open(BufReader::new(file)).map_err(|e| {
            InitError::device_unavailable(format!("bad recording {:?}: {}", self.path, e))
        })?;
        let header = reader.header.clone();
        self.samples = reader.read_all().into_iter().map(|f| f.sample).collect();
        info!(
            "Replaying {:?}: {} samples recorded at {}ms ticks ({})",
            self.path,
            self.samples.len(),
            header.tick_ms,
            header.mode
        );
        self.header = Some(header);
        self.loaded = true;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn next_sample(&mut self) -> Option<PitchSample> {
        if !self.running {
            return None;
        }
        self.samples.pop_front()
    }

    fn is_finished(&self) -> bool {
        self.loaded && (!self.running || self.samples.is_empty())
    }
}

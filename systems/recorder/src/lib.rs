#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Captures sessions tick by tick, persists them as JSON and plays them back.
//!
//! While recording, [`Recorder::record_frame`] is called once after every
//! applied tick and stores an independent copy of every grid's layers.
//! Nothing touches the disk until [`Recorder::stop_recording`], which writes
//! the frames, the triggered tones and the final state of every grid to a
//! single document. [`load`] installs such a document into a live session and
//! [`Playback`] replays its frames at any frame rate.

use std::{
    fs, mem,
    path::{Path, PathBuf},
};

use carillon_core::{Command, Event, GridId, RestoreError};
use carillon_system_scheduler::ScheduleError;
use carillon_system_tone_dispatch::ToneDispatcher;
use carillon_world::{self as world, query, Session};
use thiserror::Error;
use tracing::{info, warn};

mod format;
mod playback;

pub use format::{
    cell_key, parse_cell_key, AttributeRecord, AudioEventRecord, Document, FormatError,
    FrameRecord, GridRecord, LayerRecord, Recording, TagMatrix,
};
pub use playback::{Playback, PlaybackStatus, DEFAULT_PLAYBACK_FPS};

/// Extension given to recording documents.
pub const RECORDING_EXTENSION: &str = "json";

/// Extension given to the audio capture running alongside a recording.
pub const CAPTURE_EXTENSION: &str = "wav";

/// Errors raised by the recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// A recording was started while another one was running.
    #[error("already recording into {}", .0.display())]
    AlreadyRecording(PathBuf),
    /// A recording was stopped while none was running.
    #[error("no recording is running")]
    NotRecording,
    /// The recording name has no file name component.
    #[error("recording name {0:?} is not a file name")]
    InvalidName(String),
    /// The document could not be read or written.
    #[error("recording i/o failed for {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid JSON for the session format.
    #[error("recording is not a valid session document: {0}")]
    Json(#[from] serde_json::Error),
    /// The document parsed but describes an impossible grid.
    #[error("recording is malformed: {0}")]
    Format(#[from] FormatError),
    /// The session rejected the recorded state.
    #[error("recording does not fit the session: {0}")]
    Restore(#[from] RestoreError),
    /// Playback was configured with an unusable frame rate.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// File paths used by a finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedRecording {
    /// Document holding frames, grids and audio events.
    pub path: PathBuf,
    /// Audio capture requested from the dispatcher.
    pub capture: PathBuf,
    /// Contents that were written.
    pub recording: Recording,
}

#[derive(Clone, Debug)]
struct ActiveRecording {
    path: PathBuf,
    capture: PathBuf,
}

/// Buffers frames and tones while a recording is active.
#[derive(Debug)]
pub struct Recorder {
    output_dir: PathBuf,
    active: Option<ActiveRecording>,
    frames: Vec<FrameRecord>,
    audio_events: Vec<AudioEventRecord>,
}

impl Recorder {
    /// Creates an idle recorder writing documents under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            active: None,
            frames: Vec::new(),
            audio_events: Vec::new(),
        }
    }

    /// Directory recordings are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Reports whether a recording is running.
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Frames buffered by the running recording.
    #[must_use]
    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    /// Tones buffered by the running recording.
    #[must_use]
    pub fn audio_events(&self) -> &[AudioEventRecord] {
        &self.audio_events
    }

    /// Starts a recording called `name` and asks the dispatcher to capture audio alongside it.
    ///
    /// `.json` is appended to `name` when missing; the capture uses the same
    /// stem with a `.wav` extension. A dispatcher that fails to start the
    /// capture is logged and the recording proceeds without audio.
    pub fn start_recording<D>(
        &mut self,
        name: &str,
        dispatcher: &mut D,
    ) -> Result<PathBuf, RecorderError>
    where
        D: ToneDispatcher + ?Sized,
    {
        if let Some(active) = &self.active {
            return Err(RecorderError::AlreadyRecording(active.path.clone()));
        }

        let path = self.document_path(name)?;
        let capture = path.with_extension(CAPTURE_EXTENSION);
        self.frames.clear();
        self.audio_events.clear();

        if let Err(err) = dispatcher.start_capture(&capture) {
            warn!(capture = %capture.display(), error = %err, "audio capture did not start");
        }
        info!(path = %path.display(), "recording started");
        self.active = Some(ActiveRecording {
            path: path.clone(),
            capture,
        });
        Ok(path)
    }

    fn document_path(&self, name: &str) -> Result<PathBuf, RecorderError> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| RecorderError::InvalidName(name.to_owned()))?;
        let mut path = self.output_dir.join(file_name);
        if path.extension().and_then(|ext| ext.to_str()) != Some(RECORDING_EXTENSION) {
            let mut with_extension = path.into_os_string();
            with_extension.push(".");
            with_extension.push(RECORDING_EXTENSION);
            path = PathBuf::from(with_extension);
        }
        Ok(path)
    }

    /// Appends a snapshot of every grid. Ignored unless a recording is running.
    ///
    /// Call once per tick, after the tick has been applied.
    pub fn record_frame(&mut self, session: &Session) {
        if self.active.is_none() {
            return;
        }
        self.frames.push(FrameRecord {
            tick: query::tick_index(session),
            grids: query::snapshot_layers(session)
                .iter()
                .map(LayerRecord::capture)
                .collect(),
        });
    }

    /// Logs the tones among `events`. Ignored unless a recording is running.
    pub fn record_events(&mut self, events: &[Event]) {
        if self.active.is_none() {
            return;
        }
        self.audio_events
            .extend(events.iter().filter_map(AudioEventRecord::from_event));
    }

    /// Stops the running recording and writes it to disk.
    ///
    /// The document holds every buffered frame, every buffered tone and the
    /// current state of each grid. The buffers are empty afterwards. When the
    /// document cannot be written the recording keeps running with its buffers
    /// intact, so the call can be retried.
    pub fn stop_recording<D>(
        &mut self,
        session: &Session,
        dispatcher: &mut D,
    ) -> Result<SavedRecording, RecorderError>
    where
        D: ToneDispatcher + ?Sized,
    {
        let active = self.active.clone().ok_or(RecorderError::NotRecording)?;
        let recording = Recording {
            grids: capture_grids(session),
            frames: mem::take(&mut self.frames),
            audio_events: mem::take(&mut self.audio_events),
        };
        if let Err(err) = save(&active.path, &recording) {
            self.frames = recording.frames;
            self.audio_events = recording.audio_events;
            warn!(path = %active.path.display(), error = %err, "recording not saved");
            return Err(err);
        }

        self.active = None;
        if let Err(err) = dispatcher.stop_capture() {
            warn!(
                capture = %active.capture.display(),
                error = %err,
                "audio capture did not stop cleanly"
            );
        }
        info!(
            path = %active.path.display(),
            frames = recording.frames.len(),
            tones = recording.audio_events.len(),
            "recording saved"
        );

        Ok(SavedRecording {
            path: active.path,
            capture: active.capture,
            recording,
        })
    }

    /// Abandons the running recording without writing anything.
    pub fn discard<D>(&mut self, dispatcher: &mut D)
    where
        D: ToneDispatcher + ?Sized,
    {
        if self.active.take().is_some() {
            if let Err(err) = dispatcher.stop_capture() {
                warn!(error = %err, "audio capture did not stop cleanly");
            }
            info!("recording discarded");
        }
        self.frames.clear();
        self.audio_events.clear();
    }
}

/// Captures the current state of every grid in `session`.
#[must_use]
pub fn capture_grids(session: &Session) -> Vec<GridRecord> {
    query::grid_ids(session)
        .into_iter()
        .filter_map(|grid| {
            let metadata = query::metadata(session, grid)?;
            let state = query::grid_state(session, grid)?;
            Some(GridRecord::capture(metadata, state))
        })
        .collect()
}

/// Writes `recording` to `path` as pretty-printed JSON, creating parent directories.
pub fn save(path: &Path, recording: &Recording) -> Result<(), RecorderError> {
    let io_error = |source| RecorderError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut json = serde_json::to_string_pretty(recording)?;
    json.push('\n');
    fs::write(path, json).map_err(io_error)
}

/// Reads a session or bare grid document from `path`.
pub fn read_document(path: &Path) -> Result<Document, RecorderError> {
    let text = fs::read_to_string(path).map_err(|source| RecorderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Document::from_json(&text)?)
}

/// Installs a document into `session`.
///
/// A session document must describe exactly as many grids as the session
/// holds, each with matching dimensions. A session document without grid
/// headers restores its last frame instead. A bare grid document is loaded
/// into grid 0. Every grid is decoded and checked before any is replaced, so
/// a failed load leaves the session untouched.
pub fn load(
    session: &mut Session,
    document: &Document,
    out_events: &mut Vec<Event>,
) -> Result<(), RecorderError> {
    let command = match document {
        Document::Session(recording) => match recording.frames.last() {
            Some(frame) if recording.grids.is_empty() => Command::RestoreFrame {
                layers: frame.restore()?,
            },
            _ => Command::LoadGrids {
                grids: recording.restore_grids()?,
            },
        },
        Document::Grid(grid) => Command::LoadGrid {
            grid: GridId::new(0),
            loaded: grid.restore()?,
        },
    };

    let mut events = Vec::new();
    world::apply(session, command, &mut events);
    let rejected = events.iter().find_map(|event| match event {
        Event::RestoreRejected { reason } => Some(*reason),
        _ => None,
    });
    out_events.extend(events);
    if let Some(reason) = rejected {
        return Err(RecorderError::Restore(reason));
    }

    info!(grids = query::grid_count(session), "recording loaded");
    Ok(())
}

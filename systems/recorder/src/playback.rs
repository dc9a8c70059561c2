//! Frame-by-frame replay of a recording.

use std::time::Duration;

use carillon_core::{Command, Event, GridLayers};
use carillon_system_scheduler::Scheduler;
use carillon_world::{self as world, Session};
use tracing::{debug, info};

use crate::{Recording, RecorderError};

/// Frame rate used when none is configured.
pub const DEFAULT_PLAYBACK_FPS: u32 = 10;

/// Progress reported by [`Playback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// More frames remain; the payload counts frames applied so far.
    Playing(usize),
    /// The last frame has been applied.
    Finished,
    /// Playback was cancelled before the last frame.
    Cancelled,
}

/// Replays the frames of a recording at a fixed frame rate.
///
/// Frames are decoded once up front and retained, so playback can be
/// rewound and repeated without touching the recording.
#[derive(Debug)]
pub struct Playback {
    frames: Vec<Vec<GridLayers>>,
    cursor: usize,
    scheduler: Scheduler,
}

impl Playback {
    /// Decodes every frame of `recording` and prepares to play them at `fps`.
    pub fn new(recording: &Recording, fps: u32) -> Result<Self, RecorderError> {
        let scheduler = Scheduler::from_fps(fps)?;
        let frames = recording.restore_frames()?;
        Ok(Self {
            frames,
            cursor: 0,
            scheduler,
        })
    }

    /// Number of frames in the recording.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Reports whether the recording holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames applied since the start or the last rewind.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    /// Wall-clock time between frames.
    #[must_use]
    pub const fn frame_interval(&self) -> Duration {
        self.scheduler.interval()
    }

    /// Current progress.
    #[must_use]
    pub fn status(&self) -> PlaybackStatus {
        if self.cursor >= self.frames.len() {
            PlaybackStatus::Finished
        } else if self.scheduler.is_cancelled() {
            PlaybackStatus::Cancelled
        } else {
            PlaybackStatus::Playing(self.cursor)
        }
    }

    /// Applies every frame that became due during `dt`.
    pub fn advance(
        &mut self,
        dt: Duration,
        session: &mut Session,
        out_events: &mut Vec<Event>,
    ) -> Result<PlaybackStatus, RecorderError> {
        if self.status() != PlaybackStatus::Playing(self.cursor) {
            return Ok(self.status());
        }
        let due = self.scheduler.advance(dt);
        for _ in 0..due {
            if let PlaybackStatus::Finished = self.step(session, out_events)? {
                break;
            }
        }
        Ok(self.status())
    }

    /// Applies the next frame immediately, ignoring the frame rate.
    ///
    /// The frame replaces the layers of every grid at once or, when it does
    /// not fit the session, leaves the session untouched and fails.
    pub fn step(
        &mut self,
        session: &mut Session,
        out_events: &mut Vec<Event>,
    ) -> Result<PlaybackStatus, RecorderError> {
        let Some(frame) = self.frames.get(self.cursor) else {
            return Ok(PlaybackStatus::Finished);
        };

        let mut events = Vec::new();
        world::apply(
            session,
            Command::RestoreFrame {
                layers: frame.clone(),
            },
            &mut events,
        );
        let rejected = events.iter().find_map(|event| match event {
            Event::RestoreRejected { reason } => Some(*reason),
            _ => None,
        });
        out_events.extend(events);
        if let Some(reason) = rejected {
            return Err(RecorderError::Restore(reason));
        }

        self.cursor += 1;
        debug!(frame = self.cursor, total = self.frames.len(), "frame restored");
        if self.cursor == self.frames.len() {
            info!(frames = self.frames.len(), "playback finished");
        }
        Ok(self.status())
    }

    /// Stops playback at the current frame boundary.
    pub fn cancel(&mut self) {
        self.scheduler.cancel();
    }

    /// Restarts playback from the first frame.
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.scheduler.cancel();
        self.scheduler.resume();
    }
}

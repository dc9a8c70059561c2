#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Boundary between the simulation and whatever produces sound.
//!
//! The simulation never talks to an audio backend directly. The [`ToneRouter`]
//! system reads [`Event::ToneTriggered`] values and hands one [`ToneRequest`]
//! per trigger to a [`ToneDispatcher`]. Dispatchers must return immediately;
//! [`BackgroundDispatcher`] moves a slow backend onto its own thread so that
//! requests become channel sends.

use std::path::{Path, PathBuf};

use carillon_core::{Event, Tone};
use glam::Vec2;
use thiserror::Error;

mod background;

pub use background::BackgroundDispatcher;

/// Stereo gains applied when no panning is configured.
pub const CENTER_PAN: Vec2 = Vec2::ONE;

/// A single tone to be sounded by the audio backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneRequest {
    /// Pitch, length and loudness of the tone.
    pub tone: Tone,
    /// Left and right channel gains.
    pub pan: Vec2,
}

/// Errors reported by audio backends.
///
/// These are transient by nature: callers log them and carry on.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The backend could not be reached.
    #[error("audio backend unavailable: {0}")]
    Unavailable(String),
    /// A capture was requested while another one was running.
    #[error("audio capture already running into {}", .0.display())]
    CaptureActive(PathBuf),
    /// A capture was stopped while none was running.
    #[error("no audio capture is running")]
    NoCapture,
    /// The capture file could not be written.
    #[error("audio capture i/o failed for {}: {source}", path.display())]
    Io {
        /// File the capture was writing to.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}

/// Audio backend contract consumed by the simulation.
pub trait ToneDispatcher {
    /// Sounds a tone. Must not block and has no result to inspect.
    fn play_tone(&mut self, request: ToneRequest);

    /// Starts capturing everything played into the file at `path`.
    fn start_capture(&mut self, path: &Path) -> Result<(), DispatchError>;

    /// Stops the running capture and finalises its file.
    fn stop_capture(&mut self) -> Result<(), DispatchError>;
}

impl<D> ToneDispatcher for &mut D
where
    D: ToneDispatcher + ?Sized,
{
    fn play_tone(&mut self, request: ToneRequest) {
        (**self).play_tone(request);
    }

    fn start_capture(&mut self, path: &Path) -> Result<(), DispatchError> {
        (**self).start_capture(path)
    }

    fn stop_capture(&mut self) -> Result<(), DispatchError> {
        (**self).stop_capture()
    }
}

/// Pure system that forwards trigger events to a dispatcher.
#[derive(Clone, Debug)]
pub struct ToneRouter {
    pan: Vec2,
    dispatched: u64,
}

impl ToneRouter {
    /// Creates a router that pans every tone to the centre.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_pan(CENTER_PAN)
    }

    /// Creates a router applying `pan` to every tone.
    #[must_use]
    pub const fn with_pan(pan: Vec2) -> Self {
        Self { pan, dispatched: 0 }
    }

    /// Total number of requests handed to dispatchers so far.
    #[must_use]
    pub const fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Hands one request per [`Event::ToneTriggered`] to `dispatcher`, in event order.
    ///
    /// Returns the number of requests handed off by this call.
    pub fn handle<D>(&mut self, events: &[Event], dispatcher: &mut D) -> usize
    where
        D: ToneDispatcher + ?Sized,
    {
        let mut handed_off = 0;
        for event in events {
            if let Event::ToneTriggered {
                tick,
                grid,
                trigger,
            } = event
            {
                tracing::debug!(
                    tick,
                    grid = grid.get(),
                    row = trigger.cell.row(),
                    column = trigger.cell.column(),
                    pitch = trigger.attributes.pitch,
                    "dispatching tone"
                );
                dispatcher.play_tone(ToneRequest {
                    tone: trigger.attributes.tone(),
                    pan: self.pan,
                });
                handed_off += 1;
            }
        }
        self.dispatched = self.dispatched.saturating_add(handed_off as u64);
        handed_off
    }
}

impl Default for ToneRouter {
    fn default() -> Self {
        Self::new()
    }
}

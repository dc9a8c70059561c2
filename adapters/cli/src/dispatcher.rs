//! Tone dispatcher for terminals without an audio device.

use std::path::{Path, PathBuf};

use carillon_system_tone_dispatch::{DispatchError, ToneDispatcher, ToneRequest};
use tracing::info;

/// Reports every tone through `tracing` instead of sounding it.
///
/// Capture requests are tracked so that start and stop pair up the way a
/// real backend would enforce, but no audio file is produced.
#[derive(Debug, Default)]
pub(crate) struct LoggingDispatcher {
    capture: Option<PathBuf>,
}

impl ToneDispatcher for LoggingDispatcher {
    fn play_tone(&mut self, request: ToneRequest) {
        info!(
            pitch = request.tone.pitch,
            duration = request.tone.duration,
            velocity = request.tone.velocity,
            pan_x = request.pan.x,
            pan_y = request.pan.y,
            capturing = self.capture.is_some(),
            "tone"
        );
    }

    fn start_capture(&mut self, path: &Path) -> Result<(), DispatchError> {
        if let Some(active) = &self.capture {
            return Err(DispatchError::CaptureActive(active.clone()));
        }
        info!(path = %path.display(), "capture requested; no audio device, tones are logged only");
        self.capture = Some(path.to_path_buf());
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), DispatchError> {
        let path = self.capture.take().ok_or(DispatchError::NoCapture)?;
        info!(path = %path.display(), "capture stopped");
        Ok(())
    }
}

//! Runs an audio backend on a dedicated worker thread.

use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

use tracing::warn;

use crate::{DispatchError, ToneDispatcher, ToneRequest};

type Reply = Sender<Result<(), DispatchError>>;

enum AudioMessage {
    Play(ToneRequest),
    StartCapture(PathBuf, Reply),
    StopCapture(Reply),
    Shutdown,
}

/// Dispatcher that forwards every request to a backend living on its own thread.
///
/// [`ToneDispatcher::play_tone`] becomes a channel send and never waits on the
/// backend. Capture control waits for the worker to answer, since callers need
/// to know whether the capture file is being written.
pub struct BackgroundDispatcher {
    tx: Sender<AudioMessage>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundDispatcher {
    /// Moves `backend` onto a freshly spawned worker thread.
    pub fn spawn<B>(backend: B) -> Result<Self, DispatchError>
    where
        B: ToneDispatcher + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("carillon-audio".into())
            .spawn(move || run_worker(backend, rx))
            .map_err(|err| DispatchError::Unavailable(err.to_string()))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    fn request(&self, build: impl FnOnce(Reply) -> AudioMessage) -> Result<(), DispatchError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| DispatchError::Unavailable("audio worker stopped".into()))?;
        reply_rx
            .recv()
            .map_err(|_| DispatchError::Unavailable("audio worker dropped the reply".into()))?
    }
}

impl ToneDispatcher for BackgroundDispatcher {
    fn play_tone(&mut self, request: ToneRequest) {
        if self.tx.send(AudioMessage::Play(request)).is_err() {
            warn!("audio worker stopped; dropping tone");
        }
    }

    fn start_capture(&mut self, path: &Path) -> Result<(), DispatchError> {
        let path = path.to_path_buf();
        self.request(move |reply| AudioMessage::StartCapture(path, reply))
    }

    fn stop_capture(&mut self) -> Result<(), DispatchError> {
        self.request(AudioMessage::StopCapture)
    }
}

impl Drop for BackgroundDispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(AudioMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("audio worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for BackgroundDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundDispatcher")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn run_worker<B>(mut backend: B, rx: Receiver<AudioMessage>)
where
    B: ToneDispatcher,
{
    while let Ok(message) = rx.recv() {
        match message {
            AudioMessage::Play(request) => backend.play_tone(request),
            AudioMessage::StartCapture(path, reply) => {
                let _ = reply.send(backend.start_capture(&path));
            }
            AudioMessage::StopCapture(reply) => {
                let _ = reply.send(backend.stop_capture());
            }
            AudioMessage::Shutdown => break,
        }
    }
}

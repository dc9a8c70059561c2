//! Session controller: drives live sessions and recording playback.

use std::{path::PathBuf, thread, time::Duration};

use anyhow::{Context, Result};
use carillon_core::{Command, Event, Tempo};
use carillon_rendering::{GridPresentation, RenderingBackend};
use carillon_system_recorder::{
    self as recorder, Document, Playback, PlaybackStatus, Recorder, Recording, SavedRecording,
};
use carillon_system_scheduler::Scheduler;
use carillon_system_tone_dispatch::{ToneDispatcher, ToneRouter};
use carillon_world::{self as world, query, Session};
use tracing::{debug, info, warn};

type Renderer = Box<dyn RenderingBackend>;

/// Runs a live session at its tempo, routing tones and feeding the recorder.
pub(crate) struct Conductor<D> {
    session: Session,
    scheduler: Scheduler,
    router: ToneRouter,
    recorder: Recorder,
    dispatcher: D,
    renderer: Option<Renderer>,
}

impl<D> Conductor<D>
where
    D: ToneDispatcher,
{
    pub(crate) fn new(
        session: Session,
        router: ToneRouter,
        recorder: Recorder,
        dispatcher: D,
    ) -> Self {
        let scheduler = Scheduler::from_tempo(query::tempo(&session));
        Self {
            session,
            scheduler,
            router,
            recorder,
            dispatcher,
            renderer: None,
        }
    }

    /// Redraws every grid through `renderer` after each tick.
    pub(crate) fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub(crate) const fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) const fn tones_dispatched(&self) -> u64 {
        self.router.dispatched()
    }

    pub(crate) fn set_tempo(&mut self, tempo: Tempo) {
        let mut events = Vec::new();
        world::apply(&mut self.session, Command::SetTempo { tempo }, &mut events);
        self.scheduler.set_tempo(tempo);
    }

    pub(crate) fn start_recording(&mut self, name: &str) -> Result<PathBuf> {
        self.recorder
            .start_recording(name, &mut self.dispatcher)
            .with_context(|| format!("start recording {name:?}"))
    }

    pub(crate) fn stop_recording(&mut self) -> Result<SavedRecording> {
        self.recorder
            .stop_recording(&self.session, &mut self.dispatcher)
            .context("stop recording")
    }

    /// Runs `ticks` ticks into a recording called `name`.
    ///
    /// The take is saved even when the run fails part way; the run's error is
    /// still returned in that case.
    pub(crate) fn record(
        &mut self,
        name: &str,
        ticks: u64,
        realtime: bool,
    ) -> Result<SavedRecording> {
        let _ = self.start_recording(name)?;
        let outcome = self.run(ticks, realtime);
        let saved = self.stop_recording();
        match (outcome, saved) {
            (Ok(()), saved) => saved,
            (Err(err), Ok(saved)) => {
                warn!(
                    path = %saved.path.display(),
                    frames = saved.recording.frames.len(),
                    "run failed, partial take saved"
                );
                Err(err)
            }
            (Err(err), Err(save_err)) => {
                warn!(error = %format!("{save_err:#}"), "run failed and the take was lost");
                Err(err)
            }
        }
    }

    /// Accounts for `dt` of elapsed time and applies every tick that became due.
    pub(crate) fn advance(&mut self, dt: Duration) -> Result<u32> {
        let due = self.scheduler.advance(dt);
        for _ in 0..due {
            self.tick()?;
        }
        Ok(due)
    }

    /// Applies `ticks` ticks, sleeping between them when `realtime` is set.
    pub(crate) fn run(&mut self, ticks: u64, realtime: bool) -> Result<()> {
        self.render()?;
        let mut applied = 0_u64;
        while applied < ticks {
            let wait = self.scheduler.until_next_tick();
            if realtime {
                thread::sleep(wait);
            }
            applied += u64::from(self.advance(wait)?);
        }
        info!(
            ticks = applied,
            tones = self.router.dispatched(),
            "session finished"
        );
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let mut events = Vec::new();
        world::apply(&mut self.session, Command::Tick, &mut events);
        let tones = self.router.handle(&events, &mut self.dispatcher);
        self.recorder.record_frame(&self.session);
        self.recorder.record_events(&events);
        debug!(tick = query::tick_index(&self.session), tones, "conducted tick");
        self.render()
    }

    fn render(&mut self) -> Result<()> {
        present(self.renderer.as_mut(), &self.session)
    }
}

/// Replays a recording into a session shaped like its grids.
pub(crate) struct Replay {
    session: Session,
    playback: Playback,
    renderer: Option<Renderer>,
}

impl Replay {
    /// Prepares playback of `recording` at `fps` frames per second.
    ///
    /// The session starts from the grid headers, which carry labels, tempo
    /// and cell attributes; documents without headers take their grid sizes
    /// from the first frame. The first frame is applied straight away and the
    /// rest overwrite the layers one by one.
    pub(crate) fn new(recording: &Recording, fps: u32) -> Result<Self> {
        let mut session = Session::default();
        let mut events = Vec::new();
        let sizes = recording
            .grid_sizes()
            .context("recording holds a malformed grid")?;
        for (index, size) in sizes.into_iter().enumerate() {
            let label = recording
                .grids
                .get(index)
                .map_or_else(|| format!("grid {index}"), |grid| grid.label.clone());
            world::apply(&mut session, Command::AddGrid { label, size }, &mut events);
        }
        if !recording.grids.is_empty() {
            recorder::load(
                &mut session,
                &Document::Session(recording.clone()),
                &mut events,
            )
            .context("recording does not describe a loadable session")?;
        }

        let mut playback = Playback::new(recording, fps).context("invalid playback rate")?;
        if !playback.is_empty() {
            let _ = playback
                .step(&mut session, &mut events)
                .context("first recorded frame does not fit the session")?;
        }
        Ok(Self {
            session,
            playback,
            renderer: None,
        })
    }

    pub(crate) fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Plays every remaining frame and returns how many were applied in total.
    pub(crate) fn run(&mut self, realtime: bool) -> Result<usize> {
        present(self.renderer.as_mut(), &self.session)?;
        loop {
            let dt = self.playback.frame_interval();
            if realtime {
                thread::sleep(dt);
            }
            let mut events = Vec::new();
            let status = self
                .playback
                .advance(dt, &mut self.session, &mut events)
                .context("recorded frame does not fit the session")?;
            if events
                .iter()
                .any(|event| matches!(event, Event::RedrawRequested { .. }))
            {
                present(self.renderer.as_mut(), &self.session)?;
            }
            if status != PlaybackStatus::Playing(self.playback.position()) {
                info!(frames = self.playback.position(), "playback finished");
                return Ok(self.playback.position());
            }
        }
    }

    #[cfg(test)]
    pub(crate) const fn session(&self) -> &Session {
        &self.session
    }
}

fn present(renderer: Option<&mut Renderer>, session: &Session) -> Result<()> {
    let Some(renderer) = renderer else {
        return Ok(());
    };
    let grids: Vec<_> = query::grid_ids(session)
        .into_iter()
        .filter_map(|grid| query::render_state(session, grid))
        .map(|view| GridPresentation::from_render_state(&view))
        .collect();
    renderer.present(&grids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, path::Path, rc::Rc};

    use carillon_core::{CellCoord, Direction, GridId, GridSize, Placement, Structure, Voice};
    use carillon_system_tone_dispatch::{DispatchError, ToneRequest};

    #[derive(Clone, Default)]
    struct Tones(Rc<RefCell<Vec<ToneRequest>>>);

    impl ToneDispatcher for Tones {
        fn play_tone(&mut self, request: ToneRequest) {
            self.0.borrow_mut().push(request);
        }

        fn start_capture(&mut self, _path: &Path) -> Result<(), DispatchError> {
            Ok(())
        }

        fn stop_capture(&mut self) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    struct Frames(Rc<RefCell<Vec<Vec<GridPresentation>>>>);

    impl RenderingBackend for Frames {
        fn present(&mut self, grids: &[GridPresentation]) -> Result<()> {
            self.0.borrow_mut().push(grids.to_vec());
            Ok(())
        }
    }

    fn session() -> Session {
        let mut session = Session::default();
        let mut events = Vec::new();
        let grid = GridId::new(0);
        for command in [
            Command::AddGrid {
                label: "loop".into(),
                size: GridSize::new(3, 4),
            },
            Command::PlaceAgent {
                grid,
                cell: CellCoord::new(1, 0),
                placement: Placement::Robot {
                    direction: Direction::East,
                    speed: 1,
                },
            },
            Command::PlaceAgent {
                grid,
                cell: CellCoord::new(1, 2),
                placement: Placement::structure(Structure::Emitter(Voice::Tone)),
            },
        ] {
            world::apply(&mut session, command, &mut events);
        }
        session
    }

    #[test]
    fn conductor_ticks_at_the_session_tempo_and_routes_tones() {
        let tones = Tones::default();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut conductor = Conductor::new(
            session(),
            ToneRouter::new(),
            Recorder::new(dir.path()),
            tones.clone(),
        );
        let interval = Tempo::default().tick_interval();

        assert_eq!(conductor.advance(interval / 2).expect("tick"), 0);
        assert_eq!(conductor.advance(interval * 2).expect("tick"), 2);
        assert_eq!(query::tick_index(conductor.session()), 2);
        // The robot reaches the emitter on the second tick, then every fourth tick.
        assert_eq!(tones.0.borrow().len(), 1);
        assert_eq!(conductor.tones_dispatched(), 1);

        conductor.set_tempo(Tempo::new(240).expect("valid tempo"));
        assert_eq!(query::tempo(conductor.session()).bpm(), 240);
        // Half a beat-tick was already banked, and the new interval is half as long.
        assert_eq!(conductor.advance(interval / 2).expect("tick"), 2);
    }

    #[test]
    fn recorded_runs_replay_to_the_same_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut conductor = Conductor::new(
            session(),
            ToneRouter::new(),
            Recorder::new(dir.path()),
            Tones::default(),
        );
        let path = conductor.start_recording("take").expect("start");
        conductor.run(9, false).expect("run");
        let saved = conductor.stop_recording().expect("stop");
        assert_eq!(saved.path, path);
        assert_eq!(saved.recording.frames.len(), 9);

        let recording = match recorder::read_document(&path).expect("read") {
            Document::Session(recording) => recording,
            Document::Grid(_) => panic!("expected a session document"),
        };
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let mut replay = Replay::new(&recording, 60)
            .expect("replay")
            .with_renderer(Box::new(Frames(Rc::clone(&drawn))));
        assert_eq!(replay.run(false).expect("playback"), 9);

        assert_eq!(
            query::snapshot_layers(replay.session()),
            query::snapshot_layers(conductor.session())
        );
        let drawn = drawn.borrow();
        assert_eq!(drawn.len(), 9);
        assert_eq!(drawn[0][0].label, "loop");
        // The first draw shows the state after the first recorded tick.
        assert_eq!(drawn[0][0].glyph(CellCoord::new(1, 1)), Some('>'));
        assert_eq!(drawn[0][0].glyph(CellCoord::new(1, 0)), Some('.'));
    }

    #[test]
    fn recordings_without_grid_headers_replay_from_their_frames() {
        let recording = match Document::from_json(
            r#"{"frames": [
                {"static": [[0, 0, 0]], "dynamic": [[3, 0, 0]], "directions": {"0_0": [0, 1]}},
                {"static": [[0, 0, 0]], "dynamic": [[0, 3, 0]], "directions": {"0_1": [0, 1]}},
                {"static": [[0, 0, 0]], "dynamic": [[0, 0, 3]], "directions": {"0_2": [0, 1]}}
            ]}"#,
        )
        .expect("parse")
        {
            Document::Session(recording) => recording,
            Document::Grid(_) => panic!("expected a session document"),
        };
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let mut replay = Replay::new(&recording, 30)
            .expect("replay")
            .with_renderer(Box::new(Frames(Rc::clone(&drawn))));
        assert_eq!(replay.run(false).expect("playback"), 3);

        let drawn = drawn.borrow();
        assert_eq!(drawn.len(), 3);
        assert_eq!(drawn[0][0].label, "grid 0");
        assert_eq!(drawn[0][0].glyph(CellCoord::new(0, 0)), Some('>'));
        assert_eq!(drawn[2][0].glyph(CellCoord::new(0, 2)), Some('>'));
        assert_eq!(
            query::grid_state(replay.session(), GridId::new(0)).map(|state| state.size()),
            Some(GridSize::new(1, 3))
        );
    }

    struct FailingRenderer {
        remaining: usize,
    }

    impl RenderingBackend for FailingRenderer {
        fn present(&mut self, _grids: &[GridPresentation]) -> Result<()> {
            if self.remaining == 0 {
                anyhow::bail!("display went away");
            }
            self.remaining -= 1;
            Ok(())
        }
    }

    #[test]
    fn failed_runs_still_save_the_take() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut conductor = Conductor::new(
            session(),
            ToneRouter::new(),
            Recorder::new(dir.path()),
            Tones::default(),
        )
        .with_renderer(Box::new(FailingRenderer { remaining: 3 }));

        let error = conductor.record("take", 9, false).expect_err("renderer fails");
        assert!(format!("{error:#}").contains("display went away"));

        let path = dir.path().join("take.json");
        let Document::Session(recording) = recorder::read_document(&path).expect("take saved")
        else {
            panic!("expected a session document");
        };
        assert_eq!(recording.frames.len(), 3);
        assert_eq!(recording.frames.last().map(|frame| frame.tick), Some(3));
    }

    #[test]
    fn recording_a_clean_run_returns_the_saved_take() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut conductor = Conductor::new(
            session(),
            ToneRouter::new(),
            Recorder::new(dir.path()),
            Tones::default(),
        );
        let saved = conductor.record("clean", 4, false).expect("record");
        assert_eq!(saved.path, dir.path().join("clean.json"));
        assert_eq!(saved.recording.frames.len(), 4);
        assert!(!saved.recording.audio_events.is_empty());
    }

    #[test]
    fn conductor_redraws_after_every_tick() {
        let dir = tempfile::tempdir().expect("tempdir");
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let mut conductor = Conductor::new(
            session(),
            ToneRouter::new(),
            Recorder::new(dir.path()),
            Tones::default(),
        )
        .with_renderer(Box::new(Frames(Rc::clone(&drawn))));

        conductor.run(3, false).expect("run");
        let frames = drawn.borrow();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0][0].glyph(CellCoord::new(1, 0)), Some('>'));
        assert_eq!(frames[3][0].glyph(CellCoord::new(1, 3)), Some('>'));
    }
}

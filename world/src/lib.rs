#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative session state for Carillon.
//!
//! A [`Session`] owns every grid together with its label and tempo. All
//! mutations flow through [`apply`], which validates the command, updates the
//! session and reports the outcome as [`Event`] values. Read access goes
//! through the [`query`] module.

use carillon_core::{
    AgentKind, CellAttributes, CellCoord, Command, Event, GridError, GridId, GridLayers,
    GridMetadata, GridSize, GridState, LoadedGrid, Motion, Placement, PlacementError,
    RestoreError, Tempo, Tone, MAX_ROBOT_SPEED,
};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq)]
struct GridSlot {
    metadata: GridMetadata,
    state: GridState,
}

/// Simulation context holding every grid of one session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    grids: Vec<GridSlot>,
    tempo: Tempo,
    tick_index: u64,
}

impl Session {
    /// Creates a session without grids running at `tempo`.
    #[must_use]
    pub fn new(tempo: Tempo) -> Self {
        Self {
            grids: Vec::new(),
            tempo,
            tick_index: 0,
        }
    }

    fn slot(&self, grid: GridId) -> Option<&GridSlot> {
        self.grids.get(grid.index())
    }

    fn slot_mut(&mut self, grid: GridId) -> Option<&mut GridSlot> {
        self.grids.get_mut(grid.index())
    }

    fn grid_ids(&self) -> impl Iterator<Item = GridId> {
        (0..self.grids.len()).filter_map(|index| u32::try_from(index).ok().map(GridId::new))
    }

    fn tick(&mut self, out_events: &mut Vec<Event>) {
        self.tick_index = self.tick_index.saturating_add(1);
        let tick = self.tick_index;
        out_events.push(Event::TimeAdvanced { tick });

        let mut triggered = 0usize;
        for (grid, slot) in self.grid_ids().zip(self.grids.iter_mut()) {
            let outcome = carillon_system_motion::tick(&slot.state);
            let replaced = slot.state.replace_robots(outcome.robots);
            debug_assert!(replaced, "motion engine changed the layer dimensions");

            for cell in outcome.collisions {
                warn!(
                    tick,
                    grid = grid.get(),
                    row = cell.row(),
                    column = cell.column(),
                    "robots collided; later robot kept"
                );
                out_events.push(Event::RobotsCollided { grid, cell });
            }

            triggered += outcome.triggers.len();
            for trigger in outcome.triggers {
                out_events.push(Event::ToneTriggered {
                    tick,
                    grid,
                    trigger,
                });
            }
        }

        debug!(tick, grids = self.grids.len(), triggered, "tick applied");
    }

    fn place(
        &mut self,
        grid: GridId,
        cell: CellCoord,
        placement: Placement,
    ) -> Result<(), PlacementError> {
        let slot = self.slot_mut(grid).ok_or(PlacementError::UnknownGrid)?;
        if !slot.state.size().contains(cell) {
            return Err(PlacementError::OutOfBounds);
        }

        let state = &mut slot.state;
        match placement {
            Placement::Empty => {
                let _ = state.set_structure(cell, None);
                let _ = state.robots_mut().remove(cell);
                let _ = state.set_attributes(cell, CellAttributes::silent());
            }
            Placement::Robot { direction, speed } => {
                if speed == 0 || speed > MAX_ROBOT_SPEED {
                    return Err(PlacementError::InvalidSpeed);
                }
                let _ = state.set_structure(cell, None);
                let _ = state.robots_mut().insert(cell, Motion::new(direction, speed));
                let _ = state.set_attributes(
                    cell,
                    CellAttributes::new(AgentKind::Robot, Tone::default()),
                );
            }
            Placement::Structure { structure, tone } => {
                let _ = state.robots_mut().remove(cell);
                let _ = state.set_structure(cell, Some(structure));
                let tone = Tone::new(tone.pitch, tone.duration, tone.velocity);
                let _ = state.set_attributes(
                    cell,
                    CellAttributes::new(AgentKind::Structure(structure), tone),
                );
            }
        }
        Ok(())
    }

    fn check_size(&self, grid: GridId, found: GridSize) -> Result<(), RestoreError> {
        let slot = self.slot(grid).ok_or(RestoreError::UnknownGrid(grid))?;
        let expected = slot.state.size();
        if expected != found {
            return Err(RestoreError::SizeMismatch {
                grid,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn check_count(&self, found: usize) -> Result<(), RestoreError> {
        let expected = self.grids.len();
        if expected != found {
            return Err(RestoreError::GridCountMismatch { expected, found });
        }
        Ok(())
    }

    fn load_all(&mut self, grids: Vec<LoadedGrid>) -> Result<(), RestoreError> {
        self.check_count(grids.len())?;
        for (grid, loaded) in self.grid_ids().zip(grids.iter()) {
            self.check_size(grid, loaded.state.size())?;
        }

        for (slot, loaded) in self.grids.iter_mut().zip(grids) {
            slot.metadata = loaded.metadata;
            slot.state = loaded.state;
        }
        Ok(())
    }

    fn load_one(&mut self, grid: GridId, loaded: LoadedGrid) -> Result<(), RestoreError> {
        self.check_size(grid, loaded.state.size())?;
        if let Some(slot) = self.slot_mut(grid) {
            slot.metadata = loaded.metadata;
            slot.state = loaded.state;
        }
        Ok(())
    }

    fn restore(&mut self, layers: Vec<GridLayers>) -> Result<(), RestoreError> {
        self.check_count(layers.len())?;
        for (grid, frame) in self.grid_ids().zip(layers.iter()) {
            self.check_size(grid, frame.size())?;
        }

        for (slot, frame) in self.grids.iter_mut().zip(layers) {
            let replaced = slot.state.replace_layers(frame);
            debug_assert!(replaced, "frame sizes were validated before restoring");
        }
        Ok(())
    }

    fn adopt_tempo(&mut self, tempo: Tempo, out_events: &mut Vec<Event>) {
        if tempo == self.tempo {
            return;
        }
        self.tempo = tempo;
        for slot in &mut self.grids {
            slot.metadata.tempo = tempo;
        }
        out_events.push(Event::TempoChanged { tempo });
    }

    fn redraw_all(&self, out_events: &mut Vec<Event>) {
        for grid in self.grid_ids() {
            out_events.push(Event::RedrawRequested { grid });
        }
    }
}

/// Applies the provided command to the session, mutating state deterministically.
pub fn apply(session: &mut Session, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::AddGrid { label, size } => {
            if size.is_empty() {
                out_events.push(Event::GridRejected {
                    reason: GridError::ZeroSize,
                });
                return;
            }
            let grid = GridId::new(u32::try_from(session.grids.len()).unwrap_or(u32::MAX));
            session.grids.push(GridSlot {
                metadata: GridMetadata {
                    label,
                    tempo: session.tempo,
                },
                state: GridState::new(size),
            });
            out_events.push(Event::GridAdded { grid, size });
        }
        Command::RemoveGrid { grid } => {
            if session.slot(grid).is_none() {
                out_events.push(Event::GridRejected {
                    reason: GridError::UnknownGrid(grid),
                });
                return;
            }
            let _ = session.grids.remove(grid.index());
            out_events.push(Event::GridRemoved { grid });
        }
        Command::PlaceAgent {
            grid,
            cell,
            placement,
        } => match session.place(grid, cell, placement) {
            Ok(()) => out_events.push(Event::AgentPlaced {
                grid,
                cell,
                kind: placement.kind(),
            }),
            Err(reason) => out_events.push(Event::PlacementRejected { grid, cell, reason }),
        },
        Command::ResetGrid { grid } => match session.slot_mut(grid) {
            Some(slot) => {
                slot.state.reset();
                out_events.push(Event::GridReset { grid });
                out_events.push(Event::RedrawRequested { grid });
            }
            None => out_events.push(Event::GridRejected {
                reason: GridError::UnknownGrid(grid),
            }),
        },
        Command::SetTempo { tempo } => session.adopt_tempo(tempo, out_events),
        Command::Tick => session.tick(out_events),
        Command::LoadGrids { grids } => {
            let tempo = grids.first().map(|loaded| loaded.metadata.tempo);
            match session.load_all(grids) {
                Ok(()) => {
                    out_events.push(Event::GridsLoaded {
                        count: session.grids.len(),
                    });
                    if let Some(tempo) = tempo {
                        session.adopt_tempo(tempo, out_events);
                    }
                    session.redraw_all(out_events);
                }
                Err(reason) => out_events.push(Event::RestoreRejected { reason }),
            }
        }
        Command::LoadGrid { grid, loaded } => {
            let tempo = loaded.metadata.tempo;
            match session.load_one(grid, loaded) {
                Ok(()) => {
                    out_events.push(Event::GridsLoaded { count: 1 });
                    session.adopt_tempo(tempo, out_events);
                    out_events.push(Event::RedrawRequested { grid });
                }
                Err(reason) => out_events.push(Event::RestoreRejected { reason }),
            }
        }
        Command::RestoreFrame { layers } => match session.restore(layers) {
            Ok(()) => session.redraw_all(out_events),
            Err(reason) => out_events.push(Event::RestoreRejected { reason }),
        },
    }
}

/// Query functions that provide read-only access to the session state.
pub mod query {
    use super::Session;
    use carillon_core::{GridId, GridLayers, GridMetadata, GridState, RenderState, Tempo};

    /// Number of live grids.
    #[must_use]
    pub fn grid_count(session: &Session) -> usize {
        session.grids.len()
    }

    /// Identifiers of every live grid in order.
    #[must_use]
    pub fn grid_ids(session: &Session) -> Vec<GridId> {
        session.grid_ids().collect()
    }

    /// Tempo currently driving the simulation clock.
    #[must_use]
    pub fn tempo(session: &Session) -> Tempo {
        session.tempo
    }

    /// Number of ticks applied since the session was created.
    #[must_use]
    pub fn tick_index(session: &Session) -> u64 {
        session.tick_index
    }

    /// Label and tempo of a grid.
    #[must_use]
    pub fn metadata(session: &Session, grid: GridId) -> Option<&GridMetadata> {
        session.slot(grid).map(|slot| &slot.metadata)
    }

    /// Layers, motion records and attributes of a grid.
    #[must_use]
    pub fn grid_state(session: &Session, grid: GridId) -> Option<&GridState> {
        session.slot(grid).map(|slot| &slot.state)
    }

    /// Read-only view of a grid for renderers.
    #[must_use]
    pub fn render_state(session: &Session, grid: GridId) -> Option<RenderState<'_>> {
        session
            .slot(grid)
            .map(|slot| RenderState::new(&slot.metadata, &slot.state))
    }

    /// Deep copies of every grid's layers, in grid order.
    ///
    /// The copies are independent of the session: later ticks do not alter them.
    #[must_use]
    pub fn snapshot_layers(session: &Session) -> Vec<GridLayers> {
        session
            .grids
            .iter()
            .map(|slot| slot.state.layers().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carillon_core::{Direction, Rotation, Structure, Voice};

    fn session_with_grid(rows: u32, columns: u32) -> Session {
        let mut session = Session::default();
        let mut events = Vec::new();
        apply(
            &mut session,
            Command::AddGrid {
                label: "main".into(),
                size: GridSize::new(rows, columns),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::GridAdded {
                grid: GridId::new(0),
                size: GridSize::new(rows, columns),
            }]
        );
        session
    }

    fn place(session: &mut Session, row: u32, column: u32, placement: Placement) -> Vec<Event> {
        let mut events = Vec::new();
        apply(
            session,
            Command::PlaceAgent {
                grid: GridId::new(0),
                cell: CellCoord::new(row, column),
                placement,
            },
            &mut events,
        );
        events
    }

    #[test]
    fn zero_sized_grids_are_rejected() {
        let mut session = Session::default();
        let mut events = Vec::new();
        apply(
            &mut session,
            Command::AddGrid {
                label: "flat".into(),
                size: GridSize::new(0, 4),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::GridRejected {
                reason: GridError::ZeroSize
            }]
        );
        assert_eq!(query::grid_count(&session), 0);
    }

    #[test]
    fn robot_placement_clears_the_structure_below() {
        let mut session = session_with_grid(3, 3);
        let _ = place(
            &mut session,
            1,
            1,
            Placement::structure(Structure::Emitter(Voice::Tone)),
        );
        let events = place(
            &mut session,
            1,
            1,
            Placement::Robot {
                direction: Direction::South,
                speed: 2,
            },
        );
        assert_eq!(
            events,
            vec![Event::AgentPlaced {
                grid: GridId::new(0),
                cell: CellCoord::new(1, 1),
                kind: AgentKind::Robot,
            }]
        );

        let state = query::grid_state(&session, GridId::new(0)).expect("grid");
        assert_eq!(state.structure(CellCoord::new(1, 1)), None);
        assert_eq!(
            state.robots().get(CellCoord::new(1, 1)),
            Some(Motion::new(Direction::South, 2))
        );
        assert_eq!(
            state.attributes(CellCoord::new(1, 1)).agent_type,
            AgentKind::Robot
        );
    }

    #[test]
    fn structure_placement_removes_the_robot_and_its_motion() {
        let mut session = session_with_grid(3, 3);
        let _ = place(&mut session, 0, 2, Placement::robot(3));
        let _ = place(
            &mut session,
            0,
            2,
            Placement::Structure {
                structure: Structure::Rotator(Rotation::Clockwise),
                tone: Tone {
                    pitch: 523.25,
                    duration: 0.25,
                    velocity: 200,
                },
            },
        );

        let state = query::grid_state(&session, GridId::new(0)).expect("grid");
        assert!(state.robots().is_empty());
        let attributes = state.attributes(CellCoord::new(0, 2));
        assert_eq!(attributes.pitch, 523.25);
        assert_eq!(attributes.velocity, 127);
    }

    #[test]
    fn empty_placement_writes_the_null_tone() {
        let mut session = session_with_grid(2, 2);
        let _ = place(
            &mut session,
            0,
            0,
            Placement::structure(Structure::Emitter(Voice::Vocal)),
        );
        let _ = place(&mut session, 0, 0, Placement::Empty);

        let state = query::grid_state(&session, GridId::new(0)).expect("grid");
        assert_eq!(state.attributes(CellCoord::new(0, 0)), CellAttributes::silent());
        assert_eq!(state.structure(CellCoord::new(0, 0)), None);
    }

    #[test]
    fn invalid_placements_are_reported() {
        let mut session = session_with_grid(2, 2);
        assert_eq!(
            place(&mut session, 0, 0, Placement::robot(0)),
            vec![Event::PlacementRejected {
                grid: GridId::new(0),
                cell: CellCoord::new(0, 0),
                reason: PlacementError::InvalidSpeed,
            }]
        );
        assert_eq!(
            place(&mut session, 0, 0, Placement::robot(MAX_ROBOT_SPEED + 1)),
            vec![Event::PlacementRejected {
                grid: GridId::new(0),
                cell: CellCoord::new(0, 0),
                reason: PlacementError::InvalidSpeed,
            }]
        );
        assert_eq!(
            place(&mut session, 2, 0, Placement::robot(1)),
            vec![Event::PlacementRejected {
                grid: GridId::new(0),
                cell: CellCoord::new(2, 0),
                reason: PlacementError::OutOfBounds,
            }]
        );
    }

    #[test]
    fn tick_reports_collisions_and_keeps_the_later_robot() {
        let mut session = session_with_grid(1, 3);
        let _ = place(&mut session, 0, 0, Placement::robot(1));
        let _ = place(
            &mut session,
            0,
            2,
            Placement::Robot {
                direction: Direction::West,
                speed: 1,
            },
        );

        let mut events = Vec::new();
        apply(&mut session, Command::Tick, &mut events);
        assert_eq!(
            events,
            vec![
                Event::TimeAdvanced { tick: 1 },
                Event::RobotsCollided {
                    grid: GridId::new(0),
                    cell: CellCoord::new(0, 1),
                },
            ]
        );
        let state = query::grid_state(&session, GridId::new(0)).expect("grid");
        assert_eq!(state.robots().len(), 1);
    }

    #[test]
    fn set_tempo_updates_every_grid() {
        let mut session = session_with_grid(2, 2);
        let tempo = Tempo::new(90).expect("valid tempo");
        let mut events = Vec::new();
        apply(&mut session, Command::SetTempo { tempo }, &mut events);
        assert_eq!(events, vec![Event::TempoChanged { tempo }]);
        assert_eq!(query::tempo(&session), tempo);
        assert_eq!(
            query::metadata(&session, GridId::new(0)).map(|metadata| metadata.tempo),
            Some(tempo)
        );

        events.clear();
        apply(&mut session, Command::SetTempo { tempo }, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn removing_a_grid_shifts_later_ids() {
        let mut session = session_with_grid(2, 2);
        let mut events = Vec::new();
        apply(
            &mut session,
            Command::AddGrid {
                label: "second".into(),
                size: GridSize::new(4, 4),
            },
            &mut events,
        );
        apply(
            &mut session,
            Command::RemoveGrid {
                grid: GridId::new(0),
            },
            &mut events,
        );
        assert_eq!(query::grid_count(&session), 1);
        assert_eq!(
            query::metadata(&session, GridId::new(0)).map(|metadata| metadata.label.as_str()),
            Some("second")
        );

        events.clear();
        apply(
            &mut session,
            Command::RemoveGrid {
                grid: GridId::new(1),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::GridRejected {
                reason: GridError::UnknownGrid(GridId::new(1))
            }]
        );
    }
}

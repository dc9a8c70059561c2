#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Carillon engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative session, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the session executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. The grid data model lives in [`GridState`]: a
//! structural layer, a robot layer whose cells carry each robot's [`Motion`]
//! record, and a per-cell [`CellAttributes`] table.

use std::{error::Error, fmt, time::Duration};

use serde::{Deserialize, Serialize};

mod grid;

pub use grid::{GridLayers, GridState, RenderState, RobotLayer};

/// Tempo applied to new sessions, measured in beats per minute.
pub const DEFAULT_TEMPO_BPM: u32 = 120;

/// Slowest tempo accepted by the session.
pub const MIN_TEMPO_BPM: u32 = 1;

/// Fastest tempo accepted by the session.
pub const MAX_TEMPO_BPM: u32 = 300;

/// Number of simulation ticks that elapse per beat (sixteenth notes).
pub const TICKS_PER_BEAT: u32 = 4;

/// Slowest robot speed, in ticks per step, accepted by placement.
pub const MAX_ROBOT_SPEED: u32 = 10;

/// Pitch assigned to cells that carry no explicit attributes.
pub const DEFAULT_PITCH: f64 = 440.0;

/// Duration assigned to cells that carry no explicit attributes.
pub const DEFAULT_DURATION: f64 = 0.5;

/// Velocity assigned to cells that carry no explicit attributes.
pub const DEFAULT_VELOCITY: u8 = 100;

/// Loudest velocity a tone may carry.
pub const MAX_VELOCITY: u8 = 127;

/// Commands that express all permissible session mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Appends a new empty grid to the session.
    AddGrid {
        /// Human readable label stored with the grid.
        label: String,
        /// Dimensions of the new grid. Both axes must be non-zero.
        size: GridSize,
    },
    /// Removes a grid and its motion state from the session.
    RemoveGrid {
        /// Grid targeted for removal.
        grid: GridId,
    },
    /// Places an agent into a single cell, replacing whatever occupied it.
    PlaceAgent {
        /// Grid receiving the placement.
        grid: GridId,
        /// Cell receiving the placement.
        cell: CellCoord,
        /// Agent that should occupy the cell.
        placement: Placement,
    },
    /// Clears both layers of a grid and restores default attributes.
    ResetGrid {
        /// Grid targeted for the reset.
        grid: GridId,
    },
    /// Changes the tempo that drives the simulation clock.
    SetTempo {
        /// New tempo for the session and every grid.
        tempo: Tempo,
    },
    /// Advances every grid by one simulation tick.
    Tick,
    /// Replaces every live grid with the provided grids.
    LoadGrids {
        /// One entry per live grid, in grid order.
        grids: Vec<LoadedGrid>,
    },
    /// Replaces a single live grid with the provided grid.
    LoadGrid {
        /// Grid targeted by the load.
        grid: GridId,
        /// Replacement contents.
        loaded: LoadedGrid,
    },
    /// Overwrites the layers of every live grid with a recorded frame.
    RestoreFrame {
        /// One layer snapshot per live grid, in grid order.
        layers: Vec<GridLayers>,
    },
}

/// Events broadcast by the session after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that a grid was appended to the session.
    GridAdded {
        /// Identifier assigned to the new grid.
        grid: GridId,
        /// Dimensions of the new grid.
        size: GridSize,
    },
    /// Confirms that a grid was removed from the session.
    GridRemoved {
        /// Identifier the grid carried before removal.
        grid: GridId,
    },
    /// Reports that a grid level command was rejected.
    GridRejected {
        /// Specific reason the command failed.
        reason: GridError,
    },
    /// Confirms that an agent now occupies a cell.
    AgentPlaced {
        /// Grid that received the placement.
        grid: GridId,
        /// Cell that received the placement.
        cell: CellCoord,
        /// Kind of agent written into the cell.
        kind: AgentKind,
    },
    /// Reports that a placement request was rejected.
    PlacementRejected {
        /// Grid targeted by the placement.
        grid: GridId,
        /// Cell targeted by the placement.
        cell: CellCoord,
        /// Specific reason the placement failed.
        reason: PlacementError,
    },
    /// Confirms that a grid was cleared.
    GridReset {
        /// Grid that was cleared.
        grid: GridId,
    },
    /// Announces that the simulation tempo changed.
    TempoChanged {
        /// Tempo that became active.
        tempo: Tempo,
    },
    /// Indicates that the simulation clock advanced by one tick.
    TimeAdvanced {
        /// Index of the tick that was just applied, starting at one.
        tick: u64,
    },
    /// Reports that a robot landed on a non-empty structural cell.
    ToneTriggered {
        /// Tick during which the robot landed.
        tick: u64,
        /// Grid containing the structural cell.
        grid: GridId,
        /// Landing cell and its musical attributes.
        trigger: Trigger,
    },
    /// Reports that two robots landed on the same cell and the later one won.
    RobotsCollided {
        /// Grid where the collision happened.
        grid: GridId,
        /// Cell both robots landed on.
        cell: CellCoord,
    },
    /// Confirms that grids were replaced by loaded contents.
    GridsLoaded {
        /// Number of grids that were replaced.
        count: usize,
    },
    /// Reports that a load or frame restore was rejected without touching any grid.
    RestoreRejected {
        /// Specific reason the restore failed.
        reason: RestoreError,
    },
    /// Requests that adapters redraw a grid after its layers were overwritten.
    RedrawRequested {
        /// Grid whose contents changed outside of a tick.
        grid: GridId,
    },
}

/// Location of a single grid cell expressed as row and column indices.
///
/// Ordering is row-major, which is the order the motion engine visits robots in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    row: u32,
    column: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }
}

/// Dimensions of a toroidal grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    rows: u32,
    columns: u32,
}

impl GridSize {
    /// Creates a new size descriptor with explicit dimensions.
    #[must_use]
    pub const fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of columns in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Reports whether either axis is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns == 0
    }

    /// Total number of cells contained in the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        let count = u64::from(self.rows) * u64::from(self.columns);
        usize::try_from(count).unwrap_or(0)
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.row < self.rows && cell.column < self.columns
    }

    /// Dense row-major index of the cell, if it lies inside the grid.
    #[must_use]
    pub fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row).ok()?;
        let column = usize::try_from(cell.column).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }

    /// Iterates over every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> {
        let columns = self.columns;
        (0..self.rows).flat_map(move |row| (0..columns).map(move |column| CellCoord::new(row, column)))
    }

    /// Returns the neighbour one step away in `direction`, wrapping at every edge.
    #[must_use]
    pub fn step(&self, cell: CellCoord, direction: Direction) -> CellCoord {
        let (row_delta, column_delta) = direction.delta();
        CellCoord::new(
            wrap(cell.row, row_delta, self.rows),
            wrap(cell.column, column_delta, self.columns),
        )
    }
}

fn wrap(value: u32, delta: i32, bound: u32) -> u32 {
    if bound == 0 {
        return 0;
    }
    let shifted = i64::from(value) + i64::from(delta);
    let wrapped = shifted.rem_euclid(i64::from(bound));
    u32::try_from(wrapped).unwrap_or(0)
}

/// Cardinal movement directions available to robots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Movement toward decreasing row indices.
    North,
    /// Movement toward increasing column indices.
    #[default]
    East,
    /// Movement toward increasing row indices.
    South,
    /// Movement toward decreasing column indices.
    West,
}

impl Direction {
    /// Unit step expressed as `(row_delta, column_delta)`.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (-1, 0),
            Self::East => (0, 1),
            Self::South => (1, 0),
            Self::West => (0, -1),
        }
    }

    /// Recovers a direction from a unit step, rejecting anything else.
    #[must_use]
    pub const fn from_delta(row_delta: i32, column_delta: i32) -> Option<Self> {
        match (row_delta, column_delta) {
            (-1, 0) => Some(Self::North),
            (0, 1) => Some(Self::East),
            (1, 0) => Some(Self::South),
            (0, -1) => Some(Self::West),
            _ => None,
        }
    }
}

/// Axis mirrored by a reflector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Vertical mirror: flips the horizontal component of a heading.
    Vertical,
    /// Horizontal mirror: flips the vertical component of a heading.
    Horizontal,
}

/// Turning sense of a rotator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    /// Maps `(dy, dx)` to `(-dx, dy)`.
    Clockwise,
    /// Maps `(dy, dx)` to `(dx, -dy)`.
    Counterclockwise,
}

/// Sound source carried by an emitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    /// Pitched bell tone.
    Tone,
    /// Unpitched noise burst.
    Noise,
    /// Vocal sample.
    Vocal,
}

/// Static occupant of the structural layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Structure {
    /// Mirrors headings along an axis.
    Reflector(Axis),
    /// Turns headings by a quarter.
    Rotator(Rotation),
    /// Leaves headings untouched; exists to be landed on.
    Emitter(Voice),
}

impl Structure {
    /// Heading a robot takes after probing a cell holding this structure.
    #[must_use]
    pub fn redirect(self, heading: Direction) -> Direction {
        let (dy, dx) = heading.delta();
        let (row_delta, column_delta) = match self {
            Self::Reflector(Axis::Vertical) => (dy, -dx),
            Self::Reflector(Axis::Horizontal) => (-dy, dx),
            Self::Rotator(Rotation::Clockwise) => (-dx, dy),
            Self::Rotator(Rotation::Counterclockwise) => (dx, -dy),
            Self::Emitter(_) => (dy, dx),
        };
        Direction::from_delta(row_delta, column_delta).unwrap_or(heading)
    }
}

/// Every kind of occupant a cell may be tagged with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Nothing occupies the cell.
    #[default]
    Empty,
    /// A mobile robot on the dynamic layer.
    Robot,
    /// A static structure on the structural layer.
    Structure(Structure),
}

impl AgentKind {
    /// Stable integer tag used by recordings.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Structure(Structure::Reflector(Axis::Vertical)) => 1,
            Self::Structure(Structure::Reflector(Axis::Horizontal)) => 2,
            Self::Robot => 3,
            Self::Structure(Structure::Rotator(Rotation::Clockwise)) => 4,
            Self::Structure(Structure::Rotator(Rotation::Counterclockwise)) => 6,
            Self::Structure(Structure::Emitter(Voice::Tone)) => 10,
            Self::Structure(Structure::Emitter(Voice::Noise)) => 11,
            Self::Structure(Structure::Emitter(Voice::Vocal)) => 12,
        }
    }

    /// Decodes an integer tag produced by [`AgentKind::tag`].
    pub const fn from_tag(tag: u8) -> Result<Self, UnknownAgentTag> {
        let kind = match tag {
            0 => Self::Empty,
            1 => Self::Structure(Structure::Reflector(Axis::Vertical)),
            2 => Self::Structure(Structure::Reflector(Axis::Horizontal)),
            3 => Self::Robot,
            4 => Self::Structure(Structure::Rotator(Rotation::Clockwise)),
            6 => Self::Structure(Structure::Rotator(Rotation::Counterclockwise)),
            10 => Self::Structure(Structure::Emitter(Voice::Tone)),
            11 => Self::Structure(Structure::Emitter(Voice::Noise)),
            12 => Self::Structure(Structure::Emitter(Voice::Vocal)),
            other => return Err(UnknownAgentTag(other)),
        };
        Ok(kind)
    }

    /// Structure carried by the kind, if it belongs on the structural layer.
    #[must_use]
    pub const fn structure(self) -> Option<Structure> {
        match self {
            Self::Structure(structure) => Some(structure),
            Self::Empty | Self::Robot => None,
        }
    }
}

impl From<Option<Structure>> for AgentKind {
    fn from(value: Option<Structure>) -> Self {
        value.map_or(Self::Empty, Self::Structure)
    }
}

/// Raised when a recording carries an integer tag outside the agent table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownAgentTag(pub u8);

impl fmt::Display for UnknownAgentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent tag {} is not recognised", self.0)
    }
}

impl Error for UnknownAgentTag {}

/// Per-robot movement bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Motion {
    /// Heading the robot travels in.
    pub direction: Direction,
    /// Ticks required per grid step; one moves every tick.
    pub speed: u32,
    /// Ticks elapsed since the last step, in `0..speed`.
    pub phase: u32,
}

impl Motion {
    /// Creates motion for a freshly placed robot.
    #[must_use]
    pub const fn new(direction: Direction, speed: u32) -> Self {
        Self {
            direction,
            speed,
            phase: 0,
        }
    }
}

impl Default for Motion {
    fn default() -> Self {
        Self::new(Direction::East, 1)
    }
}

/// Musical parameters of a single sounding event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    /// Frequency in hertz.
    pub pitch: f64,
    /// Length in seconds.
    pub duration: f64,
    /// Loudness in `0..=127`.
    pub velocity: u8,
}

impl Tone {
    /// Creates a tone, clamping velocity into the MIDI range.
    #[must_use]
    pub fn new(pitch: f64, duration: f64, velocity: u8) -> Self {
        Self {
            pitch,
            duration,
            velocity: velocity.min(MAX_VELOCITY),
        }
    }
}

impl Default for Tone {
    fn default() -> Self {
        Self::new(DEFAULT_PITCH, DEFAULT_DURATION, DEFAULT_VELOCITY)
    }
}

/// Musical identity of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellAttributes {
    /// Kind of agent the attributes were recorded for.
    pub agent_type: AgentKind,
    /// Frequency in hertz.
    pub pitch: f64,
    /// Length in seconds.
    pub duration: f64,
    /// Loudness in `0..=127`.
    pub velocity: u8,
}

impl CellAttributes {
    /// Attributes describing `agent_type` sounding `tone`.
    #[must_use]
    pub const fn new(agent_type: AgentKind, tone: Tone) -> Self {
        Self {
            agent_type,
            pitch: tone.pitch,
            duration: tone.duration,
            velocity: tone.velocity,
        }
    }

    /// Null tone written when a cell is explicitly emptied.
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            agent_type: AgentKind::Empty,
            pitch: 0.0,
            duration: 0.0,
            velocity: DEFAULT_VELOCITY,
        }
    }

    /// Tone sounded when a robot lands on the cell.
    #[must_use]
    pub const fn tone(&self) -> Tone {
        Tone {
            pitch: self.pitch,
            duration: self.duration,
            velocity: self.velocity,
        }
    }
}

impl Default for CellAttributes {
    fn default() -> Self {
        Self::new(AgentKind::Empty, Tone::default())
    }
}

/// Agent requested by a placement command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Placement {
    /// Clears the cell on both layers.
    Empty,
    /// Places a robot on the dynamic layer.
    Robot {
        /// Initial heading.
        direction: Direction,
        /// Ticks per step, in `1..=MAX_ROBOT_SPEED`.
        speed: u32,
    },
    /// Places a structure on the structural layer.
    Structure {
        /// Structure to place.
        structure: Structure,
        /// Tone sounded when a robot lands on the structure.
        tone: Tone,
    },
}

impl Placement {
    /// Places an eastbound robot with the provided speed.
    #[must_use]
    pub const fn robot(speed: u32) -> Self {
        Self::Robot {
            direction: Direction::East,
            speed,
        }
    }

    /// Places a structure sounding the default tone.
    #[must_use]
    pub fn structure(structure: Structure) -> Self {
        Self::Structure {
            structure,
            tone: Tone::default(),
        }
    }

    /// Kind of agent the placement writes.
    #[must_use]
    pub const fn kind(&self) -> AgentKind {
        match self {
            Self::Empty => AgentKind::Empty,
            Self::Robot { .. } => AgentKind::Robot,
            Self::Structure { structure, .. } => AgentKind::Structure(*structure),
        }
    }
}

/// Notification that a robot landed on a non-empty structural cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trigger {
    /// Cell the robot landed on.
    pub cell: CellCoord,
    /// Attributes of that cell at the time of landing.
    pub attributes: CellAttributes,
}

/// Dense identifier of a grid within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridId(u32);

impl GridId {
    /// Creates a new grid identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Position of the grid within the session's grid list.
    #[must_use]
    pub fn index(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

/// Simulation tempo expressed in beats per minute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tempo(u32);

impl Tempo {
    /// Creates a tempo, rejecting values outside `MIN_TEMPO_BPM..=MAX_TEMPO_BPM`.
    #[must_use]
    pub const fn new(bpm: u32) -> Option<Self> {
        if bpm < MIN_TEMPO_BPM || bpm > MAX_TEMPO_BPM {
            None
        } else {
            Some(Self(bpm))
        }
    }

    /// Beats per minute.
    #[must_use]
    pub const fn bpm(&self) -> u32 {
        self.0
    }

    /// Wall-clock time between simulation ticks: `60 / 4 / bpm` seconds.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        let ticks_per_minute = f64::from(self.0) * f64::from(TICKS_PER_BEAT);
        Duration::from_secs_f64(60.0 / ticks_per_minute)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(DEFAULT_TEMPO_BPM)
    }
}

/// Descriptive data stored alongside each grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMetadata {
    /// Human readable label.
    pub label: String,
    /// Tempo the grid was last driven at.
    pub tempo: Tempo,
}

/// Complete grid contents delivered by a load.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedGrid {
    /// Label and tempo to install.
    pub metadata: GridMetadata,
    /// Layers, motion records and attributes to install.
    pub state: GridState,
}

/// Reasons a grid level command may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridError {
    /// Grids need at least one row and one column.
    ZeroSize,
    /// No grid with the provided identifier exists.
    UnknownGrid(GridId),
}

/// Reasons a placement request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementError {
    /// No grid with the provided identifier exists.
    UnknownGrid,
    /// The requested cell lies beyond the grid bounds.
    OutOfBounds,
    /// Robot speed was zero or exceeded [`MAX_ROBOT_SPEED`].
    InvalidSpeed,
}

/// Reasons a load or frame restore may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestoreError {
    /// The source describes a different number of grids than the session holds.
    GridCountMismatch {
        /// Number of live grids.
        expected: usize,
        /// Number of grids in the source.
        found: usize,
    },
    /// A grid in the source has different dimensions than its live counterpart.
    SizeMismatch {
        /// Grid whose dimensions differ.
        grid: GridId,
        /// Dimensions of the live grid.
        expected: GridSize,
        /// Dimensions found in the source.
        found: GridSize,
    },
    /// No grid with the provided identifier exists.
    UnknownGrid(GridId),
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GridCountMismatch { expected, found } => {
                write!(f, "session holds {expected} grids but the source has {found}")
            }
            Self::SizeMismatch {
                grid,
                expected,
                found,
            } => write!(
                f,
                "grid {} is {}x{} but the source is {}x{}",
                grid.get(),
                expected.rows(),
                expected.columns(),
                found.rows(),
                found.columns()
            ),
            Self::UnknownGrid(grid) => write!(f, "grid {} does not exist", grid.get()),
        }
    }
}

impl Error for RestoreError {}

#[cfg(test)]
mod tests {
    use super::{
        AgentKind, Axis, CellCoord, Direction, GridSize, Motion, Rotation, Structure, Tempo,
        UnknownAgentTag, Voice,
    };
    use serde::{de::DeserializeOwned, Serialize};
    use std::time::Duration;

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn motion_round_trips_through_bincode() {
        assert_round_trip(&Motion {
            direction: Direction::South,
            speed: 4,
            phase: 2,
        });
    }

    #[test]
    fn agent_kind_round_trips_through_bincode() {
        assert_round_trip(&AgentKind::Structure(Structure::Rotator(
            Rotation::Counterclockwise,
        )));
    }

    #[test]
    fn every_tag_decodes_to_the_kind_that_produced_it() {
        let kinds = [
            AgentKind::Empty,
            AgentKind::Robot,
            AgentKind::Structure(Structure::Reflector(Axis::Vertical)),
            AgentKind::Structure(Structure::Reflector(Axis::Horizontal)),
            AgentKind::Structure(Structure::Rotator(Rotation::Clockwise)),
            AgentKind::Structure(Structure::Rotator(Rotation::Counterclockwise)),
            AgentKind::Structure(Structure::Emitter(Voice::Tone)),
            AgentKind::Structure(Structure::Emitter(Voice::Noise)),
            AgentKind::Structure(Structure::Emitter(Voice::Vocal)),
        ];
        for kind in kinds {
            assert_eq!(AgentKind::from_tag(kind.tag()), Ok(kind));
        }
    }

    #[test]
    fn unknown_tags_are_reported() {
        assert_eq!(AgentKind::from_tag(5), Err(UnknownAgentTag(5)));
        assert_eq!(AgentKind::from_tag(200), Err(UnknownAgentTag(200)));
    }

    #[test]
    fn step_wraps_on_both_axes() {
        let size = GridSize::new(3, 4);
        assert_eq!(
            size.step(CellCoord::new(0, 0), Direction::North),
            CellCoord::new(2, 0)
        );
        assert_eq!(
            size.step(CellCoord::new(0, 0), Direction::West),
            CellCoord::new(0, 3)
        );
        assert_eq!(
            size.step(CellCoord::new(2, 3), Direction::South),
            CellCoord::new(0, 3)
        );
        assert_eq!(
            size.step(CellCoord::new(2, 3), Direction::East),
            CellCoord::new(2, 0)
        );
    }

    #[test]
    fn cells_iterate_in_row_major_order() {
        let cells: Vec<CellCoord> = GridSize::new(2, 2).cells().collect();
        assert_eq!(
            cells,
            vec![
                CellCoord::new(0, 0),
                CellCoord::new(0, 1),
                CellCoord::new(1, 0),
                CellCoord::new(1, 1),
            ]
        );
        let mut sorted = cells.clone();
        sorted.sort();
        assert_eq!(cells, sorted);
    }

    #[test]
    fn clockwise_rotator_turns_east_into_north() {
        let rotator = Structure::Rotator(Rotation::Clockwise);
        assert_eq!(rotator.redirect(Direction::East), Direction::North);
        assert_eq!(rotator.redirect(Direction::North), Direction::West);
    }

    #[test]
    fn rotators_invert_each_other() {
        let clockwise = Structure::Rotator(Rotation::Clockwise);
        let counterclockwise = Structure::Rotator(Rotation::Counterclockwise);
        for heading in [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ] {
            assert_eq!(counterclockwise.redirect(clockwise.redirect(heading)), heading);
        }
    }

    #[test]
    fn reflectors_flip_a_single_component() {
        let vertical = Structure::Reflector(Axis::Vertical);
        let horizontal = Structure::Reflector(Axis::Horizontal);
        assert_eq!(vertical.redirect(Direction::East), Direction::West);
        assert_eq!(vertical.redirect(Direction::North), Direction::North);
        assert_eq!(horizontal.redirect(Direction::South), Direction::North);
        assert_eq!(horizontal.redirect(Direction::West), Direction::West);
    }

    #[test]
    fn emitters_leave_headings_untouched() {
        let emitter = Structure::Emitter(Voice::Tone);
        assert_eq!(emitter.redirect(Direction::West), Direction::West);
    }

    #[test]
    fn tempo_converts_to_sixteenth_note_interval() {
        let tempo = Tempo::new(120).expect("valid tempo");
        assert_eq!(tempo.tick_interval(), Duration::from_millis(125));
        assert!(Tempo::new(0).is_none());
        assert!(Tempo::new(301).is_none());
    }
}

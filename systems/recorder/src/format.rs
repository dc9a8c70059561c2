//! On-disk session document.
//!
//! Per-position maps are keyed by `"row_col"` strings and directions are stored
//! as `[row_delta, column_delta]` pairs, so a document does not depend on how
//! the engine names its types. Every map entry and attribute field is optional
//! on load and falls back to the documented defaults.

use std::collections::BTreeMap;

use carillon_core::{
    AgentKind, CellAttributes, CellCoord, Direction, Event, GridLayers, GridMetadata, GridSize,
    GridState, LoadedGrid, Motion, RobotLayer, Tempo, Tone, DEFAULT_DURATION, DEFAULT_PITCH,
    DEFAULT_TEMPO_BPM, DEFAULT_VELOCITY,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Layer contents as rows of integer agent tags.
pub type TagMatrix = Vec<Vec<u8>>;

/// Structural problems found while decoding a document.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    /// A layer has no rows or no columns.
    #[error("layer has no cells")]
    EmptyLayer,
    /// A layer has more rows or columns than a grid can address.
    #[error("layer is too large")]
    Oversized,
    /// A row of the static layer has a different length than the first row.
    #[error("static layer row {row} has a different length than row 0")]
    RaggedLayer {
        /// Offending row.
        row: usize,
    },
    /// The dynamic layer does not have the shape of the static layer.
    #[error("dynamic layer does not match the static layer's shape")]
    ShapeMismatch,
    /// A layer carries a tag outside the agent table.
    #[error("unknown agent tag {tag} at {row}_{column}")]
    UnknownTag {
        /// Row of the offending cell.
        row: u32,
        /// Column of the offending cell.
        column: u32,
        /// Tag that was found.
        tag: u8,
    },
    /// The static layer carries the robot tag.
    #[error("robot tag in the static layer at {row}_{column}")]
    RobotInStaticLayer {
        /// Row of the offending cell.
        row: u32,
        /// Column of the offending cell.
        column: u32,
    },
    /// The dynamic layer carries a structure tag.
    #[error("structure tag {tag} in the dynamic layer at {row}_{column}")]
    StructureInDynamicLayer {
        /// Row of the offending cell.
        row: u32,
        /// Column of the offending cell.
        column: u32,
        /// Tag that was found.
        tag: u8,
    },
    /// A map key is not of the form `row_col`.
    #[error("malformed cell key {0:?}")]
    MalformedKey(String),
    /// A motion entry refers to a cell without a robot.
    #[error("motion entry {0:?} has no robot in the dynamic layer")]
    OrphanMotion(String),
    /// A direction is not one of the four unit steps.
    #[error("direction {vector:?} at {key:?} is not a unit step")]
    InvalidDirection {
        /// Key of the robot.
        key: String,
        /// Vector that was found.
        vector: [i32; 2],
    },
    /// A robot has speed zero.
    #[error("robot at {0:?} has speed 0")]
    ZeroSpeed(String),
    /// A robot's counter is not below its speed.
    #[error("robot at {key:?} has counter {phase} but speed {speed}")]
    PhaseOutOfRange {
        /// Key of the robot.
        key: String,
        /// Counter that was found.
        phase: u32,
        /// Speed of the robot.
        speed: u32,
    },
    /// An attribute entry refers to a cell outside the grid.
    #[error("attribute entry {0:?} lies outside the grid")]
    AttributeOutOfBounds(String),
    /// An attribute entry carries a tag outside the agent table.
    #[error("attribute entry {key:?} has unknown agent tag {tag}")]
    UnknownAttributeTag {
        /// Key of the entry.
        key: String,
        /// Tag that was found.
        tag: u8,
    },
    /// A grid tempo lies outside the accepted range.
    #[error("tempo {0} is outside the accepted range")]
    InvalidTempo(u32),
}

/// A complete recorded session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// State of every grid when recording stopped. Empty in frames-only documents.
    #[serde(default)]
    pub grids: Vec<GridRecord>,
    /// Per-tick snapshots in tick order.
    #[serde(default)]
    pub frames: Vec<FrameRecord>,
    /// Tones triggered while recording, in tick order.
    #[serde(default)]
    pub audio_events: Vec<AudioEventRecord>,
}

impl Recording {
    /// Decodes the grid headers into loadable grids.
    pub fn restore_grids(&self) -> Result<Vec<LoadedGrid>, FormatError> {
        self.grids.iter().map(GridRecord::restore).collect()
    }

    /// Dimensions of each recorded grid, taken from the first frame when the
    /// document carries no grid headers.
    pub fn grid_sizes(&self) -> Result<Vec<GridSize>, FormatError> {
        if !self.grids.is_empty() {
            return self.grids.iter().map(|grid| grid.layers.size()).collect();
        }
        self.frames
            .first()
            .map_or(Ok(Vec::new()), |frame| frame.grids.iter().map(LayerRecord::size).collect())
    }

    /// Decodes every frame into per-grid layers.
    pub fn restore_frames(&self) -> Result<Vec<Vec<GridLayers>>, FormatError> {
        self.frames.iter().map(FrameRecord::restore).collect()
    }
}

/// Everything needed to rebuild one grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    /// Human readable label.
    #[serde(default = "default_label")]
    pub label: String,
    /// Tempo in beats per minute.
    #[serde(default = "default_tempo")]
    pub tempo: u32,
    /// Layers and motion maps.
    #[serde(flatten)]
    pub layers: LayerRecord,
    /// Cells whose attributes differ from the defaults.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeRecord>,
}

impl GridRecord {
    /// Captures a grid and its metadata.
    #[must_use]
    pub fn capture(metadata: &GridMetadata, state: &GridState) -> Self {
        let defaults = CellAttributes::default();
        let attributes = state
            .size()
            .cells()
            .filter_map(|cell| {
                let attributes = state.attributes(cell);
                (attributes != defaults).then(|| (cell_key(cell), AttributeRecord::from(attributes)))
            })
            .collect();

        Self {
            label: metadata.label.clone(),
            tempo: metadata.tempo.bpm(),
            layers: LayerRecord::capture(state.layers()),
            attributes,
        }
    }

    /// Decodes the record into a loadable grid.
    pub fn restore(&self) -> Result<LoadedGrid, FormatError> {
        let layers = self.layers.restore()?;
        let size = layers.size();
        let mut attributes = vec![CellAttributes::default(); size.cell_count()];
        for (key, record) in &self.attributes {
            let cell = parse_cell_key(key)?;
            let slot = size
                .index(cell)
                .and_then(|index| attributes.get_mut(index))
                .ok_or_else(|| FormatError::AttributeOutOfBounds(key.clone()))?;
            *slot = record.restore(key)?;
        }

        let tempo = Tempo::new(self.tempo).ok_or(FormatError::InvalidTempo(self.tempo))?;
        let state = GridState::from_parts(layers, attributes).ok_or(FormatError::ShapeMismatch)?;
        Ok(LoadedGrid {
            metadata: GridMetadata {
                label: self.label.clone(),
                tempo,
            },
            state,
        })
    }
}

/// Both layers of a grid plus the motion record of every robot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Structural layer.
    #[serde(rename = "static")]
    pub structures: TagMatrix,
    /// Dynamic layer.
    pub dynamic: TagMatrix,
    /// Heading of each robot as `[row_delta, column_delta]`.
    #[serde(default)]
    pub directions: BTreeMap<String, [i32; 2]>,
    /// Ticks per step of each robot.
    #[serde(default)]
    pub speeds: BTreeMap<String, u32>,
    /// Ticks elapsed since each robot last stepped.
    #[serde(default)]
    pub counters: BTreeMap<String, u32>,
}

impl LayerRecord {
    /// Captures a deep copy of both layers.
    #[must_use]
    pub fn capture(layers: &GridLayers) -> Self {
        let mut directions = BTreeMap::new();
        let mut speeds = BTreeMap::new();
        let mut counters = BTreeMap::new();
        for (cell, motion) in layers.robots().iter() {
            let key = cell_key(cell);
            let (row_delta, column_delta) = motion.direction.delta();
            let _ = directions.insert(key.clone(), [row_delta, column_delta]);
            let _ = speeds.insert(key.clone(), motion.speed);
            let _ = counters.insert(key, motion.phase);
        }

        Self {
            structures: layers.structure_tags(),
            dynamic: layers.robot_tags(),
            directions,
            speeds,
            counters,
        }
    }

    /// Dimensions implied by the layers, after checking both are rectangular and agree.
    pub fn size(&self) -> Result<GridSize, FormatError> {
        let columns = self.structures.first().map_or(0, Vec::len);
        if self.structures.is_empty() || columns == 0 {
            return Err(FormatError::EmptyLayer);
        }
        if let Some(row) = self.structures.iter().position(|row| row.len() != columns) {
            return Err(FormatError::RaggedLayer { row });
        }
        if self.dynamic.len() != self.structures.len()
            || self.dynamic.iter().any(|row| row.len() != columns)
        {
            return Err(FormatError::ShapeMismatch);
        }

        let rows = u32::try_from(self.structures.len()).map_err(|_| FormatError::Oversized)?;
        let columns = u32::try_from(columns).map_err(|_| FormatError::Oversized)?;
        Ok(GridSize::new(rows, columns))
    }

    /// Decodes the layers, validating every tag and motion entry.
    pub fn restore(&self) -> Result<GridLayers, FormatError> {
        let size = self.size()?;
        let mut structures = Vec::with_capacity(size.cell_count());
        let mut robots = RobotLayer::new(size);
        let tags = self
            .structures
            .iter()
            .flatten()
            .zip(self.dynamic.iter().flatten());

        for (cell, (&static_tag, &dynamic_tag)) in size.cells().zip(tags) {
            let (row, column) = (cell.row(), cell.column());
            match decode_tag(cell, static_tag)? {
                AgentKind::Empty => structures.push(None),
                AgentKind::Structure(structure) => structures.push(Some(structure)),
                AgentKind::Robot => return Err(FormatError::RobotInStaticLayer { row, column }),
            }
            match decode_tag(cell, dynamic_tag)? {
                AgentKind::Empty => {}
                AgentKind::Robot => {
                    let _ = robots.insert(cell, self.motion_at(cell)?);
                }
                AgentKind::Structure(_) => {
                    return Err(FormatError::StructureInDynamicLayer {
                        row,
                        column,
                        tag: dynamic_tag,
                    })
                }
            }
        }

        let keys = self
            .directions
            .keys()
            .chain(self.speeds.keys())
            .chain(self.counters.keys());
        for key in keys {
            if robots.get(parse_cell_key(key)?).is_none() {
                return Err(FormatError::OrphanMotion(key.clone()));
            }
        }

        GridLayers::from_parts(structures, robots).ok_or(FormatError::ShapeMismatch)
    }

    fn motion_at(&self, cell: CellCoord) -> Result<Motion, FormatError> {
        let key = cell_key(cell);
        let direction = match self.directions.get(&key) {
            Some(&[row_delta, column_delta]) => Direction::from_delta(row_delta, column_delta)
                .ok_or_else(|| FormatError::InvalidDirection {
                    key: key.clone(),
                    vector: [row_delta, column_delta],
                })?,
            None => Direction::East,
        };
        let speed = self.speeds.get(&key).copied().unwrap_or(1);
        if speed == 0 {
            return Err(FormatError::ZeroSpeed(key));
        }
        let phase = self.counters.get(&key).copied().unwrap_or(0);
        if phase >= speed {
            return Err(FormatError::PhaseOutOfRange { key, phase, speed });
        }

        Ok(Motion {
            direction,
            speed,
            phase,
        })
    }
}

fn decode_tag(cell: CellCoord, tag: u8) -> Result<AgentKind, FormatError> {
    AgentKind::from_tag(tag).map_err(|_| FormatError::UnknownTag {
        row: cell.row(),
        column: cell.column(),
        tag,
    })
}

/// Musical identity of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    /// Agent tag the attributes were recorded for.
    #[serde(default)]
    pub agent_type: u8,
    /// Frequency in hertz.
    #[serde(default = "default_pitch")]
    pub pitch: f64,
    /// Length in seconds.
    #[serde(default = "default_duration")]
    pub duration: f64,
    /// Loudness in `0..=127`.
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

impl AttributeRecord {
    fn restore(&self, key: &str) -> Result<CellAttributes, FormatError> {
        let agent_type =
            AgentKind::from_tag(self.agent_type).map_err(|_| FormatError::UnknownAttributeTag {
                key: key.to_owned(),
                tag: self.agent_type,
            })?;
        Ok(CellAttributes::new(
            agent_type,
            Tone::new(self.pitch, self.duration, self.velocity),
        ))
    }
}

impl Default for AttributeRecord {
    fn default() -> Self {
        Self::from(CellAttributes::default())
    }
}

impl From<CellAttributes> for AttributeRecord {
    fn from(attributes: CellAttributes) -> Self {
        Self {
            agent_type: attributes.agent_type.tag(),
            pitch: attributes.pitch,
            duration: attributes.duration,
            velocity: attributes.velocity,
        }
    }
}

/// Snapshot of every grid's layers at one tick.
///
/// Frames written by single-grid tools are a bare layer object; those load as
/// a frame holding one grid.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameRecord {
    /// Tick after which the snapshot was taken.
    pub tick: u64,
    /// One entry per grid, in grid order.
    pub grids: Vec<LayerRecord>,
}

impl FrameRecord {
    pub(crate) fn restore(&self) -> Result<Vec<GridLayers>, FormatError> {
        self.grids.iter().map(LayerRecord::restore).collect()
    }
}

impl<'de> Deserialize<'de> for FrameRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct MultiGrid {
            #[serde(default)]
            tick: u64,
            grids: Vec<LayerRecord>,
        }

        let value = Value::deserialize(deserializer)?;
        if has_any_key(&value, &["grids"]) {
            let MultiGrid { tick, grids } =
                MultiGrid::deserialize(value).map_err(de::Error::custom)?;
            return Ok(Self { tick, grids });
        }
        let tick = value.get("tick").and_then(Value::as_u64).unwrap_or_default();
        let layer = LayerRecord::deserialize(value).map_err(de::Error::custom)?;
        Ok(Self {
            tick,
            grids: vec![layer],
        })
    }
}

/// A tone that sounded while recording.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioEventRecord {
    /// Tick during which the tone triggered.
    pub tick: u64,
    /// Grid containing the sounding cell.
    pub grid: u32,
    /// Row of the sounding cell.
    pub row: u32,
    /// Column of the sounding cell.
    pub column: u32,
    /// Frequency in hertz.
    pub pitch: f64,
    /// Length in seconds.
    pub duration: f64,
    /// Loudness in `0..=127`.
    pub velocity: u8,
}

impl AudioEventRecord {
    /// Converts a trigger event, ignoring every other event.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        let Event::ToneTriggered {
            tick,
            grid,
            trigger,
        } = event
        else {
            return None;
        };
        Some(Self {
            tick: *tick,
            grid: grid.get(),
            row: trigger.cell.row(),
            column: trigger.cell.column(),
            pitch: trigger.attributes.pitch,
            duration: trigger.attributes.duration,
            velocity: trigger.attributes.velocity,
        })
    }
}

/// Any document accepted by the loader.
///
/// An object with a `grids`, `frames` or `audio_events` key is a session;
/// anything else is read as a bare grid.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Document {
    /// Multi-grid session with frames and audio events.
    Session(Recording),
    /// A single grid object at the top level.
    Grid(GridRecord),
}

impl Document {
    /// Parses a JSON document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if has_any_key(&value, &["grids", "frames", "audio_events"]) {
            Recording::deserialize(value)
                .map(Self::Session)
                .map_err(de::Error::custom)
        } else {
            GridRecord::deserialize(value)
                .map(Self::Grid)
                .map_err(de::Error::custom)
        }
    }
}

fn has_any_key(value: &Value, keys: &[&str]) -> bool {
    value
        .as_object()
        .is_some_and(|object| keys.iter().any(|key| object.contains_key(*key)))
}

/// Encodes a cell as a `row_col` map key.
#[must_use]
pub fn cell_key(cell: CellCoord) -> String {
    format!("{}_{}", cell.row(), cell.column())
}

/// Decodes a `row_col` map key.
pub fn parse_cell_key(key: &str) -> Result<CellCoord, FormatError> {
    let malformed = || FormatError::MalformedKey(key.to_owned());
    let (row, column) = key.split_once('_').ok_or_else(malformed)?;
    let row = row.parse().map_err(|_| malformed())?;
    let column = column.parse().map_err(|_| malformed())?;
    Ok(CellCoord::new(row, column))
}

fn default_label() -> String {
    "grid".to_owned()
}

const fn default_tempo() -> u32 {
    DEFAULT_TEMPO_BPM
}

const fn default_pitch() -> f64 {
    DEFAULT_PITCH
}

const fn default_duration() -> f64 {
    DEFAULT_DURATION
}

const fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

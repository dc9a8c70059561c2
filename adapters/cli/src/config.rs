//! Session files describing grids, placements and tempo in TOML.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use carillon_core::{
    Axis, CellCoord, Command, Direction, Event, GridId, GridSize, Placement, Rotation, Structure,
    Tempo, Tone, Voice, DEFAULT_DURATION, DEFAULT_PITCH, DEFAULT_TEMPO_BPM, DEFAULT_VELOCITY,
    MAX_ROBOT_SPEED, MAX_TEMPO_BPM, MAX_VELOCITY, MIN_TEMPO_BPM,
};
use carillon_world::{self as world, Session};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Rows and columns of a grid that omits its dimensions.
pub(crate) const DEFAULT_GRID_EDGE: u32 = 20;

/// Top level of a session file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct SessionConfig {
    /// Beats per minute shared by every grid.
    pub(crate) tempo: u32,
    /// Stereo position handed to the tone dispatcher with every tone.
    pub(crate) pan: [f32; 2],
    /// Grids in session order.
    pub(crate) grids: Vec<GridConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO_BPM,
            pan: [1.0, 1.0],
            grids: vec![GridConfig::default()],
        }
    }
}

/// One grid and the agents placed on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct GridConfig {
    pub(crate) label: String,
    pub(crate) rows: u32,
    pub(crate) columns: u32,
    pub(crate) placements: Vec<PlacementConfig>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            label: "main".to_owned(),
            rows: DEFAULT_GRID_EDGE,
            columns: DEFAULT_GRID_EDGE,
            placements: Vec::new(),
        }
    }
}

/// Agent written into a single cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PlacementConfig {
    pub(crate) row: u32,
    pub(crate) column: u32,
    pub(crate) kind: PlacementKind,
    /// Ticks per step; robots only.
    pub(crate) speed: u32,
    /// Initial heading; robots only.
    pub(crate) direction: Heading,
    pub(crate) pitch: f64,
    pub(crate) duration: f64,
    /// Clamped to the MIDI range when the placement is applied.
    pub(crate) velocity: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            row: 0,
            column: 0,
            kind: PlacementKind::Robot,
            speed: 1,
            direction: Heading::East,
            pitch: DEFAULT_PITCH,
            duration: DEFAULT_DURATION,
            velocity: u32::from(DEFAULT_VELOCITY),
        }
    }
}

/// Agent kinds accepted in session files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum PlacementKind {
    #[default]
    Robot,
    VerticalReflector,
    HorizontalReflector,
    ClockwiseRotator,
    CounterclockwiseRotator,
    ToneEmitter,
    NoiseEmitter,
    VocalEmitter,
    Empty,
}

impl PlacementKind {
    const fn structure(self) -> Option<Structure> {
        match self {
            Self::Robot | Self::Empty => None,
            Self::VerticalReflector => Some(Structure::Reflector(Axis::Vertical)),
            Self::HorizontalReflector => Some(Structure::Reflector(Axis::Horizontal)),
            Self::ClockwiseRotator => Some(Structure::Rotator(Rotation::Clockwise)),
            Self::CounterclockwiseRotator => Some(Structure::Rotator(Rotation::Counterclockwise)),
            Self::ToneEmitter => Some(Structure::Emitter(Voice::Tone)),
            Self::NoiseEmitter => Some(Structure::Emitter(Voice::Noise)),
            Self::VocalEmitter => Some(Structure::Emitter(Voice::Vocal)),
        }
    }
}

/// Robot headings as written in session files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Heading {
    North,
    #[default]
    East,
    South,
    West,
}

impl From<Heading> for Direction {
    fn from(heading: Heading) -> Self {
        match heading {
            Heading::North => Self::North,
            Heading::East => Self::East,
            Heading::South => Self::South,
            Heading::West => Self::West,
        }
    }
}

impl SessionConfig {
    /// Parses and validates a session file's contents.
    pub(crate) fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("session file is not valid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the session as TOML.
    pub(crate) fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialise session")
    }

    /// Checks every value before anything reaches the world.
    pub(crate) fn validate(&self) -> Result<()> {
        if Tempo::new(self.tempo).is_none() {
            bail!(
                "tempo must be between {MIN_TEMPO_BPM} and {MAX_TEMPO_BPM} bpm, got {}",
                self.tempo
            );
        }
        if !self.pan.iter().all(|component| component.is_finite()) {
            bail!("pan must be finite, got {:?}", self.pan);
        }
        if self.grids.is_empty() {
            bail!("a session needs at least one grid");
        }
        for (index, grid) in self.grids.iter().enumerate() {
            grid.validate()
                .with_context(|| format!("grid {index} ({})", grid.label))?;
        }
        Ok(())
    }

    pub(crate) fn tempo(&self) -> Tempo {
        Tempo::new(self.tempo).unwrap_or_default()
    }

    pub(crate) fn pan(&self) -> Vec2 {
        Vec2::from_array(self.pan)
    }

    /// Commands that build the session from an empty one.
    pub(crate) fn commands(&self) -> Vec<Command> {
        let mut commands = vec![Command::SetTempo {
            tempo: self.tempo(),
        }];
        for (index, grid) in self.grids.iter().enumerate() {
            let id = GridId::new(u32::try_from(index).unwrap_or(u32::MAX));
            commands.push(Command::AddGrid {
                label: grid.label.clone(),
                size: grid.size(),
            });
            commands.extend(grid.placements.iter().map(|placement| Command::PlaceAgent {
                grid: id,
                cell: placement.cell(),
                placement: placement.placement(),
            }));
        }
        commands
    }

    /// Builds a live session, failing on the first rejected command.
    pub(crate) fn build_session(&self) -> Result<Session> {
        let mut session = Session::new(self.tempo());
        let mut events = Vec::new();
        for command in self.commands() {
            world::apply(&mut session, command, &mut events);
        }

        for event in &events {
            match event {
                Event::GridRejected { reason } => bail!("grid rejected: {reason:?}"),
                Event::PlacementRejected { grid, cell, reason } => bail!(
                    "placement at ({}, {}) on grid {} rejected: {reason:?}",
                    cell.row(),
                    cell.column(),
                    grid.get()
                ),
                _ => {}
            }
        }
        Ok(session)
    }
}

impl GridConfig {
    pub(crate) const fn size(&self) -> GridSize {
        GridSize::new(self.rows, self.columns)
    }

    fn validate(&self) -> Result<()> {
        let size = self.size();
        if size.is_empty() {
            bail!(
                "grid must have at least one row and one column, got {}x{}",
                self.rows,
                self.columns
            );
        }
        for (index, placement) in self.placements.iter().enumerate() {
            if !size.contains(placement.cell()) {
                bail!(
                    "placement {index} at ({}, {}) lies outside the {}x{} grid",
                    placement.row,
                    placement.column,
                    self.rows,
                    self.columns
                );
            }
            if placement.kind == PlacementKind::Robot
                && !(1..=MAX_ROBOT_SPEED).contains(&placement.speed)
            {
                bail!(
                    "placement {index} has speed {}; robots move every 1..={MAX_ROBOT_SPEED} ticks",
                    placement.speed
                );
            }
            if !placement.pitch.is_finite() || placement.pitch < 0.0 {
                bail!("placement {index} has pitch {}", placement.pitch);
            }
            if !placement.duration.is_finite() || placement.duration < 0.0 {
                bail!("placement {index} has duration {}", placement.duration);
            }
        }
        Ok(())
    }
}

impl PlacementConfig {
    pub(crate) const fn cell(&self) -> CellCoord {
        CellCoord::new(self.row, self.column)
    }

    fn tone(&self) -> Tone {
        let velocity = u8::try_from(self.velocity).unwrap_or(MAX_VELOCITY);
        Tone::new(self.pitch, self.duration, velocity)
    }

    /// Placement command payload for this entry.
    pub(crate) fn placement(&self) -> Placement {
        if self.kind == PlacementKind::Robot {
            return Placement::Robot {
                direction: self.direction.into(),
                speed: self.speed,
            };
        }
        match self.kind.structure() {
            Some(structure) => Placement::Structure {
                structure,
                tone: self.tone(),
            },
            None => Placement::Empty,
        }
    }
}

/// Reads and validates the session file at `path`.
pub(crate) fn load_config(path: &Path) -> Result<SessionConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    SessionConfig::from_toml(&text).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carillon_core::AgentKind;
    use carillon_world::query;

    const SAMPLE: &str = r#"
tempo = 90

[[grids]]
label = "lead"
rows = 4
columns = 6

[[grids.placements]]
row = 1
column = 0
kind = "robot"
speed = 2
direction = "south"

[[grids.placements]]
row = 2
column = 3
kind = "tone-emitter"
pitch = 523.25
velocity = 300

[[grids]]
label = "drums"
"#;

    #[test]
    fn missing_keys_take_defaults() {
        let config = SessionConfig::from_toml(SAMPLE).expect("valid config");
        assert_eq!(config.tempo, 90);
        assert_eq!(config.pan, [1.0, 1.0]);
        assert_eq!(config.grids.len(), 2);
        assert_eq!(config.grids[1].rows, DEFAULT_GRID_EDGE);
        assert_eq!(config.grids[1].columns, DEFAULT_GRID_EDGE);

        let emitter = &config.grids[0].placements[1];
        assert_eq!(emitter.duration, DEFAULT_DURATION);
        assert_eq!(emitter.direction, Heading::East);
    }

    #[test]
    fn empty_file_describes_a_default_session() {
        let config = SessionConfig::from_toml("").expect("defaults are valid");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn build_session_applies_every_placement() {
        let config = SessionConfig::from_toml(SAMPLE).expect("valid config");
        let session = config.build_session().expect("session builds");

        assert_eq!(query::grid_count(&session), 2);
        assert_eq!(query::tempo(&session).bpm(), 90);
        let state = query::grid_state(&session, GridId::new(0)).expect("grid");
        let robot = state.robots().get(CellCoord::new(1, 0)).expect("robot");
        assert_eq!(robot.direction, Direction::South);
        assert_eq!(robot.speed, 2);

        let attributes = state.attributes(CellCoord::new(2, 3));
        assert_eq!(
            attributes.agent_type,
            AgentKind::Structure(Structure::Emitter(Voice::Tone))
        );
        assert_eq!(attributes.pitch, 523.25);
        assert_eq!(attributes.velocity, MAX_VELOCITY);
    }

    #[test]
    fn validation_names_the_offending_grid() {
        let text = r#"
[[grids]]
label = "tiny"
rows = 2
columns = 2

[[grids.placements]]
row = 5
column = 0
"#;
        let err = SessionConfig::from_toml(text).expect_err("out of bounds");
        let message = format!("{err:#}");
        assert!(message.contains("grid 0 (tiny)"), "{message}");
        assert!(message.contains("outside the 2x2 grid"), "{message}");
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            "tempo = 0",
            "tempo = 301",
            "grids = []",
            "[[grids]]\nrows = 0",
            "[[grids]]\n[[grids.placements]]\nspeed = 11",
            "[[grids]]\n[[grids.placements]]\nkind = \"bell\"",
        ] {
            assert!(SessionConfig::from_toml(text).is_err(), "{text:?} was accepted");
        }
    }

    #[test]
    fn structures_ignore_robot_speed() {
        let text = "[[grids]]\n[[grids.placements]]\nkind = \"clockwise-rotator\"\nspeed = 0";
        let config = SessionConfig::from_toml(text).expect("speed is irrelevant");
        assert_eq!(
            config.grids[0].placements[0].placement().kind(),
            AgentKind::Structure(Structure::Rotator(Rotation::Clockwise))
        );
    }

    #[test]
    fn load_config_reads_from_disk_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.toml");
        let config = SessionConfig::from_toml(SAMPLE).expect("valid config");
        fs::write(&path, config.to_toml().expect("serialise")).expect("write");

        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, config);

        let missing = load_config(&dir.path().join("missing.toml")).expect_err("missing");
        assert!(format!("{missing:#}").contains("missing.toml"));
    }
}

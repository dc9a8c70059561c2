#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Shared rendering contracts for Carillon adapters.
//!
//! A [`GridPresentation`] is a backend-neutral picture of one grid built from
//! the session's read-only render state. Backends implement
//! [`RenderingBackend`]; [`TextBackend`] draws presentations as rows of
//! glyphs into any writer.

use std::{fmt, io::Write};

use anyhow::{Context, Result as AnyResult};
use carillon_core::{
    Axis, CellCoord, Direction, GridSize, RenderState, Rotation, Structure, Voice,
};

/// Glyph drawn for a cell with nothing on either layer.
pub const EMPTY_GLYPH: char = '.';

/// Glyph drawn for a structure.
#[must_use]
pub const fn structure_glyph(structure: Structure) -> char {
    match structure {
        Structure::Reflector(Axis::Vertical) => '|',
        Structure::Reflector(Axis::Horizontal) => '-',
        Structure::Rotator(Rotation::Clockwise) => 'r',
        Structure::Rotator(Rotation::Counterclockwise) => 'l',
        Structure::Emitter(Voice::Tone) => 'o',
        Structure::Emitter(Voice::Noise) => '#',
        Structure::Emitter(Voice::Vocal) => '%',
    }
}

/// Glyph drawn for a robot travelling in `direction`.
#[must_use]
pub const fn robot_glyph(direction: Direction) -> char {
    match direction {
        Direction::North => '^',
        Direction::East => '>',
        Direction::South => 'v',
        Direction::West => '<',
    }
}

/// Picture of one grid, one glyph per cell in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridPresentation {
    /// Grid label.
    pub label: String,
    /// Tempo the grid runs at, in beats per minute.
    pub tempo_bpm: u32,
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub columns: u32,
    /// Glyphs in row-major order.
    pub glyphs: Vec<char>,
}

impl GridPresentation {
    /// Builds a presentation from a render state.
    ///
    /// Robots are drawn over whatever structure lies below them.
    #[must_use]
    pub fn from_render_state(view: &RenderState<'_>) -> Self {
        let grid = view.grid();
        let size = grid.size();
        let glyphs = size
            .cells()
            .map(|cell| match grid.robots().get(cell) {
                Some(motion) => robot_glyph(motion.direction),
                None => grid.structure(cell).map_or(EMPTY_GLYPH, structure_glyph),
            })
            .collect();

        Self {
            label: view.label().to_owned(),
            tempo_bpm: view.tempo().bpm(),
            rows: size.rows(),
            columns: size.columns(),
            glyphs,
        }
    }

    /// Glyph drawn at `cell`, if it lies inside the grid.
    #[must_use]
    pub fn glyph(&self, cell: CellCoord) -> Option<char> {
        GridSize::new(self.rows, self.columns)
            .index(cell)
            .and_then(|index| self.glyphs.get(index).copied())
    }
}

impl fmt::Display for GridPresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} bpm)", self.label, self.tempo_bpm)?;
        let width = usize::try_from(self.columns).map_err(|_| fmt::Error)?;
        if width == 0 {
            return Ok(());
        }
        for row in self.glyphs.chunks(width) {
            let line: String = row.iter().collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Rendering backend capable of presenting grids.
pub trait RenderingBackend {
    /// Draws the provided grids, replacing whatever was drawn before.
    fn present(&mut self, grids: &[GridPresentation]) -> AnyResult<()>;
}

/// Backend that writes grids as text.
#[derive(Debug)]
pub struct TextBackend<W> {
    writer: W,
    frames: u64,
}

impl<W> TextBackend<W>
where
    W: Write,
{
    /// Creates a backend writing into `writer`.
    pub const fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    /// Number of times [`RenderingBackend::present`] has drawn.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> RenderingBackend for TextBackend<W>
where
    W: Write,
{
    fn present(&mut self, grids: &[GridPresentation]) -> AnyResult<()> {
        for grid in grids {
            write!(self.writer, "{grid}").context("failed to draw grid")?;
        }
        writeln!(self.writer).context("failed to draw frame separator")?;
        self.writer.flush().context("failed to flush rendered frame")?;
        self.frames = self.frames.saturating_add(1);
        Ok(())
    }
}

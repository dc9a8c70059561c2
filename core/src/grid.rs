//! Layered grid storage.

use crate::{AgentKind, CellAttributes, CellCoord, GridMetadata, GridSize, Motion, Structure, Tempo};

/// Dynamic layer: the robots occupying a grid, each with its motion record.
///
/// A cell either holds a robot together with its [`Motion`] or nothing at all,
/// so a motion record can never outlive the robot it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RobotLayer {
    size: GridSize,
    cells: Vec<Option<Motion>>,
}

impl RobotLayer {
    /// Creates an unoccupied layer.
    #[must_use]
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            cells: vec![None; size.cell_count()],
        }
    }

    /// Dimensions of the layer.
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.size
    }

    /// Motion of the robot at `cell`, if one is present.
    #[must_use]
    pub fn get(&self, cell: CellCoord) -> Option<Motion> {
        self.size
            .index(cell)
            .and_then(|index| self.cells.get(index).copied().flatten())
    }

    /// Writes a robot into `cell`, returning the robot it displaced.
    ///
    /// Cells outside the layer are ignored.
    pub fn insert(&mut self, cell: CellCoord, motion: Motion) -> Option<Motion> {
        let slot = self.size.index(cell).and_then(|index| self.cells.get_mut(index))?;
        slot.replace(motion)
    }

    /// Removes the robot at `cell`, returning it.
    pub fn remove(&mut self, cell: CellCoord) -> Option<Motion> {
        let slot = self.size.index(cell).and_then(|index| self.cells.get_mut(index))?;
        slot.take()
    }

    /// Iterates over occupied cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, Motion)> + '_ {
        self.size
            .cells()
            .zip(self.cells.iter())
            .filter_map(|(cell, slot)| slot.map(|motion| (cell, motion)))
    }

    /// Number of robots on the layer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|slot| slot.is_some()).count()
    }

    /// Reports whether no robot occupies the layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

/// Structural and dynamic layers of a grid, without attributes.
///
/// This is the unit captured by a recorder frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridLayers {
    structures: Vec<Option<Structure>>,
    robots: RobotLayer,
}

impl GridLayers {
    /// Creates empty layers.
    #[must_use]
    pub fn new(size: GridSize) -> Self {
        Self {
            structures: vec![None; size.cell_count()],
            robots: RobotLayer::new(size),
        }
    }

    /// Assembles layers from parts, rejecting parts whose sizes disagree.
    #[must_use]
    pub fn from_parts(structures: Vec<Option<Structure>>, robots: RobotLayer) -> Option<Self> {
        if structures.len() != robots.size().cell_count() {
            return None;
        }
        Some(Self { structures, robots })
    }

    /// Dimensions of the layers.
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.robots.size()
    }

    /// Structure at `cell`, if any.
    #[must_use]
    pub fn structure(&self, cell: CellCoord) -> Option<Structure> {
        self.size()
            .index(cell)
            .and_then(|index| self.structures.get(index).copied().flatten())
    }

    /// Read access to the dynamic layer.
    #[must_use]
    pub const fn robots(&self) -> &RobotLayer {
        &self.robots
    }

    /// Structural layer as a matrix of agent tags.
    #[must_use]
    pub fn structure_tags(&self) -> Vec<Vec<u8>> {
        self.tag_rows(|cell| AgentKind::from(self.structure(cell)).tag())
    }

    /// Dynamic layer as a matrix of agent tags.
    #[must_use]
    pub fn robot_tags(&self) -> Vec<Vec<u8>> {
        self.tag_rows(|cell| match self.robots.get(cell) {
            Some(_) => AgentKind::Robot.tag(),
            None => AgentKind::Empty.tag(),
        })
    }

    fn tag_rows<F>(&self, tag_at: F) -> Vec<Vec<u8>>
    where
        F: Fn(CellCoord) -> u8,
    {
        let size = self.size();
        (0..size.rows())
            .map(|row| {
                (0..size.columns())
                    .map(|column| tag_at(CellCoord::new(row, column)))
                    .collect()
            })
            .collect()
    }
}

/// Complete state of one grid: both layers plus the attribute table.
#[derive(Clone, Debug, PartialEq)]
pub struct GridState {
    layers: GridLayers,
    attributes: Vec<CellAttributes>,
}

impl GridState {
    /// Creates an empty grid with default attributes everywhere.
    #[must_use]
    pub fn new(size: GridSize) -> Self {
        Self {
            layers: GridLayers::new(size),
            attributes: vec![CellAttributes::default(); size.cell_count()],
        }
    }

    /// Dimensions of the grid.
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.layers.size()
    }

    /// Read access to both layers.
    #[must_use]
    pub const fn layers(&self) -> &GridLayers {
        &self.layers
    }

    /// Structure at `cell`, if any.
    #[must_use]
    pub fn structure(&self, cell: CellCoord) -> Option<Structure> {
        self.layers.structure(cell)
    }

    /// Read access to the dynamic layer.
    #[must_use]
    pub const fn robots(&self) -> &RobotLayer {
        self.layers.robots()
    }

    /// Attributes of `cell`, or the defaults for cells outside the grid.
    #[must_use]
    pub fn attributes(&self, cell: CellCoord) -> CellAttributes {
        self.size()
            .index(cell)
            .and_then(|index| self.attributes.get(index).copied())
            .unwrap_or_default()
    }

    /// Overwrites the structure at `cell`. Returns `false` when the cell is outside the grid.
    pub fn set_structure(&mut self, cell: CellCoord, structure: Option<Structure>) -> bool {
        match self
            .size()
            .index(cell)
            .and_then(|index| self.layers.structures.get_mut(index))
        {
            Some(slot) => {
                *slot = structure;
                true
            }
            None => false,
        }
    }

    /// Overwrites the attributes at `cell`. Returns `false` when the cell is outside the grid.
    pub fn set_attributes(&mut self, cell: CellCoord, attributes: CellAttributes) -> bool {
        match self
            .size()
            .index(cell)
            .and_then(|index| self.attributes.get_mut(index))
        {
            Some(slot) => {
                *slot = attributes;
                true
            }
            None => false,
        }
    }

    /// Mutable access to the dynamic layer for placement.
    pub fn robots_mut(&mut self) -> &mut RobotLayer {
        &mut self.layers.robots
    }

    /// Swaps in a rebuilt dynamic layer. Returns `false`, leaving the grid
    /// untouched, when the layer has different dimensions.
    pub fn replace_robots(&mut self, robots: RobotLayer) -> bool {
        if robots.size() != self.size() {
            return false;
        }
        self.layers.robots = robots;
        true
    }

    /// Swaps in both layers, keeping attributes. Returns `false`, leaving the
    /// grid untouched, when the layers have different dimensions.
    pub fn replace_layers(&mut self, layers: GridLayers) -> bool {
        if layers.size() != self.size() {
            return false;
        }
        self.layers = layers;
        true
    }

    /// Assembles a grid from layers and a row-major attribute table.
    #[must_use]
    pub fn from_parts(layers: GridLayers, attributes: Vec<CellAttributes>) -> Option<Self> {
        if attributes.len() != layers.size().cell_count() {
            return None;
        }
        Some(Self { layers, attributes })
    }

    /// Empties both layers and restores default attributes.
    pub fn reset(&mut self) {
        *self = Self::new(self.size());
    }
}

/// Read-only view handed to renderers.
#[derive(Clone, Copy, Debug)]
pub struct RenderState<'a> {
    metadata: &'a GridMetadata,
    state: &'a GridState,
}

impl<'a> RenderState<'a> {
    /// Captures a view of a grid and its metadata.
    #[must_use]
    pub const fn new(metadata: &'a GridMetadata, state: &'a GridState) -> Self {
        Self { metadata, state }
    }

    /// Label of the grid.
    #[must_use]
    pub fn label(&self) -> &'a str {
        &self.metadata.label
    }

    /// Tempo the grid is driven at.
    #[must_use]
    pub const fn tempo(&self) -> Tempo {
        self.metadata.tempo
    }

    /// Layers and attributes of the grid.
    #[must_use]
    pub const fn grid(&self) -> &'a GridState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        AgentKind, CellAttributes, CellCoord, Direction, GridSize, GridState, Motion, Structure,
        Voice,
    };

    #[test]
    fn insert_reports_displaced_robot() {
        let mut state = GridState::new(GridSize::new(2, 2));
        let cell = CellCoord::new(1, 0);
        assert!(state.robots_mut().insert(cell, Motion::default()).is_none());
        let displaced = state
            .robots_mut()
            .insert(cell, Motion::new(Direction::South, 3));
        assert_eq!(displaced, Some(Motion::default()));
        assert_eq!(state.robots().len(), 1);
    }

    #[test]
    fn tag_matrices_reflect_both_layers() {
        let mut state = GridState::new(GridSize::new(2, 3));
        assert!(state.set_structure(
            CellCoord::new(0, 2),
            Some(Structure::Emitter(Voice::Tone))
        ));
        let _ = state
            .robots_mut()
            .insert(CellCoord::new(1, 1), Motion::default());

        assert_eq!(
            state.layers().structure_tags(),
            vec![vec![0, 0, 10], vec![0, 0, 0]]
        );
        assert_eq!(state.layers().robot_tags(), vec![vec![0, 0, 0], vec![0, 3, 0]]);
    }

    #[test]
    fn out_of_bounds_writes_are_refused() {
        let mut state = GridState::new(GridSize::new(1, 1));
        assert!(!state.set_structure(CellCoord::new(1, 0), None));
        assert!(!state.set_attributes(CellCoord::new(0, 4), CellAttributes::silent()));
        assert_eq!(state.attributes(CellCoord::new(9, 9)), CellAttributes::default());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut state = GridState::new(GridSize::new(2, 2));
        let cell = CellCoord::new(0, 0);
        assert!(state.set_attributes(cell, CellAttributes::silent()));
        let _ = state.robots_mut().insert(cell, Motion::default());
        state.reset();
        assert_eq!(state, GridState::new(GridSize::new(2, 2)));
        assert_eq!(state.attributes(cell).agent_type, AgentKind::Empty);
    }

    #[test]
    fn replacing_with_mismatched_layer_is_refused() {
        let mut state = GridState::new(GridSize::new(2, 2));
        let foreign = crate::RobotLayer::new(GridSize::new(3, 3));
        assert!(!state.replace_robots(foreign));
    }
}

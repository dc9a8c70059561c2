//! Seeded random layouts.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use carillon_core::CellCoord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{GridConfig, PlacementConfig, PlacementKind, SessionConfig};

/// Number of rotators stacked below the central emitter.
const ROTATOR_COLUMN: u32 = 4;

/// Parameters of a scattered layout.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ScatterOptions {
    pub(crate) rows: u32,
    pub(crate) columns: u32,
    pub(crate) robots: usize,
    pub(crate) seed: u64,
}

/// Builds a single-grid session with robots at random cells.
///
/// A tone emitter sits in the centre with a column of clockwise rotators
/// below it, wrapping around the bottom edge on short grids. Robot cells are
/// drawn with replacement, so fewer than `robots` may survive; draws landing
/// on an occupied cell are dropped.
pub(crate) fn scatter(options: ScatterOptions) -> Result<SessionConfig> {
    let ScatterOptions {
        rows,
        columns,
        robots,
        seed,
    } = options;
    if rows == 0 || columns == 0 {
        bail!("cannot scatter onto a {rows}x{columns} grid");
    }
    let centre = CellCoord::new(rows / 2, columns / 2);

    let mut taken = BTreeSet::new();
    let mut structures = Vec::new();
    let column = (0..=ROTATOR_COLUMN).map(|offset| (centre.row() + offset) % rows);
    for (index, row) in column.enumerate() {
        let cell = CellCoord::new(row, centre.column());
        if !taken.insert(cell) {
            continue;
        }
        let kind = if index == 0 {
            PlacementKind::ToneEmitter
        } else {
            PlacementKind::ClockwiseRotator
        };
        structures.push(PlacementConfig {
            row,
            column: centre.column(),
            kind,
            ..PlacementConfig::default()
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut placements = Vec::with_capacity(robots + structures.len());
    for _ in 0..robots {
        let cell = CellCoord::new(rng.gen_range(0..rows), rng.gen_range(0..columns));
        if taken.insert(cell) {
            placements.push(PlacementConfig {
                row: cell.row(),
                column: cell.column(),
                ..PlacementConfig::default()
            });
        }
    }
    placements.extend(structures);

    Ok(SessionConfig {
        grids: vec![GridConfig {
            label: "scatter".to_owned(),
            rows,
            columns,
            placements,
        }],
        ..SessionConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(seed: u64) -> ScatterOptions {
        ScatterOptions {
            rows: 20,
            columns: 20,
            robots: 50,
            seed,
        }
    }

    #[test]
    fn the_same_seed_scatters_the_same_layout() {
        let first = scatter(options(7)).expect("scatter");
        assert_eq!(first, scatter(options(7)).expect("scatter"));
        assert_ne!(first, scatter(options(8)).expect("scatter"));
    }

    #[test]
    fn scattered_layouts_are_valid_sessions() {
        let config = scatter(options(42)).expect("scatter");
        config.validate().expect("scatter output validates");
        let session = config.build_session().expect("session builds");
        assert_eq!(carillon_world::query::grid_count(&session), 1);

        let grid = &config.grids[0];
        let robots = grid
            .placements
            .iter()
            .filter(|placement| placement.kind == PlacementKind::Robot)
            .count();
        assert!(robots > 0 && robots <= 50);

        let cells: BTreeSet<_> = grid.placements.iter().map(PlacementConfig::cell).collect();
        assert_eq!(cells.len(), grid.placements.len(), "cells are unique");
        assert!(grid.placements.iter().any(|placement| {
            placement.kind == PlacementKind::ToneEmitter
                && placement.cell() == CellCoord::new(10, 10)
        }));
        for row in 11..=14 {
            assert!(grid.placements.iter().any(|placement| {
                placement.kind == PlacementKind::ClockwiseRotator
                    && placement.cell() == CellCoord::new(row, 10)
            }));
        }
    }

    #[test]
    fn empty_grids_are_refused() {
        assert!(scatter(ScatterOptions {
            rows: 0,
            columns: 5,
            robots: 1,
            seed: 0,
        })
        .is_err());
    }

    #[test]
    fn tiny_grids_keep_the_emitter() {
        let config = scatter(ScatterOptions {
            rows: 2,
            columns: 1,
            robots: 10,
            seed: 3,
        })
        .expect("scatter");
        config.validate().expect("scatter output validates");
        let placements = &config.grids[0].placements;
        assert!(placements
            .iter()
            .any(|placement| placement.kind == PlacementKind::ToneEmitter));
        let cells: BTreeSet<_> = placements.iter().map(PlacementConfig::cell).collect();
        assert_eq!(cells.len(), placements.len());
    }
}

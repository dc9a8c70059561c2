#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic motion engine that advances every robot on a grid by one tick.
//!
//! [`tick`] is a pure function of the grid it receives. Robots are visited in
//! row-major order. A robot that is due to step looks at the cell one step ahead,
//! lets the structure found there redirect its heading, and then moves exactly
//! one step from its *original* cell along the redirected heading. Reflectors
//! and rotators therefore deflect robots without ever being occupied by them.

use carillon_core::{CellCoord, GridState, Motion, RobotLayer, Trigger};

/// Result of advancing a grid by one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickOutcome {
    /// Rebuilt dynamic layer, including motion records, for the next tick.
    pub robots: RobotLayer,
    /// Landings on non-empty structural cells, in robot visiting order.
    pub triggers: Vec<Trigger>,
    /// Cells where a later robot overwrote an earlier one, in visiting order.
    pub collisions: Vec<CellCoord>,
}

/// Advances every robot on `grid` by one tick.
///
/// When two robots land on the same cell the later one in row-major order
/// replaces the earlier one, and the cell is reported in
/// [`TickOutcome::collisions`]. Every robot that steps onto a non-empty
/// structural cell produces a trigger, including robots that are then
/// overwritten.
#[must_use]
pub fn tick(grid: &GridState) -> TickOutcome {
    let mut robots = RobotLayer::new(grid.size());
    let mut triggers = Vec::new();
    let mut collisions = Vec::new();

    for (cell, motion) in grid.robots().iter() {
        let landing = advance(grid, cell, motion);
        if robots.insert(landing.cell, landing.motion).is_some() {
            collisions.push(landing.cell);
        }

        if landing.stepped && grid.structure(landing.cell).is_some() {
            triggers.push(Trigger {
                cell: landing.cell,
                attributes: grid.attributes(landing.cell),
            });
        }
    }

    TickOutcome {
        robots,
        triggers,
        collisions,
    }
}

#[derive(Clone, Copy, Debug)]
struct Landing {
    cell: CellCoord,
    motion: Motion,
    stepped: bool,
}

fn advance(grid: &GridState, cell: CellCoord, motion: Motion) -> Landing {
    if motion.phase.saturating_add(1) < motion.speed {
        return Landing {
            cell,
            motion: Motion {
                phase: motion.phase + 1,
                ..motion
            },
            stepped: false,
        };
    }

    let size = grid.size();
    let ahead = size.step(cell, motion.direction);
    let heading = grid
        .structure(ahead)
        .map_or(motion.direction, |structure| structure.redirect(motion.direction));
    let destination = size.step(cell, heading);

    Landing {
        cell: destination,
        motion: Motion {
            direction: heading,
            speed: motion.speed,
            phase: 0,
        },
        stepped: true,
    }
}

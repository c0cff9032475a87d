use crate::grid::Position;
use crate::hungarian::{min_cost_assignment, CostMatrix};
use crate::level::{Level, UNREACHED};
use std::rc::Rc;

/// An admissible lower bound on the remaining push count, or proof that no
/// bound exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Solvable(u16),
    Impossible,
}

/// Estimates the number of pushes still needed for a crate layout. Chosen
/// once per run, not per state.
pub trait Heuristic {
    fn estimate(&self, crates: &[Position]) -> Cost;
}

/// Sum over crates of the precomputed nearest-goal push distance. A crate
/// standing on a cell its distance table does not cover can never be solved.
pub struct SimpleHeuristic {
    level: Rc<Level>,
}

impl SimpleHeuristic {
    pub fn new(level: Rc<Level>) -> Self {
        SimpleHeuristic { level }
    }
}

impl Heuristic for SimpleHeuristic {
    fn estimate(&self, crates: &[Position]) -> Cost {
        let mut total = 0u16;
        for (i, &pos) in crates.iter().enumerate() {
            match self.level.push_distance(i, pos) {
                Some(d) => total = total.saturating_add(d),
                None => return Cost::Impossible,
            }
        }
        Cost::Solvable(total)
    }
}

/// Minimum-weight matching of crates to goals over the per-goal distance
/// tables. Never below the simple sum on layouts where two crates share a
/// nearest goal, since the matching must send one of them elsewhere.
pub struct HungarianHeuristic {
    level: Rc<Level>,
}

impl HungarianHeuristic {
    pub fn new(level: Rc<Level>) -> Self {
        HungarianHeuristic { level }
    }
}

impl Heuristic for HungarianHeuristic {
    fn estimate(&self, crates: &[Position]) -> Cost {
        let n = crates.len();
        let mut matrix = CostMatrix::new(n);
        for goal in 0..n {
            for &pos in crates.iter() {
                matrix.push(self.level.goal_distance(goal, pos).unwrap_or(UNREACHED));
            }
        }
        match min_cost_assignment(&matrix) {
            Some(total) => Cost::Solvable(total.min(u16::MAX as u32 - 1) as u16),
            None => Cost::Impossible,
        }
    }
}

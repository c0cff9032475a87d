use crate::grid::{Position, MAX_DIM};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::LazyLock;

/// Process-wide Zobrist tables, filled once and read-only afterwards.
pub static ZOBRIST: LazyLock<Zobrist> = LazyLock::new(Zobrist::new);

/// Per-cell random values for incremental state hashing. A state's hash is
/// the XOR of `crate_cell` over its crate cells, plus `player_zone` of the
/// normalized player representative whenever that has been computed.
pub struct Zobrist {
    crate_cells: [[u64; MAX_DIM]; MAX_DIM],
    player_zones: [[u64; MAX_DIM]; MAX_DIM],
}

impl Zobrist {
    fn new() -> Self {
        // Seeded PRNG so hashes are reproducible across runs
        let mut rng = ChaCha8Rng::seed_from_u64(0x5b0c_0ba2_70c3_d9e1);

        let mut crate_cells = [[0u64; MAX_DIM]; MAX_DIM];
        for row in crate_cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell = rng.next_u64();
            }
        }

        let mut player_zones = [[0u64; MAX_DIM]; MAX_DIM];
        for row in player_zones.iter_mut() {
            for cell in row.iter_mut() {
                *cell = rng.next_u64();
            }
        }

        Zobrist {
            crate_cells,
            player_zones,
        }
    }

    /// Hash term for a crate occupying the cell.
    pub fn crate_cell(&self, pos: Position) -> u64 {
        self.crate_cells[pos.row()][pos.col()]
    }

    /// Hash term for the player-zone representative cell.
    pub fn player_zone(&self, pos: Position) -> u64 {
        self.player_zones[pos.row()][pos.col()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_stable() {
        let a = ZOBRIST.crate_cell(Position(3, 4));
        let b = ZOBRIST.crate_cell(Position(3, 4));
        assert_eq!(a, b);
    }

    #[test]
    fn test_tables_are_independent() {
        // The two tables must never alias, or a crate parked on the zone
        // representative would cancel out of the hash.
        let pos = Position(7, 7);
        assert_ne!(ZOBRIST.crate_cell(pos), ZOBRIST.player_zone(pos));
        assert_ne!(
            ZOBRIST.crate_cell(Position(0, 0)),
            ZOBRIST.crate_cell(Position(0, 1))
        );
    }
}

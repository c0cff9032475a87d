use crate::grid::MAX_CRATES;
use crate::level::UNREACHED;
use arrayvec::ArrayVec;

/// A square cost matrix filled row-major, sized for one crate-to-goal
/// assignment problem. Entries of `UNREACHED` stand for impossible pairs.
pub struct CostMatrix {
    n: usize,
    data: ArrayVec<u16, { MAX_CRATES * MAX_CRATES }>,
}

impl CostMatrix {
    pub fn new(n: usize) -> Self {
        debug_assert!(n <= MAX_CRATES);
        CostMatrix {
            n,
            data: ArrayVec::new(),
        }
    }

    pub fn push(&mut self, cost: u16) {
        debug_assert!(self.data.len() < self.n * self.n);
        self.data.push(cost);
    }

    fn get(&self, row: usize, col: usize) -> i64 {
        self.data[row * self.n + col] as i64
    }
}

/// Minimum-weight perfect assignment by shortest augmenting paths over dual
/// potentials, O(n^3). Returns `None` when every perfect assignment is
/// forced through an `UNREACHED` pair.
pub fn min_cost_assignment(cost: &CostMatrix) -> Option<u32> {
    const BIG: i64 = i64::MAX / 4;
    let n = cost.n;
    if n == 0 {
        return Some(0);
    }

    // 1-indexed working arrays; slot 0 is the virtual unmatched column.
    let mut row_pot = fill::<i64>(n, 0);
    let mut col_pot = fill::<i64>(n, 0);
    let mut col_match = fill::<usize>(n, 0);
    let mut col_from = fill::<usize>(n, 0);

    for row in 1..=n {
        col_match[0] = row;
        let mut j0 = 0;
        let mut min_reduced = fill::<i64>(n, BIG);
        let mut scanned = fill::<bool>(n, false);

        loop {
            scanned[j0] = true;
            let i0 = col_match[j0];
            let mut delta = BIG;
            let mut j1 = 0;

            for j in 1..=n {
                if scanned[j] {
                    continue;
                }
                let reduced = cost.get(i0 - 1, j - 1) - row_pot[i0] - col_pot[j];
                if reduced < min_reduced[j] {
                    min_reduced[j] = reduced;
                    col_from[j] = j0;
                }
                if min_reduced[j] < delta {
                    delta = min_reduced[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if scanned[j] {
                    row_pot[col_match[j]] += delta;
                    col_pot[j] -= delta;
                } else {
                    min_reduced[j] -= delta;
                }
            }

            j0 = j1;
            if col_match[j0] == 0 {
                break;
            }
        }

        // Walk the augmenting path back, flipping matches
        while j0 != 0 {
            let j1 = col_from[j0];
            col_match[j0] = col_match[j1];
            j0 = j1;
        }
    }

    let total = -col_pot[0];
    if total >= UNREACHED as i64 {
        None
    } else {
        Some(total as u32)
    }
}

fn fill<T: Copy>(n: usize, value: T) -> ArrayVec<T, { MAX_CRATES + 1 }> {
    (0..=n).map(|_| value).collect()
}

use crate::grid::{Bitboard, DirSet, Direction, Position, ALL_DIRECTIONS};
use crate::level::{new_dist_grid, DistGrid, Level, UNREACHED};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::debug;

/// Floor cells reachable by the player from its start, ignoring crates.
/// Bounds every other analysis.
pub fn player_reachable(level: &Level) -> Bitboard {
    let mut reachable = Bitboard::new();
    let mut queue = VecDeque::new();
    let start = level.start_player();
    reachable.set(start);
    queue.push_back(start);
    while let Some(pos) = queue.pop_front() {
        for &dir in &ALL_DIRECTIONS {
            if let Some(next) = level.step_floor(pos, dir) {
                if !reachable.get(next) {
                    reachable.set(next);
                    queue.push_back(next);
                }
            }
        }
    }
    reachable
}

/// Cells a crate starting at `start` could ever occupy if the board held no
/// other crates. A step from `x` to `x + d` needs both `x + d` and `x - d`
/// free so the pusher fits behind.
pub fn crate_reachable(level: &Level, start: Position) -> Bitboard {
    let mut reachable = Bitboard::new();
    let mut queue = VecDeque::new();
    reachable.set(start);
    queue.push_back(start);
    while let Some(pos) = queue.pop_front() {
        for &dir in &ALL_DIRECTIONS {
            let Some(next) = level.step_floor(pos, dir) else {
                continue;
            };
            if level.wall_at(pos, dir.opposite()) || reachable.get(next) {
                continue;
            }
            reachable.set(next);
            queue.push_back(next);
        }
    }
    reachable
}

/// Per-goal push-distance tables: `tables[g][cell]` is the minimum number of
/// pushes moving a lone crate from `cell` onto goal `g`. Computed by a
/// pull-rule BFS outward from the goal: un-pushing the crate from `x` back to
/// `y = x - d` needs both `y` and the pusher cell `y - d` free.
pub fn goal_distances(level: &Level) -> Vec<DistGrid> {
    level
        .goals()
        .iter()
        .map(|&goal| {
            let mut dist = new_dist_grid();
            let mut queue = VecDeque::new();
            dist[goal.index()] = 0;
            queue.push_back(goal);
            while let Some(pos) = queue.pop_front() {
                let d = dist[pos.index()];
                for &dir in &ALL_DIRECTIONS {
                    let back = dir.opposite();
                    let Some(prev) = level.step_floor(pos, back) else {
                        continue;
                    };
                    if level.wall_at(prev, back) || dist[prev.index()] != UNREACHED {
                        continue;
                    }
                    dist[prev.index()] = d + 1;
                    queue.push_back(prev);
                }
            }
            dist
        })
        .collect()
}

/// Per-crate nearest-goal tables: the minimum of the goal tables, restricted
/// to the cells that crate can actually occupy. A crate whose cell reads
/// `UNREACHED` here can never be solved.
pub fn push_distances(
    goal_distance: &[DistGrid],
    crate_reachable: &[Bitboard],
) -> Vec<DistGrid> {
    crate_reachable
        .iter()
        .map(|reachable| {
            let mut dist = new_dist_grid();
            for pos in reachable.iter() {
                let best = goal_distance
                    .iter()
                    .map(|table| table[pos.index()])
                    .min()
                    .unwrap_or(UNREACHED);
                dist[pos.index()] = best;
            }
            dist
        })
        .collect()
}

/// Non-goal cells where a crate, once pushed there, is stuck forever.
///
/// Rules, by the number of wall neighbors:
/// - three or four walls: dead;
/// - two walls forming an L: dead;
/// - a wall at `d` (one wall, or either of two parallel walls): dead when
///   the walk along both directions perpendicular to `d` keeps a wall at `d`
///   beside every cell, meets no goal, and ends at a wall. While the crate
///   hugs that wall it can never be pushed off the line, so a goal-free,
///   wall-terminated line is a trap.
pub fn dead_squares(level: &Level, player_reachable: &Bitboard) -> Bitboard {
    let mut dead = Bitboard::new();
    for pos in player_reachable.iter() {
        if level.is_goal(pos) {
            continue;
        }
        let walls: Vec<Direction> = ALL_DIRECTIONS
            .iter()
            .copied()
            .filter(|&dir| level.wall_at(pos, dir))
            .collect();
        let is_dead = match walls.len() {
            0 => false,
            1 => wall_hug_trap(level, pos, walls[0]),
            2 => {
                if walls[0] == walls[1].opposite() {
                    // Parallel walls: the cell is trapped if hugging either
                    // side pins it on a goal-free line.
                    walls.iter().any(|&d| wall_hug_trap(level, pos, d))
                } else {
                    true
                }
            }
            _ => true,
        };
        if is_dead {
            dead.set(pos);
        }
    }
    debug!(level = level.name(), dead = dead.len(), "dead squares");
    dead
}

/// Walk both directions perpendicular to the hugged wall at `d`. The walk
/// fails (cell is live) on reaching a goal or a cell with no wall at `d`;
/// it succeeds on running into a wall.
fn wall_hug_trap(level: &Level, pos: Position, d: Direction) -> bool {
    for walk in [d.next(), d.prev()] {
        let mut cur = pos;
        loop {
            let Some(next) = cur.step(walk) else {
                break;
            };
            if level.is_wall(next) {
                break;
            }
            if level.is_goal(next) || !level.wall_at(next, d) {
                return false;
            }
            cur = next;
        }
    }
    true
}

/// Articulation points of the floor graph rooted at the player start, each
/// tagged with the directions whose neighbor component holds a goal.
///
/// Iterative low-link search; the recursion of the textbook version can
/// overflow the stack on corridor-heavy grids.
pub fn cuts(level: &Level) -> FxHashMap<Position, DirSet> {
    let mut disc: FxHashMap<Position, u32> = FxHashMap::default();
    let mut low: FxHashMap<Position, u32> = FxHashMap::default();
    let mut cut_cells: Vec<Position> = Vec::new();
    let root = level.start_player();
    let mut timer = 0u32;

    struct Frame {
        pos: Position,
        parent: Option<Position>,
        next_dir: usize,
    }

    let mut root_children = 0usize;
    let mut stack = vec![Frame {
        pos: root,
        parent: None,
        next_dir: 0,
    }];
    disc.insert(root, timer);
    low.insert(root, timer);
    timer += 1;

    while let Some(frame) = stack.last_mut() {
        if frame.next_dir < 4 {
            let dir = Direction::from_index(frame.next_dir);
            frame.next_dir += 1;
            let Some(next) = level.step_floor(frame.pos, dir) else {
                continue;
            };
            if Some(next) == frame.parent {
                continue;
            }
            if let Some(&seen) = disc.get(&next) {
                let entry = low.get_mut(&frame.pos).unwrap();
                *entry = (*entry).min(seen);
            } else {
                disc.insert(next, timer);
                low.insert(next, timer);
                timer += 1;
                if frame.pos == root {
                    root_children += 1;
                }
                let parent = Some(frame.pos);
                stack.push(Frame {
                    pos: next,
                    parent,
                    next_dir: 0,
                });
            }
        } else {
            let done = stack.pop().unwrap();
            if let Some(parent) = done.parent {
                let child_low = low[&done.pos];
                let entry = low.get_mut(&parent).unwrap();
                *entry = (*entry).min(child_low);
                if parent != root && child_low >= disc[&parent] {
                    cut_cells.push(parent);
                }
            }
        }
    }
    if root_children >= 2 {
        cut_cells.push(root);
    }

    let mut cuts = FxHashMap::default();
    for pos in cut_cells {
        if cuts.contains_key(&pos) {
            continue;
        }
        let mut dirs = DirSet::new();
        for &dir in &ALL_DIRECTIONS {
            if let Some(start) = level.step_floor(pos, dir) {
                if goal_in_component(level, start, pos) {
                    dirs.add(dir);
                }
            }
        }
        cuts.insert(pos, dirs);
    }
    debug!(level = level.name(), cuts = cuts.len(), "articulation cuts");
    cuts
}

/// Flood fill from `start` with `blocked` treated as a wall; true when the
/// fill touches a goal.
fn goal_in_component(level: &Level, start: Position, blocked: Position) -> bool {
    if start == blocked {
        return false;
    }
    let mut visited = Bitboard::new();
    let mut queue = VecDeque::new();
    visited.set(start);
    queue.push_back(start);
    while let Some(pos) = queue.pop_front() {
        if level.is_goal(pos) {
            return true;
        }
        for &dir in &ALL_DIRECTIONS {
            if let Some(next) = level.step_floor(pos, dir) {
                if next != blocked && !visited.get(next) {
                    visited.set(next);
                    queue.push_back(next);
                }
            }
        }
    }
    false
}

use crate::analysis;
use crate::grid::{Bitboard, DirSet, Direction, Position, MAX_CRATES, MAX_DIM};
use crate::levels::LevelError;
use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Wall,
    Floor,
    Goal,
}

/// Dense per-cell distance table indexed by `Position::index`. `UNREACHED`
/// marks cells from which the target cannot be reached.
pub type DistGrid = Box<[u16]>;

pub const UNREACHED: u16 = u16::MAX;

pub fn new_dist_grid() -> DistGrid {
    vec![UNREACHED; crate::grid::CELLS].into_boxed_slice()
}

/// The static model of one level: the grid, the goals, the initial dynamic
/// layout, and the caches precomputed once before search. Immutable after
/// construction; shared by `Rc` among all states of a search.
pub struct Level {
    name: String,
    rows: Vec<Vec<Tile>>,
    goals: Vec<Position>,
    start_player: Position,
    start_crates: ArrayVec<Position, MAX_CRATES>,
    player_reachable: Bitboard,
    crate_reachable: Vec<Bitboard>,
    goal_distance: Vec<DistGrid>,
    push_distance: Vec<DistGrid>,
    dead_squares: Bitboard,
    cuts: FxHashMap<Position, DirSet>,
}

impl Level {
    /// Parse a named grid from its raw symbol rows and run the static
    /// analyses.
    ///
    /// Symbols:
    /// - `#` = wall
    /// - ` ` = floor
    /// - `.` = goal
    /// - `$` = crate
    /// - `@` = player
    /// - `*` = crate on goal
    /// - `+` = player on goal
    ///
    /// The player and crates are dynamic: their symbols decay to the
    /// underlying floor or goal in the stored grid. Rows keep their original
    /// (possibly differing) lengths.
    pub fn from_lines(name: &str, lines: &[&str]) -> Result<Self, LevelError> {
        if lines.is_empty() {
            return Err(LevelError::Malformed(format!("{}: empty grid", name)));
        }
        let height = lines.len();
        let width = lines.iter().map(|line| line.len()).max().unwrap_or(0);
        if width > MAX_DIM || height > MAX_DIM {
            return Err(LevelError::SizeExceeded(format!(
                "{}: grid is {}x{}, maximum is {}x{}",
                name, height, width, MAX_DIM, MAX_DIM
            )));
        }

        let mut rows = Vec::with_capacity(height);
        let mut goals = Vec::new();
        let mut player = None;
        let mut crates: ArrayVec<Position, MAX_CRATES> = ArrayVec::new();

        for (row, line) in lines.iter().enumerate() {
            let mut tiles = Vec::with_capacity(line.len());
            for (col, ch) in line.chars().enumerate() {
                let pos = Position(row as u8, col as u8);
                let tile = match ch {
                    '#' => Tile::Wall,
                    ' ' => Tile::Floor,
                    '.' => Tile::Goal,
                    '$' | '*' => {
                        if crates.is_full() {
                            return Err(LevelError::Malformed(format!(
                                "{}: more than {} crates",
                                name, MAX_CRATES
                            )));
                        }
                        crates.push(pos);
                        if ch == '*' {
                            Tile::Goal
                        } else {
                            Tile::Floor
                        }
                    }
                    '@' | '+' => {
                        if player.is_some() {
                            return Err(LevelError::Malformed(format!(
                                "{}: more than one player",
                                name
                            )));
                        }
                        player = Some(pos);
                        if ch == '+' {
                            Tile::Goal
                        } else {
                            Tile::Floor
                        }
                    }
                    _ => {
                        return Err(LevelError::Malformed(format!(
                            "{}: invalid symbol '{}' at {}",
                            name, ch, pos
                        )));
                    }
                };
                if tile == Tile::Goal {
                    goals.push(pos);
                }
                tiles.push(tile);
            }
            rows.push(tiles);
        }

        let start_player = player
            .ok_or_else(|| LevelError::Malformed(format!("{}: no player", name)))?;
        if goals.len() != crates.len() {
            return Err(LevelError::Malformed(format!(
                "{}: {} goals but {} crates",
                name,
                goals.len(),
                crates.len()
            )));
        }

        let mut level = Level {
            name: name.to_string(),
            rows,
            goals,
            start_player,
            start_crates: crates,
            player_reachable: Bitboard::new(),
            crate_reachable: Vec::new(),
            goal_distance: Vec::new(),
            push_distance: Vec::new(),
            dead_squares: Bitboard::new(),
            cuts: FxHashMap::default(),
        };
        level.precompute();
        Ok(level)
    }

    fn precompute(&mut self) {
        self.player_reachable = analysis::player_reachable(self);
        self.crate_reachable = self
            .start_crates
            .iter()
            .map(|&start| analysis::crate_reachable(self, start))
            .collect();
        self.goal_distance = analysis::goal_distances(self);
        self.push_distance =
            analysis::push_distances(&self.goal_distance, &self.crate_reachable);
        self.dead_squares = analysis::dead_squares(self, &self.player_reachable);
        self.cuts = analysis::cuts(self);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|row| row.len()).max().unwrap_or(0)
    }

    /// Tile at the cell. Cells outside the grid, including those past the
    /// end of a short row, read as walls.
    pub fn tile(&self, pos: Position) -> Tile {
        self.rows
            .get(pos.row())
            .and_then(|row| row.get(pos.col()))
            .copied()
            .unwrap_or(Tile::Wall)
    }

    pub fn is_wall(&self, pos: Position) -> bool {
        self.tile(pos) == Tile::Wall
    }

    pub fn is_goal(&self, pos: Position) -> bool {
        self.tile(pos) == Tile::Goal
    }

    /// True when the neighbor in the given direction is a wall or outside
    /// the grid.
    pub fn wall_at(&self, pos: Position, dir: Direction) -> bool {
        pos.step(dir).map_or(true, |n| self.is_wall(n))
    }

    /// The adjacent non-wall cell in the given direction, if any.
    pub fn step_floor(&self, pos: Position, dir: Direction) -> Option<Position> {
        pos.step(dir).filter(|&n| !self.is_wall(n))
    }

    pub fn goals(&self) -> &[Position] {
        &self.goals
    }

    pub fn crate_count(&self) -> usize {
        self.start_crates.len()
    }

    pub fn start_player(&self) -> Position {
        self.start_player
    }

    pub fn start_crates(&self) -> &[Position] {
        &self.start_crates
    }

    pub fn player_reachable(&self) -> &Bitboard {
        &self.player_reachable
    }

    pub fn crate_reachable(&self, crate_index: usize) -> &Bitboard {
        &self.crate_reachable[crate_index]
    }

    /// Minimum pushes for any crate to travel from `pos` to goal `goal_index`
    /// on an otherwise empty board.
    pub fn goal_distance(&self, goal_index: usize, pos: Position) -> Option<u16> {
        match self.goal_distance[goal_index][pos.index()] {
            UNREACHED => None,
            d => Some(d),
        }
    }

    /// Minimum pushes for crate `crate_index` to reach its nearest goal from
    /// `pos`. `None` means the crate is permanently stuck there.
    pub fn push_distance(&self, crate_index: usize, pos: Position) -> Option<u16> {
        match self.push_distance[crate_index][pos.index()] {
            UNREACHED => None,
            d => Some(d),
        }
    }

    pub fn is_dead_square(&self, pos: Position) -> bool {
        self.dead_squares.get(pos)
    }

    pub fn cuts(&self) -> &FxHashMap<Position, DirSet> {
        &self.cuts
    }

    /// Goal-side directions of an articulation cell, if the cell is one.
    pub fn cut_dirs(&self, pos: Position) -> Option<DirSet> {
        self.cuts.get(&pos).copied()
    }

    /// Render a dynamic layout over the static grid.
    pub fn render(&self, player: Position, crates: &[Position]) -> String {
        let mut out = String::new();
        for (row, tiles) in self.rows.iter().enumerate() {
            let mut line = String::new();
            for (col, &tile) in tiles.iter().enumerate() {
                let pos = Position(row as u8, col as u8);
                let has_crate = crates.contains(&pos);
                let ch = if pos == player {
                    match tile {
                        Tile::Goal => '+',
                        _ => '@',
                    }
                } else if has_crate {
                    match tile {
                        Tile::Goal => '*',
                        _ => '$',
                    }
                } else {
                    match tile {
                        Tile::Wall => '#',
                        Tile::Floor => ' ',
                        Tile::Goal => '.',
                    }
                };
                line.push(ch);
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(self.start_player, &self.start_crates))
    }
}

use crate::grid::{Bitboard, Direction, Position, ALL_DIRECTIONS, MAX_CRATES};
use crate::heuristic::{Cost, Heuristic};
use crate::level::Level;
use crate::zobrist::ZOBRIST;
use arrayvec::ArrayVec;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Index into a state's crate vector. Stable for the whole search: the move
/// list replays by index, so crates are never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CrateIndex(pub u8);

/// One push: a crate and the direction it moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PushMove {
    crate_index: CrateIndex,
    direction: Direction,
}

impl PushMove {
    pub fn new(crate_index: CrateIndex, direction: Direction) -> Self {
        PushMove {
            crate_index,
            direction,
        }
    }

    pub fn crate_index(&self) -> CrateIndex {
        self.crate_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl fmt::Display for PushMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.crate_index.0, self.direction)
    }
}

/// The set of candidate pushes found by one player flood fill: one crate
/// bitvector per direction, so the same push found along two approach paths
/// collapses into one bit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PushSet {
    dirs: [u64; 4],
}

impl PushSet {
    pub fn new() -> Self {
        PushSet { dirs: [0; 4] }
    }

    pub fn add(&mut self, crate_index: CrateIndex, direction: Direction) {
        self.dirs[direction.index()] |= 1u64 << crate_index.0;
    }

    pub fn contains(&self, mv: PushMove) -> bool {
        self.dirs[mv.direction.index()] & (1u64 << mv.crate_index.0) != 0
    }

    pub fn len(&self) -> usize {
        self.dirs.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.iter().all(|&b| b == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = PushMove> + '_ {
        self.dirs.iter().enumerate().flat_map(|(dir_idx, &word)| {
            let direction = Direction::from_index(dir_idx);
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    None
                } else {
                    let idx = bits.trailing_zeros() as u8;
                    bits &= bits - 1;
                    Some(PushMove::new(CrateIndex(idx), direction))
                }
            })
        })
    }
}

/// A mutable search node: the dynamic part of the puzzle plus its
/// incremental hash and cached heuristic.
///
/// The hash always equals the XOR of the crate-cell terms, plus the
/// player-zone term of `top_reachable` exactly while that is set. States are
/// cloned on every successful push; the parent stays valid for the caller.
#[derive(Clone)]
pub struct State {
    level: Rc<Level>,
    player: Position,
    crates: ArrayVec<Position, MAX_CRATES>,
    hash: u64,
    heuristic: u16,
    top_reachable: Option<Position>,
}

impl State {
    /// The initial state of a level. `None` when some crate can never reach
    /// a goal, in which case the search is over before it starts.
    pub fn initial<H: Heuristic>(level: Rc<Level>, heuristic: &H) -> Option<State> {
        let crates: ArrayVec<Position, MAX_CRATES> =
            level.start_crates().iter().copied().collect();
        let mut hash = 0u64;
        for &pos in &crates {
            hash ^= ZOBRIST.crate_cell(pos);
        }
        let h = match heuristic.estimate(&crates) {
            Cost::Solvable(h) => h,
            Cost::Impossible => return None,
        };
        Some(State {
            player: level.start_player(),
            level,
            crates,
            hash,
            heuristic: h,
            top_reachable: None,
        })
    }

    pub fn player(&self) -> Position {
        self.player
    }

    pub fn crates(&self) -> &[Position] {
        &self.crates
    }

    pub fn crate_pos(&self, index: CrateIndex) -> Position {
        self.crates[index.0 as usize]
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn heuristic(&self) -> u16 {
        self.heuristic
    }

    pub fn top_reachable(&self) -> Option<Position> {
        self.top_reachable
    }

    /// True when every crate rests on a goal.
    pub fn is_solved(&self) -> bool {
        self.crates.iter().all(|&pos| self.level.is_goal(pos))
    }

    fn occupancy(&self) -> Bitboard {
        let mut occ = Bitboard::new();
        for &pos in &self.crates {
            occ.set(pos);
        }
        occ
    }

    fn crate_at(&self, pos: Position) -> Option<CrateIndex> {
        self.crates
            .iter()
            .position(|&c| c == pos)
            .map(|i| CrateIndex(i as u8))
    }

    /// Flood fill from the player over free cells, emitting every crate the
    /// player stands next to along with the direction it would be pushed.
    ///
    /// As a side effect this normalizes the player zone: `top_reachable`
    /// becomes the smallest visited cell and its zone term folds into the
    /// hash, so layouts reached by different player-only maneuvers compare
    /// equal afterwards.
    pub fn compute_pushes(&mut self) -> PushSet {
        assert!(
            self.top_reachable.is_none(),
            "player zone already normalized"
        );

        let occ = self.occupancy();
        let mut pushes = PushSet::new();
        let mut visited = Bitboard::new();
        let mut queue = VecDeque::new();
        let mut top = self.player;

        visited.set(self.player);
        queue.push_back(self.player);
        while let Some(pos) = queue.pop_front() {
            if pos < top {
                top = pos;
            }
            for &dir in &ALL_DIRECTIONS {
                let Some(next) = self.level.step_floor(pos, dir) else {
                    continue;
                };
                if occ.get(next) {
                    if let Some(idx) = self.crate_at(next) {
                        pushes.add(idx, dir);
                    }
                } else if !visited.get(next) {
                    visited.set(next);
                    queue.push_back(next);
                }
            }
        }

        self.top_reachable = Some(top);
        self.hash ^= ZOBRIST.player_zone(top);
        pushes
    }

    /// Attempt one push. Returns the successor state, or `None` when the
    /// push is rejected: destination blocked, destination dead, a frozen 2x2
    /// block would form, or the successor provably cannot be solved.
    ///
    /// Pure: calling it twice on the same state gives the same answer and
    /// the state itself is never touched.
    pub fn try_push<H: Heuristic>(&self, mv: PushMove, heuristic: &H) -> Option<State> {
        let from = self.crate_pos(mv.crate_index());
        let to = from.step(mv.direction())?;
        let occ = self.occupancy();

        if self.level.is_wall(to) || occ.get(to) || self.level.is_dead_square(to) {
            return None;
        }

        let mut others = occ;
        others.clear(from);
        if self.frozen_block(to, &others) {
            return None;
        }

        let mut next = self.clone();
        next.player = from;
        if let Some(top) = next.top_reachable.take() {
            next.hash ^= ZOBRIST.player_zone(top);
        }
        next.crates[mv.crate_index().0 as usize] = to;
        next.hash ^= ZOBRIST.crate_cell(from);
        next.hash ^= ZOBRIST.crate_cell(to);
        next.heuristic = match heuristic.estimate(&next.crates) {
            Cost::Solvable(h) => h,
            Cost::Impossible => return None,
        };
        Some(next)
    }

    /// The classical two-crates-against-a-wall deadlock: the pushed crate at
    /// `to` next to another crate `p2`, with the flanking pair of cells on
    /// one side of them both blocked. The `others` board excludes the moved
    /// crate. Safe only when both crate cells are goals.
    fn frozen_block(&self, to: Position, others: &Bitboard) -> bool {
        for &nd in &ALL_DIRECTIONS {
            let Some(p2) = to.step(nd) else {
                continue;
            };
            if !others.get(p2) {
                continue;
            }
            if self.level.is_goal(to) && self.level.is_goal(p2) {
                continue;
            }
            for pd in [nd.next(), nd.prev()] {
                if self.blocked(to.step(pd), others) && self.blocked(p2.step(pd), others) {
                    return true;
                }
            }
        }
        false
    }

    fn blocked(&self, pos: Option<Position>, others: &Bitboard) -> bool {
        match pos {
            None => true,
            Some(pos) => self.level.is_wall(pos) || others.get(pos),
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("player", &self.player)
            .field("crates", &self.crates)
            .field("hash", &format_args!("{:016x}", self.hash))
            .field("heuristic", &self.heuristic)
            .field("top_reachable", &self.top_reachable)
            .finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level.render(self.player, &self.crates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristic::SimpleHeuristic;

    fn setup(text: &str) -> (State, SimpleHeuristic) {
        let lines: Vec<&str> = text.trim_matches('\n').lines().collect();
        let level = Rc::new(Level::from_lines("test", &lines).unwrap());
        let heuristic = SimpleHeuristic::new(level.clone());
        let state = State::initial(level, &heuristic).expect("level should be solvable");
        (state, heuristic)
    }

    fn hash_from_scratch(state: &State) -> u64 {
        let mut hash = 0u64;
        for &pos in state.crates() {
            hash ^= ZOBRIST.crate_cell(pos);
        }
        if let Some(top) = state.top_reachable() {
            hash ^= ZOBRIST.player_zone(top);
        }
        hash
    }

    #[test]
    fn test_compute_pushes_enumerates_sides() {
        let (mut state, _h) = setup(
            "####\n\
             # .#\n\
             #  ###\n\
             #*@  #\n\
             #  $ #\n\
             #  ###\n\
             ####",
        );
        let pushes = state.compute_pushes();
        let mut actual: Vec<PushMove> = pushes.iter().collect();
        actual.sort();
        // Every side the player can stand on is a candidate, even when the
        // destination is blocked; the evaluator filters those.
        let mut expected = vec![
            PushMove::new(CrateIndex(0), Direction::Up),
            PushMove::new(CrateIndex(0), Direction::Down),
            PushMove::new(CrateIndex(0), Direction::Left),
            PushMove::new(CrateIndex(1), Direction::Left),
            PushMove::new(CrateIndex(1), Direction::Right),
            PushMove::new(CrateIndex(1), Direction::Down),
        ];
        expected.sort();
        assert_eq!(actual, expected);
        assert_eq!(state.top_reachable(), Some(Position(1, 1)));
        assert_eq!(state.hash(), hash_from_scratch(&state));
    }

    #[test]
    fn test_player_maneuvers_hash_equal() {
        let text_a = "######\n\
                      #@   #\n\
                      # $. #\n\
                      #    #\n\
                      ######";
        let text_b = "######\n\
                      #    #\n\
                      # $. #\n\
                      #   @#\n\
                      ######";
        let (mut a, _) = setup(text_a);
        let (mut b, _) = setup(text_b);
        a.compute_pushes();
        b.compute_pushes();
        // Same crate layout, same player component: same normalized hash
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.top_reachable(), b.top_reachable());
    }

    #[test]
    fn test_try_push_moves_crate_and_player() {
        let (state, h) = setup(
            "####\n\
             #@$.#\n\
             ####",
        );
        let next = state
            .try_push(PushMove::new(CrateIndex(0), Direction::Right), &h)
            .expect("push onto the goal");
        assert_eq!(next.crate_pos(CrateIndex(0)), Position(1, 3));
        assert_eq!(next.player(), Position(1, 2));
        assert_eq!(next.top_reachable(), None);
        assert!(next.is_solved());
        assert_eq!(next.hash(), hash_from_scratch(&next));
    }

    #[test]
    fn test_try_push_is_pure() {
        let (mut state, h) = setup(
            "#####\n\
             #@$ .#\n\
             #####",
        );
        state.compute_pushes();
        let before_hash = state.hash();
        let before_crates: Vec<Position> = state.crates().to_vec();
        let mv = PushMove::new(CrateIndex(0), Direction::Right);

        let first = state.try_push(mv, &h).unwrap();
        let second = state.try_push(mv, &h).unwrap();
        assert_eq!(first.crates(), second.crates());
        assert_eq!(first.hash(), second.hash());
        assert_eq!(first.heuristic(), second.heuristic());
        assert_eq!(first.player(), second.player());

        // The input state is untouched
        assert_eq!(state.hash(), before_hash);
        assert_eq!(state.crates(), &before_crates[..]);
        assert_eq!(state.top_reachable(), Some(Position(1, 1)));
    }

    #[test]
    fn test_push_clears_zone_term_from_hash() {
        let (mut state, h) = setup(
            "#####\n\
             #@$ .#\n\
             #####",
        );
        state.compute_pushes();
        let mv = PushMove::new(CrateIndex(0), Direction::Right);
        let next = state.try_push(mv, &h).unwrap();
        // Successor has no zone term until its own flood fill runs
        assert_eq!(next.top_reachable(), None);
        assert_eq!(next.hash(), hash_from_scratch(&next));
    }

    #[test]
    fn test_try_push_rejects_blockers() {
        let (state, h) = setup(
            "#######\n\
             #@$$..#\n\
             #     #\n\
             #######",
        );
        // Into the other crate
        assert!(state
            .try_push(PushMove::new(CrateIndex(0), Direction::Right), &h)
            .is_none());
        // Into the wall
        assert!(state
            .try_push(PushMove::new(CrateIndex(0), Direction::Up), &h)
            .is_none());
    }

    #[test]
    fn test_try_push_rejects_dead_square() {
        let (state, h) = setup(
            "######\n\
             #@   #\n\
             # $  #\n\
             #  . #\n\
             ######",
        );
        // (2, 1) hugs the left wall on a goal-free line: dead
        assert!(state
            .try_push(PushMove::new(CrateIndex(0), Direction::Left), &h)
            .is_none());
        // Down to (3, 2) stays live, the goal is along that wall
        assert!(state
            .try_push(PushMove::new(CrateIndex(0), Direction::Down), &h)
            .is_some());
    }

    #[test]
    fn test_try_push_rejects_frozen_pair() {
        let (state, h) = setup(
            "#######\n\
             #@    #\n\
             # $   #\n\
             #  $..#\n\
             #######",
        );
        // Pushing crate 0 down puts it beside crate 1 with the bottom wall
        // under both: frozen, neither cell a goal
        assert!(state
            .try_push(PushMove::new(CrateIndex(0), Direction::Down), &h)
            .is_none());
        // Sideways stays legal
        assert!(state
            .try_push(PushMove::new(CrateIndex(0), Direction::Right), &h)
            .is_some());
    }

    #[test]
    fn test_frozen_pair_on_goals_is_safe() {
        let (state, h) = setup(
            "######\n\
             #@   #\n\
             # $  #\n\
             # .* #\n\
             ######",
        );
        // Both cells of the would-be 2x2 are goals: allowed, and it solves
        let next = state
            .try_push(PushMove::new(CrateIndex(0), Direction::Down), &h)
            .expect("goal pair is not a deadlock");
        assert!(next.is_solved());
    }

    #[test]
    fn test_push_set_dedupes() {
        let mut set = PushSet::new();
        set.add(CrateIndex(3), Direction::Left);
        set.add(CrateIndex(3), Direction::Left);
        assert_eq!(set.len(), 1);
        assert!(set.contains(PushMove::new(CrateIndex(3), Direction::Left)));
        assert!(!set.contains(PushMove::new(CrateIndex(3), Direction::Up)));
    }
}

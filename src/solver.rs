use crate::heuristic::Heuristic;
use crate::level::Level;
use crate::pqueue::PriorityQueue;
use crate::state::{PushMove, State};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::rc::Rc;
use tracing::debug;

/// Default cap on distinct states before a level is skipped.
pub const DEFAULT_MAX_SEARCH: usize = 300_000;

type Path = SmallVec<[PushMove; 32]>;

/// Outcome of one level's search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveResult {
    /// Push list reaching the solved position, already verified
    Solved(Vec<PushMove>),
    /// State budget exhausted; the level might still be solvable
    Cutoff,
    /// Search space drained: no solution exists
    Unsolvable,
}

#[derive(Debug, Clone, Copy)]
pub struct SolverOpts {
    pub max_search: usize,
}

impl Default for SolverOpts {
    fn default() -> Self {
        SolverOpts {
            max_search: DEFAULT_MAX_SEARCH,
        }
    }
}

struct Node {
    state: State,
    path: Path,
}

/// A* over push moves: priority is pushes-so-far plus the heuristic, the
/// visited set keys on the zone-normalized Zobrist hash, and forced chains
/// through walled-in articulation cells collapse into one enqueue.
pub struct Solver<H: Heuristic> {
    level: Rc<Level>,
    heuristic: H,
    max_search: usize,
    visited: FxHashSet<u64>,
    expanded: usize,
}

impl<H: Heuristic> Solver<H> {
    pub fn new(level: Rc<Level>, heuristic: H, opts: SolverOpts) -> Self {
        Solver {
            level,
            heuristic,
            max_search: opts.max_search,
            visited: FxHashSet::default(),
            expanded: 0,
        }
    }

    /// Number of states actually expanded (popped, normalized, and found
    /// unvisited).
    pub fn expanded(&self) -> usize {
        self.expanded
    }

    pub fn solve(&mut self) -> SolveResult {
        let Some(root) = State::initial(self.level.clone(), &self.heuristic) else {
            // Some crate can never reach any goal
            return SolveResult::Unsolvable;
        };

        let mut queue: PriorityQueue<Node> = PriorityQueue::new();
        queue.push(
            root.heuristic() as usize,
            Node {
                state: root,
                path: Path::new(),
            },
        );

        loop {
            if self.visited.len() > self.max_search {
                debug!(
                    level = self.level.name(),
                    visited = self.visited.len(),
                    "state budget exhausted"
                );
                return SolveResult::Cutoff;
            }
            let Some(Node { mut state, path }) = queue.pop_min() else {
                break;
            };

            if state.is_solved() {
                self.verify(&path);
                return SolveResult::Solved(path.into_vec());
            }

            // Normalizing the player zone happens before the visited check,
            // so equal layouts reached by different maneuvers merge here.
            let pushes = state.compute_pushes();
            if !self.visited.insert(state.hash()) {
                continue;
            }
            self.expanded += 1;

            for mv in pushes.iter() {
                let Some(mut succ) = state.try_push(mv, &self.heuristic) else {
                    continue;
                };
                let mut chain: SmallVec<[PushMove; 8]> = SmallVec::new();
                chain.push(mv);
                self.compress_cut_chain(mv, &mut succ, &mut chain);

                let mut next_path = path.clone();
                next_path.extend_from_slice(&chain);
                let f = next_path.len() + succ.heuristic() as usize;
                queue.push(
                    f,
                    Node {
                        state: succ,
                        path: next_path,
                    },
                );
            }
        }

        debug!(
            level = self.level.name(),
            visited = self.visited.len(),
            "search space drained"
        );
        SolveResult::Unsolvable
    }

    /// While the pushed crate sits on a non-goal articulation cell, walled
    /// in perpendicular to the push, with the push direction tagged toward a
    /// goal, it can only ever continue forward. Apply those forced pushes
    /// now instead of enqueueing each corridor cell separately.
    fn compress_cut_chain(
        &self,
        mv: PushMove,
        succ: &mut State,
        chain: &mut SmallVec<[PushMove; 8]>,
    ) {
        let dir = mv.direction();
        loop {
            let cell = succ.crate_pos(mv.crate_index());
            if self.level.is_goal(cell) {
                break;
            }
            let Some(goal_dirs) = self.level.cut_dirs(cell) else {
                break;
            };
            if !goal_dirs.contains(dir)
                || !self.level.wall_at(cell, dir.next())
                || !self.level.wall_at(cell, dir.prev())
            {
                break;
            }
            match succ.try_push(mv, &self.heuristic) {
                Some(next) => {
                    *succ = next;
                    chain.push(mv);
                }
                None => break,
            }
        }
    }

    /// Replay the solution from the initial state. Any rejected push or a
    /// non-solved terminal state is an internal bug, not a user error.
    fn verify(&self, path: &[PushMove]) {
        let mut state = State::initial(self.level.clone(), &self.heuristic)
            .expect("verification: initial state was solvable when search began");
        for (i, &mv) in path.iter().enumerate() {
            let pushes = state.compute_pushes();
            assert!(
                pushes.contains(mv),
                "verification failed: push {} of {} ({}) is not executable",
                i + 1,
                path.len(),
                mv
            );
            state = state.try_push(mv, &self.heuristic).unwrap_or_else(|| {
                panic!(
                    "verification failed: push {} of {} ({}) was rejected",
                    i + 1,
                    path.len(),
                    mv
                )
            });
        }
        assert!(
            state.is_solved(),
            "verification failed: not solved after {} pushes",
            path.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Direction;
    use crate::heuristic::{HungarianHeuristic, SimpleHeuristic};
    use crate::state::CrateIndex;

    fn level(text: &str) -> Rc<Level> {
        let lines: Vec<&str> = text.trim_matches('\n').lines().collect();
        Rc::new(Level::from_lines("test", &lines).unwrap())
    }

    fn solve_simple(text: &str, opts: SolverOpts) -> (SolveResult, usize) {
        let level = level(text);
        let heuristic = SimpleHeuristic::new(level.clone());
        let mut solver = Solver::new(level, heuristic, opts);
        let result = solver.solve();
        (result, solver.expanded())
    }

    #[test]
    fn test_single_push() {
        let (result, _) = solve_simple(
            "#####\n\
             #@$.#\n\
             #####",
            SolverOpts::default(),
        );
        assert_eq!(
            result,
            SolveResult::Solved(vec![PushMove::new(CrateIndex(0), Direction::Right)])
        );
    }

    #[test]
    fn test_already_solved() {
        let (result, _) = solve_simple(
            "####\n\
             #@*#\n\
             ####",
            SolverOpts::default(),
        );
        assert_eq!(result, SolveResult::Solved(vec![]));
    }

    #[test]
    fn test_two_pushes() {
        let (result, _) = solve_simple(
            "######\n\
             #@$ .#\n\
             ######",
            SolverOpts::default(),
        );
        let SolveResult::Solved(path) = result else {
            panic!("expected a solution");
        };
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_unsolvable_level() {
        // The goal is walled off: the initial heuristic already knows
        let (result, expanded) = solve_simple(
            "######\n\
             #@$#.#\n\
             ######",
            SolverOpts::default(),
        );
        assert_eq!(result, SolveResult::Unsolvable);
        assert_eq!(expanded, 0);
    }

    #[test]
    fn test_corner_routes_around_dead_square() {
        // Pushing into the corner is pruned; the solver must take the
        // two-push route along the goal wall
        let (result, _) = solve_simple(
            "######\n\
             #@   #\n\
             # $  #\n\
             #  . #\n\
             ######",
            SolverOpts::default(),
        );
        let SolveResult::Solved(path) = result else {
            panic!("expected a solution");
        };
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_corridor_macro_compression() {
        // One enqueue carries the crate down the whole corridor
        let (result, expanded) = solve_simple(
            "########\n\
             #@$   .#\n\
             ########",
            SolverOpts::default(),
        );
        assert_eq!(
            result,
            SolveResult::Solved(vec![
                PushMove::new(CrateIndex(0), Direction::Right);
                4
            ])
        );
        // Only the initial state is ever expanded
        assert_eq!(expanded, 1);
    }

    #[test]
    fn test_budget_exhaustion_is_cutoff() {
        let text = "########\n\
                    #@ $  .#\n\
                    #      #\n\
                    #  $  .#\n\
                    ########";
        let (result, _) = solve_simple(text, SolverOpts { max_search: 1 });
        assert_eq!(result, SolveResult::Cutoff);
        // The same level solves with a real budget
        let (result, _) = solve_simple(text, SolverOpts::default());
        assert!(matches!(result, SolveResult::Solved(_)));
    }

    #[test]
    fn test_hungarian_expands_fewer_states() {
        // Both crates are nearest the left goal, so the simple bound
        // undercounts and the search wanders; the matching bound is exact
        let text = "#############\n\
                    #. $ $ @   .#\n\
                    #           #\n\
                    #############";

        let lv = level(text);
        let mut simple = Solver::new(
            lv.clone(),
            SimpleHeuristic::new(lv.clone()),
            SolverOpts::default(),
        );
        let simple_result = simple.solve();
        assert!(matches!(simple_result, SolveResult::Solved(_)));

        let lv2 = level(text);
        let mut hungarian = Solver::new(
            lv2.clone(),
            HungarianHeuristic::new(lv2),
            SolverOpts::default(),
        );
        let hungarian_result = hungarian.solve();
        assert!(matches!(hungarian_result, SolveResult::Solved(_)));

        assert!(
            hungarian.expanded() < simple.expanded(),
            "hungarian {} should beat simple {}",
            hungarian.expanded(),
            simple.expanded()
        );
    }

    #[test]
    fn test_solutions_replay_to_solved() {
        let texts = [
            "#####\n\
             #@$.#\n\
             #####",
            "######\n\
             #@   #\n\
             # $  #\n\
             #  . #\n\
             ######",
            "########\n\
             #@ $  .#\n\
             #      #\n\
             #  $  .#\n\
             ########",
        ];
        for text in texts {
            let lv = level(text);
            let heuristic = SimpleHeuristic::new(lv.clone());
            let mut solver = Solver::new(lv.clone(), heuristic, SolverOpts::default());
            let SolveResult::Solved(path) = solver.solve() else {
                panic!("expected a solution");
            };
            // Independent replay, not through the solver's verifier
            let h = SimpleHeuristic::new(lv.clone());
            let mut state = State::initial(lv, &h).unwrap();
            for &mv in &path {
                state = state.try_push(mv, &h).expect("replayed push");
            }
            assert!(state.is_solved());
        }
    }

    #[test]
    fn test_heuristic_admissible_along_solution() {
        let text = "########\n\
                    #@ $  .#\n\
                    #      #\n\
                    #  $  .#\n\
                    ########";
        let lv = level(text);
        let heuristic = SimpleHeuristic::new(lv.clone());
        let mut solver = Solver::new(lv.clone(), heuristic, SolverOpts::default());
        let SolveResult::Solved(path) = solver.solve() else {
            panic!("expected a solution");
        };
        // A* with an admissible bound returns a push-optimal path, so the
        // remaining length is the true distance at every step
        let h = SimpleHeuristic::new(lv.clone());
        let mut state = State::initial(lv, &h).unwrap();
        for (done, &mv) in path.iter().enumerate() {
            let remaining = path.len() - done;
            assert!(
                (state.heuristic() as usize) <= remaining,
                "heuristic {} overestimates remaining {}",
                state.heuristic(),
                remaining
            );
            state = state.try_push(mv, &h).expect("replayed push");
        }
        assert_eq!(state.heuristic(), 0);
    }
}

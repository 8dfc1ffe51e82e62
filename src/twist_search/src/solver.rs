use crate::{
    canonical_fsm::{CanonicalFSMState, GeneratingSet},
    config::SolverConfig,
    pruning::{PruningTable, PruningTables, UNREACHABLE},
    puzzle::{AuxMem, DefinitionError, Move, PuzzleDef, PuzzleState, state_len},
    puzzle_state_history::PuzzleStateHistory,
    start, success,
    work_chunks::{ChunkReduction, WorkChunk, make_work_chunks},
    working,
};
use itertools::Itertools;
use log::{debug, info};
use serde::Deserialize;
use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use thiserror::Error;

/// How often, in nodes, a worker looks at the clock.
const CLOCK_POLL_INTERVAL: u64 = 4096;

pub struct Solver {
    puzzle_def: PuzzleDef,
    pruning_table: PruningTables,
    generating_set: GeneratingSet,
    config: SolverConfig,
    cancellation: Cancellation,
}

/// Which solution wins when several chunks of the same bound find one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The solution in the chunk with the lowest index, which is the first
    /// solution a single threaded depth first search would find. Results do
    /// not depend on the thread count or dispatch order.
    #[default]
    LowestChunkIndex,
    /// Whichever solution is reported first.
    FirstFound,
}

/// A handle that stops a running search from another thread. Once cancelled,
/// every later search is cancelled too until `reset` is called.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub move_indices: Vec<usize>,
    pub cost: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Solved(Solution),
    /// No solution exists within the searched bounds. `searched_up_to` is the
    /// largest cost ruled out, or `None` if no goal can be reached at all.
    Unsolvable { searched_up_to: Option<u8> },
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("The start state is not a valid state of this puzzle")]
    InvalidStartState,
}

/// The return type of the IDA* recursion function. It maintains the
/// soft-invariant that zero means a solution has been found, hence
/// `AdmissibleGoalHeuristic::SOLVED`.
#[derive(PartialEq, Copy, Clone)]
struct AdmissibleGoalHeuristic(u8);

impl AdmissibleGoalHeuristic {
    const SOLVED: Self = Self(0);
}

/// State shared by every worker of one bound.
struct SharedSearch {
    /// The lowest index of a chunk that has reported a solution.
    cutoff: AtomicUsize,
    winner: Mutex<Option<(usize, Vec<usize>)>>,
    nodes_visited: AtomicU64,
    timed_out: AtomicBool,
    deadline: Option<Instant>,
}

/// Per worker scratch space.
struct Worker<'a> {
    shared: &'a SharedSearch,
    puzzle_state_history: PuzzleStateHistory,
    aux_mem: AuxMem,
    chunk_index: usize,
    nodes_visited: u64,
    stop: bool,
}

impl Cancellation {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Solution {
    /// The moves of the solution, in order.
    #[must_use]
    pub fn moves<'a>(&self, puzzle_def: &'a PuzzleDef) -> Vec<&'a Move> {
        self.move_indices
            .iter()
            .map(|&move_index| &puzzle_def.moves[move_index])
            .collect()
    }

    #[must_use]
    pub fn to_string_with(&self, puzzle_def: &PuzzleDef) -> String {
        self.moves(puzzle_def)
            .into_iter()
            .map(Move::name)
            .join(" ")
    }
}

impl Solver {
    /// Prepare a solver. The pruning table must have been built for
    /// `puzzle_def`.
    ///
    /// # Errors
    ///
    /// If the canonical FSM cannot be built, or if `symmetric_chunks` is set
    /// but the puzzle's symmetries do not preserve its moves and goals.
    pub fn new(
        puzzle_def: PuzzleDef,
        pruning_table: PruningTables,
        config: SolverConfig,
    ) -> Result<Self, DefinitionError> {
        let generating_set = GeneratingSet::try_from(&puzzle_def)?;
        if config.symmetric_chunks {
            puzzle_def.symmetry_group().check_preserves(&puzzle_def)?;
        }
        debug!(
            "The canonical FSM for {} has {} states",
            puzzle_def.name,
            generating_set.num_states()
        );
        Ok(Self {
            puzzle_def,
            pruning_table,
            generating_set,
            config,
            cancellation: Cancellation::default(),
        })
    }

    #[must_use]
    pub fn puzzle_def(&self) -> &PuzzleDef {
        &self.puzzle_def
    }

    #[must_use]
    pub fn pruning_table(&self) -> &PruningTables {
        &self.pruning_table
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// A handle to cancel searches of this solver.
    #[must_use]
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    pub fn into_puzzle_def_and_pruning_table(self) -> (PuzzleDef, PruningTables) {
        (self.puzzle_def, self.pruning_table)
    }

    fn should_stop(&self, worker: &mut Worker) -> bool {
        if worker.stop {
            return true;
        }
        let cutoff = worker.shared.cutoff.load(Ordering::Relaxed);
        let abandoned = match self.config.tie_break {
            TieBreak::LowestChunkIndex => cutoff < worker.chunk_index,
            TieBreak::FirstFound => cutoff != usize::MAX,
        };
        if abandoned
            || self.cancellation.is_cancelled()
            || worker.shared.timed_out.load(Ordering::Relaxed)
        {
            worker.stop = true;
        } else if let Some(deadline) = worker.shared.deadline
            && worker.nodes_visited % CLOCK_POLL_INTERVAL == 0
            && Instant::now() >= deadline
        {
            worker.shared.timed_out.store(true, Ordering::Relaxed);
            worker.stop = true;
        }
        worker.stop
    }

    /// Depth first search for a goal at a cost of exactly `permitted_cost`
    /// below the last state of the worker's history. We reduce the branching
    /// factor with the canonical FSM and use pathmax to prune nodes with large
    /// child pruning values.
    ///
    /// The return value is an admissible goal heuristic. That is, it is a
    /// lower bound on the cost required to reach a goal from the exact node.
    /// When this lower bound is equal to zero, that means the node is a
    /// solution and the history holds the moves to it.
    fn search_for_solution(
        &self,
        worker: &mut Worker,
        fsm_state: CanonicalFSMState,
        permitted_cost: u8,
    ) -> AdmissibleGoalHeuristic {
        let last_puzzle_state = worker.puzzle_state_history.last_state();
        let admissible_prune_cost = self
            .pruning_table
            .admissible_heuristic(last_puzzle_state, &mut worker.aux_mem);
        debug_assert!(admissible_prune_cost == 0 || !self.puzzle_def.is_goal(last_puzzle_state));
        if admissible_prune_cost > permitted_cost {
            return AdmissibleGoalHeuristic(admissible_prune_cost);
        }
        if permitted_cost == 0 {
            return if self.puzzle_def.is_goal(last_puzzle_state) {
                AdmissibleGoalHeuristic::SOLVED
            } else {
                // If this node resulted in no solution, then we are at least
                // one step away from a solution
                AdmissibleGoalHeuristic(1)
            };
        }

        worker.nodes_visited += 1;
        if self.should_stop(worker) {
            return AdmissibleGoalHeuristic(permitted_cost + 1);
        }

        for (move_index, move_, next_fsm_state) in self
            .generating_set
            .legal_moves(&self.puzzle_def, fsm_state)
        {
            if move_.cost() > permitted_cost {
                continue;
            }
            worker
                .puzzle_state_history
                .push_stack(move_index, &self.puzzle_def);
            let child_admissible_goal_heuristic =
                self.search_for_solution(worker, next_fsm_state, permitted_cost - move_.cost());
            if child_admissible_goal_heuristic == AdmissibleGoalHeuristic::SOLVED {
                // Leave the history in place so the caller can read the moves
                return AdmissibleGoalHeuristic::SOLVED;
            }
            worker.puzzle_state_history.pop_stack();
            if worker.stop {
                return AdmissibleGoalHeuristic(permitted_cost + 1);
            }

            // Pathmax optimization. The parent is at most `move_.cost()`
            // closer to a goal than the child, so a child bound that exceeds
            // the permitted cost by more than that prunes the parent too.
            // Moves are invertible at the same cost, which makes this
            // admissible.
            if u16::from(child_admissible_goal_heuristic.0)
                > u16::from(permitted_cost) + u16::from(move_.cost())
            {
                return AdmissibleGoalHeuristic(
                    child_admissible_goal_heuristic.0 - move_.cost(),
                );
            }
        }
        AdmissibleGoalHeuristic(
            // This optimizes to branchless code
            if admissible_prune_cost == 0 {
                // If this node resulted in no solution, then we are at least
                // one step away from a solution
                1
            } else {
                admissible_prune_cost
            },
        )
    }

    fn search_chunk(&self, worker: &mut Worker, chunk: &WorkChunk) {
        worker.chunk_index = chunk.index;
        worker.stop = false;
        if self.should_stop(worker) {
            return;
        }
        worker.puzzle_state_history.reset(&chunk.state);
        worker
            .puzzle_state_history
            .resize_if_needed(chunk.remaining as usize);
        let result = self.search_for_solution(worker, chunk.fsm_state, chunk.remaining);
        if result != AdmissibleGoalHeuristic::SOLVED {
            return;
        }

        let mut moves = chunk.moves.clone();
        moves.extend(worker.puzzle_state_history.create_move_history());
        let mut winner = worker
            .shared
            .winner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let replace = match (&*winner, self.config.tie_break) {
            (None, _) => true,
            (Some((winner_index, _)), TieBreak::LowestChunkIndex) => chunk.index < *winner_index,
            (Some(_), TieBreak::FirstFound) => false,
        };
        if replace {
            *winner = Some((chunk.index, moves));
        }
        worker.shared.cutoff.fetch_min(chunk.index, Ordering::Relaxed);
    }

    /// Search every chunk of one bound on the worker pool.
    fn search_bound(&self, chunks: Vec<WorkChunk>, shared: &SharedSearch) {
        let threads = self.config.threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded();
        for chunk in chunks {
            // The receiver outlives this loop
            let _ = sender.send(chunk);
        }
        drop(sender);

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let receiver = receiver.clone();
                scope.spawn(move || {
                    let mut worker = Worker {
                        shared,
                        puzzle_state_history: PuzzleStateHistory::new(
                            &self.puzzle_def.new_solved_state(),
                        ),
                        aux_mem: self.puzzle_def.new_aux_mem(),
                        chunk_index: 0,
                        nodes_visited: 0,
                        stop: false,
                    };
                    while let Ok(chunk) = receiver.recv() {
                        self.search_chunk(&mut worker, &chunk);
                    }
                    shared
                        .nodes_visited
                        .fetch_add(worker.nodes_visited, Ordering::Relaxed);
                });
            }
        });
    }

    /// Find a cheapest move sequence from `puzzle_state` to a goal with
    /// iterative deepening, searching each bound in parallel.
    ///
    /// # Errors
    ///
    /// If `puzzle_state` is not a state of this puzzle.
    pub fn solve(&self, puzzle_state: &PuzzleState) -> Result<SearchOutcome, SolverError> {
        if puzzle_state.as_bytes().len() != state_len(&self.puzzle_def.sorted_orbit_defs)
            || !puzzle_state.is_well_formed(&self.puzzle_def.sorted_orbit_defs)
        {
            return Err(SolverError::InvalidStartState);
        }

        info!(start!("Searching for a solution of {}"), self.puzzle_def.name);
        let start = Instant::now();
        let deadline = self
            .config
            .time_limit_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok())
            .and_then(|time_limit| start.checked_add(time_limit));
        let chunk_reduction = if self.config.symmetric_chunks {
            ChunkReduction::Symmetry(self.puzzle_def.symmetry_group())
        } else {
            ChunkReduction::None
        };
        let max_bound = self.config.max_bound.min(UNREACHABLE - 1);

        let mut aux_mem = self.puzzle_def.new_aux_mem();
        let mut bound = self
            .pruning_table
            .admissible_heuristic(puzzle_state, &mut aux_mem);
        if bound == UNREACHABLE {
            info!(success!("The pruning table proves that no solution exists"));
            return Ok(SearchOutcome::Unsolvable {
                searched_up_to: None,
            });
        }

        loop {
            if self.cancellation.is_cancelled() {
                return Ok(SearchOutcome::Cancelled);
            }
            if bound > max_bound {
                info!(
                    success!("No solution exists up to cost {} ({:.3}s)"),
                    bound - 1,
                    start.elapsed().as_secs_f64()
                );
                return Ok(SearchOutcome::Unsolvable {
                    searched_up_to: bound.checked_sub(1),
                });
            }

            debug!(working!("Searching depth {}..."), bound);
            let depth_start = Instant::now();
            let mut chunks = make_work_chunks(
                &self.puzzle_def,
                &self.generating_set,
                puzzle_state,
                bound,
                chunk_reduction,
                self.config.parallelism_hint(),
            );
            let num_chunks = chunks.len();
            if self.config.random_start {
                fastrand::shuffle(&mut chunks);
            }
            let shared = SharedSearch {
                cutoff: AtomicUsize::new(usize::MAX),
                winner: Mutex::new(None),
                nodes_visited: AtomicU64::new(0),
                timed_out: AtomicBool::new(false),
                deadline,
            };
            self.search_bound(chunks, &shared);
            debug!(
                working!("Traversed {} nodes in {} chunks in {:.3}s"),
                shared.nodes_visited.load(Ordering::Relaxed),
                num_chunks,
                depth_start.elapsed().as_secs_f64()
            );

            let winner = shared
                .winner
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some((_, move_indices)) = winner {
                debug_assert!(
                    self.puzzle_def
                        .is_goal(&self.puzzle_def.apply_move_indices(puzzle_state, &move_indices))
                );
                info!(
                    success!("Solution found in {:.3}s at depth {}"),
                    start.elapsed().as_secs_f64(),
                    bound
                );
                return Ok(SearchOutcome::Solved(Solution {
                    move_indices,
                    cost: bound,
                }));
            }
            if self.cancellation.is_cancelled() || shared.timed_out.load(Ordering::Relaxed) {
                info!("Search cancelled at depth {}", bound);
                return Ok(SearchOutcome::Cancelled);
            }
            bound += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pruning::{ExactTable, PruneTableOptions, ZeroTable},
        puzzle::{DefinitionOptions, apply_moves},
    };
    use ksolve::puzzles::KPUZZLE_2X2;

    fn cube2_solver(config: SolverConfig) -> Solver {
        let cube2_def = PuzzleDef::new(&KPUZZLE_2X2, &DefinitionOptions::default()).unwrap();
        let table =
            ExactTable::generate(&cube2_def, &PruneTableOptions::default().with_max_depth(4))
                .unwrap();
        Solver::new(cube2_def, table.into(), config).unwrap()
    }

    #[test_log::test]
    fn test_solved_start() {
        let solver = cube2_solver(SolverConfig::default());
        let solved = solver.puzzle_def().new_solved_state();
        assert_eq!(
            solver.solve(&solved).unwrap(),
            SearchOutcome::Solved(Solution {
                move_indices: vec![],
                cost: 0
            })
        );
    }

    #[test_log::test]
    fn test_short_scramble() {
        let solver = cube2_solver(SolverConfig::default().with_threads(2));
        let cube2_def = solver.puzzle_def();
        let scramble = apply_moves(cube2_def, &cube2_def.new_solved_state(), "R U2 F'", 1);
        let SearchOutcome::Solved(solution) = solver.solve(&scramble).unwrap() else {
            panic!("expected a solution");
        };
        assert_eq!(solution.cost, 3);
        assert_eq!(solution.move_indices.len(), 3);
        let solved = cube2_def.apply_move_indices(&scramble, &solution.move_indices);
        assert!(cube2_def.is_goal(&solved));
    }

    #[test_log::test]
    fn test_zero_table_still_finds_optimal() {
        let cube2_def = PuzzleDef::new(&KPUZZLE_2X2, &DefinitionOptions::default()).unwrap();
        let scramble = apply_moves(&cube2_def, &cube2_def.new_solved_state(), "R U", 1);
        let solver =
            Solver::new(cube2_def, ZeroTable.into(), SolverConfig::default().with_threads(2))
                .unwrap();
        let SearchOutcome::Solved(solution) = solver.solve(&scramble).unwrap() else {
            panic!("expected a solution");
        };
        assert_eq!(solution.to_string_with(solver.puzzle_def()), "U' R'");
    }

    #[test_log::test]
    fn test_max_bound() {
        let solver = cube2_solver(SolverConfig::default().with_max_bound(2));
        let cube2_def = solver.puzzle_def();
        let scramble = apply_moves(cube2_def, &cube2_def.new_solved_state(), "R U F", 1);
        assert_eq!(
            solver.solve(&scramble).unwrap(),
            SearchOutcome::Unsolvable {
                searched_up_to: Some(2)
            }
        );
    }

    #[test_log::test]
    fn test_rejects_malformed_start() {
        let solver = cube2_solver(SolverConfig::default());
        let mut bytes = solver.puzzle_def().new_solved_state().as_bytes().to_vec();
        bytes[0] = 1;
        let malformed = PuzzleState::from_bytes(bytes.into_boxed_slice());
        assert!(matches!(
            solver.solve(&malformed),
            Err(SolverError::InvalidStartState)
        ));
        let too_short = PuzzleState::from_bytes(vec![0; 3].into_boxed_slice());
        assert!(matches!(
            solver.solve(&too_short),
            Err(SolverError::InvalidStartState)
        ));
    }

    #[test_log::test]
    fn test_cancelled_before_start() {
        let solver = cube2_solver(SolverConfig::default());
        let cube2_def = solver.puzzle_def();
        let scramble = apply_moves(cube2_def, &cube2_def.new_solved_state(), "R U F", 1);
        let cancellation = solver.cancellation();
        cancellation.cancel();
        assert_eq!(solver.solve(&scramble).unwrap(), SearchOutcome::Cancelled);
        cancellation.reset();
        assert!(matches!(
            solver.solve(&scramble).unwrap(),
            SearchOutcome::Solved(_)
        ));
    }
}

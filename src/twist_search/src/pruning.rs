//! Admissible heuristics for IDA* search.

use crate::{
    puzzle::{AuxMem, DefinitionError, OrbitDef, PuzzleDef, PuzzleState},
    start, success,
    symmetry::SymmetryGroup,
    working,
};
use arena::StateArena;
use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::{ThreadPoolBuilder, prelude::*};
use serde::Deserialize;
use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

mod arena;
mod persistence;

pub use persistence::PruneTableLoadError;

/// The heuristic value of a state that provably cannot reach any goal.
pub const UNREACHABLE: u8 = u8::MAX;

/// Frontiers smaller than this are expanded on the calling thread.
const MIN_PARALLEL_FRONTIER: usize = 1024;

#[enum_dispatch]
pub trait PruningTable {
    /// A lower bound on the cost of reaching a goal from `puzzle_state`, or
    /// `UNREACHABLE` if no goal can be reached. Zero on every goal.
    fn admissible_heuristic(&self, puzzle_state: &PuzzleState, aux_mem: &mut AuxMem) -> u8;
}

/// The trivial heuristic.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroTable;

/// A table of exact distances to the goals up to a build depth.
pub struct ExactTable {
    arena: StateArena,
    distances: Vec<u8>,
    depth: u8,
    complete: bool,
    symmetry_reduction: bool,
    sorted_orbit_defs: Box<[OrbitDef]>,
    symmetry_group: SymmetryGroup,
    fingerprint: u64,
    build_report: PruneTableBuildReport,
}

#[enum_dispatch(PruningTable)]
pub enum PruningTables {
    ZeroTable,
    ExactTable,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PruneTableOptions {
    /// Distances below this depth are stored exactly.
    pub max_depth: u8,
    pub memory_budget_bytes: usize,
    pub symmetry_reduction: bool,
    pub threads: usize,
}

#[derive(Debug, Clone)]
pub struct PruneTableBuildReport {
    pub entries: usize,
    pub effective_depth: u8,
    pub complete: bool,
    pub truncated: bool,
    pub memory_bytes: usize,
    pub elapsed: Duration,
}

/// States discovered by expanding one slice of a frontier, flattened so that
/// nothing is allocated per state.
struct Expansion {
    keys: Vec<u8>,
    distances: Vec<u8>,
    skipped_beyond_depth: bool,
}

pub(crate) fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

impl Default for PruneTableOptions {
    fn default() -> Self {
        Self {
            max_depth: 8,
            memory_budget_bytes: 1 << 30,
            symmetry_reduction: false,
            threads: default_threads(),
        }
    }
}

impl PruneTableOptions {
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_memory_budget_bytes(mut self, memory_budget_bytes: usize) -> Self {
        self.memory_budget_bytes = memory_budget_bytes;
        self
    }

    #[must_use]
    pub fn with_symmetry_reduction(mut self, symmetry_reduction: bool) -> Self {
        self.symmetry_reduction = symmetry_reduction;
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

impl PruningTable for ZeroTable {
    fn admissible_heuristic(&self, _puzzle_state: &PuzzleState, _aux_mem: &mut AuxMem) -> u8 {
        0
    }
}

impl PruningTable for ExactTable {
    fn admissible_heuristic(&self, puzzle_state: &PuzzleState, aux_mem: &mut AuxMem) -> u8 {
        let key = self.canonical_key(puzzle_state, aux_mem);
        match self.arena.find(key) {
            Some(entry) => self.distances[entry].min(self.depth),
            None if self.complete => UNREACHABLE,
            None => self.depth,
        }
    }
}

impl ExactTable {
    fn empty(puzzle_def: &PuzzleDef, depth: u8, symmetry_reduction: bool) -> Self {
        Self {
            arena: StateArena::new(puzzle_def.new_solved_state().as_bytes().len()),
            distances: vec![],
            depth,
            complete: false,
            symmetry_reduction,
            sorted_orbit_defs: puzzle_def.sorted_orbit_defs.clone(),
            symmetry_group: puzzle_def.symmetry_group().clone(),
            fingerprint: puzzle_def.fingerprint(),
            build_report: PruneTableBuildReport {
                entries: 0,
                effective_depth: depth,
                complete: false,
                truncated: false,
                memory_bytes: 0,
                elapsed: Duration::ZERO,
            },
        }
    }

    /// Bytes used by the keys, the index and the distances.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes() + self.distances.len()
    }

    fn memory_bytes_after_insert(&self) -> usize {
        self.arena.memory_bytes_after_insert() + self.distances.len() + 1
    }

    /// The depth below which stored distances are exact. States missing from
    /// an incomplete table are at least this far from every goal.
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Whether every state that can reach a goal is in the table.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn symmetry_reduction(&self) -> bool {
        self.symmetry_reduction
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    #[must_use]
    pub fn build_report(&self) -> &PruneTableBuildReport {
        &self.build_report
    }

    fn canonical_key<'a>(
        &self,
        puzzle_state: &'a PuzzleState,
        aux_mem: &'a mut AuxMem,
    ) -> &'a [u8] {
        if self.symmetry_reduction {
            self.symmetry_group.canonicalize_into(
                puzzle_state,
                &mut aux_mem.canonical,
                &mut aux_mem.scratch,
                &self.sorted_orbit_defs,
            );
            aux_mem.canonical.as_bytes()
        } else {
            puzzle_state.as_bytes()
        }
    }

    /// Expand `frontier`, every entry of which is at `depth`, into the
    /// predecessors of its states that are not already known at an equal or
    /// smaller distance.
    fn expand(
        &self,
        puzzle_def: &PuzzleDef,
        frontier: &[u32],
        depth: u8,
        max_depth: u8,
    ) -> Expansion {
        let mut expansion = Expansion {
            keys: vec![],
            distances: vec![],
            skipped_beyond_depth: false,
        };
        let mut aux_mem = puzzle_def.new_aux_mem();
        let mut current = puzzle_def.new_solved_state();
        let mut predecessor = puzzle_def.new_solved_state();
        for &entry in frontier {
            current.copy_from_bytes(self.arena.key(entry as usize));
            for move_ in &puzzle_def.moves {
                let next_distance = u16::from(depth) + u16::from(move_.cost());
                if next_distance >= u16::from(max_depth) {
                    expansion.skipped_beyond_depth = true;
                    continue;
                }
                // Checked above
                #[allow(clippy::cast_possible_truncation)]
                let next_distance = next_distance as u8;
                // `t ∘ m⁻¹` reaches `t` by making `m`
                predecessor.replace_compose(
                    &current,
                    puzzle_def.moves[move_.inverse_index()].puzzle_state(),
                    &puzzle_def.sorted_orbit_defs,
                );
                let key = self.canonical_key(&predecessor, &mut aux_mem);
                if let Some(known) = self.arena.find(key)
                    && self.distances[known] <= next_distance
                {
                    continue;
                }
                expansion.keys.extend_from_slice(key);
                expansion.distances.push(next_distance);
            }
        }
        expansion
    }

    /// Generate a pruning table with a bucketed breadth first search from the
    /// goal states. Layers are expanded in parallel and merged in frontier
    /// order, so the result does not depend on the thread count.
    ///
    /// # Errors
    ///
    /// If symmetry reduction is requested but the symmetries do not preserve
    /// the moves and goals.
    pub fn generate(
        puzzle_def: &PuzzleDef,
        options: &PruneTableOptions,
    ) -> Result<Self, DefinitionError> {
        let max_depth = options.max_depth.min(UNREACHABLE - 1);
        info!(
            start!("Generating the pruning table for {} to depth {}"),
            puzzle_def.name, max_depth
        );
        let start = Instant::now();
        if options.symmetry_reduction {
            puzzle_def.symmetry_group().check_preserves(puzzle_def)?;
        }
        let threads = options.threads.max(1);
        let pool = if threads == 1 {
            None
        } else {
            match ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Could not start {threads} table threads, expanding serially: {e}");
                    None
                }
            }
        };

        let mut table = Self::empty(puzzle_def, max_depth, options.symmetry_reduction);
        let mut buckets: Vec<Vec<u32>> = vec![vec![]; max_depth as usize];
        let mut skipped_beyond_depth = max_depth == 0;
        // The depth up to which the table stays exact if the budget runs out
        let mut truncated_depth = None;

        let mut aux_mem = puzzle_def.new_aux_mem();
        if max_depth > 0 {
            for goal in puzzle_def.goals() {
                if table.memory_bytes_after_insert() > options.memory_budget_bytes {
                    truncated_depth = Some(0);
                    break;
                }
                let key = table.canonical_key(goal, &mut aux_mem).to_vec();
                let (entry, inserted) = table.arena.insert(&key);
                if inserted {
                    table.distances.push(0);
                    #[allow(clippy::cast_possible_truncation)]
                    buckets[0].push(entry as u32);
                }
            }
        }

        'layers: for depth in 0..max_depth {
            if truncated_depth.is_some() {
                break;
            }
            let layer_start = Instant::now();
            let frontier = std::mem::take(&mut buckets[depth as usize])
                .into_iter()
                // Entries whose distance decreased after they were bucketed
                .filter(|&entry| table.distances[entry as usize] == depth)
                .collect_vec();
            if frontier.is_empty() {
                continue;
            }

            let expansions = match &pool {
                Some(pool) if frontier.len() >= MIN_PARALLEL_FRONTIER => {
                    let table = &table;
                    pool.install(|| {
                        frontier
                            .par_chunks(frontier.len().div_ceil(threads))
                            .map(|slice| table.expand(puzzle_def, slice, depth, max_depth))
                            .collect::<Vec<_>>()
                    })
                }
                _ => vec![table.expand(puzzle_def, &frontier, depth, max_depth)],
            };

            let entries_before = table.len();
            for expansion in expansions {
                skipped_beyond_depth |= expansion.skipped_beyond_depth;
                let key_len = table.arena.key_len();
                for (key, &next_distance) in expansion
                    .keys
                    .chunks_exact(key_len.max(1))
                    .zip(&expansion.distances)
                {
                    match table.arena.find(key) {
                        Some(entry) => {
                            if next_distance < table.distances[entry] {
                                table.distances[entry] = next_distance;
                                #[allow(clippy::cast_possible_truncation)]
                                buckets[next_distance as usize].push(entry as u32);
                            }
                        }
                        None => {
                            if table.arena.is_full()
                                || table.memory_bytes_after_insert() > options.memory_budget_bytes
                            {
                                // Every state at `depth` or closer is stored
                                truncated_depth = Some(depth + 1);
                                break 'layers;
                            }
                            let (entry, _) = table.arena.insert(key);
                            table.distances.push(next_distance);
                            #[allow(clippy::cast_possible_truncation)]
                            buckets[next_distance as usize].push(entry as u32);
                        }
                    }
                }
            }
            debug!(
                working!("Expanded {} states at depth {}, found {} new states in {:.3}s"),
                frontier.len(),
                depth,
                table.len() - entries_before,
                layer_start.elapsed().as_secs_f64()
            );
        }

        if let Some(effective_depth) = truncated_depth {
            for distance in &mut table.distances {
                *distance = (*distance).min(effective_depth);
            }
            table.depth = effective_depth;
            warn!(
                "The pruning table ran out of its {} byte memory budget, truncating it to depth {}",
                options.memory_budget_bytes, effective_depth
            );
        }
        table.complete = truncated_depth.is_none() && !skipped_beyond_depth;
        table.build_report = PruneTableBuildReport {
            entries: table.len(),
            effective_depth: table.depth,
            complete: table.complete,
            truncated: truncated_depth.is_some(),
            memory_bytes: table.memory_bytes(),
            elapsed: start.elapsed(),
        };
        info!(
            success!("Generated {} pruning table entries ({} bytes) in {:.3}s"),
            table.len(),
            table.memory_bytes(),
            start.elapsed().as_secs_f64()
        );
        Ok(table)
    }
}

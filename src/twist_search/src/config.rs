use crate::{
    pruning::{PruneTableOptions, default_threads},
    solver::TieBreak,
};
use serde::Deserialize;

/// Everything that tunes a search. Every field has a default, so a TOML file
/// only needs to name what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub threads: usize,
    /// Each bound is split into about `threads * chunks_per_thread` chunks.
    pub chunks_per_thread: usize,
    /// Hand chunks to workers in a random order.
    pub random_start: bool,
    /// The last bound searched before giving up.
    pub max_bound: u8,
    pub tie_break: TieBreak,
    pub time_limit_secs: Option<f64>,
    /// Merge chunks whose states are conjugate under the puzzle's symmetries.
    pub symmetric_chunks: bool,
    pub prune_table: PruneTableOptions,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            chunks_per_thread: 8,
            random_start: false,
            max_bound: 40,
            tie_break: TieBreak::default(),
            time_limit_secs: None,
            symmetric_chunks: false,
            prune_table: PruneTableOptions::default(),
        }
    }
}

impl SolverConfig {
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_chunks_per_thread(mut self, chunks_per_thread: usize) -> Self {
        self.chunks_per_thread = chunks_per_thread;
        self
    }

    #[must_use]
    pub fn with_random_start(mut self, random_start: bool) -> Self {
        self.random_start = random_start;
        self
    }

    #[must_use]
    pub fn with_max_bound(mut self, max_bound: u8) -> Self {
        self.max_bound = max_bound;
        self
    }

    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    #[must_use]
    pub fn with_time_limit_secs(mut self, time_limit_secs: f64) -> Self {
        self.time_limit_secs = Some(time_limit_secs);
        self
    }

    #[must_use]
    pub fn with_symmetric_chunks(mut self, symmetric_chunks: bool) -> Self {
        self.symmetric_chunks = symmetric_chunks;
        self
    }

    #[must_use]
    pub fn with_prune_table(mut self, prune_table: PruneTableOptions) -> Self {
        self.prune_table = prune_table;
        self
    }

    /// The number of chunks each bound is split into.
    #[must_use]
    pub fn parallelism_hint(&self) -> usize {
        self.threads.max(1) * self.chunks_per_thread.max(1)
    }
}

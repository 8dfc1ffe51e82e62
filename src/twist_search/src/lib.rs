//! A parallel IDA* search engine for permutation puzzles described in the
//! KSolve format.
//!
//! The pieces fit together as follows: a `PuzzleDef` is built from a `KSolve`
//! definition, a `GeneratingSet` filters redundant move orderings, a pruning
//! table bounds the remaining distance to a goal, and the `Solver` hands
//! `WorkChunk`s to a pool of worker threads one bound at a time.

#![warn(clippy::pedantic)]
#![allow(clippy::similar_names, clippy::too_many_lines)]

pub mod canonical_fsm;
pub mod config;
pub mod pruning;
pub mod puzzle;
pub(crate) mod puzzle_state_history;
pub mod solver;
pub mod symmetry;
pub mod work_chunks;

pub use canonical_fsm::{CanonicalFSMState, GeneratingSet};
pub use config::SolverConfig;
pub use pruning::{
    ExactTable, PruneTableBuildReport, PruneTableLoadError, PruneTableOptions, PruningTable,
    PruningTables, UNREACHABLE, ZeroTable,
};
pub use puzzle::{
    AuxMem, DefinitionError, DefinitionOptions, Metric, Move, NameResolutionError, OrbitDef,
    PuzzleDef, PuzzleState,
};
pub use solver::{Cancellation, SearchOutcome, Solution, Solver, SolverError, TieBreak};
pub use symmetry::SymmetryGroup;
pub use work_chunks::{ChunkReduction, WorkChunk, make_work_chunks};

#[macro_export]
macro_rules! start {
    ($msg:expr) => {
        concat!("⏳ ", $msg)
    };
}

#[macro_export]
macro_rules! working {
    ($msg:expr) => {
        concat!("🛠  ", $msg)
    };
}

#[macro_export]
macro_rules! success {
    ($msg:expr) => {
        concat!("✅ ", $msg)
    };
}

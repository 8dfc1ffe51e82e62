//! Splitting one IDA* bound into independently searchable pieces.

use crate::{
    canonical_fsm::{CanonicalFSMState, GeneratingSet},
    puzzle::{PuzzleDef, PuzzleState},
    symmetry::SymmetryGroup,
};
use fxhash::FxHashMap;
use std::collections::hash_map::Entry;

/// A move prefix and everything needed to search below it.
#[derive(Debug, Clone)]
pub struct WorkChunk {
    /// Position in prefix order. Lower indices hold lexicographically smaller
    /// prefixes.
    pub index: usize,
    pub moves: Vec<usize>,
    pub state: PuzzleState,
    pub cost: u8,
    /// The cost still available below the prefix.
    pub remaining: u8,
    pub fsm_state: CanonicalFSMState,
}

/// How chunks that reach equivalent states are merged.
#[derive(Debug, Clone, Copy)]
pub enum ChunkReduction<'a> {
    /// Every prefix is kept, so the chunks partition the search tree.
    None,
    /// Only the first of several equal-cost chunks whose states are
    /// conjugate under the group is kept.
    Symmetry(&'a SymmetryGroup),
}

impl WorkChunk {
    fn root(start: &PuzzleState, depth: u8) -> Self {
        WorkChunk {
            index: 0,
            moves: vec![],
            state: start.clone(),
            cost: 0,
            remaining: depth,
            fsm_state: CanonicalFSMState::ROOT,
        }
    }

    /// Every child prefix one legal move deeper that fits in the budget.
    fn children<'a>(
        &'a self,
        puzzle_def: &'a PuzzleDef,
        generating_set: &'a GeneratingSet,
    ) -> impl Iterator<Item = WorkChunk> + 'a {
        generating_set
            .legal_moves(puzzle_def, self.fsm_state)
            .filter(|(_, move_, _)| move_.cost() <= self.remaining)
            .map(|(move_index, move_, next_fsm_state)| {
                let mut moves = self.moves.clone();
                moves.push(move_index);
                WorkChunk {
                    index: 0,
                    moves,
                    state: self.state.compose(
                        move_.puzzle_state(),
                        &puzzle_def.sorted_orbit_defs,
                    ),
                    cost: self.cost + move_.cost(),
                    remaining: self.remaining - move_.cost(),
                    fsm_state: next_fsm_state,
                }
            })
    }
}

/// Split the search of every canonical move sequence of cost at most `depth`
/// from `start` into at least `parallelism_hint` chunks. The tree is expanded
/// one level at a time, so fewer chunks are only returned when the whole tree
/// is smaller than the hint. Chunks that cannot be expanded stay in place as
/// leaves.
#[must_use]
pub fn make_work_chunks(
    puzzle_def: &PuzzleDef,
    generating_set: &GeneratingSet,
    start: &PuzzleState,
    depth: u8,
    chunk_reduction: ChunkReduction<'_>,
    parallelism_hint: usize,
) -> Vec<WorkChunk> {
    let mut chunks = vec![WorkChunk::root(start, depth)];
    while chunks.len() < parallelism_hint {
        let mut expanded = false;
        let mut next_chunks = Vec::with_capacity(chunks.len() * puzzle_def.moves.len());
        for chunk in chunks {
            let before = next_chunks.len();
            next_chunks.extend(chunk.children(puzzle_def, generating_set));
            if next_chunks.len() == before {
                next_chunks.push(chunk);
            } else {
                expanded = true;
            }
        }
        if let ChunkReduction::Symmetry(symmetry_group) = chunk_reduction {
            next_chunks = merge_conjugates(next_chunks, symmetry_group, puzzle_def);
        }
        chunks = next_chunks;
        if !expanded {
            break;
        }
    }
    for (index, chunk) in chunks.iter_mut().enumerate() {
        chunk.index = index;
    }
    chunks
}

/// Keep the first chunk of every class of equal-cost chunks with conjugate
/// states. Searching the kept chunk from the root FSM state covers every
/// canonical continuation of the dropped ones.
fn merge_conjugates(
    chunks: Vec<WorkChunk>,
    symmetry_group: &SymmetryGroup,
    puzzle_def: &PuzzleDef,
) -> Vec<WorkChunk> {
    let mut kept: Vec<WorkChunk> = Vec::with_capacity(chunks.len());
    let mut first_by_class: FxHashMap<(PuzzleState, u8), usize> = FxHashMap::default();
    for chunk in chunks {
        let canonical = symmetry_group.canonicalize(&chunk.state, &puzzle_def.sorted_orbit_defs);
        match first_by_class.entry((canonical, chunk.cost)) {
            Entry::Occupied(entry) => {
                let kept_chunk = &mut kept[*entry.get()];
                if kept_chunk.fsm_state != chunk.fsm_state {
                    kept_chunk.fsm_state = CanonicalFSMState::ROOT;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(kept.len());
                kept.push(chunk);
            }
        }
    }
    kept
}

//! Canonical move sequence finite state machine, derived primarily from Lucas
//! Garron's implementation in twsearch:
//! https://github.com/cubing/twsearch/blob/main/src/rs/_internal/canonical_fsm/canonical_fsm.rs

use crate::puzzle::{DefinitionError, MAX_NUM_MOVE_CLASSES, Move, PuzzleDef};
use fxhash::FxHashMap;

// Bit N is indexed by a `MoveClassIndex` value of N.
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
struct MoveClassMask(u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CanonicalFSMState(usize);

const ILLEGAL_STATE: CanonicalFSMState = CanonicalFSMState(!0);

struct MaskToState(FxHashMap<MoveClassMask, CanonicalFSMState>);

struct StateToMask(Vec<MoveClassMask>);

/// The canonical generating set of a puzzle. It only admits one ordering of
/// every run of mutually commuting moves and never two moves of the same class
/// in a row.
#[derive(Debug)]
pub struct GeneratingSet {
    next_state_lookup: Vec<Vec<CanonicalFSMState>>,
}

impl CanonicalFSMState {
    /// The state before any move has been made.
    pub const ROOT: Self = Self(0);
}

impl MoveClassMask {
    fn all(num_move_classes: usize) -> Self {
        if num_move_classes == MAX_NUM_MOVE_CLASSES {
            MoveClassMask(u64::MAX)
        } else {
            MoveClassMask((1 << num_move_classes) - 1)
        }
    }

    fn contains(self, move_class_index: usize) -> bool {
        (self.0 >> move_class_index) & 1 != 0
    }

    /// Whether any class above `move_class_index` is set.
    #[allow(clippy::cast_possible_truncation)]
    fn any_above(self, move_class_index: usize) -> bool {
        self.0.checked_shr(move_class_index as u32 + 1).unwrap_or(0) != 0
    }
}

impl TryFrom<&PuzzleDef> for GeneratingSet {
    type Error = DefinitionError;

    fn try_from(puzzle_def: &PuzzleDef) -> Result<Self, Self::Error> {
        let num_move_classes = puzzle_def.move_classes.len();
        if num_move_classes > MAX_NUM_MOVE_CLASSES {
            return Err(DefinitionError::TooManyMoveClasses {
                max: MAX_NUM_MOVE_CLASSES,
                actual: num_move_classes,
            });
        }
        if let Some(move_) = puzzle_def
            .moves
            .iter()
            .find(|move_| move_.move_class_index >= num_move_classes)
        {
            return Err(DefinitionError::UnknownMoveClass {
                name: move_.name.clone(),
                move_class_index: move_.move_class_index,
            });
        }

        let mut commutes = vec![MoveClassMask::all(num_move_classes); num_move_classes];

        let mut result_1 = puzzle_def.new_solved_state();
        let mut result_2 = puzzle_def.new_solved_state();
        for (i, move_class_1_index) in puzzle_def.move_classes.iter().copied().enumerate() {
            for (j, move_class_2_index) in puzzle_def.move_classes.iter().copied().enumerate() {
                if !puzzle_def.moves[move_class_1_index].commutes_with(
                    &puzzle_def.moves[move_class_2_index],
                    &mut result_1,
                    &mut result_2,
                    &puzzle_def.sorted_orbit_defs,
                ) {
                    commutes[i].0 &= !(1 << j);
                    commutes[j].0 &= !(1 << i);
                }
            }
        }

        let mut next_state_lookup = vec![];

        let mut mask_to_state = MaskToState(FxHashMap::default());
        mask_to_state
            .0
            .insert(MoveClassMask(0), CanonicalFSMState::ROOT);
        // Indexed by state ordinal, the set of move classes in the move
        // sequence so far that have not been followed by a move that does not
        // commute with them
        let mut state_to_mask = StateToMask(vec![MoveClassMask(0)]);

        let mut queue_index = 0;
        while queue_index < state_to_mask.0.len() {
            let mut next_state = vec![ILLEGAL_STATE; num_move_classes];
            let dequeue_move_class_mask = state_to_mask.0[queue_index];
            queue_index += 1;

            for (move_class_index, next) in next_state.iter_mut().enumerate() {
                // A move class that commutes with a greater move class still
                // in the mask must come before it, and a move class never
                // follows itself
                if MoveClassMask(dequeue_move_class_mask.0 & commutes[move_class_index].0)
                    .any_above(move_class_index)
                    || dequeue_move_class_mask.contains(move_class_index)
                {
                    continue;
                }

                let mut next_state_bits = (dequeue_move_class_mask.0
                    & commutes[move_class_index].0)
                    | (1 << move_class_index);

                // If a pair of bits are set with the same commutating moves, we
                // can clear out the lower one. This keeps the state count
                // from going exponential for very big puzzles.
                for i in 0..num_move_classes {
                    if (next_state_bits >> i) & 1 != 0 {
                        for j in (i + 1)..num_move_classes {
                            if ((next_state_bits >> j) & 1) != 0 && commutes[i] == commutes[j] {
                                next_state_bits &= !(1 << i);
                            }
                        }
                    }
                }

                let next_move_class_mask = MoveClassMask(next_state_bits);
                *next = match mask_to_state.0.get(&next_move_class_mask) {
                    Some(&state) => state,
                    None => {
                        let state = CanonicalFSMState(state_to_mask.0.len());
                        mask_to_state.0.insert(next_move_class_mask, state);
                        state_to_mask.0.push(next_move_class_mask);
                        state
                    }
                };
            }
            next_state_lookup.push(next_state);
        }

        Ok(Self { next_state_lookup })
    }
}

impl GeneratingSet {
    /// The state reached by making a move of `move_class_index`, or `None` if
    /// the move would be redundant.
    #[must_use]
    pub fn next_state(
        &self,
        current_fsm_state: CanonicalFSMState,
        move_class_index: usize,
    ) -> Option<CanonicalFSMState> {
        match self.next_state_lookup[current_fsm_state.0][move_class_index] {
            ILLEGAL_STATE => None,
            state => Some(state),
        }
    }

    /// Every move allowed after `current_fsm_state`, in move class order then
    /// power order, along with the state it leads to.
    pub fn legal_moves<'a>(
        &'a self,
        puzzle_def: &'a PuzzleDef,
        current_fsm_state: CanonicalFSMState,
    ) -> impl Iterator<Item = (usize, &'a Move, CanonicalFSMState)> + 'a {
        puzzle_def
            .moves
            .iter()
            .enumerate()
            .filter_map(move |(move_index, move_)| {
                self.next_state(current_fsm_state, move_.move_class_index)
                    .map(|next_fsm_state| (move_index, move_, next_fsm_state))
            })
    }

    #[must_use]
    pub fn num_states(&self) -> usize {
        self.next_state_lookup.len()
    }
}

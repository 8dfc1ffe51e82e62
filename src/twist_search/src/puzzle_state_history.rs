use crate::puzzle::{PuzzleDef, PuzzleState};

/// The states along the current search path, each with the move that led to
/// it. Entry zero is the state the search started from.
pub struct PuzzleStateHistory {
    stack: Vec<(PuzzleState, usize)>,
    stack_pointer: usize,
}

impl PuzzleStateHistory {
    pub fn new(root: &PuzzleState) -> Self {
        Self {
            stack: vec![(root.clone(), usize::MAX)],
            stack_pointer: 0,
        }
    }

    /// Restart from a new root, keeping the allocated buffer.
    pub fn reset(&mut self, root: &PuzzleState) {
        self.stack[0].0.copy_from(root);
        self.stack_pointer = 0;
    }

    /// Resize the underlying buffer capacity if needed.
    pub fn resize_if_needed(&mut self, max_stack_pointer: usize) {
        if self.stack.len() <= max_stack_pointer {
            let filler = (self.stack[0].0.clone(), usize::MAX);
            self.stack.resize(max_stack_pointer + 1, filler);
        }
    }

    /// Push a new state onto the stack by composing the given move with the
    /// last state in the stack.
    pub fn push_stack(&mut self, move_index: usize, puzzle_def: &PuzzleDef) {
        if self.stack_pointer + 1 == self.stack.len() {
            self.resize_if_needed(self.stack_pointer + 1);
        }
        let (left, right) = self.stack.split_at_mut(self.stack_pointer + 1);
        let next_entry = &mut right[0];
        next_entry.0.replace_compose(
            &left[self.stack_pointer].0,
            puzzle_def.moves[move_index].puzzle_state(),
            &puzzle_def.sorted_orbit_defs,
        );
        next_entry.1 = move_index;
        self.stack_pointer += 1;
    }

    /// Pop the last state from the stack.
    pub fn pop_stack(&mut self) {
        debug_assert!(self.stack_pointer > 0);
        self.stack_pointer -= 1;
    }

    /// Get the last state in the stack.
    pub fn last_state(&self) -> &PuzzleState {
        &self.stack[self.stack_pointer].0
    }

    /// The moves made since the root, in order.
    pub fn create_move_history(&self) -> Vec<usize> {
        (1..=self.stack_pointer).map(|i| self.stack[i].1).collect()
    }
}

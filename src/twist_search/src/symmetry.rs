//! The group of whole-puzzle rotations and symmetry-canonical forms of states.

use crate::puzzle::{DefinitionError, OrbitDef, PuzzleDef, PuzzleState};
use fxhash::{FxHashMap, FxHashSet};

pub const MAX_SYMMETRIES: usize = 1024;

/// The closure of a puzzle's rotations under composition. The first element
/// is always the identity.
#[derive(Debug, Clone)]
pub struct SymmetryGroup {
    elements: Box<[PuzzleState]>,
    inverses: Box<[PuzzleState]>,
}

/// Temporary storage for conjugating states.
pub struct ConjugationScratch {
    partial: PuzzleState,
    conjugate: PuzzleState,
}

impl ConjugationScratch {
    pub(crate) fn new(puzzle_state: PuzzleState) -> Self {
        Self {
            partial: puzzle_state.clone(),
            conjugate: puzzle_state,
        }
    }
}

impl SymmetryGroup {
    /// Generate the group from its generators.
    ///
    /// # Errors
    ///
    /// If the group has more than `MAX_SYMMETRIES` elements.
    pub fn new(
        generators: &[PuzzleState],
        sorted_orbit_defs: &[OrbitDef],
    ) -> Result<Self, DefinitionError> {
        let identity = PuzzleState::solved(sorted_orbit_defs);
        let mut seen = FxHashSet::default();
        seen.insert(identity.clone());
        let mut elements = vec![identity];

        let mut i = 0;
        while i < elements.len() {
            for generator in generators {
                let next = elements[i].compose(generator, sorted_orbit_defs);
                if seen.insert(next.clone()) {
                    if elements.len() == MAX_SYMMETRIES {
                        return Err(DefinitionError::SymmetryGroupTooLarge(MAX_SYMMETRIES));
                    }
                    elements.push(next);
                }
            }
            i += 1;
        }

        let inverses = elements
            .iter()
            .map(|element| element.inverse(sorted_orbit_defs))
            .collect();
        Ok(Self {
            elements: elements.into_boxed_slice(),
            inverses,
        })
    }

    /// The number of symmetries, including the identity.
    #[must_use]
    pub fn order(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn elements(&self) -> &[PuzzleState] {
        &self.elements
    }

    /// Write the symmetry-canonical form of `puzzle_state` into `canonical`:
    /// the lexicographically least `g⁻¹ s g` over every symmetry `g`.
    pub fn canonicalize_into(
        &self,
        puzzle_state: &PuzzleState,
        canonical: &mut PuzzleState,
        scratch: &mut ConjugationScratch,
        sorted_orbit_defs: &[OrbitDef],
    ) {
        canonical.copy_from(puzzle_state);
        for (element, inverse) in self.elements.iter().zip(&self.inverses).skip(1) {
            scratch
                .partial
                .replace_compose(inverse, puzzle_state, sorted_orbit_defs);
            scratch
                .conjugate
                .replace_compose(&scratch.partial, element, sorted_orbit_defs);
            if scratch.conjugate < *canonical {
                canonical.copy_from(&scratch.conjugate);
            }
        }
    }

    /// Allocating version of `canonicalize_into`.
    #[must_use]
    pub fn canonicalize(
        &self,
        puzzle_state: &PuzzleState,
        sorted_orbit_defs: &[OrbitDef],
    ) -> PuzzleState {
        let mut canonical = puzzle_state.clone();
        let mut scratch = ConjugationScratch::new(puzzle_state.clone());
        self.canonicalize_into(puzzle_state, &mut canonical, &mut scratch, sorted_orbit_defs);
        canonical
    }

    /// Check that conjugating by every symmetry maps moves to moves of equal
    /// cost and goals to goals, which symmetry reduction relies on.
    ///
    /// # Errors
    ///
    /// Names the first move or goal that is mapped outside its set.
    pub fn check_preserves(&self, puzzle_def: &PuzzleDef) -> Result<(), DefinitionError> {
        let sorted_orbit_defs = &puzzle_def.sorted_orbit_defs;
        let move_costs: FxHashMap<&PuzzleState, u8> = puzzle_def
            .moves
            .iter()
            .map(|move_| (move_.puzzle_state(), move_.cost()))
            .collect();
        let mut partial = puzzle_def.new_solved_state();
        let mut conjugate = puzzle_def.new_solved_state();

        for (element, inverse) in self.elements.iter().zip(&self.inverses).skip(1) {
            for move_ in &puzzle_def.moves {
                partial.replace_compose(inverse, move_.puzzle_state(), sorted_orbit_defs);
                conjugate.replace_compose(&partial, element, sorted_orbit_defs);
                if move_costs.get(&conjugate) != Some(&move_.cost()) {
                    return Err(DefinitionError::SymmetryNotPreserved(format!(
                        "move `{}`",
                        move_.name()
                    )));
                }
            }
            for (i, goal) in puzzle_def.goals().iter().enumerate() {
                partial.replace_compose(inverse, goal, sorted_orbit_defs);
                conjugate.replace_compose(&partial, element, sorted_orbit_defs);
                if !puzzle_def.is_goal(&conjugate) {
                    return Err(DefinitionError::SymmetryNotPreserved(format!("goal #{i}")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::{DefinitionOptions, apply_moves};
    use ksolve::puzzles::{KPUZZLE_2X2, KPUZZLE_3X3};

    #[test]
    fn test_canonical_forms_agree_on_conjugates() {
        let cube3_def = PuzzleDef::new(&KPUZZLE_3X3, &DefinitionOptions::default()).unwrap();
        let sorted_orbit_defs = &cube3_def.sorted_orbit_defs;
        let group = cube3_def.symmetry_group();
        let solved = cube3_def.new_solved_state();

        let r_u = apply_moves(&cube3_def, &solved, "R U", 1);
        // y conjugates R to B and U to U
        let b_u = apply_moves(&cube3_def, &solved, "B U", 1);
        let r_l = apply_moves(&cube3_def, &solved, "R L", 1);
        let canonical = group.canonicalize(&r_u, sorted_orbit_defs);
        assert_eq!(group.canonicalize(&b_u, sorted_orbit_defs), canonical);
        assert_eq!(group.canonicalize(&canonical, sorted_orbit_defs), canonical);
        assert!(canonical <= r_u);
        assert_ne!(group.canonicalize(&r_l, sorted_orbit_defs), canonical);
        assert_eq!(group.canonicalize(&solved, sorted_orbit_defs), solved);
    }

    #[test]
    fn test_cube_preserves_symmetry() {
        let cube2_def = PuzzleDef::new(&KPUZZLE_2X2, &DefinitionOptions::default()).unwrap();
        cube2_def.symmetry_group().check_preserves(&cube2_def).unwrap();
    }

    #[test]
    fn test_restricted_generators_break_symmetry() {
        let options = DefinitionOptions {
            generators: Some(vec!["R".to_owned(), "U".to_owned()]),
            ..DefinitionOptions::default()
        };
        let cube3_def = PuzzleDef::new(&KPUZZLE_3X3, &options).unwrap();
        assert!(matches!(
            cube3_def.symmetry_group().check_preserves(&cube3_def),
            Err(DefinitionError::SymmetryNotPreserved(_))
        ));
    }
}

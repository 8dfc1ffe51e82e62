//! Declarative puzzle descriptions in the KSolve format.
//!
//! This crate only describes puzzles: the sets of pieces, the base moves as
//! permutation/orientation vectors, and the whole-puzzle rotations. Turning a
//! description into something searchable is the job of `twist_search`.

use std::num::{NonZeroU8, NonZeroU16};
use thiserror::Error;

pub mod puzzles;

/// A representation of a puzzle in the KSolve format. We remain consistent
/// with the KSolve format and terminology because it is the lingua-franca of
/// the puzzle theory community and what twsearch reads.
#[derive(Clone, Debug, PartialEq)]
pub struct KSolve {
    name: String,
    sets: Vec<KSolveSet>,
    moves: Vec<KSolveMove>,
    symmetries: Vec<KSolveMove>,
}

/// A piece orbit of a KSolve puzzle, or "Set" to remain consistent with the
/// KSolve terminology
#[derive(Clone, Debug, PartialEq)]
pub struct KSolveSet {
    name: String,
    piece_count: NonZeroU16,
    orientation_count: NonZeroU8,
}

/// A transformation of a KSolve puzzle. One (permutation, orientation delta)
/// list per set, with 1-indexed permutations.
pub type KSolveTransformation = Vec<Vec<(NonZeroU16, u8)>>;

#[derive(Clone, Debug, PartialEq)]
pub struct KSolveMove {
    transformation: KSolveTransformation,
    name: String,
}

/// A possibly invalid KSolve puzzle representation. Convert it with
/// `KSolve::try_from` to validate it.
#[derive(Clone, Debug)]
pub struct KSolveFields {
    pub name: String,
    pub sets: Vec<KSolveSet>,
    pub moves: Vec<KSolveMove>,
    pub symmetries: Vec<KSolveMove>,
}

#[derive(Error, Debug)]
pub enum KSolveConstructionError {
    #[error("Invalid set count, expected {0} sets but got {1}")]
    InvalidSetCount(usize, usize),
    #[error("Invalid piece count, expected {0} pieces but got {1}")]
    InvalidPieceCount(u16, usize),
    #[error("Invalid orientation delta, expected a value between 0 and {0} but got {1}")]
    InvalidOrientationDelta(u8, u8),
    #[error("Permutation out of range, expected a value between 1 and {0} but got {1}")]
    PermutationOutOfRange(u16, u16),
    #[error("Move is invalid: {0:?}")]
    InvalidMove(KSolveMove),
}

impl KSolve {
    /// Get the name of the puzzle
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the sets of pieces on the puzzle
    pub fn sets(&self) -> &[KSolveSet] {
        &self.sets
    }

    /// Get the set of available moves on the puzzle
    pub fn moves(&self) -> &[KSolveMove] {
        &self.moves
    }

    /// Get the whole-puzzle rotations obeyed by the puzzle
    pub fn symmetries(&self) -> &[KSolveMove] {
        &self.symmetries
    }

    /// Get the solved state of the puzzle
    ///
    /// # Panics
    ///
    /// Never; every piece index is nonzero by construction.
    pub fn solved(&self) -> KSolveTransformation {
        self.sets
            .iter()
            .map(|ksolve_set| {
                (1..=ksolve_set.piece_count.get())
                    .map(|i| i.try_into().unwrap())
                    .zip(std::iter::repeat(0))
                    .collect()
            })
            .collect()
    }
}

impl KSolveSet {
    /// Create a new set description.
    pub fn new(name: &str, piece_count: NonZeroU16, orientation_count: NonZeroU8) -> Self {
        Self {
            name: name.to_owned(),
            piece_count,
            orientation_count,
        }
    }

    /// Get the name of the set
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of pieces in the set
    pub fn piece_count(&self) -> NonZeroU16 {
        self.piece_count
    }

    /// Get the orientation modulo of the set
    pub fn orientation_count(&self) -> NonZeroU8 {
        self.orientation_count
    }
}

impl KSolveMove {
    /// Create a new move description. It is only validated once it is part of
    /// a `KSolve`.
    pub fn new(name: &str, transformation: KSolveTransformation) -> Self {
        Self {
            name: name.to_owned(),
            transformation,
        }
    }

    /// Get the name of the move
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the transformation of the move
    pub fn transformation(&self) -> &KSolveTransformation {
        &self.transformation
    }
}

fn validate_transformation(
    ksolve_move: &KSolveMove,
    sets: &[KSolveSet],
) -> Result<(), KSolveConstructionError> {
    let expected_set_count = sets.len();
    let actual_set_count = ksolve_move.transformation.len();
    if actual_set_count != expected_set_count {
        return Err(KSolveConstructionError::InvalidSetCount(
            expected_set_count,
            actual_set_count,
        ));
    }

    for (transformation, ksolve_set) in ksolve_move.transformation.iter().zip(sets) {
        let expected_piece_count = ksolve_set.piece_count.get();
        let actual_piece_count = transformation.len();

        if actual_piece_count != expected_piece_count as usize {
            return Err(KSolveConstructionError::InvalidPieceCount(
                expected_piece_count,
                actual_piece_count,
            ));
        }

        let max_orientation_delta = ksolve_set.orientation_count.get() - 1;
        let mut covered_perms = vec![false; expected_piece_count as usize];

        for &(perm, orientation_delta) in transformation {
            if orientation_delta > max_orientation_delta {
                return Err(KSolveConstructionError::InvalidOrientationDelta(
                    max_orientation_delta,
                    orientation_delta,
                ));
            }

            match covered_perms.get_mut((perm.get() - 1) as usize) {
                Some(covered) => *covered = true,
                None => {
                    return Err(KSolveConstructionError::PermutationOutOfRange(
                        expected_piece_count,
                        perm.get(),
                    ));
                }
            }
        }

        if covered_perms.iter().any(|&covered| !covered) {
            return Err(KSolveConstructionError::InvalidMove(ksolve_move.clone()));
        }
    }
    Ok(())
}

impl TryFrom<KSolveFields> for KSolve {
    type Error = KSolveConstructionError;

    fn try_from(ksolve_fields: KSolveFields) -> Result<Self, Self::Error> {
        for ksolve_move in ksolve_fields
            .moves
            .iter()
            .chain(ksolve_fields.symmetries.iter())
        {
            validate_transformation(ksolve_move, &ksolve_fields.sets)?;
        }

        Ok(KSolve {
            name: ksolve_fields.name,
            sets: ksolve_fields.sets,
            moves: ksolve_fields.moves,
            symmetries: ksolve_fields.symmetries,
        })
    }
}

/// Convert 1-indexed `u16` permutation vectors to a `KSolveTransformation`.
///
/// # Panics
///
/// Panics if any permutation entry is zero.
pub fn nonzero_perm(transformation: Vec<Vec<(u16, u8)>>) -> KSolveTransformation {
    transformation
        .iter()
        .map(|perm_and_ori| {
            perm_and_ori
                .iter()
                .map(|&(p, o)| (p.try_into().unwrap(), o))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzles::KPUZZLE_3X3;

    fn two_sets() -> Vec<KSolveSet> {
        vec![
            KSolveSet::new("short", 3.try_into().unwrap(), 5.try_into().unwrap()),
            KSolveSet::new("long", 4.try_into().unwrap(), 5.try_into().unwrap()),
        ]
    }

    fn fields_with_move(transformation: Vec<Vec<(u16, u8)>>) -> KSolveFields {
        KSolveFields {
            name: "toy".to_owned(),
            sets: two_sets(),
            moves: vec![KSolveMove::new("F", nonzero_perm(transformation))],
            symmetries: vec![],
        }
    }

    #[test]
    #[should_panic]
    fn test_nonzero_perm() {
        nonzero_perm(vec![
            vec![(0, 0), (2, 0), (3, 0)],
            vec![(1, 0), (2, 0), (3, 0), (4, 0)],
        ]);
    }

    #[test]
    fn test_solved_3x3() {
        let solved = KPUZZLE_3X3.solved();
        assert_eq!(solved.len(), 2);
        assert_eq!(solved[0].len(), 12);
        assert_eq!(solved[1].len(), 8);
        for set in &solved {
            for (i, &(p, o)) in set.iter().enumerate() {
                assert_eq!(p.get() as usize, i + 1);
                assert_eq!(o, 0);
            }
        }
    }

    #[test]
    fn test_valid_construction() {
        let ksolve = KSolve::try_from(fields_with_move(vec![
            vec![(2, 1), (3, 0), (1, 4)],
            vec![(1, 0), (2, 0), (3, 0), (4, 0)],
        ]))
        .unwrap();
        assert_eq!(ksolve.name(), "toy");
        assert_eq!(ksolve.sets().len(), 2);
        assert_eq!(ksolve.moves().len(), 1);
        assert!(ksolve.symmetries().is_empty());
    }

    #[test]
    fn test_invalid_set_count() {
        assert!(matches!(
            KSolve::try_from(fields_with_move(vec![vec![(1, 0), (2, 0), (3, 0)]])),
            Err(KSolveConstructionError::InvalidSetCount(2, 1))
        ));
    }

    #[test]
    fn test_invalid_piece_count() {
        assert!(matches!(
            KSolve::try_from(fields_with_move(vec![
                vec![(1, 0), (2, 0), (3, 0), (4, 0)],
                vec![]
            ])),
            Err(KSolveConstructionError::InvalidPieceCount(3, 4))
        ));
    }

    #[test]
    fn test_invalid_orientation_delta() {
        assert!(matches!(
            KSolve::try_from(fields_with_move(vec![
                vec![(1, 0), (2, 0), (3, 0)],
                vec![(1, 0), (2, 5), (3, 0), (4, 0)],
            ])),
            Err(KSolveConstructionError::InvalidOrientationDelta(4, 5))
        ));
    }

    #[test]
    fn test_permutation_out_of_range() {
        assert!(matches!(
            KSolve::try_from(fields_with_move(vec![
                vec![(1, 0), (2, 0), (3, 0)],
                vec![(1, 0), (5, 0), (3, 0), (4, 0)],
            ])),
            Err(KSolveConstructionError::PermutationOutOfRange(4, 5))
        ));
    }

    #[test]
    fn test_invalid_move() {
        assert!(matches!(
            KSolve::try_from(fields_with_move(vec![
                vec![(1, 0), (2, 0), (3, 0)],
                vec![(1, 0), (2, 0), (2, 0), (4, 0)],
            ])),
            Err(KSolveConstructionError::InvalidMove(_))
        ));
    }

    #[test]
    fn test_invalid_symmetry_is_rejected() {
        let mut fields = fields_with_move(vec![
            vec![(1, 0), (2, 0), (3, 0)],
            vec![(1, 0), (2, 0), (3, 0), (4, 0)],
        ]);
        fields.symmetries.push(KSolveMove::new(
            "bad",
            nonzero_perm(vec![
                vec![(1, 0), (1, 0), (3, 0)],
                vec![(1, 0), (2, 0), (3, 0), (4, 0)],
            ]),
        ));
        assert!(matches!(
            KSolve::try_from(fields),
            Err(KSolveConstructionError::InvalidMove(_))
        ));
    }
}

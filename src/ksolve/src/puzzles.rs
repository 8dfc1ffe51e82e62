//! Built-in puzzle definitions.

use crate::{KSolve, KSolveMove, KSolveSet, KSolveTransformation, nonzero_perm};
use std::sync::LazyLock;

type EdgeCorner = (&'static str, [(u16, u8); 12], [(u16, u8); 8]);

/// Edges first, then corners. Corners are numbered the same way on the 2x2x2.
const CUBE_MOVES: [EdgeCorner; 6] = [
    (
        "F",
        [
            (10, 1), (1, 1), (3, 0), (4, 0), (2, 1), (6, 0), (7, 0), (8, 0), (9, 0), (5, 1),
            (11, 0), (12, 0),
        ],
        [(7, 2), (1, 1), (3, 0), (2, 2), (5, 0), (6, 0), (4, 1), (8, 0)],
    ),
    (
        "B",
        [
            (1, 0), (2, 0), (6, 1), (4, 0), (5, 0), (7, 1), (11, 1), (8, 0), (9, 0), (10, 0),
            (3, 1), (12, 0),
        ],
        [(1, 0), (2, 0), (5, 1), (4, 0), (8, 2), (3, 2), (7, 0), (6, 1)],
    ),
    (
        "D",
        [
            (1, 0), (9, 0), (3, 0), (2, 0), (5, 0), (4, 0), (7, 0), (8, 0), (6, 0), (10, 0),
            (11, 0), (12, 0),
        ],
        [(1, 0), (4, 0), (3, 0), (8, 0), (2, 0), (6, 0), (7, 0), (5, 0)],
    ),
    (
        "U",
        [
            (1, 0), (2, 0), (3, 0), (4, 0), (5, 0), (6, 0), (7, 0), (11, 0), (9, 0), (8, 0),
            (12, 0), (10, 0),
        ],
        [(3, 0), (2, 0), (6, 0), (4, 0), (5, 0), (7, 0), (1, 0), (8, 0)],
    ),
    (
        "L",
        [
            (1, 0), (2, 0), (3, 0), (4, 0), (12, 0), (6, 0), (9, 0), (8, 0), (5, 0), (10, 0),
            (11, 0), (7, 0),
        ],
        [(1, 0), (2, 0), (3, 0), (7, 1), (5, 0), (8, 1), (6, 2), (4, 2)],
    ),
    (
        "R",
        [
            (4, 0), (2, 0), (8, 0), (3, 0), (5, 0), (6, 0), (7, 0), (1, 0), (9, 0), (10, 0),
            (11, 0), (12, 0),
        ],
        [(2, 1), (5, 2), (1, 2), (4, 0), (3, 1), (6, 0), (7, 0), (8, 0)],
    ),
];

/// Whole-cube rotations. `y` turns like `U`, `x` turns like `R`.
const CUBE_ROTATIONS: [EdgeCorner; 2] = [
    (
        "y",
        [
            (5, 0), (9, 1), (1, 0), (2, 1), (7, 0), (4, 1), (3, 0), (10, 1), (6, 1), (12, 1),
            (8, 1), (11, 1),
        ],
        [(7, 0), (4, 0), (1, 0), (8, 0), (2, 0), (3, 0), (6, 0), (5, 0)],
    ),
    (
        "x",
        [
            (8, 1), (10, 0), (4, 1), (1, 1), (12, 1), (2, 0), (9, 1), (3, 1), (5, 1), (11, 0),
            (6, 0), (7, 1),
        ],
        [(3, 1), (1, 2), (5, 2), (7, 1), (2, 1), (8, 1), (6, 2), (4, 2)],
    ),
];

fn edges_and_corners(edges: &[(u16, u8)], corners: &[(u16, u8)]) -> KSolveTransformation {
    nonzero_perm(vec![edges.to_vec(), corners.to_vec()])
}

fn corners_only(corners: &[(u16, u8)]) -> KSolveTransformation {
    nonzero_perm(vec![corners.to_vec()])
}

/// The 3x3x3 Rubik's cube with its six face turns and the `x`/`y` rotations
/// generating all 24 whole-cube orientations.
pub static KPUZZLE_3X3: LazyLock<KSolve> = LazyLock::new(|| KSolve {
    name: "3x3x3".to_owned(),
    sets: vec![
        KSolveSet::new("Edges", 12.try_into().unwrap(), 2.try_into().unwrap()),
        KSolveSet::new("Corners", 8.try_into().unwrap(), 3.try_into().unwrap()),
    ],
    moves: CUBE_MOVES
        .iter()
        .map(|(name, edges, corners)| KSolveMove::new(name, edges_and_corners(edges, corners)))
        .collect(),
    symmetries: CUBE_ROTATIONS
        .iter()
        .map(|(name, edges, corners)| KSolveMove::new(name, edges_and_corners(edges, corners)))
        .collect(),
});

/// The 2x2x2 cube: the corners of the 3x3x3 and nothing else.
pub static KPUZZLE_2X2: LazyLock<KSolve> = LazyLock::new(|| KSolve {
    name: "2x2x2".to_owned(),
    sets: vec![KSolveSet::new(
        "Corners",
        8.try_into().unwrap(),
        3.try_into().unwrap(),
    )],
    moves: CUBE_MOVES
        .iter()
        .map(|(name, _, corners)| KSolveMove::new(name, corners_only(corners)))
        .collect(),
    symmetries: CUBE_ROTATIONS
        .iter()
        .map(|(name, _, corners)| KSolveMove::new(name, corners_only(corners)))
        .collect(),
});

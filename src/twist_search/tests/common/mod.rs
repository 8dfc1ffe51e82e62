#![allow(dead_code)]

use fxhash::FxHashMap;
use ksolve::{KSolve, KSolveFields, KSolveMove, KSolveSet, nonzero_perm, puzzles::KPUZZLE_2X2};
use std::{cmp::Reverse, collections::BinaryHeap};
use twist_search::{DefinitionOptions, Metric, PuzzleDef, PuzzleState};

/// A puzzle of five unoriented pieces with the given moves, each written as
/// the piece that lands in every position.
pub fn five_piece_puzzle(moves: &[(&str, [u16; 5])]) -> KSolve {
    KSolve::try_from(KSolveFields {
        name: "five pieces".to_owned(),
        sets: vec![KSolveSet::new(
            "pieces",
            5.try_into().unwrap(),
            1.try_into().unwrap(),
        )],
        moves: moves
            .iter()
            .map(|(name, perm)| {
                KSolveMove::new(
                    name,
                    nonzero_perm(vec![perm.iter().map(|&p| (p, 0)).collect()]),
                )
            })
            .collect(),
        symmetries: vec![],
    })
    .unwrap()
}

/// Two overlapping three-cycles, so four moves in two move classes.
pub fn two_cycles_def() -> PuzzleDef {
    PuzzleDef::new(
        &five_piece_puzzle(&[("A", [2, 3, 1, 4, 5]), ("B", [1, 2, 4, 5, 3])]),
        &DefinitionOptions::default(),
    )
    .unwrap()
}

/// The 2x2x2 restricted to R and U.
pub fn cube2_ru_def(metric: Metric) -> PuzzleDef {
    PuzzleDef::new(
        &KPUZZLE_2X2,
        &DefinitionOptions {
            metric,
            generators: Some(vec!["R".to_owned(), "U".to_owned()]),
            ..DefinitionOptions::default()
        },
    )
    .unwrap()
}

pub fn cube2_def() -> PuzzleDef {
    PuzzleDef::new(&KPUZZLE_2X2, &DefinitionOptions::default()).unwrap()
}

/// The exact distance from every state that can reach a goal to the nearest
/// goal, by Dijkstra's algorithm over every move.
pub fn brute_force_distances(puzzle_def: &PuzzleDef) -> FxHashMap<PuzzleState, u8> {
    let mut distances = FxHashMap::default();
    let mut queue = BinaryHeap::new();
    for goal in puzzle_def.goals() {
        queue.push(Reverse((0_u8, goal.clone())));
    }
    while let Some(Reverse((distance, puzzle_state))) = queue.pop() {
        if distances.contains_key(&puzzle_state) {
            continue;
        }
        for move_ in &puzzle_def.moves {
            let next = puzzle_state.compose(move_.puzzle_state(), &puzzle_def.sorted_orbit_defs);
            if !distances.contains_key(&next) {
                queue.push(Reverse((distance + move_.cost(), next)));
            }
        }
        distances.insert(puzzle_state, distance);
    }
    distances
}

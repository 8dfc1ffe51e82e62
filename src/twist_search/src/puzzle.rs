use crate::symmetry::{ConjugationScratch, SymmetryGroup};
use fxhash::{FxHashSet, FxHasher64};
use itertools::Itertools;
use ksolve::{KSolve, KSolveTransformation};
use serde::Deserialize;
use std::{hash::Hasher, num::NonZeroU8};
use thiserror::Error;

/// Powers are stored as `u8`, so a base move may have order at most 255.
const MAX_MOVE_ORDER: usize = u8::MAX as usize;
pub(crate) const MAX_NUM_MOVE_CLASSES: usize = u64::BITS as usize;

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct OrbitDef {
    pub piece_count: NonZeroU8,
    pub orientation_count: NonZeroU8,
}

/// A puzzle state, or equivalently a transformation of the puzzle. For every
/// sorted orbit the buffer holds `piece_count` permutation bytes followed by
/// `piece_count` orientation bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PuzzleState(Box<[u8]>);

/// The cost model used to expand and price base moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Every power of a base move costs one.
    #[default]
    Htm,
    /// Power `k` of a base move of order `n` costs `min(k, n - k)`.
    Qtm,
}

#[derive(Debug, Clone)]
pub struct Move {
    pub(crate) puzzle_state: PuzzleState,
    pub(crate) move_class_index: usize,
    pub(crate) power: u8,
    pub(crate) cost: u8,
    pub(crate) inverse_index: usize,
    pub(crate) name: String,
}

/// A named transformation that is not a search move: a whole-puzzle
/// reorientation, or a move outside the generating set. Neither is ever part
/// of a solution.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub(crate) puzzle_state: PuzzleState,
    pub(crate) name: String,
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionOptions {
    pub metric: Metric,
    /// Restrict the puzzle to these base moves, in this order.
    pub generators: Option<Vec<String>>,
    /// Goal states in addition to the solved state.
    pub extra_goals: Vec<KSolveTransformation>,
}

#[derive(Debug)]
pub struct PuzzleDef {
    pub moves: Box<[Move]>,
    // indicies into moves
    pub move_classes: Box<[usize]>,
    pub sorted_orbit_defs: Box<[OrbitDef]>,
    pub name: String,
    /// Powers of the base moves outside the generating set.
    parse_moves: Box<[Rotation]>,
    /// Every power of every declared rotation.
    rotations: Box<[Rotation]>,
    symmetry_group: SymmetryGroup,
    goals: Box<[PuzzleState]>,
    metric: Metric,
    // sorted orbit index -> KSolve set index
    arg_indicies: Box<[usize]>,
}

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Set sizes larger than 255 are not supported")]
    SetSizeTooBig,
    #[error("Could not expand move `{0}`, its order is higher than 255")]
    MoveOrderTooHigh(String),
    #[error("Move `{0}` does not change the puzzle")]
    IdentityMove(String),
    #[error("The name `{0}` is used by more than one move or rotation")]
    DuplicateMoveName(String),
    #[error("Too many move classes, expected at most {max} but got {actual}")]
    TooManyMoveClasses { max: usize, actual: usize },
    #[error("Move `{name}` refers to move class {move_class_index}, which does not exist")]
    UnknownMoveClass {
        name: String,
        move_class_index: usize,
    },
    #[error("Unknown generator `{0}`")]
    UnknownGenerator(String),
    #[error("The rotations generate more than {0} symmetries")]
    SymmetryGroupTooLarge(usize),
    #[error("Symmetry reduction needs moves and goals closed under conjugation; {0} is not")]
    SymmetryNotPreserved(String),
    #[error("Invalid set count, expected {expected} sets but got {actual}")]
    InvalidSetCount { expected: usize, actual: usize },
    #[error("Invalid piece count, expected {expected} pieces but got {actual}")]
    InvalidPieceCount { expected: u8, actual: usize },
    #[error(
        "Invalid orientation delta, expected a value between 0 and {expected} but got {actual}"
    )]
    InvalidOrientationDelta { expected: u8, actual: u8 },
    #[error("Permutation out of range, expected a value between 1 and {expected} but got {actual}")]
    PermutationOutOfRange { expected: u8, actual: u16 },
    #[error("Transformation is not a permutation: {0:?}")]
    InvalidTransformation(KSolveTransformation),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NameResolutionError {
    #[error("Unknown move `{0}`")]
    UnknownMove(String),
    #[error("Unknown move or rotation `{0}`")]
    UnknownMoveOrRotation(String),
}

/// Scratch memory for heuristic lookups. Every thread owns its own.
pub struct AuxMem {
    pub(crate) canonical: PuzzleState,
    pub(crate) scratch: ConjugationScratch,
}

#[must_use]
pub(crate) fn orbit_size(orbit_def: OrbitDef) -> usize {
    orbit_def.piece_count.get() as usize * 2
}

#[must_use]
pub fn state_len(sorted_orbit_defs: &[OrbitDef]) -> usize {
    sorted_orbit_defs.iter().copied().map(orbit_size).sum()
}

impl PuzzleState {
    pub(crate) fn solved(sorted_orbit_defs: &[OrbitDef]) -> Self {
        let mut orbit_states = Vec::with_capacity(state_len(sorted_orbit_defs));
        for orbit_def in sorted_orbit_defs {
            let piece_count = orbit_def.piece_count.get();
            orbit_states.extend(0..piece_count);
            orbit_states.extend(std::iter::repeat_n(0, piece_count as usize));
        }
        PuzzleState(orbit_states.into_boxed_slice())
    }

    pub(crate) fn from_bytes(orbit_states: Box<[u8]>) -> Self {
        PuzzleState(orbit_states)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn copy_from(&mut self, other: &Self) {
        self.0.copy_from_slice(&other.0);
    }

    pub(crate) fn copy_from_bytes(&mut self, bytes: &[u8]) {
        self.0.copy_from_slice(bytes);
    }

    /// Compose two puzzle states in place: `self` becomes `b` applied after
    /// `a`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn replace_compose(&mut self, a: &Self, b: &Self, sorted_orbit_defs: &[OrbitDef]) {
        debug_assert_eq!(state_len(sorted_orbit_defs), self.0.len());
        debug_assert_eq!(self.0.len(), a.0.len());
        debug_assert_eq!(a.0.len(), b.0.len());

        let mut base = 0;
        for &orbit_def in sorted_orbit_defs {
            let piece_count = orbit_def.piece_count.get() as usize;
            let orientation_count = u16::from(orbit_def.orientation_count.get());
            let end = base + orbit_size(orbit_def);
            let (a_perm, a_ori) = a.0[base..end].split_at(piece_count);
            let (b_perm, b_ori) = b.0[base..end].split_at(piece_count);
            let (perm, ori) = self.0[base..end].split_at_mut(piece_count);
            if orientation_count == 1 {
                for i in 0..piece_count {
                    perm[i] = a_perm[b_perm[i] as usize];
                }
                ori.fill(0);
            } else {
                for i in 0..piece_count {
                    let pos = b_perm[i] as usize;
                    perm[i] = a_perm[pos];
                    // Both summands are below `orientation_count`, so the
                    // remainder fits in a byte
                    ori[i] = ((u16::from(a_ori[pos]) + u16::from(b_ori[i])) % orientation_count)
                        as u8;
                }
            }
            base = end;
        }
    }

    /// Inverse of a puzzle state.
    #[allow(clippy::cast_possible_truncation)]
    pub fn replace_inverse(&mut self, a: &Self, sorted_orbit_defs: &[OrbitDef]) {
        debug_assert_eq!(self.0.len(), a.0.len());

        let mut base = 0;
        for &orbit_def in sorted_orbit_defs {
            let piece_count = orbit_def.piece_count.get() as usize;
            let orientation_count = orbit_def.orientation_count.get();
            let end = base + orbit_size(orbit_def);
            let (a_perm, a_ori) = a.0[base..end].split_at(piece_count);
            let (perm, ori) = self.0[base..end].split_at_mut(piece_count);
            for i in 0..piece_count {
                let pos = a_perm[i] as usize;
                // piece counts are at most 255
                perm[pos] = i as u8;
                ori[pos] = (orientation_count - a_ori[i]) % orientation_count;
            }
            base = end;
        }
    }

    /// Allocating version of `replace_compose`.
    #[must_use]
    pub fn compose(&self, b: &Self, sorted_orbit_defs: &[OrbitDef]) -> Self {
        let mut result = self.clone();
        result.replace_compose(self, b, sorted_orbit_defs);
        result
    }

    /// Allocating version of `replace_inverse`.
    #[must_use]
    pub fn inverse(&self, sorted_orbit_defs: &[OrbitDef]) -> Self {
        let mut result = self.clone();
        result.replace_inverse(self, sorted_orbit_defs);
        result
    }

    /// Whether every orbit holds a permutation and in-range orientations.
    #[must_use]
    pub fn is_well_formed(&self, sorted_orbit_defs: &[OrbitDef]) -> bool {
        if self.0.len() != state_len(sorted_orbit_defs) {
            return false;
        }
        let mut base = 0;
        for &orbit_def in sorted_orbit_defs {
            let piece_count = orbit_def.piece_count.get() as usize;
            let end = base + orbit_size(orbit_def);
            let (perm, ori) = self.0[base..end].split_at(piece_count);
            let mut covered = vec![false; piece_count];
            for &p in perm {
                match covered.get_mut(p as usize) {
                    Some(seen) if !*seen => *seen = true,
                    _ => return false,
                }
            }
            if ori
                .iter()
                .any(|&o| o >= orbit_def.orientation_count.get())
            {
                return false;
            }
            base = end;
        }
        true
    }
}

impl Metric {
    /// The cost of `power` of a base move of order `order`.
    #[must_use]
    pub fn cost(self, power: u8, order: u8) -> u8 {
        match self {
            Metric::Htm => 1,
            Metric::Qtm => power.min(order - power),
        }
    }
}

impl Move {
    #[must_use]
    pub fn puzzle_state(&self) -> &PuzzleState {
        &self.puzzle_state
    }

    #[must_use]
    pub fn move_class_index(&self) -> usize {
        self.move_class_index
    }

    #[must_use]
    pub fn power(&self) -> u8 {
        self.power
    }

    #[must_use]
    pub fn cost(&self) -> u8 {
        self.cost
    }

    #[must_use]
    pub fn inverse_index(&self) -> usize {
        self.inverse_index
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commutes_with(
        &self,
        other: &Self,
        result_1: &mut PuzzleState,
        result_2: &mut PuzzleState,
        sorted_orbit_defs: &[OrbitDef],
    ) -> bool {
        result_1.replace_compose(&self.puzzle_state, &other.puzzle_state, sorted_orbit_defs);
        result_2.replace_compose(&other.puzzle_state, &self.puzzle_state, sorted_orbit_defs);
        result_1 == result_2
    }
}

impl Rotation {
    #[must_use]
    pub fn puzzle_state(&self) -> &PuzzleState {
        &self.puzzle_state
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Split a move list into tokens. Whitespace, control characters and commas
/// all separate tokens.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c <= ' ' || c == ',')
        .filter(|token| !token.is_empty())
}

/// Name of `power` of `base_name`: a signed twist of the smaller magnitude,
/// `'` marking the negative direction.
fn power_name(base_name: &str, power: u8, order: u8) -> String {
    let order = isize::from(order);
    let mut twist = isize::from(power);
    if order - twist < twist {
        twist -= order;
    }
    let mut name = base_name.to_owned();
    if twist.abs() != 1 {
        name.push_str(&twist.abs().to_string());
    }
    if twist < 0 {
        name.push('\'');
    }
    name
}

/// Every nontrivial power of `base_state`, starting with `base_state` itself.
fn expand_powers(
    base_state: &PuzzleState,
    solved: &PuzzleState,
    sorted_orbit_defs: &[OrbitDef],
    name: &str,
) -> Result<Vec<PuzzleState>, DefinitionError> {
    if base_state == solved {
        return Err(DefinitionError::IdentityMove(name.to_owned()));
    }
    let mut result_1 = base_state.clone();
    let mut result_2 = base_state.clone();
    let mut powers = vec![base_state.clone()];
    loop {
        result_1.replace_compose(&result_2, base_state, sorted_orbit_defs);
        if result_1 == *solved {
            return Ok(powers);
        }
        if powers.len() + 1 >= MAX_MOVE_ORDER {
            return Err(DefinitionError::MoveOrderTooHigh(name.to_owned()));
        }
        powers.push(result_1.clone());
        std::mem::swap(&mut result_1, &mut result_2);
    }
}

/// Name the powers of `base_name`, claiming every name in `names`.
fn named_powers(
    base_name: &str,
    powers: Vec<PuzzleState>,
    names: &mut FxHashSet<String>,
) -> Result<Vec<Rotation>, DefinitionError> {
    // Checked against MAX_MOVE_ORDER in expand_powers
    #[allow(clippy::cast_possible_truncation)]
    let order = (powers.len() + 1) as u8;
    (1..=order)
        .zip(powers)
        .map(|(power, puzzle_state)| {
            let name = power_name(base_name, power, order);
            if !names.insert(name.clone()) {
                return Err(DefinitionError::DuplicateMoveName(name));
            }
            Ok(Rotation { puzzle_state, name })
        })
        .collect()
}

impl PuzzleDef {
    /// Create a new `PuzzleDef` from a `KSolve` definition.
    ///
    /// # Errors
    ///
    /// The `KSolve` definition could not be converted to a `PuzzleDef`. See
    /// `DefinitionError`.
    pub fn new(ksolve: &KSolve, options: &DefinitionOptions) -> Result<Self, DefinitionError> {
        let ksolve_orbit_defs: Vec<OrbitDef> = ksolve
            .sets()
            .iter()
            .map(|ksolve_set| {
                Ok(OrbitDef {
                    piece_count: ksolve_set
                        .piece_count()
                        .try_into()
                        .map_err(|_| DefinitionError::SetSizeTooBig)?,
                    orientation_count: ksolve_set.orientation_count(),
                })
            })
            .collect::<Result<_, DefinitionError>>()?;

        let mut arg_indicies = (0..ksolve_orbit_defs.len()).collect_vec();
        arg_indicies.sort_by_key(|&i| {
            (
                ksolve_orbit_defs[i].piece_count.get(),
                ksolve_orbit_defs[i].orientation_count.get(),
            )
        });
        let sorted_orbit_defs: Box<[OrbitDef]> = arg_indicies
            .iter()
            .map(|&i| ksolve_orbit_defs[i])
            .collect();
        let solved =
            translate_transformation(&ksolve.solved(), &sorted_orbit_defs, &arg_indicies)?;

        let base_moves = match &options.generators {
            Some(generators) => generators
                .iter()
                .map(|generator| {
                    ksolve
                        .moves()
                        .iter()
                        .find(|ksolve_move| ksolve_move.name() == generator)
                        .ok_or_else(|| DefinitionError::UnknownGenerator(generator.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => ksolve.moves().iter().collect(),
        };

        let mut names = FxHashSet::default();
        let mut moves = vec![];
        let mut move_classes = vec![];

        for ksolve_move in &base_moves {
            let base_state = translate_transformation(
                ksolve_move.transformation(),
                &sorted_orbit_defs,
                &arg_indicies,
            )?;
            let move_powers =
                expand_powers(&base_state, &solved, &sorted_orbit_defs, ksolve_move.name())?;

            // Checked against MAX_MOVE_ORDER in expand_powers
            #[allow(clippy::cast_possible_truncation)]
            let order = (move_powers.len() + 1) as u8;
            let class_start = moves.len();
            let move_class_index = move_classes.len();
            move_classes.push(class_start);

            for (power, puzzle_state) in (1..=order).zip(move_powers) {
                let name = power_name(ksolve_move.name(), power, order);
                if !names.insert(name.clone()) {
                    return Err(DefinitionError::DuplicateMoveName(name));
                }
                moves.push(Move {
                    puzzle_state,
                    move_class_index,
                    power,
                    cost: options.metric.cost(power, order),
                    inverse_index: class_start + (order - power) as usize - 1,
                    name,
                });
            }
        }

        if move_classes.len() > MAX_NUM_MOVE_CLASSES {
            return Err(DefinitionError::TooManyMoveClasses {
                max: MAX_NUM_MOVE_CLASSES,
                actual: move_classes.len(),
            });
        }

        // Moves left out of the generating set can still appear in scrambles
        let mut parse_moves = vec![];
        for ksolve_move in ksolve.moves() {
            if base_moves
                .iter()
                .any(|base_move| base_move.name() == ksolve_move.name())
            {
                continue;
            }
            let base_state = translate_transformation(
                ksolve_move.transformation(),
                &sorted_orbit_defs,
                &arg_indicies,
            )?;
            parse_moves.extend(named_powers(
                ksolve_move.name(),
                expand_powers(&base_state, &solved, &sorted_orbit_defs, ksolve_move.name())?,
                &mut names,
            )?);
        }

        let mut rotation_generators = vec![];
        let mut rotations = vec![];
        for ksolve_symmetry in ksolve.symmetries() {
            let base_state = translate_transformation(
                ksolve_symmetry.transformation(),
                &sorted_orbit_defs,
                &arg_indicies,
            )?;
            rotations.extend(named_powers(
                ksolve_symmetry.name(),
                expand_powers(
                    &base_state,
                    &solved,
                    &sorted_orbit_defs,
                    ksolve_symmetry.name(),
                )?,
                &mut names,
            )?);
            rotation_generators.push(base_state);
        }
        let symmetry_group = SymmetryGroup::new(&rotation_generators, &sorted_orbit_defs)?;

        let mut goals = vec![solved];
        for extra_goal in &options.extra_goals {
            let goal = translate_transformation(extra_goal, &sorted_orbit_defs, &arg_indicies)?;
            if !goals.contains(&goal) {
                goals.push(goal);
            }
        }

        Ok(PuzzleDef {
            moves: moves.into_boxed_slice(),
            move_classes: move_classes.into_boxed_slice(),
            sorted_orbit_defs,
            name: ksolve.name().to_owned(),
            parse_moves: parse_moves.into_boxed_slice(),
            rotations: rotations.into_boxed_slice(),
            symmetry_group,
            goals: goals.into_boxed_slice(),
            metric: options.metric,
            arg_indicies: arg_indicies.into_boxed_slice(),
        })
    }

    #[must_use]
    pub fn rotations(&self) -> &[Rotation] {
        &self.rotations
    }

    #[must_use]
    pub fn symmetry_group(&self) -> &SymmetryGroup {
        &self.symmetry_group
    }

    #[must_use]
    pub fn goals(&self) -> &[PuzzleState] {
        &self.goals
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Look up a move by name.
    ///
    /// # Errors
    ///
    /// If no move has that name.
    pub fn find_move(&self, name: &str) -> Result<&Move, NameResolutionError> {
        self.find_move_index(name).map(|i| &self.moves[i])
    }

    /// Look up the index of a move by name.
    ///
    /// # Errors
    ///
    /// If no move has that name.
    pub fn find_move_index(&self, name: &str) -> Result<usize, NameResolutionError> {
        self.moves
            .iter()
            .position(|move_| move_.name == name)
            .ok_or_else(|| NameResolutionError::UnknownMove(name.to_owned()))
    }

    #[must_use]
    pub fn find_rotation(&self, name: &str) -> Option<&Rotation> {
        self.rotations.iter().find(|rotation| rotation.name == name)
    }

    /// Resolve a name to a move index, or to `moves.len() + i` for the `i`th
    /// rotation.
    ///
    /// # Errors
    ///
    /// If the name is neither a move nor a rotation.
    pub fn resolve_move_or_rotation(&self, name: &str) -> Result<usize, NameResolutionError> {
        self.find_move_index(name)
            .ok()
            .or_else(|| {
                self.rotations
                    .iter()
                    .position(|rotation| rotation.name == name)
                    .map(|i| self.moves.len() + i)
            })
            .ok_or_else(|| NameResolutionError::UnknownMoveOrRotation(name.to_owned()))
    }

    /// Find the transformation of a move, falling back to moves outside the
    /// generating set and then to rotations.
    ///
    /// # Errors
    ///
    /// If the name is neither a move of the puzzle nor a rotation.
    pub fn find_move_generously(&self, name: &str) -> Result<&PuzzleState, NameResolutionError> {
        if let Ok(move_) = self.find_move(name) {
            return Ok(&move_.puzzle_state);
        }
        self.parse_moves
            .iter()
            .chain(&self.rotations)
            .find(|transformation| transformation.name == name)
            .map(|transformation| &transformation.puzzle_state)
            .ok_or_else(|| NameResolutionError::UnknownMoveOrRotation(name.to_owned()))
    }

    /// Parse a list of move names into move indices.
    ///
    /// # Errors
    ///
    /// The first token that does not name a move.
    pub fn parse_move_list(&self, text: &str) -> Result<Vec<usize>, NameResolutionError> {
        tokenize(text)
            .map(|token| self.find_move_index(token))
            .collect()
    }

    /// Parse a list of move and rotation names. See
    /// `resolve_move_or_rotation` for the index space.
    ///
    /// # Errors
    ///
    /// The first token that is neither a move nor a rotation.
    pub fn parse_move_or_rotation_list(
        &self,
        text: &str,
    ) -> Result<Vec<usize>, NameResolutionError> {
        tokenize(text)
            .map(|token| self.resolve_move_or_rotation(token))
            .collect()
    }

    /// Parse a list of names that may be any move of the puzzle or any
    /// rotation. See `find_move_generously`.
    ///
    /// # Errors
    ///
    /// The first token that is neither a move of the puzzle nor a rotation.
    pub fn parse_move_list_generously(
        &self,
        text: &str,
    ) -> Result<Vec<&PuzzleState>, NameResolutionError> {
        tokenize(text)
            .map(|token| self.find_move_generously(token))
            .collect()
    }

    /// Apply a generously parsed move list to `puzzle_state`. This is how
    /// scrambles are read.
    ///
    /// # Errors
    ///
    /// The first token that is neither a move of the puzzle nor a rotation.
    pub fn apply_move_list_generously(
        &self,
        puzzle_state: &PuzzleState,
        text: &str,
    ) -> Result<PuzzleState, NameResolutionError> {
        let mut result_1 = puzzle_state.clone();
        let mut result_2 = puzzle_state.clone();
        for transformation in self.parse_move_list_generously(text)? {
            result_2.replace_compose(&result_1, transformation, &self.sorted_orbit_defs);
            std::mem::swap(&mut result_1, &mut result_2);
        }
        Ok(result_1)
    }

    fn move_or_rotation_state(&self, index: usize) -> &PuzzleState {
        match self.moves.get(index) {
            Some(move_) => &move_.puzzle_state,
            None => &self.rotations[index - self.moves.len()].puzzle_state,
        }
    }

    #[must_use]
    pub fn new_solved_state(&self) -> PuzzleState {
        PuzzleState::solved(&self.sorted_orbit_defs)
    }

    #[must_use]
    pub fn new_aux_mem(&self) -> AuxMem {
        AuxMem {
            canonical: self.new_solved_state(),
            scratch: ConjugationScratch::new(self.new_solved_state()),
        }
    }

    /// Apply moves (and rotations, as indexed by
    /// `resolve_move_or_rotation`) to a state.
    ///
    /// # Panics
    ///
    /// Panics if an index is neither a move nor a rotation.
    #[must_use]
    pub fn apply_move_indices(&self, puzzle_state: &PuzzleState, indices: &[usize]) -> PuzzleState {
        let mut result_1 = puzzle_state.clone();
        let mut result_2 = puzzle_state.clone();
        for &index in indices {
            result_2.replace_compose(
                &result_1,
                self.move_or_rotation_state(index),
                &self.sorted_orbit_defs,
            );
            std::mem::swap(&mut result_1, &mut result_2);
        }
        result_1
    }

    /// Convert a KSolve transformation, given in the set order of the original
    /// definition, to a puzzle state.
    ///
    /// # Errors
    ///
    /// If the transformation does not fit the puzzle's sets.
    pub fn state_from_transformation(
        &self,
        transformation: &KSolveTransformation,
    ) -> Result<PuzzleState, DefinitionError> {
        translate_transformation(transformation, &self.sorted_orbit_defs, &self.arg_indicies)
    }

    #[must_use]
    pub fn is_goal(&self, puzzle_state: &PuzzleState) -> bool {
        self.goals.iter().any(|goal| goal == puzzle_state)
    }

    /// A hash of everything that determines the contents of a pruning table:
    /// orbit definitions, move transformations and costs, goals and
    /// symmetries.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher64::default();
        for orbit_def in &self.sorted_orbit_defs {
            hasher.write_u8(orbit_def.piece_count.get());
            hasher.write_u8(orbit_def.orientation_count.get());
        }
        hasher.write_usize(self.moves.len());
        for move_ in &self.moves {
            hasher.write(move_.puzzle_state.as_bytes());
            hasher.write_u8(move_.cost);
        }
        hasher.write_usize(self.goals.len());
        for goal in &self.goals {
            hasher.write(goal.as_bytes());
        }
        hasher.write_usize(self.symmetry_group.order());
        for element in self.symmetry_group.elements() {
            hasher.write(element.as_bytes());
        }
        hasher.finish()
    }
}

fn translate_transformation(
    transformation: &KSolveTransformation,
    sorted_orbit_defs: &[OrbitDef],
    arg_indicies: &[usize],
) -> Result<PuzzleState, DefinitionError> {
    if transformation.len() != sorted_orbit_defs.len() {
        return Err(DefinitionError::InvalidSetCount {
            expected: sorted_orbit_defs.len(),
            actual: transformation.len(),
        });
    }

    let mut orbit_states = Vec::with_capacity(state_len(sorted_orbit_defs));
    for (&orbit_def, &ksolve_index) in sorted_orbit_defs.iter().zip(arg_indicies) {
        let perm_and_ori = &transformation[ksolve_index];
        let piece_count = orbit_def.piece_count.get();
        // An empty set transformation leaves the set alone
        if perm_and_ori.is_empty() {
            orbit_states.extend(0..piece_count);
            orbit_states.extend(std::iter::repeat_n(0, piece_count as usize));
            continue;
        }
        if perm_and_ori.len() != piece_count as usize {
            return Err(DefinitionError::InvalidPieceCount {
                expected: piece_count,
                actual: perm_and_ori.len(),
            });
        }

        let max_orientation_delta = orbit_def.orientation_count.get() - 1;
        let mut covered_perms = vec![false; piece_count as usize];
        let mut oris = Vec::with_capacity(piece_count as usize);
        for &(perm, orientation_delta) in perm_and_ori {
            if orientation_delta > max_orientation_delta {
                return Err(DefinitionError::InvalidOrientationDelta {
                    expected: max_orientation_delta,
                    actual: orientation_delta,
                });
            }
            let zero_indexed = perm.get() - 1;
            match covered_perms.get_mut(zero_indexed as usize) {
                Some(covered) => *covered = true,
                None => {
                    return Err(DefinitionError::PermutationOutOfRange {
                        expected: piece_count,
                        actual: perm.get(),
                    });
                }
            }
            // In range of a u8 piece count, checked above
            #[allow(clippy::cast_possible_truncation)]
            orbit_states.push(zero_indexed as u8);
            oris.push(orientation_delta);
        }
        if covered_perms.iter().any(|&covered| !covered) {
            return Err(DefinitionError::InvalidTransformation(
                transformation.clone(),
            ));
        }
        orbit_states.extend(oris);
    }
    Ok(PuzzleState::from_bytes(orbit_states.into_boxed_slice()))
}

/// A utility function for testing. Not optimized.
///
/// # Panics
///
/// Panics if the move sequence is invalid.
#[must_use]
pub fn apply_moves(
    puzzle_def: &PuzzleDef,
    puzzle_state: &PuzzleState,
    moves: &str,
    repeat: u32,
) -> PuzzleState {
    let mut result = puzzle_state.clone();
    for _ in 0..repeat {
        result =
            puzzle_def.apply_move_indices(&result, &puzzle_def.parse_move_list(moves).unwrap());
    }
    result
}

/// Return a puzzle state scrambled by `random_move_count` random moves.
#[must_use]
pub fn apply_random_moves(
    puzzle_def: &PuzzleDef,
    solved: &PuzzleState,
    random_move_count: u32,
) -> PuzzleState {
    let mut result_1 = solved.clone();
    let mut result_2 = solved.clone();
    for _ in 0..random_move_count {
        let move_ = &puzzle_def.moves[fastrand::usize(..puzzle_def.moves.len())];
        result_1.replace_compose(&result_2, &move_.puzzle_state, &puzzle_def.sorted_orbit_defs);
        std::mem::swap(&mut result_2, &mut result_1);
    }
    result_2
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksolve::{
        KSolveFields, KSolveMove, KSolveSet, nonzero_perm,
        puzzles::{KPUZZLE_2X2, KPUZZLE_3X3},
    };

    fn cube3_def() -> PuzzleDef {
        PuzzleDef::new(&KPUZZLE_3X3, &DefinitionOptions::default()).unwrap()
    }

    fn toy(moves: Vec<(&str, Vec<(u16, u8)>)>) -> KSolve {
        KSolve::try_from(KSolveFields {
            name: "toy".to_owned(),
            sets: vec![KSolveSet::new(
                "pieces",
                5.try_into().unwrap(),
                1.try_into().unwrap(),
            )],
            moves: moves
                .into_iter()
                .map(|(name, perm)| KSolveMove::new(name, nonzero_perm(vec![perm])))
                .collect(),
            symmetries: vec![],
        })
        .unwrap()
    }

    #[test]
    fn test_expanded_move_names() {
        let cube3_def = cube3_def();
        let names = cube3_def.moves.iter().map(Move::name).collect_vec();
        assert_eq!(
            names,
            [
                "F", "F2", "F'", "B", "B2", "B'", "D", "D2", "D'", "U", "U2", "U'", "L", "L2",
                "L'", "R", "R2", "R'"
            ]
        );
        assert_eq!(&*cube3_def.move_classes, &[0, 3, 6, 9, 12, 15]);
    }

    #[test]
    fn test_power_names_of_odd_orders() {
        assert_eq!(power_name("A", 1, 5), "A");
        assert_eq!(power_name("A", 2, 5), "A2");
        assert_eq!(power_name("A", 3, 5), "A2'");
        assert_eq!(power_name("A", 4, 5), "A'");
        assert_eq!(power_name("A", 2, 3), "A'");
    }

    #[test]
    fn test_inverse_indices() {
        let cube3_def = cube3_def();
        let solved = cube3_def.new_solved_state();
        for (i, move_) in cube3_def.moves.iter().enumerate() {
            let inverse = &cube3_def.moves[move_.inverse_index];
            assert_eq!(inverse.inverse_index, i);
            assert_eq!(
                move_
                    .puzzle_state
                    .compose(&inverse.puzzle_state, &cube3_def.sorted_orbit_defs),
                solved
            );
            assert_eq!(
                move_.puzzle_state.inverse(&cube3_def.sorted_orbit_defs),
                inverse.puzzle_state
            );
        }
    }

    #[test]
    fn test_qtm_costs() {
        let options = DefinitionOptions {
            metric: Metric::Qtm,
            ..DefinitionOptions::default()
        };
        let cube3_def = PuzzleDef::new(&KPUZZLE_3X3, &options).unwrap();
        assert_eq!(cube3_def.find_move("R").unwrap().cost(), 1);
        assert_eq!(cube3_def.find_move("R2").unwrap().cost(), 2);
        assert_eq!(cube3_def.find_move("R'").unwrap().cost(), 1);
        assert!(
            cube3_def
                .moves
                .iter()
                .all(|move_| move_.cost() == move_.power().min(4 - move_.power()))
        );
    }

    #[test]
    fn test_orbits_are_sorted() {
        let cube3_def = cube3_def();
        assert_eq!(cube3_def.sorted_orbit_defs[0].piece_count.get(), 8);
        assert_eq!(cube3_def.sorted_orbit_defs[1].piece_count.get(), 12);
        let solved = cube3_def.new_solved_state();
        assert_eq!(solved.as_bytes().len(), 40);
        assert!(solved.is_well_formed(&cube3_def.sorted_orbit_defs));
    }

    #[test]
    fn test_commutes_with() {
        let cube3_def = cube3_def();
        let mut result_1 = cube3_def.new_solved_state();
        let mut result_2 = result_1.clone();
        let sorted_orbit_defs = &cube3_def.sorted_orbit_defs;

        let u_move = cube3_def.find_move("U").unwrap();
        let d2_move = cube3_def.find_move("D2").unwrap();
        let r_move = cube3_def.find_move("R").unwrap();

        assert!(u_move.commutes_with(u_move, &mut result_1, &mut result_2, sorted_orbit_defs));
        assert!(d2_move.commutes_with(d2_move, &mut result_1, &mut result_2, sorted_orbit_defs));
        assert!(u_move.commutes_with(d2_move, &mut result_1, &mut result_2, sorted_orbit_defs));
        assert!(!u_move.commutes_with(r_move, &mut result_1, &mut result_2, sorted_orbit_defs));
        assert!(!d2_move.commutes_with(r_move, &mut result_1, &mut result_2, sorted_orbit_defs));
    }

    #[test]
    fn test_sexy_move_order() {
        let cube3_def = cube3_def();
        let solved = cube3_def.new_solved_state();
        let once = apply_moves(&cube3_def, &solved, "R U R' U'", 1);
        assert_ne!(once, solved);
        assert!(once.is_well_formed(&cube3_def.sorted_orbit_defs));
        assert_eq!(apply_moves(&cube3_def, &solved, "R U R' U'", 6), solved);
    }

    #[test]
    fn test_parse_move_list() {
        let cube3_def = cube3_def();
        let indices = cube3_def.parse_move_list("R U R'").unwrap();
        assert_eq!(indices.len(), 3);
        assert_eq!(cube3_def.moves[indices[0]].name(), "R");
        assert_eq!(cube3_def.moves[indices[1]].name(), "U");
        assert_eq!(cube3_def.moves[indices[0]].inverse_index(), indices[2]);

        assert_eq!(
            cube3_def.parse_move_list(" R,U\tR'\n").unwrap(),
            indices
        );
        assert!(cube3_def.parse_move_list("").unwrap().is_empty());
        assert_eq!(
            cube3_def.parse_move_list("R Q U"),
            Err(NameResolutionError::UnknownMove("Q".to_owned()))
        );
    }

    #[test]
    fn test_rotation_lookup() {
        let cube3_def = cube3_def();
        let moves_len = cube3_def.moves.len();
        let rotation_names = cube3_def.rotations().iter().map(Rotation::name).collect_vec();
        assert_eq!(rotation_names, ["y", "y2", "y'", "x", "x2", "x'"]);
        assert_eq!(cube3_def.resolve_move_or_rotation("R").unwrap(), 15);
        assert_eq!(cube3_def.resolve_move_or_rotation("y").unwrap(), moves_len);
        assert_eq!(cube3_def.resolve_move_or_rotation("y'").unwrap(), moves_len + 2);
        assert_eq!(cube3_def.resolve_move_or_rotation("x").unwrap(), moves_len + 3);
        assert_eq!(
            cube3_def.resolve_move_or_rotation("z"),
            Err(NameResolutionError::UnknownMoveOrRotation("z".to_owned()))
        );
        assert!(matches!(
            cube3_def.find_move("y"),
            Err(NameResolutionError::UnknownMove(_))
        ));
        assert_eq!(
            cube3_def.find_move_generously("y").unwrap(),
            cube3_def.find_rotation("y").unwrap().puzzle_state()
        );
        assert_eq!(
            cube3_def.find_move_generously("R2").unwrap(),
            cube3_def.find_move("R2").unwrap().puzzle_state()
        );

        let solved = cube3_def.new_solved_state();
        let indices = cube3_def.parse_move_or_rotation_list("y R y'").unwrap();
        assert_eq!(indices.len(), 3);
        // Conjugating R by y turns a different face
        let conjugated = cube3_def.apply_move_indices(&solved, &indices);
        assert!(conjugated.is_well_formed(&cube3_def.sorted_orbit_defs));
        assert_ne!(conjugated, apply_moves(&cube3_def, &solved, "R", 1));
        assert!(
            cube3_def
                .moves
                .iter()
                .any(|move_| move_.puzzle_state() == &conjugated)
        );

        let y2 = cube3_def.apply_move_indices(
            &solved,
            &cube3_def.parse_move_or_rotation_list("y y").unwrap(),
        );
        assert_eq!(&y2, cube3_def.find_rotation("y2").unwrap().puzzle_state());
    }

    #[test]
    fn test_generous_parsing_reaches_every_puzzle_move() {
        let options = DefinitionOptions {
            generators: Some(vec!["R".to_owned(), "U".to_owned()]),
            ..DefinitionOptions::default()
        };
        let restricted = PuzzleDef::new(&KPUZZLE_3X3, &options).unwrap();
        let full = cube3_def();
        assert!(matches!(
            restricted.parse_move_list("R F"),
            Err(NameResolutionError::UnknownMove(name)) if name == "F"
        ));
        assert_eq!(restricted.parse_move_list_generously("R F2 x y'").unwrap().len(), 4);

        let restricted_solved = restricted.new_solved_state();
        let full_solved = full.new_solved_state();
        for scramble in ["F", "R F' U2 B D L2", "y R y'", "x2 F"] {
            assert_eq!(
                restricted
                    .apply_move_list_generously(&restricted_solved, scramble)
                    .unwrap(),
                full.apply_move_list_generously(&full_solved, scramble).unwrap(),
                "{scramble}"
            );
        }
        assert_eq!(
            restricted.apply_move_list_generously(&restricted_solved, "R Q"),
            Err(NameResolutionError::UnknownMoveOrRotation("Q".to_owned()))
        );
        // Generous parsing never turns a non-generating move into a search move
        assert_eq!(restricted.moves.len(), 6);
    }

    #[test]
    fn test_rotation_named_like_a_move_rejected() {
        let ksolve = KSolve::try_from(KSolveFields {
            name: "toy".to_owned(),
            sets: vec![KSolveSet::new(
                "pieces",
                5.try_into().unwrap(),
                1.try_into().unwrap(),
            )],
            moves: vec![KSolveMove::new(
                "A",
                nonzero_perm(vec![vec![(2, 0), (3, 0), (1, 0), (4, 0), (5, 0)]]),
            )],
            symmetries: vec![KSolveMove::new(
                "A'",
                nonzero_perm(vec![vec![(1, 0), (2, 0), (3, 0), (5, 0), (4, 0)]]),
            )],
        })
        .unwrap();
        assert!(matches!(
            PuzzleDef::new(&ksolve, &DefinitionOptions::default()),
            Err(DefinitionError::DuplicateMoveName(name)) if name == "A'"
        ));
    }

    #[test]
    fn test_symmetry_group_of_cube() {
        let cube3_def = cube3_def();
        assert_eq!(cube3_def.symmetry_group().order(), 24);
        let cube2_def = PuzzleDef::new(&KPUZZLE_2X2, &DefinitionOptions::default()).unwrap();
        assert_eq!(cube2_def.symmetry_group().order(), 24);
    }

    #[test]
    fn test_generators() {
        let options = DefinitionOptions {
            generators: Some(vec!["U".to_owned(), "R".to_owned()]),
            ..DefinitionOptions::default()
        };
        let cube3_def = PuzzleDef::new(&KPUZZLE_3X3, &options).unwrap();
        assert_eq!(cube3_def.move_classes.len(), 2);
        assert_eq!(cube3_def.moves[0].name(), "U");

        let options = DefinitionOptions {
            generators: Some(vec!["U".to_owned(), "M".to_owned()]),
            ..DefinitionOptions::default()
        };
        assert!(matches!(
            PuzzleDef::new(&KPUZZLE_3X3, &options),
            Err(DefinitionError::UnknownGenerator(name)) if name == "M"
        ));
    }

    #[test]
    fn test_identity_move_rejected() {
        let ksolve = toy(vec![("I", vec![(1, 0), (2, 0), (3, 0), (4, 0), (5, 0)])]);
        assert!(matches!(
            PuzzleDef::new(&ksolve, &DefinitionOptions::default()),
            Err(DefinitionError::IdentityMove(name)) if name == "I"
        ));
    }

    #[test]
    fn test_duplicate_move_name_rejected() {
        // A2 of a five cycle collides with the base move named A2
        let ksolve = toy(vec![
            ("A", vec![(2, 0), (3, 0), (4, 0), (5, 0), (1, 0)]),
            ("A2", vec![(2, 0), (1, 0), (3, 0), (4, 0), (5, 0)]),
        ]);
        assert!(matches!(
            PuzzleDef::new(&ksolve, &DefinitionOptions::default()),
            Err(DefinitionError::DuplicateMoveName(name)) if name == "A2"
        ));
    }

    #[test]
    fn test_extra_goals() {
        let ksolve = toy(vec![("A", vec![(2, 0), (3, 0), (1, 0), (4, 0), (5, 0)])]);
        let options = DefinitionOptions {
            extra_goals: vec![nonzero_perm(vec![vec![(1, 0), (2, 0), (3, 0), (5, 0), (4, 0)]])],
            ..DefinitionOptions::default()
        };
        let toy_def = PuzzleDef::new(&ksolve, &options).unwrap();
        assert_eq!(toy_def.goals().len(), 2);
        let swapped = toy_def
            .state_from_transformation(&nonzero_perm(vec![vec![
                (1, 0),
                (2, 0),
                (3, 0),
                (5, 0),
                (4, 0),
            ]]))
            .unwrap();
        assert!(toy_def.is_goal(&swapped));
        assert!(toy_def.is_goal(&toy_def.new_solved_state()));

        let bad = toy_def.state_from_transformation(&nonzero_perm(vec![vec![(1, 0), (2, 0)]]));
        assert!(matches!(
            bad,
            Err(DefinitionError::InvalidPieceCount { expected: 5, actual: 2 })
        ));
    }

    #[test]
    fn test_fingerprint_depends_on_metric() {
        let htm = cube3_def();
        let qtm = PuzzleDef::new(
            &KPUZZLE_3X3,
            &DefinitionOptions {
                metric: Metric::Qtm,
                ..DefinitionOptions::default()
            },
        )
        .unwrap();
        assert_eq!(htm.fingerprint(), cube3_def().fingerprint());
        assert_ne!(htm.fingerprint(), qtm.fingerprint());
    }
}

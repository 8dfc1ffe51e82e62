//! Reading and writing pruning tables.
//!
//! Every number is little endian:
//!
//! | field        | size       |
//! |--------------|------------|
//! | magic `TWPT` | 4          |
//! | version      | 4          |
//! | fingerprint  | 8          |
//! | depth        | 1          |
//! | symmetry     | 1          |
//! | complete     | 1          |
//! | truncated    | 1          |
//! | key length   | 4          |
//! | entry count  | 8          |
//! | entries      | count × (key length + 1) |

use super::{ExactTable, PruneTableBuildReport};
use crate::{puzzle::PuzzleDef, start, success};
use log::info;
use std::{
    io::{self, Read, Write},
    time::Instant,
};
use thiserror::Error;

const MAGIC: [u8; 4] = *b"TWPT";
const VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PruneTableLoadError {
    #[error("Not a pruning table file")]
    BadMagic,
    #[error("Unsupported pruning table version {0}")]
    UnsupportedVersion(u32),
    #[error("The pruning table was built for a different puzzle definition")]
    FingerprintMismatch,
    #[error("The pruning table has symmetry_reduction = {stored}, not {requested}")]
    SymmetryModeMismatch { stored: bool, requested: bool },
    #[error("Corrupt pruning table: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for PruneTableLoadError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            PruneTableLoadError::Corrupt("unexpected end of file".to_owned())
        } else {
            PruneTableLoadError::Io(err)
        }
    }
}

fn read_array<const N: usize>(reader: &mut impl Read) -> io::Result<[u8; N]> {
    let mut buf = [0; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_flag(reader: &mut impl Read, field: &str) -> Result<bool, PruneTableLoadError> {
    match read_array::<1>(reader)? {
        [0] => Ok(false),
        [1] => Ok(true),
        [other] => Err(PruneTableLoadError::Corrupt(format!(
            "invalid {field} flag {other}"
        ))),
    }
}

impl ExactTable {
    /// Write the table so that `read_from` can restore it.
    ///
    /// # Errors
    ///
    /// Any error from the writer.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&self.fingerprint.to_le_bytes())?;
        writer.write_all(&[
            self.depth,
            u8::from(self.symmetry_reduction),
            u8::from(self.complete),
            u8::from(self.build_report.truncated),
        ])?;
        // Keys are as long as a puzzle state, which is far below 4 GiB
        #[allow(clippy::cast_possible_truncation)]
        writer.write_all(&(self.arena.key_len() as u32).to_le_bytes())?;
        writer.write_all(&(self.arena.len() as u64).to_le_bytes())?;
        for (entry, &distance) in self.distances.iter().enumerate() {
            writer.write_all(self.arena.key(entry))?;
            writer.write_all(&[distance])?;
        }
        writer.flush()
    }

    /// Load a table written by `write_to` for use with `puzzle_def`.
    ///
    /// # Errors
    ///
    /// If the data is not a pruning table, was built for a different puzzle
    /// definition or symmetry mode, or is damaged.
    pub fn read_from(
        reader: &mut impl Read,
        puzzle_def: &PuzzleDef,
        symmetry_reduction: bool,
    ) -> Result<Self, PruneTableLoadError> {
        info!(start!("Loading the pruning table for {}"), puzzle_def.name);
        let start = Instant::now();

        if read_array::<4>(reader)? != MAGIC {
            return Err(PruneTableLoadError::BadMagic);
        }
        let version = u32::from_le_bytes(read_array(reader)?);
        if version != VERSION {
            return Err(PruneTableLoadError::UnsupportedVersion(version));
        }
        if u64::from_le_bytes(read_array(reader)?) != puzzle_def.fingerprint() {
            return Err(PruneTableLoadError::FingerprintMismatch);
        }
        let [depth] = read_array(reader)?;
        let stored_symmetry_reduction = read_flag(reader, "symmetry")?;
        if stored_symmetry_reduction != symmetry_reduction {
            return Err(PruneTableLoadError::SymmetryModeMismatch {
                stored: stored_symmetry_reduction,
                requested: symmetry_reduction,
            });
        }
        let complete = read_flag(reader, "complete")?;
        let truncated = read_flag(reader, "truncated")?;

        let mut table = Self::empty(puzzle_def, depth, symmetry_reduction);
        let key_len = u32::from_le_bytes(read_array(reader)?) as usize;
        if key_len != table.arena.key_len() {
            return Err(PruneTableLoadError::Corrupt(format!(
                "key length {key_len} does not match the state length {}",
                table.arena.key_len()
            )));
        }
        let count = u64::from_le_bytes(read_array(reader)?);
        let count = usize::try_from(count)
            .ok()
            .filter(|&count| count < u32::MAX as usize)
            .ok_or_else(|| PruneTableLoadError::Corrupt(format!("too many entries ({count})")))?;

        let mut key = vec![0; key_len];
        for _ in 0..count {
            reader.read_exact(&mut key)?;
            let [distance] = read_array(reader)?;
            if distance > depth {
                return Err(PruneTableLoadError::Corrupt(format!(
                    "distance {distance} exceeds the depth {depth}"
                )));
            }
            let (_, inserted) = table.arena.insert(&key);
            if !inserted {
                return Err(PruneTableLoadError::Corrupt("duplicate entry".to_owned()));
            }
            table.distances.push(distance);
        }

        table.complete = complete;
        table.build_report = PruneTableBuildReport {
            entries: table.len(),
            effective_depth: depth,
            complete,
            truncated,
            memory_bytes: table.memory_bytes(),
            elapsed: start.elapsed(),
        };
        info!(
            success!("Loaded {} pruning table entries in {:.3}s"),
            table.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pruning::{PruneTableOptions, PruningTable},
        puzzle::{DefinitionOptions, Metric, apply_moves},
    };
    use ksolve::puzzles::KPUZZLE_2X2;

    fn cube2_table() -> (PuzzleDef, ExactTable) {
        let cube2_def = PuzzleDef::new(&KPUZZLE_2X2, &DefinitionOptions::default()).unwrap();
        let table =
            ExactTable::generate(&cube2_def, &PruneTableOptions::default().with_max_depth(3))
                .unwrap();
        (cube2_def, table)
    }

    fn written(table: &ExactTable) -> Vec<u8> {
        let mut bytes = vec![];
        table.write_to(&mut bytes).unwrap();
        bytes
    }

    #[test_log::test]
    fn test_round_trip() {
        let (cube2_def, table) = cube2_table();
        let bytes = written(&table);
        let loaded = ExactTable::read_from(&mut bytes.as_slice(), &cube2_def, false).unwrap();
        assert_eq!(loaded.len(), table.len());
        assert_eq!(loaded.depth(), table.depth());
        assert_eq!(loaded.is_complete(), table.is_complete());

        let mut aux_mem = cube2_def.new_aux_mem();
        let solved = cube2_def.new_solved_state();
        for scramble in ["", "R", "R U", "F2 L' D", "R U F B"] {
            let puzzle_state = apply_moves(&cube2_def, &solved, scramble, 1);
            assert_eq!(
                loaded.admissible_heuristic(&puzzle_state, &mut aux_mem),
                table.admissible_heuristic(&puzzle_state, &mut aux_mem)
            );
        }
        // Writing is deterministic
        assert_eq!(written(&loaded), bytes);
    }

    #[test_log::test]
    fn test_rejects_bad_magic() {
        let (cube2_def, table) = cube2_table();
        let mut bytes = written(&table);
        bytes[0] = b'X';
        assert!(matches!(
            ExactTable::read_from(&mut bytes.as_slice(), &cube2_def, false),
            Err(PruneTableLoadError::BadMagic)
        ));
    }

    #[test_log::test]
    fn test_rejects_other_versions() {
        let (cube2_def, table) = cube2_table();
        let mut bytes = written(&table);
        bytes[4..8].copy_from_slice(&7_u32.to_le_bytes());
        assert!(matches!(
            ExactTable::read_from(&mut bytes.as_slice(), &cube2_def, false),
            Err(PruneTableLoadError::UnsupportedVersion(7))
        ));
    }

    #[test_log::test]
    fn test_rejects_other_puzzles() {
        let (_, table) = cube2_table();
        let bytes = written(&table);
        let qtm_def = PuzzleDef::new(
            &KPUZZLE_2X2,
            &DefinitionOptions {
                metric: Metric::Qtm,
                ..DefinitionOptions::default()
            },
        )
        .unwrap();
        assert!(matches!(
            ExactTable::read_from(&mut bytes.as_slice(), &qtm_def, false),
            Err(PruneTableLoadError::FingerprintMismatch)
        ));
    }

    #[test_log::test]
    fn test_rejects_other_symmetry_modes() {
        let (cube2_def, table) = cube2_table();
        let bytes = written(&table);
        assert!(matches!(
            ExactTable::read_from(&mut bytes.as_slice(), &cube2_def, true),
            Err(PruneTableLoadError::SymmetryModeMismatch {
                stored: false,
                requested: true
            })
        ));
    }

    #[test_log::test]
    fn test_rejects_truncated_files() {
        let (cube2_def, table) = cube2_table();
        let bytes = written(&table);
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            ExactTable::read_from(&mut &truncated[..], &cube2_def, false),
            Err(PruneTableLoadError::Corrupt(_))
        ));
    }

    #[test_log::test]
    fn test_rejects_out_of_range_distances() {
        let (cube2_def, table) = cube2_table();
        let mut bytes = written(&table);
        *bytes.last_mut().unwrap() = 200;
        assert!(matches!(
            ExactTable::read_from(&mut bytes.as_slice(), &cube2_def, false),
            Err(PruneTableLoadError::Corrupt(_))
        ));
    }
}

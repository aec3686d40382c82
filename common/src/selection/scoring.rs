use super::{DataRequirement, DrawSeed, Selection, SelectionError, SelectionStrategy, StrategyKind};
use crate::{
    coordinate::CELL_COUNT,
    round::{Entry, RoundData, WinnerIndex},
};

/// Number of entries picking each cell, indexed by cell number (slot 0 unused)
pub fn popularity_counts(entries: &[Entry]) -> [u64; CELL_COUNT as usize + 1] {
    let mut counts = [0u64; CELL_COUNT as usize + 1];
    for entry in entries {
        for coordinate in entry.coordinates.iter() {
            counts[coordinate.cell() as usize] += 1;
        }
    }
    counts
}

/// Sum of the popularity counts of each entry's cells, in entry order
pub fn scores(entries: &[Entry]) -> Vec<u64> {
    let counts = popularity_counts(entries);
    entries
        .iter()
        .map(|entry| {
            entry
                .coordinates
                .iter()
                .map(|coordinate| counts[coordinate.cell() as usize])
                .sum::<u64>()
        })
        .collect()
}

/// Reverse lottery: the entry whose cells are the least shared wins.
/// Ties go to the earliest entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinimumCollision;

impl SelectionStrategy for MinimumCollision {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MinimumCollision
    }

    fn requirement(&self) -> DataRequirement {
        DataRequirement::Entries
    }

    fn select(&self, data: &RoundData, _seed: &DrawSeed) -> Result<Selection, SelectionError> {
        if data.is_empty() {
            return Ok(Selection::Empty);
        }

        let entries = data
            .entries
            .as_deref()
            .ok_or(SelectionError::EntriesRequired(self.kind()))?;

        let winner = scores(entries)
            .into_iter()
            .enumerate()
            .min_by_key(|(index, score)| (*score, *index));

        Ok(match winner {
            Some((index, score)) => Selection::Winner {
                index: WinnerIndex(index as u64),
                score: Some(score),
            },
            None => Selection::Empty,
        })
    }
}

use serde::{Deserialize, Serialize};

use super::{DataRequirement, DrawSeed, Selection, SelectionError, SelectionStrategy, StrategyKind};
use crate::round::{RoundData, WinnerIndex};

pub const DEFAULT_K1: u64 = 7_919;
pub const DEFAULT_K2: u64 = 104_729;

/// `index = (count * k1 + k2 + s) mod count`, where `s` is the leading word
/// of the draw seed. Evaluated in 128 bits: with every operand below 2^64
/// the sum peaks at exactly 2^128 - 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformIndex {
    pub k1: u64,
    pub k2: u64,
}

impl Default for UniformIndex {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            k2: DEFAULT_K2,
        }
    }
}

impl UniformIndex {
    pub fn new(k1: u64, k2: u64) -> Self {
        Self { k1, k2 }
    }

    pub fn index(&self, count: u64, seed: &DrawSeed) -> Option<WinnerIndex> {
        if count == 0 {
            return None;
        }

        let n = count as u128;
        let value = n * self.k1 as u128 + self.k2 as u128 + seed.leading_u64() as u128;
        Some(WinnerIndex((value % n) as u64))
    }
}

impl SelectionStrategy for UniformIndex {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Uniform
    }

    fn requirement(&self) -> DataRequirement {
        DataRequirement::Count
    }

    fn select(&self, data: &RoundData, seed: &DrawSeed) -> Result<Selection, SelectionError> {
        Ok(match self.index(data.count, seed) {
            Some(index) => Selection::Winner { index, score: None },
            None => Selection::Empty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::RoundId;
    use proptest::prelude::*;

    const ZERO_SEED: DrawSeed = DrawSeed::from_bytes([0u8; 32]);

    #[test]
    fn test_reference_formula_without_seed() {
        let strategy = UniformIndex::new(3, 5);
        // (count * 3 + 5) mod count == 5 mod count
        assert_eq!(strategy.index(7, &ZERO_SEED), Some(WinnerIndex(5)));
        assert_eq!(strategy.index(4, &ZERO_SEED), Some(WinnerIndex(1)));
        assert_eq!(strategy.index(1, &ZERO_SEED), Some(WinnerIndex(0)));
    }

    #[test]
    fn test_empty_round_is_sentinel() {
        let strategy = UniformIndex::default();
        let data = RoundData::from_count(RoundId(1), 0);
        let selection = strategy.select(&data, &ZERO_SEED).unwrap();
        assert_eq!(selection, Selection::Empty);
        assert_eq!(selection.index(), WinnerIndex(0));
    }

    #[test]
    fn test_extreme_operands_do_not_overflow() {
        let strategy = UniformIndex::new(u64::MAX, u64::MAX);
        let seed = DrawSeed::from_bytes([0xff; 32]);
        let index = strategy.index(u64::MAX, &seed).unwrap();
        assert!(index.0 < u64::MAX);
    }

    proptest! {
        #[test]
        fn test_index_in_range_and_deterministic(
            count in 1u64..=u64::MAX,
            k1 in any::<u64>(),
            k2 in any::<u64>(),
            round in any::<u64>(),
        ) {
            let strategy = UniformIndex::new(k1, k2);
            let seed = DrawSeed::derive(RoundId(round), count, None);
            let data = RoundData::from_count(RoundId(round), count);

            let first = strategy.select(&data, &seed).unwrap();
            let second = strategy
                .select(&data, &DrawSeed::derive(RoundId(round), count, None))
                .unwrap();

            prop_assert_eq!(first, second);
            prop_assert!(!first.is_empty());
            prop_assert!(first.index().0 < count);
        }
    }
}

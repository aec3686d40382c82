//! Winner selection.
//!
//! Every strategy is a pure function of public inputs: the round data read
//! from the settlement layer and a [`DrawSeed`] derived from the round id,
//! the entry count and an optional public beacon. Independent executors
//! given the same inputs always name the same winner.

mod scoring;
mod uniform;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::{
    abi::keccak256,
    address::Address,
    round::{RoundData, RoundId, WinnerIndex},
};

pub use scoring::{popularity_counts, scores, MinimumCollision};
pub use uniform::UniformIndex;

pub const SEED_SIZE: usize = 32;

/// Digest of the public inputs of one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DrawSeed([u8; SEED_SIZE]);

impl DrawSeed {
    /// keccak256(round id || entry count || beacon), integers big-endian
    pub fn derive(round: RoundId, count: u64, beacon: Option<&[u8; SEED_SIZE]>) -> Self {
        let mut preimage = Vec::with_capacity(16 + SEED_SIZE);
        preimage.extend_from_slice(&round.0.to_be_bytes());
        preimage.extend_from_slice(&count.to_be_bytes());
        if let Some(beacon) = beacon {
            preimage.extend_from_slice(beacon);
        }
        Self(keccak256(&preimage))
    }

    pub const fn from_bytes(bytes: [u8; SEED_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SEED_SIZE] {
        &self.0
    }

    /// First eight bytes read big-endian
    pub fn leading_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl fmt::Display for DrawSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<DrawSeed> for String {
    fn from(value: DrawSeed) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for DrawSeed {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value.strip_prefix("0x").unwrap_or(&value);
        let mut bytes = [0u8; SEED_SIZE];
        hex::decode_to_slice(digits, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Outcome of running a strategy over a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The round had no entries, nothing was drawn
    Empty,
    /// `score` is set by strategies that rank entries
    Winner { index: WinnerIndex, score: Option<u64> },
}

impl Selection {
    /// Empty rounds encode as index 0, callers must check [`Selection::is_empty`]
    pub fn index(&self) -> WinnerIndex {
        match self {
            Selection::Empty => WinnerIndex(0),
            Selection::Winner { index, .. } => *index,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Selection::Empty)
    }
}

/// Which round data a strategy needs fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRequirement {
    Count,
    Entries,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("strategy {0} needs the round entries but only the count was fetched")]
    EntriesRequired(StrategyKind),
}

pub trait SelectionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn requirement(&self) -> DataRequirement;

    /// Total over every round: an empty round yields [`Selection::Empty`]
    fn select(&self, data: &RoundData, seed: &DrawSeed) -> Result<Selection, SelectionError>;
}

/// Strategy chosen by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Uniform index derived from the draw seed
    Uniform,
    /// Reverse lottery, least duplicated ticket wins
    MinimumCollision,
}

impl StrategyKind {
    pub fn build(&self, uniform: UniformIndex) -> Arc<dyn SelectionStrategy> {
        match self {
            StrategyKind::Uniform => Arc::new(uniform),
            StrategyKind::MinimumCollision => Arc::new(MinimumCollision),
        }
    }
}

/// Authoritative output of one draw, handed to the settlement layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub round: RoundId,
    pub strategy: StrategyKind,
    pub winner: WinnerIndex,
    /// Known when the strategy fetched the entries
    pub participant: Option<Address>,
    pub entry_count: u64,
    pub score: Option<u64>,
    pub seed: DrawSeed,
    /// Unix seconds
    pub timestamp: u64,
}

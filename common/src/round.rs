use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{address::Address, coordinate::CoordinateSet, error::DecodeError};

/// Identifier of one lottery cycle on the settlement contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl RoundId {
    pub fn next(&self) -> RoundId {
        RoundId(self.0 + 1)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of the winning entry in the round's insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WinnerIndex(pub u64);

impl WinnerIndex {
    pub fn as_usize(&self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl fmt::Display for WinnerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One participant's ticket, indexed by its position in the round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub participant: Address,
    pub coordinates: CoordinateSet,
}

impl Entry {
    pub fn new(participant: Address, coordinates: CoordinateSet) -> Self {
        Self {
            participant,
            coordinates,
        }
    }
}

/// Read-only view of a round as fetched from the settlement layer.
/// `entries` is only present when the active strategy needs the tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundData {
    pub round: RoundId,
    pub count: u64,
    pub entries: Option<Vec<Entry>>,
}

impl RoundData {
    pub fn from_count(round: RoundId, count: u64) -> Self {
        Self {
            round,
            count,
            entries: None,
        }
    }

    pub fn from_entries(round: RoundId, entries: Vec<Entry>) -> Self {
        Self {
            round,
            count: entries.len() as u64,
            entries: Some(entries),
        }
    }

    /// Entries fetched alongside an independently read count must agree with it
    pub fn checked(round: RoundId, count: u64, entries: Vec<Entry>) -> Result<Self, DecodeError> {
        if entries.len() as u64 != count {
            return Err(DecodeError::CountMismatch {
                count,
                entries: entries.len(),
            });
        }
        Ok(Self::from_entries(round, entries))
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn participant(&self, index: WinnerIndex) -> Option<&Address> {
        let index = index.as_usize()?;
        self.entries
            .as_ref()
            .and_then(|entries| entries.get(index))
            .map(|entry| &entry.participant)
    }
}

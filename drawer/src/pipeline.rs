//! Draw pipeline: fetch, select, then submit exactly once.
//!
//! Any failure before the submission aborts the attempt without touching
//! the settlement layer, leaving the round open for a later retry.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry as SlotEntry, DashMap};
use log::{info, warn};
use primitive_types::U256;
use thiserror::Error;

use lotto_common::{
    selection::{DrawSeed, Selection, SelectionError, SelectionResult, SelectionStrategy, SEED_SIZE},
    Address, DecodeError, RoundId,
};

use crate::{
    endpoint::FetchExhausted,
    fetcher::{ChainStateFetcher, FetchError},
    submitter::{Receipt, SubmitError, Submitter},
};

/// Parameters of one draw attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawRequest {
    /// Defaults to the contract's current round
    pub round: Option<RoundId>,
    /// Public randomness mixed into the draw seed
    pub beacon: Option<[u8; SEED_SIZE]>,
}

impl DrawRequest {
    pub fn round(round: RoundId) -> Self {
        Self {
            round: Some(round),
            beacon: None,
        }
    }

    pub fn with_beacon(mut self, beacon: [u8; SEED_SIZE]) -> Self {
        self.beacon = Some(beacon);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    Settled { result: SelectionResult, receipt: Receipt },
    /// No entries, nothing was submitted
    EmptyRound { round: RoundId },
}

impl DrawOutcome {
    pub fn round(&self) -> RoundId {
        match self {
            DrawOutcome::Settled { result, .. } => result.round,
            DrawOutcome::EmptyRound { round } => *round,
        }
    }
}

#[derive(Debug, Error)]
pub enum DrawError {
    #[error(transparent)]
    FetchExhausted(#[from] FetchExhausted),
    #[error("inconsistent round data: {0}")]
    Decode(#[from] DecodeError),
    #[error("round {0} is already finalized")]
    AlreadyFinalized(RoundId),
    #[error("a draw for round {0} is already in progress")]
    DrawInProgress(RoundId),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("submission for round {round} failed: {source}")]
    Submission { round: RoundId, source: SubmitError },
}

impl DrawError {
    /// Whether the same draw may succeed if attempted again later
    pub fn is_retryable(&self) -> bool {
        match self {
            DrawError::FetchExhausted(_)
            | DrawError::Decode(_)
            | DrawError::DrawInProgress(_) => true,
            DrawError::Submission {
                source: SubmitError::Transport(_),
                ..
            } => true,
            DrawError::AlreadyFinalized(_)
            | DrawError::Selection(_)
            | DrawError::Submission { .. } => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            DrawError::FetchExhausted(_) => "fetch_exhausted",
            DrawError::Decode(_) => "decode",
            DrawError::AlreadyFinalized(_) => "already_finalized",
            DrawError::DrawInProgress(_) => "draw_in_progress",
            DrawError::Selection(_) => "selection",
            DrawError::Submission { .. } => "submission",
        }
    }
}

impl From<FetchError> for DrawError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Exhausted(e) => DrawError::FetchExhausted(e),
            FetchError::Decode(e) => DrawError::Decode(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error(transparent)]
    FetchExhausted(#[from] FetchExhausted),
    #[error("nothing to claim for {0}")]
    NothingToClaim(Address),
    #[error(transparent)]
    Submission(SubmitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claimed {
    pub participant: Address,
    pub amount: U256,
    pub receipt: Receipt,
}

/// Releases the per-round slot when the attempt ends, however it ends
struct RoundGuard<'a> {
    in_flight: &'a DashMap<RoundId, ()>,
    round: RoundId,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.round);
    }
}

pub struct DrawPipeline {
    fetcher: ChainStateFetcher,
    submitter: Arc<dyn Submitter>,
    strategy: Arc<dyn SelectionStrategy>,
    in_flight: DashMap<RoundId, ()>,
}

impl DrawPipeline {
    pub fn new(
        fetcher: ChainStateFetcher,
        submitter: Arc<dyn Submitter>,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Self {
        Self {
            fetcher,
            submitter,
            strategy,
            in_flight: DashMap::new(),
        }
    }

    pub fn fetcher(&self) -> &ChainStateFetcher {
        &self.fetcher
    }

    fn lock(&self, round: RoundId) -> Result<RoundGuard<'_>, DrawError> {
        match self.in_flight.entry(round) {
            SlotEntry::Occupied(_) => Err(DrawError::DrawInProgress(round)),
            SlotEntry::Vacant(slot) => {
                slot.insert(());
                Ok(RoundGuard {
                    in_flight: &self.in_flight,
                    round,
                })
            }
        }
    }

    pub async fn draw(&self, request: DrawRequest) -> Result<DrawOutcome, DrawError> {
        let round = match request.round {
            Some(round) => round,
            None => self.fetcher.current_round().await?.value,
        };

        let _guard = self.lock(round)?;

        if !self.fetcher.is_round_open(round).await?.value {
            return Err(DrawError::AlreadyFinalized(round));
        }

        let data = self.fetcher.round_data(round, self.strategy.requirement()).await?;
        let seed = DrawSeed::derive(round, data.count, request.beacon.as_ref());

        let (winner, score) = match self.strategy.select(&data, &seed)? {
            Selection::Empty => {
                if log::log_enabled!(log::Level::Info) {
                    info!("Round {} has no entries, nothing to draw", round);
                }
                return Ok(DrawOutcome::EmptyRound { round });
            }
            Selection::Winner { index, score } => (index, score),
        };

        let result = SelectionResult {
            round,
            strategy: self.strategy.kind(),
            winner,
            participant: data.participant(winner).copied(),
            entry_count: data.count,
            score,
            seed,
            timestamp: u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
        };

        let receipt = self
            .submitter
            .finalize_draw(round, winner)
            .await
            .map_err(|e| match e {
                SubmitError::AlreadyFinalized(_) => DrawError::AlreadyFinalized(round),
                source => DrawError::Submission { round, source },
            })?;

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Round {} settled by {}: entry {} of {} ({})",
                round, result.strategy, winner, data.count, receipt.tx_hash
            );
        }

        Ok(DrawOutcome::Settled { result, receipt })
    }

    pub async fn pending_winnings(&self, participant: Address) -> Result<U256, FetchExhausted> {
        Ok(self.fetcher.pending_winnings(participant).await?.value)
    }

    /// Claim only when something is owed, so an empty claim never reaches the chain
    pub async fn claim(&self, participant: Address) -> Result<Claimed, ClaimError> {
        let amount = self.pending_winnings(participant).await?;
        if amount.is_zero() {
            return Err(ClaimError::NothingToClaim(participant));
        }

        let receipt = self.submitter.claim(&participant).await.map_err(|e| match e {
            SubmitError::NothingToClaim(participant) => ClaimError::NothingToClaim(participant),
            other => {
                if log::log_enabled!(log::Level::Warn) {
                    warn!("Claim for {} rejected: {}", participant, other);
                }
                ClaimError::Submission(other)
            }
        })?;

        Ok(Claimed {
            participant,
            amount,
            receipt,
        })
    }
}

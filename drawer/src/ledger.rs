//! In-memory settlement layer.
//!
//! Keeps the same books as the lottery contract (rounds, pool balances,
//! pending winnings) and answers the same ABI calls, so the drawer can be
//! driven end to end without a node.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use log::{debug, info};
use primitive_types::U256;
use thiserror::Error;

use lotto_common::{
    abi::{self, keccak256, Token},
    contract::{self, LottoCall},
    Address, CoordinateSet, Entry, RoundId, WinnerIndex,
};

use crate::{
    endpoint::{ChainReader, ReadRequest, TransportError},
    submitter::{Receipt, SubmitError, Submitter, TxHash},
};

/// Node-style error code for reverted calls
const REVERT_CODE: i64 = 3;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown round {0}")]
    UnknownRound(RoundId),
    #[error("round {0} already finalized")]
    RoundClosed(RoundId),
    #[error("wrong payment: expected {expected}, got {paid}")]
    WrongPayment { expected: U256, paid: U256 },
    #[error("round {0} has no entries")]
    NoEntries(RoundId),
    #[error("winner {winner} out of range for {count} entries")]
    WinnerOutOfRange { winner: WinnerIndex, count: usize },
    #[error("nothing to claim for {0}")]
    NothingToClaim(Address),
    #[error("unsupported call: {0}")]
    UnsupportedCall(String),
}

#[derive(Debug, Clone)]
pub struct LedgerRound {
    pub id: RoundId,
    pub price: U256,
    pub pool: U256,
    pub open: bool,
    pub entries: Vec<Entry>,
    pub winner: Option<WinnerIndex>,
}

impl LedgerRound {
    fn new(id: RoundId, price: U256) -> Self {
        Self {
            id,
            price,
            pool: U256::zero(),
            open: true,
            entries: Vec::new(),
            winner: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCounters {
    pub finalize_calls: u64,
    pub claim_calls: u64,
    pub reads: u64,
}

struct LedgerState {
    rounds: BTreeMap<RoundId, LedgerRound>,
    current: RoundId,
    pending: HashMap<Address, U256>,
    transactions: u64,
    counters: LedgerCounters,
}

pub struct MemoryLedger {
    contract: Address,
    price: U256,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Deploy with round 1 open
    pub fn new(contract: Address, price: U256) -> Self {
        let first = RoundId(1);
        let mut rounds = BTreeMap::new();
        rounds.insert(first, LedgerRound::new(first, price));

        Self {
            contract,
            price,
            state: Mutex::new(LedgerState {
                rounds,
                current: first,
                pending: HashMap::new(),
                transactions: 0,
                counters: LedgerCounters::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // A panicked holder cannot leave the books half-written: every
        // mutation below validates first and writes last
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn price(&self) -> U256 {
        self.price
    }

    pub fn current_round(&self) -> RoundId {
        self.state().current
    }

    pub fn round(&self, round: RoundId) -> Option<LedgerRound> {
        self.state().rounds.get(&round).cloned()
    }

    pub fn is_round_open(&self, round: RoundId) -> bool {
        self.state().rounds.get(&round).map_or(false, |r| r.open)
    }

    pub fn pending(&self, participant: &Address) -> U256 {
        self.state().pending.get(participant).copied().unwrap_or_default()
    }

    pub fn counters(&self) -> LedgerCounters {
        self.state().counters
    }

    /// Buy a ticket in the current round, returns its entry index
    pub fn buy_entry(
        &self,
        participant: Address,
        coordinates: CoordinateSet,
        paid: U256,
    ) -> Result<WinnerIndex, LedgerError> {
        let mut state = self.state();
        let current = state.current;
        let round = state
            .rounds
            .get_mut(&current)
            .ok_or(LedgerError::UnknownRound(current))?;

        if !round.open {
            return Err(LedgerError::RoundClosed(current));
        }
        if paid != round.price {
            return Err(LedgerError::WrongPayment {
                expected: round.price,
                paid,
            });
        }

        round.entries.push(Entry::new(participant, coordinates));
        round.pool = round.pool.saturating_add(paid);
        Ok(WinnerIndex(round.entries.len() as u64 - 1))
    }

    /// Close `round`, credit its pool to the winner and open the next round
    pub fn finalize(&self, round: RoundId, winner: WinnerIndex) -> Result<TxHash, LedgerError> {
        let mut state = self.state();
        state.counters.finalize_calls += 1;

        let target = state.rounds.get(&round).ok_or(LedgerError::UnknownRound(round))?;
        if !target.open {
            return Err(LedgerError::RoundClosed(round));
        }
        if target.entries.is_empty() {
            return Err(LedgerError::NoEntries(round));
        }
        let participant = winner
            .as_usize()
            .and_then(|i| target.entries.get(i))
            .map(|e| e.participant)
            .ok_or(LedgerError::WinnerOutOfRange {
                winner,
                count: target.entries.len(),
            })?;
        let payout = target.pool;

        if let Some(target) = state.rounds.get_mut(&round) {
            target.open = false;
            target.pool = U256::zero();
            target.winner = Some(winner);
        }
        let owed = state.pending.entry(participant).or_default();
        *owed = owed.saturating_add(payout);

        let next = state.current.next();
        state.current = next;
        state.rounds.insert(next, LedgerRound::new(next, self.price));

        if log::log_enabled!(log::Level::Info) {
            info!("Round {} finalized: entry {} ({}) owed {}", round, winner, participant, payout);
        }

        Ok(Self::next_tx(&mut state))
    }

    /// Pay out and zero the participant's pending winnings
    pub fn claim_winnings(&self, participant: &Address) -> Result<(U256, TxHash), LedgerError> {
        let mut state = self.state();
        state.counters.claim_calls += 1;

        let amount = match state.pending.remove(participant) {
            Some(amount) if !amount.is_zero() => amount,
            _ => return Err(LedgerError::NothingToClaim(*participant)),
        };

        if log::log_enabled!(log::Level::Info) {
            info!("{} claimed {}", participant, amount);
        }

        Ok((amount, Self::next_tx(&mut state)))
    }

    fn next_tx(state: &mut LedgerState) -> TxHash {
        state.transactions += 1;
        TxHash::new(keccak256(&state.transactions.to_be_bytes()))
    }

    fn answer(&self, call: &LottoCall) -> Result<Vec<u8>, LedgerError> {
        let mut state = self.state();
        state.counters.reads += 1;

        Ok(match call {
            LottoCall::CurrentRound => uint(state.current.0),
            LottoCall::EntryCount(round) => {
                uint(state.rounds.get(round).map_or(0, |r| r.entries.len() as u64))
            }
            LottoCall::AllEntries(round) => {
                let entries = state
                    .rounds
                    .get(round)
                    .map(|r| r.entries.as_slice())
                    .unwrap_or_default();
                contract::encode_entries(entries)
            }
            LottoCall::IsRoundOpen(round) => {
                let open = state.rounds.get(round).map_or(false, |r| r.open);
                abi::encode_tokens(&[Token::Bool(open)])
            }
            LottoCall::PendingWinnings(participant) => {
                let owed = state.pending.get(participant).copied().unwrap_or_default();
                abi::encode_tokens(&[Token::Uint(owed)])
            }
            // Writes only go through the Submitter side
            LottoCall::FinalizeDraw { .. } | LottoCall::Claim => Vec::new(),
        })
    }
}

fn uint(value: u64) -> Vec<u8> {
    abi::encode_tokens(&[Token::Uint(U256::from(value))])
}

fn revert(error: LedgerError) -> TransportError {
    TransportError::Rpc {
        code: REVERT_CODE,
        message: format!("execution reverted: {}", error),
    }
}

#[async_trait]
impl ChainReader for MemoryLedger {
    async fn call(&self, request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
        // No code at any other address
        if request.to != self.contract {
            return Ok(Vec::new());
        }

        let call = LottoCall::decode(&request.data)
            .map_err(|e| revert(LedgerError::UnsupportedCall(e.to_string())))?;
        if log::log_enabled!(log::Level::Debug) {
            debug!("ledger answering {:?}", call);
        }
        self.answer(&call).map_err(revert)
    }
}

#[async_trait]
impl Submitter for MemoryLedger {
    async fn finalize_draw(
        &self,
        round: RoundId,
        winner: WinnerIndex,
    ) -> Result<Receipt, SubmitError> {
        self.finalize(round, winner)
            .map(|tx_hash| Receipt { tx_hash })
            .map_err(|e| match e {
                LedgerError::RoundClosed(_) => SubmitError::AlreadyFinalized(e.to_string()),
                other => SubmitError::Reverted(other.to_string()),
            })
    }

    async fn claim(&self, participant: &Address) -> Result<Receipt, SubmitError> {
        self.claim_winnings(participant)
            .map(|(_, tx_hash)| Receipt { tx_hash })
            .map_err(|e| match e {
                LedgerError::NothingToClaim(participant) => {
                    SubmitError::NothingToClaim(participant)
                }
                other => SubmitError::Reverted(other.to_string()),
            })
    }
}

//! Calls understood by the lottery settlement contract and decoders for
//! their return data.

use std::collections::HashMap;

use lazy_static::lazy_static;
use primitive_types::U256;

use crate::{
    abi::{self, AbiReader, Selector, Token, SELECTOR_SIZE, WORD_SIZE},
    address::Address,
    coordinate::CoordinateSet,
    error::DecodeError,
    round::{Entry, RoundId, WinnerIndex},
};

pub const CURRENT_ROUND: &str = "currentRound()";
pub const GET_ENTRY_COUNT: &str = "getEntryCount(uint256)";
pub const GET_ALL_ENTRIES: &str = "getAllEntries(uint256)";
pub const IS_ROUND_OPEN: &str = "isRoundOpen(uint256)";
pub const GET_PENDING_WINNINGS: &str = "getPendingWinnings(address)";
pub const FINALIZE_DRAW: &str = "finalizeDraw(uint256,uint256)";
pub const CLAIM: &str = "claim()";

lazy_static! {
    static ref SELECTORS: HashMap<Selector, &'static str> = [
        CURRENT_ROUND,
        GET_ENTRY_COUNT,
        GET_ALL_ENTRIES,
        IS_ROUND_OPEN,
        GET_PENDING_WINNINGS,
        FINALIZE_DRAW,
        CLAIM,
    ]
    .into_iter()
    .map(|signature| (abi::selector(signature), signature))
    .collect();
}

/// One call against the settlement contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LottoCall {
    CurrentRound,
    EntryCount(RoundId),
    AllEntries(RoundId),
    IsRoundOpen(RoundId),
    PendingWinnings(Address),
    FinalizeDraw { round: RoundId, winner: WinnerIndex },
    Claim,
}

impl LottoCall {
    pub fn signature(&self) -> &'static str {
        match self {
            Self::CurrentRound => CURRENT_ROUND,
            Self::EntryCount(_) => GET_ENTRY_COUNT,
            Self::AllEntries(_) => GET_ALL_ENTRIES,
            Self::IsRoundOpen(_) => IS_ROUND_OPEN,
            Self::PendingWinnings(_) => GET_PENDING_WINNINGS,
            Self::FinalizeDraw { .. } => FINALIZE_DRAW,
            Self::Claim => CLAIM,
        }
    }

    /// Function name without its parameter list, used in logs
    pub fn name(&self) -> &'static str {
        let signature = self.signature();
        signature.split('(').next().unwrap_or(signature)
    }

    /// Whether the call changes contract state
    pub fn is_write(&self) -> bool {
        matches!(self, Self::FinalizeDraw { .. } | Self::Claim)
    }

    fn tokens(&self) -> Vec<Token> {
        match self {
            Self::CurrentRound | Self::Claim => Vec::new(),
            Self::EntryCount(round) | Self::AllEntries(round) | Self::IsRoundOpen(round) => {
                vec![round_token(round)]
            }
            Self::PendingWinnings(participant) => vec![Token::Address(*participant)],
            Self::FinalizeDraw { round, winner } => {
                vec![round_token(round), Token::Uint(U256::from(winner.0))]
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        abi::encode_call(self.signature(), &self.tokens())
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < SELECTOR_SIZE {
            return Err(DecodeError::OutOfBounds {
                offset: 0,
                needed: SELECTOR_SIZE,
                len: data.len(),
            });
        }

        let mut selector = [0u8; SELECTOR_SIZE];
        selector.copy_from_slice(&data[..SELECTOR_SIZE]);
        let signature = SELECTORS
            .get(&selector)
            .ok_or_else(|| DecodeError::UnknownSelector(hex::encode(selector)))?;

        let args = AbiReader::new(&data[SELECTOR_SIZE..]);
        let round = || args.read_u64(0).map(RoundId);

        Ok(match *signature {
            CURRENT_ROUND => Self::CurrentRound,
            GET_ENTRY_COUNT => Self::EntryCount(round()?),
            GET_ALL_ENTRIES => Self::AllEntries(round()?),
            IS_ROUND_OPEN => Self::IsRoundOpen(round()?),
            GET_PENDING_WINNINGS => Self::PendingWinnings(args.read_address(0)?),
            FINALIZE_DRAW => Self::FinalizeDraw {
                round: round()?,
                winner: WinnerIndex(args.read_u64(WORD_SIZE)?),
            },
            _ => Self::Claim,
        })
    }
}

fn round_token(round: &RoundId) -> Token {
    Token::Uint(U256::from(round.0))
}

pub fn decode_round(data: &[u8]) -> Result<RoundId, DecodeError> {
    abi::decode_u64(data).map(RoundId)
}

pub fn decode_entry_count(data: &[u8]) -> Result<u64, DecodeError> {
    abi::decode_u64(data)
}

pub fn decode_round_open(data: &[u8]) -> Result<bool, DecodeError> {
    abi::decode_bool(data)
}

pub fn decode_pending_winnings(data: &[u8]) -> Result<U256, DecodeError> {
    abi::decode_uint(data)
}

/// Decode the ticket listing and parse every ticket string
pub fn decode_entries(data: &[u8]) -> Result<Vec<Entry>, DecodeError> {
    let (participants, tickets) = abi::decode_address_string_arrays(data)?;
    if participants.len() != tickets.len() {
        return Err(DecodeError::LengthMismatch {
            participants: participants.len(),
            tickets: tickets.len(),
        });
    }

    participants
        .into_iter()
        .zip(tickets)
        .map(|(participant, ticket)| Ok(Entry::new(participant, CoordinateSet::decode(&ticket)?)))
        .collect()
}

pub fn encode_entries(entries: &[Entry]) -> Vec<u8> {
    let participants: Vec<Address> = entries.iter().map(|e| e.participant).collect();
    let tickets: Vec<String> = entries.iter().map(|e| e.coordinates.encode()).collect();
    abi::encode_address_string_arrays(&participants, &tickets)
}

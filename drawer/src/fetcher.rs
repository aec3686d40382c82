use std::sync::Arc;

use primitive_types::U256;

use lotto_common::{
    contract::{self, LottoCall},
    selection::DataRequirement,
    Address, DecodeError, Entry, RoundData, RoundId,
};

use crate::endpoint::{EndpointPool, FetchExhausted, ReadRequest, Resolved};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Exhausted(#[from] FetchExhausted),
    /// Individually valid answers that disagree with each other
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Typed reads of the settlement contract, each resolved through the pool
pub struct ChainStateFetcher {
    pool: Arc<EndpointPool>,
    contract: Address,
}

impl ChainStateFetcher {
    pub fn new(pool: Arc<EndpointPool>, contract: Address) -> Self {
        Self { pool, contract }
    }

    fn request(&self, call: &LottoCall) -> ReadRequest {
        ReadRequest::new(self.contract, call)
    }

    pub async fn current_round(&self) -> Result<Resolved<RoundId>, FetchExhausted> {
        self.pool
            .resolve(&self.request(&LottoCall::CurrentRound), contract::decode_round)
            .await
    }

    pub async fn entry_count(&self, round: RoundId) -> Result<Resolved<u64>, FetchExhausted> {
        self.pool
            .resolve(&self.request(&LottoCall::EntryCount(round)), contract::decode_entry_count)
            .await
    }

    pub async fn entries(&self, round: RoundId) -> Result<Resolved<Vec<Entry>>, FetchExhausted> {
        self.pool
            .resolve(&self.request(&LottoCall::AllEntries(round)), contract::decode_entries)
            .await
    }

    pub async fn is_round_open(&self, round: RoundId) -> Result<Resolved<bool>, FetchExhausted> {
        self.pool
            .resolve(&self.request(&LottoCall::IsRoundOpen(round)), contract::decode_round_open)
            .await
    }

    pub async fn pending_winnings(
        &self,
        participant: Address,
    ) -> Result<Resolved<U256>, FetchExhausted> {
        self.pool
            .resolve(
                &self.request(&LottoCall::PendingWinnings(participant)),
                contract::decode_pending_winnings,
            )
            .await
    }

    /// Fetch what a strategy needs. With entries, the listing is checked
    /// against the independently read count, since the two reads may be
    /// answered by different endpoints.
    pub async fn round_data(
        &self,
        round: RoundId,
        requirement: DataRequirement,
    ) -> Result<RoundData, FetchError> {
        let count = self.entry_count(round).await?.value;
        match requirement {
            DataRequirement::Count => Ok(RoundData::from_count(round, count)),
            DataRequirement::Entries if count == 0 => {
                Ok(RoundData::from_entries(round, Vec::new()))
            }
            DataRequirement::Entries => {
                let entries = self.entries(round).await?.value;
                Ok(RoundData::checked(round, count, entries)?)
            }
        }
    }
}

//! Result encoder and submitter: the only state-changing side of the drawer.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lotto_common::{contract::LottoCall, Address, RoundId, WinnerIndex};

use crate::{endpoint::TransportError, rpc_client::RpcClient};

/// Revert reasons meaning the round can no longer be drawn
const FINALIZED_REASONS: [&str; 4] =
    ["already finalized", "already drawn", "round closed", "not open"];
const NOTHING_TO_CLAIM_REASONS: [&str; 2] = ["nothing to claim", "no winnings"];

pub const TX_HASH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash([u8; TX_HASH_SIZE]);

impl TxHash {
    pub const fn new(bytes: [u8; TX_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; TX_HASH_SIZE] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<TxHash> for String {
    fn from(value: TxHash) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for TxHash {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value.strip_prefix("0x").unwrap_or(&value);
        let mut bytes = [0u8; TX_HASH_SIZE];
        hex::decode_to_slice(digits, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Acknowledgement from the settlement layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("round already finalized: {0}")]
    AlreadyFinalized(String),
    #[error("nothing to claim for {0}")]
    NothingToClaim(Address),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("no operator account configured")]
    MissingOperator,
    #[error(transparent)]
    Transport(TransportError),
}

impl SubmitError {
    /// Classify a node error returned for a finalize or claim transaction
    pub fn from_transport(error: TransportError, sender: &Address) -> Self {
        match error {
            TransportError::Rpc { message, .. } => {
                let reason = message.to_lowercase();
                if FINALIZED_REASONS.iter().any(|r| reason.contains(r)) {
                    SubmitError::AlreadyFinalized(message)
                } else if NOTHING_TO_CLAIM_REASONS.iter().any(|r| reason.contains(r)) {
                    SubmitError::NothingToClaim(*sender)
                } else {
                    SubmitError::Reverted(message)
                }
            }
            other => SubmitError::Transport(other),
        }
    }
}

/// Settlement-layer write side
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Record `winner` as the outcome of `round`
    async fn finalize_draw(
        &self,
        round: RoundId,
        winner: WinnerIndex,
    ) -> Result<Receipt, SubmitError>;

    /// Pay out everything owed to `participant`
    async fn claim(&self, participant: &Address) -> Result<Receipt, SubmitError>;
}

/// Submits through a node-managed operator account with `eth_sendTransaction`
pub struct RpcSubmitter {
    client: Arc<RpcClient>,
    contract: Address,
    operator: Option<Address>,
}

impl RpcSubmitter {
    /// Without an operator only claims can be sent
    pub fn new(client: Arc<RpcClient>, contract: Address, operator: Option<Address>) -> Self {
        Self {
            client,
            contract,
            operator,
        }
    }

    async fn send(&self, from: &Address, call: LottoCall) -> Result<Receipt, SubmitError> {
        let tx_hash = self
            .client
            .send_transaction(from, &self.contract, &call.encode())
            .await
            .map_err(|e| SubmitError::from_transport(e, from))?;

        if log::log_enabled!(log::Level::Info) {
            info!("{} sent from {} in {}", call.name(), from, tx_hash);
        }

        Ok(Receipt { tx_hash })
    }
}

#[async_trait]
impl Submitter for RpcSubmitter {
    async fn finalize_draw(
        &self,
        round: RoundId,
        winner: WinnerIndex,
    ) -> Result<Receipt, SubmitError> {
        let operator = self.operator.ok_or(SubmitError::MissingOperator)?;
        self.send(&operator, LottoCall::FinalizeDraw { round, winner }).await
    }

    async fn claim(&self, participant: &Address) -> Result<Receipt, SubmitError> {
        self.send(participant, LottoCall::Claim).await
    }
}

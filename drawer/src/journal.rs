use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use lotto_common::{selection::SelectionResult, RoundId};

use crate::{
    pipeline::{DrawError, DrawOutcome},
    submitter::TxHash,
};

pub const JOURNAL_FILE: &str = "draws.json";
pub const MAX_UNRESOLVED: usize = 100;

/// How a draw attempt ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrawStatus {
    Settled { result: SelectionResult, tx_hash: TxHash },
    Empty,
    Failed { category: String, reason: String, retryable: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawRecord {
    pub round: RoundId,
    pub attempts: u32,
    pub status: DrawStatus,
    pub updated_at: u64,
}

impl DrawRecord {
    pub fn is_settled(&self) -> bool {
        matches!(self.status, DrawStatus::Settled { .. })
    }
}

/// Attempt that failed before its round could be determined
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnresolvedAttempt {
    pub category: String,
    pub reason: String,
    pub retryable: bool,
    pub at: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct JournalState {
    records: BTreeMap<RoundId, DrawRecord>,
    #[serde(default)]
    unresolved: Vec<UnresolvedAttempt>,
    last_updated: u64,
}

/// Local history of draw attempts, one record per round
pub struct DrawJournal {
    path: PathBuf,
    state: JournalState,
}

fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

impl DrawJournal {
    /// Open the journal in `dir`, starting fresh if the file is missing or unreadable
    pub async fn open(dir: PathBuf) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            if log::log_enabled!(log::Level::Info) {
                info!("Created journal directory: {:?}", dir);
            }
        }

        let path = dir.join(JOURNAL_FILE);
        let state = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<JournalState>(&content) {
                Ok(state) => {
                    if log::log_enabled!(log::Level::Debug) {
                        debug!("Loaded {} draw record(s) from {:?}", state.records.len(), path);
                    }
                    state
                }
                Err(e) => {
                    if log::log_enabled!(log::Level::Warn) {
                        warn!("Failed to parse journal {:?}: {}. Starting a new one.", path, e);
                    }
                    JournalState::default()
                }
            }
        } else {
            JournalState::default()
        };

        Ok(Self { path, state })
    }

    pub async fn save(&mut self) -> Result<()> {
        self.state.last_updated = now();
        let content = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.path, content).await?;
        if log::log_enabled!(log::Level::Debug) {
            debug!("Saved draw journal to {:?}", self.path);
        }
        Ok(())
    }

    /// Record the result of one attempt on `round` and persist
    pub async fn record(
        &mut self,
        round: RoundId,
        outcome: &Result<DrawOutcome, DrawError>,
    ) -> Result<&DrawRecord> {
        let status = match outcome {
            Ok(DrawOutcome::Settled { result, receipt }) => DrawStatus::Settled {
                result: result.clone(),
                tx_hash: receipt.tx_hash,
            },
            Ok(DrawOutcome::EmptyRound { .. }) => DrawStatus::Empty,
            Err(e) => DrawStatus::Failed {
                category: e.category().to_string(),
                reason: e.to_string(),
                retryable: e.is_retryable(),
            },
        };

        let attempts = self.state.records.get(&round).map_or(0, |r| r.attempts) + 1;
        self.state.records.insert(
            round,
            DrawRecord {
                round,
                attempts,
                status,
                updated_at: now(),
            },
        );
        self.save().await?;

        self.state
            .records
            .get(&round)
            .ok_or_else(|| anyhow::anyhow!("journal record for round {} vanished", round))
    }

    /// Record an attempt that failed while resolving which round to draw.
    /// Only the latest `MAX_UNRESOLVED` are kept.
    pub async fn record_unresolved(&mut self, error: &DrawError) -> Result<()> {
        self.state.unresolved.push(UnresolvedAttempt {
            category: error.category().to_string(),
            reason: error.to_string(),
            retryable: error.is_retryable(),
            at: now(),
        });
        let excess = self.state.unresolved.len().saturating_sub(MAX_UNRESOLVED);
        self.state.unresolved.drain(..excess);
        self.save().await
    }

    /// Most recent first
    pub fn unresolved(&self, limit: usize) -> Vec<&UnresolvedAttempt> {
        self.state.unresolved.iter().rev().take(limit).collect()
    }

    pub fn get(&self, round: RoundId) -> Option<&DrawRecord> {
        self.state.records.get(&round)
    }

    /// Most recent rounds first
    pub fn recent(&self, limit: usize) -> Vec<&DrawRecord> {
        self.state.records.values().rev().take(limit).collect()
    }

    pub fn len(&self) -> usize {
        self.state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.records.is_empty() && self.state.unresolved.is_empty()
    }
}

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

use lotto_common::{
    selection::{SelectionStrategy, StrategyKind, UniformIndex},
    Address,
};

use crate::{
    endpoint::{Endpoint, EndpointPool, PoolMember, ResolveMode},
    fetcher::ChainStateFetcher,
    logger::LogLevel,
    pipeline::DrawPipeline,
    rpc_client::{endpoint_url, RpcClient, RpcClientConfig},
    submitter::RpcSubmitter,
};

/// Default values for configuration
pub mod defaults {
    use super::*;

    pub const LOG_LEVEL: LogLevel = LogLevel::Info;
    pub const FILENAME_LOG: &str = "lotto-drawer.log";
    pub const LOGS_PATH: &str = "logs/";
    pub const JOURNAL_PATH: &str = "journal/";
    pub const ENDPOINT_NAME: &str = "local";
    pub const ENDPOINT_URL: &str = "http://127.0.0.1:8545";
    pub const STRATEGY: StrategyKind = StrategyKind::Uniform;

    pub const ATTEMPT_TIMEOUT_MS: u64 = 5_000;
    pub const CONNECTION_TIMEOUT_MS: u64 = 3_000;

    // Validation limits
    pub const MIN_TIMEOUT_MS: u64 = 100;
    pub const MAX_TIMEOUT_MS: u64 = 300_000;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default)]
    pub disable_file_logging: bool,

    #[serde(default)]
    pub disable_log_color: bool,

    #[serde(default = "default_filename_log")]
    pub filename_log: String,

    #[serde(default = "default_logs_path")]
    pub logs_path: String,

    /// Directory holding the draw journal
    #[serde(default = "default_journal_path")]
    pub journal_path: String,

    /// Read endpoints in priority order; the first one also carries submissions
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<Endpoint>,

    pub contract_address: Option<Address>,

    /// Node-managed account that sends `finalizeDraw`
    pub operator_address: Option<Address>,

    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,

    #[serde(default)]
    pub uniform: UniformIndex,

    #[serde(default)]
    pub resolve_mode: ResolveMode,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    #[serde(default)]
    pub auto_fix_config: bool,

    #[serde(default)]
    pub strict_validation: bool,
}

fn default_log_level() -> LogLevel {
    defaults::LOG_LEVEL
}
fn default_filename_log() -> String {
    defaults::FILENAME_LOG.to_string()
}
fn default_logs_path() -> String {
    defaults::LOGS_PATH.to_string()
}
fn default_journal_path() -> String {
    defaults::JOURNAL_PATH.to_string()
}
fn default_endpoints() -> Vec<Endpoint> {
    vec![Endpoint::new(defaults::ENDPOINT_NAME, defaults::ENDPOINT_URL)]
}
fn default_strategy() -> StrategyKind {
    defaults::STRATEGY
}
fn default_attempt_timeout_ms() -> u64 {
    defaults::ATTEMPT_TIMEOUT_MS
}
fn default_connection_timeout_ms() -> u64 {
    defaults::CONNECTION_TIMEOUT_MS
}

impl Default for DrawerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            disable_file_logging: false,
            disable_log_color: false,
            filename_log: default_filename_log(),
            logs_path: default_logs_path(),
            journal_path: default_journal_path(),
            endpoints: default_endpoints(),
            contract_address: None,
            operator_address: None,
            strategy: default_strategy(),
            uniform: UniformIndex::default(),
            resolve_mode: ResolveMode::default(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
            auto_fix_config: true,
            strict_validation: false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Invalid endpoint '{name}': '{url}' - must be a valid HTTP/HTTPS URL")]
    InvalidEndpoint { name: String, url: String },
    #[error("Duplicate endpoint URL: '{0}'")]
    DuplicateEndpoint(String),
    #[error("Endpoint list is empty")]
    NoEndpoints,
    #[error("Invalid {field}: {value} ms - must be between {min} and {max} ms")]
    InvalidTimeout { field: String, value: u64, min: u64, max: u64 },
    #[error("Invalid {field}: zero address")]
    ZeroAddress { field: String },
}

pub type ValidationResult<T> = std::result::Result<T, ConfigValidationError>;

pub struct ConfigValidator {
    strict_mode: bool,
    auto_fix: bool,
}

impl ConfigValidator {
    pub fn new(strict_mode: bool, auto_fix: bool) -> Self {
        Self { strict_mode, auto_fix }
    }

    fn fixable(&self) -> bool {
        self.auto_fix && !self.strict_mode
    }

    /// Validate in place, returning the fixes applied and warnings raised.
    /// Runs before logging is set up, so nothing is logged here.
    pub fn validate(&self, config: &mut DrawerConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let mut fixed_issues = Vec::new();

        self.validate_endpoints(config, &mut fixed_issues)?;

        for (field, value, fallback) in [
            ("attempt_timeout_ms", &mut config.attempt_timeout_ms, defaults::ATTEMPT_TIMEOUT_MS),
            (
                "connection_timeout_ms",
                &mut config.connection_timeout_ms,
                defaults::CONNECTION_TIMEOUT_MS,
            ),
        ] {
            if let Err(e) = self.validate_timeout(field, *value) {
                if !self.fixable() {
                    return Err(anyhow!("Configuration validation failed: {}", e));
                }
                *value = fallback;
                fixed_issues.push(format!("Fixed {}: {}, using {} ms", field, e, fallback));
            }
        }

        for (field, address) in [
            ("contract_address", &config.contract_address),
            ("operator_address", &config.operator_address),
        ] {
            match address {
                Some(address) if address.is_zero() => {
                    let e = ConfigValidationError::ZeroAddress { field: field.to_string() };
                    if self.strict_mode {
                        return Err(anyhow!("Configuration validation failed: {}", e));
                    }
                    warnings.push(e.to_string());
                }
                None if field == "contract_address" => {
                    warnings.push(
                        "No contract_address set, every chain command will need --contract"
                            .to_string(),
                    )
                }
                _ => {}
            }
        }

        let mut all_messages = fixed_issues;
        all_messages.extend(warnings);
        Ok(all_messages)
    }

    /// Unusable endpoints are dropped when fixing; an empty result is an error
    fn validate_endpoints(
        &self,
        config: &mut DrawerConfig,
        fixed_issues: &mut Vec<String>,
    ) -> Result<()> {
        let mut kept: Vec<(Endpoint, Url)> = Vec::with_capacity(config.endpoints.len());
        for endpoint in config.endpoints.drain(..) {
            let problem = match self.validate_endpoint(&endpoint) {
                Ok(url) if kept.iter().any(|(_, k)| *k == url) => {
                    Err(ConfigValidationError::DuplicateEndpoint(endpoint.url.clone()))
                }
                checked => checked,
            };

            match problem {
                Ok(url) => kept.push((endpoint, url)),
                Err(e) if self.fixable() => {
                    fixed_issues.push(format!("Dropped endpoint {}: {}", endpoint, e))
                }
                Err(e) => return Err(anyhow!("Configuration validation failed: {}", e)),
            }
        }

        if kept.is_empty() {
            return Err(anyhow!(
                "Configuration validation failed: {}",
                ConfigValidationError::NoEndpoints
            ));
        }

        config.endpoints = kept.into_iter().map(|(endpoint, _)| endpoint).collect();
        Ok(())
    }

    /// Accepts the same address forms as `RpcClient`
    fn validate_endpoint(&self, endpoint: &Endpoint) -> ValidationResult<Url> {
        let invalid = || ConfigValidationError::InvalidEndpoint {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
        };
        let url = endpoint_url(&endpoint.url).map_err(|_| invalid())?;
        match url.scheme() {
            "http" | "https" if url.has_host() => Ok(url),
            _ => Err(invalid()),
        }
    }

    fn validate_timeout(&self, field: &str, value: u64) -> ValidationResult<()> {
        if !(defaults::MIN_TIMEOUT_MS..=defaults::MAX_TIMEOUT_MS).contains(&value) {
            return Err(ConfigValidationError::InvalidTimeout {
                field: field.to_string(),
                value,
                min: defaults::MIN_TIMEOUT_MS,
                max: defaults::MAX_TIMEOUT_MS,
            });
        }
        Ok(())
    }
}

impl DrawerConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            request_timeout: self.attempt_timeout(),
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
        }
    }

    pub fn journal_dir(&self) -> PathBuf {
        PathBuf::from(&self.journal_path)
    }

    pub fn contract(&self) -> Result<Address> {
        self.contract_address
            .ok_or_else(|| anyhow!("contract_address is not configured"))
    }

    pub fn build_strategy(&self) -> Arc<dyn SelectionStrategy> {
        self.strategy.build(self.uniform)
    }

    /// One RPC client per endpoint, in priority order
    pub fn build_clients(&self) -> Result<Vec<(Endpoint, Arc<RpcClient>)>> {
        self.endpoints
            .iter()
            .map(|endpoint| {
                let client = RpcClient::with_config(&endpoint.url, self.rpc_client_config())
                    .with_context(|| format!("Failed to create client for {}", endpoint))?;
                Ok((endpoint.clone(), Arc::new(client)))
            })
            .collect()
    }

    pub fn build_fetcher(
        &self,
        clients: &[(Endpoint, Arc<RpcClient>)],
    ) -> Result<ChainStateFetcher> {
        let members = clients
            .iter()
            .map(|(endpoint, client)| PoolMember::new(endpoint.clone(), client.clone()))
            .collect();
        let pool = EndpointPool::new(members, self.attempt_timeout(), self.resolve_mode)?;
        Ok(ChainStateFetcher::new(Arc::new(pool), self.contract()?))
    }

    /// Pipeline reading through every endpoint and submitting through the first
    pub fn build_pipeline(&self) -> Result<DrawPipeline> {
        let clients = self.build_clients()?;
        let fetcher = self.build_fetcher(&clients)?;
        let (_, primary) = clients
            .first()
            .ok_or_else(|| anyhow!("endpoint list is empty"))?;
        let submitter = RpcSubmitter::new(primary.clone(), self.contract()?, self.operator_address);

        Ok(DrawPipeline::new(fetcher, Arc::new(submitter), self.build_strategy()))
    }

    /// Load and validate, returning the fixes and warnings for the caller to report
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        strict_mode: bool,
        auto_fix: bool,
    ) -> Result<(Self, Vec<String>)> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file '{}'", path.as_ref().display()))?;

        let mut config: DrawerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.as_ref().display()))?;

        let validator = ConfigValidator::new(strict_mode, auto_fix);
        let messages = validator.validate(&mut config)?;

        Ok((config, messages))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file '{}'", path.as_ref().display()))?;

        if log::log_enabled!(log::Level::Info) {
            info!("Configuration saved to: {}", path.as_ref().display());
        }
        Ok(())
    }

    /// Write the default configuration with a descriptive `_info` header
    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut template = serde_json::to_value(DrawerConfig::default())?;
        if let Some(fields) = template.as_object_mut() {
            fields.insert(
                "_info".to_string(),
                json!({
                    "description": "Grid Lotto drawer configuration",
                    "version": "1.0",
                    "sections": {
                        "logging": "log_level, disable_*, filename_log, logs_path",
                        "journal": "journal_path holds the local record of draw attempts",
                        "chain": "endpoints in priority order, contract_address, operator_address",
                        "draw": "strategy, uniform k1/k2, resolve_mode (sequential | race)",
                        "network": "attempt_timeout_ms per endpoint read, connection_timeout_ms",
                        "validation": "auto_fix_config, strict_validation"
                    }
                }),
            );
        }

        std::fs::write(&path, serde_json::to_string_pretty(&template)?)
            .with_context(|| format!("Failed to write template to '{}'", path.as_ref().display()))?;

        if log::log_enabled!(log::Level::Info) {
            info!("Configuration template generated at: {}", path.as_ref().display());
        }
        Ok(())
    }
}

//! Endpoint pool resolver.
//!
//! Reads against the settlement contract go through an ordered list of
//! redundant endpoints. The first endpoint returning data that decodes to
//! the expected shape wins; individual failures are logged and swallowed,
//! only exhausting the whole list is reported to the caller.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tokio::time::timeout;

use lotto_common::{contract::LottoCall, Address, DecodeError};

/// A data-access path for reading round state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
}

impl Endpoint {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, url: U) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// Read-only contract call sent to an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub to: Address,
    pub data: Vec<u8>,
    pub label: &'static str,
}

impl ReadRequest {
    pub fn new(to: Address, call: &LottoCall) -> Self {
        Self {
            to,
            data: call.encode(),
            label: call.name(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error {0}")]
    Http(u16),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Something able to execute a read-only contract call
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Raw return data of the call, empty when the target holds no code or data
    async fn call(&self, request: &ReadRequest) -> Result<Vec<u8>, TransportError>;
}

/// Why one endpoint did not produce a usable answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Transport(TransportError),
    Timeout(Duration),
    /// Well-formed but empty response, e.g. no contract at the target address
    Empty,
    Malformed(DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FailureCategory {
    Transport,
    Timeout,
    Empty,
    Malformed,
}

impl FailureKind {
    pub fn category(&self) -> FailureCategory {
        match self {
            FailureKind::Transport(_) => FailureCategory::Transport,
            FailureKind::Timeout(_) => FailureCategory::Timeout,
            FailureKind::Empty => FailureCategory::Empty,
            FailureKind::Malformed(_) => FailureCategory::Malformed,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport(e) => write!(f, "transport: {}", e),
            FailureKind::Timeout(limit) => write!(f, "timeout after {:?}", limit),
            FailureKind::Empty => write!(f, "empty response"),
            FailureKind::Malformed(e) => write!(f, "malformed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub endpoint: Endpoint,
    pub kind: FailureKind,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.kind)
    }
}

/// Every endpoint failed for one read
#[derive(Debug, Clone, Error)]
#[error("all {} endpoint(s) failed for {label}", .failures.len())]
pub struct FetchExhausted {
    pub label: &'static str,
    pub failures: Vec<EndpointFailure>,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("endpoint list is empty")]
    NoEndpoints,
}

/// Decoded value together with where it came from
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub endpoint: Endpoint,
    pub failures: Vec<EndpointFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolveMode {
    /// Try endpoints one after another in priority order
    #[default]
    Sequential,
    /// Query every endpoint at once, first decoded answer wins
    Race,
}

pub struct PoolMember {
    pub endpoint: Endpoint,
    reader: Arc<dyn ChainReader>,
}

impl PoolMember {
    pub fn new(endpoint: Endpoint, reader: Arc<dyn ChainReader>) -> Self {
        Self { endpoint, reader }
    }
}

/// Ordered, immutable set of endpoints shared by every draw
pub struct EndpointPool {
    members: Vec<PoolMember>,
    attempt_timeout: Duration,
    mode: ResolveMode,
}

impl EndpointPool {
    pub fn new(
        members: Vec<PoolMember>,
        attempt_timeout: Duration,
        mode: ResolveMode,
    ) -> Result<Self, PoolError> {
        if members.is_empty() {
            return Err(PoolError::NoEndpoints);
        }

        Ok(Self {
            members,
            attempt_timeout,
            mode,
        })
    }

    /// Run `request` against the pool and decode the first usable answer
    pub async fn resolve<T, F>(
        &self,
        request: &ReadRequest,
        decode: F,
    ) -> Result<Resolved<T>, FetchExhausted>
    where
        T: Send,
        F: Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync,
    {
        match self.mode {
            ResolveMode::Sequential => self.resolve_sequential(request, &decode).await,
            ResolveMode::Race => self.resolve_race(request, &decode).await,
        }
    }

    async fn resolve_sequential<T, F>(
        &self,
        request: &ReadRequest,
        decode: &F,
    ) -> Result<Resolved<T>, FetchExhausted>
    where
        T: Send,
        F: Fn(&[u8]) -> Result<T, DecodeError> + Sync,
    {
        let mut failures = Vec::new();
        for member in &self.members {
            match self.attempt(member, request, decode).await {
                Ok(value) => return Ok(self.resolved(member, request, value, failures)),
                Err(kind) => failures.push(self.failure(member, request, kind)),
            }
        }

        Err(FetchExhausted {
            label: request.label,
            failures,
        })
    }

    async fn resolve_race<T, F>(
        &self,
        request: &ReadRequest,
        decode: &F,
    ) -> Result<Resolved<T>, FetchExhausted>
    where
        T: Send,
        F: Fn(&[u8]) -> Result<T, DecodeError> + Sync,
    {
        let mut pending: FuturesUnordered<_> = self
            .members
            .iter()
            .map(|member| async move { (member, self.attempt(member, request, decode).await) })
            .collect();

        let mut failures = Vec::new();
        while let Some((member, outcome)) = pending.next().await {
            match outcome {
                Ok(value) => return Ok(self.resolved(member, request, value, failures)),
                Err(kind) => failures.push(self.failure(member, request, kind)),
            }
        }

        Err(FetchExhausted {
            label: request.label,
            failures,
        })
    }

    async fn attempt<T, F>(
        &self,
        member: &PoolMember,
        request: &ReadRequest,
        decode: &F,
    ) -> Result<T, FailureKind>
    where
        F: Fn(&[u8]) -> Result<T, DecodeError> + Sync,
    {
        match timeout(self.attempt_timeout, member.reader.call(request)).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                Err(FailureKind::Timeout(self.attempt_timeout))
            }
            Ok(Err(e)) => Err(FailureKind::Transport(e)),
            Ok(Ok(data)) if data.is_empty() => Err(FailureKind::Empty),
            Ok(Ok(data)) => decode(&data).map_err(FailureKind::Malformed),
        }
    }

    fn resolved<T>(
        &self,
        member: &PoolMember,
        request: &ReadRequest,
        value: T,
        failures: Vec<EndpointFailure>,
    ) -> Resolved<T> {
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "{} resolved by {} after {} failure(s)",
                request.label,
                member.endpoint,
                failures.len()
            );
        }

        Resolved {
            value,
            endpoint: member.endpoint.clone(),
            failures,
        }
    }

    fn failure(
        &self,
        member: &PoolMember,
        request: &ReadRequest,
        kind: FailureKind,
    ) -> EndpointFailure {
        if log::log_enabled!(log::Level::Warn) {
            warn!(
                "Endpoint {} failed for {} [{}]: {}",
                member.endpoint,
                request.label,
                kind.category(),
                kind
            );
        }

        EndpointFailure {
            endpoint: member.endpoint.clone(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotto_common::{abi::Token, contract, RoundId};
    use primitive_types::U256;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Answer(Vec<u8>),
        Fail(TransportError),
        Hang(Duration),
    }

    struct ScriptedReader {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedReader {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChainReader for ScriptedReader {
        async fn call(&self, _request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Answer(data) => Ok(data.clone()),
                Script::Fail(e) => Err(e.clone()),
                Script::Hang(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(count_word(99))
                }
            }
        }
    }

    fn count_word(count: u64) -> Vec<u8> {
        Token::Uint(U256::from(count)).to_word().to_vec()
    }

    fn pool(readers: Vec<Arc<ScriptedReader>>, mode: ResolveMode) -> EndpointPool {
        let members = readers
            .into_iter()
            .enumerate()
            .map(|(i, reader)| {
                let endpoint =
                    Endpoint::new(format!("rpc-{}", i + 1), format!("http://rpc{}.test", i + 1));
                PoolMember::new(endpoint, reader)
            })
            .collect();
        EndpointPool::new(members, Duration::from_millis(50), mode).unwrap()
    }

    fn request() -> ReadRequest {
        ReadRequest::new(Address::new([0x42; 20]), &LottoCall::EntryCount(RoundId(1)))
    }

    #[test]
    fn test_empty_pool_rejected() {
        let pool = EndpointPool::new(Vec::new(), Duration::from_secs(1), ResolveMode::Sequential);
        assert!(pool.is_err());
    }

    #[tokio::test]
    async fn test_failover_to_third_endpoint() {
        let first = ScriptedReader::new(Script::Fail(TransportError::Connect("refused".into())));
        let second = ScriptedReader::new(Script::Answer(Vec::new()));
        let third = ScriptedReader::new(Script::Answer(count_word(12)));
        let readers = vec![first.clone(), second.clone(), third.clone()];
        let pool = pool(readers, ResolveMode::Sequential);

        let resolved = pool.resolve(&request(), contract::decode_entry_count).await.unwrap();
        assert_eq!(resolved.value, 12);
        assert_eq!(resolved.endpoint.name, "rpc-3");
        assert_eq!(resolved.failures.len(), 2);
        assert_eq!(resolved.failures[0].kind.category(), FailureCategory::Transport);
        assert_eq!(resolved.failures[1].kind, FailureKind::Empty);
        assert_eq!(third.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = ScriptedReader::new(Script::Answer(count_word(3)));
        let second = ScriptedReader::new(Script::Answer(count_word(4)));
        let pool = pool(vec![first, second.clone()], ResolveMode::Sequential);

        let resolved = pool.resolve(&request(), contract::decode_entry_count).await.unwrap();
        assert_eq!(resolved.value, 3);
        assert!(resolved.failures.is_empty());
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_count_is_a_valid_answer() {
        let reader = ScriptedReader::new(Script::Answer(count_word(0)));
        let pool = pool(vec![reader], ResolveMode::Sequential);
        let resolved = pool.resolve(&request(), contract::decode_entry_count).await.unwrap();
        assert_eq!(resolved.value, 0);
    }

    #[tokio::test]
    async fn test_malformed_answer_falls_through() {
        let short = ScriptedReader::new(Script::Answer(vec![1, 2, 3]));
        let good = ScriptedReader::new(Script::Answer(count_word(5)));
        let pool = pool(vec![short, good], ResolveMode::Sequential);

        let resolved = pool.resolve(&request(), contract::decode_entry_count).await.unwrap();
        assert_eq!(resolved.value, 5);
        assert_eq!(resolved.failures[0].kind.category(), FailureCategory::Malformed);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_endpoint_failure() {
        let slow = ScriptedReader::new(Script::Hang(Duration::from_secs(5)));
        let fast = ScriptedReader::new(Script::Answer(count_word(8)));
        let pool = pool(vec![slow, fast], ResolveMode::Sequential);

        let resolved = pool.resolve(&request(), contract::decode_entry_count).await.unwrap();
        assert_eq!(resolved.value, 8);
        assert_eq!(resolved.failures[0].kind, FailureKind::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_failure() {
        let readers = vec![
            ScriptedReader::new(Script::Fail(TransportError::Http(502))),
            ScriptedReader::new(Script::Answer(Vec::new())),
            ScriptedReader::new(Script::Fail(TransportError::Timeout)),
        ];
        let pool = pool(readers, ResolveMode::Sequential);

        let err = pool.resolve(&request(), contract::decode_entry_count).await.unwrap_err();
        assert_eq!(err.label, "getEntryCount");
        let categories: Vec<_> = err.failures.iter().map(|f| f.kind.category()).collect();
        assert_eq!(
            categories,
            vec![FailureCategory::Transport, FailureCategory::Empty, FailureCategory::Timeout]
        );
    }

    #[tokio::test]
    async fn test_race_returns_fastest_success() {
        let slow = ScriptedReader::new(Script::Hang(Duration::from_millis(30)));
        let broken = ScriptedReader::new(Script::Fail(TransportError::Connect("reset".into())));
        let fast = ScriptedReader::new(Script::Answer(count_word(21)));
        let pool = pool(vec![slow, broken, fast], ResolveMode::Race);

        let resolved = pool.resolve(&request(), contract::decode_entry_count).await.unwrap();
        assert_eq!(resolved.value, 21);
        assert_eq!(resolved.endpoint.name, "rpc-3");
    }

    #[tokio::test]
    async fn test_race_exhaustion() {
        let readers = vec![
            ScriptedReader::new(Script::Answer(Vec::new())),
            ScriptedReader::new(Script::Fail(TransportError::Http(500))),
        ];
        let pool = pool(readers, ResolveMode::Race);
        let err = pool.resolve(&request(), contract::decode_entry_count).await.unwrap_err();
        assert_eq!(err.failures.len(), 2);
    }

    fn scripted(code: u8, position: usize) -> Arc<ScriptedReader> {
        ScriptedReader::new(match code {
            0 => Script::Fail(TransportError::Connect("refused".into())),
            1 => Script::Answer(Vec::new()),
            2 => Script::Answer(vec![0xff; 3]),
            _ => Script::Answer(count_word(position as u64)),
        })
    }

    proptest! {
        #[test]
        fn test_sequential_returns_first_success(codes in prop::collection::vec(0u8..4, 1..8)) {
            let readers: Vec<_> =
                codes.iter().enumerate().map(|(i, code)| scripted(*code, i)).collect();
            let pool = pool(readers.clone(), ResolveMode::Sequential);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let outcome = runtime.block_on(pool.resolve(&request(), contract::decode_entry_count));

            match codes.iter().position(|code| *code == 3) {
                Some(winner) => {
                    let resolved = outcome.unwrap();
                    prop_assert_eq!(resolved.value, winner as u64);
                    prop_assert_eq!(resolved.failures.len(), winner);
                    let names: Vec<_> =
                        resolved.failures.iter().map(|f| f.endpoint.name.clone()).collect();
                    let expected: Vec<_> = (1..=winner).map(|i| format!("rpc-{}", i)).collect();
                    prop_assert_eq!(names, expected);
                    for reader in &readers[winner + 1..] {
                        prop_assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
                    }
                }
                None => {
                    let exhausted = outcome.unwrap_err();
                    prop_assert_eq!(exhausted.failures.len(), codes.len());
                }
            }
        }
    }
}

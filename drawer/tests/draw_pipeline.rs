use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use primitive_types::U256;

use lotto_common::{
    abi::{self, Token},
    contract::LottoCall,
    selection::{DrawSeed, MinimumCollision, SelectionStrategy, UniformIndex},
    Address, CoordinateSet, DecodeError, RoundId, WinnerIndex,
};
use lotto_drawer::{
    endpoint::{
        ChainReader, Endpoint, EndpointPool, PoolMember, ReadRequest, ResolveMode, TransportError,
    },
    fetcher::ChainStateFetcher,
    pipeline::{ClaimError, DrawError, DrawOutcome, DrawPipeline, DrawRequest},
    submitter::{Receipt, SubmitError, Submitter},
    MemoryLedger,
};

const CONTRACT: Address = Address::new([0xc0; 20]);
const PRICE: u64 = 100;

const REFERENCE_TICKETS: [&str; 5] = [
    "A1,A2,A3,A4,A5,A6",
    "A1,A2,A3,A4,A5,B1",
    "A1,C3,D4,E5,F6,G7",
    "A1,A2,A3,A4,A5,A6",
    "B1,B2,B3,B4,B5,B6",
];

fn player(i: usize) -> Address {
    Address::new([i as u8 + 1; 20])
}

fn ledger_with(tickets: &[&str]) -> Arc<MemoryLedger> {
    let ledger = Arc::new(MemoryLedger::new(CONTRACT, U256::from(PRICE)));
    for (i, ticket) in tickets.iter().enumerate() {
        let coordinates: CoordinateSet = ticket.parse().unwrap();
        ledger.buy_entry(player(i), coordinates, U256::from(PRICE)).unwrap();
    }
    ledger
}

/// Endpoint that never produces usable data
struct Broken(TransportError);

#[async_trait]
impl ChainReader for Broken {
    async fn call(&self, _request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
        Err(self.0.clone())
    }
}

/// Endpoint answering with bytes that decode to nothing
struct Garbage;

#[async_trait]
impl ChainReader for Garbage {
    async fn call(&self, _request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
        Ok(vec![0xff; 3])
    }
}

/// Delays every read before forwarding it
struct Slow {
    inner: Arc<MemoryLedger>,
    delay: Duration,
}

#[async_trait]
impl ChainReader for Slow {
    async fn call(&self, request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
        tokio::time::sleep(self.delay).await;
        self.inner.call(request).await
    }
}

/// Answers the open check, then lets another executor settle the round
struct ClosesAfterOpenCheck {
    inner: Arc<MemoryLedger>,
    winner: WinnerIndex,
}

#[async_trait]
impl ChainReader for ClosesAfterOpenCheck {
    async fn call(&self, request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
        let data = self.inner.call(request).await?;
        if let Ok(LottoCall::IsRoundOpen(round)) = LottoCall::decode(&request.data) {
            if self.inner.is_round_open(round) {
                self.inner
                    .finalize(round, self.winner)
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
            }
        }
        Ok(data)
    }
}

/// Reports one more entry than the listing holds
struct InflatedCount {
    inner: Arc<MemoryLedger>,
}

#[async_trait]
impl ChainReader for InflatedCount {
    async fn call(&self, request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
        let data = self.inner.call(request).await?;
        match LottoCall::decode(&request.data) {
            Ok(LottoCall::EntryCount(_)) => {
                let count = abi::decode_u64(&data)
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
                Ok(abi::encode_tokens(&[Token::Uint(U256::from(count + 1))]))
            }
            _ => Ok(data),
        }
    }
}

/// Counts submissions before handing them to the ledger
struct Counting {
    inner: Arc<MemoryLedger>,
    finalize: AtomicUsize,
    claim: AtomicUsize,
}

impl Counting {
    fn new(inner: Arc<MemoryLedger>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            finalize: AtomicUsize::new(0),
            claim: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Submitter for Counting {
    async fn finalize_draw(
        &self,
        round: RoundId,
        winner: WinnerIndex,
    ) -> Result<Receipt, SubmitError> {
        self.finalize.fetch_add(1, Ordering::SeqCst);
        self.inner.finalize_draw(round, winner).await
    }

    async fn claim(&self, participant: &Address) -> Result<Receipt, SubmitError> {
        self.claim.fetch_add(1, Ordering::SeqCst);
        self.inner.claim(participant).await
    }
}

fn reader<R: ChainReader + 'static>(reader: R) -> Arc<dyn ChainReader> {
    Arc::new(reader)
}

fn build_pipeline(
    readers: Vec<Arc<dyn ChainReader>>,
    submitter: Arc<dyn Submitter>,
    strategy: Arc<dyn SelectionStrategy>,
) -> DrawPipeline {
    let members = readers
        .into_iter()
        .enumerate()
        .map(|(i, reader)| {
            let endpoint =
                Endpoint::new(format!("rpc-{}", i + 1), format!("http://rpc{}.test", i + 1));
            PoolMember::new(endpoint, reader)
        })
        .collect();
    let pool =
        EndpointPool::new(members, Duration::from_millis(500), ResolveMode::Sequential).unwrap();
    DrawPipeline::new(ChainStateFetcher::new(Arc::new(pool), CONTRACT), submitter, strategy)
}

#[tokio::test]
async fn test_failover_then_minimum_collision_winner() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let submitter = Counting::new(ledger.clone());
    let pipeline = build_pipeline(
        vec![
            reader(Broken(TransportError::Connect("refused".into()))),
            reader(Garbage),
            ledger.clone() as Arc<dyn ChainReader>,
        ],
        submitter.clone(),
        Arc::new(MinimumCollision),
    );

    let outcome = pipeline.draw(DrawRequest::round(RoundId(1))).await.unwrap();
    let result = match outcome {
        DrawOutcome::Settled { result, .. } => result,
        other => panic!("expected a settled draw, got {:?}", other),
    };

    assert_eq!(result.winner, WinnerIndex(4));
    assert_eq!(result.score, Some(7));
    assert_eq!(result.participant, Some(player(4)));
    assert_eq!(result.entry_count, 5);
    assert_eq!(submitter.finalize.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.pending(&player(4)), U256::from(5 * PRICE));
    assert!(!ledger.is_round_open(RoundId(1)));
}

#[tokio::test]
async fn test_exhaustion_never_submits() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let submitter = Counting::new(ledger.clone());
    let pipeline = build_pipeline(
        vec![reader(Broken(TransportError::Http(503))), reader(Garbage)],
        submitter.clone(),
        Arc::new(UniformIndex::default()),
    );

    let err = pipeline.draw(DrawRequest::round(RoundId(1))).await.unwrap_err();
    match &err {
        DrawError::FetchExhausted(exhausted) => assert_eq!(exhausted.failures.len(), 2),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.is_retryable());
    assert_eq!(submitter.finalize.load(Ordering::SeqCst), 0);
    assert!(ledger.is_round_open(RoundId(1)));
}

#[tokio::test]
async fn test_inconsistent_round_data_never_submits() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let submitter = Counting::new(ledger.clone());
    let pipeline = build_pipeline(
        vec![reader(InflatedCount { inner: ledger.clone() })],
        submitter.clone(),
        Arc::new(MinimumCollision),
    );

    let err = pipeline.draw(DrawRequest::round(RoundId(1))).await.unwrap_err();
    assert!(matches!(
        err,
        DrawError::Decode(DecodeError::CountMismatch { count: 6, entries: 5 })
    ));
    assert_eq!(submitter.finalize.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_draw_is_already_finalized() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let submitter = Counting::new(ledger.clone());
    let pipeline = build_pipeline(
        vec![ledger.clone() as Arc<dyn ChainReader>],
        submitter.clone(),
        Arc::new(UniformIndex::default()),
    );

    pipeline.draw(DrawRequest::round(RoundId(1))).await.unwrap();
    let err = pipeline.draw(DrawRequest::round(RoundId(1))).await.unwrap_err();

    assert!(matches!(err, DrawError::AlreadyFinalized(RoundId(1))));
    assert!(!err.is_retryable());
    assert_eq!(submitter.finalize.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_late_revert_maps_to_already_finalized() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let submitter = Counting::new(ledger.clone());
    let pipeline = build_pipeline(
        vec![reader(ClosesAfterOpenCheck {
            inner: ledger.clone(),
            winner: WinnerIndex(0),
        })],
        submitter.clone(),
        Arc::new(UniformIndex::default()),
    );

    let outcome = pipeline.draw(DrawRequest::round(RoundId(1))).await;

    assert!(matches!(outcome, Err(DrawError::AlreadyFinalized(RoundId(1)))));
    assert_eq!(submitter.finalize.load(Ordering::SeqCst), 1);
    // The other executor's winner stands
    assert_eq!(ledger.pending(&player(0)), U256::from(5 * PRICE));
}

#[tokio::test]
async fn test_concurrent_draw_on_same_round_is_rejected() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let submitter = Counting::new(ledger.clone());
    let pipeline = build_pipeline(
        vec![reader(Slow {
            inner: ledger.clone(),
            delay: Duration::from_millis(100),
        })],
        submitter.clone(),
        Arc::new(UniformIndex::default()),
    );

    let (first, second) = tokio::join!(pipeline.draw(DrawRequest::round(RoundId(1))), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        pipeline.draw(DrawRequest::round(RoundId(1))).await
    });

    assert!(matches!(first, Ok(DrawOutcome::Settled { .. })));
    assert!(matches!(second, Err(DrawError::DrawInProgress(RoundId(1)))));
    assert_eq!(submitter.finalize.load(Ordering::SeqCst), 1);

    // The slot is released once the attempt ends
    let err = pipeline.draw(DrawRequest::round(RoundId(1))).await.unwrap_err();
    assert!(matches!(err, DrawError::AlreadyFinalized(_)));
}

#[tokio::test]
async fn test_empty_round_skips_submission() {
    let ledger = ledger_with(&[]);
    let submitter = Counting::new(ledger.clone());
    for strategy in [
        Arc::new(UniformIndex::default()) as Arc<dyn SelectionStrategy>,
        Arc::new(MinimumCollision) as Arc<dyn SelectionStrategy>,
    ] {
        let readers = vec![ledger.clone() as Arc<dyn ChainReader>];
        let pipeline = build_pipeline(readers, submitter.clone(), strategy);
        let outcome = pipeline.draw(DrawRequest::default()).await.unwrap();
        assert_eq!(outcome, DrawOutcome::EmptyRound { round: RoundId(1) });
    }
    assert_eq!(submitter.finalize.load(Ordering::SeqCst), 0);
    assert!(ledger.is_round_open(RoundId(1)));
}

#[tokio::test]
async fn test_uniform_draw_is_reproducible() {
    let beacon = [0x5a; 32];
    let mut winners = Vec::new();

    for _ in 0..2 {
        let ledger = ledger_with(&REFERENCE_TICKETS);
        let pipeline = build_pipeline(
            vec![ledger.clone() as Arc<dyn ChainReader>],
            ledger.clone(),
            Arc::new(UniformIndex::default()),
        );
        let outcome = pipeline
            .draw(DrawRequest::round(RoundId(1)).with_beacon(beacon))
            .await
            .unwrap();
        match outcome {
            DrawOutcome::Settled { result, .. } => winners.push((result.winner, result.seed)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    let seed = DrawSeed::derive(RoundId(1), 5, Some(&beacon));
    let expected = UniformIndex::default().index(5, &seed).unwrap();
    assert_eq!(winners, vec![(expected, seed), (expected, seed)]);
}

#[tokio::test]
async fn test_claim_pays_once() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let submitter = Counting::new(ledger.clone());
    let pipeline = build_pipeline(
        vec![ledger.clone() as Arc<dyn ChainReader>],
        submitter.clone(),
        Arc::new(MinimumCollision),
    );
    pipeline.draw(DrawRequest::round(RoundId(1))).await.unwrap();

    let winner = player(4);
    assert_eq!(pipeline.pending_winnings(winner).await.unwrap(), U256::from(5 * PRICE));

    let claimed = pipeline.claim(winner).await.unwrap();
    assert_eq!(claimed.amount, U256::from(5 * PRICE));
    assert_eq!(pipeline.pending_winnings(winner).await.unwrap(), U256::zero());

    let err = pipeline.claim(winner).await.unwrap_err();
    assert!(matches!(err, ClaimError::NothingToClaim(p) if p == winner));
    assert_eq!(submitter.claim.load(Ordering::SeqCst), 1);

    // Bypassing the pending check still cannot pay twice
    assert!(matches!(
        submitter.claim(&winner).await,
        Err(SubmitError::NothingToClaim(_))
    ));
}

#[tokio::test]
async fn test_default_request_draws_current_round() {
    let ledger = ledger_with(&REFERENCE_TICKETS);
    let pipeline = build_pipeline(
        vec![ledger.clone() as Arc<dyn ChainReader>],
        ledger.clone(),
        Arc::new(UniformIndex::default()),
    );

    let first = pipeline.draw(DrawRequest::default()).await.unwrap();
    assert_eq!(first.round(), RoundId(1));

    ledger
        .buy_entry(player(0), "G1,G2,G3,G4,G5,G6".parse().unwrap(), U256::from(PRICE))
        .unwrap();
    let second = pipeline.draw(DrawRequest::default()).await.unwrap();
    assert_eq!(second.round(), RoundId(2));
}

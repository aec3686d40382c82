//! Grid Lotto draw service.
//!
//! Reads round state through a pool of redundant endpoints, runs the
//! configured selection strategy over it and submits the winner to the
//! settlement contract exactly once per successful attempt.

pub mod config;
pub mod endpoint;
pub mod fetcher;
pub mod journal;
pub mod ledger;
pub mod logger;
pub mod pipeline;
pub mod rpc_client;
pub mod submitter;

pub use endpoint::{ChainReader, Endpoint, EndpointPool, FetchExhausted, PoolMember, ResolveMode};
pub use fetcher::ChainStateFetcher;
pub use ledger::MemoryLedger;
pub use pipeline::{DrawError, DrawOutcome, DrawPipeline, DrawRequest};
pub use submitter::{Receipt, SubmitError, Submitter};

//! esadmin - Elasticsearch cluster operations engine
//!
//! Reads cluster health, node and index rosters and shard placement from the
//! control-plane HTTP API, and issues guarded mutations against it.
//!
//! # Architecture
//!
//! - **Client**: JSON-over-HTTP transport with bounded retries for reads
//! - **State**: request-scoped snapshots of health, nodes, indices and shards
//! - **Safety**: pure allow/deny gate consulted before every mutation
//! - **Allocation**: allocation toggle, rebalance limit, shard moves with polling
//! - **Index**: write/flush toggles, flush, index deletion
//! - **Engine**: single `execute(MutationRequest)` entry point and read queries
//!
//! Nothing is cached between operations; each mutation gates against a fresh
//! snapshot.

pub mod allocation;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod metrics;
pub mod safety;
pub mod state;
pub mod types;

pub use allocation::AllocationController;
pub use client::EsClient;
pub use config::{
    Config, ConnectionConfig, LogFormat, LoggingConfig, OperationsConfig, SettingsScope,
};
pub use engine::Engine;
pub use error::{EngineError, PartialFailure, ResolutionError, Result, TransportError};
pub use index::IndexController;
pub use safety::Verdict;
pub use state::{
    ClusterModel, ClusterState, HealthStatus, IndexInfo, IndexStatus, NodeInfo, NodeRoster,
    ShardRef, ShardState, Snapshot,
};
pub use types::{Completion, FinalState, IndexTarget, MutationRequest, OperationResult};

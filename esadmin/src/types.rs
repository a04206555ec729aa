//! Mutation requests and operation results

use crate::error::{EngineError, PartialFailure, ResolutionError};
use crate::state::{ClusterState, IndexInfo, ShardRef};
use serde::Serialize;
use std::fmt;

/// One index by name, or every currently open index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexTarget {
    All,
    Named(String),
}

impl IndexTarget {
    /// `*` and `_all` select every open index
    pub fn parse(s: &str) -> Self {
        match s {
            "*" | "_all" => IndexTarget::All,
            name => IndexTarget::Named(name.to_string()),
        }
    }
}

impl fmt::Display for IndexTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexTarget::All => f.write_str("*"),
            IndexTarget::Named(name) => f.write_str(name),
        }
    }
}

/// Every state-changing operation the engine can issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationRequest {
    AllocationToggle { enable: bool },
    ShardMove { shard: ShardRef, target_node_id: String },
    ConcurrentRebalanceLimit { limit: u32 },
    WriteToggle { target: IndexTarget, enable: bool },
    AutoFlushToggle { target: IndexTarget, enable: bool },
    Flush { target: IndexTarget },
    IndexDelete { index: String },
    NukeAllIndices,
}

impl MutationRequest {
    /// Stable label for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            MutationRequest::AllocationToggle { .. } => "allocation_toggle",
            MutationRequest::ShardMove { .. } => "shard_move",
            MutationRequest::ConcurrentRebalanceLimit { .. } => "concurrent_rebalance_limit",
            MutationRequest::WriteToggle { .. } => "write_toggle",
            MutationRequest::AutoFlushToggle { .. } => "auto_flush_toggle",
            MutationRequest::Flush { .. } => "flush",
            MutationRequest::IndexDelete { .. } => "index_delete",
            MutationRequest::NukeAllIndices => "nuke_all_indices",
        }
    }

    /// Whether the mutation changes shard placement (needs a master)
    pub fn touches_placement(&self) -> bool {
        matches!(
            self,
            MutationRequest::AllocationToggle { .. }
                | MutationRequest::ShardMove { .. }
                | MutationRequest::ConcurrentRebalanceLimit { .. }
        )
    }
}

/// How an asynchronous operation ended locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Reached its target state
    Completed,
    /// Deadline passed before the target state was observed
    TimedOut,
    /// The shard disappeared from its index while being watched
    ShardVanished,
    /// Caller stopped watching; the cluster keeps going
    Cancelled,
}

impl Completion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Completion::Completed => "completed",
            Completion::TimedOut => "timed_out",
            Completion::ShardVanished => "shard_vanished",
            Completion::Cancelled => "cancelled",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Completion::TimedOut | Completion::ShardVanished)
    }
}

/// State observed after an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalState {
    Cluster(ClusterState),
    Shard(ShardRef),
    Indices(Vec<IndexInfo>),
}

/// What the engine reports for a mutation.
///
/// `accepted` says whether the request was issued. Whether it finished is
/// reported separately in `completion`, and per-index failures in `partial`.
/// `accepted == false` always carries a `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub accepted: bool,
    pub reason: Option<String>,
    pub completion: Option<Completion>,
    pub final_state: Option<FinalState>,
    pub partial: Option<PartialFailure>,
}

impl OperationResult {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
            completion: None,
            final_state: None,
            partial: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
            ..Self::accepted()
        }
    }

    pub fn failed(error: &EngineError) -> Self {
        Self::denied(error.to_string())
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_final_state(mut self, state: FinalState) -> Self {
        self.final_state = Some(state);
        self
    }

    /// Attach per-index outcomes; failures are named in `reason`
    pub fn with_partial(mut self, partial: PartialFailure) -> Self {
        if !partial.is_clean() {
            self.reason = Some(partial.summary());
        }
        self.partial = Some(partial);
        self
    }

    /// Accepted, finished (or deliberately cancelled) and free of per-index failures
    pub fn is_clean(&self) -> bool {
        self.accepted
            && !self.completion.is_some_and(|c| c.is_failure())
            && self.partial.as_ref().map_or(true, PartialFailure::is_clean)
    }

    /// Convert into the error taxonomy for callers that prefer `?`
    pub fn into_result(self) -> Result<Self, EngineError> {
        if !self.accepted {
            return Err(EngineError::SafetyDenied {
                reason: self.reason.unwrap_or_else(|| "request refused".to_string()),
            });
        }
        match self.completion {
            Some(Completion::TimedOut) => {
                return Err(EngineError::Timeout(
                    self.reason
                        .unwrap_or_else(|| "operation did not finish in time".to_string()),
                ))
            }
            Some(Completion::ShardVanished) => {
                return Err(ResolutionError::shard_not_found(
                    self.reason.unwrap_or_else(|| "shard vanished".to_string()),
                )
                .into())
            }
            _ => {}
        }
        if let Some(ref partial) = self.partial {
            if !partial.is_clean() {
                return Err(EngineError::PartialFailure(partial.clone()));
            }
        }
        Ok(self)
    }
}

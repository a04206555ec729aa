//! Index/write toggle controller
//!
//! Per-index settings toggles, flush and deletion. Toggles and flush are
//! best-effort across their targets: one failing index never stops the
//! rest, and failures are aggregated into a [`PartialFailure`]. Deleting
//! every index is the exception and is all-or-nothing at the gate.

use crate::error::{PartialFailure, ResolutionError, Result, TransportError};
use crate::safety::{self, Verdict};
use crate::state::{ClusterModel, IndexInfo, FLUSH_DISABLE_SETTING, WRITE_BLOCK_SETTING};
use crate::types::{FinalState, IndexTarget, MutationRequest, OperationResult};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

/// What to do to each targeted index
#[derive(Debug, Clone)]
enum IndexAction {
    Setting { key: &'static str, value: bool },
    Flush,
}

impl fmt::Display for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexAction::Setting { key, value } => write!(f, "set {}={}", key, value),
            IndexAction::Flush => f.write_str("flush"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexController {
    model: ClusterModel,
}

impl IndexController {
    pub fn new(model: ClusterModel) -> Self {
        Self { model }
    }

    async fn gate(&self, request: &MutationRequest) -> Result<Verdict> {
        let snapshot = self.model.snapshot().await?;
        let verdict = safety::evaluate(request, &snapshot);
        if let Verdict::Deny(reason) = &verdict {
            warn!("Refusing {}: {}", request.name(), reason);
        }
        Ok(verdict)
    }

    /// Expand a target into index names. `All` means every open index.
    async fn resolve(&self, target: &IndexTarget) -> Result<Vec<String>> {
        let indices = self.model.fetch_indices().await?;
        match target {
            IndexTarget::All => Ok(indices
                .into_iter()
                .filter(IndexInfo::is_open)
                .map(|index| index.name)
                .collect()),
            IndexTarget::Named(name) => {
                if indices.iter().any(|index| &index.name == name) {
                    Ok(vec![name.clone()])
                } else {
                    Err(ResolutionError::index_not_found(name).into())
                }
            }
        }
    }

    async fn apply(
        &self,
        index: &str,
        action: &IndexAction,
    ) -> std::result::Result<(), TransportError> {
        let client = self.model.client();
        match action {
            IndexAction::Setting { key, value } => {
                let mut body = Map::new();
                body.insert(key.to_string(), Value::Bool(*value));
                client
                    .put(&format!("/{}/_settings", index), &Value::Object(body))
                    .await?;
            }
            IndexAction::Flush => {
                client.post(&format!("/{}/_flush", index), None).await?;
            }
        }
        Ok(())
    }

    async fn apply_each(&self, targets: &[String], action: &IndexAction) -> PartialFailure {
        let mut outcome = PartialFailure::default();
        for index in targets {
            match self.apply(index, action).await {
                Ok(()) => {
                    outcome.succeeded.insert(index.clone());
                }
                Err(e) => {
                    warn!("Failed to {} on {}: {}", action, index, e);
                    outcome.failed.insert(index.clone(), e.to_string());
                }
            }
        }
        outcome
    }

    /// Re-read the targeted indices after a change. A failed read only
    /// costs the caller the final state.
    async fn observe(&self, targets: &[String]) -> Option<FinalState> {
        let wanted: BTreeSet<&str> = targets.iter().map(String::as_str).collect();
        match self.model.fetch_indices().await {
            Ok(indices) => Some(FinalState::Indices(
                indices
                    .into_iter()
                    .filter(|index| wanted.contains(index.name.as_str()))
                    .collect(),
            )),
            Err(e) => {
                warn!("Could not re-read indices after update: {}", e);
                None
            }
        }
    }

    async fn run_best_effort(
        &self,
        request: MutationRequest,
        target: &IndexTarget,
        action: IndexAction,
    ) -> Result<OperationResult> {
        if let Verdict::Deny(reason) = self.gate(&request).await? {
            return Ok(OperationResult::denied(reason));
        }

        let targets = self.resolve(target).await?;
        if targets.is_empty() {
            return Ok(OperationResult::accepted().with_reason("no open indices to update"));
        }

        let outcome = self.apply_each(&targets, &action).await;
        info!(
            "{} on {}: {} succeeded, {} failed",
            action,
            target,
            outcome.succeeded.len(),
            outcome.failed.len()
        );

        let mut result = OperationResult::accepted().with_partial(outcome);
        if let Some(state) = self.observe(&targets).await {
            result = result.with_final_state(state);
        }
        Ok(result)
    }

    /// Block or unblock writes on one index or every open index
    pub async fn set_write_enabled(
        &self,
        target: &IndexTarget,
        enable: bool,
    ) -> Result<OperationResult> {
        let request = MutationRequest::WriteToggle {
            target: target.clone(),
            enable,
        };
        let action = IndexAction::Setting {
            key: WRITE_BLOCK_SETTING,
            value: !enable,
        };
        self.run_best_effort(request, target, action).await
    }

    /// Suspend or resume automatic translog flushing
    pub async fn set_auto_flush_enabled(
        &self,
        target: &IndexTarget,
        enable: bool,
    ) -> Result<OperationResult> {
        let request = MutationRequest::AutoFlushToggle {
            target: target.clone(),
            enable,
        };
        let action = IndexAction::Setting {
            key: FLUSH_DISABLE_SETTING,
            value: !enable,
        };
        self.run_best_effort(request, target, action).await
    }

    pub async fn flush(&self, target: &IndexTarget) -> Result<OperationResult> {
        let request = MutationRequest::Flush {
            target: target.clone(),
        };
        self.run_best_effort(request, target, IndexAction::Flush).await
    }

    pub async fn delete_index(&self, name: &str) -> Result<OperationResult> {
        let request = MutationRequest::IndexDelete {
            index: name.to_string(),
        };
        if let Verdict::Deny(reason) = self.gate(&request).await? {
            return Ok(OperationResult::denied(reason));
        }

        self.model.fetch_index(name).await?;
        self.model
            .client()
            .delete(&format!("/{}", name))
            .await?;
        info!("Deleted index {}", name);

        Ok(OperationResult::accepted())
    }

    /// Delete every index in the cluster.
    ///
    /// Refused outright if any index is red. Deletion stops at the first
    /// failure, which is reported as not accepted with the indices already
    /// deleted listed in `partial`.
    pub async fn nuke_all_indices(&self) -> Result<OperationResult> {
        let request = MutationRequest::NukeAllIndices;
        let (snapshot, indices) =
            tokio::try_join!(self.model.snapshot(), self.model.fetch_indices())?;

        if let Verdict::Deny(reason) = safety::evaluate(&request, &snapshot) {
            warn!("Refusing {}: {}", request.name(), reason);
            return Ok(OperationResult::denied(reason));
        }

        let refused: Vec<String> = indices
            .iter()
            .filter(|index| index.is_open())
            .filter_map(|index| {
                safety::evaluate_nuke_index(&index.name, &snapshot.state)
                    .reason()
                    .map(String::from)
            })
            .collect();
        if !refused.is_empty() {
            let reason = format!("refusing to delete all indices: {}", refused.join("; "));
            warn!("{}", reason);
            return Ok(OperationResult::denied(reason));
        }

        let mut deleted = PartialFailure::default();
        for index in &indices {
            if let Err(e) = self.model.client().delete(&format!("/{}", index.name)).await {
                warn!("Deleting {} failed, stopping: {}", index.name, e);
                let reason = format!(
                    "deleting {} failed after {} of {} indices were deleted: {}",
                    index.name,
                    deleted.succeeded.len(),
                    indices.len(),
                    e
                );
                deleted.failed.insert(index.name.clone(), e.to_string());
                return Ok(OperationResult {
                    partial: Some(deleted),
                    ..OperationResult::denied(reason)
                });
            }
            info!("Deleted index {}", index.name);
            deleted.succeeded.insert(index.name.clone());
        }

        Ok(OperationResult::accepted().with_partial(deleted))
    }
}

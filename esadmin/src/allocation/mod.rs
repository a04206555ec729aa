//! Allocation controller
//!
//! Cluster-wide placement knobs and explicit shard relocation. Every
//! method consults the safety gate against a fresh snapshot before it
//! issues anything; a denial makes no mutating call.

mod watch;

pub use watch::{classify_move, watch_shard, MoveProgress};

use crate::config::{OperationsConfig, SettingsScope};
use crate::error::Result;
use crate::safety::{self, Verdict};
use crate::state::{ClusterModel, ShardRef, CLUSTER_SETTINGS_PATH};
use crate::types::{Completion, FinalState, MutationRequest, OperationResult};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const ALLOCATION_ENABLE_SETTING: &str = "cluster.routing.allocation.enable";
pub const CONCURRENT_REBALANCE_SETTING: &str =
    "cluster.routing.allocation.cluster_concurrent_rebalance";

const REROUTE_PATH: &str = "/_cluster/reroute";

/// `{"transient": {"cluster.routing...": value}}`
fn settings_body(scope: SettingsScope, key: &str, value: Value) -> Value {
    let mut settings = Map::new();
    settings.insert(key.to_string(), value);
    let mut body = Map::new();
    body.insert(scope.as_str().to_string(), Value::Object(settings));
    Value::Object(body)
}

#[derive(Debug, Clone)]
pub struct AllocationController {
    model: ClusterModel,
    options: OperationsConfig,
}

impl AllocationController {
    pub fn new(model: ClusterModel, options: OperationsConfig) -> Self {
        Self { model, options }
    }

    async fn gate(&self, request: &MutationRequest) -> Result<Verdict> {
        let snapshot = self.model.snapshot().await?;
        let verdict = safety::evaluate(request, &snapshot);
        if let Verdict::Deny(reason) = &verdict {
            warn!("Refusing {}: {}", request.name(), reason);
        }
        Ok(verdict)
    }

    async fn put_cluster_setting(&self, key: &str, value: Value) -> Result<()> {
        let body = settings_body(self.options.settings_scope, key, value);
        self.model.client().put(CLUSTER_SETTINGS_PATH, &body).await?;
        Ok(())
    }

    /// Toggle shard allocation cluster-wide. Setting the current value again
    /// is a successful no-op.
    pub async fn set_allocation_enabled(&self, enable: bool) -> Result<OperationResult> {
        let request = MutationRequest::AllocationToggle { enable };
        if let Verdict::Deny(reason) = self.gate(&request).await? {
            return Ok(OperationResult::denied(reason));
        }

        let value = if enable { "all" } else { "none" };
        self.put_cluster_setting(ALLOCATION_ENABLE_SETTING, json!(value))
            .await?;
        info!("Set {}={}", ALLOCATION_ENABLE_SETTING, value);

        Ok(OperationResult::accepted())
    }

    /// Cap concurrent rebalance relocations; `0` stops rebalancing while
    /// leaving allocation of unassigned shards alone
    pub async fn set_concurrent_rebalance_limit(&self, limit: u32) -> Result<OperationResult> {
        let request = MutationRequest::ConcurrentRebalanceLimit { limit };
        if let Verdict::Deny(reason) = self.gate(&request).await? {
            return Ok(OperationResult::denied(reason));
        }

        self.put_cluster_setting(CONCURRENT_REBALANCE_SETTING, json!(limit))
            .await?;
        info!("Set {}={}", CONCURRENT_REBALANCE_SETTING, limit);

        Ok(OperationResult::accepted())
    }

    /// Relocate one shard copy and watch it until it lands.
    ///
    /// `accepted` reports that the reroute was issued; `completion` reports
    /// how watching ended. Cancelling stops watching only, the relocation
    /// carries on in the cluster.
    pub async fn move_shard(
        &self,
        shard: &ShardRef,
        target_node_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<OperationResult> {
        let request = MutationRequest::ShardMove {
            shard: shard.clone(),
            target_node_id: target_node_id.to_string(),
        };
        if let Verdict::Deny(reason) = self.gate(&request).await? {
            return Ok(OperationResult::denied(reason));
        }

        let Some(source) = shard.current_node_id.as_deref() else {
            return Ok(OperationResult::denied(format!(
                "{} is unassigned; nothing to move",
                shard
            )));
        };

        if source == target_node_id {
            return Ok(OperationResult::accepted()
                .with_reason(format!("{} is already on {}", shard, target_node_id))
                .with_completion(Completion::Completed)
                .with_final_state(FinalState::Shard(shard.clone())));
        }

        let body = json!({
            "commands": [{
                "move": {
                    "index": shard.index_name,
                    "shard": shard.shard_number,
                    "from_node": source,
                    "to_node": target_node_id,
                }
            }]
        });
        self.model.client().post(REROUTE_PATH, Some(&body)).await?;
        info!("Reroute issued: {} from {} to {}", shard, source, target_node_id);

        let (completion, last_seen) = self
            .await_move(shard, target_node_id, timeout, cancel)
            .await;

        let result = OperationResult::accepted()
            .with_completion(completion)
            .with_final_state(FinalState::Shard(last_seen));

        Ok(match completion {
            Completion::Completed => result,
            Completion::TimedOut => result.with_reason(format!(
                "{} did not reach {} within {}s",
                shard,
                target_node_id,
                timeout.as_secs_f64()
            )),
            Completion::ShardVanished => {
                result.with_reason(format!("{} disappeared while moving", shard))
            }
            Completion::Cancelled => result.with_reason(format!(
                "stopped watching {}; the relocation continues in the cluster",
                shard
            )),
        })
    }

    async fn await_move(
        &self,
        shard: &ShardRef,
        target_node_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> (Completion, ShardRef) {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let updates = watch_shard(self.model.clone(), self.options.poll_interval());
        tokio::pin!(updates);

        let mut last_seen = shard.clone();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Stopped watching {} before it landed", shard);
                    return (Completion::Cancelled, last_seen);
                }
                _ = &mut deadline => {
                    warn!("Timed out waiting for {} to reach {}", shard, target_node_id);
                    return (Completion::TimedOut, last_seen);
                }
                update = updates.next() => match update {
                    Some(Ok(shards)) => match classify_move(shard, target_node_id, &shards) {
                        MoveProgress::Landed(landed) => {
                            info!("{} is started on {}", landed, target_node_id);
                            return (Completion::Completed, landed);
                        }
                        MoveProgress::Vanished => {
                            warn!("{} vanished from the routing table", shard);
                            return (Completion::ShardVanished, last_seen);
                        }
                        MoveProgress::InFlight(Some(current)) => {
                            debug!(
                                "{} is {:?} on {:?}",
                                current, current.state, current.current_node_id
                            );
                            last_seen = current;
                        }
                        MoveProgress::InFlight(None) => {}
                    },
                    Some(Err(e)) => warn!("Polling placement of {} failed: {}", shard, e),
                    None => return (Completion::TimedOut, last_seen),
                },
            }
        }
    }
}

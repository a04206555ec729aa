//! Engine entry point
//!
//! One generic mutation entry point over both controllers, plus the read
//! queries the command front end needs.

use crate::allocation::AllocationController;
use crate::client::EsClient;
use crate::config::{Config, OperationsConfig};
use crate::error::Result;
use crate::index::IndexController;
use crate::metrics::record_operation;
use crate::state::{ClusterModel, ClusterState, IndexInfo, NodeInfo, NodeRoster, ShardRef};
use crate::types::{MutationRequest, OperationResult};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cluster operations engine
#[derive(Debug, Clone)]
pub struct Engine {
    model: ClusterModel,
    allocation: AllocationController,
    indices: IndexController,
    options: OperationsConfig,
}

/// Metrics label for how a result ended
fn outcome_label(result: &OperationResult) -> &'static str {
    if !result.accepted {
        return "denied";
    }
    if let Some(completion) = result.completion {
        if completion.is_failure() {
            return completion.as_str();
        }
    }
    if result.partial.as_ref().is_some_and(|p| !p.is_clean()) {
        return "partial";
    }
    "accepted"
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        let client = EsClient::new(&config.connection)?;
        Ok(Self::with_client(client, config.operations.clone()))
    }

    pub fn with_client(client: EsClient, options: OperationsConfig) -> Self {
        let model = ClusterModel::new(client);
        Self {
            allocation: AllocationController::new(model.clone(), options.clone()),
            indices: IndexController::new(model.clone()),
            model,
            options,
        }
    }

    pub fn model(&self) -> &ClusterModel {
        &self.model
    }

    pub fn options(&self) -> &OperationsConfig {
        &self.options
    }

    /// Run a mutation through the safety gate and the owning controller.
    ///
    /// Never fails: transport and resolution errors come back as a result
    /// with `accepted == false` and the error as its reason.
    pub async fn execute(
        &self,
        request: MutationRequest,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let name = request.name();
        debug!("Executing {}", name);

        let outcome = match request {
            MutationRequest::AllocationToggle { enable } => {
                self.allocation.set_allocation_enabled(enable).await
            }
            MutationRequest::ConcurrentRebalanceLimit { limit } => {
                self.allocation.set_concurrent_rebalance_limit(limit).await
            }
            MutationRequest::ShardMove {
                shard,
                target_node_id,
            } => {
                self.allocation
                    .move_shard(&shard, &target_node_id, self.options.move_timeout(), cancel)
                    .await
            }
            MutationRequest::WriteToggle { target, enable } => {
                self.indices.set_write_enabled(&target, enable).await
            }
            MutationRequest::AutoFlushToggle { target, enable } => {
                self.indices.set_auto_flush_enabled(&target, enable).await
            }
            MutationRequest::Flush { target } => self.indices.flush(&target).await,
            MutationRequest::IndexDelete { index } => self.indices.delete_index(&index).await,
            MutationRequest::NukeAllIndices => self.indices.nuke_all_indices().await,
        };

        match outcome {
            Ok(result) => {
                let label = outcome_label(&result);
                record_operation(name, label);
                if label == "accepted" {
                    info!("{} accepted", name);
                } else {
                    warn!(
                        "{} {}: {}",
                        name,
                        label,
                        result.reason.as_deref().unwrap_or("no reason given")
                    );
                }
                result
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                record_operation(name, e.error_type());
                OperationResult::failed(&e)
            }
        }
    }

    pub async fn fetch_health(&self) -> Result<ClusterState> {
        self.model.fetch_health().await
    }

    pub async fn fetch_nodes(&self) -> Result<NodeRoster> {
        self.model.fetch_nodes().await
    }

    pub async fn fetch_local_node(&self) -> Result<NodeInfo> {
        self.model.fetch_local_node().await
    }

    pub async fn fetch_indices(&self) -> Result<Vec<IndexInfo>> {
        self.model.fetch_indices().await
    }

    pub async fn fetch_index(&self, name: &str) -> Result<IndexInfo> {
        self.model.fetch_index(name).await
    }

    pub async fn fetch_shard_allocation(&self) -> Result<Vec<ShardRef>> {
        self.model.fetch_shard_allocation().await
    }

    pub async fn resolve_node_name_to_id(&self, name: &str) -> Result<String> {
        self.model.resolve_node_name_to_id(name).await
    }

    /// Node by exact id, else by unique name
    pub async fn resolve_node(&self, id_or_name: &str) -> Result<NodeInfo> {
        let roster = self.model.fetch_nodes().await?;
        Ok(roster.resolve(id_or_name)?.clone())
    }

    pub async fn is_master(&self, node_id: &str) -> Result<bool> {
        self.model.is_master(node_id).await
    }

    pub async fn shard_count_for_node(&self, node_id: &str) -> Result<usize> {
        self.model.shard_count_for_node(node_id).await
    }

    pub async fn find_shard(
        &self,
        index: &str,
        shard_number: u32,
        node_id: &str,
        primary: Option<bool>,
    ) -> Result<ShardRef> {
        self.model
            .find_shard(index, shard_number, node_id, primary)
            .await
    }

    pub async fn cluster_state_raw(&self) -> Result<Value> {
        self.model.cluster_state_raw().await
    }

    pub async fn cluster_settings_raw(&self) -> Result<Value> {
        self.model.cluster_settings_raw().await
    }

    pub async fn node_stats_raw(&self, node_id: &str) -> Result<Value> {
        self.model.node_stats_raw(node_id).await
    }

    pub async fn node_settings_raw(&self, node_id: &str) -> Result<Value> {
        self.model.node_settings_raw(node_id).await
    }
}

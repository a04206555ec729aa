//! Fetching and normalizing cluster state from the control plane

use super::{
    AllocationExclusions, ClusterState, HealthStatus, IndexInfo, IndexStatus, NodeInfo,
    NodeRoster, ShardRef, ShardState, Snapshot,
};
use crate::client::EsClient;
use crate::error::{ResolutionError, Result, TransportError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// `local=true` so both reads answer while no master is elected
const HEALTH_PATH: &str = "/_cluster/health?level=indices&local=true";
const MASTER_PATH: &str = "/_cluster/state/master_node?local=true";
const ROUTING_PATH: &str = "/_cluster/state/routing_table";
const METADATA_PATH: &str = "/_cluster/state/metadata,routing_table";
const STORE_STATS_PATH: &str = "/_stats/store";
const NODES_PATH: &str = "/_nodes";
pub(crate) const CLUSTER_SETTINGS_PATH: &str = "/_cluster/settings";

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    cluster_name: String,
    status: HealthStatus,
    #[serde(default)]
    number_of_nodes: u32,
    #[serde(default)]
    number_of_data_nodes: u32,
    #[serde(default)]
    active_shards: u32,
    #[serde(default)]
    relocating_shards: u32,
    #[serde(default)]
    initializing_shards: u32,
    #[serde(default)]
    unassigned_shards: u32,
    #[serde(default)]
    indices: BTreeMap<String, IndexHealthEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexHealthEntry {
    status: HealthStatus,
}

#[derive(Debug, Deserialize)]
struct MasterResponse {
    #[serde(default)]
    master_node: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodesResponse {
    #[serde(default)]
    nodes: BTreeMap<String, RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    transport_address: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingResponse {
    #[serde(default)]
    routing_table: RoutingTable,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingTable {
    #[serde(default)]
    indices: BTreeMap<String, IndexRouting>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexRouting {
    #[serde(default)]
    shards: BTreeMap<String, Vec<RawShard>>,
}

#[derive(Debug, Deserialize)]
struct RawShard {
    state: ShardState,
    primary: bool,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    relocating_node: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    indices: BTreeMap<String, IndexMetadata>,
}

#[derive(Debug, Deserialize)]
struct IndexMetadata {
    state: IndexStatus,
    #[serde(default)]
    settings: Value,
}

#[derive(Debug, Default, Deserialize)]
struct StoreStatsResponse {
    #[serde(default)]
    indices: BTreeMap<String, IndexStats>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStats {
    #[serde(default)]
    total: StatsSection,
}

#[derive(Debug, Default, Deserialize)]
struct StatsSection {
    #[serde(default)]
    store: StoreSection,
}

#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    #[serde(default)]
    size_in_bytes: u64,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsResponse {
    #[serde(default)]
    persistent: Value,
    #[serde(default)]
    transient: Value,
}

/// Flatten nested settings into dotted keys.
///
/// `{"index": {"blocks": {"write": true}}}` and `{"index.blocks.write": "true"}`
/// both become `index.blocks.write -> "true"`.
pub fn flatten_settings(value: &Value) -> BTreeMap<String, String> {
    fn walk(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
        let key = |k: &str| {
            if prefix.is_empty() {
                k.to_string()
            } else {
                format!("{}.{}", prefix, k)
            }
        };
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    walk(&key(k.as_str()), v, out);
                }
            }
            Value::Null => {}
            Value::String(s) => {
                out.insert(prefix.to_string(), s.clone());
            }
            Value::Array(items) => {
                let joined: Vec<String> = items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                out.insert(prefix.to_string(), joined.join(","));
            }
            other => {
                out.insert(prefix.to_string(), other.to_string());
            }
        }
    }

    let mut out = BTreeMap::new();
    walk("", value, &mut out);
    out
}

/// Cluster-level settings, flattened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSettings {
    pub persistent: BTreeMap<String, String>,
    pub transient: BTreeMap<String, String>,
}

impl ClusterSettings {
    /// Effective value: transient overrides persistent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.transient
            .get(key)
            .or_else(|| self.persistent.get(key))
            .map(String::as_str)
    }

    /// Allocation exclusion filters currently in effect
    pub fn exclusions(&self) -> AllocationExclusions {
        let list = |attr: &str| -> BTreeSet<String> {
            self.get(&format!("cluster.routing.allocation.exclude.{}", attr))
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        AllocationExclusions {
            ids: list("_id"),
            names: list("_name"),
            hosts: list("_host"),
            ips: list("_ip"),
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> std::result::Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn attribute_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize_node(id: String, raw: RawNode) -> NodeInfo {
    let attributes: BTreeMap<String, String> = raw
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), attribute_string(v)))
        .collect();

    // Older clusters advertise roles as master/data attributes
    let roles: BTreeSet<String> = match raw.roles {
        Some(roles) => roles.into_iter().collect(),
        None => ["master", "data"]
            .into_iter()
            .filter(|role| attributes.get(*role).map(String::as_str) != Some("false"))
            .map(String::from)
            .collect(),
    };

    NodeInfo {
        id,
        name: raw.name,
        roles,
        address: raw.transport_address.unwrap_or_default(),
        host: raw.host,
        ip: raw.ip,
        version: raw.version,
        attributes,
    }
}

fn parse_nodes(value: Value) -> std::result::Result<NodeRoster, TransportError> {
    let response: NodesResponse = decode(NODES_PATH, value)?;
    Ok(response
        .nodes
        .into_iter()
        .map(|(id, raw)| normalize_node(id, raw))
        .collect())
}

/// Flatten a routing table. Shard keys must be shard numbers.
fn shard_refs(
    path: &str,
    routing: &RoutingTable,
) -> std::result::Result<Vec<ShardRef>, TransportError> {
    let mut shards = Vec::new();
    for (index, table) in &routing.indices {
        for (number, copies) in &table.shards {
            let shard_number = number.parse::<u32>().map_err(|e| TransportError::Decode {
                path: path.to_string(),
                reason: format!("shard key {:?} of {}: {}", number, index, e),
            })?;
            shards.extend(copies.iter().map(|copy| ShardRef {
                index_name: index.clone(),
                shard_number,
                is_primary: copy.primary,
                current_node_id: copy.node.clone(),
                state: copy.state,
                relocating_node_id: copy.relocating_node.clone(),
            }));
        }
    }

    shards.sort_by(|a, b| {
        (&a.index_name, a.shard_number, !a.is_primary, &a.current_node_id).cmp(&(
            &b.index_name,
            b.shard_number,
            !b.is_primary,
            &b.current_node_id,
        ))
    });
    Ok(shards)
}

fn parse_count(settings: &BTreeMap<String, String>, key: &str) -> Option<u32> {
    settings.get(key).and_then(|v| v.parse().ok())
}

fn build_indices(
    routing: RoutingResponse,
    stats: StoreStatsResponse,
) -> std::result::Result<Vec<IndexInfo>, TransportError> {
    let shards = shard_refs(METADATA_PATH, &routing.routing_table)?;

    Ok(routing
        .metadata
        .indices
        .into_iter()
        .map(|(name, meta)| {
            let settings = flatten_settings(&meta.settings);
            let index_shards: Vec<&ShardRef> =
                shards.iter().filter(|s| s.index_name == name).collect();

            let routed_count = index_shards
                .iter()
                .map(|s| s.shard_number + 1)
                .max()
                .unwrap_or(0);
            let shard_count =
                parse_count(&settings, "index.number_of_shards").unwrap_or(routed_count);
            let replica_count = parse_count(&settings, "index.number_of_replicas").unwrap_or(0);

            let primary_locations = (0..shard_count)
                .map(|number| {
                    index_shards
                        .iter()
                        .find(|s| s.shard_number == number && s.is_primary)
                        .and_then(|s| s.current_node_id.clone())
                })
                .collect();

            let size_bytes = stats
                .indices
                .get(&name)
                .map(|s| s.total.store.size_in_bytes)
                .unwrap_or(0);

            IndexInfo {
                name,
                settings,
                status: meta.state,
                shard_count,
                replica_count,
                size_bytes,
                primary_locations,
            }
        })
        .collect())
}

/// Read-side access to cluster state.
///
/// Every call goes to the network; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    client: EsClient,
}

impl ClusterModel {
    pub fn new(client: EsClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &EsClient {
        &self.client
    }

    /// Cluster health, per-index health and the elected master
    pub async fn fetch_health(&self) -> Result<ClusterState> {
        let (health, master) = tokio::try_join!(
            self.client.get_as::<HealthResponse>(HEALTH_PATH),
            self.client.get_as::<MasterResponse>(MASTER_PATH),
        )?;

        Ok(ClusterState {
            cluster_name: health.cluster_name,
            health: health.status,
            master_node_id: master.master_node.filter(|id| !id.is_empty()),
            number_of_nodes: health.number_of_nodes,
            number_of_data_nodes: health.number_of_data_nodes,
            active_shards: health.active_shards,
            relocating_shards: health.relocating_shards,
            initializing_shards: health.initializing_shards,
            unassigned_shards: health.unassigned_shards,
            index_health: health
                .indices
                .into_iter()
                .map(|(name, entry)| (name, entry.status))
                .collect(),
        })
    }

    pub async fn fetch_nodes(&self) -> Result<NodeRoster> {
        let value = self.client.get(NODES_PATH).await?;
        Ok(parse_nodes(value)?)
    }

    /// The node serving our requests
    pub async fn fetch_local_node(&self) -> Result<NodeInfo> {
        let path = format!("{}/_local", NODES_PATH);
        let value = self.client.get(&path).await?;
        let roster = parse_nodes(value)?;
        let local = roster.iter().next().cloned();
        local.ok_or_else(|| ResolutionError::node_not_found("_local").into())
    }

    pub async fn fetch_indices(&self) -> Result<Vec<IndexInfo>> {
        let (routing, stats) = tokio::try_join!(
            self.client.get_as::<RoutingResponse>(METADATA_PATH),
            self.client.get_as::<StoreStatsResponse>(STORE_STATS_PATH),
        )?;
        Ok(build_indices(routing, stats)?)
    }

    /// Look up one index by exact name
    pub async fn fetch_index(&self, name: &str) -> Result<IndexInfo> {
        self.fetch_indices()
            .await?
            .into_iter()
            .find(|index| index.name == name)
            .ok_or_else(|| ResolutionError::index_not_found(name).into())
    }

    /// Every shard copy in the routing table
    pub async fn fetch_shard_allocation(&self) -> Result<Vec<ShardRef>> {
        let routing: RoutingResponse = self.client.get_as(ROUTING_PATH).await?;
        Ok(shard_refs(ROUTING_PATH, &routing.routing_table)?)
    }

    pub async fn fetch_cluster_settings(&self) -> Result<ClusterSettings> {
        let response: SettingsResponse = self.client.get_as(CLUSTER_SETTINGS_PATH).await?;
        Ok(ClusterSettings {
            persistent: flatten_settings(&response.persistent),
            transient: flatten_settings(&response.transient),
        })
    }

    /// Health, roster and exclusions, fetched concurrently
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (state, nodes, settings) = tokio::try_join!(
            self.fetch_health(),
            self.fetch_nodes(),
            self.fetch_cluster_settings(),
        )?;
        Ok(Snapshot {
            state,
            nodes,
            exclusions: settings.exclusions(),
        })
    }

    pub async fn resolve_node_name_to_id(&self, name: &str) -> Result<String> {
        Ok(self.fetch_nodes().await?.resolve_name_to_id(name)?)
    }

    /// Whether the node is the elected master; `false` when there is none
    pub async fn is_master(&self, node_id: &str) -> Result<bool> {
        Ok(self.fetch_health().await?.is_master(node_id))
    }

    pub async fn shard_count_for_node(&self, node_id: &str) -> Result<usize> {
        let (nodes, shards) = tokio::try_join!(self.fetch_nodes(), self.fetch_shard_allocation())?;
        Ok(nodes.shard_count(&shards, node_id)?)
    }

    /// Find the copy of `index[shard_number]` currently on `node_id`.
    ///
    /// `primary` narrows the match when both a primary and a replica could be
    /// reported for the node.
    pub async fn find_shard(
        &self,
        index: &str,
        shard_number: u32,
        node_id: &str,
        primary: Option<bool>,
    ) -> Result<ShardRef> {
        self.fetch_shard_allocation()
            .await?
            .into_iter()
            .find(|s| {
                s.index_name == index
                    && s.shard_number == shard_number
                    && s.is_on(node_id)
                    && primary.map_or(true, |p| s.is_primary == p)
            })
            .ok_or_else(|| {
                ResolutionError::shard_not_found(format!(
                    "{}[{}] on node {}",
                    index, shard_number, node_id
                ))
                .into()
            })
    }

    /// Full cluster state document, unmodified
    pub async fn cluster_state_raw(&self) -> Result<Value> {
        Ok(self.client.get("/_cluster/state").await?)
    }

    pub async fn cluster_settings_raw(&self) -> Result<Value> {
        Ok(self.client.get(CLUSTER_SETTINGS_PATH).await?)
    }

    pub async fn node_stats_raw(&self, node_id: &str) -> Result<Value> {
        Ok(self
            .client
            .get(&format!("{}/{}/stats", NODES_PATH, node_id))
            .await?)
    }

    pub async fn node_settings_raw(&self, node_id: &str) -> Result<Value> {
        Ok(self
            .client
            .get(&format!("{}/{}/settings", NODES_PATH, node_id))
            .await?)
    }
}

//! Cluster state model
//!
//! Request-scoped snapshots of cluster health, node roster, index roster and
//! shard placement, normalized from the control-plane API.
//!
//! Nothing here is cached: every engine operation that needs current state
//! fetches a fresh snapshot through [`ClusterModel`], and snapshots are
//! replaced wholesale rather than mutated.

mod model;
mod roster;

pub use model::{flatten_settings, ClusterModel, ClusterSettings};
pub(crate) use model::CLUSTER_SETTINGS_PATH;
pub use roster::NodeRoster;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Cluster or index health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    /// Some primary shards are unassigned
    Red,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time cluster health summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub cluster_name: String,
    pub health: HealthStatus,
    /// Elected master; `None` after quorum loss
    pub master_node_id: Option<String>,
    pub number_of_nodes: u32,
    pub number_of_data_nodes: u32,
    pub active_shards: u32,
    pub relocating_shards: u32,
    pub initializing_shards: u32,
    pub unassigned_shards: u32,
    /// Per-index health, when the health endpoint reported it
    #[serde(default)]
    pub index_health: BTreeMap<String, HealthStatus>,
}

impl ClusterState {
    pub fn has_master(&self) -> bool {
        self.master_node_id.is_some()
    }

    /// Whether `node_id` is the elected master.
    ///
    /// A cluster without a master answers `false` for every node.
    pub fn is_master(&self, node_id: &str) -> bool {
        self.master_node_id.as_deref() == Some(node_id)
    }

    /// Names of indices currently reported red, sorted
    pub fn red_indices(&self) -> Vec<&str> {
        self.index_health
            .iter()
            .filter(|(_, health)| **health == HealthStatus::Red)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// A node in the cluster roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Stable transport-level identifier
    pub id: String,
    /// Human alias; not guaranteed unique
    pub name: String,
    pub roles: BTreeSet<String>,
    /// Transport address (`ip:port`)
    pub address: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NodeInfo {
    /// Holds shard data (`data` or any tiered `data_*` role)
    pub fn is_data(&self) -> bool {
        self.roles
            .iter()
            .any(|role| role == "data" || role.starts_with("data_"))
    }

    pub fn is_master_eligible(&self) -> bool {
        self.roles.contains("master")
    }

    /// IP part of the transport address
    pub fn address_ip(&self) -> &str {
        self.ip.as_deref().unwrap_or_else(|| {
            self.address
                .rsplit_once(':')
                .map(|(ip, _)| ip)
                .unwrap_or(&self.address)
        })
    }
}

/// Index open/closed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Open,
    Close,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Open => "open",
            IndexStatus::Close => "close",
        }
    }
}

/// Setting that blocks writes to an index
pub const WRITE_BLOCK_SETTING: &str = "index.blocks.write";

/// Setting that suspends automatic translog flushing
pub const FLUSH_DISABLE_SETTING: &str = "index.translog.disable_flush";

/// An index in the index roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Flattened settings (`index.number_of_shards` -> `"5"`)
    pub settings: BTreeMap<String, String>,
    pub status: IndexStatus,
    pub shard_count: u32,
    pub replica_count: u32,
    pub size_bytes: u64,
    /// Node holding the primary, per shard number; `None` when unassigned
    pub primary_locations: Vec<Option<String>>,
}

impl IndexInfo {
    pub fn is_open(&self) -> bool {
        self.status == IndexStatus::Open
    }

    fn setting_is_true(&self, key: &str) -> bool {
        self.settings.get(key).is_some_and(|v| v == "true")
    }

    pub fn write_blocked(&self) -> bool {
        self.setting_is_true(WRITE_BLOCK_SETTING)
    }

    pub fn flush_disabled(&self) -> bool {
        self.setting_is_true(FLUSH_DISABLE_SETTING)
    }
}

/// Routing state of a shard copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardState {
    Unassigned,
    Initializing,
    Started,
    Relocating,
}

/// A single shard copy; the unit of relocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRef {
    pub index_name: String,
    pub shard_number: u32,
    pub is_primary: bool,
    /// `None` when unassigned
    pub current_node_id: Option<String>,
    pub state: ShardState,
    /// Destination of an in-flight relocation
    #[serde(default)]
    pub relocating_node_id: Option<String>,
}

impl ShardRef {
    /// Same index, shard number and primary/replica role
    pub fn same_copy_slot(&self, other: &ShardRef) -> bool {
        self.index_name == other.index_name
            && self.shard_number == other.shard_number
            && self.is_primary == other.is_primary
    }

    pub fn is_on(&self, node_id: &str) -> bool {
        self.current_node_id.as_deref() == Some(node_id)
    }
}

impl fmt::Display for ShardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]{}",
            self.index_name,
            self.shard_number,
            if self.is_primary { "p" } else { "r" }
        )
    }
}

/// Nodes excluded from allocation via cluster settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationExclusions {
    pub ids: BTreeSet<String>,
    pub names: BTreeSet<String>,
    pub hosts: BTreeSet<String>,
    pub ips: BTreeSet<String>,
}

impl AllocationExclusions {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty() && self.hosts.is_empty() && self.ips.is_empty()
    }

    /// Which exclusion rule (if any) matches the node
    pub fn matching_rule(&self, node: &NodeInfo) -> Option<String> {
        let check = |kind: &str, patterns: &BTreeSet<String>, value: Option<&str>| {
            let value = value?;
            patterns
                .iter()
                .find(|p| wildcard_match(p, value))
                .map(|p| format!("_{}={}", kind, p))
        };

        check("id", &self.ids, Some(&node.id))
            .or_else(|| check("name", &self.names, Some(&node.name)))
            .or_else(|| check("host", &self.hosts, node.host.as_deref()))
            .or_else(|| check("ip", &self.ips, Some(node.address_ip())))
    }
}

/// Match with `*` wildcards, as allocation filters do
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    let mut rest = match value
        .strip_prefix(first)
        .and_then(|rest| rest.strip_suffix(last))
    {
        Some(rest) => rest,
        None => return false,
    };
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

/// Everything the safety gate looks at, fetched together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: ClusterState,
    pub nodes: NodeRoster,
    pub exclusions: AllocationExclusions,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, name: &str, roles: &[&str]) -> NodeInfo {
        NodeInfo {
            id: id.to_string(),
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            address: "10.0.0.5:9300".to_string(),
            host: Some("es-data-5".to_string()),
            ip: None,
            version: None,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_is_master_without_master() {
        let state = ClusterState {
            cluster_name: "prod".to_string(),
            health: HealthStatus::Green,
            master_node_id: None,
            number_of_nodes: 3,
            number_of_data_nodes: 3,
            active_shards: 10,
            relocating_shards: 0,
            initializing_shards: 0,
            unassigned_shards: 0,
            index_health: BTreeMap::new(),
        };
        assert!(!state.is_master("node-1"));
        assert!(!state.is_master(""));
    }

    #[test]
    fn test_data_roles() {
        assert!(node("a", "a", &["data"]).is_data());
        assert!(node("a", "a", &["data_hot", "ingest"]).is_data());
        assert!(!node("a", "a", &["master", "ingest"]).is_data());
        assert!(node("a", "a", &["master"]).is_master_eligible());
    }

    #[test]
    fn test_address_ip() {
        assert_eq!(node("a", "a", &[]).address_ip(), "10.0.0.5");
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("es-data-5", "es-data-5"));
        assert!(wildcard_match("es-data-*", "es-data-5"));
        assert!(wildcard_match("*-5", "es-data-5"));
        assert!(wildcard_match("es-*-5", "es-data-5"));
        assert!(wildcard_match("*", "anything"));
        assert!(!wildcard_match("es-data-*", "es-master-1"));
        assert!(!wildcard_match("es-data-5", "es-data-50"));
        assert!(!wildcard_match("ab*ba", "aba"));
        assert!(!wildcard_match("c*x", "café"));
        assert!(wildcard_match("caf*", "café"));
        assert!(wildcard_match("*é", "café"));
        assert!(wildcard_match("ü*-*ß", "über-groß"));
    }

    #[test]
    fn test_exclusion_matching() {
        let n = node("abc123", "es-data-5", &["data"]);

        let mut exclusions = AllocationExclusions::default();
        assert!(exclusions.matching_rule(&n).is_none());

        exclusions.ips.insert("10.0.0.*".to_string());
        assert_eq!(exclusions.matching_rule(&n).as_deref(), Some("_ip=10.0.0.*"));

        let mut by_name = AllocationExclusions::default();
        by_name.names.insert("es-data-5".to_string());
        assert_eq!(
            by_name.matching_rule(&n).as_deref(),
            Some("_name=es-data-5")
        );
    }

    #[test]
    fn test_shard_display() {
        let shard = ShardRef {
            index_name: "logs".to_string(),
            shard_number: 3,
            is_primary: true,
            current_node_id: Some("n1".to_string()),
            state: ShardState::Started,
            relocating_node_id: None,
        };
        assert_eq!(shard.to_string(), "logs[3]p");
        assert!(shard.is_on("n1"));
    }
}

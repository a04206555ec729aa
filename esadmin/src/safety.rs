//! Safety gate for mutating operations
//!
//! Pure decision functions over a freshly fetched [`Snapshot`]. Rules are
//! evaluated in order and the first denial wins:
//!
//! 1. Placement mutations (allocation toggle, shard move, rebalance limit)
//!    need an elected master.
//! 2. A shard move must target a current data node that is not excluded
//!    from allocation.
//! 3. Index deletion is refused while indices other than the target are red;
//!    nuking all indices is refused while any index is red.
//!
//! Everything else is allowed. Controllers consult the gate before issuing
//! any request and make no network call on a denial.

use crate::state::{ClusterState, HealthStatus, Snapshot};
use crate::types::MutationRequest;

/// Gate decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(String),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Allow => None,
            Verdict::Deny(reason) => Some(reason),
        }
    }
}

/// Decide whether `request` may be issued against the cluster in `snapshot`
pub fn evaluate(request: &MutationRequest, snapshot: &Snapshot) -> Verdict {
    let state = &snapshot.state;

    if request.touches_placement() && !state.has_master() {
        return Verdict::Deny(format!(
            "cluster '{}' has no elected master; refusing {}",
            state.cluster_name,
            request.name()
        ));
    }

    match request {
        MutationRequest::ShardMove {
            shard,
            target_node_id,
        } => {
            let Some(target) = snapshot.nodes.get(target_node_id) else {
                return Verdict::Deny(format!(
                    "target node {} is not in the cluster; refusing to move {}",
                    target_node_id, shard
                ));
            };
            if !target.is_data() {
                return Verdict::Deny(format!(
                    "target node {} ({}) is not a data node; refusing to move {}",
                    target.name, target.id, shard
                ));
            }
            if let Some(rule) = snapshot.exclusions.matching_rule(target) {
                return Verdict::Deny(format!(
                    "target node {} ({}) is excluded from allocation ({}); refusing to move {}",
                    target.name, target.id, rule, shard
                ));
            }
            Verdict::Allow
        }
        MutationRequest::IndexDelete { index } => evaluate_delete(index, state),
        MutationRequest::NukeAllIndices => {
            let red = state.red_indices();
            if !red.is_empty() {
                return Verdict::Deny(format!(
                    "cluster is red, indices with unassigned primaries: {}; refusing to delete all indices",
                    red.join(", ")
                ));
            }
            if state.health == HealthStatus::Red {
                return Verdict::Deny(
                    "cluster is red and per-index health is unavailable; refusing to delete all indices"
                        .to_string(),
                );
            }
            Verdict::Allow
        }
        _ => Verdict::Allow,
    }
}

/// Deleting `target` is fine unless some *other* index is red
fn evaluate_delete(target: &str, state: &ClusterState) -> Verdict {
    let others: Vec<&str> = state
        .red_indices()
        .into_iter()
        .filter(|name| *name != target)
        .collect();

    if !others.is_empty() {
        return Verdict::Deny(format!(
            "cluster is red, indices with unassigned primaries: {}; refusing to delete {} during triage",
            others.join(", "),
            target
        ));
    }

    if state.health == HealthStatus::Red && state.index_health.is_empty() {
        return Verdict::Deny(format!(
            "cluster is red and per-index health is unavailable; refusing to delete {}",
            target
        ));
    }

    Verdict::Allow
}

/// Per-index check used when deleting every index: any red index blocks
pub fn evaluate_nuke_index(index: &str, state: &ClusterState) -> Verdict {
    match state.index_health.get(index) {
        Some(HealthStatus::Red) => Verdict::Deny(format!("index {} is red", index)),
        Some(_) => Verdict::Allow,
        None if state.health == HealthStatus::Red => Verdict::Deny(format!(
            "cluster is red and health of index {} is unknown",
            index
        )),
        None => Verdict::Allow,
    }
}

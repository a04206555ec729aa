//! Node roster lookups

use super::{NodeInfo, ShardRef};
use crate::error::ResolutionError;

/// The set of nodes currently in the cluster, ordered by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRoster {
    nodes: Vec<NodeInfo>,
}

impl NodeRoster {
    pub fn new(mut nodes: Vec<NodeInfo>) -> Self {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Self { nodes }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn data_nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.iter().filter(|n| n.is_data())
    }

    /// Display name for a node id, falling back to the id itself
    pub fn display_name<'a>(&'a self, node_id: &'a str) -> &'a str {
        self.get(node_id).map(|n| n.name.as_str()).unwrap_or(node_id)
    }

    /// Resolve a node name to its id.
    ///
    /// Names are aliases and may collide; a name shared by several nodes is
    /// reported as ambiguous rather than resolved to the first match.
    pub fn resolve_name_to_id(&self, name: &str) -> Result<String, ResolutionError> {
        let matches: Vec<&NodeInfo> = self.nodes.iter().filter(|n| n.name == name).collect();
        match matches.as_slice() {
            [] => Err(ResolutionError::node_not_found(name)),
            [node] => Ok(node.id.clone()),
            many => Err(ResolutionError::Ambiguous {
                kind: "Node",
                name: name.to_string(),
                candidates: many.iter().map(|n| n.id.clone()).collect(),
            }),
        }
    }

    /// Resolve an operator-supplied node reference: exact id first, then name
    pub fn resolve(&self, id_or_name: &str) -> Result<&NodeInfo, ResolutionError> {
        if let Some(node) = self.get(id_or_name) {
            return Ok(node);
        }
        let id = self.resolve_name_to_id(id_or_name)?;
        self.get(&id)
            .ok_or_else(|| ResolutionError::node_not_found(id_or_name))
    }

    /// Number of shard copies currently placed on a node.
    ///
    /// Zero is a valid answer; an unknown node is `NotFound`.
    pub fn shard_count(
        &self,
        shards: &[ShardRef],
        node_id: &str,
    ) -> Result<usize, ResolutionError> {
        if self.get(node_id).is_none() {
            return Err(ResolutionError::node_not_found(node_id));
        }
        Ok(shards.iter().filter(|s| s.is_on(node_id)).count())
    }
}

impl FromIterator<NodeInfo> for NodeRoster {
    fn from_iter<I: IntoIterator<Item = NodeInfo>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

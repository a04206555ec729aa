//! Stateful fake control plane for end-to-end engine tests.
//!
//! A real axum server on a random port that answers the subset of the
//! cluster API the engine uses, keeps enough state for reads to reflect
//! earlier writes, and supports fault injection.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use esadmin::{AllocationController, Config, ConnectionConfig, Engine, OperationsConfig};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
    pub ip: String,
}

#[derive(Debug, Clone)]
pub struct FakeIndex {
    pub settings: BTreeMap<String, String>,
    pub health: &'static str,
    pub open: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeShard {
    pub index: String,
    pub number: u32,
    pub primary: bool,
    pub node: Option<String>,
    pub state: &'static str,
    pub relocating_node: Option<String>,
}

/// What happens after a reroute is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveBehaviour {
    /// Shard is started on the target on the Nth routing poll
    LandAfter(u32),
    /// Relocation never finishes
    Never,
    /// All copies disappear on the next routing poll
    Vanish,
}

#[derive(Debug, Clone)]
struct PendingMove {
    index: String,
    number: u32,
    primary: bool,
    from: String,
    to: String,
    polls: u32,
}

#[derive(Debug)]
pub struct FakeCluster {
    pub cluster_name: String,
    pub master: Option<String>,
    pub nodes: Vec<FakeNode>,
    pub indices: BTreeMap<String, FakeIndex>,
    pub shards: Vec<FakeShard>,
    pub persistent: BTreeMap<String, Value>,
    pub transient: BTreeMap<String, Value>,
    /// Answer this many upcoming GETs with 503
    pub fail_next_gets: u32,
    /// Answer this many upcoming non-GET requests with 503
    pub fail_next_mutations: u32,
    /// Index settings updates on these indices answer 500
    pub failing_settings: BTreeSet<String>,
    /// Deletes of these indices answer 500
    pub failing_deletes: BTreeSet<String>,
    /// GETs of these paths answer 200 with a non-JSON body
    pub garbage_paths: BTreeSet<String>,
    pub move_behaviour: MoveBehaviour,
    pending_move: Option<PendingMove>,
    /// Routing-table polls answered while a relocation was in flight
    pub move_polls: u32,
    /// `(method, path)` of every request received
    pub requests: Vec<(String, String)>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    /// Green cluster: master-only `m1`, data nodes `d1`..`d3`, no indices
    pub fn new() -> Self {
        let node = |id: &str, roles: &[&str], ip: &str| FakeNode {
            id: id.to_string(),
            name: format!("es-{}", id),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            ip: ip.to_string(),
        };

        Self {
            cluster_name: "fake".to_string(),
            master: Some("m1".to_string()),
            nodes: vec![
                node("m1", &["master"], "10.0.0.1"),
                node("d1", &["data", "ingest"], "10.0.1.1"),
                node("d2", &["data"], "10.0.1.2"),
                node("d3", &["data_hot"], "10.0.1.3"),
            ],
            indices: BTreeMap::new(),
            shards: Vec::new(),
            persistent: BTreeMap::new(),
            transient: BTreeMap::new(),
            fail_next_gets: 0,
            fail_next_mutations: 0,
            failing_settings: BTreeSet::new(),
            failing_deletes: BTreeSet::new(),
            garbage_paths: BTreeSet::new(),
            move_behaviour: MoveBehaviour::LandAfter(1),
            pending_move: None,
            move_polls: 0,
            requests: Vec::new(),
        }
    }

    /// Add an open index with one primary per listed node and no replicas
    pub fn with_index(mut self, name: &str, primaries: &[&str], health: &'static str) -> Self {
        let mut settings = BTreeMap::new();
        settings.insert("index.number_of_shards".to_string(), primaries.len().to_string());
        settings.insert("index.number_of_replicas".to_string(), "0".to_string());

        self.indices.insert(
            name.to_string(),
            FakeIndex {
                settings,
                health,
                open: true,
                size_bytes: 1024 * (primaries.len() as u64),
            },
        );
        for (number, node) in primaries.iter().enumerate() {
            let assigned = health != "red" || number > 0;
            self.shards.push(FakeShard {
                index: name.to_string(),
                number: number as u32,
                primary: true,
                node: assigned.then(|| node.to_string()),
                state: if assigned { "STARTED" } else { "UNASSIGNED" },
                relocating_node: None,
            });
        }
        self
    }

    pub fn with_closed_index(mut self, name: &str) -> Self {
        let mut settings = BTreeMap::new();
        settings.insert("index.number_of_shards".to_string(), "1".to_string());
        self.indices.insert(
            name.to_string(),
            FakeIndex {
                settings,
                health: "green",
                open: false,
                size_bytes: 0,
            },
        );
        self
    }

    pub fn without_master(mut self) -> Self {
        self.master = None;
        self
    }

    pub fn with_move_behaviour(mut self, behaviour: MoveBehaviour) -> Self {
        self.move_behaviour = behaviour;
        self
    }

    fn health(&self) -> &'static str {
        let open = self.indices.values().filter(|i| i.open);
        let mut status = "green";
        for index in open {
            match index.health {
                "red" => return "red",
                "yellow" => status = "yellow",
                _ => {}
            }
        }
        status
    }

    fn count_shards(&self, state: &str) -> usize {
        self.shards.iter().filter(|s| s.state == state).count()
    }

    fn health_body(&self) -> Value {
        let indices: Map<String, Value> = self
            .indices
            .iter()
            .filter(|(_, index)| index.open)
            .map(|(name, index)| (name.clone(), json!({"status": index.health})))
            .collect();

        json!({
            "cluster_name": self.cluster_name,
            "status": self.health(),
            "number_of_nodes": self.nodes.len(),
            "number_of_data_nodes": self
                .nodes
                .iter()
                .filter(|n| n.roles.iter().any(|r| r.starts_with("data")))
                .count(),
            "active_shards": self.count_shards("STARTED") + self.count_shards("RELOCATING"),
            "relocating_shards": self.count_shards("RELOCATING"),
            "initializing_shards": self.count_shards("INITIALIZING"),
            "unassigned_shards": self.count_shards("UNASSIGNED"),
            "indices": indices,
        })
    }

    fn node_body(node: &FakeNode) -> Value {
        json!({
            "name": node.name,
            "transport_address": format!("{}:9300", node.ip),
            "host": node.ip,
            "ip": node.ip,
            "version": "7.17.0",
            "roles": node.roles,
            "attributes": {},
        })
    }

    fn nodes_body<'a>(&self, nodes: impl Iterator<Item = &'a FakeNode>) -> Value {
        let nodes: Map<String, Value> = nodes
            .map(|node| (node.id.clone(), Self::node_body(node)))
            .collect();
        json!({"cluster_name": self.cluster_name, "nodes": nodes})
    }

    fn routing_body(&self) -> Value {
        let mut indices = Map::new();
        for name in self.indices.keys() {
            let mut shards: BTreeMap<String, Vec<Value>> = BTreeMap::new();
            for shard in self.shards.iter().filter(|s| &s.index == name) {
                shards.entry(shard.number.to_string()).or_default().push(json!({
                    "index": shard.index,
                    "shard": shard.number,
                    "primary": shard.primary,
                    "node": shard.node,
                    "state": shard.state,
                    "relocating_node": shard.relocating_node,
                }));
            }
            indices.insert(name.clone(), json!({"shards": shards}));
        }
        json!({"routing_table": {"indices": indices}})
    }

    fn metadata_body(&self) -> Value {
        let indices: Map<String, Value> = self
            .indices
            .iter()
            .map(|(name, index)| {
                (
                    name.clone(),
                    json!({
                        "state": if index.open { "open" } else { "close" },
                        "settings": index.settings,
                    }),
                )
            })
            .collect();

        let mut body = self.routing_body();
        body["metadata"] = json!({"indices": indices});
        body["cluster_name"] = json!(self.cluster_name);
        body
    }

    fn store_body(&self) -> Value {
        let indices: Map<String, Value> = self
            .indices
            .iter()
            .filter(|(_, index)| index.open)
            .map(|(name, index)| {
                (
                    name.clone(),
                    json!({"total": {"store": {"size_in_bytes": index.size_bytes}}}),
                )
            })
            .collect();
        json!({"indices": indices})
    }

    fn settings_body(&self) -> Value {
        json!({"persistent": self.persistent, "transient": self.transient})
    }

    /// Advance an in-flight relocation by one routing poll
    fn advance_move(&mut self) {
        let Some(mut pending) = self.pending_move.take() else {
            return;
        };
        pending.polls += 1;

        let slot = |s: &FakeShard| {
            s.index == pending.index && s.number == pending.number && s.primary == pending.primary
        };

        match self.move_behaviour {
            MoveBehaviour::Vanish => {
                let (index, number) = (pending.index.clone(), pending.number);
                self.shards
                    .retain(|s| !(s.index == index && s.number == number));
            }
            MoveBehaviour::LandAfter(n) if pending.polls >= n => {
                let from = pending.from.clone();
                self.shards
                    .retain(|s| !(slot(s) && s.node.as_deref() == Some(from.as_str())));
                for shard in self.shards.iter_mut().filter(|s| slot(s)) {
                    if shard.node.as_deref() == Some(pending.to.as_str()) {
                        shard.state = "STARTED";
                        shard.relocating_node = None;
                    }
                }
            }
            _ => self.pending_move = Some(pending),
        }
    }

    fn reroute(&mut self, body: &Value) -> Response {
        let command = &body["commands"][0]["move"];
        let (Some(index), Some(number), Some(from), Some(to)) = (
            command["index"].as_str(),
            command["shard"].as_u64(),
            command["from_node"].as_str(),
            command["to_node"].as_str(),
        ) else {
            return error(StatusCode::BAD_REQUEST, "malformed reroute");
        };
        let number = number as u32;

        let Some(source) = self
            .shards
            .iter_mut()
            .find(|s| s.index == index && s.number == number && s.node.as_deref() == Some(from))
        else {
            return error(StatusCode::BAD_REQUEST, "shard not on from_node");
        };

        source.state = "RELOCATING";
        source.relocating_node = Some(to.to_string());
        let primary = source.primary;

        self.shards.push(FakeShard {
            index: index.to_string(),
            number,
            primary,
            node: Some(to.to_string()),
            state: "INITIALIZING",
            relocating_node: Some(from.to_string()),
        });
        self.pending_move = Some(PendingMove {
            index: index.to_string(),
            number,
            primary,
            from: from.to_string(),
            to: to.to_string(),
            polls: 0,
        });

        (StatusCode::OK, Json(json!({"acknowledged": true}))).into_response()
    }

    fn update_cluster_settings(&mut self, body: &Value) {
        for (scope, target) in [
            ("persistent", &mut self.persistent),
            ("transient", &mut self.transient),
        ] {
            if let Some(values) = body[scope].as_object() {
                for (key, value) in values {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Mutating requests received, in order
    pub fn mutations(&self) -> Vec<(String, String)> {
        self.requests
            .iter()
            .filter(|(method, _)| method != "GET")
            .cloned()
            .collect()
    }

    /// `local` mirrors `?local=true`: answered from the receiving node's
    /// own view instead of waiting for an elected master
    fn handle(&mut self, method: &Method, path: &str, local: bool, body: &Value) -> Response {
        self.requests.push((method.to_string(), path.to_string()));

        if *method == Method::GET {
            if self.fail_next_gets > 0 {
                self.fail_next_gets -= 1;
                return error(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
            }
            if self.garbage_paths.contains(path) {
                return (StatusCode::OK, "<html>gateway says hi").into_response();
            }
        } else if self.fail_next_mutations > 0 {
            self.fail_next_mutations -= 1;
            return error(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let ok = |value: Value| (StatusCode::OK, Json(value)).into_response();

        let master_read = matches!(
            segments.as_slice(),
            ["_cluster", "health"] | ["_cluster", "state", "master_node"]
        );
        if master_read && self.master.is_none() && !local {
            return error(StatusCode::SERVICE_UNAVAILABLE, "master_not_discovered_exception");
        }

        match (method.as_str(), segments.as_slice()) {
            ("GET", ["_cluster", "health"]) => ok(self.health_body()),
            ("GET", ["_cluster", "state", "master_node"]) => ok(json!({
                "cluster_name": self.cluster_name,
                "master_node": self.master,
            })),
            ("GET", ["_cluster", "state", "routing_table"]) => {
                if self.pending_move.is_some() {
                    self.move_polls += 1;
                }
                self.advance_move();
                ok(self.routing_body())
            }
            ("GET", ["_cluster", "state", "metadata,routing_table"]) => {
                ok(self.metadata_body())
            }
            ("GET", ["_cluster", "state"]) => {
                let mut body = self.metadata_body();
                body["master_node"] = json!(self.master);
                ok(body)
            }
            ("GET", ["_cluster", "settings"]) => ok(self.settings_body()),
            ("PUT", ["_cluster", "settings"]) => {
                self.update_cluster_settings(body);
                ok(json!({"acknowledged": true}))
            }
            ("POST", ["_cluster", "reroute"]) => self.reroute(body),
            ("GET", ["_stats", "store"]) => ok(self.store_body()),
            ("GET", ["_nodes"]) => ok(self.nodes_body(self.nodes.iter())),
            ("GET", ["_nodes", "_local"]) => ok(self.nodes_body(self.nodes.iter().take(1))),
            ("GET", ["_nodes", id, section]) => {
                let mut nodes = Map::new();
                if let Some(node) = self.nodes.iter().find(|n| n.id == *id) {
                    nodes.insert(node.id.clone(), json!({"name": node.name, "section": section}));
                }
                ok(json!({"nodes": nodes}))
            }
            ("PUT", [index, "_settings"]) => {
                if self.failing_settings.contains(*index) {
                    return error(StatusCode::INTERNAL_SERVER_ERROR, "settings update failed");
                }
                let Some(entry) = self.indices.get_mut(*index) else {
                    return error(StatusCode::NOT_FOUND, "index_not_found_exception");
                };
                if let Some(values) = body.as_object() {
                    for (key, value) in values {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        entry.settings.insert(key.clone(), value);
                    }
                }
                ok(json!({"acknowledged": true}))
            }
            ("POST", [index, "_flush"]) => {
                if self.indices.contains_key(*index) {
                    ok(json!({"_shards": {"total": 1, "successful": 1, "failed": 0}}))
                } else {
                    error(StatusCode::NOT_FOUND, "index_not_found_exception")
                }
            }
            ("DELETE", [index]) => {
                if self.failing_deletes.contains(*index) {
                    return error(StatusCode::INTERNAL_SERVER_ERROR, "delete failed");
                }
                if self.indices.remove(*index).is_none() {
                    return error(StatusCode::NOT_FOUND, "index_not_found_exception");
                }
                let name = index.to_string();
                self.shards.retain(|s| s.index != name);
                ok(json!({"acknowledged": true}))
            }
            _ => error(StatusCode::NOT_FOUND, "no handler found"),
        }
    }
}

fn error(status: StatusCode, reason: &str) -> Response {
    (
        status,
        Json(json!({"error": {"type": reason, "reason": reason}, "status": status.as_u16()})),
    )
        .into_response()
}

pub type Shared = Arc<Mutex<FakeCluster>>;

async fn dispatch(State(state): State<Shared>, method: Method, uri: Uri, body: Bytes) -> Response {
    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) => return error(StatusCode::BAD_REQUEST, "request body is not JSON"),
        }
    };
    let local = uri
        .query()
        .is_some_and(|query| query.split('&').any(|pair| pair == "local=true"));
    state.lock().handle(&method, uri.path(), local, &body)
}

/// Running fake cluster
pub struct FakeServer {
    pub base_url: String,
    pub state: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeServer {
    /// Start a real HTTP server on a random port
    pub async fn start(cluster: FakeCluster) -> Self {
        let state: Shared = Arc::new(Mutex::new(cluster));
        let router = Router::new().fallback(dispatch).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    /// Fast settings: short backoff, 50ms polls, 5s move budget
    pub fn config(&self) -> Config {
        Config {
            connection: ConnectionConfig {
                timeout_seconds: 5,
                retries: 2,
                retry_backoff_ms: 10,
                ..ConnectionConfig::for_host(self.base_url.clone())
            },
            operations: OperationsConfig {
                poll_interval_ms: 50,
                move_timeout_seconds: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine_with(self.config())
    }

    pub fn engine_with(&self, config: Config) -> Engine {
        Engine::new(&config).unwrap()
    }

    /// Controller for driving moves with sub-second budgets
    pub fn allocation(&self) -> AllocationController {
        let config = self.config();
        let model = self.engine_with(config.clone()).model().clone();
        AllocationController::new(model, config.operations)
    }

    pub fn mutations(&self) -> Vec<(String, String)> {
        self.state.lock().mutations()
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.state.lock().requests.clone()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

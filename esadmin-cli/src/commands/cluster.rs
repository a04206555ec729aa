//! Cluster-wide commands

use super::Output;
use anyhow::Result;
use esadmin::{Engine, MutationRequest};
use serde_json::json;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Show cluster health and the elected master
pub async fn health(engine: &Engine, out: Output) -> Result<ExitCode> {
    let (state, nodes) = tokio::try_join!(engine.fetch_health(), engine.fetch_nodes())?;

    if out.is_json() {
        out.json(&state)?;
        return Ok(ExitCode::SUCCESS);
    }

    let master = match state.master_node_id {
        Some(ref id) => format!("{} ({})", nodes.display_name(id), id),
        None => "none".to_string(),
    };

    println!("Cluster Health");
    println!("==============");
    println!("Cluster:      {}", state.cluster_name);
    println!("Status:       {}", state.health);
    println!("Master:       {}", master);
    println!(
        "Nodes:        {} ({} data)",
        state.number_of_nodes, state.number_of_data_nodes
    );
    println!("Active:       {}", state.active_shards);
    println!("Relocating:   {}", state.relocating_shards);
    println!("Initializing: {}", state.initializing_shards);
    println!("Unassigned:   {}", state.unassigned_shards);

    let red = state.red_indices();
    if !red.is_empty() {
        println!();
        println!("Red indices:  {}", red.join(", "));
    }

    Ok(ExitCode::SUCCESS)
}

pub async fn settings(engine: &Engine) -> Result<ExitCode> {
    let settings = engine.cluster_settings_raw().await?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn state(engine: &Engine) -> Result<ExitCode> {
    let state = engine.cluster_state_raw().await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn set_allocation(
    engine: &Engine,
    enable: bool,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    let result = engine
        .execute(MutationRequest::AllocationToggle { enable }, cancel)
        .await;
    let action = if enable {
        "allocator-enable"
    } else {
        "allocator-disable"
    };
    out.report(action, &result)
}

pub async fn concurrent_rebalance(
    engine: &Engine,
    limit: u32,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    let result = engine
        .execute(MutationRequest::ConcurrentRebalanceLimit { limit }, cancel)
        .await;
    out.report("concurrent-rebalance", &result)
}

/// Exit 0 only when the node is the elected master. No master at all is
/// a plain "no".
pub async fn am_i_master(engine: &Engine, node: Option<&str>, out: Output) -> Result<ExitCode> {
    let node = match node {
        Some(id_or_name) => engine.resolve_node(id_or_name).await?,
        None => engine.fetch_local_node().await?,
    };
    let is_master = engine.is_master(&node.id).await?;

    if out.is_json() {
        out.json(&json!({
            "node_id": node.id,
            "node_name": node.name,
            "is_master": is_master,
        }))?;
    } else if is_master {
        println!("{} ({}) is the elected master", node.name, node.id);
    } else {
        println!("{} ({}) is not the elected master", node.name, node.id);
    }

    Ok(if is_master {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

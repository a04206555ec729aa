//! Per-node commands. Node arguments accept an id or a unique name.

use super::Output;
use anyhow::Result;
use esadmin::Engine;
use serde_json::json;
use std::process::ExitCode;

pub async fn info(engine: &Engine, node: &str, out: Output) -> Result<ExitCode> {
    let node = engine.resolve_node(node).await?;

    if out.is_json() {
        out.json(&node)?;
        return Ok(ExitCode::SUCCESS);
    }

    let roles: Vec<&str> = node.roles.iter().map(String::as_str).collect();
    println!("Id:       {}", node.id);
    println!("Name:     {}", node.name);
    println!("Address:  {}", node.address);
    println!("Host:     {}", node.host.as_deref().unwrap_or("-"));
    println!("Version:  {}", node.version.as_deref().unwrap_or("-"));
    println!("Roles:    {}", roles.join(", "));
    for (key, value) in &node.attributes {
        println!("  {} = {}", key, value);
    }

    Ok(ExitCode::SUCCESS)
}

pub async fn name_to_id(engine: &Engine, name: &str, out: Output) -> Result<ExitCode> {
    let id = engine.resolve_node_name_to_id(name).await?;
    if out.is_json() {
        out.json(&json!({"name": name, "id": id}))?;
    } else {
        println!("{}", id);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn settings(engine: &Engine, node: &str) -> Result<ExitCode> {
    let node = engine.resolve_node(node).await?;
    let settings = engine.node_settings_raw(&node.id).await?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn stats(engine: &Engine, node: &str) -> Result<ExitCode> {
    let node = engine.resolve_node(node).await?;
    let stats = engine.node_stats_raw(&node.id).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(ExitCode::SUCCESS)
}

pub async fn shard_count(engine: &Engine, node: &str, out: Output) -> Result<ExitCode> {
    let node = engine.resolve_node(node).await?;
    let count = engine.shard_count_for_node(&node.id).await?;
    if out.is_json() {
        out.json(&json!({"node_id": node.id, "node_name": node.name, "shards": count}))?;
    } else {
        println!("{}", count);
    }
    Ok(ExitCode::SUCCESS)
}

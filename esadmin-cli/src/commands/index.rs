//! Index commands

use super::output::format_bytes;
use super::Output;
use anyhow::{bail, Result};
use esadmin::{Engine, IndexInfo, IndexTarget, MutationRequest};
use serde_json::json;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

async fn selected(engine: &Engine, index: Option<&str>) -> Result<Vec<IndexInfo>> {
    Ok(match index {
        Some(name) => vec![engine.fetch_index(name).await?],
        None => engine.fetch_indices().await?,
    })
}

pub async fn list(engine: &Engine, out: Output) -> Result<ExitCode> {
    let names: Vec<String> = engine
        .fetch_indices()
        .await?
        .into_iter()
        .map(|index| index.name)
        .collect();

    if out.is_json() {
        out.json(&names)?;
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn size(engine: &Engine, index: Option<&str>, out: Output) -> Result<ExitCode> {
    let indices = selected(engine, index).await?;

    if out.is_json() {
        let sizes: Vec<_> = indices
            .iter()
            .map(|i| json!({"name": i.name, "size_bytes": i.size_bytes}))
            .collect();
        out.json(&sizes)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<40} {:>12}", "INDEX", "SIZE");
    println!("{}", "-".repeat(53));
    for i in &indices {
        println!("{:<40} {:>12}", i.name, format_bytes(i.size_bytes));
    }
    if indices.len() > 1 {
        let total: u64 = indices.iter().map(|i| i.size_bytes).sum();
        println!("{}", "-".repeat(53));
        println!("{:<40} {:>12}", "TOTAL", format_bytes(total));
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn status(engine: &Engine, index: Option<&str>, out: Output) -> Result<ExitCode> {
    let (indices, health) = tokio::try_join!(selected(engine, index), async {
        Ok::<_, anyhow::Error>(engine.fetch_health().await?)
    })?;

    if out.is_json() {
        let rows: Vec<_> = indices
            .iter()
            .map(|i| {
                json!({
                    "name": i.name,
                    "status": i.status.as_str(),
                    "health": health.index_health.get(&i.name),
                    "shards": i.shard_count,
                    "replicas": i.replica_count,
                    "write_blocked": i.write_blocked(),
                    "flush_disabled": i.flush_disabled(),
                    "size_bytes": i.size_bytes,
                })
            })
            .collect();
        out.json(&rows)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<32} {:<6} {:<7} {:>6} {:>8} {:<8} {:<9} {:>10}",
        "INDEX", "STATE", "HEALTH", "SHARDS", "REPLICAS", "WRITES", "AUTOFLUSH", "SIZE"
    );
    println!("{}", "-".repeat(93));
    for i in &indices {
        println!(
            "{:<32} {:<6} {:<7} {:>6} {:>8} {:<8} {:<9} {:>10}",
            i.name,
            i.status.as_str(),
            health
                .index_health
                .get(&i.name)
                .map(|h| h.as_str())
                .unwrap_or("-"),
            i.shard_count,
            i.replica_count,
            if i.write_blocked() { "blocked" } else { "open" },
            if i.flush_disabled() { "off" } else { "on" },
            format_bytes(i.size_bytes),
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn settings(engine: &Engine, index: &str, out: Output) -> Result<ExitCode> {
    let index = engine.fetch_index(index).await?;
    if out.is_json() {
        out.json(&index.settings)?;
    } else {
        for (key, value) in &index.settings {
            println!("{} = {}", key, value);
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Node holding each primary
pub async fn locations(engine: &Engine, index: &str, out: Output) -> Result<ExitCode> {
    let (index, nodes) = tokio::try_join!(engine.fetch_index(index), engine.fetch_nodes())?;

    if out.is_json() {
        let rows: Vec<_> = index
            .primary_locations
            .iter()
            .enumerate()
            .map(|(shard, node)| {
                json!({
                    "shard": shard,
                    "node_id": node,
                    "node_name": node.as_deref().map(|id| nodes.display_name(id)),
                })
            })
            .collect();
        out.json(&rows)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<6} {:<24} {}", "SHARD", "NODE", "ID");
    println!("{}", "-".repeat(56));
    for (shard, node) in index.primary_locations.iter().enumerate() {
        match node {
            Some(id) => println!("{:<6} {:<24} {}", shard, nodes.display_name(id), id),
            None => println!("{:<6} {:<24} -", shard, "UNASSIGNED"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn set_write(
    engine: &Engine,
    index: &str,
    enable: bool,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    let request = MutationRequest::WriteToggle {
        target: IndexTarget::parse(index),
        enable,
    };
    let result = engine.execute(request, cancel).await;
    out.report(if enable { "write-enable" } else { "write-disable" }, &result)
}

pub async fn set_auto_flush(
    engine: &Engine,
    index: &str,
    enable: bool,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    let request = MutationRequest::AutoFlushToggle {
        target: IndexTarget::parse(index),
        enable,
    };
    let result = engine.execute(request, cancel).await;
    out.report(
        if enable {
            "autoflush-enable"
        } else {
            "autoflush-disable"
        },
        &result,
    )
}

pub async fn flush(
    engine: &Engine,
    index: &str,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    let request = MutationRequest::Flush {
        target: IndexTarget::parse(index),
    };
    let result = engine.execute(request, cancel).await;
    out.report("flush", &result)
}

pub async fn delete(
    engine: &Engine,
    index: &str,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    if matches!(IndexTarget::parse(index), IndexTarget::All) {
        bail!("index-delete takes a single index name; use nuke-all-indices to delete everything");
    }
    let request = MutationRequest::IndexDelete {
        index: index.to_string(),
    };
    let result = engine.execute(request, cancel).await;
    out.report("index-delete", &result)
}

pub async fn nuke(
    engine: &Engine,
    confirmed: bool,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    if !confirmed {
        bail!("refusing to delete every index without --yes-i-really-mean-it");
    }
    let result = engine.execute(MutationRequest::NukeAllIndices, cancel).await;
    out.report("nuke-all-indices", &result)
}

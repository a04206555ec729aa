//! Shard relocation

use super::Output;
use anyhow::{Context, Result};
use esadmin::{Engine, MutationRequest};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct MoveArgs {
    pub index: String,
    pub shard: u32,
    pub from: String,
    pub to: String,
    pub replica: bool,
}

/// Move a shard copy and wait until it is started on the target, the move
/// budget runs out, or Ctrl-C stops the wait
pub async fn move_shard(
    engine: &Engine,
    args: MoveArgs,
    cancel: &CancellationToken,
    out: Output,
) -> Result<ExitCode> {
    let roster = engine.fetch_nodes().await?;
    let from = roster
        .resolve(&args.from)
        .with_context(|| format!("resolving source node {}", args.from))?;
    let to = roster
        .resolve(&args.to)
        .with_context(|| format!("resolving target node {}", args.to))?;

    let shard = engine
        .find_shard(&args.index, args.shard, &from.id, Some(!args.replica))
        .await?;

    if !out.is_json() {
        eprintln!(
            "Moving {} from {} to {} (waiting up to {}s)",
            shard,
            from.name,
            to.name,
            engine.options().move_timeout_seconds
        );
    }

    let result = engine
        .execute(
            MutationRequest::ShardMove {
                shard,
                target_node_id: to.id.clone(),
            },
            cancel,
        )
        .await;
    out.report("move-shard", &result)
}

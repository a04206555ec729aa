//! Polling shard placement while a relocation is in flight

use crate::error::Result;
use crate::state::{ClusterModel, ShardRef, ShardState};
use futures::Stream;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Lazy sequence of routing-table snapshots, one per `period`.
///
/// The first snapshot is fetched immediately. The stream never ends on its
/// own; the consumer bounds it with a deadline and a cancellation token.
/// Read failures are yielded rather than ending the stream.
pub fn watch_shard(
    model: ClusterModel,
    period: Duration,
) -> impl Stream<Item = Result<Vec<ShardRef>>> {
    async_stream::stream! {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            yield model.fetch_shard_allocation().await;
        }
    }
}

/// Where a moving shard copy stands in one routing snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveProgress {
    /// A copy in the same slot is started on the target node
    Landed(ShardRef),
    /// Still relocating; carries the copy we are tracking, if seen
    InFlight(Option<ShardRef>),
    /// The index no longer has this shard number at all
    Vanished,
}

pub fn classify_move(moving: &ShardRef, target_node_id: &str, shards: &[ShardRef]) -> MoveProgress {
    let copies: Vec<&ShardRef> = shards
        .iter()
        .filter(|s| s.index_name == moving.index_name && s.shard_number == moving.shard_number)
        .collect();

    if copies.is_empty() {
        return MoveProgress::Vanished;
    }

    let slot: Vec<&ShardRef> = copies
        .into_iter()
        .filter(|s| s.same_copy_slot(moving))
        .collect();

    if let Some(landed) = slot
        .iter()
        .find(|s| s.is_on(target_node_id) && s.state == ShardState::Started)
    {
        return MoveProgress::Landed((*landed).clone());
    }

    // Prefer the copy heading to the target, then the one still on the source
    let tracked = slot
        .iter()
        .find(|s| s.is_on(target_node_id))
        .or_else(|| {
            slot.iter()
                .find(|s| s.relocating_node_id.as_deref() == Some(target_node_id))
        })
        .or_else(|| {
            moving
                .current_node_id
                .as_deref()
                .and_then(|source| slot.iter().find(|s| s.is_on(source)))
        })
        .map(|s| (*s).clone());

    MoveProgress::InFlight(tracked)
}

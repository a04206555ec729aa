pub mod cluster;
pub mod index;
pub mod node;
pub mod shard;

mod output;

pub use output::Output;

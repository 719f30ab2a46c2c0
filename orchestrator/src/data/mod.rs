mod normalizer;
mod npz;
mod shard;
mod store;

pub use normalizer::{DisparityRange, RangeScan, compute_range};
pub use npz::{Component, NpzShardStore};
pub use shard::{NormalizedShard, ResidentShard, Shard, ShardId};
pub use store::ShardStore;

use ndarray::Array4;

use super::{Shard, ShardId};
use crate::Result;

/// The I/O boundary between the orchestrator and wherever the dataset lives.
///
/// A store is bound to a single dataset, training shards are addressed by their 1-based index
/// and the test split by `ShardId::Test`.
pub trait ShardStore {
    /// The name of the dataset this store serves, used as error context.
    fn dataset(&self) -> &str;

    /// Loads the left images, right images and raw disparity of a shard.
    ///
    /// # Errors
    /// `MissingShard` if the store has nothing at `id`, `ShapeMismatch` or `EmptySplit` if the
    /// three tensors aren't aligned.
    fn load_shard(&mut self, id: ShardId) -> Result<Shard>;

    /// Loads only the raw `[N,H,W,1]` disparity of a shard.
    ///
    /// Used by the range pre-pass, which has no use for the images.
    fn load_disparity(&mut self, id: ShardId) -> Result<Array4<f32>>;
}

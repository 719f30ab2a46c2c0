use std::num::NonZeroUsize;

use log::{debug, info};
use ndarray::{Array4, ArrayView4};
use serde::Serialize;

use super::{ShardId, ShardStore};
use crate::{OrchestratorError, Result};

/// The global disparity range of a dataset, shared by every split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisparityRange {
    dmax: f32,
    dmin: f32,
}

impl DisparityRange {
    pub fn new(dmax: f32, dmin: f32) -> Self {
        Self { dmax, dmin }
    }

    /// The scale factor between normalized and pixel disparity.
    pub fn dmax(&self) -> f32 {
        self.dmax
    }

    /// Only reported, never used to normalize.
    pub fn dmin(&self) -> f32 {
        self.dmin
    }

    /// Divides every raw disparity value by `dmax` in place.
    pub fn normalize(&self, disparity: &mut Array4<f32>) {
        let dmax = self.dmax;
        disparity.mapv_inplace(|d| d / dmax);
    }

    /// Converts a normalized error back to pixels.
    pub fn to_pixels(&self, normalized: f64) -> f64 {
        normalized * self.dmax as f64
    }
}

/// The result of the range pre-pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeScan {
    pub range: DisparityRange,
    /// The `(height, width)` shared by every disparity tensor.
    pub spatial: (usize, usize),
}

/// Running max/min over disparity tensors that must all share their spatial dimensions.
struct Accumulator<'a> {
    dataset: &'a str,
    dmax: f32,
    dmin: f32,
    spatial: Option<(usize, usize)>,
}

impl<'a> Accumulator<'a> {
    fn new(dataset: &'a str) -> Self {
        Self {
            dataset,
            dmax: f32::NEG_INFINITY,
            dmin: f32::INFINITY,
            spatial: None,
        }
    }

    fn fold(&mut self, id: ShardId, disparity: ArrayView4<f32>) -> Result<()> {
        let (n, h, w, _) = disparity.dim();
        if n == 0 || h * w == 0 {
            return Err(OrchestratorError::EmptySplit {
                dataset: self.dataset.to_string(),
                shard: id,
            });
        }

        let (eh, ew) = *self.spatial.get_or_insert((h, w));
        if (h, w) != (eh, ew) {
            return Err(OrchestratorError::ShapeMismatch {
                dataset: self.dataset.to_string(),
                shard: id,
                what: "disparity",
                got: disparity.shape().to_vec(),
                expected: vec![n, eh, ew, 1],
            });
        }

        let (lo, hi) = disparity
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| {
                (lo.min(d), hi.max(d))
            });
        debug!("{id}: disparity in [{lo}, {hi}]");

        self.dmax = self.dmax.max(hi);
        self.dmin = self.dmin.min(lo);
        Ok(())
    }

    fn finish(self) -> Result<RangeScan> {
        let Some(spatial) = self.spatial else {
            return Err(OrchestratorError::EmptySplit {
                dataset: self.dataset.to_string(),
                shard: ShardId::Test,
            });
        };

        if !(self.dmax.is_finite() && self.dmax > 0.) {
            return Err(OrchestratorError::DegenerateRange {
                dataset: self.dataset.to_string(),
                dmax: self.dmax,
            });
        }

        Ok(RangeScan {
            range: DisparityRange::new(self.dmax, self.dmin),
            spatial,
        })
    }
}

/// Computes the global disparity range over every training shard and the test split.
///
/// Training shards are scanned in ascending order `1..=shard_count`, then the test split. Only
/// the disparity tensors are loaded, one at a time.
///
/// # Errors
/// Any load error aborts the scan: a skipped shard would make `dmax` wrong for every split.
/// `DegenerateRange` if the maximum is zero, negative or not finite.
pub fn compute_range<S: ShardStore + ?Sized>(
    store: &mut S,
    shard_count: NonZeroUsize,
) -> Result<RangeScan> {
    let dataset = store.dataset().to_string();
    let mut acc = Accumulator::new(&dataset);

    let ids = (1..=shard_count.get())
        .map(ShardId::Train)
        .chain(std::iter::once(ShardId::Test));

    for id in ids {
        let disparity = store.load_disparity(id)?;
        acc.fold(id, disparity.view())?;
    }

    let scan = acc.finish()?;
    info!(
        "dataset '{dataset}': max disparity {}, min disparity {}",
        scan.range.dmax(),
        scan.range.dmin()
    );

    Ok(scan)
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{OrchestratorError, Result};

/// The epochs each training pass spends on every shard.
///
/// Always non-empty, positive and strictly decreasing: every pass trains less than the one
/// before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct EpochSchedule(Vec<usize>);

impl EpochSchedule {
    /// Creates a new `EpochSchedule`.
    ///
    /// # Errors
    /// `InvalidConfig` if `epochs` is empty, holds a zero or isn't strictly decreasing.
    pub fn new(epochs: Vec<usize>) -> Result<Self> {
        if epochs.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "the epoch schedule must have at least one pass".into(),
            ));
        }

        if epochs.contains(&0) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "every pass of the epoch schedule must train at least one epoch, got {epochs:?}"
            )));
        }

        if epochs.windows(2).any(|w| w[0] <= w[1]) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "the epoch schedule must be strictly decreasing, got {epochs:?}"
            )));
        }

        Ok(Self(epochs))
    }

    /// Descending powers of two, from `2^exponent` down to a single epoch.
    pub fn halving(exponent: u32) -> Self {
        Self((0..=exponent).rev().map(|e| 1 << e).collect())
    }

    /// The amount of passes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The epoch count of every pass, in order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// The epochs a single shard is trained for over the whole run.
    pub fn total_epochs(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl Default for EpochSchedule {
    /// `[8, 4, 2, 1]`
    fn default() -> Self {
        Self::halving(3)
    }
}

impl TryFrom<Vec<usize>> for EpochSchedule {
    type Error = OrchestratorError;

    fn try_from(epochs: Vec<usize>) -> Result<Self> {
        Self::new(epochs)
    }
}

impl From<EpochSchedule> for Vec<usize> {
    fn from(schedule: EpochSchedule) -> Self {
        schedule.0
    }
}

impl fmt::Display for EpochSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

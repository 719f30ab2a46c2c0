use std::num::NonZeroUsize;

use crate::{OrchestratorError, Result};

/// Which dataset to train on and how many training shards it has.
///
/// The spatial and channel dimensions are deliberately absent: they are discovered from the
/// data and resolved into a `DatasetShape` before training starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub name: String,
    pub shard_count: NonZeroUsize,
}

impl DatasetConfig {
    /// Creates a new `DatasetConfig`.
    ///
    /// # Errors
    /// `InvalidConfig` if the name is empty or could escape the data directory.
    pub fn new(name: impl Into<String>, shard_count: NonZeroUsize) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "dataset name must not be empty".into(),
            ));
        }

        if name.contains(['/', '\\']) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "dataset name '{name}' must not contain path separators"
            )));
        }

        Ok(Self { name, shard_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_names_that_are_not_plain_identifiers() {
        let one = NonZeroUsize::MIN;
        assert!(DatasetConfig::new("driving", one).is_ok());
        assert!(DatasetConfig::new("  ", one).is_err());
        assert!(DatasetConfig::new("../driving", one).is_err());
    }
}

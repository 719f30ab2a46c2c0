use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{Result, data::DisparityRange, evaluation::EpeResult};

#[derive(Serialize)]
struct EpeRecord<'a> {
    pass: Option<usize>,
    epochs: Option<usize>,
    #[serde(flatten)]
    result: &'a EpeResult,
    dmax: f32,
}

/// An append-only JSON lines log of every EPE measured.
#[derive(Debug, Clone)]
pub struct EpeHistory {
    path: PathBuf,
}

impl EpeHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one result as a single JSON line.
    ///
    /// # Arguments
    /// * `pass` - The training pass that produced the model, `None` for pretrained weights.
    /// * `epochs` - That pass' epochs per shard.
    /// * `result` - The measured EPE.
    /// * `range` - The range the split was normalized with.
    pub fn append(
        &self,
        pass: Option<usize>,
        epochs: Option<usize>,
        result: &EpeResult,
        range: &DisparityRange,
    ) -> Result<()> {
        let record = EpeRecord {
            pass,
            epochs,
            result,
            dmax: range.dmax(),
        };

        let mut line = serde_json::to_string(&record).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

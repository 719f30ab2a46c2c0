use std::{
    borrow::Cow,
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::info;
use machine_learning::arch::{EpochCallback, NamedTensor};
use safetensors::{Dtype, SafeTensors, View, serialize_to_file};
use serde::{Deserialize, Serialize};

use crate::{OrchestratorError, Result};

/// The file name prefix of every weights snapshot.
pub const WEIGHTS_PREFIX: &str = "disparity_weights";

/// How the epoch number in a checkpoint's file name is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointNaming {
    /// One counter for the whole run, no snapshot is ever overwritten.
    #[default]
    Global,
    /// The epoch within the current fit call. Later fits overwrite the low numbers of earlier
    /// ones.
    PerPass,
}

/// Persists a weights snapshot after every epoch of every fit call of a run.
///
/// Observes the model through `EpochCallback`, it never owns any weights.
#[derive(Debug)]
pub struct CheckpointWriter {
    dir: PathBuf,
    naming: CheckpointNaming,
    dataset: String,
    pass: usize,
    shard: usize,
    run_epoch: usize,
    written: Vec<PathBuf>,
}

impl CheckpointWriter {
    /// Creates the run's checkpoint directory.
    ///
    /// # Errors
    /// `CheckpointCollision` if `dir` already exists: two runs never share a directory.
    pub fn create(
        dir: impl Into<PathBuf>,
        naming: CheckpointNaming,
        dataset: impl Into<String>,
    ) -> Result<Self> {
        let dir = dir.into();

        if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match fs::create_dir(&dir) {
            Ok(()) => info!("writing checkpoints to {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(OrchestratorError::CheckpointCollision { path: dir });
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            dir,
            naming,
            dataset: dataset.into(),
            pass: 0,
            shard: 0,
            run_epoch: 0,
            written: Vec::new(),
        })
    }

    /// Tags the snapshots of the next fit call.
    pub fn begin_fit(&mut self, pass: usize, shard: usize) {
        self.pass = pass;
        self.shard = shard;
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every snapshot written so far, in order. Paths repeat under `PerPass` naming.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// The file name of snapshot number `n`, zero-padded to two digits.
    pub fn file_name(n: usize) -> String {
        format!("{WEIGHTS_PREFIX}.{n:02}.safetensors")
    }
}

impl EpochCallback for CheckpointWriter {
    fn on_epoch_end(&mut self, epoch: usize, loss: f32, weights: &[NamedTensor]) -> io::Result<()> {
        self.run_epoch += 1;
        let n = match self.naming {
            CheckpointNaming::Global => self.run_epoch,
            CheckpointNaming::PerPass => epoch,
        };

        let path = self.dir.join(Self::file_name(n));
        let metadata = HashMap::from([
            ("dataset".to_string(), self.dataset.clone()),
            ("pass".to_string(), self.pass.to_string()),
            ("shard".to_string(), self.shard.to_string()),
            ("epoch".to_string(), epoch.to_string()),
            ("loss".to_string(), loss.to_string()),
        ]);

        save_weights(&path, weights, Some(metadata)).map_err(io::Error::other)?;
        info!(
            "pass {} shard {} epoch {epoch}: saved {}",
            self.pass,
            self.shard,
            path.display()
        );

        self.written.push(path);
        Ok(())
    }
}

/// A `NamedTensor` seen as a little-endian `F32` safetensors view.
struct F32View<'a>(&'a NamedTensor);

impl View for F32View<'_> {
    fn dtype(&self) -> Dtype {
        Dtype::F32
    }

    fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    fn data(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(bytemuck::cast_slice(&self.0.data))
    }

    fn data_len(&self) -> usize {
        self.0.data.len() * size_of::<f32>()
    }
}

/// Writes `tensors` to a safetensors file.
///
/// # Errors
/// `Checkpoint` if a tensor's data doesn't match its shape or the file can't be written.
pub fn save_weights(
    path: &Path,
    tensors: &[NamedTensor],
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let fail = |msg: String| OrchestratorError::Checkpoint {
        path: path.to_path_buf(),
        msg,
    };

    for tensor in tensors {
        let len: usize = tensor.shape.iter().product();
        if len != tensor.data.len() {
            return Err(fail(format!(
                "tensor '{}' has shape {:?} but {} values",
                tensor.name,
                tensor.shape,
                tensor.data.len()
            )));
        }
    }

    let views = tensors.iter().map(|t| (t.name.as_str(), F32View(t)));
    serialize_to_file(views, &metadata, path).map_err(|e| fail(e.to_string()))
}

/// Reads every tensor of a safetensors weights file.
///
/// # Errors
/// `Io` if the file can't be read, `Checkpoint` if it isn't valid safetensors or holds
/// anything but `F32` tensors.
pub fn load_weights(path: &Path) -> Result<Vec<NamedTensor>> {
    info!("loading weights from {}", path.display());

    let bytes = fs::read(path)?;
    let fail = |msg: String| OrchestratorError::Checkpoint {
        path: path.to_path_buf(),
        msg,
    };

    let file = SafeTensors::deserialize(&bytes).map_err(|e| fail(e.to_string()))?;
    let mut tensors = file
        .tensors()
        .into_iter()
        .map(|(name, view)| {
            if view.dtype() != Dtype::F32 {
                return Err(fail(format!(
                    "tensor '{name}' is {:?}, expected F32",
                    view.dtype()
                )));
            }

            let data = view
                .data()
                .chunks_exact(size_of::<f32>())
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();

            Ok(NamedTensor::new(name, view.shape().to_vec(), data))
        })
        .collect::<Result<Vec<_>>>()?;

    tensors.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tensors)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn weights(scale: f32) -> Vec<NamedTensor> {
        vec![
            NamedTensor::new(
                "hidden.weight",
                vec![2, 3],
                (0..6).map(|i| i as f32 * scale).collect(),
            ),
            NamedTensor::new("hidden.bias", vec![3], vec![-1.5, 0.0, 2.25]),
        ]
    }

    #[test]
    fn refuses_an_existing_directory() {
        let root = TempDir::new().unwrap();
        let err =
            CheckpointWriter::create(root.path(), CheckpointNaming::Global, "toy").unwrap_err();
        assert!(matches!(err, OrchestratorError::CheckpointCollision { .. }));
    }

    #[test]
    fn creates_missing_parents() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("runs").join("first");

        let writer = CheckpointWriter::create(&dir, CheckpointNaming::Global, "toy").unwrap();
        assert!(writer.dir().is_dir());
    }

    #[test]
    fn global_naming_never_reuses_a_file_name() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("ckpt");
        let mut writer = CheckpointWriter::create(&dir, CheckpointNaming::Global, "toy").unwrap();

        writer.begin_fit(1, 1);
        for epoch in 1..=2 {
            writer.on_epoch_end(epoch, 0.5, &weights(1.0)).unwrap();
        }
        writer.begin_fit(2, 1);
        writer.on_epoch_end(1, 0.25, &weights(2.0)).unwrap();

        let names: Vec<_> = writer
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "disparity_weights.01.safetensors",
                "disparity_weights.02.safetensors",
                "disparity_weights.03.safetensors",
            ]
        );
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 3);
    }

    #[test]
    fn per_pass_naming_restarts_every_fit() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("ckpt");
        let mut writer = CheckpointWriter::create(&dir, CheckpointNaming::PerPass, "toy").unwrap();

        writer.begin_fit(1, 1);
        writer.on_epoch_end(1, 0.5, &weights(1.0)).unwrap();
        writer.on_epoch_end(2, 0.5, &weights(1.0)).unwrap();
        writer.begin_fit(2, 1);
        writer.on_epoch_end(1, 0.5, &weights(3.0)).unwrap();

        assert_eq!(writer.written()[0], writer.written()[2]);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);

        let latest = load_weights(&writer.written()[2]).unwrap();
        let weight = latest.iter().find(|t| t.name == "hidden.weight").unwrap();
        assert_eq!(weight.data[1], 3.0);
    }

    #[test]
    fn saved_weights_load_back_with_metadata() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("ckpt");
        let mut writer = CheckpointWriter::create(&dir, CheckpointNaming::Global, "toy").unwrap();
        writer.begin_fit(3, 2);
        writer.on_epoch_end(4, 0.125, &weights(0.5)).unwrap();

        let path = &writer.written()[0];
        let mut expected = weights(0.5);
        expected.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(load_weights(path).unwrap(), expected);

        let bytes = fs::read(path).unwrap();
        let (_, header) = SafeTensors::read_metadata(&bytes).unwrap();
        let metadata = header.metadata().as_ref().unwrap();
        assert_eq!(metadata["dataset"], "toy");
        assert_eq!(metadata["pass"], "3");
        assert_eq!(metadata["shard"], "2");
        assert_eq!(metadata["epoch"], "4");
    }

    #[test]
    fn rejects_tensors_whose_data_does_not_fill_their_shape() {
        let root = TempDir::new().unwrap();
        let bad = NamedTensor::new("w", vec![2, 2], vec![1.0]);

        let err = save_weights(&root.path().join("w.safetensors"), &[bad], None).unwrap_err();
        assert!(matches!(err, OrchestratorError::Checkpoint { .. }));
    }

    #[test]
    fn garbage_is_not_a_weights_file() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("junk.safetensors");
        fs::write(&path, b"definitely not safetensors").unwrap();

        let err = load_weights(&path).unwrap_err();
        assert!(matches!(err, OrchestratorError::Checkpoint { .. }));
    }
}

use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read, Seek},
    path::{Path, PathBuf},
};

use log::info;
use ndarray::{Array4, ArrayD, Ix4, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpyError, ReadNpzError, ReadableElement};

use super::{Shard, ShardId, ShardStore};
use crate::{OrchestratorError, Result, configs::DatasetConfig};

/// The three tensors every shard is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Left,
    Right,
    Disparity,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::Left => "left",
            Component::Right => "right",
            Component::Disparity => "disparity",
        };

        write!(f, "{s}")
    }
}

/// A `ShardStore` over compressed `.npz` files, one array per file.
///
/// Files live in a single directory and are named
/// `{dataset}.train.{component}.{index}.npz` and `{dataset}.test.{component}.npz`.
#[derive(Debug, Clone)]
pub struct NpzShardStore {
    dir: PathBuf,
    dataset: String,
}

impl NpzShardStore {
    /// Creates a new `NpzShardStore`.
    ///
    /// # Arguments
    /// * `dir` - The directory holding the dataset files.
    /// * `dataset` - The dataset this store serves.
    pub fn new(dir: impl Into<PathBuf>, dataset: &DatasetConfig) -> Self {
        Self {
            dir: dir.into(),
            dataset: dataset.name.clone(),
        }
    }

    /// The path of one component of a shard.
    pub fn path(&self, id: ShardId, component: Component) -> PathBuf {
        let name = match id {
            ShardId::Train(index) => format!("{}.train.{component}.{index}.npz", self.dataset),
            ShardId::Test => format!("{}.test.{component}.npz", self.dataset),
        };

        self.dir.join(name)
    }

    fn read(&self, id: ShardId, component: Component) -> Result<ArrayD<f32>> {
        let path = self.path(id, component);
        info!("loading {}", path.display());

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OrchestratorError::MissingShard {
                    dataset: self.dataset.clone(),
                    shard: id,
                    path,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut npz = NpzReader::new(BufReader::new(file)).map_err(|e| malformed(&path, e))?;
        read_first(&mut npz).map_err(|e| malformed(&path, e))
    }

    fn read_images(&self, id: ShardId, component: Component) -> Result<Array4<f32>> {
        let images = self.read(id, component)?;
        let shape = images.shape().to_vec();

        images.into_dimensionality::<Ix4>().map_err(|_| {
            malformed(
                &self.path(id, component),
                format!("{component} images must be [N,H,W,C], got shape {shape:?}"),
            )
        })
    }
}

impl ShardStore for NpzShardStore {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn load_shard(&mut self, id: ShardId) -> Result<Shard> {
        let left = self.read_images(id, Component::Left)?;
        let right = self.read_images(id, Component::Right)?;
        let disparity = self.load_disparity(id)?;

        Shard::new(&self.dataset, id, left, right, disparity)
    }

    fn load_disparity(&mut self, id: ShardId) -> Result<Array4<f32>> {
        let raw = self.read(id, Component::Disparity)?;

        match *raw.shape() {
            [n, h, w] | [n, h, w, 1] => {
                Array4::from_shape_vec((n, h, w, 1), raw.iter().copied().collect()).map_err(|e| {
                    malformed(&self.path(id, Component::Disparity), e)
                })
            }
            ref shape => Err(malformed(
                &self.path(id, Component::Disparity),
                format!("disparity must be [N,H,W], got shape {shape:?}"),
            )),
        }
    }
}

fn malformed(path: &Path, e: impl fmt::Display) -> OrchestratorError {
    OrchestratorError::MalformedArray {
        path: path.to_path_buf(),
        msg: e.to_string(),
    }
}

/// Reads the first array of the archive as `f32`, whatever numeric type it was stored as.
fn read_first<R: Read + Seek>(
    npz: &mut NpzReader<R>,
) -> std::result::Result<ArrayD<f32>, ReadNpzError> {
    if let Some(array) = read_as::<R, f32>(npz, |v| v)? {
        return Ok(array);
    }
    if let Some(array) = read_as::<R, u8>(npz, f32::from)? {
        return Ok(array);
    }
    if let Some(array) = read_as::<R, f64>(npz, |v| v as f32)? {
        return Ok(array);
    }
    if let Some(array) = read_as::<R, u16>(npz, f32::from)? {
        return Ok(array);
    }

    // Last resort, let the error tell which type it really was.
    npz.by_index::<OwnedRepr<i32>, IxDyn>(0)
        .map(|array| array.mapv(|v| v as f32))
}

/// # Returns
/// `None` if the array isn't stored as `T`.
fn read_as<R, T>(
    npz: &mut NpzReader<R>,
    convert: fn(T) -> f32,
) -> std::result::Result<Option<ArrayD<f32>>, ReadNpzError>
where
    R: Read + Seek,
    T: ReadableElement + Copy,
{
    match npz.by_index::<OwnedRepr<T>, IxDyn>(0) {
        Ok(array) => Ok(Some(array.mapv(convert))),
        Err(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_))) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use ndarray::{Array3, Array4};
    use ndarray_npy::NpzWriter;
    use tempfile::TempDir;

    use super::*;

    fn config() -> DatasetConfig {
        DatasetConfig::new("toy", NonZeroUsize::new(1).unwrap()).unwrap()
    }

    fn write_npz<T, D>(path: &Path, array: &ndarray::Array<T, D>)
    where
        T: ndarray_npy::WritableElement,
        D: ndarray::Dimension,
    {
        let mut npz = NpzWriter::new_compressed(File::create(path).unwrap());
        npz.add_array("arr_0", array).unwrap();
        npz.finish().unwrap();
    }

    #[test]
    fn names_files_after_dataset_split_component_and_index() {
        let store = NpzShardStore::new("data", &config());
        assert_eq!(
            store.path(ShardId::Train(3), Component::Left),
            Path::new("data/toy.train.left.3.npz")
        );
        assert_eq!(
            store.path(ShardId::Test, Component::Disparity),
            Path::new("data/toy.test.disparity.npz")
        );
    }

    #[test]
    fn loads_byte_images_and_rank_three_disparity() {
        let dir = TempDir::new().unwrap();
        let mut store = NpzShardStore::new(dir.path(), &config());

        let left = Array4::<u8>::from_elem((2, 3, 4, 3), 200);
        let right = Array4::<u8>::from_elem((2, 3, 4, 3), 100);
        let disparity = Array3::<f64>::from_elem((2, 3, 4), 12.5);
        write_npz(&store.path(ShardId::Train(1), Component::Left), &left);
        write_npz(&store.path(ShardId::Train(1), Component::Right), &right);
        write_npz(&store.path(ShardId::Train(1), Component::Disparity), &disparity);

        let shard = store.load_shard(ShardId::Train(1)).unwrap();
        assert_eq!(shard.len(), 2);
        assert_eq!(shard.shape(), machine_learning::DatasetShape::new(3, 4, 3));
        assert_eq!(shard.disparity().shape(), &[2, 3, 4, 1]);
        assert!(shard.disparity().iter().all(|&d| d == 12.5));
    }

    #[test]
    fn missing_files_are_missing_shards() {
        let dir = TempDir::new().unwrap();
        let mut store = NpzShardStore::new(dir.path(), &config());

        let err = store.load_disparity(ShardId::Train(2)).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::MissingShard { shard: ShardId::Train(2), .. }
        ));
    }

    #[test]
    fn garbage_files_are_malformed_arrays() {
        let dir = TempDir::new().unwrap();
        let mut store = NpzShardStore::new(dir.path(), &config());
        std::fs::write(store.path(ShardId::Test, Component::Disparity), b"not a zip").unwrap();

        let err = store.load_disparity(ShardId::Test).unwrap_err();
        assert!(matches!(err, OrchestratorError::MalformedArray { .. }));
    }

    #[test]
    fn images_must_be_rank_four() {
        let dir = TempDir::new().unwrap();
        let mut store = NpzShardStore::new(dir.path(), &config());
        write_npz(
            &store.path(ShardId::Test, Component::Left),
            &Array3::<f32>::zeros((2, 3, 4)),
        );

        let err = store.load_shard(ShardId::Test).unwrap_err();
        assert!(matches!(err, OrchestratorError::MalformedArray { .. }));
    }
}

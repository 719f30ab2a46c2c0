use std::{fs::File, num::NonZeroUsize, path::Path};

use ndarray::{Array, Array3, Array4, Dimension};
use ndarray_npy::{NpzWriter, WritableElement};
use tempfile::TempDir;

use machine_learning::MlErr;
use orchestrator::{
    OrchestratorError, checkpoint,
    configs::{DatasetConfig, ModelConfig, OptimizerConfig, TrainingConfig},
    data::{Component, NpzShardStore, ShardId},
    schedule::EpochSchedule,
};

const SHARDS: usize = 2;

fn write_npz<T: WritableElement, D: Dimension>(path: &Path, array: &Array<T, D>) {
    let mut npz = NpzWriter::new_compressed(File::create(path).unwrap());
    npz.add_array("arr_0", array).unwrap();
    npz.finish().unwrap();
}

/// Writes a small synthetic stereo dataset: the right image is the left one shifted by a
/// per-shard disparity.
fn write_dataset(dir: &Path, dataset: &DatasetConfig) {
    let store = NpzShardStore::new(dir, dataset);
    let ids = (1..=SHARDS)
        .map(ShardId::Train)
        .chain(std::iter::once(ShardId::Test));

    for (i, id) in ids.enumerate() {
        let shift = i + 1;
        let left = Array4::<u8>::from_shape_fn((3, 4, 6, 3), |(n, y, x, c)| {
            ((x * 40 + y * 7 + n * 13 + c * 3) % 256) as u8
        });
        let right = Array4::<u8>::from_shape_fn((3, 4, 6, 3), |(n, y, x, c)| {
            (((x + shift) * 40 + y * 7 + n * 13 + c * 3) % 256) as u8
        });
        let disparity = Array3::<f32>::from_elem((3, 4, 6), shift as f32);

        write_npz(&store.path(id, Component::Left), &left);
        write_npz(&store.path(id, Component::Right), &right);
        write_npz(&store.path(id, Component::Disparity), &disparity);
    }
}

fn mk_training(data_dir: &Path, checkpoint_dir: &Path) -> TrainingConfig {
    TrainingConfig {
        data_dir: data_dir.to_path_buf(),
        checkpoint_dir: checkpoint_dir.to_path_buf(),
        schedule: EpochSchedule::new(vec![2, 1]).unwrap(),
        batch_size: NonZeroUsize::new(2).unwrap(),
        seed: Some(7),
        model: ModelConfig {
            hidden: NonZeroUsize::new(4).unwrap(),
            max_shift: 4,
            optimizer: OptimizerConfig::Adam {
                lr: 0.01,
                b1: 0.9,
                b2: 0.999,
                eps: 1e-8,
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn trains_on_npz_shards_and_reloads_the_last_checkpoint() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = TempDir::new().unwrap();
    let dataset = DatasetConfig::new("synthetic", NonZeroUsize::new(SHARDS).unwrap()).unwrap();
    write_dataset(dir.path(), &dataset);

    let training = mk_training(dir.path(), &dir.path().join("run"));
    let report = orchestrator::train(dataset.clone(), training.clone()).unwrap();

    assert_eq!(report.passes.len(), 2);
    // (2 + 1) epochs on each shard.
    assert_eq!(report.checkpoints.len(), 3 * SHARDS);
    let last = report.last().unwrap();
    assert_eq!(last.shards, vec![1, 2]);
    assert_eq!(last.test.samples, 3);
    assert!(last.test.epe >= 0.0);
    assert!((last.test.pixel_epe - last.test.epe * 3.0).abs() < 1e-9);

    let weights = report.checkpoints.last().unwrap();
    let inference = orchestrator::evaluate(dataset, training, weights).unwrap();

    assert_eq!(inference.train.samples, 3 * SHARDS);
    assert!((inference.test.epe - last.test.epe).abs() < 1e-9);
}

#[test]
fn a_missing_test_split_stops_the_run_before_training() {
    let dir = TempDir::new().unwrap();
    let dataset = DatasetConfig::new("synthetic", NonZeroUsize::new(SHARDS).unwrap()).unwrap();
    write_dataset(dir.path(), &dataset);

    let store = NpzShardStore::new(dir.path(), &dataset);
    std::fs::remove_file(store.path(ShardId::Test, Component::Disparity)).unwrap();

    let training = mk_training(dir.path(), &dir.path().join("run"));
    let err = orchestrator::train(dataset, training).unwrap_err();

    assert!(matches!(
        err,
        orchestrator::OrchestratorError::MissingShard {
            shard: ShardId::Test,
            ..
        }
    ));
    assert!(!dir.path().join("run").exists());
}

#[test]
fn pretrained_weights_missing_a_tensor_are_rejected() {
    let dir = TempDir::new().unwrap();
    let dataset = DatasetConfig::new("synthetic", NonZeroUsize::new(SHARDS).unwrap()).unwrap();
    write_dataset(dir.path(), &dataset);

    let training = mk_training(dir.path(), &dir.path().join("run"));
    let report = orchestrator::train(dataset.clone(), training.clone()).unwrap();

    let mut tensors = checkpoint::load_weights(report.checkpoints.last().unwrap()).unwrap();
    tensors.retain(|t| t.name != "hidden.bias");
    let partial = dir.path().join("partial.safetensors");
    checkpoint::save_weights(&partial, &tensors, None).unwrap();

    let err = orchestrator::evaluate(dataset, training, &partial).unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Model(MlErr::MissingTensor {
            name: "hidden.bias"
        })
    ));
}

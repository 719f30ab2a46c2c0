use std::{fmt, io, path::PathBuf};

use machine_learning::MlErr;

use crate::data::ShardId;

/// The orchestrator module's result type.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can occur while preparing, training or evaluating a run.
///
/// None of them is retried: every variant carries enough context (dataset, shard, pass) for an
/// operator to resume from the checkpoints written so far.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before touching any file.
    InvalidConfig(String),
    /// An operation was requested in a phase of the run that doesn't allow it.
    InvalidState(String),
    /// The backing store has no file for a requested shard.
    MissingShard {
        dataset: String,
        shard: ShardId,
        path: PathBuf,
    },
    /// A shard file exists but can't be decoded as an array.
    MalformedArray { path: PathBuf, msg: String },
    /// The global maximum disparity is zero, negative or not a number.
    DegenerateRange { dataset: String, dmax: f32 },
    /// The checkpoint directory of a new run already exists.
    CheckpointCollision { path: PathBuf },
    /// A shard's tensors disagree among themselves or with the dataset shape.
    ShapeMismatch {
        dataset: String,
        shard: ShardId,
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A shard holds no samples.
    EmptySplit { dataset: String, shard: ShardId },
    /// The model failed while fitting a training shard.
    Fit {
        dataset: String,
        pass: usize,
        shard: usize,
        source: MlErr,
    },
    /// The model failed while predicting a split.
    Predict {
        dataset: String,
        shard: ShardId,
        source: MlErr,
    },
    /// The model could not be built or its weights could not be loaded.
    Model(MlErr),
    /// A weights file could not be written or read.
    Checkpoint { path: PathBuf, msg: String },
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::MissingShard {
                dataset,
                shard,
                path,
            } => write!(
                f,
                "missing {shard} of dataset '{dataset}': {} does not exist",
                path.display()
            ),
            Self::MalformedArray { path, msg } => {
                write!(f, "malformed array file {}: {msg}", path.display())
            }
            Self::DegenerateRange { dataset, dmax } => write!(
                f,
                "degenerate disparity range in dataset '{dataset}': max disparity is {dmax}"
            ),
            Self::CheckpointCollision { path } => write!(
                f,
                "checkpoint directory {} already exists, refusing to mix runs",
                path.display()
            ),
            Self::ShapeMismatch {
                dataset,
                shard,
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch in {shard} of dataset '{dataset}': {what} is {got:?}, expected {expected:?}"
            ),
            Self::EmptySplit { dataset, shard } => {
                write!(f, "{shard} of dataset '{dataset}' has no samples")
            }
            Self::Fit {
                dataset,
                pass,
                shard,
                source,
            } => write!(
                f,
                "fit failed on train shard {shard} of dataset '{dataset}' during pass {pass}: {source}"
            ),
            Self::Predict {
                dataset,
                shard,
                source,
            } => write!(
                f,
                "prediction failed on {shard} of dataset '{dataset}': {source}"
            ),
            Self::Model(e) => write!(f, "model error: {e}"),
            Self::Checkpoint { path, msg } => {
                write!(f, "weights file {} error: {msg}", path.display())
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fit { source, .. } | Self::Predict { source, .. } | Self::Model(source) => {
                Some(source)
            }
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Model(e)
    }
}

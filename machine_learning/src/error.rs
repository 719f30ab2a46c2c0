use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    EmptyBatch,
    UnknownTensor {
        name: String,
    },
    MissingTensor {
        name: &'static str,
    },
    InvalidHyperparameter {
        name: &'static str,
        reason: String,
    },
    NonContiguous {
        what: &'static str,
    },
    Checkpoint {
        epoch: usize,
        source: io::Error,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => format!("There's a size mismatch in {what}, got {got} and expected {expected}"),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => format!("The shape of {what} is {got:?}, expected {expected:?}"),
            MlErr::EmptyBatch => "Tried to fit or predict on a batch with no samples".to_string(),
            MlErr::UnknownTensor { name } => {
                format!("The weights contain a tensor named `{name}` the model doesn't have")
            }
            MlErr::MissingTensor { name } => {
                format!("The weights lack the model's `{name}` tensor")
            }
            MlErr::InvalidHyperparameter { name, reason } => {
                format!("Invalid hyperparameter `{name}`: {reason}")
            }
            MlErr::NonContiguous { what } => {
                format!("The {what} buffer is not laid out contiguously")
            }
            MlErr::Checkpoint { epoch, source } => {
                format!("The epoch callback failed after epoch {epoch}: {source}")
            }
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Checkpoint { source, .. } => Some(source),
            _ => None,
        }
    }
}

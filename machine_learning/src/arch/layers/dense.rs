use ndarray::{linalg, prelude::*};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{
    MlErr, Result,
    arch::{NamedTensor, activations::ActFn},
    optimization::Optimizer,
};

/// A fully connected layer, `a = act_fn(x·w + b)`.
///
/// Keeps the last forward input and pre-activation around so `backward` can compute the
/// gradients of its own weights.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,

    w: Array2<f32>,
    b: Array1<f32>,
    dw: Array2<f32>,
    db: Array1<f32>,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer with Xavier-normal weights and zero biases.
    ///
    /// # Arguments
    /// * `dim` - The `(inputs, outputs)` dimension of the layer.
    /// * `act_fn` - An optional activation function.
    /// * `rng` - The random number generator used to initialize the weights.
    pub fn new<R: Rng>(dim: (usize, usize), act_fn: Option<ActFn>, rng: &mut R) -> Result<Self> {
        let std_dev = (2.0 / (dim.0 + dim.1).max(1) as f32).sqrt();
        let normal = Normal::new(0.0, std_dev).map_err(|e| MlErr::InvalidHyperparameter {
            name: "dense initialization",
            reason: e.to_string(),
        })?;

        let empty = Array2::zeros((0, 0));

        Ok(Self {
            dim,
            act_fn,
            w: Array2::from_shape_fn(dim, |_| normal.sample(&mut *rng)),
            b: Array1::zeros(dim.1),
            dw: Array2::zeros(dim),
            db: Array1::zeros(dim.1),
            x: empty.clone(),
            z: empty,
        })
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    /// Forwards `x` through the layer, remembering what `backward` needs.
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.z = self.affine(x)?;
        self.x = x.to_owned();
        Ok(self.activate(&self.z))
    }

    /// Forwards `x` through the layer without touching the backward metadata.
    pub fn infer(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let z = self.affine(x)?;
        Ok(self.activate(&z))
    }

    /// Computes the gradients of this layer given the delta of its output and returns the
    /// delta of its input.
    pub fn backward(&mut self, mut d: Array2<f32>) -> Result<Array2<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "dense delta",
                got: d.shape().to_vec(),
                expected: self.z.shape().to_vec(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut self.dw);
        self.db.assign(&d.sum_axis(Axis(0)));

        Ok(d.dot(&self.w.t()))
    }

    /// Applies the last computed gradients using one optimizer for the weights and one for
    /// the biases.
    pub fn step<O>(&mut self, w_optimizer: &mut O, b_optimizer: &mut O) -> Result<()>
    where
        O: Optimizer + ?Sized,
    {
        let w = self
            .w
            .as_slice_mut()
            .ok_or(MlErr::NonContiguous { what: "weights" })?;
        let dw = self
            .dw
            .as_slice()
            .ok_or(MlErr::NonContiguous { what: "weight gradient" })?;
        w_optimizer.update_params(w, dw)?;

        let b = self
            .b
            .as_slice_mut()
            .ok_or(MlErr::NonContiguous { what: "biases" })?;
        let db = self
            .db
            .as_slice()
            .ok_or(MlErr::NonContiguous { what: "bias gradient" })?;
        b_optimizer.update_params(b, db)
    }

    /// Returns the weights and biases as `{prefix}.weight` and `{prefix}.bias`.
    pub fn tensors(&self, prefix: &str) -> [NamedTensor; 2] {
        [
            NamedTensor::new(
                format!("{prefix}.weight"),
                vec![self.dim.0, self.dim.1],
                self.w.iter().copied().collect(),
            ),
            NamedTensor::new(
                format!("{prefix}.bias"),
                vec![self.dim.1],
                self.b.to_vec(),
            ),
        ]
    }

    /// Overwrites the weights with `tensor`'s data.
    pub fn set_weights(&mut self, tensor: &NamedTensor) -> Result<()> {
        let expected = vec![self.dim.0, self.dim.1];
        self.w = Self::load(tensor, expected)?.into_shape_with_order(self.dim).map_err(|_| {
            MlErr::SizeMismatch {
                what: "weights",
                got: tensor.data.len(),
                expected: self.dim.0 * self.dim.1,
            }
        })?;
        Ok(())
    }

    /// Overwrites the biases with `tensor`'s data.
    pub fn set_biases(&mut self, tensor: &NamedTensor) -> Result<()> {
        self.b = Self::load(tensor, vec![self.dim.1])?;
        Ok(())
    }

    fn load(tensor: &NamedTensor, expected: Vec<usize>) -> Result<Array1<f32>> {
        let len: usize = expected.iter().product();
        if tensor.shape != expected || tensor.data.len() != len {
            return Err(MlErr::ShapeMismatch {
                what: "loaded tensor",
                got: tensor.shape.clone(),
                expected,
            });
        }

        Ok(Array1::from(tensor.data.clone()))
    }

    fn affine(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &self.w, 0.0, &mut z);
        z += &self.b;
        Ok(z)
    }

    fn activate(&self, z: &Array2<f32>) -> Array2<f32> {
        match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        }
    }
}

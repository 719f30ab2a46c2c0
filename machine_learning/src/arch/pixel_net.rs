use log::debug;
use ndarray::{Array2, Array4, ArrayView2, ArrayView4, Axis};
use rand::rngs::StdRng;

use super::{
    DisparityModel, EpochCallback, FitOptions, FitReport, NamedTensor, features::MatchingCost,
    layers::Dense, loss::LossFn,
};
use crate::{
    MlErr, Result,
    dataset::{DatasetShape, SampleOrder, StereoView},
    optimization::Optimizer,
};

/// Every tensor a complete set of weights must hold.
const TENSOR_NAMES: [&str; 4] = ["hidden.weight", "hidden.bias", "output.weight", "output.bias"];

/// A per-pixel disparity regressor: matching costs go through a hidden dense layer and a
/// sigmoid output layer that yields a normalized disparity in `[0, 1]`.
///
/// Built by `PixelNetSpec`.
pub struct PixelNet {
    shape: DatasetShape,
    features: MatchingCost,
    hidden: Dense,
    output: Dense,
    loss_fn: Box<dyn LossFn + Send>,
    // hidden.weight, hidden.bias, output.weight, output.bias
    optimizers: Vec<Box<dyn Optimizer + Send>>,
    rng: StdRng,
}

impl PixelNet {
    pub(super) fn new(
        shape: DatasetShape,
        features: MatchingCost,
        hidden: Dense,
        output: Dense,
        loss_fn: Box<dyn LossFn + Send>,
        optimizers: Vec<Box<dyn Optimizer + Send>>,
        rng: StdRng,
    ) -> Self {
        Self {
            shape,
            features,
            hidden,
            output,
            loss_fn,
            optimizers,
            rng,
        }
    }

    /// The shape of the samples this model was built for.
    pub fn shape(&self) -> DatasetShape {
        self.shape
    }

    /// Makes a forward and backward pass over a batch and updates the weights.
    ///
    /// # Returns
    /// The batch loss.
    fn train_batch(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        let a = self.hidden.forward(x)?;
        let y_pred = self.output.forward(a.view())?;
        let loss = self.loss_fn.loss(y_pred.view(), y);

        let d = self.loss_fn.loss_prime(y_pred.view(), y);
        let d = self.output.backward(d)?;
        self.hidden.backward(d)?;

        let got = self.optimizers.len();
        let [hw, hb, ow, ob] = self.optimizers.as_mut_slice() else {
            return Err(MlErr::SizeMismatch {
                what: "optimizers",
                got,
                expected: 4,
            });
        };
        self.hidden.step(&mut **hw, &mut **hb)?;
        self.output.step(&mut **ow, &mut **ob)?;

        Ok(loss)
    }

    fn check_inputs(&self, inputs: &StereoView<'_>) -> Result<()> {
        if inputs.is_empty() {
            return Err(MlErr::EmptyBatch);
        }

        let n = inputs.len();
        if inputs.shape() != self.shape {
            return Err(MlErr::ShapeMismatch {
                what: "input images",
                got: inputs.left().shape().to_vec(),
                expected: self.shape.image_dims(n).to_vec(),
            });
        }

        Ok(())
    }

    fn to_rows(targets: Array4<f32>) -> Result<Array2<f32>> {
        let len = targets.len();
        targets
            .into_shape_with_order((len, 1))
            .map_err(|_| MlErr::NonContiguous { what: "targets" })
    }
}

impl DisparityModel for PixelNet {
    fn fit(
        &mut self,
        inputs: StereoView<'_>,
        targets: ArrayView4<'_, f32>,
        options: &FitOptions,
        callback: &mut dyn EpochCallback,
    ) -> Result<FitReport> {
        self.check_inputs(&inputs)?;

        let n = inputs.len();
        let expected = self.shape.disparity_dims(n);
        if targets.shape() != expected {
            return Err(MlErr::ShapeMismatch {
                what: "target disparity",
                got: targets.shape().to_vec(),
                expected: expected.to_vec(),
            });
        }

        let mut order = SampleOrder::new(n);
        let mut losses = Vec::with_capacity(options.epochs);

        for epoch in 1..=options.epochs {
            if options.shuffle {
                order.shuffle(&mut self.rng);
            }

            let mut total_loss = 0.0;
            let mut num_batches = 0;

            for batch in order.batches(options.batch_size) {
                let (left, right) = inputs.select(batch);
                let x = self.features.extract(left.view(), right.view());
                let y = Self::to_rows(targets.select(Axis(0), batch))?;

                total_loss += self.train_batch(x.view(), y.view())?;
                num_batches += 1;
            }

            let loss = total_loss / num_batches as f32;
            debug!("epoch {epoch}/{}: loss {loss:.6}", options.epochs);
            losses.push(loss);

            callback
                .on_epoch_end(epoch, loss, &self.weights())
                .map_err(|source| MlErr::Checkpoint { epoch, source })?;
        }

        Ok(FitReport::new(losses))
    }

    fn predict(&mut self, inputs: StereoView<'_>) -> Result<Array4<f32>> {
        self.check_inputs(&inputs)?;

        let x = self.features.extract(inputs.left(), inputs.right());
        let a = self.hidden.infer(x.view())?;
        let y = self.output.infer(a.view())?;

        y.into_shape_with_order(self.shape.disparity_dims(inputs.len()))
            .map_err(|_| MlErr::NonContiguous { what: "prediction" })
    }

    fn weights(&self) -> Vec<NamedTensor> {
        let mut tensors = Vec::with_capacity(4);
        tensors.extend(self.hidden.tensors("hidden"));
        tensors.extend(self.output.tensors("output"));
        tensors
    }

    fn load_weights(&mut self, tensors: &[NamedTensor]) -> Result<()> {
        if let Some(tensor) = tensors
            .iter()
            .find(|t| !TENSOR_NAMES.contains(&t.name.as_str()))
        {
            return Err(MlErr::UnknownTensor {
                name: tensor.name.clone(),
            });
        }

        let find = |name: &'static str| {
            tensors
                .iter()
                .find(|t| t.name == name)
                .ok_or(MlErr::MissingTensor { name })
        };
        let hidden_w = find("hidden.weight")?;
        let hidden_b = find("hidden.bias")?;
        let output_w = find("output.weight")?;
        let output_b = find("output.bias")?;

        self.hidden.set_weights(hidden_w)?;
        self.hidden.set_biases(hidden_b)?;
        self.output.set_weights(output_w)?;
        self.output.set_biases(output_b)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io, num::NonZeroUsize};

    use super::*;
    use crate::arch::{LossSpec, ModelFactory, NoCallback, OptimizerSpec, PixelNetSpec};
    use ndarray::Array4;

    fn spec() -> PixelNetSpec {
        PixelNetSpec {
            hidden: NonZeroUsize::new(4).unwrap(),
            max_shift: 3,
            input_scale: 1.0,
            loss: LossSpec::Mse,
            optimizer: OptimizerSpec::Adam {
                lr: 0.05,
                b1: 0.9,
                b2: 0.999,
                eps: 1e-8,
            },
            seed: Some(11),
        }
    }

    fn stereo(n: usize) -> (Array4<f32>, Array4<f32>, Array4<f32>) {
        let left = Array4::from_shape_fn((n, 2, 5, 1), |(s, y, x, _)| ((s + y + x) % 3) as f32);
        let right =
            Array4::from_shape_fn((n, 2, 5, 1), |(s, y, x, _)| ((s + y + x + 1) % 3) as f32);
        let targets = Array4::from_elem((n, 2, 5, 1), 0.25);
        (left, right, targets)
    }

    struct Recorder(Vec<(usize, usize)>);

    impl EpochCallback for Recorder {
        fn on_epoch_end(
            &mut self,
            epoch: usize,
            _: f32,
            weights: &[NamedTensor],
        ) -> io::Result<()> {
            self.0.push((epoch, weights.len()));
            Ok(())
        }
    }

    #[test]
    fn fit_learns_a_constant_disparity_and_reports_every_epoch() {
        let mut model = spec().build(DatasetShape::new(2, 5, 1)).unwrap();
        let (left, right, targets) = stereo(6);
        let inputs = StereoView::new(left.view(), right.view()).unwrap();
        let options = FitOptions {
            epochs: 30,
            batch_size: NonZeroUsize::new(4).unwrap(),
            shuffle: true,
        };

        let mut recorder = Recorder(vec![]);
        let report = model
            .fit(inputs, targets.view(), &options, &mut recorder)
            .unwrap();

        assert_eq!(report.losses().len(), 30);
        assert!(report.final_loss().unwrap() < report.losses()[0]);
        assert_eq!(recorder.0.len(), 30);
        assert_eq!(recorder.0[0], (1, 4));
        assert_eq!(recorder.0[29].0, 30);

        let prediction = model.predict(inputs).unwrap();
        assert_eq!(prediction.shape(), &[6, 2, 5, 1]);
        assert!(prediction.iter().all(|&d| (0.0..=1.0).contains(&d)));
    }

    #[test]
    fn fit_rejects_targets_of_another_shape() {
        let mut model = spec().build(DatasetShape::new(2, 5, 1)).unwrap();
        let (left, right, _) = stereo(2);
        let targets = Array4::zeros((2, 2, 4, 1));
        let inputs = StereoView::new(left.view(), right.view()).unwrap();
        let options = FitOptions {
            epochs: 1,
            batch_size: NonZeroUsize::new(1).unwrap(),
            shuffle: false,
        };

        let err = model
            .fit(inputs, targets.view(), &options, &mut NoCallback)
            .unwrap_err();
        assert!(matches!(err, MlErr::ShapeMismatch { what: "target disparity", .. }));
    }

    #[test]
    fn loaded_weights_reproduce_predictions() {
        let shape = DatasetShape::new(2, 5, 1);
        let trained = spec().build(shape).unwrap();
        let mut fresh = PixelNetSpec { seed: Some(99), ..spec() }.build(shape).unwrap();
        let (left, right, _) = stereo(1);
        let inputs = StereoView::new(left.view(), right.view()).unwrap();

        fresh.load_weights(&trained.weights()).unwrap();
        let mut trained = trained;
        assert_eq!(fresh.predict(inputs).unwrap(), trained.predict(inputs).unwrap());
    }

    #[test]
    fn load_weights_rejects_unknown_tensors() {
        let mut model = spec().build(DatasetShape::new(2, 5, 1)).unwrap();
        let stray = NamedTensor::new("conv.weight", vec![1], vec![0.0]);
        let err = model.load_weights(&[stray]).unwrap_err();
        assert!(matches!(err, MlErr::UnknownTensor { .. }));
    }

    #[test]
    fn load_weights_requires_every_tensor() {
        let shape = DatasetShape::new(2, 5, 1);
        let mut model = spec().build(shape).unwrap();
        let before = model.weights();

        let partial: Vec<_> = PixelNetSpec { seed: Some(99), ..spec() }
            .build(shape)
            .unwrap()
            .weights()
            .into_iter()
            .filter(|t| t.name != "output.bias")
            .collect();

        let err = model.load_weights(&partial).unwrap_err();
        assert!(matches!(err, MlErr::MissingTensor { name: "output.bias" }));
        assert_eq!(model.weights(), before);

        let err = model.load_weights(&[]).unwrap_err();
        assert!(matches!(err, MlErr::MissingTensor { name: "hidden.weight" }));
    }
}

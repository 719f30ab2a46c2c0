use super::{Relu, Sigmoid};

/// An element-wise activation function applied after a layer's affine transform.
#[derive(Debug, Clone, Copy)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Relu(Relu),
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu)
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.f(x),
            Self::Relu(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.df(x),
            Self::Relu(a) => a.df(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_dispatches_to_the_rectifier() {
        let relu = ActFn::relu();

        assert_eq!(relu.f(-2.), 0.);
        assert_eq!(relu.f(1.5), 1.5);
        assert_eq!(relu.df(-2.), 0.);
        assert_eq!(relu.df(1.5), 1.);
    }

    #[test]
    fn sigmoid_dispatches_with_its_amplitude() {
        let sigmoid = ActFn::sigmoid(2.);

        assert!((sigmoid.f(0.) - 1.).abs() < 1e-6);
        assert!(sigmoid.df(0.) > 0.);
    }
}

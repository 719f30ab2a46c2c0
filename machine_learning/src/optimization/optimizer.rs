use crate::Result;

pub trait Optimizer {
    /// Updates `params` in place given their gradient.
    ///
    /// # Errors
    /// Returns `MlErr::SizeMismatch` if `params` and `grad` differ in length.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}

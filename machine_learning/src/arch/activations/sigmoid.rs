/// Logistic function scaled to `(0, amp)`.
#[derive(Clone, Copy, Debug)]
pub struct Sigmoid {
    amp: f32,
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp / (1. + (-z).exp())
    }

    pub fn df(&self, z: f32) -> f32 {
        let e = (-z).exp();
        (self.amp * e) / (e + 1.).powi(2)
    }
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self::new(1.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_centered_and_bounded_by_amp() {
        let s = Sigmoid::new(2.);
        assert!((s.f(0.) - 1.).abs() < 1e-6);
        assert!(s.f(50.) <= 2.);
        assert!(s.f(-50.) >= 0.);
        assert!((s.df(0.) - 0.5).abs() < 1e-6);
    }
}

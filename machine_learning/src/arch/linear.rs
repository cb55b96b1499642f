use ndarray::{linalg, prelude::*};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use super::{Model, StateDict};
use crate::{MlErr, Result};

/// A dense affine layer, `y = x·w + b`.
///
/// Its parameters are laid out as `[w (in × out, row major) | b (out)]`.
#[derive(Debug, Clone)]
pub struct Linear {
    dim: (usize, usize),
    size: usize,

    // Input of the last tracked forward pass.
    x: Option<Array2<f32>>,
}

impl Linear {
    /// Creates a new `Linear` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            x: None,
        }
    }

    #[inline]
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let (w_raw, b_raw) = params.split_at(w_size);
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| MlErr::SizeMismatch {
            what: "weights",
            got: w_raw.len(),
            expected: w_size,
        })?;

        Ok((w, ArrayView1::from(b_raw)))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| MlErr::SizeMismatch {
            what: "delta weights",
            got: w_size,
            expected: w_size,
        })?;

        Ok((dw, ArrayViewMut1::from(db_raw)))
    }
}

impl Model for Linear {
    fn size(&self) -> usize {
        self.size
    }

    /// Samples every parameter from `U(-1/√in, 1/√in)`.
    fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let bound = 1.0 / (self.dim.0.max(1) as f32).sqrt();
        let dist = Uniform::new(-bound, bound)
            .map_err(|e| MlErr::invalid_config("init", e.to_string()))?;

        Ok(dist.sample_iter(rng).take(self.size).collect())
    }

    fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        track_grad: bool,
    ) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        self.x = track_grad.then(|| x.to_owned());
        Ok(z)
    }

    fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        let x = self.x.take().ok_or(MlErr::GradientNotTracked)?;

        if d.dim() != (x.nrows(), self.dim.1) {
            return Err(MlErr::SizeMismatch {
                what: "output gradient rows",
                got: d.nrows(),
                expected: x.nrows(),
            });
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn state_dict(&self, params: &[f32]) -> Result<StateDict> {
        let (w, b) = self.view_params(params)?;

        // Reported as `out × in`, the usual layout of a linear layer's weight.
        let weight = w.t().iter().copied().collect();
        let bias = b.to_vec();

        Ok(StateDict::from([
            ("weight".to_string(), weight),
            ("bias".to_string(), bias),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn forward_is_affine() {
        let mut layer = Linear::new((1, 1));
        let params = [2.0, 1.0];
        let x = arr2(&[[0.0], [0.5], [1.0]]);

        let y = layer.forward(&params, x.view(), false).unwrap();
        assert_eq!(y, arr2(&[[1.0], [2.0], [3.0]]));
    }

    #[test]
    fn backward_computes_the_gradient() {
        let mut layer = Linear::new((1, 1));
        let params = [2.0, 1.0];
        let x = arr2(&[[1.0], [3.0]]);
        let d = arr2(&[[0.5], [-1.0]]);
        let mut grad = [0.0; 2];

        layer.forward(&params, x.view(), true).unwrap();
        let dx = layer.backward(&params, &mut grad, d.view()).unwrap();

        // dw = Σ x·d, db = Σ d
        assert_eq!(grad, [0.5 - 3.0, -0.5]);
        assert_eq!(dx, arr2(&[[1.0], [-2.0]]));
    }

    #[test]
    fn backward_needs_a_tracked_forward() {
        let mut layer = Linear::new((1, 1));
        let params = [2.0, 1.0];
        let x = arr2(&[[1.0]]);
        let d = arr2(&[[1.0]]);
        let mut grad = [0.0; 2];

        assert!(matches!(
            layer.backward(&params, &mut grad, d.view()),
            Err(MlErr::GradientNotTracked)
        ));

        layer.forward(&params, x.view(), true).unwrap();
        layer.forward(&params, x.view(), false).unwrap();
        assert!(matches!(
            layer.backward(&params, &mut grad, d.view()),
            Err(MlErr::GradientNotTracked)
        ));

        layer.forward(&params, x.view(), true).unwrap();
        assert!(layer.backward(&params, &mut grad, d.view()).is_ok());
        assert!(layer.backward(&params, &mut grad, d.view()).is_err());
    }

    #[test]
    fn multi_feature_layout() {
        let mut layer = Linear::new((2, 3));
        assert_eq!(layer.dim(), (2, 3));
        assert_eq!(layer.size(), 9);

        // w = [[1, 2, 3], [4, 5, 6]], b = [0.5, 0.5, 0.5]
        let params = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.5, 0.5, 0.5];
        let y = layer
            .forward(&params, arr2(&[[1.0, 1.0]]).view(), false)
            .unwrap();
        assert_eq!(y, arr2(&[[5.5, 7.5, 9.5]]));

        let sd = layer.state_dict(&params).unwrap();
        assert_eq!(sd["weight"], vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(sd["bias"], vec![0.5; 3]);
    }

    #[test]
    fn wrong_sizes_are_rejected() {
        let mut layer = Linear::new((1, 1));
        let x = arr2(&[[1.0, 2.0]]);
        assert!(layer.forward(&[1.0, 0.0], x.view(), false).is_err());
        assert!(layer.forward(&[1.0], arr2(&[[1.0]]).view(), false).is_err());
    }

    #[test]
    fn init_is_bounded_and_seeded() {
        let layer = Linear::new((4, 2));
        let a = layer.init_params(&mut StdRng::seed_from_u64(13)).unwrap();
        let b = layer.init_params(&mut StdRng::seed_from_u64(13)).unwrap();

        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
        assert!(a.iter().all(|p| p.abs() <= 0.5));
    }
}

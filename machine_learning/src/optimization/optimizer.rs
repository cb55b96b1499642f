/// An update rule for a flat set of parameters.
pub trait Optimizer {
    /// Takes one step over `params` given their gradient `grad`.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);
}

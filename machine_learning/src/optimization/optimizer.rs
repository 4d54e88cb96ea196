/// A per-key update rule, run by the server whenever a gradient is pushed.
pub trait Optimizer {
    /// Updates `params` given the pushed `grad`.
    ///
    /// # Arguments
    /// * `params` - The values that are going to be modified.
    /// * `state` - The optimizer's state for these values, same length as `params`.
    /// * `grad` - The pushed gradient.
    fn update_params(&self, params: &mut [f32], state: &mut [f32], grad: &[f32]);
}

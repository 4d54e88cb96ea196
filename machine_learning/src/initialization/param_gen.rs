/// A `ParamGen` generates values for the initial state of the model's parameters.
pub trait ParamGen {
    /// Should sample exactly `n` values.
    ///
    /// # Arguments
    /// * `n` - The amount of values to generate.
    fn sample(&mut self, n: usize) -> Vec<f32>;
}

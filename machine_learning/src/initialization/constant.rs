use super::ParamGen;

/// A parameter generator that always generates the same value.
pub struct ConstParamGen {
    value: f32,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `value` - The value to always generate.
    ///
    /// # Returns
    /// A new `ConstParamGen` instance.
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Vec<f32> {
        vec![self.value; n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        let mut param_gen = ConstParamGen::new(1.);
        assert!(param_gen.sample(0).is_empty());
    }

    #[test]
    fn exact() {
        const SIZE: usize = 10;

        let mut param_gen = ConstParamGen::new(0.25);
        assert_eq!(param_gen.sample(SIZE), vec![0.25; SIZE]);
        assert_eq!(param_gen.sample(SIZE), vec![0.25; SIZE]);
    }
}

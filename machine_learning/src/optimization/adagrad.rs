use super::Optimizer;

/// Adaptive gradient optimization algorithm.
///
/// The gradients pushed by the workers already point uphill of the target, so the
/// step is added rather than subtracted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaGrad {
    learning_rate: f32,
    epsilon: f32,
}

impl AdaGrad {
    pub const EPSILON: f32 = 1e-6;

    /// Returns a new `AdaGrad`.
    ///
    /// # Arguments
    /// * `learning_rate` - The scale of the steps taken on `update_params`.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            epsilon: Self::EPSILON,
        }
    }

    /// Runs the same rule as `update_params` but leaves the values untouched, the step
    /// lands on the squared gradient accumulator instead.
    ///
    /// # Arguments
    /// * `state` - The squared gradient accumulator.
    /// * `grad` - The pushed gradient.
    pub fn update_state(&self, state: &mut [f32], grad: &[f32]) {
        for (acc, &g) in state.iter_mut().zip(grad) {
            *acc += g * g;
            *acc += self.step(*acc, g);
        }
    }

    fn step(&self, acc: f32, g: f32) -> f32 {
        self.learning_rate * g / (acc + self.epsilon).sqrt()
    }
}

impl Optimizer for AdaGrad {
    fn update_params(&self, params: &mut [f32], state: &mut [f32], grad: &[f32]) {
        for ((w, acc), &g) in params.iter_mut().zip(state.iter_mut()).zip(grad) {
            *acc += g * g;
            *w += self.step(*acc, g);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step() {
        let adagrad = AdaGrad::new(0.1);
        let mut params = [0.5];
        let mut state = [0.0];

        adagrad.update_params(&mut params, &mut state, &[2.0]);

        assert_eq!(state, [4.0]);
        let expected = 0.5 + 0.1 * 2.0 / (4.0f32 + 1e-6).sqrt();
        assert!((params[0] - expected).abs() < 1e-7);
    }

    #[test]
    fn zero_grad_is_a_no_op() {
        let adagrad = AdaGrad::new(0.1);
        let mut params = [0.3, -1.2];
        let mut state = [0.7, 0.0];

        adagrad.update_params(&mut params, &mut state, &[0.0, 0.0]);
        assert_eq!(params, [0.3, -1.2]);
        assert_eq!(state, [0.7, 0.0]);

        adagrad.update_state(&mut state, &[0.0, 0.0]);
        assert_eq!(state, [0.7, 0.0]);
    }

    #[test]
    fn accumulator_never_decreases() {
        let adagrad = AdaGrad::new(0.5);
        let mut params = [0.0];
        let mut state = [0.0];
        let mut last = 0.0;

        for g in [1.0, -3.0, 0.25, -0.01, 7.0] {
            adagrad.update_params(&mut params, &mut state, &[g]);
            assert!(state[0] >= last);
            last = state[0];
        }
    }

    #[test]
    fn update_state_keeps_params() {
        let adagrad = AdaGrad::new(0.1);
        let mut state = [0.0];

        adagrad.update_state(&mut state, &[1.0]);

        let expected = 1.0 + 0.1 / (1.0f32 + 1e-6).sqrt();
        assert!((state[0] - expected).abs() < 1e-6);
    }
}

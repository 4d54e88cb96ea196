use std::{
    io::{self, Write},
    sync::atomic::{AtomicU32, Ordering},
};

use comms::specs::{machine_learning::LinearSpec, server::ParamGenSpec};
use rand::Rng;

use crate::{
    FrequencyTable, Key, Kernel, LocalParamCache, Loss, MlErr, ParamAccess, Result,
    atomic::AtomicF32,
    initialization::ParamGen,
    optimization::{AdaGrad, Optimizer},
};

/// Server record of a single feature weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearParam {
    pub value: f32,
    pub grad2sum: f32,
}

/// Worker accumulator of a single feature weight.
#[derive(Debug, Default)]
pub struct LinearGrad {
    pub sum: AtomicF32,
    pub count: AtomicU32,
}

/// Parameter layout of the logistic regression model, one scalar per key.
///
/// The pushed gradient is the raw sum of the round's contributions.
#[derive(Debug, Clone, Copy)]
pub struct LinearAccess {
    optimizer: AdaGrad,
}

impl LinearAccess {
    /// Creates a new `LinearAccess`.
    ///
    /// # Arguments
    /// * `learning_rate` - The server-side AdaGrad learning rate.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            optimizer: AdaGrad::new(learning_rate),
        }
    }
}

impl ParamAccess for LinearAccess {
    type Param = LinearParam;
    type Local = f32;
    type Grad = LinearGrad;

    fn pull_width(&self) -> usize {
        1
    }

    fn push_width(&self) -> usize {
        1
    }

    fn default_init(&self) -> ParamGenSpec {
        ParamGenSpec::Uniform { low: 0.0, high: 1.0 }
    }

    fn init_param(&self, _key: Key, param_gen: &mut dyn ParamGen) -> Self::Param {
        let value = param_gen.sample(1).first().copied().unwrap_or_default();
        LinearParam {
            value,
            grad2sum: 0.0,
        }
    }

    fn to_pull_value(&self, param: &Self::Param, out: &mut [f32]) {
        out[0] = param.value;
    }

    fn new_local(&self) -> Self::Local {
        0.0
    }

    fn load_pull_value(&self, local: &mut Self::Local, value: &[f32]) {
        *local = value[0];
    }

    fn new_grad(&self) -> Self::Grad {
        LinearGrad::default()
    }

    fn to_push_value(&self, grad: &Self::Grad, out: &mut [f32]) {
        out[0] = grad.sum.load();
    }

    fn apply_push_value(&self, param: &mut Self::Param, grad: &[f32]) {
        self.optimizer.update_params(
            std::slice::from_mut(&mut param.value),
            std::slice::from_mut(&mut param.grad2sum),
            grad,
        );
    }

    fn write_param(&self, param: &Self::Param, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "{}", param.value)
    }
}

/// One line of the linear model's training data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearInstance {
    pub target: f32,
    /// Every feature is binary for now, its weight is always `1.0`.
    pub features: Vec<(Key, f32)>,
}

/// Logistic regression trained with plain SGD gradients.
///
/// Lines look like `<target> <key> <key> ...`.
#[derive(Debug, Clone)]
pub struct LinearKernel {
    access: LinearAccess,
    spec: LinearSpec,
}

impl LinearKernel {
    const FEATURE_WEIGHT: f32 = 1.0;

    /// Creates a new `LinearKernel`.
    ///
    /// # Arguments
    /// * `spec` - The model's specification.
    /// * `learning_rate` - The server-side learning rate.
    pub fn new(spec: LinearSpec, learning_rate: f32) -> Self {
        Self {
            access: LinearAccess::new(learning_rate),
            spec,
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl Kernel for LinearKernel {
    type Access = LinearAccess;
    type Instance = LinearInstance;
    type Round = ();

    fn access(&self) -> Self::Access {
        self.access
    }

    fn parse(&self, line: &str, instance: &mut Self::Instance) -> Result<bool> {
        instance.features.clear();

        let mut fields = line.split_whitespace();
        let Some(target) = fields.next() else {
            return Ok(false);
        };

        instance.target = target
            .parse()
            .map_err(|e| MlErr::parse(line, format!("bad target {target:?}: {e}")))?;

        for field in fields {
            let key = field
                .parse()
                .map_err(|e| MlErr::parse(line, format!("bad key {field:?}: {e}")))?;
            instance.features.push((key, Self::FEATURE_WEIGHT));
        }

        Ok(!instance.features.is_empty())
    }

    fn for_each_key(&self, instance: &Self::Instance, mut f: impl FnMut(Key)) {
        instance.features.iter().for_each(|&(key, _)| f(key));
    }

    fn prepare_round(&self, _freq: &FrequencyTable, _round: &mut Self::Round) -> Result<()> {
        Ok(())
    }

    fn learn<R: Rng + ?Sized>(
        &self,
        instance: &Self::Instance,
        _round: &Self::Round,
        cache: &LocalParamCache<Self::Access>,
        _rng: &mut R,
        loss: &mut Loss,
    ) {
        let score: f32 = instance
            .features
            .iter()
            .map(|&(key, weight)| weight * cache.param(key))
            .sum();

        let error = instance.target - sigmoid(score);

        for &(key, weight) in &instance.features {
            let grad = cache.grad(key);
            grad.sum.fetch_add(error * weight);
            grad.count.fetch_add(1, Ordering::Relaxed);
        }

        loss.accumulate(error * error);
    }

    fn lines_per_instance(&self) -> usize {
        if self.spec.count_lines_twice { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::initialization::ConstParamGen;

    fn kernel() -> LinearKernel {
        LinearKernel::new(LinearSpec::default(), 0.1)
    }

    #[test]
    fn parse_target_and_keys() {
        let mut instance = LinearInstance::default();
        assert!(kernel().parse("1 4 9 4", &mut instance).unwrap());
        assert_eq!(instance.target, 1.0);
        assert_eq!(instance.features, [(4, 1.0), (9, 1.0), (4, 1.0)]);
    }

    #[test]
    fn parse_blank_line_has_nothing_to_learn() {
        let mut instance = LinearInstance::default();
        assert!(!kernel().parse("   ", &mut instance).unwrap());
        assert!(!kernel().parse("0.0", &mut instance).unwrap());
    }

    #[test]
    fn parse_rejects_bad_fields() {
        let mut instance = LinearInstance::default();
        assert!(kernel().parse("yes 1 2", &mut instance).is_err());
        assert!(kernel().parse("1 2:0.5", &mut instance).is_err());
        assert!(kernel().parse("1 -3", &mut instance).is_err());
    }

    #[test]
    fn learn_accumulates_error_per_key() {
        let kernel = kernel();
        let mut cache = LocalParamCache::new(kernel.access());
        cache.load_pull_values(&[1, 2], &[0.0, 0.0]).unwrap();

        let mut instance = LinearInstance::default();
        kernel.parse("1 1 2", &mut instance).unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        let mut loss = Loss::default();
        kernel.learn(&instance, &(), &cache, &mut rng, &mut loss);
        kernel.learn(&instance, &(), &cache, &mut rng, &mut loss);

        // sigmoid(0) = 0.5
        assert_eq!(cache.grad(1).sum.load(), 1.0);
        assert_eq!(cache.grad(2).count.load(Ordering::Relaxed), 2);
        assert_eq!(loss.count(), 2);
        assert_eq!(loss.mean(), 0.25);
    }

    #[test]
    fn push_is_not_averaged() {
        let access = LinearAccess::new(0.1);
        let grad = access.new_grad();
        grad.sum.fetch_add(3.0);
        grad.count.fetch_add(3, Ordering::Relaxed);

        let mut out = [0.0];
        access.to_push_value(&grad, &mut out);
        assert_eq!(out, [3.0]);
    }

    #[test]
    fn apply_push_runs_adagrad() {
        let access = LinearAccess::new(0.1);
        let mut param = access.init_param(0, &mut ConstParamGen::new(0.5));

        access.apply_push_value(&mut param, &[2.0]);

        assert_eq!(param.grad2sum, 4.0);
        assert!((param.value - (0.5 + 0.1 * 2.0 / 4.000001f32.sqrt())).abs() < 1e-7);
    }

    #[test]
    fn lines_per_instance_follows_spec() {
        assert_eq!(kernel().lines_per_instance(), 2);
        let once = LinearKernel::new(
            LinearSpec {
                count_lines_twice: false,
            },
            0.1,
        );
        assert_eq!(once.lines_per_instance(), 1);
    }
}

use std::{
    io::{self, Write},
    sync::atomic::{AtomicU32, Ordering},
};

use comms::specs::{machine_learning::UpdateTarget, server::ParamGenSpec};

use crate::{
    Key, ParamAccess,
    atomic::{self, AtomicF32},
    initialization::ParamGen,
    optimization::{AdaGrad, Optimizer},
};

/// Server record of a word, its two embeddings and their squared gradient sums.
#[derive(Debug, Clone, PartialEq)]
pub struct Word2VecParam {
    /// The side dotted against the context when the word is a target.
    pub hidden: Box<[f32]>,
    /// The side summed into the context when the word surrounds a target.
    pub output: Box<[f32]>,
    pub hidden_acc: Box<[f32]>,
    pub output_acc: Box<[f32]>,
}

/// Worker copy of a word's embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct Word2VecLocal {
    pub hidden: Box<[f32]>,
    pub output: Box<[f32]>,
}

/// Worker accumulator of a word's embeddings.
#[derive(Debug)]
pub struct Word2VecGrad {
    pub hidden: Box<[AtomicF32]>,
    pub output: Box<[AtomicF32]>,
    pub hidden_count: AtomicU32,
    pub output_count: AtomicU32,
}

impl Word2VecGrad {
    /// Accumulates `scale * v` as one contribution to the hidden side.
    pub fn accu_hidden(&self, scale: f32, v: &[f32]) {
        atomic::axpy(&self.hidden, scale, v);
        self.hidden_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Accumulates `v` as one contribution to the output side.
    pub fn accu_output(&self, v: &[f32]) {
        atomic::axpy(&self.output, 1.0, v);
        self.output_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Parameter layout of the skip-gram model.
///
/// Both pulled values and pushed gradients are `2 * dim` numbers per key, the hidden
/// side first. Gradients are averaged by their contribution count before leaving the
/// worker.
#[derive(Debug, Clone, Copy)]
pub struct Word2VecAccess {
    dim: usize,
    optimizer: AdaGrad,
    update_target: UpdateTarget,
}

impl Word2VecAccess {
    /// Creates a new `Word2VecAccess`.
    ///
    /// # Arguments
    /// * `dim` - The embedding dimensionality.
    /// * `learning_rate` - The server-side AdaGrad learning rate.
    /// * `update_target` - Whether pushes move the values or only the accumulators.
    pub fn new(dim: usize, learning_rate: f32, update_target: UpdateTarget) -> Self {
        Self {
            dim,
            optimizer: AdaGrad::new(learning_rate),
            update_target,
        }
    }
}

fn write_components(values: &[f32], out: &mut dyn Write) -> io::Result<()> {
    for (i, x) in values.iter().enumerate() {
        if i > 0 {
            out.write_all(b"\t")?;
        }
        write!(out, "{x}")?;
    }

    Ok(())
}

fn averaged(acc: &[AtomicF32], count: &AtomicU32, out: &mut [f32]) {
    let count = count.load(Ordering::Relaxed);
    for (o, a) in out.iter_mut().zip(acc) {
        *o = a.load();
        if count > 0 {
            *o /= count as f32;
        }
    }
}

impl ParamAccess for Word2VecAccess {
    type Param = Word2VecParam;
    type Local = Word2VecLocal;
    type Grad = Word2VecGrad;

    fn pull_width(&self) -> usize {
        2 * self.dim
    }

    fn push_width(&self) -> usize {
        2 * self.dim
    }

    fn default_init(&self) -> ParamGenSpec {
        let bound = 0.5 / self.dim as f32;
        ParamGenSpec::Uniform {
            low: -bound,
            high: bound,
        }
    }

    fn init_param(&self, _key: Key, param_gen: &mut dyn ParamGen) -> Self::Param {
        Word2VecParam {
            hidden: param_gen.sample(self.dim).into_boxed_slice(),
            output: param_gen.sample(self.dim).into_boxed_slice(),
            hidden_acc: vec![0.0; self.dim].into_boxed_slice(),
            output_acc: vec![0.0; self.dim].into_boxed_slice(),
        }
    }

    fn to_pull_value(&self, param: &Self::Param, out: &mut [f32]) {
        let (hidden, output) = out.split_at_mut(self.dim);
        hidden.copy_from_slice(&param.hidden);
        output.copy_from_slice(&param.output);
    }

    fn new_local(&self) -> Self::Local {
        Word2VecLocal {
            hidden: vec![0.0; self.dim].into_boxed_slice(),
            output: vec![0.0; self.dim].into_boxed_slice(),
        }
    }

    fn load_pull_value(&self, local: &mut Self::Local, value: &[f32]) {
        let (hidden, output) = value.split_at(self.dim);
        local.hidden.copy_from_slice(hidden);
        local.output.copy_from_slice(output);
    }

    fn new_grad(&self) -> Self::Grad {
        Word2VecGrad {
            hidden: atomic::zeroed_slice(self.dim),
            output: atomic::zeroed_slice(self.dim),
            hidden_count: AtomicU32::new(0),
            output_count: AtomicU32::new(0),
        }
    }

    fn to_push_value(&self, grad: &Self::Grad, out: &mut [f32]) {
        let (hidden, output) = out.split_at_mut(self.dim);
        averaged(&grad.hidden, &grad.hidden_count, hidden);
        averaged(&grad.output, &grad.output_count, output);
    }

    fn apply_push_value(&self, param: &mut Self::Param, grad: &[f32]) {
        let (hidden, output) = grad.split_at(self.dim);

        match self.update_target {
            UpdateTarget::Accumulator => {
                self.optimizer.update_state(&mut param.hidden_acc, hidden);
                self.optimizer.update_state(&mut param.output_acc, output);
            }
            UpdateTarget::Value => {
                self.optimizer
                    .update_params(&mut param.hidden, &mut param.hidden_acc, hidden);
                self.optimizer
                    .update_params(&mut param.output, &mut param.output_acc, output);
            }
        }
    }

    fn write_param(&self, param: &Self::Param, out: &mut dyn Write) -> io::Result<()> {
        write_components(&param.output, out)?;
        out.write_all(b"\t")?;
        write_components(&param.hidden, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::ConstParamGen;

    #[test]
    fn push_is_averaged_per_side() {
        let access = Word2VecAccess::new(2, 0.1, UpdateTarget::Value);
        let grad = access.new_grad();
        grad.accu_hidden(1.0, &[2.0, 4.0]);
        grad.accu_hidden(1.0, &[0.0, 2.0]);
        grad.accu_output(&[3.0, -3.0]);

        let mut out = [0.0; 4];
        access.to_push_value(&grad, &mut out);
        assert_eq!(out, [1.0, 3.0, 3.0, -3.0]);
    }

    #[test]
    fn untouched_grad_pushes_zeros() {
        let access = Word2VecAccess::new(3, 0.1, UpdateTarget::Value);
        let mut out = [1.0; 6];
        access.to_push_value(&access.new_grad(), &mut out);
        assert_eq!(out, [0.0; 6]);
    }

    #[test]
    fn accumulator_target_leaves_values() {
        let access = Word2VecAccess::new(2, 0.1, UpdateTarget::Accumulator);
        let mut param = access.init_param(0, &mut ConstParamGen::new(0.25));

        access.apply_push_value(&mut param, &[1.0, 1.0, 1.0, 1.0]);

        assert_eq!(&*param.hidden, &[0.25, 0.25]);
        assert_eq!(&*param.output, &[0.25, 0.25]);
        assert!(param.hidden_acc.iter().all(|&acc| acc > 1.0));
    }

    #[test]
    fn value_target_moves_values() {
        let access = Word2VecAccess::new(1, 0.1, UpdateTarget::Value);
        let mut param = access.init_param(0, &mut ConstParamGen::new(0.0));

        access.apply_push_value(&mut param, &[1.0, -1.0]);

        assert_eq!(&*param.hidden_acc, &[1.0]);
        assert!(param.hidden[0] > 0.0);
        assert!(param.output[0] < 0.0);
    }

    #[test]
    fn zero_push_is_idempotent() {
        for target in [UpdateTarget::Accumulator, UpdateTarget::Value] {
            let access = Word2VecAccess::new(2, 0.1, target);
            let mut param = access.init_param(0, &mut ConstParamGen::new(0.5));
            let before = param.clone();

            access.apply_push_value(&mut param, &[0.0; 4]);
            assert_eq!(param, before);
        }
    }

    #[test]
    fn dump_writes_output_then_hidden() {
        let access = Word2VecAccess::new(2, 0.1, UpdateTarget::Value);
        let mut param = access.init_param(0, &mut ConstParamGen::new(0.0));
        param.hidden = vec![1.0, 2.0].into_boxed_slice();
        param.output = vec![3.5, -4.0].into_boxed_slice();

        let mut out = Vec::new();
        access.write_param(&param, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "3.5\t-4\t1\t2");
    }

    #[test]
    fn default_init_scales_with_dim() {
        let access = Word2VecAccess::new(100, 0.1, UpdateTarget::Value);
        assert_eq!(
            access.default_init(),
            ParamGenSpec::Uniform {
                low: -0.005,
                high: 0.005
            }
        );
    }
}

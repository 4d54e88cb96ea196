use std::io::{self, Write};

use comms::specs::server::ParamGenSpec;

use crate::initialization::ParamGen;

/// An opaque parameter id.
pub type Key = u64;

/// Everything the engine needs to know about a model's parameters.
///
/// Both ends of a pull/push round use the same implementation: the server owns
/// `Param`s and applies the update rule, the worker caches `Local` values and
/// accumulates into `Grad`s. Values travel flattened, `pull_width` numbers per key
/// on pull and `push_width` numbers per key on push.
pub trait ParamAccess: Clone + Send + Sync + 'static {
    /// The server-side record, value plus optimizer state.
    type Param: Send + Sync;
    /// The worker-side copy of the value.
    type Local: Send + Sync;
    /// The worker-side gradient accumulator, shared between compute tasks.
    type Grad: Send + Sync;

    fn pull_width(&self) -> usize;

    fn push_width(&self) -> usize;

    /// The initialization used by the servers unless the configuration overrides it.
    fn default_init(&self) -> ParamGenSpec;

    /// Creates the server record for a key seen for the first time.
    fn init_param(&self, key: Key, param_gen: &mut dyn ParamGen) -> Self::Param;

    /// Writes the part of `param` that's sent to workers into `out`.
    fn to_pull_value(&self, param: &Self::Param, out: &mut [f32]);

    fn new_local(&self) -> Self::Local;

    /// Overwrites `local` with a pulled value.
    fn load_pull_value(&self, local: &mut Self::Local, value: &[f32]);

    fn new_grad(&self) -> Self::Grad;

    /// Writes the gradient that's sent to the server into `out`.
    fn to_push_value(&self, grad: &Self::Grad, out: &mut [f32]);

    /// Applies a pushed gradient to the server record, this is the optimizer step.
    fn apply_push_value(&self, param: &mut Self::Param, grad: &[f32]);

    /// Writes the textual encoding of `param`, without the key nor the line break.
    fn write_param(&self, param: &Self::Param, out: &mut dyn Write) -> io::Result<()>;
}

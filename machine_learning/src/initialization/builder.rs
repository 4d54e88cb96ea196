use comms::specs::server::ParamGenSpec;
use rand::{SeedableRng, rngs::StdRng};

use super::{ConstParamGen, ParamGen, RandParamGen, Result};

/// Builds a `ParamGen` following a spec.
///
/// # Arguments
/// * `spec` - The specification of the generator.
/// * `seed` - An optional seed for the random generators.
///
/// # Returns
/// A boxed generator or a `RandErr` if the distribution parameters are invalid.
pub fn build_param_gen(spec: ParamGenSpec, seed: Option<u64>) -> Result<Box<dyn ParamGen + Send>> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let param_gen: Box<dyn ParamGen + Send> = match spec {
        ParamGenSpec::Const { value } => Box::new(ConstParamGen::new(value)),
        ParamGenSpec::Uniform { low, high } => Box::new(RandParamGen::uniform(rng, low, high)?),
        ParamGenSpec::Normal { mean, std_dev } => {
            Box::new(RandParamGen::normal(rng, mean, std_dev)?)
        }
    };

    Ok(param_gen)
}

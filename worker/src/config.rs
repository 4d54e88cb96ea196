use std::{
    error::Error,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use comms::specs::{
    machine_learning::{LinearSpec, ModelSpec, Word2VecSpec},
    server::{ParamGenSpec, ServerSpec},
    worker::WorkerSpec,
};
use machine_learning::{
    ParamAccess,
    initialization::{self, RandErr},
    models::{LinearAccess, Word2VecAccess},
};
use serde::{Deserialize, Serialize};

/// Failures loading or validating a `TrainConfig`, all of them are raised before
/// touching any training data.
#[derive(Debug)]
pub enum ConfigErr {
    Read { path: PathBuf, source: io::Error },
    Parse(serde_json::Error),
    Invalid { field: &'static str, reason: String },
}

impl ConfigErr {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::Read { path, source } => {
                write!(f, "couldn't read {}: {source}", path.display())
            }
            ConfigErr::Parse(e) => write!(f, "malformed configuration: {e}"),
            ConfigErr::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigErr::Read { source, .. } => Some(source),
            ConfigErr::Parse(e) => Some(e),
            ConfigErr::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<RandErr> for ConfigErr {
    fn from(value: RandErr) -> Self {
        Self::invalid("server.init", value.to_string())
    }
}

/// Everything a training process needs to know, shared by workers and servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub worker: WorkerSpec,
    pub server: ServerSpec,
    pub model: ModelSpec,
}

impl TrainConfig {
    /// Reads and validates a JSON configuration file.
    ///
    /// # Arguments
    /// * `path` - The path of the configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigErr> {
        let text = fs::read_to_string(path).map_err(|source| ConfigErr::Read {
            path: path.to_path_buf(),
            source,
        })?;

        text.parse()
    }

    /// Checks the numeric fields the types can't express.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        let lr = self.server.learning_rate;
        if !(lr.is_finite() && lr > 0.0) {
            return Err(ConfigErr::invalid(
                "server.learning_rate",
                format!("must be a positive number, got {lr}"),
            ));
        }

        match self.model {
            ModelSpec::Linear(LinearSpec { .. }) => {
                let access = LinearAccess::new(lr);
                self.check_init(access.default_init())?;
            }
            ModelSpec::Word2vec(spec) => {
                Self::check_word2vec(&spec)?;
                let access = Word2VecAccess::new(spec.dim, lr, spec.update_target);
                self.check_init(access.default_init())?;
            }
        }

        Ok(())
    }

    fn check_word2vec(spec: &Word2VecSpec) -> Result<(), ConfigErr> {
        if spec.dim == 0 {
            return Err(ConfigErr::invalid("model.word2vec.dim", "must be positive"));
        }
        if spec.window == 0 {
            return Err(ConfigErr::invalid("model.word2vec.window", "must be positive"));
        }
        if spec.table_size == 0 {
            return Err(ConfigErr::invalid("model.word2vec.table_size", "must be positive"));
        }

        let alpha = spec.learning_rate;
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(ConfigErr::invalid(
                "model.word2vec.learning_rate",
                format!("must be a positive number, got {alpha}"),
            ));
        }

        Ok(())
    }

    /// Builds the initialization generator once so a bad distribution is reported now.
    fn check_init(&self, default: ParamGenSpec) -> Result<(), ConfigErr> {
        let init = self.server.init.unwrap_or(default);
        initialization::build_param_gen(init, Some(0))?;
        Ok(())
    }
}

impl std::str::FromStr for TrainConfig {
    type Err = ConfigErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: TrainConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

use crate::cli::LaunchArgs;
use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub struct DefaultsConfig {
    pub engine: String,
    pub scratch_root: PathBuf,
    pub submit_interval_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            engine: "UAMMDlauncher".to_string(),
            scratch_root: PathBuf::from("/scratch"),
            submit_interval_ms: 1000,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialEngineConfig {
    binary: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialLsfConfig {
    #[serde(rename = "scratch-root")]
    scratch_root: Option<PathBuf>,
    queue: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSlurmConfig {
    gres: Option<String>,
    modules: Option<Vec<String>>,
    #[serde(rename = "post-script")]
    post_script: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSubmitConfig {
    #[serde(rename = "interval-ms")]
    interval_ms: Option<u64>,
}

/// The launcher configuration file; every key is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialLaunchConfig {
    engine: Option<PartialEngineConfig>,
    lsf: Option<PartialLsfConfig>,
    slurm: Option<PartialSlurmConfig>,
    submit: Option<PartialSubmitConfig>,
}

/// Which backend a launch targets, with its backend-specific arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Local {
        gpus: Vec<usize>,
    },
    Lsf {
        nodes: Vec<String>,
        queue: Option<String>,
        scratch_root: PathBuf,
        user: String,
    },
    Slurm {
        partitions: Vec<String>,
        nodes: Vec<String>,
        fillings: Vec<usize>,
        modules: Vec<String>,
        gres: Option<String>,
    },
}

/// Fully resolved launch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchConfig {
    pub engine: String,
    pub backend: BackendConfig,
    pub post_script: Option<String>,
    pub submit_interval: Duration,
}

impl PartialLaunchConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading launcher configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolves the final settings: CLI flags win over the file, the file
    /// wins over built-in defaults. `user` feeds the LSF scratch path.
    pub fn merge_with_cli(self, args: &LaunchArgs, user: Option<String>) -> Result<LaunchConfig> {
        let defaults = DefaultsConfig::default();
        let engine_config = self.engine.unwrap_or_default();
        let lsf_config = self.lsf.unwrap_or_default();
        let slurm_config = self.slurm.unwrap_or_default();
        let submit_config = self.submit.unwrap_or_default();

        let engine = args
            .engine
            .clone()
            .or(engine_config.binary)
            .unwrap_or(defaults.engine);
        let post_script = args.post_script.clone().or(slurm_config.post_script);
        let submit_interval = Duration::from_millis(
            submit_config
                .interval_ms
                .unwrap_or(defaults.submit_interval_ms),
        );

        let selector = args.backend;
        let backend = if selector.liquid {
            if args.node.is_empty() {
                return Err(CliError::Argument("--liquid requires at least one --node".to_string()));
            }
            let user = user.ok_or_else(|| {
                CliError::Config("USER must be set to form the scratch path of the LSF backend".to_string())
            })?;
            BackendConfig::Lsf {
                nodes: args.node.clone(),
                queue: lsf_config.queue,
                scratch_root: lsf_config.scratch_root.unwrap_or(defaults.scratch_root),
                user,
            }
        } else if selector.slurm {
            if args.partition.is_empty() {
                return Err(CliError::Argument("--slurm requires at least one --partition".to_string()));
            }
            if !args.filling.is_empty() && args.filling.len() != args.node.len() {
                return Err(CliError::Argument(format!(
                    "--filling has {} value(s) but --node has {}",
                    args.filling.len(),
                    args.node.len()
                )));
            }
            let modules = if args.modules.is_empty() {
                slurm_config.modules.unwrap_or_default()
            } else {
                args.modules.clone()
            };
            BackendConfig::Slurm {
                partitions: args.partition.clone(),
                nodes: args.node.clone(),
                fillings: args.filling.clone(),
                modules,
                gres: slurm_config.gres,
            }
        } else {
            if args.gpu.is_empty() {
                return Err(CliError::Argument("the local backend requires at least one --gpu".to_string()));
            }
            BackendConfig::Local {
                gpus: args.gpu.clone(),
            }
        };

        Ok(LaunchConfig {
            engine,
            backend,
            post_script,
            submit_interval,
        })
    }
}

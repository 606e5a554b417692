use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given. Its absence is fine.
pub const DEFAULT_CONFIG_FILE: &str = "startifact.yaml";

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum BackendConfig {
    /// One directory per region under `base_dir`.
    Filesystem { base_dir: PathBuf },
    /// In-process stores. Nothing survives the invocation.
    Memory,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Filesystem {
            base_dir: ".startifact".into(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
    /// Regions worked on at once during a fan-out.
    pub concurrency: Option<usize>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Loads `path`, or the default file if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Config::default()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

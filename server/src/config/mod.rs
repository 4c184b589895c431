mod chain;
mod listener;
mod server;

use std::{
    collections::BTreeMap,
    fs::File,
    io,
    io::{ErrorKind as IoErrorKind, Write},
    path::PathBuf,
};

pub(crate) use chain::ChainConfig;
use clap::{Arg, ArgAction, Command};
use cryptonote_listener::ChainRpcConfig;
use dotenv::dotenv;
use hyper::Uri;
pub(crate) use listener::ListenerConfig;
use log::{info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use serde_yaml::Error as YamlError;
pub(crate) use server::ServerConfig;
use thiserror::Error;

/// Server configuration.
#[derive(Deserialize, PartialEq, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Config for the HTTP API.
    pub server: ServerConfig,
    /// Daemon and wallet of each chain, keyed by crypto code.
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
    /// Payment listener timing.
    #[serde(default)]
    pub listener: ListenerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default configuration file path.
    pub const DEFAULT_PATH: &'static str = "cryptonote-listener.yaml";

    /// Get config file path from CLI argument, env variable, or default (in
    /// that order).
    #[must_use]
    pub fn get_path() -> PathBuf {
        let cli_matches = Command::new("cryptonote-listener-server")
            .arg(
                Arg::new("config-file")
                    .short('f')
                    .long("config-file")
                    .action(ArgAction::Set)
                    .value_name("FILE")
                    .env("CONFIG_FILE")
                    .default_value(Self::DEFAULT_PATH)
                    .help("Specifies the config file to use. Defaults to ./cryptonote-listener.yaml"),
            )
            .get_matches();

        cli_matches
            .get_one::<String>("config-file")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_PATH), PathBuf::from)
    }

    /// Creates config from file. If the file is not found, creates it
    /// and populates it from defaults.
    fn from_file(path: &PathBuf) -> Result<Config, ConfigError> {
        let config_file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                info!(
                    "Config file {} not found. Creating it from defaults.",
                    path.display()
                );
                let mut f = File::create(path)?;
                let config = Config::default();
                f.write_all(serde_yaml::to_string(&config)?.as_bytes())?;
                return Ok(config);
            }
            Err(e) => return Err(e)?,
        };

        Ok(serde_yaml::from_reader(config_file)?)
    }

    fn apply_env_overrides(mut self) -> Result<Config, ConfigError> {
        // Read from dotenv file if real environment variables are not set.
        dotenv().ok();

        self.chains = self
            .chains
            .into_iter()
            .map(|(code, chain)| {
                let chain = chain.apply_env_overrides(&code)?;
                Ok((code, chain))
            })
            .collect::<Result<_, ConfigError>>()?;

        Ok(self)
    }

    /// Validates configuration, panicking if it is invalid.
    pub fn validate(&self) {
        for (code, chain) in &self.chains {
            chain.validate(code);
        }
        self.listener.validate();
    }

    /// Chains with both a daemon and a wallet configured. Incomplete chains
    /// are logged and left out.
    pub(crate) fn enabled_chains(&self) -> BTreeMap<String, ChainRpcConfig> {
        self.chains
            .iter()
            .filter_map(|(code, chain)| {
                let rpc_config = chain.rpc_config();
                if rpc_config.is_none() {
                    warn!("{code} needs both a daemon-uri and a wallet-uri. Disabling it.");
                }
                rpc_config.map(|config| (code.to_uppercase(), config))
            })
            .collect()
    }

    /// Read config and apply environment overrides.
    pub(crate) fn read(path: &PathBuf) -> Result<Config, ConfigError> {
        Self::from_file(path)?.apply_env_overrides()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            chains: BTreeMap::from([(
                "ZANO".to_string(),
                ChainConfig {
                    daemon_uri: Some(Uri::from_static("http://127.0.0.1:11211")),
                    wallet_uri: Some(Uri::from_static("http://127.0.0.1:11212")),
                    login: None,
                },
            )]),
            listener: ListenerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Verbosity of the server and the listener library.
#[derive(Deserialize, PartialEq, Eq, Clone, Copy, Debug, Serialize)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub verbosity: LevelFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbosity: LevelFilter::Info,
        }
    }
}

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("Failed to read config value from environment: {0}")]
    Env(#[from] std::env::VarError),
    #[error("Failed to read/write config file: {0}")]
    Io(#[from] io::Error),
    #[error("Error (de)serializing config file: {0}")]
    Yaml(#[from] YamlError),
}

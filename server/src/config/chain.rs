use std::{env, env::VarError};

use cryptonote_listener::ChainRpcConfig;
use hyper::Uri;
use log::warn;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use super::ConfigError;

/// Daemon and wallet of one chain.
#[serde_as]
#[derive(Deserialize, PartialEq, Debug, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// URL of the chain daemon's JSON-RPC server.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_uri: Option<Uri>,
    /// URL of the wallet's JSON-RPC server.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_uri: Option<Uri>,
    /// Login credentials sent to both daemon and wallet, if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginConfig>,
}

impl ChainConfig {
    /// Whether both the daemon and the wallet are configured.
    pub(crate) fn is_complete(&self) -> bool {
        self.daemon_uri.is_some() && self.wallet_uri.is_some()
    }

    /// The library's view of this chain, or `None` if it is incomplete.
    pub(crate) fn rpc_config(&self) -> Option<ChainRpcConfig> {
        let (Some(daemon), Some(wallet)) = (&self.daemon_uri, &self.wallet_uri) else {
            return None;
        };
        let config = ChainRpcConfig::new(daemon.to_string(), wallet.to_string());
        Some(match &self.login {
            Some(login) => config.login(
                login.username.clone(),
                login
                    .password
                    .as_ref()
                    .map(|pass| pass.expose_secret().clone())
                    .unwrap_or_default(),
            ),
            None => config,
        })
    }

    pub(super) fn apply_env_overrides(mut self, crypto_code: &str) -> Result<Self, ConfigError> {
        let variable = password_variable(crypto_code);
        match env::var(&variable) {
            Ok(password) => {
                if let Some(login) = self.login.as_mut() {
                    login.password = Some(Secret::new(password));
                } else {
                    warn!("Environment variable {variable} was set, but no username was found in the configuration file");
                }
            }
            Err(VarError::NotPresent) => {}
            Err(e) => return Err(e)?,
        }
        Ok(self)
    }

    pub(super) fn validate(&self, crypto_code: &str) {
        if let Some(login) = self.login.as_ref() {
            assert!(
                login.password.is_some(),
                "{crypto_code} login exists in config, but a password was not set. For best security, set it using the {} environment variable.",
                password_variable(crypto_code)
            );
        }
    }
}

/// Name of the environment variable holding the password of `crypto_code`.
pub(crate) fn password_variable(crypto_code: &str) -> String {
    format!("{}_DAEMON_PASSWORD", crypto_code.to_uppercase())
}

/// Username and password of a daemon and wallet.
#[derive(Deserialize, Debug, Serialize)]
pub struct LoginConfig {
    pub username: String,
    /// Login password. For best security, this should be set via the
    /// `<CODE>_DAEMON_PASSWORD` environment variable.
    #[serde(skip_serializing)]
    pub password: Option<Secret<String>>,
}

impl PartialEq for LoginConfig {
    fn eq(&self, other: &Self) -> bool {
        let usernames_match = self.username == other.username;
        let passwords_match = match (self.password.as_ref(), other.password.as_ref()) {
            (Some(password), Some(other_password)) => {
                password.expose_secret() == other_password.expose_secret()
            }
            (None, None) => true,
            _ => false,
        };

        usernames_match && passwords_match
    }
}

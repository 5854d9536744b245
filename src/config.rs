use std::fmt;

use thiserror::Error;

pub const BOT_TOKEN_VAR: &str = "BOT_TOKEN";
pub const METRICS_PORT_VAR: &str = "METRICS_PORT";
pub const DEFAULT_METRICS_PORT: u16 = 9876;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    #[error("failed to read .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

/// Bot API token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: SecretToken,
    pub metrics_port: u16,
}

/// Load `.env` from the working directory into the process environment.
///
/// A missing file is fine; variables already set in the environment are not
/// overridden.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup(BOT_TOKEN_VAR)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(SecretToken::new)
            .ok_or(ConfigError::MissingVar(BOT_TOKEN_VAR))?;

        let metrics_port = match lookup(METRICS_PORT_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidVar {
                    name: METRICS_PORT_VAR,
                    reason: format!("{raw:?} is not a port number ({e})"),
                })?,
            None => DEFAULT_METRICS_PORT,
        };

        Ok(Self {
            bot_token,
            metrics_port,
        })
    }
}

//! Process configuration: the command line and the environment.
//!
//! The command line carries one optional positional argument, the listen
//! address. Everything else comes from the environment, optionally seeded
//! from a `.env` file in the working directory.

use std::fmt;
use std::net::SocketAddr;

use clap::Parser;
use tracing::{debug, warn};

use crate::error::Error;

pub const DEFAULT_LISTEN_ADDR: &str = ":8080";
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

const KEY_VAR: &str = "BINANCE_KEY";
const SECRET_VAR: &str = "BINANCE_SECRET";
const BASE_URL_VAR: &str = "BINANCE_BASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is missing or empty")]
    Missing(&'static str),
}

/// Command line of the `exgate` binary.
#[derive(Debug, Parser)]
#[command(name = "exgate", version, about = "Local HTTP gateway to the Binance spot API")]
pub struct Cli {
    /// Address to listen on, e.g. `:8080` or `127.0.0.1:9000`.
    #[arg(default_value = DEFAULT_LISTEN_ADDR)]
    pub addr: String,
}

/// Resolves a listen address.
///
/// A leading `:` means every IPv4 interface, so `:8080` becomes
/// `0.0.0.0:8080`. Host names are resolved on tokio's blocking pool and the
/// first address wins.
pub async fn listen_addr(addr: &str) -> Result<SocketAddr, Error> {
    let normalized = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_owned(),
    };
    if let Ok(literal) = normalized.parse() {
        return Ok(literal);
    }
    tokio::net::lookup_host(normalized.as_str())
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| Error::InvalidAddress(addr.to_owned()))
}

/// Loads `.env` from the working directory when one exists.
///
/// A missing file is the normal case in deployment. A malformed one is
/// reported and otherwise ignored: the real environment still applies.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("ignoring .env: {e}"),
    }
}

/// Exchange API credentials.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

impl Credentials {
    /// Reads `BINANCE_KEY`, `BINANCE_SECRET` and the optional
    /// `BINANCE_BASE_URL` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        Ok(Self {
            api_key: required(KEY_VAR)?,
            api_secret: required(SECRET_VAR)?,
            base_url: lookup(BASE_URL_VAR)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
        })
    }
}

// Keep the secret out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TOKEN_SECRET` | Secret the token signing key is derived from | Required |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `1800` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token and session lifetime | `2592000` |
//! | `ROLE_CACHE_TTL_SECS` | How long cached roles are trusted | `60` |
//! | `ROLE_CACHE_CAPACITY` | Users kept in the role cache | `20` |
//! | `REQUEST_TIMEOUT_SECS` | Per-request timeout | `30` |
//! | `DATA_DIR` | Directory holding the auth database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `BOOTSTRAP_ADMIN_USER_ID` | User granted `admin` at startup | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::role_cache::{DEFAULT_ROLE_CAPACITY, DEFAULT_ROLE_TTL};
use crate::auth::tokens::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL};

pub const TOKEN_SECRET_ENV: &str = "TOKEN_SECRET";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const ROLE_CACHE_TTL_ENV: &str = "ROLE_CACHE_TTL_SECS";
pub const ROLE_CACHE_CAPACITY_ENV: &str = "ROLE_CACHE_CAPACITY";
pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT_SECS";

/// Environment variable name for the data directory path.
///
/// The auth database (`auth.redb`) is created inside it.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const BOOTSTRAP_ADMIN_ENV: &str = "BOOTSTRAP_ADMIN_USER_ID";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Server version reported by `/version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub role_cache_ttl: Duration,
    pub role_cache_capacity: usize,
    pub request_timeout: Duration,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub bootstrap_admin: Option<String>,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    ///
    /// Unset and empty variables take their defaults; set but unparseable
    /// ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let token_secret = get(TOKEN_SECRET_ENV).ok_or(ConfigError::Missing(TOKEN_SECRET_ENV))?;

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                value,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            token_secret,
            access_token_ttl: seconds(&get, ACCESS_TOKEN_TTL_ENV, DEFAULT_ACCESS_TTL)?,
            refresh_token_ttl: seconds(&get, REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TTL)?,
            role_cache_ttl: seconds(&get, ROLE_CACHE_TTL_ENV, DEFAULT_ROLE_TTL)?,
            role_cache_capacity: parsed(&get, ROLE_CACHE_CAPACITY_ENV, DEFAULT_ROLE_CAPACITY)?,
            request_timeout: seconds(&get, REQUEST_TIMEOUT_ENV, DEFAULT_REQUEST_TIMEOUT)?,
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&get, PORT_ENV, 8080)?,
            bootstrap_admin: get(BOOTSTRAP_ADMIN_ENV),
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("auth.redb")
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("token_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("role_cache_ttl", &self.role_cache_ttl)
            .field("role_cache_capacity", &self.role_cache_capacity)
            .field("request_timeout", &self.request_timeout)
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn parsed<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// A whole number of seconds. Zero is rejected.
fn seconds(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: u64 = parsed(get, name, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::gate::GateSettings;
use crate::resolver::{DEFAULT_FALLBACK_WINDOW, DEFAULT_PRIMARY_WINDOW, SearchWindows};

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_NETWORK: &str = "NETWORK";
pub const ENV_DEFAULT_RECIPIENT: &str = "DEFAULT_RECIPIENT_WALLET";
pub const ENV_CURRENCY: &str = "CURRENCY";
pub const ENV_PREMIUM_PRICE: &str = "PREMIUM_PRICE";

pub const ENV_LIGHT_CLIENT_URL: &str = "LIGHT_CLIENT_URL";
pub const ENV_LIGHT_CLIENT_TIMEOUT_SECS: &str = "LIGHT_CLIENT_TIMEOUT_SECS";
pub const ENV_LIGHT_CLIENT_SERIALIZE: &str = "LIGHT_CLIENT_SERIALIZE";

pub const ENV_TX_SEARCH_BLOCKS: &str = "TX_SEARCH_BLOCKS";
pub const ENV_TX_SEARCH_FALLBACK_BLOCKS: &str = "TX_SEARCH_FALLBACK_BLOCKS";
pub const ENV_VERIFY_DEADLINE_SECS: &str = "VERIFY_DEADLINE_SECS";

const DEFAULT_PORT: u16 = 5402;
const DEFAULT_NETWORK: &str = "paseo";
const DEFAULT_RECIPIENT: &str = "1RPK4brFegTGGKHFpjZ7jxZ3jiwCMyihhMFQomyzHAJfcUV";
const DEFAULT_CURRENCY: &str = "PAS";
const DEFAULT_PREMIUM_PRICE: u128 = 1_000_000_000;
const DEFAULT_LIGHT_CLIENT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_VERIFY_DEADLINE_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("env {0} not set")]
    Missing(&'static str),
    #[error("env {key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the server needs, read once at start-up.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub host: IpAddr,
    pub port: u16,
    pub light_client_url: Url,
    pub light_client_timeout: Duration,
    pub serialize_light_client: bool,
    pub gate: GateSettings,
}

impl GateConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Only `LIGHT_CLIENT_URL` is required; every other variable has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let light_client_url = match env::var(ENV_LIGHT_CLIENT_URL) {
            Ok(raw) if !raw.trim().is_empty() => {
                Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
                    key: ENV_LIGHT_CLIENT_URL,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?
            }
            _ => return Err(ConfigError::Missing(ENV_LIGHT_CLIENT_URL)),
        };

        let gate = GateSettings {
            network: string_or(ENV_NETWORK, DEFAULT_NETWORK),
            currency: string_or(ENV_CURRENCY, DEFAULT_CURRENCY),
            default_recipient: string_or(ENV_DEFAULT_RECIPIENT, DEFAULT_RECIPIENT),
            premium_price: parse_or(ENV_PREMIUM_PRICE, DEFAULT_PREMIUM_PRICE)?,
            deadline: Duration::from_secs(parse_or(
                ENV_VERIFY_DEADLINE_SECS,
                DEFAULT_VERIFY_DEADLINE_SECS,
            )?),
            windows: SearchWindows {
                primary: parse_or(ENV_TX_SEARCH_BLOCKS, DEFAULT_PRIMARY_WINDOW)?,
                fallback: parse_or(ENV_TX_SEARCH_FALLBACK_BLOCKS, DEFAULT_FALLBACK_WINDOW)?,
            },
        };

        Ok(Self {
            host: parse_or(ENV_HOST, IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            port: parse_or(ENV_PORT, DEFAULT_PORT)?,
            light_client_url,
            light_client_timeout: Duration::from_secs(parse_or(
                ENV_LIGHT_CLIENT_TIMEOUT_SECS,
                DEFAULT_LIGHT_CLIENT_TIMEOUT_SECS,
            )?),
            serialize_light_client: parse_flag(ENV_LIGHT_CLIENT_SERIALIZE)?,
            gate,
        })
    }
}

fn string_or(key: &'static str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

fn parse_flag(key: &'static str) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            _ => Err(ConfigError::Invalid {
                key,
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        },
        Err(_) => Ok(false),
    }
}

//! Environment-backed runtime configuration for `chatlink-console`.

use std::{env, error::Error, fmt, time::Duration};

use chatlink_core::{ChannelConfig, ChannelKind, ChannelTarget, ReconnectPolicy};

/// Runtime configuration used by the console app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Endpoint(s) of the channel to open.
    pub target: ChannelTarget,
    /// Channel tuning forwarded to the runtime.
    pub channel: ChannelConfig,
}

impl ConsoleConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let kind = match optional_trimmed_env("CHATLINK_TRANSPORT", &mut lookup) {
            None => ChannelKind::Poll,
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CHATLINK_TRANSPORT",
                value,
                reason: "expected one of stream, poll, dual".to_owned(),
            })?,
        };
        let mock = parse_flag("CHATLINK_MOCK", &mut lookup)?;

        let mut channel = ChannelConfig::default().with_mock(mock);
        if let Some(interval) = parse_optional_ms("CHATLINK_POLLING_INTERVAL_MS", &mut lookup)? {
            channel = channel.with_polling_interval(interval);
        }
        if let Some(interval) = parse_optional_ms("CHATLINK_RECONNECT_INTERVAL_MS", &mut lookup)? {
            channel = channel.with_reconnect_interval(interval);
        }
        if let Some(interval) = parse_optional_ms("CHATLINK_HEARTBEAT_INTERVAL_MS", &mut lookup)? {
            channel = channel.with_heartbeat_interval(interval);
        }
        if let Some(timeout) = parse_optional_ms("CHATLINK_REQUEST_TIMEOUT_MS", &mut lookup)? {
            channel = channel.with_request_timeout(timeout);
        }
        if let Some(cooldown) = parse_optional_ms("CHATLINK_RESPONSE_COOLDOWN_MS", &mut lookup)? {
            channel = channel.with_response_cooldown(cooldown);
        }
        if let Some(max) = parse_optional_ms("CHATLINK_RECONNECT_MAX_MS", &mut lookup)? {
            let base = channel.reconnect_interval.as_millis() as u64;
            channel = channel
                .with_reconnect_policy(ReconnectPolicy::exponential(base, max.as_millis() as u64));
        }

        // The scripted fixture never dials out, so endpoints are optional there.
        let mut endpoint = |key: &'static str| match optional_trimmed_env(key, &mut lookup) {
            Some(url) => Ok(url),
            None if mock => Ok(String::new()),
            None => Err(ConfigError::Missing { key }),
        };
        let target = match kind {
            ChannelKind::Stream => ChannelTarget::Stream {
                url: endpoint("CHATLINK_URL")?,
            },
            ChannelKind::Poll => ChannelTarget::Poll {
                url: endpoint("CHATLINK_URL")?,
            },
            ChannelKind::Dual => ChannelTarget::Dual {
                send_url: endpoint("CHATLINK_SEND_URL")?,
                receive_url: endpoint("CHATLINK_RECEIVE_URL")?,
            },
        };

        Ok(Self { target, channel })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// A required environment variable is not set.
    Missing { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
            Self::Missing { key } => write!(f, "{key} must be set"),
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_ms<F>(key: &'static str, lookup: &mut F) -> Result<Option<Duration>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    let millis = value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value: value.clone(),
            reason: err.to_string(),
        })?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(Some(Duration::from_millis(millis)))
}

fn parse_flag<F>(key: &'static str, lookup: &mut F) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected 1/true/yes or 0/false/no".to_owned(),
        }),
    }
}

use std::{fmt, str::FromStr, time::Duration};

use crate::retry::ReconnectPolicy;

const DEFAULT_POLLING_INTERVAL_MS: u64 = 3_000;
const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RESPONSE_COOLDOWN_MS: u64 = 1_000;
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Per-channel tuning. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub polling_interval: Duration,
    pub reconnect_interval: Duration,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
    /// Poll cycles skipped after a dual-endpoint response carried a message.
    pub response_cooldown: Duration,
    /// Replace the transport with the scripted demo fixture.
    pub mock: bool,
    /// Overrides the fixed `reconnect_interval` delay when set.
    pub reconnect_policy: Option<ReconnectPolicy>,
    /// Broadcast capacity for [`crate::types::ChannelEvent`]s.
    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_millis(DEFAULT_POLLING_INTERVAL_MS),
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            response_cooldown: Duration::from_millis(DEFAULT_RESPONSE_COOLDOWN_MS),
            mock: false,
            reconnect_policy: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ChannelConfig {
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_response_cooldown(mut self, cooldown: Duration) -> Self {
        self.response_cooldown = cooldown;
        self
    }

    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = Some(policy);
        self
    }

    /// Effective reconnect policy.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.reconnect_policy.unwrap_or_else(|| {
            ReconnectPolicy::fixed(duration_millis(self.reconnect_interval))
        })
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Transport strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Stream,
    Poll,
    Dual,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Poll => "poll",
            Self::Dual => "dual",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a transport name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport '{0}', expected stream, poll or dual")]
pub struct UnknownChannelKind(pub String);

impl FromStr for ChannelKind {
    type Err = UnknownChannelKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stream" | "ws" | "websocket" => Ok(Self::Stream),
            "poll" | "polling" => Ok(Self::Poll),
            "dual" => Ok(Self::Dual),
            _ => Err(UnknownChannelKind(value.to_owned())),
        }
    }
}

/// Backend endpoint(s) a channel talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    Stream { url: String },
    Poll { url: String },
    Dual { send_url: String, receive_url: String },
}

impl ChannelTarget {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Stream { .. } => ChannelKind::Stream,
            Self::Poll { .. } => ChannelKind::Poll,
            Self::Dual { .. } => ChannelKind::Dual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ChannelConfig::default();
        assert_eq!(config.polling_interval, Duration::from_millis(3_000));
        assert_eq!(config.reconnect_interval, Duration::from_millis(5_000));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(30_000));
        assert_eq!(config.request_timeout, Duration::from_millis(10_000));
        assert_eq!(config.response_cooldown, Duration::from_millis(1_000));
        assert!(!config.mock);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn reconnect_policy_follows_reconnect_interval() {
        let config =
            ChannelConfig::default().with_reconnect_interval(Duration::from_millis(1_500));
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::fixed(1_500));

        let config = config.with_reconnect_policy(ReconnectPolicy::exponential(100, 800));
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy::exponential(100, 800)
        );
    }

    #[test]
    fn parses_channel_kinds() {
        assert_eq!("Poll".parse::<ChannelKind>(), Ok(ChannelKind::Poll));
        assert_eq!(" websocket ".parse::<ChannelKind>(), Ok(ChannelKind::Stream));
        assert_eq!("dual".parse::<ChannelKind>(), Ok(ChannelKind::Dual));
        assert!("carrier-pigeon".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn target_reports_kind() {
        let target = ChannelTarget::Dual {
            send_url: "http://localhost/send".into(),
            receive_url: "http://localhost/receive".into(),
        };
        assert_eq!(target.kind(), ChannelKind::Dual);
        assert_eq!(target.kind().to_string(), "dual");
    }
}

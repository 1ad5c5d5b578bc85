//! Tokio runtime for resilient conversation channels.
//!
//! Every channel runs as one task owning its state machine, conversation
//! buffer and timers. Callers talk to it through a cloneable
//! [`ChannelHandle`]: commands go in over `mpsc`, status and conversation
//! snapshots come out over `watch`, and incremental changes over `broadcast`.
//!
//! Four strategies sit behind the same handle:
//! - stream: one WebSocket with a heartbeat,
//! - poll: periodic GET plus POST on one URL,
//! - dual: periodic GET on one URL, POST on another, with a response cooldown,
//! - scripted: a timed fixture that needs no network at all.

mod driver;
mod handle;
mod poll;
mod scripted;
mod session;
mod stream;
mod timer;
pub mod transport;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use chatlink_core::{ChannelConfig, ChannelError, ChannelErrorCategory, ChannelTarget};
use tracing::info;

pub use handle::ChannelHandle;
pub use scripted::{Script, ScriptAction, ScriptStep, ScriptedReply};
pub use transport::{HttpTransport, ReqwestTransport, SocketConnector, TungsteniteConnector};

use crate::{
    poll::{PollEndpoints, PollStrategy},
    scripted::ScriptedStrategy,
    stream::StreamStrategy,
};

/// Spawn the channel described by `target`.
///
/// With `config.mock` set the transport is replaced by the scripted demo
/// matching the target's kind and no endpoint is contacted.
pub fn spawn_channel(
    target: ChannelTarget,
    config: ChannelConfig,
) -> Result<ChannelHandle, ChannelError> {
    if config.mock {
        info!(kind = %target.kind(), "using scripted channel");
        return Ok(spawn_scripted_channel(Script::for_kind(target.kind()), config));
    }

    match target {
        ChannelTarget::Stream { url } => Ok(spawn_stream_channel(url, config)),
        ChannelTarget::Poll { url } => spawn_poll_channel(url, config),
        ChannelTarget::Dual {
            send_url,
            receive_url,
        } => spawn_dual_channel(send_url, receive_url, config),
    }
}

/// WebSocket channel over tokio-tungstenite.
pub fn spawn_stream_channel(url: impl Into<String>, config: ChannelConfig) -> ChannelHandle {
    let connector = Arc::new(TungsteniteConnector::new(config.request_timeout));
    spawn_stream_channel_with(url, config, connector)
}

pub fn spawn_stream_channel_with(
    url: impl Into<String>,
    config: ChannelConfig,
    connector: Arc<dyn SocketConnector>,
) -> ChannelHandle {
    driver::spawn(StreamStrategy::new(url, connector), config)
}

/// Single-endpoint polling channel over reqwest.
pub fn spawn_poll_channel(
    url: impl Into<String>,
    config: ChannelConfig,
) -> Result<ChannelHandle, ChannelError> {
    Ok(spawn_poll_channel_with(url, config, http_transport()?))
}

pub fn spawn_poll_channel_with(
    url: impl Into<String>,
    config: ChannelConfig,
    http: Arc<dyn HttpTransport>,
) -> ChannelHandle {
    let endpoints = PollEndpoints::Single { url: url.into() };
    driver::spawn(PollStrategy::new(endpoints, http), config)
}

/// Dual-endpoint channel: POST to `send_url`, poll `receive_url`.
pub fn spawn_dual_channel(
    send_url: impl Into<String>,
    receive_url: impl Into<String>,
    config: ChannelConfig,
) -> Result<ChannelHandle, ChannelError> {
    Ok(spawn_dual_channel_with(
        send_url,
        receive_url,
        config,
        http_transport()?,
    ))
}

pub fn spawn_dual_channel_with(
    send_url: impl Into<String>,
    receive_url: impl Into<String>,
    config: ChannelConfig,
    http: Arc<dyn HttpTransport>,
) -> ChannelHandle {
    let endpoints = PollEndpoints::Dual {
        send_url: send_url.into(),
        receive_url: receive_url.into(),
    };
    driver::spawn(PollStrategy::new(endpoints, http), config)
}

/// Channel that plays `script` after every start.
pub fn spawn_scripted_channel(script: Script, config: ChannelConfig) -> ChannelHandle {
    driver::spawn(ScriptedStrategy::new(script), config)
}

fn http_transport() -> Result<Arc<dyn HttpTransport>, ChannelError> {
    let transport = ReqwestTransport::new().map_err(|err| {
        ChannelError::new(
            ChannelErrorCategory::Config,
            "http_client_init_failed",
            err.to_string(),
        )
    })?;
    Ok(Arc::new(transport))
}

use std::time::Duration;

use async_trait::async_trait;
use chatlink_core::TransportError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message as WsMessage},
};

use crate::driver::InternalEvent;

/// Lifecycle and data events produced by a socket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    /// One inbound text frame.
    Message(String),
    Closed(Option<String>),
    Error(TransportError),
}

impl SocketEvent {
    /// Route this event to the matching [`SocketHandler`] callback.
    pub fn dispatch(self, handler: &mut impl SocketHandler) {
        match self {
            Self::Open => handler.on_open(),
            Self::Message(text) => handler.on_message(text),
            Self::Closed(reason) => handler.on_close(reason),
            Self::Error(error) => handler.on_error(error),
        }
    }
}

/// One callback per socket event.
pub trait SocketHandler {
    fn on_open(&mut self);
    fn on_message(&mut self, text: String);
    fn on_close(&mut self, reason: Option<String>);
    fn on_error(&mut self, error: TransportError);
}

/// Text frame queued for the socket writer.
#[derive(Debug)]
pub struct OutgoingFrame {
    pub text: String,
    /// Resolved once the frame was written (or failed to be).
    pub ack: Option<oneshot::Sender<Result<(), TransportError>>>,
}

/// Event sink handed to a connector for one connection attempt.
#[derive(Debug, Clone)]
pub struct SocketEventSink {
    tx: mpsc::UnboundedSender<InternalEvent>,
    epoch: u64,
}

impl SocketEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<InternalEvent>, epoch: u64) -> Self {
        Self { tx, epoch }
    }

    /// Forward one event to the owning channel. Returns `false` once the
    /// channel task is gone.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.tx
            .send(InternalEvent::Socket {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// Opens and pumps one persistent socket connection.
///
/// `run` emits [`SocketEvent::Open`] and [`SocketEvent::Message`] through
/// `events` and returns when the connection ends: `Ok(reason)` for a close,
/// `Err` for a failure. The caller reports that outcome as the terminal
/// event. When every sender of `outgoing` is dropped the connector closes
/// the socket and returns.
#[async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    async fn run(
        &self,
        url: &str,
        outgoing: mpsc::Receiver<OutgoingFrame>,
        events: SocketEventSink,
    ) -> Result<Option<String>, TransportError>;
}

/// [`SocketConnector`] backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    handshake_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn run(
        &self,
        url: &str,
        mut outgoing: mpsc::Receiver<OutgoingFrame>,
        events: SocketEventSink,
    ) -> Result<Option<String>, TransportError> {
        super::parse_endpoint(url, super::WS_SCHEMES)?;
        let (stream, _response) = tokio::time::timeout(self.handshake_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(map_ws_error)?;

        if !events.emit(SocketEvent::Open) {
            return Ok(None);
        }
        let (mut sink, mut stream) = stream.split();

        loop {
            tokio::select! {
                frame = outgoing.recv() => {
                    let Some(OutgoingFrame { text, ack }) = frame else {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return Ok(None);
                    };
                    let result = sink.send(WsMessage::Text(text.into())).await.map_err(map_ws_error);
                    if let Some(ack) = ack {
                        let _ = ack.send(result.clone());
                    }
                    result?;
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        events.emit(SocketEvent::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame
                            .map(|frame| frame.reason.as_str().to_owned())
                            .filter(|reason| !reason.is_empty());
                        return Ok(reason);
                    }
                    // Binary frames are not part of the protocol; pings are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(map_ws_error(err)),
                    None => return Ok(None),
                },
            }
        }
    }
}

fn map_ws_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Url(err) => TransportError::Setup(err.to_string()),
        tungstenite::Error::HttpFormat(err) => TransportError::Setup(err.to_string()),
        tungstenite::Error::Http(response) => TransportError::Status(response.status().as_u16()),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed(None)
        }
        other => TransportError::Request(other.to_string()),
    }
}

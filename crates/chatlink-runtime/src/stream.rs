use std::sync::Arc;

use chatlink_core::{
    ChannelError, ChannelErrorCategory, IngestProfile, OutboundMessage, Reply, SendOutcome,
    StatusReason, TransportError, normalize_send_result,
};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, info, warn};

use crate::{
    driver::{InternalEvent, Strategy},
    session::Session,
    timer::TimerKind,
    transport::{
        OutgoingFrame, SocketConnector, SocketEvent, SocketEventSink, SocketHandler, WS_SCHEMES,
        parse_endpoint,
    },
};

const HEARTBEAT_FRAME: &str = r#"{"type":"heartbeat"}"#;
const OUTGOING_BUFFER: usize = 32;

struct SocketSlot {
    outgoing: mpsc::Sender<OutgoingFrame>,
    open: bool,
}

pub(crate) struct StreamStrategy {
    url: String,
    connector: Arc<dyn SocketConnector>,
    socket: Option<SocketSlot>,
}

impl StreamStrategy {
    pub(crate) fn new(url: impl Into<String>, connector: Arc<dyn SocketConnector>) -> Self {
        Self {
            url: url.into(),
            connector,
            socket: None,
        }
    }

    fn open_sender(&self) -> Option<&mpsc::Sender<OutgoingFrame>> {
        self.socket
            .as_ref()
            .filter(|socket| socket.open)
            .map(|socket| &socket.outgoing)
    }
}

/// Socket callbacks for the current connection.
struct StreamContext<'a> {
    socket: &'a mut Option<SocketSlot>,
    session: &'a mut Session,
}

impl SocketHandler for StreamContext<'_> {
    fn on_open(&mut self) {
        if let Some(socket) = self.socket.as_mut() {
            socket.open = true;
        }
        info!("socket open");
        self.session.mark_connected(StatusReason::Connected);
        let (epoch, period) = (
            self.session.connect_epoch(),
            self.session.config.heartbeat_interval,
        );
        self.session.liveness.arm_interval(epoch, period);
    }

    fn on_message(&mut self, text: String) {
        self.session.ingest(&text);
    }

    fn on_close(&mut self, reason: Option<String>) {
        info!(reason = reason.as_deref().unwrap_or(""), "socket closed");
        *self.socket = None;
        self.session.fail(StatusReason::Closed);
    }

    fn on_error(&mut self, error: TransportError) {
        warn!(%error, "socket error");
        *self.socket = None;
        let reason = match error {
            TransportError::Setup(_) => StatusReason::SetupFailed,
            _ => StatusReason::Errored,
        };
        self.session.fail(reason);
    }
}

impl Strategy for StreamStrategy {
    fn kind(&self) -> &'static str {
        "stream"
    }

    fn profile(&self) -> IngestProfile {
        IngestProfile::Stream
    }

    fn connect(&mut self, session: &mut Session) {
        self.socket = None;
        if let Err(err) = parse_endpoint(&self.url, WS_SCHEMES) {
            warn!(%err, "socket setup failed");
            session.fail(StatusReason::SetupFailed);
            return;
        }

        let (outgoing, frames) = mpsc::channel(OUTGOING_BUFFER);
        let events = SocketEventSink::new(session.internal_tx.clone(), session.connect_epoch());
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        tokio::spawn(async move {
            let terminal = match connector.run(&url, frames, events.clone()).await {
                Ok(reason) => SocketEvent::Closed(reason),
                Err(err) => SocketEvent::Error(err),
            };
            events.emit(terminal);
        });
        self.socket = Some(SocketSlot {
            outgoing,
            open: false,
        });
    }

    fn on_timer(&mut self, _session: &mut Session, kind: TimerKind, _tick: u64) {
        if kind != TimerKind::Liveness {
            return;
        }
        let Some(outgoing) = self.open_sender() else {
            return;
        };
        let frame = OutgoingFrame {
            text: HEARTBEAT_FRAME.to_owned(),
            ack: None,
        };
        if let Err(err) = outgoing.try_send(frame) {
            debug!(%err, "heartbeat not queued");
        }
    }

    fn write(&mut self, session: &mut Session, message: OutboundMessage, reply: Reply<()>) {
        let session_epoch = session.session_epoch();
        let Some(outgoing) = self.open_sender() else {
            let error = ChannelError::not_connected();
            session.finish_send(session_epoch, SendOutcome::Failed { error }, reply);
            return;
        };

        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(err) => {
                let error = ChannelError::new(
                    ChannelErrorCategory::Internal,
                    "serialize_failed",
                    err.to_string(),
                );
                session.finish_send(session_epoch, SendOutcome::Failed { error }, reply);
                return;
            }
        };

        let (ack, written) = oneshot::channel();
        match outgoing.try_send(OutgoingFrame {
            text,
            ack: Some(ack),
        }) {
            Ok(()) => {
                let tx = session.internal_tx.clone();
                tokio::spawn(async move {
                    let result = written
                        .await
                        .unwrap_or(Err(TransportError::Closed(None)));
                    let _ = tx.send(InternalEvent::SendCompleted {
                        session_epoch,
                        outcome: normalize_send_result(result),
                        reply,
                    });
                });
            }
            Err(TrySendError::Full(_)) => {
                let outcome = normalize_send_result(Err(TransportError::Request(
                    "outgoing socket queue is full".into(),
                )));
                session.finish_send(session_epoch, outcome, reply);
            }
            Err(TrySendError::Closed(_)) => {
                let error = ChannelError::not_connected();
                session.finish_send(session_epoch, SendOutcome::Failed { error }, reply);
            }
        }
    }

    fn on_socket(&mut self, session: &mut Session, event: SocketEvent) {
        let mut context = StreamContext {
            socket: &mut self.socket,
            session,
        };
        event.dispatch(&mut context);
    }

    fn close(&mut self, _session: &mut Session) {
        // Dropping the sender makes the connector close the socket.
        if self.socket.take().is_some() {
            debug!("closing socket");
        }
    }
}

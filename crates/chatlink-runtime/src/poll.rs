//! Poll and dual-endpoint strategies.
//!
//! Both share one implementation: a periodic GET that doubles as the
//! liveness timer, at most one request in flight, timeouts treated as
//! transient. The dual variant posts to a separate endpoint, only ingests
//! `200` bodies, and skips poll cycles for a cooldown after a reply.

use std::sync::Arc;

use chatlink_core::{
    ChannelError, ChannelErrorCategory, IngestProfile, OutboundMessage, Reply, SendOutcome,
    StatusReason, TransportError, normalize_dual_send_reply, normalize_send_result,
};
use tracing::{debug, warn};

use crate::{
    driver::{InternalEvent, Strategy},
    session::Session,
    timer::TimerKind,
    transport::{HTTP_SCHEMES, HttpReply, HttpTransport, parse_endpoint},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollEndpoints {
    /// GET and POST on the same URL.
    Single { url: String },
    Dual {
        send_url: String,
        receive_url: String,
    },
}

impl PollEndpoints {
    fn receive_url(&self) -> &str {
        match self {
            Self::Single { url } => url,
            Self::Dual { receive_url, .. } => receive_url,
        }
    }

    fn send_url(&self) -> &str {
        match self {
            Self::Single { url } => url,
            Self::Dual { send_url, .. } => send_url,
        }
    }

    fn is_dual(&self) -> bool {
        matches!(self, Self::Dual { .. })
    }
}

pub(crate) struct PollStrategy {
    endpoints: PollEndpoints,
    http: Arc<dyn HttpTransport>,
    in_flight: bool,
    cooling_down: bool,
}

impl PollStrategy {
    pub(crate) fn new(endpoints: PollEndpoints, http: Arc<dyn HttpTransport>) -> Self {
        Self {
            endpoints,
            http,
            in_flight: false,
            cooling_down: false,
        }
    }

    fn poll(&mut self, session: &mut Session) {
        if self.in_flight {
            debug!("poll skipped: previous request still in flight");
            return;
        }
        if self.cooling_down {
            debug!("poll skipped: response cooldown");
            return;
        }
        self.in_flight = true;

        let epoch = session.connect_epoch();
        let http = Arc::clone(&self.http);
        let url = self.endpoints.receive_url().to_owned();
        let cursor = session.cursor();
        let timeout = session.config.request_timeout;
        let tx = session.internal_tx.clone();
        tokio::spawn(async move {
            let result = http.fetch(&url, cursor.as_deref(), timeout).await;
            let _ = tx.send(InternalEvent::PollCompleted { epoch, result });
        });
    }

    fn handle_reply(&mut self, session: &mut Session, reply: HttpReply) {
        let ingestible = !self.endpoints.is_dual() || reply.status == 200;
        if ingestible {
            let report = session.ingest(reply.body.as_deref().unwrap_or_default());
            if self.endpoints.is_dual() && report.messages > 0 {
                self.cooling_down = true;
                let (epoch, cooldown) = (session.connect_epoch(), session.config.response_cooldown);
                session.aux.arm_once(epoch, cooldown);
            }
        }
        session.mark_connected(StatusReason::Connected);
    }
}

impl Strategy for PollStrategy {
    fn kind(&self) -> &'static str {
        if self.endpoints.is_dual() { "dual" } else { "poll" }
    }

    fn profile(&self) -> IngestProfile {
        if self.endpoints.is_dual() {
            IngestProfile::Dual
        } else {
            IngestProfile::Poll
        }
    }

    fn connect(&mut self, session: &mut Session) {
        self.cooling_down = false;
        let endpoints = [self.endpoints.receive_url(), self.endpoints.send_url()];
        if let Some(err) = endpoints
            .into_iter()
            .find_map(|url| parse_endpoint(url, HTTP_SCHEMES).err())
        {
            warn!(%err, "poll setup failed");
            session.fail(StatusReason::SetupFailed);
            return;
        }

        let (epoch, period) = (session.connect_epoch(), session.config.polling_interval);
        session.liveness.arm_interval(epoch, period);
        self.poll(session);
    }

    fn on_timer(&mut self, session: &mut Session, kind: TimerKind, _tick: u64) {
        match kind {
            TimerKind::Liveness => self.poll(session),
            TimerKind::Aux => {
                debug!("response cooldown over");
                self.cooling_down = false;
            }
            TimerKind::Reconnect => {}
        }
    }

    fn write(&mut self, session: &mut Session, message: OutboundMessage, reply: Reply<()>) {
        let session_epoch = session.session_epoch();
        let body = match serde_json::to_value(&message) {
            Ok(body) => body,
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

        let dual = self.endpoints.is_dual();
        let http = Arc::clone(&self.http);
        let url = self.endpoints.send_url().to_owned();
        let timeout = session.config.request_timeout;
        let tx = session.internal_tx.clone();
        tokio::spawn(async move {
            let result = http.submit(&url, &body, timeout).await;
            let outcome = match result {
                Ok(response) if dual => normalize_dual_send_reply(response.body.as_deref()),
                other => normalize_send_result(other.map(|_| ())),
            };
            let _ = tx.send(InternalEvent::SendCompleted {
                session_epoch,
                outcome,
                reply,
            });
        });
    }

    fn on_poll_completed(
        &mut self,
        session: &mut Session,
        epoch: u64,
        result: Result<HttpReply, TransportError>,
    ) {
        self.in_flight = false;
        if epoch != session.connect_epoch() {
            debug!(epoch, "discarding poll result from a previous connection");
            return;
        }

        match result {
            Ok(reply) => self.handle_reply(session, reply),
            Err(err) if err.is_transient() => {
                warn!(%err, "poll timed out, keeping timer");
                session.note_timeout();
            }
            Err(err) => {
                warn!(%err, "poll failed");
                session.fail(StatusReason::Errored);
            }
        }
    }

    fn close(&mut self, _session: &mut Session) {
        self.cooling_down = false;
    }
}

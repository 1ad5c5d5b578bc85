use chatlink_core::{
    ChannelConfig, ChannelError, ChannelEvent, ConnectionStateMachine, ConnectionStatus,
    ConversationBuffer, ConversationOp, IngestProfile, IngestReport, IngestionPipeline, Message,
    OutboundMessage, ReconnectPolicy, Reply, SendOutcome, Sender, StatusReason,
    resolve_failed_send,
};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    driver::InternalEvent,
    timer::{TimerKind, TimerSlot},
};

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Observer-facing outputs of one channel.
pub(crate) struct SessionOutputs {
    pub(crate) events: broadcast::Sender<ChannelEvent>,
    pub(crate) status: watch::Sender<ConnectionStatus>,
    pub(crate) conversation: watch::Sender<Vec<Message>>,
}

/// State shared by every strategy: lifecycle, conversation, timers, epochs.
///
/// Strategies only decide *when* to connect, poll or write; every state
/// change and every observer notification goes through here.
pub(crate) struct Session {
    pub(crate) config: ChannelConfig,
    policy: ReconnectPolicy,
    machine: ConnectionStateMachine,
    conversation: ConversationBuffer,
    pipeline: IngestionPipeline,
    pub(crate) liveness: TimerSlot,
    pub(crate) reconnect: TimerSlot,
    pub(crate) aux: TimerSlot,
    pub(crate) internal_tx: mpsc::UnboundedSender<InternalEvent>,
    outputs: SessionOutputs,
    connect_epoch: u64,
    session_epoch: u64,
    reconnect_attempt: u32,
}

impl Session {
    pub(crate) fn new(
        config: ChannelConfig,
        profile: IngestProfile,
        internal_tx: mpsc::UnboundedSender<InternalEvent>,
        outputs: SessionOutputs,
    ) -> Self {
        Self {
            policy: config.reconnect_policy(),
            config,
            machine: ConnectionStateMachine::default(),
            conversation: ConversationBuffer::new(),
            pipeline: IngestionPipeline::new(profile),
            liveness: TimerSlot::new(TimerKind::Liveness, internal_tx.clone()),
            reconnect: TimerSlot::new(TimerKind::Reconnect, internal_tx.clone()),
            aux: TimerSlot::new(TimerKind::Aux, internal_tx.clone()),
            internal_tx,
            outputs,
            connect_epoch: 0,
            session_epoch: 0,
            reconnect_attempt: 0,
        }
    }

    /// Bumped by every connection attempt and by stop. Tags poll and socket results.
    pub(crate) fn connect_epoch(&self) -> u64 {
        self.connect_epoch
    }

    /// Bumped by stop only. Tags send completions.
    pub(crate) fn session_epoch(&self) -> u64 {
        self.session_epoch
    }

    pub(crate) fn cursor(&self) -> Option<String> {
        self.pipeline.cursor().map(str::to_owned)
    }

    pub(crate) fn timer(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Liveness => &mut self.liveness,
            TimerKind::Reconnect => &mut self.reconnect,
            TimerKind::Aux => &mut self.aux,
        }
    }

    /// `Disconnected -> Connecting`. Cancels a pending reconnect and opens a new epoch.
    pub(crate) fn begin_connect(&mut self) -> Result<u64, ChannelError> {
        let event = self.machine.begin_connect()?;
        self.reconnect.disarm();
        self.connect_epoch = self.connect_epoch.wrapping_add(1);
        self.publish(Some(event));
        debug!(epoch = self.connect_epoch, "connecting");
        Ok(self.connect_epoch)
    }

    pub(crate) fn mark_connected(&mut self, reason: StatusReason) {
        match self.machine.on_connected(reason) {
            Ok(Some(event)) => {
                self.reconnect.disarm();
                self.reconnect_attempt = 0;
                info!(epoch = self.connect_epoch, "connected");
                self.publish(Some(event));
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "ignoring connected signal"),
        }
    }

    /// Transient failure: status changes, timers keep running.
    pub(crate) fn note_timeout(&mut self) {
        let event = self.machine.on_transient(StatusReason::TimedOut);
        self.publish(event);
    }

    /// Hard failure: stop liveness, go `Disconnected`, schedule one reconnect.
    ///
    /// Further failures in the same epoch keep the first reason and the
    /// already scheduled reconnect.
    pub(crate) fn fail(&mut self, reason: StatusReason) {
        self.liveness.disarm();
        if self.reconnect.is_armed_for(self.connect_epoch) {
            debug!(epoch = self.connect_epoch, ?reason, "reconnect already scheduled");
            return;
        }

        let event = self.machine.on_failure(reason);
        self.publish(event);

        let delay = self.policy.delay_for_attempt(self.reconnect_attempt);
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        info!(
            epoch = self.connect_epoch,
            ?reason,
            delay_ms = delay.as_millis() as u64,
            attempt = self.reconnect_attempt,
            "reconnect scheduled"
        );
        self.reconnect.arm_once(self.connect_epoch, delay);
    }

    /// Cancel everything and invalidate in-flight work. Idempotent.
    pub(crate) fn stop(&mut self) {
        self.liveness.disarm();
        self.reconnect.disarm();
        self.aux.disarm();
        self.connect_epoch = self.connect_epoch.wrapping_add(1);
        self.session_epoch = self.session_epoch.wrapping_add(1);
        self.reconnect_attempt = 0;
        let event = self.machine.on_stopped();
        self.publish(event);
    }

    /// Validate and echo an outbound message: user message, then placeholder.
    pub(crate) fn begin_send(&mut self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if message.content.trim().is_empty() {
            return Err(ChannelError::empty_message());
        }

        let now = now_ms();
        let mut ops = self.conversation.add_message(Message {
            content_type: message.content_type,
            ..Message::text(Sender::User, message.content.clone(), now)
        });
        ops.extend(self.conversation.add_message(Message::placeholder(now)));
        self.emit_ops(&ops);
        Ok(())
    }

    /// Apply a send result and answer the caller.
    ///
    /// Completions from before the last stop answer the caller but leave the
    /// conversation untouched.
    pub(crate) fn finish_send(&mut self, session_epoch: u64, outcome: SendOutcome, reply: Reply<()>) {
        if session_epoch != self.session_epoch {
            debug!(session_epoch, "send completed after stop; conversation untouched");
        } else if let SendOutcome::Failed { error } = &outcome {
            warn!(code = %error.code, message = %error.message, "send failed");
            let ops = resolve_failed_send(&mut self.conversation, now_ms());
            self.emit_ops(&ops);
        }
        let _ = reply.send(outcome.into_result());
    }

    /// Feed one raw payload through the ingestion pipeline.
    pub(crate) fn ingest(&mut self, raw: &str) -> IngestReport {
        let report = self.pipeline.ingest(raw, &mut self.conversation, now_ms());
        self.apply_report(&report);
        report
    }

    pub(crate) fn ingest_value(&mut self, value: Value) -> IngestReport {
        let report = self
            .pipeline
            .ingest_value(value, &mut self.conversation, now_ms());
        self.apply_report(&report);
        report
    }

    /// Append directly, bypassing the pipeline.
    pub(crate) fn append(&mut self, message: Message) {
        let ops = self.conversation.add_message(message);
        self.emit_ops(&ops);
    }

    fn apply_report(&mut self, report: &IngestReport) {
        if report.duplicate {
            debug!("duplicate payload dropped");
        }
        for err in &report.rejected {
            warn!(%err, "dropping malformed payload");
        }
        for kind in &report.unknown {
            warn!(kind = %kind, "dropping envelope of unknown type");
        }
        if report.heartbeats > 0 {
            debug!(count = report.heartbeats, "heartbeat received");
        }
        self.emit_ops(&report.ops);
        for data in &report.stream_updates {
            debug!(status = ?data.get("status"), "stream status changed");
            let _ = self
                .outputs
                .events
                .send(ChannelEvent::StreamStatus { data: data.clone() });
        }
    }

    fn emit_ops(&mut self, ops: &[ConversationOp]) {
        if ops.is_empty() {
            return;
        }
        for op in ops {
            let _ = self.outputs.events.send(ChannelEvent::Conversation(op.clone()));
        }
        self.outputs
            .conversation
            .send_replace(self.conversation.items().to_vec());
    }

    fn publish(&mut self, event: Option<ChannelEvent>) {
        let Some(event) = event else {
            return;
        };
        self.outputs.status.send_replace(self.machine.status());
        let _ = self.outputs.events.send(event);
    }
}

use chatlink_core::{
    ChannelBus, ChannelCommand, ChannelConfig, ChannelError, ConnectionStatus, IngestProfile,
    OutboundMessage, Reply, SendOutcome, TransportError,
};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info_span, warn};

use crate::{
    handle::ChannelHandle,
    session::{Session, SessionOutputs},
    timer::TimerKind,
    transport::{HttpReply, SocketEvent},
};

const COMMAND_BUFFER: usize = 32;

/// Everything that reaches a channel task besides caller commands.
#[derive(Debug)]
pub(crate) enum InternalEvent {
    Timer {
        kind: TimerKind,
        generation: u64,
        tick: u64,
    },
    Socket {
        epoch: u64,
        event: SocketEvent,
    },
    PollCompleted {
        epoch: u64,
        result: Result<HttpReply, TransportError>,
    },
    SendCompleted {
        session_epoch: u64,
        outcome: SendOutcome,
        reply: Reply<()>,
    },
}

/// Transport-specific half of a channel.
///
/// Handlers run on the channel task one at a time; anything that waits on
/// I/O is spawned and reports back through `session.internal_tx`.
pub(crate) trait Strategy: Send + 'static {
    fn kind(&self) -> &'static str;

    fn profile(&self) -> IngestProfile;

    /// Run the connection procedure. The session is already `Connecting`.
    fn connect(&mut self, session: &mut Session);

    /// A liveness or aux timer fired (reconnect is handled by the driver).
    fn on_timer(&mut self, session: &mut Session, kind: TimerKind, tick: u64);

    /// Write an already echoed message. Must eventually call
    /// [`Session::finish_send`] with `reply`.
    fn write(&mut self, session: &mut Session, message: OutboundMessage, reply: Reply<()>);

    /// Socket event from the current epoch.
    fn on_socket(&mut self, _session: &mut Session, _event: SocketEvent) {}

    /// Poll completion. Called for stale epochs too so in-flight bookkeeping stays correct.
    fn on_poll_completed(
        &mut self,
        _session: &mut Session,
        _epoch: u64,
        _result: Result<HttpReply, TransportError>,
    ) {
    }

    /// Release transport resources. Timers are handled by the session.
    fn close(&mut self, session: &mut Session);
}

struct ChannelDriver<S> {
    session: Session,
    strategy: S,
    command_rx: mpsc::Receiver<ChannelCommand>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
}

/// Spawn the channel task for `strategy` and return its handle.
pub(crate) fn spawn<S: Strategy>(strategy: S, config: ChannelConfig) -> ChannelHandle {
    let (bus, command_rx) = ChannelBus::new(COMMAND_BUFFER, config.event_buffer);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
    let (conversation_tx, conversation_rx) = watch::channel(Vec::new());

    let outputs = SessionOutputs {
        events: bus.event_sender(),
        status: status_tx,
        conversation: conversation_tx,
    };
    let session = Session::new(config, strategy.profile(), internal_tx, outputs);
    let kind = strategy.kind();
    let driver = ChannelDriver {
        session,
        strategy,
        command_rx,
        internal_rx,
    };
    tokio::spawn(driver.run().instrument(info_span!("channel", kind)));

    ChannelHandle::new(bus, status_rx, conversation_rx)
}

impl<S: Strategy> ChannelDriver<S> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.internal_rx.recv() => self.handle_internal(event),
            }
        }

        self.strategy.close(&mut self.session);
        self.session.stop();
        debug!("all handles dropped, channel task exiting");
    }

    fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Start { reply } => {
                let result = self.connect();
                let _ = reply.send(result);
            }
            ChannelCommand::Send { message, reply } => {
                if let Err(err) = self.session.begin_send(&message) {
                    let _ = reply.send(Err(err));
                    return;
                }
                self.strategy.write(&mut self.session, message, reply);
            }
            ChannelCommand::Stop { reply } => {
                self.strategy.close(&mut self.session);
                self.session.stop();
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::Timer {
                kind,
                generation,
                tick,
            } => {
                if !self.session.timer(kind).accept(generation, tick) {
                    debug!(?kind, generation, "ignoring fire from cancelled timer");
                    return;
                }
                if kind == TimerKind::Reconnect {
                    if let Err(err) = self.connect() {
                        warn!(%err, "reconnect skipped");
                    }
                } else {
                    self.strategy.on_timer(&mut self.session, kind, tick);
                }
            }
            InternalEvent::Socket { epoch, event } => {
                if epoch != self.session.connect_epoch() {
                    debug!(epoch, "discarding socket event from a previous connection");
                    return;
                }
                self.strategy.on_socket(&mut self.session, event);
            }
            InternalEvent::PollCompleted { epoch, result } => {
                self.strategy
                    .on_poll_completed(&mut self.session, epoch, result);
            }
            InternalEvent::SendCompleted {
                session_epoch,
                outcome,
                reply,
            } => self.session.finish_send(session_epoch, outcome, reply),
        }
    }

    fn connect(&mut self) -> Result<(), ChannelError> {
        self.session.begin_connect()?;
        self.strategy.connect(&mut self.session);
        Ok(())
    }
}

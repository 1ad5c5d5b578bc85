//! Scripted channel: a timed fixture standing in for a real backend.

use std::{collections::VecDeque, iter, time::Duration};

use chatlink_core::{
    ChannelKind, IngestProfile, Message, OutboundMessage, Reply, SendOutcome, Sender,
    StatusReason,
};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    driver::Strategy,
    session::{Session, now_ms},
    timer::TimerKind,
};

const DEMO_STEP: Duration = Duration::from_millis(2_000);
const DEMO_REPLY_DELAY: Duration = Duration::from_millis(1_500);
const DEMO_REPLY: &str = "Thanks, your message was received.";

/// One scripted action.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    /// Feed an inbound envelope through the ingestion pipeline.
    Deliver(Value),
    /// Append a user message followed by a thinking placeholder.
    Think { user: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// Delay measured from the previous step (or from connecting).
    pub after: Duration,
    pub action: ScriptAction,
}

/// Assistant answer queued for every successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    pub after: Duration,
    pub content: String,
}

/// Timed script played by the scripted channel after every `start`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub connect_delay: Duration,
    pub steps: Vec<ScriptStep>,
    pub reply: Option<ScriptedReply>,
}

impl Script {
    pub fn new(connect_delay: Duration) -> Self {
        Self {
            connect_delay,
            ..Self::default()
        }
    }

    pub fn then(mut self, after: Duration, action: ScriptAction) -> Self {
        self.steps.push(ScriptStep { after, action });
        self
    }

    /// Deliver a `message` envelope from `sender`.
    pub fn message_after(self, after: Duration, sender: Sender, content: &str) -> Self {
        let sender = match sender {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        };
        self.then(
            after,
            ScriptAction::Deliver(json!({
                "type": "message",
                "sender": sender,
                "content": content,
                "contentType": "text",
            })),
        )
    }

    pub fn think_after(self, after: Duration, user: impl Into<String>) -> Self {
        self.then(after, ScriptAction::Think { user: user.into() })
    }

    pub fn with_reply(mut self, after: Duration, content: impl Into<String>) -> Self {
        self.reply = Some(ScriptedReply {
            after,
            content: content.into(),
        });
        self
    }

    /// Socket fixture: opens after one second, then one message every two.
    pub fn stream_demo() -> Self {
        demo_conversation()
            .into_iter()
            .fold(Self::new(Duration::from_millis(1_000)), |script, (sender, content)| {
                script.message_after(DEMO_STEP, sender, content)
            })
            .with_reply(DEMO_REPLY_DELAY, DEMO_REPLY)
    }

    /// Poll fixture: connected at once, then one message every two seconds.
    pub fn poll_demo() -> Self {
        demo_conversation()
            .into_iter()
            .fold(Self::new(Duration::ZERO), |script, (sender, content)| {
                script.message_after(DEMO_STEP, sender, content)
            })
            .with_reply(DEMO_REPLY_DELAY, DEMO_REPLY)
    }

    /// Dual fixture: a question with a placeholder answered after three
    /// seconds, then a new question every four seconds answered two seconds later.
    pub fn dual_demo() -> Self {
        let ms = Duration::from_millis;
        Self::new(Duration::ZERO)
            .think_after(Duration::ZERO, "Hi, how do I use this system?")
            .message_after(
                ms(3_000),
                Sender::Assistant,
                "Hello! Send a message and a reply will appear here.",
            )
            .think_after(ms(4_000), "What can it do?")
            .message_after(
                ms(2_000),
                Sender::Assistant,
                "It answers questions in real time next to the avatar stream.",
            )
            .think_after(ms(2_000), "How do I reach support?")
            .message_after(
                ms(2_000),
                Sender::Assistant,
                "Ask here at any time and the assistant will route your request.",
            )
            .with_reply(DEMO_REPLY_DELAY, DEMO_REPLY)
    }

    pub fn for_kind(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Stream => Self::stream_demo(),
            ChannelKind::Poll => Self::poll_demo(),
            ChannelKind::Dual => Self::dual_demo(),
        }
    }

    fn delays(&self) -> Vec<Duration> {
        iter::once(self.connect_delay)
            .chain(self.steps.iter().map(|step| step.after))
            .collect()
    }
}

fn demo_conversation() -> [(Sender, &'static str); 6] {
    [
        (Sender::User, "Hi, what is this project?"),
        (Sender::Assistant, "Hello! I am the assistant, happy to help."),
        (Sender::User, "What are its main features?"),
        (
            Sender::Assistant,
            "Real-time chat with a digital avatar shown alongside the conversation.",
        ),
        (Sender::User, "How do I use it?"),
        (Sender::Assistant, "Just send a message and a reply will follow."),
    ]
}

pub(crate) struct ScriptedStrategy {
    script: Script,
    pending_replies: VecDeque<String>,
}

impl ScriptedStrategy {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            pending_replies: VecDeque::new(),
        }
    }

    fn run_step(&self, session: &mut Session, index: usize) {
        let Some(step) = self.script.steps.get(index) else {
            return;
        };
        match &step.action {
            ScriptAction::Deliver(envelope) => {
                session.ingest_value(envelope.clone());
            }
            ScriptAction::Think { user } => {
                let now = now_ms();
                session.append(Message::text(Sender::User, user.clone(), now));
                session.append(Message::placeholder(now));
            }
        }
    }

    fn deliver_reply(&mut self, session: &mut Session) {
        let Some(content) = self.pending_replies.pop_front() else {
            return;
        };
        session.ingest_value(json!({
            "type": "message",
            "sender": "assistant",
            "content": content,
        }));
        if let Some(reply) = &self.script.reply
            && !self.pending_replies.is_empty()
        {
            let epoch = session.connect_epoch();
            session.aux.arm_once(epoch, reply.after);
        }
    }
}

impl Strategy for ScriptedStrategy {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn profile(&self) -> IngestProfile {
        IngestProfile::Stream
    }

    fn connect(&mut self, session: &mut Session) {
        self.pending_replies.clear();
        let epoch = session.connect_epoch();
        session.liveness.arm_sequence(epoch, self.script.delays());
    }

    fn on_timer(&mut self, session: &mut Session, kind: TimerKind, tick: u64) {
        match kind {
            TimerKind::Liveness if tick == 0 => {
                session.mark_connected(StatusReason::ConnectedScripted);
            }
            TimerKind::Liveness => {
                let index = usize::try_from(tick - 1).unwrap_or(usize::MAX);
                debug!(step = index, "running script step");
                self.run_step(session, index);
            }
            TimerKind::Aux => self.deliver_reply(session),
            TimerKind::Reconnect => {}
        }
    }

    fn write(&mut self, session: &mut Session, message: OutboundMessage, reply: Reply<()>) {
        debug!(content = %message.content, "scripted send");
        session.finish_send(session.session_epoch(), SendOutcome::Delivered, reply);

        if let Some(scripted) = &self.script.reply {
            self.pending_replies.push_back(scripted.content.clone());
            if !session.aux.is_armed() {
                let epoch = session.connect_epoch();
                session.aux.arm_once(epoch, scripted.after);
            }
        }
    }

    fn close(&mut self, _session: &mut Session) {
        self.pending_replies.clear();
    }
}

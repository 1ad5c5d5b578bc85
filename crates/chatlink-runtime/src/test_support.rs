//! Fake transports for channel tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chatlink_core::{ChannelEvent, EventStream, TransportError};
use serde_json::Value;
use tokio::sync::{broadcast::error::TryRecvError, mpsc, oneshot};

use crate::transport::{
    HttpReply, HttpTransport, OutgoingFrame, SocketConnector, SocketEvent, SocketEventSink,
};

type HttpResult = Result<HttpReply, TransportError>;

/// Scripted answer to one fetch or submit.
pub(crate) enum FetchPlan {
    Reply(HttpResult),
    /// Stay in flight until the sender resolves.
    Hold(oneshot::Receiver<HttpResult>),
}

/// Scripted [`HttpTransport`]. Unscripted requests answer `200` with no body.
#[derive(Default)]
pub(crate) struct FakeHttp {
    fetch_plans: Mutex<VecDeque<FetchPlan>>,
    cursors: Mutex<Vec<Option<String>>>,
    submit_plans: Mutex<VecDeque<FetchPlan>>,
    submitted: Mutex<Vec<(String, Value)>>,
}

impl FakeHttp {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_fetch(&self, plan: FetchPlan) {
        self.fetch_plans
            .lock()
            .expect("fetch plans lock")
            .push_back(plan);
    }

    pub(crate) fn push_submit(&self, result: HttpResult) {
        self.push_submit_plan(FetchPlan::Reply(result));
    }

    pub(crate) fn push_submit_plan(&self, plan: FetchPlan) {
        self.submit_plans
            .lock()
            .expect("submit plans lock")
            .push_back(plan);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.cursors.lock().expect("cursor log lock").len()
    }

    /// `lastMessageId` of every fetch, in order.
    pub(crate) fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().expect("cursor log lock").clone()
    }

    pub(crate) fn submitted(&self) -> Vec<Value> {
        self.submitted
            .lock()
            .expect("submit log lock")
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub(crate) fn submit_urls(&self) -> Vec<String> {
        self.submitted
            .lock()
            .expect("submit log lock")
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeHttp {
    async fn fetch(
        &self,
        _url: &str,
        last_message_id: Option<&str>,
        _timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        self.cursors
            .lock()
            .expect("cursor log lock")
            .push(last_message_id.map(str::to_owned));
        let plan = self.fetch_plans.lock().expect("fetch plans lock").pop_front();
        resolve(plan).await
    }

    async fn submit(
        &self,
        url: &str,
        body: &Value,
        _timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        self.submitted
            .lock()
            .expect("submit log lock")
            .push((url.to_owned(), body.clone()));
        let plan = self.submit_plans.lock().expect("submit plans lock").pop_front();
        resolve(plan).await
    }
}

async fn resolve(plan: Option<FetchPlan>) -> HttpResult {
    match plan {
        None => Ok(HttpReply::empty(200)),
        Some(FetchPlan::Reply(result)) => result,
        Some(FetchPlan::Hold(held)) => held.await.unwrap_or(Err(TransportError::Closed(None))),
    }
}

type SocketOutcome = Result<Option<String>, TransportError>;

struct FakeSocket {
    events: SocketEventSink,
    end: Option<oneshot::Sender<SocketOutcome>>,
}

/// In-memory [`SocketConnector`]: every connection opens at once and records
/// written frames until the test ends it.
#[derive(Default)]
pub(crate) struct FakeConnector {
    attempts: AtomicUsize,
    setup_errors: Mutex<VecDeque<TransportError>>,
    sockets: Mutex<Vec<FakeSocket>>,
    frames: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_next_setup(&self, err: TransportError) {
        self.setup_errors
            .lock()
            .expect("setup errors lock")
            .push_back(err);
    }

    /// Connection attempts, including failed setups.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn frames(&self) -> Vec<String> {
        self.frames.lock().expect("frames lock").clone()
    }

    /// Push an event on the `index`-th opened socket.
    pub(crate) fn emit(&self, index: usize, event: SocketEvent) {
        let sockets = self.sockets.lock().expect("sockets lock");
        let socket = sockets.get(index).expect("socket should have been opened");
        socket.events.emit(event);
    }

    /// End the `index`-th socket's `run` with `outcome`.
    pub(crate) fn end(&self, index: usize, outcome: SocketOutcome) {
        let mut sockets = self.sockets.lock().expect("sockets lock");
        let socket = sockets
            .get_mut(index)
            .expect("socket should have been opened");
        if let Some(end) = socket.end.take() {
            let _ = end.send(outcome);
        }
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn run(
        &self,
        _url: &str,
        mut outgoing: mpsc::Receiver<OutgoingFrame>,
        events: SocketEventSink,
    ) -> Result<Option<String>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let setup_error = self.setup_errors.lock().expect("setup errors lock").pop_front();
        if let Some(err) = setup_error {
            return Err(err);
        }

        let (end_tx, mut end_rx) = oneshot::channel();
        self.sockets.lock().expect("sockets lock").push(FakeSocket {
            events: events.clone(),
            end: Some(end_tx),
        });
        events.emit(SocketEvent::Open);

        loop {
            tokio::select! {
                frame = outgoing.recv() => match frame {
                    Some(OutgoingFrame { text, ack }) => {
                        self.frames.lock().expect("frames lock").push(text);
                        if let Some(ack) = ack {
                            let _ = ack.send(Ok(()));
                        }
                    }
                    None => return Ok(None),
                },
                outcome = &mut end_rx => return outcome.unwrap_or(Ok(None)),
            }
        }
    }
}

/// Everything currently queued on `events`.
pub(crate) fn drain_events(events: &mut EventStream) -> Vec<ChannelEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
        }
    }
}

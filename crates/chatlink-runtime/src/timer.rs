use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::driver::InternalEvent;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Which slot a timer event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Poll timer or socket heartbeat. Drives the scripted runner too.
    Liveness,
    /// One-shot reconnect.
    Reconnect,
    /// Dual response cooldown or scripted reply delay.
    Aux,
}

#[derive(Debug)]
struct RunningTimer {
    stop: CancellationToken,
    task: JoinHandle<()>,
    generation: u64,
    epoch: u64,
    last_tick: Option<u64>,
}

/// Single-instance timer: arming always cancels the previous instance.
///
/// Fires arrive as [`InternalEvent::Timer`] on the channel mailbox and must
/// be checked with [`TimerSlot::accept`], which drops fires from instances
/// that were cancelled after they had already queued an event.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    kind: TimerKind,
    tx: mpsc::UnboundedSender<InternalEvent>,
    running: Option<RunningTimer>,
    next_generation: u64,
}

impl TimerSlot {
    pub(crate) fn new(kind: TimerKind, tx: mpsc::UnboundedSender<InternalEvent>) -> Self {
        Self {
            kind,
            tx,
            running: None,
            next_generation: 0,
        }
    }

    /// Fire once after `delay`.
    pub(crate) fn arm_once(&mut self, epoch: u64, delay: Duration) {
        self.arm_sequence(epoch, vec![delay]);
    }

    /// Fire once per entry, each delay measured from the previous fire.
    pub(crate) fn arm_sequence(&mut self, epoch: u64, delays: Vec<Duration>) {
        let last_tick = (delays.len() as u64).checked_sub(1);
        let Some(last_tick) = last_tick else {
            self.disarm();
            return;
        };

        self.spawn(epoch, Some(last_tick), move |kind, generation, stop, tx| async move {
            for (tick, delay) in (0_u64..).zip(delays) {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = sleep(delay) => {}
                }
                if tx.send(InternalEvent::Timer { kind, generation, tick }).is_err() {
                    return;
                }
            }
        });
    }

    /// Fire every `period`, first fire one period from now.
    pub(crate) fn arm_interval(&mut self, epoch: u64, period: Duration) {
        let period = period.max(MIN_PERIOD);
        self.spawn(epoch, None, move |kind, generation, stop, tx| async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick = 0_u64;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if tx.send(InternalEvent::Timer { kind, generation, tick }).is_err() {
                    return;
                }
                tick = tick.saturating_add(1);
            }
        });
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.cancel();
            running.task.abort();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.running.is_some()
    }

    /// Armed by a connection attempt with this epoch and not yet fired out.
    pub(crate) fn is_armed_for(&self, epoch: u64) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.epoch == epoch)
    }

    /// Validate a fire. Returns `false` for fires of cancelled instances.
    ///
    /// The slot forgets a finite timer once its last tick is accepted.
    pub(crate) fn accept(&mut self, generation: u64, tick: u64) -> bool {
        let Some(running) = &self.running else {
            return false;
        };
        if running.generation != generation {
            return false;
        }
        if running.last_tick == Some(tick) {
            self.running = None;
        }
        true
    }

    fn spawn<F, Fut>(&mut self, epoch: u64, last_tick: Option<u64>, body: F)
    where
        F: FnOnce(TimerKind, u64, CancellationToken, mpsc::UnboundedSender<InternalEvent>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.disarm();
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let stop = CancellationToken::new();
        let task = tokio::spawn(body(
            self.kind,
            generation,
            stop.child_token(),
            self.tx.clone(),
        ));
        self.running = Some(RunningTimer {
            stop,
            task,
            generation,
            epoch,
            last_tick,
        });
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.disarm();
    }
}

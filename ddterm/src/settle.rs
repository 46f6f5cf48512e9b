//! Waiting for a burst of asynchronous events to settle.
//!
//! A wait subscribes to any number of event sources and resolves once
//! `timeout` passes without a single event from any of them. Every event
//! restarts the timer. Resolution happens exactly once and detaches all
//! listeners; dropping an unresolved wait detaches them as well.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::signal::{ConnectionSet, Signal};

/// Quiet period used when the caller has no better estimate.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_millis(200);

/// Something a settle wait can listen to.
pub trait SettleSource {
    fn attach(&self, connections: &ConnectionSet, on_event: Rc<dyn Fn()>);
}

impl<T: 'static> SettleSource for Signal<T> {
    fn attach(&self, connections: &ConnectionSet, on_event: Rc<dyn Fn()>) {
        connections.connect(self, move |_| on_event());
    }
}

/// Outcome of a completed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    /// Number of events that restarted the timer.
    pub events: u32,
}

struct WaitState {
    notify: Notify,
    events: Cell<u32>,
}

/// A pending wait. Listeners are attached as soon as it is created, so
/// events fired before the first poll still count.
pub struct SettleWait {
    connections: Rc<ConnectionSet>,
    state: Rc<WaitState>,
    timeout: Duration,
}

impl SettleWait {
    pub fn new(sources: &[&dyn SettleSource], timeout: Duration) -> Self {
        let connections = Rc::new(ConnectionSet::new());
        let state = Rc::new(WaitState {
            notify: Notify::new(),
            events: Cell::new(0),
        });

        let on_event: Rc<dyn Fn()> = {
            let state = Rc::clone(&state);
            Rc::new(move || {
                state.events.set(state.events.get() + 1);
                state.notify.notify_one();
            })
        };

        for source in sources {
            source.attach(&connections, Rc::clone(&on_event));
        }

        Self {
            connections,
            state,
            timeout,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.connections.len()
    }

    /// Resolves once the sources have been quiet for the whole timeout.
    pub async fn settled(self) -> Settled {
        loop {
            // A new timer per iteration; the previous one is dropped, not just ignored
            match tokio::time::timeout(self.timeout, self.state.notify.notified()).await {
                Ok(()) => continue,
                Err(_) => break,
            }
        }

        self.connections.disconnect();
        Settled {
            events: self.state.events.get(),
        }
    }
}

/// Callback form of a settle wait, driven on the current `LocalSet`.
///
/// Dropping or cancelling the session detaches every listener immediately
/// and guarantees the callback never runs.
pub struct SettleSession {
    connections: Rc<ConnectionSet>,
    cancelled: Rc<Cell<bool>>,
    finished: Rc<Cell<bool>>,
    task: JoinHandle<()>,
}

impl SettleSession {
    pub fn start<F>(sources: &[&dyn SettleSource], timeout: Duration, on_settled: F) -> Self
    where
        F: FnOnce(Settled) + 'static,
    {
        let wait = SettleWait::new(sources, timeout);
        let connections = Rc::clone(&wait.connections);
        let cancelled = Rc::new(Cell::new(false));
        let finished = Rc::new(Cell::new(false));

        let task = {
            let cancelled = Rc::clone(&cancelled);
            let finished = Rc::clone(&finished);
            tokio::task::spawn_local(async move {
                let settled = wait.settled().await;
                if cancelled.get() {
                    return;
                }
                finished.set(true);
                tracing::debug!("Settled after {} events", settled.events);
                on_settled(settled);
            })
        };

        Self {
            connections,
            cancelled,
            finished,
            task,
        }
    }

    /// True once the callback has run.
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    pub fn is_pending(&self) -> bool {
        !self.finished.get() && !self.cancelled.get()
    }

    /// Idempotent; cancelling a finished session is a no-op.
    pub fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        self.connections.disconnect();
        self.task.abort();
    }
}

impl Drop for SettleSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

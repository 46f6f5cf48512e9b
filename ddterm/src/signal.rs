//! Single-threaded notification sources and scoped subscriptions.
//!
//! Everything in the controller runs on one event loop, so listeners are
//! plain `Rc` closures. Emission works on a snapshot of the listener list:
//! a handler may connect or disconnect other handlers (or itself) while the
//! signal is being emitted.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<T> = Rc<dyn Fn(&T)>;

struct SignalInner<T> {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(u64, Handler<T>)>>,
}

impl<T> SignalInner<T> {
    fn is_connected(&self, id: u64) -> bool {
        self.handlers.borrow().iter().any(|(hid, _)| *hid == id)
    }

    fn remove(&self, id: u64) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }
}

/// A notification source with any number of listeners.
///
/// Cloning a signal yields another handle to the same listener list.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Signal<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SignalInner {
                next_id: Cell::new(1),
                handlers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn connect(&self, handler: impl Fn(&T) + 'static) -> HandlerId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .handlers
            .borrow_mut()
            .push((id, Rc::new(handler)));
        HandlerId(id)
    }

    /// Returns false if the handler was not connected. Disconnecting twice is harmless.
    pub fn disconnect(&self, id: HandlerId) -> bool {
        self.inner.remove(id.0)
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(u64, Handler<T>)> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .map(|(id, handler)| (*id, Rc::clone(handler)))
            .collect();

        for (id, handler) in snapshot {
            // Skip handlers removed by an earlier handler of this emission
            if self.inner.is_connected(id) {
                handler(value);
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.borrow().len()
    }

    fn downgrade(&self) -> Weak<SignalInner<T>> {
        Rc::downgrade(&self.inner)
    }
}

/// A batch of signal connections released together.
///
/// The set holds weak references only, so it never keeps a signal (or the
/// window owning it) alive. All connections are detached on `disconnect()`
/// and again on drop, whichever comes first.
#[derive(Default)]
pub struct ConnectionSet {
    disconnectors: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect<T: 'static>(
        &self,
        signal: &Signal<T>,
        handler: impl Fn(&T) + 'static,
    ) -> HandlerId {
        let id = signal.connect(handler);
        let weak = signal.downgrade();
        self.disconnectors.borrow_mut().push(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id.0);
            }
        }));
        id
    }

    pub fn disconnect(&self) {
        let disconnectors = std::mem::take(&mut *self.disconnectors.borrow_mut());
        for disconnect in disconnectors {
            disconnect();
        }
    }

    pub fn len(&self) -> usize {
        self.disconnectors.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.disconnectors.borrow().is_empty()
    }
}

impl Drop for ConnectionSet {
    fn drop(&mut self) {
        self.disconnect();
    }
}

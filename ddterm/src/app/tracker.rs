use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::core::IdentityRecord;
use crate::platform::{Compositor, CompositorWindow, WindowHandle, WindowId};
use crate::signal::{ConnectionSet, Signal};

use super::sync::GeometrySync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Untracked,
    Tracked(WindowId),
}

/// Owns the single "current window" slot.
///
/// Every window announced by the compositor becomes a candidate whose
/// identity attributes are watched until it unmanages. The first candidate
/// that resolves while nothing is tracked is adopted.
pub struct WindowTracker {
    compositor: Rc<dyn Compositor>,
    sync: Rc<GeometrySync>,
    current: RefCell<Option<WindowHandle>>,
    current_connections: ConnectionSet,
    candidates: RefCell<HashMap<WindowId, ConnectionSet>>,
    created_connections: ConnectionSet,
    current_window_changed: Signal<Option<WindowHandle>>,
}

impl WindowTracker {
    pub fn new(compositor: Rc<dyn Compositor>, sync: Rc<GeometrySync>) -> Rc<Self> {
        Rc::new(Self {
            compositor,
            sync,
            current: RefCell::new(None),
            current_connections: ConnectionSet::new(),
            candidates: RefCell::new(HashMap::new()),
            created_connections: ConnectionSet::new(),
            current_window_changed: Signal::new(),
        })
    }

    pub fn enable(self: &Rc<Self>) {
        if !self.created_connections.is_empty() {
            return;
        }
        let weak = Rc::downgrade(self);
        self.created_connections
            .connect(self.compositor.window_created(), move |window| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.handle_created(window);
                }
            });
    }

    pub fn disable(&self) {
        self.created_connections.disconnect();
        let candidates = std::mem::take(&mut *self.candidates.borrow_mut());
        drop(candidates);

        let current = self.current_window();
        if let Some(window) = current {
            self.untrack(window.id());
        }
    }

    pub fn current_window(&self) -> Option<WindowHandle> {
        self.current.borrow().clone()
    }

    pub fn state(&self) -> TrackerState {
        match &*self.current.borrow() {
            Some(window) => TrackerState::Tracked(window.id()),
            None => TrackerState::Untracked,
        }
    }

    /// Fired on every transition with the new current window.
    pub fn current_window_changed(&self) -> &Signal<Option<WindowHandle>> {
        &self.current_window_changed
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.borrow().len()
    }

    fn handle_created(self: &Rc<Self>, window: &WindowHandle) {
        let id = window.id();
        tracing::debug!("Window {} created", id);

        let record = Rc::new(RefCell::new(IdentityRecord::new(
            window.app_id(),
            window.object_path(),
        )));
        let connections = ConnectionSet::new();
        let signals = window.signals();

        {
            let record = Rc::clone(&record);
            let weak_window = Rc::downgrade(window);
            let weak_self = Rc::downgrade(self);
            connections.connect(&signals.app_id_changed, move |_| {
                let Some(window) = weak_window.upgrade() else {
                    return;
                };
                let resolves = record.borrow_mut().set_app_id(window.app_id());
                identity_changed(&weak_self, &window, resolves);
            });
        }

        {
            let record = Rc::clone(&record);
            let weak_window = Rc::downgrade(window);
            let weak_self = Rc::downgrade(self);
            connections.connect(&signals.object_path_changed, move |_| {
                let Some(window) = weak_window.upgrade() else {
                    return;
                };
                let resolves = record.borrow_mut().set_object_path(window.object_path());
                identity_changed(&weak_self, &window, resolves);
            });
        }

        {
            let weak_self = Rc::downgrade(self);
            connections.connect(&signals.unmanaged, move |_| {
                if let Some(tracker) = weak_self.upgrade() {
                    tracker.forget_candidate(id);
                }
            });
        }

        let previous = self.candidates.borrow_mut().insert(id, connections);
        drop(previous);

        let resolves = record.borrow().resolves();
        self.identity_changed(window, resolves);
    }

    fn forget_candidate(&self, id: WindowId) {
        let connections = self.candidates.borrow_mut().remove(&id);
        drop(connections);
    }

    fn is_current(&self, id: WindowId) -> bool {
        self.current.borrow().as_ref().is_some_and(|w| w.id() == id)
    }

    fn identity_changed(self: &Rc<Self>, window: &WindowHandle, resolves: bool) {
        let id = window.id();
        match (resolves, self.is_current(id)) {
            (true, false) => self.track(window),
            (false, true) => {
                tracing::warn!("Window {} no longer looks like the terminal window", id);
                self.untrack(id);
            }
            _ => {}
        }
    }

    fn track(self: &Rc<Self>, window: &WindowHandle) {
        let id = window.id();
        if let Some(current) = self.current_window() {
            tracing::warn!(
                "Ignoring window {}: window {} is already tracked",
                id,
                current.id()
            );
            return;
        }

        tracing::info!("Tracking window {}", id);
        *self.current.borrow_mut() = Some(Rc::clone(window));

        let signals = window.signals();
        for signal in [&signals.unmanaging, &signals.unmanaged] {
            let weak = Rc::downgrade(self);
            self.current_connections.connect(signal, move |_| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.untrack(id);
                }
            });
        }

        // Geometry first, so the window never shows up at the wrong size
        self.sync.attach(window);
        self.compositor.activate_window(window);
        window.make_above();
        window.stick();

        self.current_window_changed.emit(&Some(Rc::clone(window)));
    }

    fn untrack(&self, id: WindowId) {
        if !self.is_current(id) {
            tracing::debug!("Ignoring stale notification for window {}", id);
            return;
        }

        let previous = self.current.borrow_mut().take();
        self.current_connections.disconnect();
        self.sync.detach();
        drop(previous);

        tracing::info!("Untracked window {}", id);
        self.current_window_changed.emit(&None);
    }
}

fn identity_changed(tracker: &Weak<WindowTracker>, window: &Rc<dyn CompositorWindow>, resolves: bool) {
    if let Some(tracker) = tracker.upgrade() {
        tracker.identity_changed(window, resolves);
    }
}

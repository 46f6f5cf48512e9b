use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{Context, Result};
use ddterm_ipc::{Action, APP_DBUS_PATH, APP_ID, UNDECORATED_FLAG};

use crate::platform::{ActionGroup, Bus, Spawner, WatchId};
use crate::signal::Signal;

/// Routes user requests to the running application, or starts it.
///
/// Presence of the application's bus name drives an absent/present state;
/// while present, the broker holds exactly one remote action group.
pub struct ActionBroker {
    bus: Rc<dyn Bus>,
    spawner: Rc<dyn Spawner>,
    app_command: Vec<String>,
    watch: Cell<Option<WatchId>>,
    action_group: RefCell<Option<Box<dyn ActionGroup>>>,
    presence_changed: Signal<bool>,
}

impl ActionBroker {
    pub fn new(bus: Rc<dyn Bus>, spawner: Rc<dyn Spawner>, app_command: Vec<String>) -> Rc<Self> {
        Rc::new(Self {
            bus,
            spawner,
            app_command,
            watch: Cell::new(None),
            action_group: RefCell::new(None),
            presence_changed: Signal::new(),
        })
    }

    pub fn enable(self: &Rc<Self>) -> Result<()> {
        if self.watch.get().is_some() {
            return Ok(());
        }

        let on_appeared = {
            let weak = Rc::downgrade(self);
            Box::new(move || {
                if let Some(broker) = weak.upgrade() {
                    broker.name_appeared();
                }
            })
        };
        let on_vanished = {
            let weak = Rc::downgrade(self);
            Box::new(move || {
                if let Some(broker) = weak.upgrade() {
                    broker.name_vanished();
                }
            })
        };

        let id = self
            .bus
            .watch_name(APP_ID, on_appeared, on_vanished)
            .with_context(|| format!("Failed to watch bus name {}", APP_ID))?;
        self.watch.set(Some(id));
        Ok(())
    }

    /// Stop watching and release the action group. The application is
    /// asked to quit first, but only when `allow_quit` is set: a teardown
    /// caused by a session mode switch must leave it running.
    pub fn disable(&self, allow_quit: bool) {
        let Some(id) = self.watch.take() else {
            return;
        };

        if allow_quit {
            if let Some(group) = &*self.action_group.borrow() {
                tracing::info!("Asking {} to quit", APP_ID);
                group.activate_action(Action::Quit);
            }
        }

        self.bus.unwatch_name(id);
        self.release_action_group();
    }

    pub fn is_enabled(&self) -> bool {
        self.watch.get().is_some()
    }

    pub fn is_present(&self) -> bool {
        self.action_group.borrow().is_some()
    }

    pub fn presence_changed(&self) -> &Signal<bool> {
        &self.presence_changed
    }

    pub fn toggle(&self) -> Result<()> {
        self.activate_or_spawn(Action::Toggle)
    }

    pub fn show(&self) -> Result<()> {
        self.activate_or_spawn(Action::Show)
    }

    /// Nothing to hide while the application is not running.
    pub fn hide(&self) {
        if !self.activate(Action::Hide) {
            tracing::debug!("{} is not running, nothing to hide", APP_ID);
        }
    }

    /// Spawn argv used when the application is not on the bus.
    pub fn spawn_command(&self) -> Vec<String> {
        let mut argv = self.app_command.clone();
        argv.push(UNDECORATED_FLAG.to_string());
        argv
    }

    fn activate_or_spawn(&self, action: Action) -> Result<()> {
        if self.activate(action) {
            return Ok(());
        }
        tracing::info!("{} is not running, starting it", APP_ID);
        self.spawner.spawn(&self.spawn_command())
    }

    fn activate(&self, action: Action) -> bool {
        match &*self.action_group.borrow() {
            Some(group) => {
                tracing::debug!("Activating remote action {}", action);
                group.activate_action(action);
                true
            }
            None => false,
        }
    }

    fn name_appeared(&self) {
        tracing::info!("{} appeared on the bus", APP_ID);
        self.release_action_group();
        let group = self.bus.action_group(APP_ID, APP_DBUS_PATH);
        *self.action_group.borrow_mut() = Some(group);
        self.presence_changed.emit(&true);
    }

    fn name_vanished(&self) {
        let was_present = self.release_action_group();
        if was_present {
            tracing::info!("{} vanished from the bus", APP_ID);
        }
        self.presence_changed.emit(&false);
    }

    fn release_action_group(&self) -> bool {
        let group = self.action_group.borrow_mut().take();
        group.is_some()
    }
}

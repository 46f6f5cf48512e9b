mod broker;
mod sync;
mod tracker;

pub use broker::ActionBroker;
pub use sync::GeometrySync;
pub use tracker::{TrackerState, WindowTracker};

use std::rc::Rc;

use anyhow::Result;

use crate::core::{Config, Rect};
use crate::platform::{Bus, Compositor, Spawner, WindowHandle};
use crate::settings::Settings;
use crate::signal::Signal;

/// Name of the global toggle keybinding.
pub const TOGGLE_HOTKEY: &str = "ddterm-toggle-hotkey";

/// Root controller: wires the tracker, the geometry synchronizer and the
/// action broker to the compositor, the bus and the settings.
pub struct Extension {
    compositor: Rc<dyn Compositor>,
    broker: Rc<ActionBroker>,
    sync: Rc<GeometrySync>,
    tracker: Rc<WindowTracker>,
}

impl Extension {
    pub fn new(
        compositor: Rc<dyn Compositor>,
        bus: Rc<dyn Bus>,
        spawner: Rc<dyn Spawner>,
        settings: Settings,
        config: &Config,
    ) -> Self {
        let sync = GeometrySync::new(Rc::clone(&compositor), settings, config.settle_timeout);
        let tracker = WindowTracker::new(Rc::clone(&compositor), Rc::clone(&sync));
        let broker = ActionBroker::new(bus, spawner, config.app_command.clone());

        Self {
            compositor,
            broker,
            sync,
            tracker,
        }
    }

    pub fn enable(&self) -> Result<()> {
        let weak = Rc::downgrade(&self.broker);
        self.compositor.add_keybinding(
            TOGGLE_HOTKEY,
            Rc::new(move || {
                let Some(broker) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = broker.toggle() {
                    tracing::error!("Toggle failed: {:#}", e);
                }
            }),
        )?;

        if let Err(e) = self.broker.enable() {
            self.compositor.remove_keybinding(TOGGLE_HOTKEY);
            return Err(e);
        }
        self.tracker.enable();

        tracing::info!("Enabled");
        Ok(())
    }

    /// The remote quit goes out before any local state is released.
    pub fn disable(&self) {
        self.broker.disable(self.compositor.extensions_allowed());
        self.tracker.disable();
        self.compositor.remove_keybinding(TOGGLE_HOTKEY);
        tracing::info!("Disabled");
    }

    pub fn toggle(&self) -> Result<()> {
        self.broker.toggle()
    }

    pub fn current_window(&self) -> Option<WindowHandle> {
        self.tracker.current_window()
    }

    pub fn current_window_changed(&self) -> &Signal<Option<WindowHandle>> {
        self.tracker.current_window_changed()
    }

    pub fn current_target_rect(&self) -> Option<Rect> {
        self.sync.current_target_rect()
    }

    pub fn move_resize_requested(&self) -> &Signal<()> {
        self.sync.move_resize_requested()
    }
}

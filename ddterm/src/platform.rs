use std::process::{Command, Stdio};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use ddterm_ipc::Action;

use crate::core::{Axis, Rect};
use crate::signal::Signal;

pub type WindowId = u64;
pub type MonitorIndex = usize;
pub type WatchId = u64;

/// Notifications emitted by a compositor window.
#[derive(Default)]
pub struct WindowSignals {
    pub app_id_changed: Signal<()>,
    pub object_path_changed: Signal<()>,
    pub size_changed: Signal<()>,
    pub position_changed: Signal<()>,
    /// Either of the per-axis maximized flags changed.
    pub maximized_changed: Signal<()>,
    pub unmanaging: Signal<()>,
    pub unmanaged: Signal<()>,
}

/// A window owned by the compositor.
/// This abstraction allows mocking in tests.
pub trait CompositorWindow {
    fn id(&self) -> WindowId;
    fn app_id(&self) -> Option<String>;
    fn object_path(&self) -> Option<String>;
    fn frame_rect(&self) -> Rect;
    /// `None` while the window is between monitors.
    fn monitor(&self) -> Option<MonitorIndex>;
    fn is_maximized(&self, axis: Axis) -> bool;
    fn move_resize_frame(&self, rect: Rect);
    fn maximize(&self, axis: Axis);
    fn unmaximize(&self, axis: Axis);
    fn make_above(&self);
    fn stick(&self);
    fn signals(&self) -> &WindowSignals;
}

pub type WindowHandle = Rc<dyn CompositorWindow>;

/// Window management services of the compositor hosting the controller.
/// This abstraction allows mocking in tests.
pub trait Compositor {
    fn window_created(&self) -> &Signal<WindowHandle>;
    fn cursor_moved(&self) -> &Signal<()>;
    /// Monitor under the pointer.
    fn current_monitor(&self) -> MonitorIndex;
    fn work_area(&self, monitor: MonitorIndex) -> Option<Rect>;
    fn monitor_scale(&self, monitor: MonitorIndex) -> u32;
    fn activate_window(&self, window: &WindowHandle);
    fn add_keybinding(&self, name: &str, handler: Rc<dyn Fn()>) -> Result<()>;
    fn remove_keybinding(&self, name: &str);
    /// False while the session is in a mode without extensions (lock screen).
    fn extensions_allowed(&self) -> bool;
}

/// Remote action group of the application.
pub trait ActionGroup {
    /// Fire and forget: failures are reported by the implementation.
    fn activate_action(&self, action: Action);
}

/// Message bus services: name presence and remote action groups.
pub trait Bus {
    fn watch_name(
        &self,
        name: &str,
        on_appeared: Box<dyn Fn()>,
        on_vanished: Box<dyn Fn()>,
    ) -> Result<WatchId>;
    fn unwatch_name(&self, id: WatchId);
    fn action_group(&self, name: &str, path: &str) -> Box<dyn ActionGroup>;
}

pub trait Spawner {
    fn spawn(&self, argv: &[String]) -> Result<()>;
}

/// Launches detached child processes.
#[derive(Default)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, argv: &[String]) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            bail!("Empty command line");
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", argv))?;

        tracing::info!("Spawned {:?} (pid={})", argv, child.id());
        Ok(())
    }
}

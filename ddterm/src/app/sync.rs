use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use ddterm_ipc::{WINDOW_HEIGHT_KEY, WINDOW_MAXIMIZE_KEY, WINDOW_POSITION_KEY};

use crate::core::{ratio_from_frame, target_rect, Axis, Rect};
use crate::platform::{Compositor, WindowHandle};
use crate::settings::Settings;
use crate::settle::{SettleSession, SettleSource};
use crate::signal::{ConnectionSet, Signal};

/// Keeps the tracked window placed according to the persisted settings and
/// writes the size ratio back once a user resize has settled.
pub struct GeometrySync {
    compositor: Rc<dyn Compositor>,
    settings: Settings,
    settle_timeout: Duration,
    window: RefCell<Option<WindowHandle>>,
    window_connections: ConnectionSet,
    settings_connections: ConnectionSet,
    session: RefCell<Option<SettleSession>>,
    move_resize_requested: Signal<()>,
    target_rect: Cell<Option<Rect>>,
}

impl GeometrySync {
    pub fn new(
        compositor: Rc<dyn Compositor>,
        settings: Settings,
        settle_timeout: Duration,
    ) -> Rc<Self> {
        let sync = Rc::new(Self {
            compositor,
            settings,
            settle_timeout,
            window: RefCell::new(None),
            window_connections: ConnectionSet::new(),
            settings_connections: ConnectionSet::new(),
            session: RefCell::new(None),
            move_resize_requested: Signal::new(),
            target_rect: Cell::new(None),
        });

        let weak = Rc::downgrade(&sync);
        sync.settings_connections
            .connect(sync.settings.changed(), move |key: &String| {
                if let Some(sync) = weak.upgrade() {
                    sync.on_setting_changed(key);
                }
            });

        sync
    }

    /// Start managing the geometry of `window`, replacing any previous one.
    pub fn attach(self: &Rc<Self>, window: &WindowHandle) {
        self.detach();
        *self.window.borrow_mut() = Some(Rc::clone(window));

        let signals = window.signals();
        for signal in [&signals.size_changed, &signals.position_changed] {
            let weak = Rc::downgrade(self);
            self.window_connections.connect(signal, move |_| {
                if let Some(sync) = weak.upgrade() {
                    sync.on_live_resize();
                }
            });
        }

        let weak = Rc::downgrade(self);
        self.window_connections
            .connect(&signals.maximized_changed, move |_| {
                if let Some(sync) = weak.upgrade() {
                    sync.on_maximized_changed();
                }
            });

        // New windows open on the monitor under the pointer
        let monitor = self.compositor.current_monitor();
        match self.compositor.work_area(monitor) {
            Some(work_area) => {
                let scale = self.compositor.monitor_scale(monitor);
                self.apply_initial_geometry(window, work_area, scale);
            }
            None => tracing::warn!("No work area for monitor {}", monitor),
        }
    }

    /// Stop managing the current window. Pending settle waits are dropped.
    pub fn detach(&self) {
        self.window_connections.disconnect();
        let session = self.session.borrow_mut().take();
        drop(session);
        self.window.borrow_mut().take();
        self.target_rect.set(None);
    }

    /// Place `window` inside `work_area` using the persisted ratio,
    /// position and maximize flag.
    pub fn apply_initial_geometry(&self, window: &WindowHandle, work_area: Rect, monitor_scale: u32) {
        self.place_window(window, work_area, monitor_scale);
    }

    /// Last rectangle requested from the compositor.
    pub fn current_target_rect(&self) -> Option<Rect> {
        self.target_rect.get()
    }

    /// Emitted right before every controller-initiated move/resize.
    pub fn move_resize_requested(&self) -> &Signal<()> {
        &self.move_resize_requested
    }

    fn current(&self) -> Option<WindowHandle> {
        self.window.borrow().clone()
    }

    fn place_window(&self, window: &WindowHandle, work_area: Rect, monitor_scale: u32) {
        let position = self.settings.window_position();
        let axis = Axis::of(position);
        let maximize = self.settings.window_maximize();
        let rect = target_rect(work_area, monitor_scale, self.settings.window_height(), position);

        if window.is_maximized(axis.other()) {
            window.unmaximize(axis.other());
        }
        if !maximize && window.is_maximized(axis) {
            window.unmaximize(axis);
        }

        tracing::debug!("Placing window {} at {} ({})", window.id(), rect, position);
        self.target_rect.set(Some(rect));
        self.move_resize_requested.emit(&());
        window.move_resize_frame(rect);

        if maximize && !window.is_maximized(axis) {
            window.maximize(axis);
        }
    }

    fn update_geometry(&self) {
        let Some(window) = self.current() else {
            return;
        };
        let monitor = window
            .monitor()
            .unwrap_or_else(|| self.compositor.current_monitor());
        let Some(work_area) = self.compositor.work_area(monitor) else {
            tracing::warn!("No work area for monitor {}", monitor);
            return;
        };
        self.place_window(&window, work_area, self.compositor.monitor_scale(monitor));
    }

    fn on_live_resize(self: &Rc<Self>) {
        let pending = self
            .session
            .borrow()
            .as_ref()
            .is_some_and(SettleSession::is_pending);
        if pending {
            return;
        }
        let Some(window) = self.current() else {
            return;
        };

        let signals = window.signals();
        let sources: [&dyn SettleSource; 5] = [
            &signals.size_changed,
            &signals.position_changed,
            &signals.maximized_changed,
            &self.move_resize_requested,
            self.compositor.cursor_moved(),
        ];
        let weak = Rc::downgrade(self);
        let session = SettleSession::start(&sources, self.settle_timeout, move |_| {
            if let Some(sync) = weak.upgrade() {
                sync.persist_ratio();
            }
        });

        let previous = self.session.replace(Some(session));
        drop(previous);
    }

    fn persist_ratio(&self) {
        let Some(window) = self.current() else {
            return;
        };
        let position = self.settings.window_position();
        let axis = Axis::of(position);
        if window.is_maximized(axis) {
            return;
        }
        let Some(monitor) = window.monitor() else {
            tracing::debug!("Window {} has no monitor, not saving size", window.id());
            return;
        };
        let Some(work_area) = self.compositor.work_area(monitor) else {
            tracing::debug!("No work area for monitor {}, not saving size", monitor);
            return;
        };

        let frame = window.frame_rect();
        let Some(ratio) = ratio_from_frame(frame, work_area, position) else {
            return;
        };
        let scale = self.compositor.monitor_scale(monitor);
        let stored = target_rect(work_area, scale, self.settings.window_height(), position);
        if stored.extent(axis) == frame.extent(axis) {
            return;
        }

        tracing::info!("Window resized to {}, saving {}={}", frame, WINDOW_HEIGHT_KEY, ratio);
        self.target_rect
            .set(Some(target_rect(work_area, scale, ratio, position)));
        if let Err(e) = self.settings.set_window_height(ratio) {
            tracing::warn!("Failed to save window size: {:#}", e);
        }
    }

    fn on_setting_changed(&self, key: &str) {
        match key {
            WINDOW_HEIGHT_KEY => {
                if self.settings.window_maximize() && !self.settings.window_height().is_full() {
                    let axis = Axis::of(self.settings.window_position());
                    let maximized = self.current().is_some_and(|w| w.is_maximized(axis));
                    if maximized {
                        // Unmaximizing re-applies the geometry through the maximize key
                        if let Err(e) = self.settings.set_window_maximize(false) {
                            tracing::warn!("Failed to clear {}: {:#}", WINDOW_MAXIMIZE_KEY, e);
                        } else {
                            return;
                        }
                    }
                }
                self.update_geometry();
            }
            WINDOW_POSITION_KEY | WINDOW_MAXIMIZE_KEY => self.update_geometry(),
            _ => {}
        }
    }

    fn on_maximized_changed(self: &Rc<Self>) {
        let Some(window) = self.current() else {
            return;
        };
        let axis = Axis::of(self.settings.window_position());
        let ratio = self.settings.window_height();
        if !window.is_maximized(axis) || self.settings.window_maximize() || ratio.is_full() {
            return;
        }

        tracing::info!("Window {} maximized externally, restoring ratio {}", window.id(), ratio);
        let id = window.id();
        let weak = Rc::downgrade(self);
        // Not from inside the compositor's notification
        tokio::task::spawn_local(async move {
            let Some(sync) = weak.upgrade() else {
                return;
            };
            if sync.current().map(|w| w.id()) == Some(id) {
                sync.update_geometry();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SizeRatio;
    use crate::core::Config;
    use crate::platform::mock::{Call, MockCompositor, MockWindow};
    use crate::platform::CompositorWindow;
    use crate::settings::MemorySettingsStore;
    use crate::settle::DEFAULT_SETTLE_TIMEOUT;
    use ddterm_ipc::WindowPosition;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    const SETTLED: Duration = Duration::from_millis(300);

    struct Fixture {
        compositor: Rc<MockCompositor>,
        settings: Settings,
        sync: Rc<GeometrySync>,
    }

    impl Fixture {
        fn new() -> Self {
            let compositor = Rc::new(MockCompositor::new());
            let settings = Settings::new(Rc::new(MemorySettingsStore::new()));
            let sync = GeometrySync::new(
                compositor.clone(),
                settings.clone(),
                DEFAULT_SETTLE_TIMEOUT,
            );
            Self {
                compositor,
                settings,
                sync,
            }
        }

        fn attach_window(&self, id: u64) -> Rc<MockWindow> {
            let window = self.compositor.create_window(id);
            let handle: WindowHandle = window.clone();
            self.sync.attach(&handle);
            window
        }

        fn height_writes(&self) -> Rc<Cell<u32>> {
            let writes = Rc::new(Cell::new(0));
            let writes_clone = Rc::clone(&writes);
            self.settings.changed().connect(move |key| {
                if key == WINDOW_HEIGHT_KEY {
                    writes_clone.set(writes_clone.get() + 1);
                }
            });
            writes
        }
    }

    fn ratio(value: f64) -> SizeRatio {
        SizeRatio::new(value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_places_window_at_top() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                f.settings.set_window_height(ratio(0.5)).unwrap();

                let window = f.attach_window(1);

                let expected = Rect::new(0, 0, 1920, 540);
                assert_eq!(window.frame_rect(), expected);
                assert_eq!(f.sync.current_target_rect(), Some(expected));
                assert_eq!(
                    f.compositor.calls(),
                    vec![Call::MoveResize {
                        id: 1,
                        rect: expected
                    }]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_uses_current_monitor_scale() {
        LocalSet::new()
            .run_until(async {
                let compositor = Rc::new(MockCompositor::new().with_scale(2));
                let settings = Settings::new(Rc::new(MemorySettingsStore::new()));
                settings.set_window_height(ratio(0.31)).unwrap();
                let sync = GeometrySync::new(compositor.clone(), settings, DEFAULT_SETTLE_TIMEOUT);

                let window = compositor.create_window(1);
                let handle: WindowHandle = window.clone();
                sync.attach(&handle);

                assert_eq!(window.frame_rect().height, 334);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_move_resize_is_not_persisted() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                let writes = f.height_writes();

                f.attach_window(1);
                sleep(SETTLED).await;

                assert_eq!(writes.get(), 0);
                assert_eq!(f.settings.window_height(), SizeRatio::default());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_resize_persists_settled_ratio() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                let window = f.attach_window(1);
                sleep(SETTLED).await;
                let writes = f.height_writes();

                window.set_frame(Rect::new(0, 0, 1920, 324));
                sleep(SETTLED).await;

                assert_eq!(writes.get(), 1);
                assert!((f.settings.window_height().get() - 0.3).abs() < 1e-9);
                assert_eq!(
                    f.sync.current_target_rect(),
                    Some(Rect::new(0, 0, 1920, 324))
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_burst_is_written_once() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                let window = f.attach_window(1);
                sleep(SETTLED).await;
                let writes = f.height_writes();

                for height in [600, 500, 400] {
                    window.set_frame(Rect::new(0, 0, 1920, height));
                    sleep(Duration::from_millis(50)).await;
                }
                // Pointer motion keeps the drag alive
                f.compositor.move_cursor();
                sleep(Duration::from_millis(150)).await;
                window.set_frame(Rect::new(0, 0, 1920, 324));
                sleep(Duration::from_millis(150)).await;
                assert_eq!(writes.get(), 0);

                sleep(Duration::from_millis(100)).await;
                assert_eq!(writes.get(), 1);
                assert!((f.settings.window_height().get() - 0.3).abs() < 1e-9);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_monitor_skips_update() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                let window = f.attach_window(1);
                sleep(SETTLED).await;
                let writes = f.height_writes();

                window.set_monitor(None);
                window.set_frame(Rect::new(0, 0, 1920, 324));
                sleep(SETTLED).await;

                assert_eq!(writes.get(), 0);
                assert_eq!(f.settings.window_height(), SizeRatio::default());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ratio_uses_work_area_of_window_monitor() {
        LocalSet::new()
            .run_until(async {
                let compositor = Rc::new(MockCompositor::new().with_work_areas(vec![
                    Rect::new(0, 0, 1920, 1080),
                    Rect::new(1920, 0, 2560, 1440),
                ]));
                let settings = Settings::new(Rc::new(MemorySettingsStore::new()));
                let sync = GeometrySync::new(
                    compositor.clone(),
                    settings.clone(),
                    DEFAULT_SETTLE_TIMEOUT,
                );
                let f = Fixture {
                    compositor,
                    settings,
                    sync,
                };
                let window = f.attach_window(1);
                sleep(SETTLED).await;
                let writes = f.height_writes();

                // Dragged onto the second monitor and resized there
                window.set_monitor(Some(1));
                window.set_frame(Rect::new(1920, 0, 2560, 432));
                sleep(SETTLED).await;

                assert_eq!(writes.get(), 1);
                assert!((f.settings.window_height().get() - 0.3).abs() < 1e-9);
                assert_eq!(window.frame_rect(), Rect::new(1920, 0, 2560, 432));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_settle_timeout() {
        LocalSet::new()
            .run_until(async {
                let config = Config::new().with_settle_timeout(Duration::from_millis(500));
                let compositor = Rc::new(MockCompositor::new());
                let settings = Settings::new(Rc::new(MemorySettingsStore::new()));
                let sync = GeometrySync::new(
                    compositor.clone(),
                    settings.clone(),
                    config.settle_timeout,
                );
                let f = Fixture {
                    compositor,
                    settings,
                    sync,
                };
                let window = f.attach_window(1);
                sleep(Duration::from_millis(600)).await;
                let writes = f.height_writes();

                window.set_frame(Rect::new(0, 0, 1920, 324));
                sleep(Duration::from_millis(300)).await;
                assert_eq!(writes.get(), 0);

                sleep(Duration::from_millis(250)).await;
                assert_eq!(writes.get(), 1);
                assert!((f.settings.window_height().get() - 0.3).abs() < 1e-9);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_maximize_setting_keeps_ratio() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                f.settings.set_window_maximize(true).unwrap();
                let writes = f.height_writes();

                let window = f.attach_window(1);
                sleep(SETTLED).await;

                assert!(window.is_maximized(Axis::Vertical));
                assert_eq!(window.frame_rect().height, 1080);
                assert!(f.compositor.calls().contains(&Call::Maximize {
                    id: 1,
                    axis: Axis::Vertical
                }));
                assert_eq!(writes.get(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_maximize_restores_ratio() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                let window = f.attach_window(1);
                sleep(SETTLED).await;
                f.compositor.clear_calls();

                window.force_maximize(Axis::Vertical);
                assert!(window.is_maximized(Axis::Vertical));
                sleep(Duration::from_millis(1)).await;

                assert!(!window.is_maximized(Axis::Vertical));
                assert_eq!(window.frame_rect().height, 648);
                assert!(f.compositor.calls().contains(&Call::Unmaximize {
                    id: 1,
                    axis: Axis::Vertical
                }));

                sleep(SETTLED).await;
                assert_eq!(f.settings.window_height(), SizeRatio::default());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_maximize_at_full_ratio_is_kept() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                f.settings.set_window_height(SizeRatio::FULL).unwrap();
                let window = f.attach_window(1);

                window.force_maximize(Axis::Vertical);
                sleep(SETTLED).await;

                assert!(window.is_maximized(Axis::Vertical));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_change_reapplies_geometry() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                let window = f.attach_window(1);

                f.settings
                    .set_window_position(WindowPosition::Right)
                    .unwrap();

                assert_eq!(window.frame_rect(), Rect::new(768, 0, 1152, 1080));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_height_change_while_maximized_unmaximizes() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                f.settings.set_window_maximize(true).unwrap();
                let window = f.attach_window(1);
                assert!(window.is_maximized(Axis::Vertical));

                f.settings.set_window_height(ratio(0.4)).unwrap();

                assert!(!f.settings.window_maximize());
                assert!(!window.is_maximized(Axis::Vertical));
                assert_eq!(window.frame_rect(), Rect::new(0, 0, 1920, 432));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_releases_listeners() {
        LocalSet::new()
            .run_until(async {
                let f = Fixture::new();
                let window = f.attach_window(1);
                sleep(SETTLED).await;
                let writes = f.height_writes();

                window.set_frame(Rect::new(0, 0, 1920, 324));
                f.sync.detach();

                assert_eq!(window.listener_count(), 0);
                assert_eq!(f.sync.current_target_rect(), None);
                sleep(SETTLED).await;
                assert_eq!(writes.get(), 0);
            })
            .await;
    }
}

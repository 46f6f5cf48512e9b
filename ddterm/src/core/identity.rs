use ddterm_ipc::{APP_ID, WINDOW_PATH_PREFIX};

use crate::platform::CompositorWindow;

/// Whether the two identity attributes describe the managed terminal window.
///
/// Both attributes are set by the application after the window is created
/// and can change several times before they settle, so callers have to
/// re-check on every change notification of either one.
pub fn resolves(app_id: Option<&str>, object_path: Option<&str>) -> bool {
    app_id == Some(APP_ID)
        && object_path.is_some_and(|path| !path.is_empty() && path.starts_with(WINDOW_PATH_PREFIX))
}

pub fn is_managed_window(window: &dyn CompositorWindow) -> bool {
    resolves(window.app_id().as_deref(), window.object_path().as_deref())
}

/// Last known values of a window's identity attributes.
///
/// Each slot is written by its own change handler; writing either one
/// re-evaluates the resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRecord {
    app_id: Option<String>,
    object_path: Option<String>,
}

impl IdentityRecord {
    pub fn new(app_id: Option<String>, object_path: Option<String>) -> Self {
        Self {
            app_id,
            object_path,
        }
    }

    pub fn set_app_id(&mut self, app_id: Option<String>) -> bool {
        self.app_id = app_id;
        self.resolves()
    }

    pub fn set_object_path(&mut self, object_path: Option<String>) -> bool {
        self.object_path = object_path;
        self.resolves()
    }

    pub fn resolves(&self) -> bool {
        resolves(self.app_id.as_deref(), self.object_path.as_deref())
    }
}

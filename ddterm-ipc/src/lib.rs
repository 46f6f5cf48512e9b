pub mod action;
pub mod settings;

pub use action::{Action, APP_DBUS_PATH, APP_ID, UNDECORATED_FLAG, WINDOW_PATH_PREFIX};
pub use settings::{
    SettingValue, WindowPosition, DEFAULT_WINDOW_HEIGHT, WINDOW_HEIGHT_KEY, WINDOW_MAXIMIZE_KEY,
    WINDOW_POSITION_KEY,
};

use serde::{Deserialize, Serialize};

/// Window size along the position axis, as a fraction of the work area.
pub const WINDOW_HEIGHT_KEY: &str = "window-height";
/// Whether the window should be maximized along the position axis.
pub const WINDOW_MAXIMIZE_KEY: &str = "window-maximize";
/// Screen edge the window is attached to.
pub const WINDOW_POSITION_KEY: &str = "window-position";

pub const DEFAULT_WINDOW_HEIGHT: f64 = 0.6;

/// Screen edge the window is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPosition {
    #[default]
    Top,
    Bottom,
    Left,
    Right,
}

impl WindowPosition {
    pub fn name(&self) -> &'static str {
        match self {
            WindowPosition::Top => "top",
            WindowPosition::Bottom => "bottom",
            WindowPosition::Left => "left",
            WindowPosition::Right => "right",
        }
    }

    /// True for top/bottom, where the ratio controls the window height.
    pub fn is_vertical(&self) -> bool {
        matches!(self, WindowPosition::Top | WindowPosition::Bottom)
    }
}

impl std::fmt::Display for WindowPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for WindowPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "top" => Ok(WindowPosition::Top),
            "bottom" => Ok(WindowPosition::Bottom),
            "left" => Ok(WindowPosition::Left),
            "right" => Ok(WindowPosition::Right),
            _ => Err(format!(
                "Unknown window position: {} (use top, bottom, left, right)",
                s
            )),
        }
    }
}

/// Value of a persisted setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Double(f64),
    String(String),
}

impl SettingValue {
    pub fn as_double(&self) -> Option<f64> {
        match self {
            SettingValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{}", v),
            SettingValue::Double(v) => write!(f, "{}", v),
            SettingValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

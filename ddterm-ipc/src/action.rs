use serde::{Deserialize, Serialize};

/// Well-known bus name of the terminal application.
pub const APP_ID: &str = "com.github.amezin.ddterm";

/// Object path exporting the application's action group.
pub const APP_DBUS_PATH: &str = "/com/github/amezin/ddterm";

/// Every managed window exports its object path under this prefix.
pub const WINDOW_PATH_PREFIX: &str = "/com/github/amezin/ddterm/window/";

/// Flag passed to the application when it has to be launched locally.
pub const UNDECORATED_FLAG: &str = "--undecorated";

/// Remote actions exposed by the application's action group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Toggle,
    Show,
    Hide,
    Quit,
}

impl Action {
    /// Action name as registered in the application's action group.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Toggle => "toggle",
            Action::Show => "show",
            Action::Hide => "hide",
            Action::Quit => "quit",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "toggle" => Ok(Action::Toggle),
            "show" => Ok(Action::Show),
            "hide" => Ok(Action::Hide),
            "quit" => Ok(Action::Quit),
            _ => Err(format!(
                "Unknown action: {} (use toggle, show, hide, quit)",
                s
            )),
        }
    }
}

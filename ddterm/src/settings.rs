use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use ddterm_ipc::{
    SettingValue, WindowPosition, WINDOW_HEIGHT_KEY, WINDOW_MAXIMIZE_KEY, WINDOW_POSITION_KEY,
};

use crate::core::SizeRatio;
use crate::signal::Signal;

/// Persisted key/value settings with change notification.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<SettingValue>;
    /// Writing the current value again does not notify.
    fn set(&self, key: &str, value: SettingValue) -> Result<()>;
    /// Emitted with the key after every effective change.
    fn changed(&self) -> &Signal<String>;
}

/// In-memory store, used when nothing has to survive a restart.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RefCell<BTreeMap<String, SettingValue>>,
    changed: Signal<String>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: SettingValue) -> Result<()> {
        if !update_value(&self.values, key, value) {
            return Ok(());
        }
        self.changed.emit(&key.to_string());
        Ok(())
    }

    fn changed(&self) -> &Signal<String> {
        &self.changed
    }
}

/// Store backed by a JSON object on disk, rewritten on every change.
pub struct JsonSettingsStore {
    path: PathBuf,
    values: RefCell<BTreeMap<String, SettingValue>>,
    changed: Signal<String>,
}

impl JsonSettingsStore {
    /// A missing file yields an empty store; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Malformed settings file {:?}", path))?
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Loaded settings from {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            values: RefCell::new(values),
            changed: Signal::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &BTreeMap<String, SettingValue>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let json = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write settings to {:?}", self.path))?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.borrow().get(key).cloned()
    }

    /// The in-memory value only changes once the file has been written.
    fn set(&self, key: &str, value: SettingValue) -> Result<()> {
        let mut candidate = self.values.borrow().clone();
        if candidate.get(key) == Some(&value) {
            return Ok(());
        }
        tracing::debug!("Setting {}={}", key, value);
        candidate.insert(key.to_string(), value);

        self.save(&candidate)?;
        *self.values.borrow_mut() = candidate;
        self.changed.emit(&key.to_string());
        Ok(())
    }

    fn changed(&self) -> &Signal<String> {
        &self.changed
    }
}

fn update_value(
    values: &RefCell<BTreeMap<String, SettingValue>>,
    key: &str,
    value: SettingValue,
) -> bool {
    let mut values = values.borrow_mut();
    if values.get(key) == Some(&value) {
        return false;
    }
    tracing::debug!("Setting {}={}", key, value);
    values.insert(key.to_string(), value);
    true
}

/// Typed access to the window settings.
#[derive(Clone)]
pub struct Settings {
    store: Rc<dyn SettingsStore>,
}

impl Settings {
    pub fn new(store: Rc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn changed(&self) -> &Signal<String> {
        self.store.changed()
    }

    /// Invalid or missing values fall back to the default ratio.
    pub fn window_height(&self) -> SizeRatio {
        match self.store.get(WINDOW_HEIGHT_KEY) {
            None => SizeRatio::default(),
            Some(value) => match value.as_double().and_then(SizeRatio::new) {
                Some(ratio) => ratio,
                None => {
                    tracing::warn!("Ignoring invalid {}={}", WINDOW_HEIGHT_KEY, value);
                    SizeRatio::default()
                }
            },
        }
    }

    pub fn set_window_height(&self, ratio: SizeRatio) -> Result<()> {
        self.store
            .set(WINDOW_HEIGHT_KEY, SettingValue::Double(ratio.get()))
    }

    pub fn window_maximize(&self) -> bool {
        self.store
            .get(WINDOW_MAXIMIZE_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn set_window_maximize(&self, maximize: bool) -> Result<()> {
        self.store
            .set(WINDOW_MAXIMIZE_KEY, SettingValue::Bool(maximize))
    }

    pub fn window_position(&self) -> WindowPosition {
        let Some(value) = self.store.get(WINDOW_POSITION_KEY) else {
            return WindowPosition::default();
        };
        match value.as_str().map(str::parse::<WindowPosition>) {
            Some(Ok(position)) => position,
            _ => {
                tracing::warn!("Ignoring invalid {}={}", WINDOW_POSITION_KEY, value);
                WindowPosition::default()
            }
        }
    }

    pub fn set_window_position(&self, position: WindowPosition) -> Result<()> {
        self.store.set(
            WINDOW_POSITION_KEY,
            SettingValue::String(position.name().to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn temp_settings_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("ddterm-test-{}-{}", std::process::id(), name))
            .join("settings.json")
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::new(Rc::new(MemorySettingsStore::new()));
        assert_eq!(settings.window_height(), SizeRatio::default());
        assert!(!settings.window_maximize());
        assert_eq!(settings.window_position(), WindowPosition::Top);
    }

    #[test]
    fn test_typed_round_trip() {
        let settings = Settings::new(Rc::new(MemorySettingsStore::new()));
        settings
            .set_window_height(SizeRatio::new(0.3).unwrap())
            .unwrap();
        settings.set_window_maximize(true).unwrap();
        settings
            .set_window_position(WindowPosition::Right)
            .unwrap();

        assert_eq!(settings.window_height().get(), 0.3);
        assert!(settings.window_maximize());
        assert_eq!(settings.window_position(), WindowPosition::Right);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let store = Rc::new(MemorySettingsStore::new());
        store.set(WINDOW_HEIGHT_KEY, SettingValue::Double(1.5)).unwrap();
        store
            .set(WINDOW_POSITION_KEY, SettingValue::String("center".into()))
            .unwrap();

        let settings = Settings::new(store);
        assert_eq!(settings.window_height(), SizeRatio::default());
        assert_eq!(settings.window_position(), WindowPosition::Top);
    }

    #[test]
    fn test_change_notification_only_on_change() {
        let store = Rc::new(MemorySettingsStore::new());
        let keys = Rc::new(RefCell::new(Vec::new()));
        let keys_clone = Rc::clone(&keys);
        store
            .changed()
            .connect(move |key| keys_clone.borrow_mut().push(key.clone()));

        let settings = Settings::new(store);
        settings.set_window_maximize(true).unwrap();
        settings.set_window_maximize(true).unwrap();
        settings.set_window_maximize(false).unwrap();

        assert_eq!(
            *keys.borrow(),
            vec![WINDOW_MAXIMIZE_KEY.to_string(), WINDOW_MAXIMIZE_KEY.to_string()]
        );
    }

    #[test]
    fn test_json_store_persists() {
        let path = temp_settings_path("persist");
        let _ = std::fs::remove_file(&path);

        {
            let store = JsonSettingsStore::load(&path).unwrap();
            let notified = Rc::new(Cell::new(0));
            let notified_clone = Rc::clone(&notified);
            store
                .changed()
                .connect(move |_| notified_clone.set(notified_clone.get() + 1));

            store.set(WINDOW_HEIGHT_KEY, SettingValue::Double(0.45)).unwrap();
            store
                .set(WINDOW_POSITION_KEY, SettingValue::String("bottom".into()))
                .unwrap();
            assert_eq!(notified.get(), 2);
        }

        let store = JsonSettingsStore::load(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        let settings = Settings::new(Rc::new(store));
        assert_eq!(settings.window_height().get(), 0.45);
        assert_eq!(settings.window_position(), WindowPosition::Bottom);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_json_store_failed_write_leaves_value_unchanged() {
        // The settings directory is a regular file, so nothing can be written below it
        let blocker = temp_settings_path("unwritable").parent().unwrap().to_path_buf();
        let _ = std::fs::remove_dir_all(&blocker);
        std::fs::write(&blocker, "").unwrap();
        let path = blocker.join("ddterm").join("settings.json");

        let store = JsonSettingsStore::load(&path).unwrap();
        let notified = Rc::new(Cell::new(0));
        let notified_clone = Rc::clone(&notified);
        store
            .changed()
            .connect(move |_| notified_clone.set(notified_clone.get() + 1));

        assert!(store.set(WINDOW_HEIGHT_KEY, SettingValue::Double(0.3)).is_err());
        assert_eq!(store.get(WINDOW_HEIGHT_KEY), None);
        // Retrying the same value is still attempted, and fails again
        assert!(store.set(WINDOW_HEIGHT_KEY, SettingValue::Double(0.3)).is_err());
        assert_eq!(notified.get(), 0);

        let _ = std::fs::remove_file(&blocker);
    }

    #[test]
    fn test_json_store_rejects_malformed_file() {
        let path = temp_settings_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        assert!(JsonSettingsStore::load(&path).is_err());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

pub mod app;
pub mod core;
pub mod dbus;
pub mod platform;
pub mod settings;
pub mod settle;
pub mod signal;

mod config;
mod geometry;
mod identity;

pub use config::*;
pub use geometry::*;
pub use identity::*;

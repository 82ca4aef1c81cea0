//! BrickPub settings crate
//!
//! Application configuration, validation, and persistence. Settings are
//! plain serde structs saved as TOML or JSON in the platform
//! configuration directory; nothing here touches the document model.

pub mod config;
pub mod persistence;

pub use config::{Config, MessageSettings, RecentFiles, RenderSettings};
pub use persistence::SettingsPersistence;

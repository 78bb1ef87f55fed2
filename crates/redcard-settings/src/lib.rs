//! # redcard-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RedcardSettings::default()`]
//! 2. **User file**: `~/.redcard/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `REDCARD_*` overrides (highest priority)
//!
//! The loaded value is handed to the server and game at construction time;
//! there is no process-wide settings global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (snapshot, journal, lease) | `~/Library/Application Support/capture-pilot/` | `~/.local/share/capture-pilot/` |
//! | Config | `~/Library/Application Support/capture-pilot/` | `~/.config/capture-pilot/` |
//!
//! Overrides: `CAPTURE_PILOT_DATA_DIR`, `CAPTURE_PILOT_CONFIG_DIR`.

use std::path::PathBuf;

const APP_DIR_NAME: &str = "capture-pilot";

/// Runtime data directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CAPTURE_PILOT_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/capture-pilot-data"))
}

/// Configuration directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CAPTURE_PILOT_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/capture-pilot-config"))
}

/// Default `config.toml` location.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

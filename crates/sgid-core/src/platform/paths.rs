//! Platform-specific paths for the identifier database.

use crate::config::StoreConfig;
use crate::error::{Result, SgidError};
use std::path::PathBuf;

/// Get the sgid configuration directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/sgid` (XDG_CONFIG_HOME)
/// - **Windows**: `%APPDATA%\sgid`
/// - **macOS**: `~/Library/Application Support/sgid`
pub fn sgid_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| SgidError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join(StoreConfig::APP_CONFIG_DIR_NAME))
}

/// Get the path to the default identifier database.
///
/// Returns `{sgid_config_dir}/identifiers.db`.
pub fn default_db_path() -> Result<PathBuf> {
    Ok(sgid_config_dir()?.join(StoreConfig::DB_FILENAME))
}

//! Platform abstraction layer.
//!
//! - `paths` - Platform-specific directory and file paths

pub mod paths;

pub use paths::{default_db_path, sgid_config_dir};

pub mod common;

use anyhow::Result;
use std::path::PathBuf;

pub use common::{atomic_write, atomic_write_private, ensure_directory_exists};

const APP_NAME: &str = "parent-gate";

/// Get the platform-specific configuration file path
///
/// The system-wide location wins when it exists; otherwise the per-user
/// configuration directory is used.
pub fn get_config_path() -> Result<PathBuf> {
    let system_path = system_config_path();
    if let Some(path) = &system_path {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        return Ok(dirs.config_dir().join("config.yaml"));
    }

    system_path.ok_or_else(|| anyhow::anyhow!("Could not determine config file location"))
}

/// Get the directory holding gate state and the credential file
pub fn get_data_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let system_dir = PathBuf::from("/var/lib/parent-gate");
        if system_dir.exists() {
            return Ok(system_dir);
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        return Ok(dirs.data_local_dir().to_path_buf());
    }

    anyhow::bail!("Could not determine data directory location");
}

fn system_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Some(PathBuf::from("/etc/parent-gate/config.yaml"))
    }

    #[cfg(target_os = "macos")]
    {
        Some(PathBuf::from(
            "/Library/Application Support/parent-gate/config.yaml",
        ))
    }

    #[cfg(target_os = "windows")]
    {
        let mut path = PathBuf::from(
            std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".to_string()),
        );
        path.push(APP_NAME);
        path.push("config.yaml");
        Some(path)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

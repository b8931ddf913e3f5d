//! Storage location helpers.

use std::env;
use std::path::PathBuf;

const APP_AUTHOR: &str = "DreamDiary";

/// Default SQLite file name inside [`db_storage_path`].
pub const DEFAULT_DB_FILE: &str = "dreamdiary.db";

/// Returns the directory SQLite databases live in.
///
/// On Linux: `~/.local/share/DreamDiary/<project>`
/// On macOS: `~/Library/Application Support/DreamDiary/<project>`
/// On Windows: `%LOCALAPPDATA%\DreamDiary\<project>`
///
/// The directory is not created here; the store does that on open.
pub fn db_storage_path() -> PathBuf {
    let project = get_project_directory_name();

    let base = if cfg!(target_os = "linux") {
        let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".local").join("share")
    } else if cfg!(target_os = "macos") {
        let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join("Library").join("Application Support")
    } else if cfg!(target_os = "windows") {
        let local_app_data = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("APPDATA").unwrap_or_else(|_| "C:\\tmp".to_string()));
        PathBuf::from(local_app_data)
    } else {
        PathBuf::from("/tmp")
    };

    base.join(APP_AUTHOR).join(project)
}

/// Default path of the SQLite database file.
pub fn default_db_path() -> PathBuf {
    db_storage_path().join(DEFAULT_DB_FILE)
}

/// Returns the project directory name.
///
/// Uses `DREAMDIARY_STORAGE_DIR` if set, otherwise the name of the current
/// working directory.
pub fn get_project_directory_name() -> String {
    env::var("DREAMDIARY_STORAGE_DIR").unwrap_or_else(|_| {
        env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "dreamdiary_default".to_string())
    })
}

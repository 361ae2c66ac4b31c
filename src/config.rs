// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Runtime settings, all taken from the environment.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// File name of the session store.
pub const DATA_FILE_NAME: &str = "billable_tracker_data.json";

/// Per-user directory (under `$HOME`) holding the store in release builds.
pub const DATA_DIR_NAME: &str = ".billable_tracker";

/// Overrides the store location.
pub const DATA_ENV: &str = "BILLABLE_TRACKER_DATA";

/// If set to `1`/`true`/`yes`, log at debug level.
pub const DEBUG_ENV: &str = "BILLABLE_DEBUG";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub data_file: PathBuf,
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_file: data_file_path(env::var_os(DATA_ENV), !cfg!(debug_assertions), dirs::home_dir()),
            debug: env::var(DEBUG_ENV)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        }
    }
}

/// Resolves the store path: explicit override, else the working directory for development
/// builds, else `$HOME/.billable_tracker/` for installed (release) builds.
fn data_file_path(override_path: Option<OsString>, installed: bool, home: Option<PathBuf>) -> PathBuf {
    if let Some(p) = override_path.filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    if installed {
        if let Some(home) = home {
            return home.join(DATA_DIR_NAME).join(DATA_FILE_NAME);
        }
    }
    PathBuf::from(DATA_FILE_NAME)
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::warn;

const APP_DIR: &str = "bondruck";

/// Return the agent data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = base_dir(std::env::var_os("XDG_DATA_HOME"), std::env::var_os("HOME")).join(APP_DIR);
    ensure(&dir);
    dir
}

/// Return a subdirectory inside the data dir (e.g. "logs").
pub fn data_subdir(name: &str) -> PathBuf {
    let dir = data_dir().join(name);
    ensure(&dir);
    dir
}

/// Directory holding `bondruck.log`.
pub fn log_dir() -> PathBuf {
    data_subdir("logs")
}

fn ensure(dir: &std::path::Path) {
    if let Err(err) = std::fs::create_dir_all(dir) {
        warn!(path = %dir.display(), %err, "cannot create data directory");
    }
}

fn base_dir(xdg_data_home: Option<OsString>, home: Option<OsString>) -> PathBuf {
    // XDG requires an absolute path; anything else is ignored.
    if let Some(xdg) = xdg_data_home.map(PathBuf::from).filter(|p| p.is_absolute()) {
        return xdg;
    }
    if let Some(home) = home {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}

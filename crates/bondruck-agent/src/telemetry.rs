// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Logging to stderr and to `<data_dir>/logs/bondruck.log`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::AgentError;

pub const LOG_FILE: &str = "bondruck.log";

/// Keeps the background log writer alive; drop it last.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init(log_dir: &Path) -> Result<LoggingGuard, AgentError> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| AgentError::Logging(format!("{}: {e}", log_dir.display())))?;

    // Appends across restarts so earlier failures stay inspectable.
    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| AgentError::Logging(format!("failed to install tracing subscriber: {e}")))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Errors surfaced by the agent binary itself (startup, CLI commands).
// Per-request print failures never reach this type; they become outcomes.

use thiserror::Error;

use bondruck_core::BondruckError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Core(#[from] BondruckError),

    #[error("cannot bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("agent request failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

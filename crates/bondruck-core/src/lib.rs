// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bondruck: Core types, configuration snapshot and error definitions shared
// across all crates.

pub mod config;
pub mod digest;
pub mod error;
pub mod types;

pub use config::AgentConfig;
pub use error::{BondruckError, ErrorKind};
pub use types::*;

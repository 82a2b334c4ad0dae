// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: persisted configuration, data directory and the operator
// helpers the CLI exposes.

pub mod collaborators;
pub mod config_store;
pub mod data_dir;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bondruck Print: printer resolution, job dispatch to the OS printing
// system, and the per-request orchestration that ties them to the renderer.

pub mod directory;
pub mod dispatcher;
pub mod orchestrator;

pub use directory::{LpstatSource, PrinterSource, StaticSource, resolve};
pub use dispatcher::{
    Completion, IppBackend, LpBackend, PrintBackend, PrintDispatcher, PrintJob, backend_for,
};
pub use orchestrator::PrintOrchestrator;

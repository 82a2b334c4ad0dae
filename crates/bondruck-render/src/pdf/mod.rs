// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF payloads: transport decoding and shell validation.

pub mod reader;

pub use reader::{PdfShell, decode_transport};

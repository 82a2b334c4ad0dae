// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bondruck-render: Render sessions for the Bondruck print agent.
//
// Turns an HTML or PDF payload into a stable, printable document: embedded
// resources are fetched and settled, barcode placeholders are generated, a
// medium layout overlay is applied for roll printers and the content height
// is measured to size the page.

pub mod convert;
pub mod graphics;
pub mod html;
pub mod measure;
pub mod overlay;
pub mod pdf;
pub mod resources;
pub mod session;

pub use graphics::{BarcodeSpec, code128_svg};
pub use measure::estimate_height_mm;
pub use overlay::LayoutOverlay;
pub use resources::ResourceLoader;
pub use session::{
    MaterializedDocument, NO_HTML_CONVERTER, RenderSession, RenderSettings, Renderer,
};

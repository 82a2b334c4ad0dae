// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the layout path of bondruck-render: height
// estimation over a long receipt and barcode generation.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use bondruck_core::MediumProfile;
use bondruck_render::measure::MeasureInputs;
use bondruck_render::{BarcodeSpec, code128_svg, estimate_height_mm};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// A 200-line receipt with a header table and a barcode footer.
fn long_receipt() -> String {
    let mut html = String::from(
        "<html><head><style>td{padding:0}</style></head><body><h1>Bondruck Café</h1><table>",
    );
    for i in 0..200 {
        html.push_str(&format!(
            "<tr><td>{i} × Flat white, oat milk</td><td>4.20</td></tr>"
        ));
    }
    html.push_str("</table><hr><div data-barcode=\"ORDER-000123\"></div></body></html>");
    html
}

fn bench_estimate_height(c: &mut Criterion) {
    let html = long_receipt();
    let inputs = MeasureInputs::default();
    c.bench_function("estimate_height_mm (200 lines)", |b| {
        b.iter(|| {
            let mm = estimate_height_mm(black_box(&html), &MediumProfile::ROLL_80MM, &inputs);
            black_box(mm.ok());
        });
    });
}

fn bench_code128(c: &mut Criterion) {
    let spec = BarcodeSpec::new("ORDER-000123");
    c.bench_function("code128_svg (12 chars)", |b| {
        b.iter(|| black_box(code128_svg(black_box(&spec), 272.0).ok()));
    });
}

criterion_group!(benches, bench_estimate_height, bench_code128);
criterion_main!(benches);

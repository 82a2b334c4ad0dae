// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Medium layout overlay: a style block injected into the document head that
// clamps content to the printable width of a roll, centres it and then moves
// it sideways by the configured horizontal offset.
//
// The overlay never edits the payload itself. It is composed into the
// document only when the session materializes it, so removing it restores the
// payload exactly.

use bondruck_core::types::MediumProfile;
use tracing::warn;

/// `id` of the injected `<style>` element.
pub const OVERLAY_ELEMENT_ID: &str = "bondruck-layout-overlay";

/// Style overlay derived from a medium profile and a horizontal offset.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOverlay {
    profile: MediumProfile,
    offset_mm: f64,
}

impl LayoutOverlay {
    /// Build the overlay for `profile`, shifted right by exactly
    /// `horizontal_offset_mm`. Non-finite offsets are treated as zero.
    pub fn for_profile(profile: &MediumProfile, horizontal_offset_mm: f64) -> Self {
        let side = profile.side_margin_mm();
        let offset_mm = if horizontal_offset_mm.is_finite() {
            horizontal_offset_mm
        } else {
            0.0
        };
        if offset_mm.abs() > side {
            warn!(
                offset_mm,
                side_margin_mm = side,
                "horizontal offset exceeds the side margin; content runs past the roll edge"
            );
        }
        Self {
            profile: *profile,
            offset_mm,
        }
    }

    pub fn profile(&self) -> &MediumProfile {
        &self.profile
    }

    pub fn offset_mm(&self) -> f64 {
        self.offset_mm
    }

    /// Distance from the left roll edge to the printable area.
    pub fn left_margin_mm(&self) -> f64 {
        self.profile.side_margin_mm() + self.offset_mm
    }

    /// Distance from the printable area to the right roll edge. Negative
    /// when the offset pushes content past the edge.
    pub fn right_margin_mm(&self) -> f64 {
        self.profile.side_margin_mm() - self.offset_mm
    }

    /// CSS rules of the overlay.
    pub fn css(&self) -> String {
        let p = &self.profile;
        format!(
            "@page{{margin:0}}\
             html,body{{margin:0!important;padding:0!important;width:{total}mm!important;\
             min-width:0!important;max-width:none!important;box-sizing:border-box!important}}\
             body{{padding:{top}mm {side}mm {bottom}mm {side}mm!important;\
             position:relative!important;left:{offset}mm!important;\
             -webkit-print-color-adjust:exact;print-color-adjust:exact}}\
             body>*{{max-width:{printable}mm!important;box-sizing:border-box}}\
             img,svg,table{{max-width:100%!important}}\
             img{{height:auto}}",
            total = fmt_mm(p.total_width_mm),
            printable = fmt_mm(p.printable_width_mm),
            top = fmt_mm(p.margin_offsets.top_mm),
            bottom = fmt_mm(p.margin_offsets.bottom_mm),
            side = fmt_mm(p.side_margin_mm()),
            offset = fmt_mm(self.offset_mm),
        )
    }

    /// The overlay as a complete `<style>` element.
    pub fn style_element(&self) -> String {
        format!(
            "<style id=\"{OVERLAY_ELEMENT_ID}\">{}</style>",
            self.css()
        )
    }
}

/// Millimetre values with at most two decimals and no trailing zeros.
fn fmt_mm(value: f64) -> String {
    let s = format!("{value:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_owned() } else { s.to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_on_80mm_roll() {
        let overlay = LayoutOverlay::for_profile(&MediumProfile::ROLL_80MM, 0.0);
        assert_eq!(overlay.left_margin_mm(), 4.0);
        assert_eq!(overlay.right_margin_mm(), 4.0);
        let css = overlay.css();
        assert!(css.contains("width:80mm!important"));
        assert!(css.contains("max-width:72mm!important"));
        assert!(css.contains("padding:0!important"));
    }

    #[test]
    fn offset_shifts_printable_area() {
        let overlay = LayoutOverlay::for_profile(&MediumProfile::ROLL_80MM, 1.5);
        assert_eq!(overlay.left_margin_mm(), 5.5);
        assert_eq!(overlay.right_margin_mm(), 2.5);
        let css = overlay.css();
        assert!(css.contains("padding:0mm 4mm 0mm 4mm!important"));
        assert!(css.contains("left:1.5mm!important"));
    }

    #[test]
    fn offset_beyond_side_margin_is_applied_in_full() {
        let overlay = LayoutOverlay::for_profile(&MediumProfile::ROLL_80MM, 6.0);
        assert_eq!(overlay.left_margin_mm() - 4.0, 6.0);
        assert_eq!(overlay.right_margin_mm(), -2.0);
        assert!(overlay.css().contains("left:6mm!important"));

        let overlay = LayoutOverlay::for_profile(&MediumProfile::ROLL_58MM, -40.0);
        assert_eq!(overlay.offset_mm(), -40.0);
        assert!(overlay.css().contains("left:-40mm!important"));
    }

    #[test]
    fn non_finite_offset_is_ignored() {
        let overlay = LayoutOverlay::for_profile(&MediumProfile::ROLL_58MM, f64::NAN);
        assert_eq!(overlay.left_margin_mm(), 5.0);
        assert!(overlay.css().contains("left:0mm!important"));
    }

    #[test]
    fn style_element_is_tagged() {
        let overlay = LayoutOverlay::for_profile(&MediumProfile::ROLL_58MM, 0.0);
        assert!(
            overlay
                .style_element()
                .starts_with("<style id=\"bondruck-layout-overlay\">")
        );
    }

    #[test]
    fn mm_formatting() {
        assert_eq!(fmt_mm(4.0), "4");
        assert_eq!(fmt_mm(2.25), "2.25");
        assert_eq!(fmt_mm(-0.0), "0");
    }
}

use std::collections::BTreeSet;

use serde::{Serialize, Serializer};

use crate::segment::Segments;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Serialized as `#RRGGBB`.
impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

pub const DEFAULT_COLOR: Rgb = Rgb(0x00, 0x00, 0x00);

const GEAR_COLORS: [Rgb; 5] = [
    Rgb(0xE7, 0x4C, 0x3C), // red
    Rgb(0xF3, 0x9C, 0x12), // orange
    Rgb(0x2E, 0xCC, 0x71), // green
    Rgb(0x34, 0x98, 0xDB), // blue
    Rgb(0x9B, 0x59, 0xB6), // purple
];

/// Palette colour for gears 1 through 5, black for anything else.
pub fn gear_color(gear: u32) -> Rgb {
    match gear {
        1..=5 => GEAR_COLORS[gear as usize - 1],
        _ => DEFAULT_COLOR,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegendEntry {
    pub gear: u32,
    pub label: String,
    pub color: Rgb,
    /// Whether a dashed rev-match sample is shown next to the solid RPM one.
    pub revmatch: bool,
}

/// One legend row per distinct gear across both segment families, ascending.
pub fn build_legend(segments: &Segments) -> Vec<LegendEntry> {
    let revmatch_gears: BTreeSet<u32> = segments.revmatch.iter().map(|s| s.gear()).collect();
    let all_gears: BTreeSet<u32> = segments
        .rpm
        .iter()
        .map(|s| s.gear())
        .chain(revmatch_gears.iter().copied())
        .collect();

    all_gears
        .into_iter()
        .map(|gear| LegendEntry {
            gear,
            label: format!("Gear {}", gear),
            color: gear_color(gear),
            revmatch: revmatch_gears.contains(&gear),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment;
    use crate::telemetry::Sample;
    use crate::REVMATCH_NONE;

    #[test]
    fn test_gear_color_palette_and_default() {
        assert_eq!(gear_color(1).hex(), "#E74C3C");
        assert_eq!(gear_color(5).hex(), "#9B59B6");
        assert_eq!(gear_color(0), DEFAULT_COLOR);
        assert_eq!(gear_color(6), DEFAULT_COLOR);
    }

    #[test]
    fn test_legend_deduplicates_gears() {
        let samples = vec![
            Sample::new(0.0, 2000.0, 1, REVMATCH_NONE),
            Sample::new(1.0, 3000.0, 2, 5200.0),
            Sample::new(2.0, 3100.0, 2, 5300.0),
            Sample::new(3.0, 2500.0, 3, 4100.0),
            Sample::new(4.0, 2000.0, 1, REVMATCH_NONE),
        ];
        let segments = segment(&samples);
        // rpm keys 1,2,3,1 and revmatch keys 1,2
        let legend = build_legend(&segments);
        assert_eq!(legend.len(), 3);
        let gears: Vec<u32> = legend.iter().map(|e| e.gear).collect();
        assert_eq!(gears, vec![1, 2, 3]);
        assert!(legend[0].revmatch);
        assert!(legend[1].revmatch);
        assert!(!legend[2].revmatch);
        assert_eq!(legend[2].label, "Gear 3");
    }

    #[test]
    fn test_legend_includes_revmatch_only_gear() {
        // Rev-match target gear 4 never appears as a driven gear.
        let samples = vec![
            Sample::new(0.0, 3000.0, 5, 3900.0),
            Sample::new(1.0, 3050.0, 5, 3950.0),
        ];
        let legend = build_legend(&segment(&samples));
        let gears: Vec<u32> = legend.iter().map(|e| e.gear).collect();
        assert_eq!(gears, vec![4, 5]);
        assert!(legend[0].revmatch);
        assert!(!legend[1].revmatch);
    }

    #[test]
    fn test_legend_entry_json_uses_hex_colour() {
        let samples = vec![Sample::new(0.0, 3000.0, 2, 5200.0)];
        let legend = build_legend(&segment(&samples));
        let json = serde_json::to_value(&legend).unwrap();
        assert_eq!(json[0]["gear"], 1);
        assert_eq!(json[0]["color"], "#E74C3C");
        assert_eq!(json[1]["label"], "Gear 2");
        assert_eq!(json[1]["color"], "#F39C12");
        assert_eq!(json[1]["revmatch"], false);
    }
}

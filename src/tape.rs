/// TZe tape geometry at 180 dpi.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TapeInfo {
    pub width_mm: u8,    // Nominal tape width in mm
    pub width_px: u16,   // Printable width in dots
    pub margin_mm: f32,  // Unprintable margin on each side
}

impl TapeInfo {
    pub fn mm_to_dots(mm: f32, dpi: u16) -> u32 {
        ((mm * dpi as f32) / 25.4).round() as u32
    }

    /// Dots lost to the margins on one side.
    pub fn margin_dots(&self, dpi: u16) -> u32 {
        Self::mm_to_dots(self.margin_mm, dpi)
    }
}

impl std::fmt::Display for TapeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 4 mm cartridges are sold as 3.5 mm
        if self.width_mm == 4 {
            write!(f, "3.5mm ({} dots)", self.width_px)
        } else {
            write!(f, "{}mm ({} dots)", self.width_mm, self.width_px)
        }
    }
}

#[rustfmt::skip]
pub static TAPES: &[TapeInfo] = &[
    TapeInfo { width_mm:  4, width_px:  24, margin_mm: 0.5 },
    TapeInfo { width_mm:  6, width_px:  32, margin_mm: 1.0 },
    TapeInfo { width_mm:  9, width_px:  52, margin_mm: 1.0 },
    TapeInfo { width_mm: 12, width_px:  76, margin_mm: 2.0 },
    TapeInfo { width_mm: 18, width_px: 120, margin_mm: 3.0 },
    TapeInfo { width_mm: 24, width_px: 128, margin_mm: 3.0 },
    TapeInfo { width_mm: 36, width_px: 192, margin_mm: 4.5 },
];

pub fn find_tape_info(width_mm: u8) -> Option<&'static TapeInfo> {
    TAPES.iter().find(|tape| tape.width_mm == width_mm)
}

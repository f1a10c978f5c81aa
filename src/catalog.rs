//! Static device catalog
//!
//! Supported models, error bits, and the code tables used to resolve the
//! scalar fields of a status frame. Everything here is read-only and
//! lookups are first-match-wins on exact field equality.
//!
//! Reference: Brother P-touch Raster Command Reference (PT-P700/P750W),
//! "Status information" section.

use std::fmt;
use std::str::FromStr;

pub use crate::tape::{TAPES, TapeInfo, find_tape_info};

/// Per-model protocol switch.
///
/// Capabilities are named flags, never ordinals; the print engine consults
/// them instead of branching on the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Uses a different raster transfer protocol entirely (not implemented)
    UnsupportedRaster,
    /// Raster lines are framed as (single-run) PackBits
    RasterPackbits,
    /// Device is in P-Lite mass-storage mode
    PliteMode,
    /// P700-style raster mode selection (`1B 4D 62 00`)
    AltRasterSelect,
    /// Needs the print information command before raster data
    UseInfoCommand,
    /// Supports the precut command
    HasPrecut,
    /// PT-D460BT family pre-raster magic
    D460btMagic,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::UnsupportedRaster,
        Capability::RasterPackbits,
        Capability::PliteMode,
        Capability::AltRasterSelect,
        Capability::UseInfoCommand,
        Capability::HasPrecut,
        Capability::D460btMagic,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::UnsupportedRaster => "UNSUPPORTED_RASTER",
            Capability::RasterPackbits => "RASTER_PACKBITS",
            Capability::PliteMode => "PLITE_MODE",
            Capability::AltRasterSelect => "ALT_RASTER_SELECT",
            Capability::UseInfoCommand => "USE_INFO_COMMAND",
            Capability::HasPrecut => "HAS_PRECUT",
            Capability::D460btMagic => "D460BT_MAGIC",
        };
        f.write_str(name)
    }
}

/// Immutable set of [`Capability`] flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);

    pub const fn of(caps: &[Capability]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < caps.len() {
            bits |= caps[i].bit();
            i += 1;
        }
        Capabilities(bits)
    }

    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |cap| self.contains(*cap))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        let names: Vec<String> = self.iter().map(|cap| cap.to_string()).collect();
        f.write_str(&names.join(","))
    }
}

/// USB vendor/product pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbId {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        UsbId {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Parses `vendor_id:product_id` in hex, e.g. `04f9:2061`.
impl FromStr for UsbId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vendor_str, product_str) = s
            .split_once(':')
            .ok_or("USB device specifier must be in format vendor_id:product_id")?;
        let parse = |part: &str| {
            u16::from_str_radix(part.trim_start_matches("0x"), 16)
                .map_err(|e| format!("Invalid USB id {:?}: {}", part, e))
        };
        Ok(UsbId::new(parse(vendor_str)?, parse(product_str)?))
    }
}

/// One supported printer model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceType {
    pub usb: UsbId,
    pub name: &'static str,
    /// Printhead width in dots
    pub max_width_px: u16,
    pub dpi: u16,
    pub capabilities: Capabilities,
}

impl DeviceType {
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Bytes in one raster line (one bit per printhead dot).
    pub fn raster_line_len(&self) -> usize {
        self.max_width_px as usize / 8
    }
}

const BROTHER: u16 = 0x04f9;

const fn device(product_id: u16, name: &'static str, caps: &[Capability]) -> DeviceType {
    DeviceType {
        usb: UsbId::new(BROTHER, product_id),
        name,
        max_width_px: 128,
        dpi: 180,
        capabilities: Capabilities::of(caps),
    }
}

use Capability::*;

#[rustfmt::skip]
pub static DEVICE_TYPES: &[DeviceType] = &[
    device(0x2007, "PT-2420PC",             &[RasterPackbits]),
    device(0x2011, "PT-2450PC",             &[RasterPackbits]),
    device(0x2019, "PT-1950",               &[RasterPackbits]),
    device(0x201f, "PT-2700",               &[HasPrecut]),
    device(0x202c, "PT-1230PC",             &[]),
    device(0x202d, "PT-2430PC",             &[]),
    device(0x2030, "PT-1230PC (PLite Mode)", &[PliteMode]),
    device(0x2031, "PT-2430PC (PLite Mode)", &[PliteMode]),
    device(0x2041, "PT-2730",               &[]),
    device(0x205e, "PT-H500",               &[RasterPackbits]),
    device(0x205f, "PT-E500",               &[RasterPackbits]),
    device(0x2061, "PT-P700",               &[RasterPackbits, AltRasterSelect, HasPrecut]),
    device(0x2062, "PT-P750W",              &[RasterPackbits, AltRasterSelect]),
    device(0x2064, "PT-P700 (PLite Mode)",  &[PliteMode]),
    device(0x2065, "PT-P750W (PLite Mode)", &[PliteMode]),
    device(0x20df, "PT-D410",               &[UseInfoCommand, HasPrecut, D460btMagic]),
    device(0x2073, "PT-D450",               &[UseInfoCommand]),
    device(0x20e0, "PT-D460BT",             &[AltRasterSelect, UseInfoCommand, HasPrecut, D460btMagic]),
    device(0x2074, "PT-D600",               &[RasterPackbits]),
    device(0x20e1, "PT-D610BT",             &[AltRasterSelect, UseInfoCommand, HasPrecut, D460btMagic]),
    device(0x20af, "PT-P710BT",             &[RasterPackbits, HasPrecut]),
    device(0x2060, "PT-E550W",              &[UnsupportedRaster]),
];

pub fn find_device_type(vendor_id: u16, product_id: u16) -> Option<&'static DeviceType> {
    DEVICE_TYPES
        .iter()
        .find(|dt| dt.usb.vendor_id == vendor_id && dt.usb.product_id == product_id)
}

/// The (vendor, product) pairs a transport may open.
pub fn usb_filters() -> Vec<UsbId> {
    DEVICE_TYPES.iter().map(|dt| dt.usb).collect()
}

/// One bit of the 16-bit error word.
#[derive(Debug, PartialEq, Eq)]
pub struct ErrorInformation {
    pub mask: u16,
    pub description: &'static str,
    /// Recoverable conditions are reported but do not block printing
    pub can_still_print: bool,
}

const fn error(mask: u16, description: &'static str, can_still_print: bool) -> ErrorInformation {
    ErrorInformation {
        mask,
        description,
        can_still_print,
    }
}

#[rustfmt::skip]
pub static ERROR_INFORMATIONS: &[ErrorInformation] = &[
    error(0x0001, "No media",                   false),
    error(0x0002, "End of media",               false),
    error(0x0004, "Cutter jam",                 false),
    error(0x0008, "Weak batteries",             true),
    error(0x0010, "Printer in use",             true),
    error(0x0020, "Printer turned off",         false),
    error(0x0040, "High-voltage adapter",       true),
    error(0x0080, "Fan motor error",            false),
    error(0x0100, "Replace media",              false),
    error(0x0200, "Expansion buffer full",      false),
    error(0x0400, "Communication error",        false),
    error(0x0800, "Communication buffer full",  false),
    error(0x1000, "Cover open",                 false),
    error(0x2000, "Overheating",                false),
    error(0x4000, "Black marking not detected", false),
    error(0x8000, "System error",               false),
];

/// Every table entry whose mask shares a bit with `error_word`, in table order.
pub fn find_matching_errors(error_word: u16) -> Vec<&'static ErrorInformation> {
    ERROR_INFORMATIONS
        .iter()
        .filter(|ei| ei.mask & error_word != 0)
        .collect()
}

/// A code-to-description entry, with an optional display colour (0xRRGGBB).
#[derive(Debug, PartialEq, Eq)]
pub struct CodeEntry {
    pub code: u8,
    pub description: &'static str,
    pub color: Option<u32>,
}

const fn code(code: u8, description: &'static str) -> CodeEntry {
    CodeEntry {
        code,
        description,
        color: None,
    }
}

const fn colored(code: u8, description: &'static str, rgb: u32) -> CodeEntry {
    CodeEntry {
        code,
        description,
        color: Some(rgb),
    }
}

fn find_code(table: &'static [CodeEntry], code: u8) -> Option<&'static CodeEntry> {
    table.iter().find(|entry| entry.code == code)
}

#[rustfmt::skip]
pub static MEDIA_TYPES: &[CodeEntry] = &[
    code(0x00, "No media"),
    code(0x01, "Laminated tape"),
    code(0x03, "Non-laminated tape"),
    code(0x04, "Fabric tape"),
    code(0x11, "Heat-shrink tube (HS 2:1)"),
    code(0x13, "Fle tape"),
    code(0x14, "Flexible ID tape"),
    code(0x15, "Satin tape"),
    code(0x17, "Heat-shrink tube (HS 3:1)"),
    code(0xff, "Incompatible tape"),
];

#[rustfmt::skip]
pub static TAPE_COLORS: &[CodeEntry] = &[
    colored(0x01, "White",                  0xffffff),
    code(0x02, "Other"),
    colored(0x03, "Clear",                  0xf4f4f4),
    colored(0x04, "Red",                    0xd2232a),
    colored(0x05, "Blue",                   0x1f5aa6),
    colored(0x06, "Yellow",                 0xffe600),
    colored(0x07, "Green",                  0x1f9d55),
    colored(0x08, "Black",                  0x000000),
    colored(0x09, "Clear (White text)",     0xf4f4f4),
    colored(0x20, "Matte White",            0xf7f7f2),
    colored(0x21, "Matte Clear",            0xeeeeee),
    colored(0x22, "Matte Silver",           0xc0c0c0),
    colored(0x23, "Satin Gold",             0xc9a94f),
    colored(0x24, "Satin Silver",           0xb8b8b8),
    colored(0x30, "Blue (D)",               0x0067b1),
    colored(0x31, "Red (D)",                0xe0393e),
    colored(0x40, "Fluorescent Orange",     0xff7f27),
    colored(0x41, "Fluorescent Yellow",     0xf0ff3a),
    colored(0x50, "Berry Pink (S)",         0xe5007e),
    colored(0x51, "Light Gray (S)",         0xcfcfcf),
    colored(0x52, "Lime Green (S)",         0x9acd32),
    colored(0x60, "Yellow (F)",             0xfff200),
    colored(0x61, "Pink (F)",               0xf49ac1),
    colored(0x62, "Blue (F)",               0x6ecff6),
    colored(0x70, "White (Heat-shrink Tube)", 0xffffff),
    colored(0x90, "White (Flex. ID)",       0xffffff),
    colored(0x91, "Yellow (Flex. ID)",      0xffe600),
    code(0xf0, "Cleaning"),
    code(0xf1, "Stencil"),
    code(0xff, "Incompatible"),
];

#[rustfmt::skip]
pub static TEXT_COLORS: &[CodeEntry] = &[
    colored(0x01, "White",  0xffffff),
    code(0x02, "Other"),
    colored(0x04, "Red",    0xd2232a),
    colored(0x05, "Blue",   0x1f5aa6),
    colored(0x08, "Black",  0x000000),
    colored(0x0a, "Gold",   0xc9a94f),
    colored(0x62, "Blue (F)", 0x6ecff6),
    code(0xf0, "Cleaning"),
    code(0xf1, "Stencil"),
    code(0xff, "Incompatible"),
];

#[rustfmt::skip]
pub static STATUS_TYPES: &[CodeEntry] = &[
    code(0x00, "Reply to status request"),
    code(0x01, "Printing completed"),
    code(0x02, "Error occurred"),
    code(0x03, "Exit IF mode"),
    code(0x04, "Turned off"),
    code(0x05, "Notification"),
    code(0x06, "Phase change"),
];

#[rustfmt::skip]
pub static NOTIFICATIONS: &[CodeEntry] = &[
    code(0x00, "Not available"),
    code(0x01, "Cover open"),
    code(0x02, "Cover closed"),
];

/// Phase entries match on the (type, number high, number low) triple.
#[derive(Debug, PartialEq, Eq)]
pub struct Phase {
    pub phase_type: u8,
    pub number_high: u8,
    pub number_low: u8,
    pub description: &'static str,
}

const fn phase(phase_type: u8, number_high: u8, number_low: u8, description: &'static str) -> Phase {
    Phase {
        phase_type,
        number_high,
        number_low,
        description,
    }
}

#[rustfmt::skip]
pub static PHASES: &[Phase] = &[
    phase(0x00, 0x00, 0x00, "Editing state (reception possible)"),
    phase(0x00, 0x00, 0x01, "Feed"),
    phase(0x01, 0x00, 0x00, "Printing"),
    phase(0x01, 0x00, 0x14, "Cover open while receiving"),
];

pub fn find_media_type(code: u8) -> Option<&'static CodeEntry> {
    find_code(MEDIA_TYPES, code)
}

pub fn find_tape_color(code: u8) -> Option<&'static CodeEntry> {
    find_code(TAPE_COLORS, code)
}

pub fn find_text_color(code: u8) -> Option<&'static CodeEntry> {
    find_code(TEXT_COLORS, code)
}

pub fn find_status_type(code: u8) -> Option<&'static CodeEntry> {
    find_code(STATUS_TYPES, code)
}

pub fn find_notification(code: u8) -> Option<&'static CodeEntry> {
    find_code(NOTIFICATIONS, code)
}

pub fn find_phase(phase_type: u8, number_high: u8, number_low: u8) -> Option<&'static Phase> {
    PHASES.iter().find(|p| {
        p.phase_type == phase_type && p.number_high == number_high && p.number_low == number_low
    })
}

//! Status frame decoding
//!
//! The printer answers `ESC i S` (and pushes unsolicited updates while
//! printing) with a fixed 32-byte record. Field offsets are fixed; codes the
//! catalog does not know resolve to `None` so that unknown hardware
//! revisions still decode.

use std::fmt;

use crate::catalog::{self, CodeEntry, ErrorInformation, Phase};
use crate::error::FrameError;

pub const STATUS_FRAME_LEN: usize = 32;
/// Length of the anomalous half frame some devices send out of turn.
pub const SHORT_FRAME_LEN: usize = 16;
pub const PRINT_HEAD_MARK: u8 = 0x80;

/// Decoded snapshot of one status frame.
///
/// A new value is produced for every frame; snapshots are never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceStatus {
    raw: [u8; STATUS_FRAME_LEN],

    pub print_head_mark: u8,
    pub size: u8,
    pub brother_code: u8,
    pub series_code: u8,
    pub model: u8,
    pub country: u8,
    pub reserved_1: u16,
    pub error_word: u16,
    pub errors: Vec<&'static ErrorInformation>,
    pub media_width_mm: u8,
    pub media_type_code: u8,
    pub media_type: Option<&'static CodeEntry>,
    pub ncol: u8,
    pub fonts: u8,
    pub jp_fonts: u8,
    pub mode: u8,
    pub density: u8,
    pub media_len: u8,
    pub status_type_code: u8,
    pub status_type: Option<&'static CodeEntry>,
    pub phase_type: u8,
    pub phase_high: u8,
    pub phase_low: u8,
    pub phase: Option<&'static Phase>,
    pub notification_code: u8,
    pub notification: Option<&'static CodeEntry>,
    pub exp: u8,
    pub tape_color_code: u8,
    pub tape_color: Option<&'static CodeEntry>,
    pub text_color_code: u8,
    pub text_color: Option<&'static CodeEntry>,
    pub hw_setting: u32,
    pub reserved_2: u16,
}

fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Decode a status frame.
///
/// Only exact 32-byte frames with the `0x80 0x20` header are accepted.
/// 16-byte frames are reported as [`FrameError::ShortFrame`] so the caller
/// can resynchronize.
pub fn decode(frame: &[u8]) -> Result<DeviceStatus, FrameError> {
    if frame.len() == SHORT_FRAME_LEN {
        return Err(FrameError::ShortFrame);
    }
    let raw: [u8; STATUS_FRAME_LEN] = frame.try_into().map_err(|_| FrameError::Length {
        expected: STATUS_FRAME_LEN,
        actual: frame.len(),
    })?;
    if raw[0] != PRINT_HEAD_MARK || raw[1] != STATUS_FRAME_LEN as u8 {
        return Err(FrameError::Header {
            mark: raw[0],
            size: raw[1],
        });
    }

    let error_word = be_u16(&raw, 9);
    let (phase_type, phase_high, phase_low) = (raw[19], raw[20], raw[21]);

    Ok(DeviceStatus {
        raw,
        print_head_mark: raw[0],
        size: raw[1],
        brother_code: raw[2],
        series_code: raw[3],
        model: raw[4],
        country: raw[5],
        reserved_1: be_u16(&raw, 6),
        error_word,
        errors: catalog::find_matching_errors(error_word),
        media_width_mm: raw[10],
        media_type_code: raw[11],
        media_type: catalog::find_media_type(raw[11]),
        ncol: raw[12],
        fonts: raw[13],
        jp_fonts: raw[14],
        mode: raw[15],
        density: raw[16],
        media_len: raw[17],
        status_type_code: raw[18],
        status_type: catalog::find_status_type(raw[18]),
        phase_type,
        phase_high,
        phase_low,
        phase: catalog::find_phase(phase_type, phase_high, phase_low),
        notification_code: raw[22],
        notification: catalog::find_notification(raw[22]),
        exp: raw[23],
        tape_color_code: raw[24],
        tape_color: catalog::find_tape_color(raw[24]),
        text_color_code: raw[25],
        text_color: catalog::find_text_color(raw[25]),
        hw_setting: be_u32(&raw, 26),
        reserved_2: be_u16(&raw, 30),
    })
}

impl DeviceStatus {
    pub fn raw_data(&self) -> &[u8; STATUS_FRAME_LEN] {
        &self.raw
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Reported errors that prevent printing.
    pub fn fatal_errors(&self) -> impl Iterator<Item = &'static ErrorInformation> + '_ {
        self.errors.iter().copied().filter(|e| !e.can_still_print)
    }

    pub fn can_print(&self) -> bool {
        self.fatal_errors().next().is_none()
    }

    /// The fields a device information panel shows.
    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            model: self.model,
            hw_setting: self.hw_setting,
            media_type_name: self.media_type.map(|m| m.description),
            media_width_mm: self.media_width_mm,
            tape_color_name: self.tape_color.map(|c| c.description),
            text_color_name: self.text_color.map(|c| c.description),
            status_type_name: self.status_type.map(|s| s.description),
            phase_description: self.phase.map(|p| p.description),
            notification_description: self.notification.map(|n| n.description),
            active_error_masks: self.errors.iter().map(|e| e.mask).collect(),
        }
    }
}

/// Flattened, display-oriented view of a [`DeviceStatus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSummary {
    pub model: u8,
    pub hw_setting: u32,
    pub media_type_name: Option<&'static str>,
    pub media_width_mm: u8,
    pub tape_color_name: Option<&'static str>,
    pub text_color_name: Option<&'static str>,
    pub status_type_name: Option<&'static str>,
    pub phase_description: Option<&'static str>,
    pub notification_description: Option<&'static str>,
    pub active_error_masks: Vec<u16>,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn name(entry: Option<&CodeEntry>, code: u8) -> String {
            match entry {
                Some(entry) => entry.description.to_string(),
                None => format!("unknown (0x{:02X})", code),
            }
        }

        if self.has_errors() {
            writeln!(f, "Status: ERROR (0x{:04X})", self.error_word)?;
            for error in &self.errors {
                let kind = if error.can_still_print { "warning" } else { "fatal" };
                writeln!(f, "  - {} [{}]", error.description, kind)?;
            }
        } else {
            writeln!(f, "Status: OK - No errors")?;
        }
        writeln!(f, "Model: 0x{:02X}", self.model)?;
        writeln!(f, "Media width: {} mm", self.media_width_mm)?;
        writeln!(f, "Media type: {}", name(self.media_type, self.media_type_code))?;
        writeln!(f, "Tape color: {}", name(self.tape_color, self.tape_color_code))?;
        writeln!(f, "Text color: {}", name(self.text_color, self.text_color_code))?;
        writeln!(f, "Status type: {}", name(self.status_type, self.status_type_code))?;
        match self.phase {
            Some(phase) => writeln!(f, "Phase: {}", phase.description)?,
            None => writeln!(
                f,
                "Phase: unknown (0x{:02X} 0x{:02X}{:02X})",
                self.phase_type, self.phase_high, self.phase_low
            )?,
        }
        writeln!(
            f,
            "Notification: {}",
            name(self.notification, self.notification_code)
        )?;
        write!(f, "Hardware settings: 0x{:08X}", self.hw_setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const FIXTURE: [u8; 32] = [
        0x80, 0x20, 0x42, 0x30, 0x67, 0x30, 0x12, 0x34, // mark, size, 'B', '0', model, '0', reserved_1
        0x00, 0x00, 0x18, 0x01, 0x02, 0x03, 0x04, 0x05, // -, error word, width, media type, ncol, fonts, jp, mode
        0x06, 0x07, 0x00, 0x01, 0x00, 0x14, 0x02, 0x09, // density, len, status type, phase triple, notif, exp
        0x01, 0x08, 0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, // tape color, text color, hw_setting, reserved_2
    ];

    #[test]
    fn test_decode_fixture_offsets() {
        let status = decode(&FIXTURE).unwrap();
        assert_eq!(status.print_head_mark, 0x80);
        assert_eq!(status.size, 0x20);
        assert_eq!(status.brother_code, b'B');
        assert_eq!(status.series_code, b'0');
        assert_eq!(status.model, 0x67);
        assert_eq!(status.country, b'0');
        assert_eq!(status.reserved_1, 0x1234);
        assert_eq!(status.error_word, 0x0018);
        assert_eq!(status.media_width_mm, 0x18);
        assert_eq!(status.media_type_code, 0x01);
        assert_eq!(status.media_type.unwrap().description, "Laminated tape");
        assert_eq!(
            (status.ncol, status.fonts, status.jp_fonts, status.mode, status.density, status.media_len),
            (0x02, 0x03, 0x04, 0x05, 0x06, 0x07)
        );
        assert_eq!(status.status_type.unwrap().description, "Reply to status request");
        assert_eq!((status.phase_type, status.phase_high, status.phase_low), (0x01, 0x00, 0x14));
        assert_eq!(status.phase.unwrap().description, "Cover open while receiving");
        assert_eq!(status.notification.unwrap().description, "Cover closed");
        assert_eq!(status.exp, 0x09);
        assert_eq!(status.tape_color.unwrap().description, "White");
        assert_eq!(status.text_color.unwrap().description, "Black");
        assert_eq!(status.hw_setting, 0xDEADBEEF);
        assert_eq!(status.reserved_2, 0xCAFE);
        assert_eq!(status.raw_data(), &FIXTURE);
    }

    #[test]
    fn test_errors_follow_error_word() {
        let mut frame = FIXTURE;
        frame[9] = 0x10;
        frame[10] = 0x01;
        let status = decode(&frame).unwrap();
        assert_eq!(status.error_word, 0x1001);
        let names: Vec<_> = status.errors.iter().map(|e| e.description).collect();
        assert_eq!(names, vec!["No media", "Cover open"]);
        assert!(!status.can_print());
        assert_eq!(status.fatal_errors().count(), 2);
    }

    #[test]
    fn test_recoverable_errors_allow_printing() {
        let mut frame = FIXTURE;
        frame[9] = 0x00;
        frame[10] = 0x08;
        let status = decode(&frame).unwrap();
        assert!(status.has_errors());
        assert!(status.can_print());
    }

    #[test]
    fn test_unknown_codes_resolve_to_none() {
        let mut frame = FIXTURE;
        frame[11] = 0x42;
        frame[18] = 0x77;
        frame[19] = 0x05;
        frame[22] = 0x33;
        frame[24] = 0x99;
        frame[25] = 0x99;
        let status = decode(&frame).unwrap();
        assert!(status.media_type.is_none());
        assert!(status.status_type.is_none());
        assert!(status.phase.is_none());
        assert!(status.notification.is_none());
        assert!(status.tape_color.is_none());
        assert!(status.text_color.is_none());
        assert_eq!(status.media_type_code, 0x42);
    }

    #[test]
    fn test_bad_header() {
        let mut frame = FIXTURE;
        frame[0] = 0x81;
        assert_eq!(decode(&frame), Err(FrameError::Header { mark: 0x81, size: 0x20 }));

        let mut frame = FIXTURE;
        frame[1] = 0x10;
        assert_eq!(decode(&frame), Err(FrameError::Header { mark: 0x80, size: 0x10 }));
    }

    #[test]
    fn test_bad_lengths() {
        assert_eq!(decode(&FIXTURE[..16]), Err(FrameError::ShortFrame));
        assert_eq!(
            decode(&FIXTURE[..31]),
            Err(FrameError::Length { expected: 32, actual: 31 })
        );
        assert_eq!(decode(&[]), Err(FrameError::Length { expected: 32, actual: 0 }));
        let mut long = FIXTURE.to_vec();
        long.push(0);
        assert_eq!(decode(&long), Err(FrameError::Length { expected: 32, actual: 33 }));
    }

    #[test]
    fn test_summary() {
        let summary = decode(&FIXTURE).unwrap().summary();
        assert_eq!(summary.model, 0x67);
        assert_eq!(summary.media_type_name, Some("Laminated tape"));
        assert_eq!(summary.tape_color_name, Some("White"));
        assert_eq!(summary.active_error_masks, vec![0x0008, 0x0010]);
    }

    #[test]
    fn test_display_mentions_errors() {
        let text = decode(&FIXTURE).unwrap().to_string();
        assert!(text.contains("Weak batteries [warning]"));
        assert!(text.contains("Media width: 24 mm"));
    }
}

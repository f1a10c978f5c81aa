/// Brother P-Touch raster command builder
///
/// Covers the subset of the Raster Command Reference needed to print a
/// monochrome bitmap on the PT series label printers (PT-E550W/P750W/P710BT
/// Raster Command Reference, "Printing Command Details").
///
/// # Example
///
/// ```
/// use ptouch_driver::raster_command::RasterCommand;
///
/// let mut cmd = RasterCommand::new();
/// cmd.enable_packbits()
///    .select_raster_mode(true)
///    .precut(true);
///
/// assert_eq!(
///     cmd.build(),
///     vec![0x4D, 0x02, 0x1B, 0x4D, 0x62, 0x00, 0x1B, 0x69, 0x4D, 0x40]
/// );
/// ```
pub struct RasterCommand {
    buffer: Vec<u8>,
}

/// Number of NUL bytes sent ahead of `ESC @`.
pub const INVALIDATE_LEN: usize = 100;

pub const STATUS_REQUEST: [u8; 3] = [0x1B, 0x69, 0x53];

impl RasterCommand {
    /// Create a new empty command builder
    pub fn new() -> Self {
        RasterCommand { buffer: Vec::new() }
    }

    /// Add invalidate sequence (100 null bytes)
    ///
    /// Flushes any half-received command out of the printer.
    pub fn invalidate(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[0x00; INVALIDATE_LEN]);
        self
    }

    /// Add ESC @ (initialize) command
    pub fn initialize(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(b"\x1B\x40");
        self
    }

    /// Add status information request command
    ///
    /// The printer answers with a 32-byte status frame.
    pub fn status_information_request(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&STATUS_REQUEST);
        self
    }

    /// Enable (single-run) PackBits framing of raster lines
    pub fn enable_packbits(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(b"\x4D\x02");
        self
    }

    /// Select raster graphics transfer mode
    ///
    /// # Arguments
    /// * `alt` - P700-style selection (`1B 4D 62 00`) instead of `1B 4D 52 01`
    pub fn select_raster_mode(&mut self, alt: bool) -> &mut Self {
        if alt {
            self.buffer.extend_from_slice(b"\x1B\x4D\x62\x00");
        } else {
            self.buffer.extend_from_slice(b"\x1B\x4D\x52\x01");
        }
        self
    }

    /// Print information command (`ESC i z` + 10 parameter bytes)
    ///
    /// # Arguments
    /// * `media_width_mm` - Media width (n3)
    /// * `raster_number` - Number of raster lines to follow (n5-n8, little-endian)
    /// * `feed_last` - Set n9 to 2 so the D460BT family feeds the end of the label
    pub fn print_information_command(
        &mut self,
        media_width_mm: u8,
        raster_number: u32,
        feed_last: bool,
    ) -> &mut Self {
        self.buffer.extend_from_slice(b"\x1B\x69\x7A");
        self.buffer.push(0x00); // n1: valid flags
        self.buffer.push(0x00); // n2: media type
        self.buffer.push(media_width_mm);
        self.buffer.push(0x00); // n4: media length
        self.buffer.extend_from_slice(&raster_number.to_le_bytes());
        self.buffer.push(if feed_last { 0x02 } else { 0x00 });
        self.buffer.push(0x00);
        self
    }

    /// Enable chain printing on the PT-D460BT family
    ///
    /// Must precede [`RasterCommand::d460bt_magic`].
    pub fn d460bt_chain(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(b"\x1B\x69\x4B\x00\x00");
        self
    }

    /// PT-D460BT family pre-raster command (`ESC i d 0E 00 4D 00`)
    ///
    /// n1/n2 are the length margin in dots (0x0E is the vendor software default).
    /// n3 must be 0x4D or the print is corrupted.
    pub fn d460bt_magic(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(b"\x1B\x69\x64\x0E\x00\x4D\x00");
        self
    }

    /// Precut command (`ESC i M`)
    ///
    /// When set the printer cuts blank leading tape before printing.
    /// Very short prints ignore it.
    pub fn precut(&mut self, enabled: bool) -> &mut Self {
        self.buffer.extend_from_slice(b"\x1B\x69\x4D");
        self.buffer.push(if enabled { 0x40 } else { 0x00 });
        self
    }

    /// Transfer one raster line
    ///
    /// PackBits devices get a fake compression header: the line is sent as a
    /// single literal run (`47, len+1, 00, len-1`), which never compresses.
    /// Other devices get `47, len, 00`.
    ///
    /// # Arguments
    /// * `line` - Raster line, 1..=255 bytes
    pub fn raster_line(&mut self, line: &[u8], packbits: bool) -> &mut Self {
        debug_assert!(!line.is_empty() && line.len() < 255);
        let len = line.len() as u8;
        self.buffer.push(0x47); // 'G'
        if packbits {
            self.buffer.extend_from_slice(&[len + 1, 0x00, len - 1]);
        } else {
            self.buffer.extend_from_slice(&[len, 0x00]);
        }
        self.buffer.extend_from_slice(line);
        self
    }

    /// Transfer zero raster graphics (blank line)
    pub fn zero_raster_graphics(&mut self) -> &mut Self {
        self.buffer.push(0x5A); // 'Z'
        self
    }

    /// Print command (print and advance, no cut)
    pub fn print_command(&mut self) -> &mut Self {
        self.buffer.push(0x0C);
        self
    }

    /// Print command with feeding (print, feed and cut)
    pub fn print_command_with_feeding(&mut self) -> &mut Self {
        self.buffer.push(0x1A);
        self
    }

    /// Finish the job
    ///
    /// Chain prints feed (`1A`) except on the D460BT family, which keeps the
    /// tape in the machine with `0C` like a non-chained print.
    pub fn finalize(&mut self, chain: bool, d460bt: bool) -> &mut Self {
        if chain && !d460bt {
            self.print_command_with_feeding()
        } else {
            self.print_command()
        }
    }

    /// Consume the builder and return the raw command bytes
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for RasterCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bytes(f: impl FnOnce(&mut RasterCommand)) -> Vec<u8> {
        let mut cmd = RasterCommand::new();
        f(&mut cmd);
        cmd.build()
    }

    #[test]
    fn test_invalidate_and_initialize() {
        let data = bytes(|c| {
            c.invalidate().initialize();
        });
        assert_eq!(data.len(), 102);
        assert!(data[..100].iter().all(|&b| b == 0));
        assert_eq!(&data[100..], &[0x1B, 0x40]);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(bytes(|c| { c.status_information_request(); }), vec![0x1B, 0x69, 0x53]);
        assert_eq!(bytes(|c| { c.enable_packbits(); }), vec![0x4D, 0x02]);
        assert_eq!(bytes(|c| { c.select_raster_mode(false); }), vec![0x1B, 0x4D, 0x52, 0x01]);
        assert_eq!(bytes(|c| { c.select_raster_mode(true); }), vec![0x1B, 0x4D, 0x62, 0x00]);
        assert_eq!(bytes(|c| { c.d460bt_chain(); }), vec![0x1B, 0x69, 0x4B, 0x00, 0x00]);
        assert_eq!(
            bytes(|c| { c.d460bt_magic(); }),
            vec![0x1B, 0x69, 0x64, 0x0E, 0x00, 0x4D, 0x00]
        );
        assert_eq!(bytes(|c| { c.precut(true); }), vec![0x1B, 0x69, 0x4D, 0x40]);
        assert_eq!(bytes(|c| { c.precut(false); }), vec![0x1B, 0x69, 0x4D, 0x00]);
        assert_eq!(bytes(|c| { c.zero_raster_graphics(); }), vec![0x5A]);
    }

    #[test]
    fn test_print_information_command() {
        let data = bytes(|c| {
            c.print_information_command(24, 0x0001_0203, false);
        });
        #[rustfmt::skip]
        assert_eq!(data, vec![
            0x1B, 0x69, 0x7A,
            0x00, 0x00, 24, 0x00,
            0x03, 0x02, 0x01, 0x00,
            0x00, 0x00,
        ]);

        let data = bytes(|c| {
            c.print_information_command(12, 300, true);
        });
        assert_eq!(data.len(), 13);
        assert_eq!(&data[7..11], &[0x2C, 0x01, 0x00, 0x00]);
        assert_eq!(data[11], 0x02);
    }

    #[test]
    fn test_raster_line_packbits_header() {
        let line = [0xAA; 16];
        let data = bytes(|c| {
            c.raster_line(&line, true);
        });
        assert_eq!(&data[..4], &[0x47, 17, 0x00, 15]);
        assert_eq!(&data[4..], &line);
    }

    #[test]
    fn test_raster_line_plain_header() {
        let line = [0x55; 16];
        let data = bytes(|c| {
            c.raster_line(&line, false);
        });
        assert_eq!(&data[..3], &[0x47, 16, 0x00]);
        assert_eq!(&data[3..], &line);
        assert_eq!(data.len(), 19);
    }

    #[test]
    fn test_finalize_selection() {
        assert_eq!(bytes(|c| { c.finalize(true, false); }), vec![0x1A]);
        assert_eq!(bytes(|c| { c.finalize(true, true); }), vec![0x0C]);
        assert_eq!(bytes(|c| { c.finalize(false, false); }), vec![0x0C]);
        assert_eq!(bytes(|c| { c.finalize(false, true); }), vec![0x0C]);
    }
}

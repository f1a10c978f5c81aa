use crate::Result;
use crate::error::Error;
use png::ColorType;
use std::path::Path;

/// Monochrome label image handed to the print engine.
///
/// `width` is the label length (one raster line per column) and `height`
/// runs across the tape, at most the printhead width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    dots: Vec<bool>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Bitmap {
            width,
            height,
            dots: vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.dots[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.width && y < self.height {
            self.dots[y * self.width + x] = on;
        }
    }

    pub fn from_png_file(path: &Path) -> Result<Self> {
        Self::from_png_data(&std::fs::read(path)?)
    }

    /// Decode a PNG; pixels darker than mid-gray become dots.
    pub fn from_png_data(png_data: &[u8]) -> Result<Self> {
        let decoder = png::Decoder::new(png_data);
        let mut reader = decoder.read_info()?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf)?;
        buf.truncate(info.buffer_size());

        let gray_buf = convert_to_grayscale(&buf, info.color_type, info.bit_depth)?;
        let width = info.width as usize;
        let height = info.height as usize;

        let mut bitmap = Bitmap::new(width, height);
        for (i, &pixel) in gray_buf.iter().take(width * height).enumerate() {
            bitmap.dots[i] = pixel < 127;
        }
        Ok(bitmap)
    }

    /// Offset that centers the bitmap on a printhead of `max_width_px` dots.
    pub fn vertical_offset(&self, max_width_px: usize) -> usize {
        let offset = (max_width_px as f64 / 2.0 - self.height as f64 / 2.0).round();
        offset.max(0.0) as usize
    }

    /// Build the raster line for column `x`.
    ///
    /// The line has `max_width_px / 8` bytes and the bitmap is centered on
    /// the printhead.
    pub fn raster_line(&self, x: usize, max_width_px: usize) -> Vec<u8> {
        let mut line = vec![0u8; max_width_px / 8];
        let offset = self.vertical_offset(max_width_px);
        for y in 0..self.height {
            if self.get(x, y) {
                set_dot(&mut line, offset + y);
            }
        }
        line
    }

    pub fn check_fits(&self, max_width_px: usize) -> Result<()> {
        if self.height > max_width_px {
            return Err(Error::InvalidBitmap(format!(
                "bitmap is {} dots tall, printhead has {} dots",
                self.height, max_width_px
            )));
        }
        if self.width == 0 {
            return Err(Error::InvalidBitmap("bitmap has no columns".into()));
        }
        Ok(())
    }
}

/// Set printhead dot `pin` in a raster line: bit `7 - pin % 8` of byte `pin / 8`.
///
/// Dots past the end of the line are dropped.
pub fn set_dot(line: &mut [u8], pin: usize) {
    if let Some(byte) = line.get_mut(pin / 8) {
        *byte |= 1 << (7 - (pin % 8));
    }
}

fn convert_to_grayscale(buf: &[u8], color_type: ColorType, bit_depth: png::BitDepth) -> Result<Vec<u8>> {
    if bit_depth != png::BitDepth::Eight {
        return Err(Error::InvalidBitmap(format!(
            "unsupported PNG bit depth {:?}, expected 8",
            bit_depth
        )));
    }
    match color_type {
        ColorType::Grayscale => Ok(buf.to_vec()),
        ColorType::GrayscaleAlpha => Ok(buf
            .chunks(2)
            .map(|ga| {
                let alpha = ga[1] as f32 / 255.0;
                (ga[0] as f32 * alpha + 255.0 * (1.0 - alpha)) as u8
            })
            .collect()),
        ColorType::Rgb => Ok(buf
            .chunks(3)
            .map(|rgb| ((rgb[0] as u32 + rgb[1] as u32 + rgb[2] as u32) / 3) as u8)
            .collect()),
        ColorType::Rgba => Ok(buf
            .chunks(4)
            .map(|rgba| {
                let alpha = rgba[3] as f32 / 255.0;
                let r = (rgba[0] as f32 * alpha + 255.0 * (1.0 - alpha)) as u32;
                let g = (rgba[1] as f32 * alpha + 255.0 * (1.0 - alpha)) as u32;
                let b = (rgba[2] as f32 * alpha + 255.0 * (1.0 - alpha)) as u32;
                ((r + g + b) / 3) as u8
            })
            .collect()),
        ColorType::Indexed => Err(Error::InvalidBitmap("indexed PNGs are not supported".into())),
    }
}

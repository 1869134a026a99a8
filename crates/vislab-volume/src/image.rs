//! RGB raster images and PNG encoding.

use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use tracing::info;
use vislab_core::colors::Rgb;

use crate::error::{io_err, Result};
use crate::grid::Slice;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// 8-bit RGB image, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Rgb>,
}

impl RgbImage {
    pub fn new(width: usize, height: usize, fill: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, color: Rgb) {
        self.pixels[y * self.width + x] = color;
    }

    /// Grayscale rendering of `slice`, mapping `window` (or the slice range)
    /// linearly onto 0–255.
    pub fn from_slice(slice: &Slice, window: Option<(f64, f64)>) -> Self {
        let (lo, hi) = window.unwrap_or_else(|| slice.range());
        let span = if hi > lo { hi - lo } else { 1.0 };
        let pixels = slice
            .values
            .iter()
            .map(|v| {
                let g = (((v - lo) / span).clamp(0.0, 1.0) * 255.0).round() as u8;
                Rgb::new(g, g, g)
            })
            .collect();
        Self {
            width: slice.width,
            height: slice.height,
            pixels,
        }
    }

    /// Nearest-neighbour enlargement by an integer factor.
    pub fn upscale(&self, factor: usize) -> Self {
        let factor = factor.max(1);
        let mut out = Self::new(self.width * factor, self.height * factor, Rgb::new(0, 0, 0));
        for y in 0..out.height {
            for x in 0..out.width {
                out.set(x, y, self.get(x / factor, y / factor));
            }
        }
        out
    }

    /// Encode as an 8-bit truecolour PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(self.height * (1 + 3 * self.width));
        for row in self.pixels.chunks(self.width.max(1)) {
            raw.push(0); // filter: none
            for p in row {
                raw.extend_from_slice(&[p.r, p.g, p.b]);
            }
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).map_err(io_err("<png>"))?;
        let compressed = encoder.finish().map_err(io_err("<png>"))?;

        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&(self.width as u32).to_be_bytes());
        ihdr.extend_from_slice(&(self.height as u32).to_be_bytes());
        ihdr.extend_from_slice(&[8, 2, 0, 0, 0]); // depth 8, RGB, deflate, filter 0, no interlace

        let mut out = PNG_SIGNATURE.to_vec();
        write_chunk(&mut out, b"IHDR", &ihdr);
        write_chunk(&mut out, b"IDAT", &compressed);
        write_chunk(&mut out, b"IEND", &[]);
        Ok(out)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        std::fs::write(path, self.to_png()?).map_err(io_err(path))?;
        info!("Saved {}x{} image to {}", self.width, self.height, path.display());
        Ok(())
    }
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_png_structure() {
        let mut img = RgbImage::new(2, 1, Rgb::new(0, 0, 0));
        img.set(1, 0, Rgb::new(255, 128, 1));
        let png = img.to_png().unwrap();

        assert_eq!(&png[..8], &PNG_SIGNATURE);
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 2);
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
        // CRC-32 of the bare IEND chunk type.
        assert_eq!(&png[png.len() - 4..], &[0xAE, 0x42, 0x60, 0x82]);

        let idat_len = u32::from_be_bytes([png[33], png[34], png[35], png[36]]) as usize;
        assert_eq!(&png[37..41], b"IDAT");
        let mut raw = Vec::new();
        ZlibDecoder::new(&png[41..41 + idat_len])
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, vec![0, 0, 0, 0, 255, 128, 1]);
    }

    #[test]
    fn test_from_slice_window() {
        let slice = Slice::new(3, 1, vec![0.0, 50.0, 200.0]).unwrap();
        let img = RgbImage::from_slice(&slice, Some((0.0, 100.0)));
        assert_eq!(img.get(0, 0), Rgb::new(0, 0, 0));
        assert_eq!(img.get(1, 0), Rgb::new(128, 128, 128));
        assert_eq!(img.get(2, 0), Rgb::new(255, 255, 255));
    }

    #[test]
    fn test_upscale() {
        let mut img = RgbImage::new(2, 1, Rgb::new(0, 0, 0));
        img.set(1, 0, Rgb::new(9, 9, 9));
        let big = img.upscale(2);
        assert_eq!((big.width, big.height), (4, 2));
        assert_eq!(big.get(3, 1), Rgb::new(9, 9, 9));
        assert_eq!(big.get(1, 1), Rgb::new(0, 0, 0));
    }

    #[test]
    fn test_save_png_creates_parent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("img.png");
        RgbImage::new(1, 1, Rgb::new(1, 2, 3)).save_png(&path).unwrap();
        assert!(path.exists());
    }
}

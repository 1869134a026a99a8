//! Minimal DICOM Part-10 reader for uncompressed grayscale slices.
//!
//! Handles explicit and implicit VR little endian, 8/16 bit signed or
//! unsigned pixels and the modality rescale. Undefined-length sequences are
//! skipped; encapsulated (compressed) pixel data is rejected.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{io_err, Result, VolumeError};
use crate::grid::{ScalarVolume, Slice};

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

const TRANSFER_SYNTAX: (u16, u16) = (0x0002, 0x0010);
const SAMPLES_PER_PIXEL: (u16, u16) = (0x0028, 0x0002);
const ROWS: (u16, u16) = (0x0028, 0x0010);
const COLUMNS: (u16, u16) = (0x0028, 0x0011);
const PIXEL_SPACING: (u16, u16) = (0x0028, 0x0030);
const BITS_ALLOCATED: (u16, u16) = (0x0028, 0x0100);
const PIXEL_REPRESENTATION: (u16, u16) = (0x0028, 0x0103);
const RESCALE_INTERCEPT: (u16, u16) = (0x0028, 0x1052);
const RESCALE_SLOPE: (u16, u16) = (0x0028, 0x1053);
const PIXEL_DATA: (u16, u16) = (0x7FE0, 0x0010);

const ITEM: (u16, u16) = (0xFFFE, 0xE000);
const ITEM_DELIMITER: (u16, u16) = (0xFFFE, 0xE00D);
const SEQUENCE_DELIMITER: (u16, u16) = (0xFFFE, 0xE0DD);
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// One decoded slice with the header fields used to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomImage {
    pub path: PathBuf,
    pub transfer_syntax: String,
    pub bits_allocated: u16,
    pub signed: bool,
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    /// Row and column spacing in mm, when present.
    pub pixel_spacing: Option<(f64, f64)>,
    /// Rescaled pixel values, row-major.
    pub pixels: Slice,
}

struct Element<'a> {
    tag: (u16, u16),
    vr: Option<[u8; 2]>,
    length: u32,
    value: &'a [u8],
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], String> {
        if self.remaining() < n {
            return Err(format!("unexpected end of data at offset {}", self.pos));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u16(&mut self) -> std::result::Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> std::result::Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn tag(&mut self) -> std::result::Result<(u16, u16), String> {
        Ok((self.u16()?, self.u16()?))
    }

    /// Read the next data element header and its value.
    ///
    /// Values of undefined length are skipped and returned empty.
    fn element(&mut self, explicit: bool) -> std::result::Result<Element<'a>, String> {
        let tag = self.tag()?;
        // Item and delimiter tags never carry a VR.
        let (vr, length) = if tag.0 == 0xFFFE {
            (None, self.u32()?)
        } else if explicit || tag.0 == 0x0002 {
            let vr_bytes = self.take(2)?;
            let vr = [vr_bytes[0], vr_bytes[1]];
            let length = if long_vr(&vr) {
                self.take(2)?;
                self.u32()?
            } else {
                u32::from(self.u16()?)
            };
            (Some(vr), length)
        } else {
            (None, self.u32()?)
        };

        if length == UNDEFINED_LENGTH {
            if tag == PIXEL_DATA {
                return Err("encapsulated (compressed) pixel data is not supported".into());
            }
            self.skip_sequence(explicit)?;
            return Ok(Element { tag, vr, length, value: &[] });
        }
        let value = self.take(length as usize)?;
        Ok(Element { tag, vr, length, value })
    }

    /// Skip items up to and including the sequence delimiter.
    fn skip_sequence(&mut self, explicit: bool) -> std::result::Result<(), String> {
        loop {
            let tag = self.tag()?;
            let length = self.u32()?;
            match tag {
                SEQUENCE_DELIMITER => return Ok(()),
                ITEM if length == UNDEFINED_LENGTH => self.skip_item(explicit)?,
                ITEM => {
                    self.take(length as usize)?;
                }
                other => return Err(format!("unexpected tag {other:04X?} inside a sequence")),
            }
        }
    }

    fn skip_item(&mut self, explicit: bool) -> std::result::Result<(), String> {
        loop {
            let element = self.element(explicit)?;
            if element.tag == ITEM_DELIMITER {
                return Ok(());
            }
        }
    }
}

fn long_vr(vr: &[u8; 2]) -> bool {
    matches!(
        vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN" | b"UR" | b"UT" | b"UV"
    )
}

fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn decimal(value: &[u8]) -> Option<f64> {
    text(value).split('\\').next()?.trim().parse().ok()
}

fn unsigned16(value: &[u8]) -> Option<u16> {
    value.get(..2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

#[derive(Default)]
struct Header {
    transfer_syntax: Option<String>,
    samples_per_pixel: Option<u16>,
    rows: Option<u16>,
    columns: Option<u16>,
    bits_allocated: Option<u16>,
    pixel_representation: Option<u16>,
    rescale_slope: Option<f64>,
    rescale_intercept: Option<f64>,
    pixel_spacing: Option<(f64, f64)>,
}

/// Read and decode one DICOM file.
pub fn read_dicom(path: &Path) -> Result<DicomImage> {
    let bytes = std::fs::read(path).map_err(io_err(path))?;
    parse_dicom(&bytes, path)
}

/// Decode a DICOM file held in memory; `path` is only used in errors.
pub fn parse_dicom(bytes: &[u8], path: &Path) -> Result<DicomImage> {
    let fail = |message: String| VolumeError::Dicom {
        path: path.to_path_buf(),
        message,
    };

    // Part-10 files start with a 128-byte preamble and "DICM"; bare data
    // sets are read as implicit VR little endian.
    let has_preamble = bytes.len() >= 132 && &bytes[128..132] == b"DICM";
    let mut cursor = Cursor {
        bytes,
        pos: if has_preamble { 132 } else { 0 },
    };

    let mut header = Header::default();
    let mut explicit = false;
    let mut meta_done = !has_preamble;
    let mut pixels: Option<&[u8]> = None;

    while cursor.remaining() >= 8 {
        // The group of the next tag decides when the file meta group ends.
        let group = u16::from_le_bytes([bytes[cursor.pos], bytes[cursor.pos + 1]]);
        if !meta_done && group != 0x0002 {
            meta_done = true;
            explicit = match header.transfer_syntax.as_deref() {
                Some(EXPLICIT_VR_LE) => true,
                Some(IMPLICIT_VR_LE) | None => false,
                Some(other) => return Err(fail(format!("unsupported transfer syntax {other}"))),
            };
        }

        let element = cursor.element(explicit).map_err(fail)?;
        if let Some(vr) = element.vr {
            debug!(
                "({:04X},{:04X}) {} len={}",
                element.tag.0,
                element.tag.1,
                String::from_utf8_lossy(&vr),
                element.length
            );
        }
        let v = element.value;
        match element.tag {
            TRANSFER_SYNTAX => header.transfer_syntax = Some(text(v)),
            SAMPLES_PER_PIXEL => header.samples_per_pixel = unsigned16(v),
            ROWS => header.rows = unsigned16(v),
            COLUMNS => header.columns = unsigned16(v),
            BITS_ALLOCATED => header.bits_allocated = unsigned16(v),
            PIXEL_REPRESENTATION => header.pixel_representation = unsigned16(v),
            RESCALE_SLOPE => header.rescale_slope = decimal(v),
            RESCALE_INTERCEPT => header.rescale_intercept = decimal(v),
            PIXEL_SPACING => {
                let parts: Vec<f64> = text(v).split('\\').filter_map(|p| p.trim().parse().ok()).collect();
                if let &[row, col] = parts.as_slice() {
                    header.pixel_spacing = Some((row, col));
                }
            }
            PIXEL_DATA => {
                pixels = Some(v);
                break;
            }
            _ => {}
        }
    }

    let pixels = pixels.ok_or_else(|| fail("no pixel data".into()))?;
    let rows = header.rows.ok_or_else(|| fail("missing Rows".into()))? as usize;
    let columns = header.columns.ok_or_else(|| fail("missing Columns".into()))? as usize;
    if header.samples_per_pixel.unwrap_or(1) != 1 {
        return Err(fail("only single-sample (grayscale) images are supported".into()));
    }
    let bits = header.bits_allocated.unwrap_or(16);
    let signed = header.pixel_representation.unwrap_or(0) == 1;
    let slope = header.rescale_slope.unwrap_or(1.0);
    let intercept = header.rescale_intercept.unwrap_or(0.0);

    let count = rows * columns;
    let bytes_per_pixel = match bits {
        8 => 1,
        16 => 2,
        other => return Err(fail(format!("unsupported BitsAllocated {other}"))),
    };
    if pixels.len() < count * bytes_per_pixel {
        return Err(fail(format!(
            "pixel data holds {} bytes, {}x{} image needs {}",
            pixels.len(),
            rows,
            columns,
            count * bytes_per_pixel
        )));
    }

    let values = pixels
        .chunks_exact(bytes_per_pixel)
        .take(count)
        .map(|b| {
            let raw = match (bytes_per_pixel, signed) {
                (1, false) => f64::from(b[0]),
                (1, true) => f64::from(b[0] as i8),
                (_, false) => f64::from(u16::from_le_bytes([b[0], b[1]])),
                (_, true) => f64::from(i16::from_le_bytes([b[0], b[1]])),
            };
            raw * slope + intercept
        })
        .collect();

    Ok(DicomImage {
        path: path.to_path_buf(),
        transfer_syntax: header
            .transfer_syntax
            .unwrap_or_else(|| IMPLICIT_VR_LE.to_string()),
        bits_allocated: bits,
        signed,
        rescale_slope: slope,
        rescale_intercept: intercept,
        pixel_spacing: header.pixel_spacing,
        pixels: Slice::new(columns, rows, values)?,
    })
}

/// `.dcm` files directly inside `dir` (extension matched case-insensitively),
/// sorted by path.
pub fn dicom_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(VolumeError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("dcm"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Load every `.dcm` slice in `dir` in file-name order.
///
/// Fails with [`VolumeError::EmptyDirectory`] when there are none. Slices
/// whose size differs from the first one are an error.
pub fn load_series(dir: &Path) -> Result<Vec<DicomImage>> {
    let files = dicom_files(dir)?;
    if files.is_empty() {
        warn!("No DICOM files found in {}", dir.display());
        return Err(VolumeError::EmptyDirectory(dir.to_path_buf()));
    }

    let images = files
        .iter()
        .map(|p| read_dicom(p))
        .collect::<Result<Vec<_>>>()?;
    let (w, h) = (images[0].pixels.width, images[0].pixels.height);
    if let Some(odd) = images
        .iter()
        .find(|img| img.pixels.width != w || img.pixels.height != h)
    {
        return Err(VolumeError::Dicom {
            path: odd.path.clone(),
            message: format!(
                "slice is {}x{}, series is {}x{}",
                odd.pixels.width, odd.pixels.height, w, h
            ),
        });
    }
    info!("Loaded {} DICOM slices ({}x{}) from {}", images.len(), w, h, dir.display());
    Ok(images)
}

/// Stack a loaded series into a volume (slice index along z).
pub fn series_volume(images: &[DicomImage]) -> Result<ScalarVolume> {
    let slices: Vec<Slice> = images.iter().map(|img| img.pixels.clone()).collect();
    let mut volume = ScalarVolume::from_slices(&slices)?;
    if let Some((row, col)) = images.first().and_then(|img| img.pixel_spacing) {
        volume.spacing = [col, row, 1.0];
    }
    Ok(volume)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    fn explicit(out: &mut Vec<u8>, tag: (u16, u16), vr: &[u8; 2], value: &[u8]) {
        out.extend(tag.0.to_le_bytes());
        out.extend(tag.1.to_le_bytes());
        out.extend(vr);
        if long_vr(vr) {
            out.extend([0, 0]);
            out.extend((value.len() as u32).to_le_bytes());
        } else {
            out.extend((value.len() as u16).to_le_bytes());
        }
        out.extend(value);
    }

    fn implicit(out: &mut Vec<u8>, tag: (u16, u16), value: &[u8]) {
        out.extend(tag.0.to_le_bytes());
        out.extend(tag.1.to_le_bytes());
        out.extend((value.len() as u32).to_le_bytes());
        out.extend(value);
    }

    fn padded(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        if v.len() % 2 == 1 {
            v.push(0);
        }
        v
    }

    /// A Part-10 file with a 16-bit signed `rows x cols` image.
    pub(crate) fn dicom_bytes(rows: u16, cols: u16, pixels: &[i16], explicit_vr: bool) -> Vec<u8> {
        let mut out = vec![0u8; 128];
        out.extend(b"DICM");
        let ts = if explicit_vr { EXPLICIT_VR_LE } else { IMPLICIT_VR_LE };
        explicit(&mut out, TRANSFER_SYNTAX, b"UI", &padded(ts));

        let data: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
        let put = |out: &mut Vec<u8>, tag, vr: &[u8; 2], value: &[u8]| {
            if explicit_vr {
                explicit(out, tag, vr, value)
            } else {
                implicit(out, tag, value)
            }
        };
        put(&mut out, SAMPLES_PER_PIXEL, b"US", &1u16.to_le_bytes());
        put(&mut out, ROWS, b"US", &rows.to_le_bytes());
        put(&mut out, COLUMNS, b"US", &cols.to_le_bytes());
        put(&mut out, PIXEL_SPACING, b"DS", &padded("0.5\\0.75"));
        put(&mut out, BITS_ALLOCATED, b"US", &16u16.to_le_bytes());
        put(&mut out, PIXEL_REPRESENTATION, b"US", &1u16.to_le_bytes());
        put(&mut out, RESCALE_INTERCEPT, b"DS", &padded("-1024"));
        put(&mut out, RESCALE_SLOPE, b"DS", &padded("1"));
        put(&mut out, PIXEL_DATA, b"OW", &data);
        out
    }

    #[test]
    fn test_parse_explicit_vr() {
        let bytes = dicom_bytes(2, 3, &[0, 1, 2, 3, 4, -5], true);
        let img = parse_dicom(&bytes, Path::new("a.dcm")).unwrap();
        assert_eq!(img.transfer_syntax, EXPLICIT_VR_LE);
        assert_eq!((img.pixels.width, img.pixels.height), (3, 2));
        assert!(img.signed);
        assert_eq!(img.pixels.get(0, 0), -1024.0);
        assert_eq!(img.pixels.get(2, 1), -1029.0);
        assert_eq!(img.pixel_spacing, Some((0.5, 0.75)));
    }

    #[test]
    fn test_parse_implicit_vr() {
        let bytes = dicom_bytes(1, 2, &[100, 200], false);
        let img = parse_dicom(&bytes, Path::new("b.dcm")).unwrap();
        assert_eq!(img.pixels.values, vec![-924.0, -824.0]);
    }

    #[test]
    fn test_skips_undefined_length_sequence() {
        let mut bytes = vec![0u8; 128];
        bytes.extend(b"DICM");
        explicit(&mut bytes, TRANSFER_SYNTAX, b"UI", &padded(EXPLICIT_VR_LE));
        // (0008,1140) SQ of undefined length with one undefined-length item.
        bytes.extend(0x0008u16.to_le_bytes());
        bytes.extend(0x1140u16.to_le_bytes());
        bytes.extend(b"SQ");
        bytes.extend([0, 0]);
        bytes.extend(UNDEFINED_LENGTH.to_le_bytes());
        implicit(&mut bytes, ITEM, &[]);
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        explicit(&mut bytes, (0x0008, 0x1150), b"UI", &padded("1.2.3"));
        implicit(&mut bytes, ITEM_DELIMITER, &[]);
        implicit(&mut bytes, SEQUENCE_DELIMITER, &[]);
        explicit(&mut bytes, ROWS, b"US", &1u16.to_le_bytes());
        explicit(&mut bytes, COLUMNS, b"US", &1u16.to_le_bytes());
        explicit(&mut bytes, BITS_ALLOCATED, b"US", &8u16.to_le_bytes());
        explicit(&mut bytes, PIXEL_DATA, b"OB", &[42, 0]);

        let img = parse_dicom(&bytes, Path::new("c.dcm")).unwrap();
        assert_eq!(img.pixels.values, vec![42.0]);
    }

    #[test]
    fn test_rejects_unsupported_transfer_syntax() {
        let mut bytes = vec![0u8; 128];
        bytes.extend(b"DICM");
        explicit(&mut bytes, TRANSFER_SYNTAX, b"UI", &padded("1.2.840.10008.1.2.4.50"));
        explicit(&mut bytes, ROWS, b"US", &1u16.to_le_bytes());
        let err = parse_dicom(&bytes, Path::new("d.dcm")).unwrap_err();
        assert!(err.to_string().contains("unsupported transfer syntax"));
    }

    #[test]
    fn test_rejects_truncated_pixels() {
        let mut bytes = dicom_bytes(2, 2, &[1, 2, 3, 4], true);
        // Rewrite the pixel data as 2 bytes long.
        let len = bytes.len();
        bytes.truncate(len - 8);
        bytes.extend([1, 0]);
        let idx = bytes.len() - 2 - 4;
        bytes[idx..idx + 4].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            parse_dicom(&bytes, Path::new("e.dcm")),
            Err(VolumeError::Dicom { .. })
        ));
    }

    // ── Series ────────────────────────────────────────────────────────────────

    #[test]
    fn test_load_series_sorted_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.DCM"), dicom_bytes(1, 1, &[2], true)).unwrap();
        std::fs::write(tmp.path().join("a.dcm"), dicom_bytes(1, 1, &[1], true)).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let series = load_series(tmp.path()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].pixels.values, vec![-1023.0]);
        assert_eq!(series[1].pixels.values, vec![-1022.0]);

        let volume = series_volume(&series).unwrap();
        assert_eq!(volume.dims, [1, 1, 2]);
        assert_eq!(volume.spacing, [0.75, 0.5, 1.0]);
    }

    #[test]
    fn test_load_series_empty_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("readme.md"), "x").unwrap();
        assert!(matches!(
            load_series(tmp.path()),
            Err(VolumeError::EmptyDirectory(_))
        ));
    }

    #[test]
    fn test_load_series_size_mismatch() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("1.dcm"), dicom_bytes(1, 1, &[1], true)).unwrap();
        std::fs::write(tmp.path().join("2.dcm"), dicom_bytes(1, 2, &[1, 2], true)).unwrap();
        assert!(load_series(tmp.path()).is_err());
    }
}

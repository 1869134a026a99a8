//! VTK XML `ImageData` (`.vti`) files with one point-data array.
//!
//! Reads `ascii`, inline `binary` and `appended` (`raw` or `base64`)
//! arrays, uncompressed or `vtkZLibDataCompressor`-compressed, with
//! `UInt32` or `UInt64` headers in either byte order.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{io_err, Result, VolumeError};
use crate::grid::ScalarVolume;

const APPENDED_TAG: &[u8] = b"<AppendedData";
const APPENDED_END: &[u8] = b"</AppendedData>";

fn start_tag(text: &str, tag: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(\w+)\b([^>]*)>").expect("regex is valid"))
        .captures_iter(text)
        .find(|c| &c[1] == tag)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim_end_matches('/').to_string())
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).expect("regex is valid"))
}

/// A `<DataArray>` element, either self-closing (appended data) or with an
/// inline body.
fn data_array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<DataArray\b([^>]*?)(?:/>|>(.*?)</DataArray>)").expect("regex is valid")
    })
}

fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    attr_re()
        .captures_iter(attrs)
        .find(|c| &c[1] == name)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn bad(msg: impl Into<String>) -> VolumeError {
    VolumeError::Vti(msg.into())
}

fn parse_numbers<const N: usize>(text: &str, what: &str) -> Result<[f64; N]> {
    let nums: Vec<f64> = text
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| bad(format!("{what}: '{text}' is not numeric")))?;
    nums.try_into()
        .map_err(|_| bad(format!("{what}: expected {N} values in '{text}'")))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl ScalarType {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "Int8" | "Char" => Self::Int8,
            "UInt8" | "UnsignedChar" => Self::UInt8,
            "Int16" | "Short" => Self::Int16,
            "UInt16" | "UnsignedShort" => Self::UInt16,
            "Int32" | "Int" => Self::Int32,
            "UInt32" | "UnsignedInt" => Self::UInt32,
            "Int64" | "Long" => Self::Int64,
            "UInt64" | "UnsignedLong" => Self::UInt64,
            "Float32" | "Float" => Self::Float32,
            "Float64" | "Double" => Self::Float64,
            other => return Err(bad(format!("unsupported data type '{other}'"))),
        })
    }

    fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    fn decode(self, bytes: &[u8], little: bool) -> f64 {
        macro_rules! read {
            ($t:ty) => {{
                let arr = bytes.try_into().unwrap_or([0; std::mem::size_of::<$t>()]);
                if little {
                    <$t>::from_le_bytes(arr) as f64
                } else {
                    <$t>::from_be_bytes(arr) as f64
                }
            }};
        }
        match self {
            Self::Int8 => read!(i8),
            Self::UInt8 => read!(u8),
            Self::Int16 => read!(i16),
            Self::UInt16 => read!(u16),
            Self::Int32 => read!(i32),
            Self::UInt32 => read!(u32),
            Self::Int64 => read!(i64),
            Self::UInt64 => read!(u64),
            Self::Float32 => read!(f32),
            Self::Float64 => read!(f64),
        }
    }
}

/// Read a `.vti` file.
pub fn read_vti(path: &Path) -> Result<ScalarVolume> {
    let bytes = std::fs::read(path).map_err(io_err(path))?;
    let volume = parse_vti_bytes(&bytes)?;
    info!(
        "Loaded volume {:?} from {} (range {:?})",
        volume.dims,
        path.display(),
        volume.scalar_range()
    );
    Ok(volume)
}

/// Parse the text of a `.vti` document.
pub fn parse_vti(text: &str) -> Result<ScalarVolume> {
    parse_vti_bytes(text.as_bytes())
}

/// The `<AppendedData>` section: its encoding and the bytes after the `_`
/// marker that `offset` attributes count from.
struct Appended<'a> {
    base64: bool,
    payload: &'a [u8],
}

/// Split a document into its XML part and the appended payload, if any.
/// Raw appended bytes need not be valid UTF-8, so only the XML part is
/// decoded as text.
fn split_appended(bytes: &[u8]) -> Result<(&[u8], Option<Appended<'_>>)> {
    let Some(tag) = find(bytes, APPENDED_TAG, 0) else {
        return Ok((bytes, None));
    };
    let close = find(bytes, b">", tag).ok_or_else(|| bad("unterminated <AppendedData> tag"))?;
    let attrs = String::from_utf8_lossy(&bytes[tag + APPENDED_TAG.len()..close]);
    let base64 = match attribute(&attrs, "encoding").unwrap_or("raw") {
        "raw" => false,
        "base64" => true,
        other => return Err(bad(format!("unsupported appended encoding '{other}'"))),
    };
    let marker = find(bytes, b"_", close).ok_or_else(|| bad("<AppendedData> without '_' marker"))?;
    let mut payload = &bytes[marker + 1..];
    if base64 {
        if let Some(end) = find(payload, APPENDED_END, 0) {
            payload = &payload[..end];
        }
    }
    Ok((&bytes[..tag], Some(Appended { base64, payload })))
}

fn parse_vti_bytes(bytes: &[u8]) -> Result<ScalarVolume> {
    let (xml, appended) = split_appended(bytes)?;
    let text = String::from_utf8_lossy(xml);

    let file_attrs = start_tag(&text, "VTKFile").ok_or_else(|| bad("missing <VTKFile> element"))?;
    let file_attrs = file_attrs.as_str();
    if attribute(file_attrs, "type") != Some("ImageData") {
        return Err(bad("not an ImageData file"));
    }
    let compressed = match attribute(file_attrs, "compressor") {
        None => false,
        Some("vtkZLibDataCompressor") => true,
        Some(other) => return Err(bad(format!("unsupported compressor '{other}'"))),
    };
    let little = attribute(file_attrs, "byte_order").unwrap_or("LittleEndian") == "LittleEndian";
    let header = match attribute(file_attrs, "header_type").unwrap_or("UInt32") {
        "UInt32" => ScalarType::UInt32,
        "UInt64" => ScalarType::UInt64,
        other => return Err(bad(format!("unsupported header type '{other}'"))),
    };
    let layout = BinaryLayout {
        header,
        little,
        compressed,
    };

    let image_attrs = start_tag(&text, "ImageData").ok_or_else(|| bad("missing <ImageData> element"))?;
    let image_attrs = image_attrs.as_str();
    let extent: [f64; 6] = parse_numbers(
        attribute(image_attrs, "WholeExtent").ok_or_else(|| bad("missing WholeExtent"))?,
        "WholeExtent",
    )?;
    let origin: [f64; 3] = parse_numbers(attribute(image_attrs, "Origin").unwrap_or("0 0 0"), "Origin")?;
    let spacing: [f64; 3] = parse_numbers(attribute(image_attrs, "Spacing").unwrap_or("1 1 1"), "Spacing")?;
    let mut dims = [0usize; 3];
    for axis in 0..3 {
        let span = extent[2 * axis + 1] - extent[2 * axis];
        if span < 0.0 {
            return Err(bad("negative extent"));
        }
        dims[axis] = span as usize + 1;
    }

    let point_data = text
        .find("<PointData")
        .ok_or_else(|| bad("missing <PointData>"))?;
    let caps = data_array_re()
        .captures(&text[point_data..])
        .ok_or_else(|| bad("missing point-data <DataArray>"))?;
    let attrs = caps.get(1).map_or("", |m| m.as_str());
    let body = caps.get(2).map_or("", |m| m.as_str());
    let scalar = ScalarType::parse(attribute(attrs, "type").ok_or_else(|| bad("DataArray without type"))?)?;
    let components: usize = attribute(attrs, "NumberOfComponents")
        .unwrap_or("1")
        .parse()
        .map_err(|_| bad("invalid NumberOfComponents"))?;
    if components != 1 {
        return Err(bad(format!("expected a scalar array, got {components} components")));
    }

    let values = match attribute(attrs, "format").unwrap_or("ascii") {
        "ascii" => body
            .split_whitespace()
            .map(|t| t.parse::<f64>().map_err(|_| bad(format!("invalid value '{t}'"))))
            .collect::<Result<Vec<_>>>()?,
        "binary" => layout.read_array(&decode_base64_blocks(body.as_bytes())?, scalar)?,
        "appended" => {
            let appended = appended
                .ok_or_else(|| bad("appended DataArray but the file has no <AppendedData> section"))?;
            let offset: usize = attribute(attrs, "offset")
                .unwrap_or("0")
                .parse()
                .map_err(|_| bad("invalid DataArray offset"))?;
            let start = appended
                .payload
                .get(offset..)
                .ok_or_else(|| bad(format!("offset {offset} lies past the appended data")))?;
            if appended.base64 {
                layout.read_array(&decode_base64_blocks(start)?, scalar)?
            } else {
                layout.read_array(start, scalar)?
            }
        }
        other => return Err(bad(format!("unsupported array format '{other}'"))),
    };
    debug!("Parsed {} {:?} values", values.len(), scalar);
    ScalarVolume::new(dims, spacing, origin, values)
}

/// Decode base64 text that may hold several independently padded blocks,
/// as VTK encodes the header and the data of an array separately.
fn decode_base64_blocks(text: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = text.iter().copied().filter(|c| !c.is_ascii_whitespace()).collect();
    let mut bytes = Vec::with_capacity(compact.len() / 4 * 3);
    let mut start = 0;
    let mut i = 0;
    while i < compact.len() {
        if compact[i] == b'=' {
            while i < compact.len() && compact[i] == b'=' {
                i += 1;
            }
            bytes.extend(STANDARD.decode(&compact[start..i])?);
            start = i;
        } else {
            i += 1;
        }
    }
    if start < compact.len() {
        bytes.extend(STANDARD.decode(&compact[start..])?);
    }
    Ok(bytes)
}

/// How binary arrays are framed in this file.
#[derive(Debug, Clone, Copy)]
struct BinaryLayout {
    header: ScalarType,
    little: bool,
    compressed: bool,
}

impl BinaryLayout {
    fn word(&self, bytes: &[u8], index: usize) -> Result<usize> {
        let size = self.header.size();
        let word = bytes
            .get(index * size..(index + 1) * size)
            .ok_or_else(|| bad("binary array shorter than its header"))?;
        Ok(self.header.decode(word, self.little) as usize)
    }

    /// Decode one array starting at its header.
    fn read_array(&self, bytes: &[u8], scalar: ScalarType) -> Result<Vec<f64>> {
        let raw = if self.compressed {
            self.inflate(bytes)?
        } else {
            let declared = self.word(bytes, 0)?;
            let data = &bytes[self.header.size()..];
            if data.len() < declared {
                return Err(bad(format!(
                    "binary array declares {declared} bytes, found {}",
                    data.len()
                )));
            }
            data[..declared].to_vec()
        };
        Ok(raw
            .chunks_exact(scalar.size())
            .map(|c| scalar.decode(c, self.little))
            .collect())
    }

    /// `vtkZLibDataCompressor` framing: block count, block size, size of the
    /// last block (0 when full), one compressed size per block, then the
    /// zlib streams back to back.
    fn inflate(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let blocks = self.word(bytes, 0)?;
        let block_size = self.word(bytes, 1)?;
        let last_size = self.word(bytes, 2)?;
        let mut pos = (3 + blocks) * self.header.size();

        let mut out = Vec::with_capacity(blocks * block_size);
        for b in 0..blocks {
            let compressed_size = self.word(bytes, 3 + b)?;
            let chunk = bytes
                .get(pos..pos + compressed_size)
                .ok_or_else(|| bad(format!("compressed block {b} is truncated")))?;
            pos += compressed_size;

            let expected = if b + 1 == blocks && last_size != 0 {
                last_size
            } else {
                block_size
            };
            let mut block = Vec::with_capacity(expected);
            ZlibDecoder::new(chunk)
                .read_to_end(&mut block)
                .map_err(|e| bad(format!("compressed block {b}: {e}")))?;
            if block.len() != expected {
                return Err(bad(format!(
                    "compressed block {b} inflates to {} bytes, expected {expected}",
                    block.len()
                )));
            }
            out.extend(block);
        }
        Ok(out)
    }
}

/// Write `volume` as a binary (base64) `Float64` `.vti` file.
pub fn write_vti(volume: &ScalarVolume, path: &Path, array_name: &str) -> Result<()> {
    std::fs::write(path, to_vti_string(volume, array_name)).map_err(io_err(path))
}

pub fn to_vti_string(volume: &ScalarVolume, array_name: &str) -> String {
    let [nx, ny, nz] = volume.dims;
    let extent = format!(
        "0 {} 0 {} 0 {}",
        nx.saturating_sub(1),
        ny.saturating_sub(1),
        nz.saturating_sub(1)
    );
    let join = |v: &[f64; 3]| format!("{} {} {}", v[0], v[1], v[2]);

    let mut raw = Vec::with_capacity(4 + 8 * volume.len());
    raw.extend_from_slice(&((8 * volume.len()) as u32).to_le_bytes());
    for v in &volume.values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    let (lo, hi) = volume.scalar_range();

    format!(
        r#"<?xml version="1.0"?>
<VTKFile type="ImageData" version="1.0" byte_order="LittleEndian" header_type="UInt32">
  <ImageData WholeExtent="{extent}" Origin="{origin}" Spacing="{spacing}" Direction="1 0 0 0 1 0 0 0 1">
    <Piece Extent="{extent}">
      <PointData Scalars="{array_name}">
        <DataArray type="Float64" Name="{array_name}" format="binary" RangeMin="{lo}" RangeMax="{hi}">
          {data}
        </DataArray>
      </PointData>
      <CellData>
      </CellData>
    </Piece>
  </ImageData>
</VTKFile>
"#,
        origin = join(&volume.origin),
        spacing = join(&volume.spacing),
        data = STANDARD.encode(&raw),
    )
}

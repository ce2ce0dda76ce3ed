//! Minimal FITS image reader.
//!
//! Reads the header of each HDU (2880-byte blocks of 80-character cards),
//! skips to the requested HDU and decodes its first image plane. Supports
//! BITPIX 8, 16, 32, -32 and -64 with BZERO/BSCALE scaling.

use crate::{ConvertError, ConvertResult, Frame, FrameDecoder};
use std::collections::HashMap;
use std::path::Path;

const BLOCK: usize = 2880;
const CARD: usize = 80;

/// HDU holding the max-pixel image in station capture files.
pub const DEFAULT_HDU: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct FitsDecoder {
    hdu: usize,
}

impl FitsDecoder {
    pub fn new(hdu: usize) -> Self {
        Self { hdu }
    }

    pub fn hdu(&self) -> usize {
        self.hdu
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> ConvertResult<Frame> {
        let mut offset = 0;
        for index in 0.. {
            let (header, data_start) = Header::parse(bytes, offset)?;
            let data_len = header.data_len(index == 0)?;
            if index == self.hdu {
                return header.image(bytes.get(data_start..).unwrap_or_default());
            }
            offset = data_len
                .div_ceil(BLOCK)
                .checked_mul(BLOCK)
                .and_then(|padded| padded.checked_add(data_start))
                .ok_or_else(oversized)?;
            if offset >= bytes.len() {
                break;
            }
        }
        Err(ConvertError::Format(format!("no HDU {} in file", self.hdu)))
    }
}

impl Default for FitsDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_HDU)
    }
}

impl FrameDecoder for FitsDecoder {
    fn decode(&self, path: &Path) -> ConvertResult<Frame> {
        let bytes = std::fs::read(path).map_err(|source| ConvertError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode_bytes(&bytes)
    }
}

// ─── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Header {
    values: HashMap<String, String>,
}

impl Header {
    /// Parse the header starting at `offset`; returns it with the offset of
    /// the data that follows.
    fn parse(bytes: &[u8], mut offset: usize) -> ConvertResult<(Self, usize)> {
        let mut header = Self::default();
        loop {
            let block = bytes
                .get(offset..offset + BLOCK)
                .ok_or_else(|| ConvertError::Format("truncated header".to_string()))?;
            offset += BLOCK;

            for card in block.chunks_exact(CARD) {
                let card = std::str::from_utf8(card)
                    .ok()
                    .filter(|c| c.is_ascii())
                    .ok_or_else(|| ConvertError::Format("non-ASCII header card".to_string()))?;
                let keyword = card[..8].trim_end();
                if keyword == "END" {
                    return Ok((header, offset));
                }
                if &card[8..10] == "= " {
                    header
                        .values
                        .insert(keyword.to_string(), card_value(&card[10..]));
                }
            }
        }
    }

    fn int(&self, key: &str) -> ConvertResult<Option<i64>> {
        self.values
            .get(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| ConvertError::Format(format!("{key} is not an integer: {v:?}")))
            })
            .transpose()
    }

    fn float(&self, key: &str, default: f64) -> ConvertResult<f64> {
        match self.values.get(key) {
            Some(v) => v
                .replace(['D', 'd'], "E")
                .parse::<f64>()
                .map_err(|_| ConvertError::Format(format!("{key} is not a number: {v:?}"))),
            None => Ok(default),
        }
    }

    fn required(&self, key: &str) -> ConvertResult<i64> {
        self.int(key)?
            .ok_or_else(|| ConvertError::Format(format!("missing {key}")))
    }

    fn bitpix(&self) -> ConvertResult<i64> {
        let bitpix = self.required("BITPIX")?;
        match bitpix {
            8 | 16 | 32 | -32 | -64 => Ok(bitpix),
            other => Err(ConvertError::Format(format!("unsupported BITPIX {other}"))),
        }
    }

    fn axes(&self) -> ConvertResult<Vec<usize>> {
        let naxis = self.required("NAXIS")?;
        (1..=naxis)
            .map(|n| {
                let len = self.required(&format!("NAXIS{n}"))?;
                usize::try_from(len).map_err(|_| ConvertError::Format(format!("NAXIS{n} = {len}")))
            })
            .collect()
    }

    /// Unpadded size of the data unit in bytes.
    fn data_len(&self, primary: bool) -> ConvertResult<usize> {
        let axes = self.axes()?;
        if axes.is_empty() {
            return Ok(0);
        }
        let bytes_per_value = self.bitpix()?.unsigned_abs() as usize / 8;
        let values = axes
            .iter()
            .try_fold(1usize, |acc, len| acc.checked_mul(*len))
            .ok_or_else(oversized)?;
        if primary {
            return bytes_per_value.checked_mul(values).ok_or_else(oversized);
        }
        let pcount = self.int("PCOUNT")?.unwrap_or(0).max(0) as usize;
        let gcount = self.int("GCOUNT")?.unwrap_or(1).max(0) as usize;
        pcount
            .checked_add(values)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bytes_per_value))
            .ok_or_else(oversized)
    }

    fn image(&self, data: &[u8]) -> ConvertResult<Frame> {
        let axes = self.axes()?;
        if axes.len() < 2 {
            return Err(ConvertError::Format(format!(
                "HDU holds no image ({} axes)",
                axes.len()
            )));
        }
        let (width, height) = (axes[0], axes[1]);
        let bitpix = self.bitpix()?;
        let bzero = self.float("BZERO", 0.0)?;
        let bscale = self.float("BSCALE", 1.0)?;

        let size = bitpix.unsigned_abs() as usize / 8;
        let frame_width = u32::try_from(width).map_err(|_| oversized())?;
        let frame_height = u32::try_from(height).map_err(|_| oversized())?;
        let len = width
            .checked_mul(height)
            .and_then(|count| count.checked_mul(size))
            .ok_or_else(oversized)?;
        let raw = data
            .get(..len)
            .ok_or_else(|| ConvertError::Format("truncated data unit".to_string()))?;

        let pixels = raw
            .chunks_exact(size)
            .map(|c| {
                let value = match bitpix {
                    8 => f64::from(c[0]),
                    16 => f64::from(i16::from_be_bytes([c[0], c[1]])),
                    32 => f64::from(i32::from_be_bytes([c[0], c[1], c[2], c[3]])),
                    -32 => f64::from(f32::from_be_bytes([c[0], c[1], c[2], c[3]])),
                    _ => f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]),
                };
                (bzero + bscale * value) as f32
            })
            .collect();

        Frame::new(frame_width, frame_height, pixels)
    }
}

fn oversized() -> ConvertError {
    ConvertError::Format("data unit size overflows".to_string())
}

/// Value part of a card: quoted strings unquoted, comments stripped.
fn card_value(raw: &str) -> String {
    let raw = raw.trim_start();
    if let Some(rest) = raw.strip_prefix('\'') {
        return rest.split('\'').next().unwrap_or_default().trim_end().to_string();
    }
    raw.split('/').next().unwrap_or_default().trim().to_string()
}

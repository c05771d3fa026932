//! Stream filters for image data.
//!
//! lopdf refuses to decompress streams whose `/Subtype` is `/Image`, so image
//! samples go through this chain instead. `DCTDecode` and the other image
//! codecs are handled by the caller.

use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};
use lopdf::{Dictionary, Document, Object};

use bookdiff_core::BackendError;

use crate::xobject::{image_error, resolve};

/// LZW code tables never grow past 12-bit codes.
const LZW_MAX_CODES: usize = 4096;
const LZW_CLEAR: usize = 256;
const LZW_EOD: usize = 257;

/// `/DecodeParms` entries that matter for predictors and LZW.
#[derive(Debug, Clone, Copy)]
struct Params {
    predictor: i64,
    colors: usize,
    bits: usize,
    columns: usize,
    early_change: bool,
}

impl Params {
    fn from_dict(dict: Option<&Dictionary>) -> Self {
        let int = |key: &[u8], default: i64| {
            dict.and_then(|d| d.get(key).ok())
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(default)
        };
        let positive = |key: &[u8], default: i64| int(key, default).max(1) as usize;
        Self {
            predictor: int(b"Predictor", 1),
            colors: positive(b"Colors", 1),
            bits: positive(b"BitsPerComponent", 8),
            columns: positive(b"Columns", 1),
            early_change: int(b"EarlyChange", 1) != 0,
        }
    }
}

/// The `/DecodeParms` dictionary for the filter at `index`, if any.
fn params_for<'a>(doc: &'a Document, dict: &'a Dictionary, index: usize) -> Option<&'a Dictionary> {
    let parms = dict.get(b"DecodeParms").or_else(|_| dict.get(b"DP")).ok()?;
    match resolve(doc, parms).ok()? {
        Object::Dictionary(d) if index == 0 => Some(d),
        Object::Array(items) => items
            .get(index)
            .and_then(|item| resolve(doc, item).ok())
            .and_then(|item| item.as_dict().ok()),
        _ => None,
    }
}

/// Run `data` through every filter in `filters`, in order.
pub(crate) fn decode(
    doc: &Document,
    dict: &Dictionary,
    filters: &[Vec<u8>],
    data: &[u8],
) -> Result<Vec<u8>, BackendError> {
    let mut current = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        let params = Params::from_dict(params_for(doc, dict, i));
        current = match filter.as_slice() {
            b"FlateDecode" | b"Fl" => apply_predictor(inflate(&current)?, &params)?,
            b"LZWDecode" | b"LZW" => apply_predictor(lzw_decode(&current, params.early_change)?, &params)?,
            b"ASCIIHexDecode" | b"AHx" => ascii_hex_decode(&current)?,
            b"ASCII85Decode" | b"A85" => ascii85_decode(&current)?,
            b"RunLengthDecode" | b"RL" => run_length_decode(&current),
            other => {
                return Err(image_error(format!(
                    "unsupported stream filter /{}",
                    String::from_utf8_lossy(other)
                )));
            }
        };
    }
    Ok(current)
}

/// zlib data, or bare deflate data from writers that omit the header.
/// Output decoded before a corrupt tail is kept.
fn inflate(data: &[u8]) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => return Ok(out),
        Err(e) if !out.is_empty() => {
            tracing::debug!(error = %e, kept = out.len(), "truncated flate stream");
            return Ok(out);
        }
        Err(_) => {}
    }
    out.clear();
    DeflateDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| image_error(format!("failed to inflate image data: {e}")))?;
    Ok(out)
}

fn apply_predictor(data: Vec<u8>, params: &Params) -> Result<Vec<u8>, BackendError> {
    match params.predictor {
        1 => Ok(data),
        2 => tiff_predictor(data, params),
        10..=15 => png_predictor(&data, params),
        other => Err(image_error(format!("unsupported predictor {other}"))),
    }
}

fn tiff_predictor(mut data: Vec<u8>, params: &Params) -> Result<Vec<u8>, BackendError> {
    if params.bits != 8 {
        return Err(image_error(format!(
            "TIFF predictor with {} bits per component",
            params.bits
        )));
    }
    let row_len = params.colors * params.columns;
    for row in data.chunks_mut(row_len) {
        for i in params.colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - params.colors]);
        }
    }
    Ok(data)
}

/// Undo PNG row filters. Each row starts with its own filter-type byte.
fn png_predictor(data: &[u8], params: &Params) -> Result<Vec<u8>, BackendError> {
    let bpp = (params.colors * params.bits).div_ceil(8).max(1);
    let row_len = (params.colors * params.bits * params.columns).div_ceil(8);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];

    for encoded in data.chunks(row_len + 1) {
        let Some((&kind, bytes)) = encoded.split_first() else {
            break;
        };
        let mut row = bytes.to_vec();
        row.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let delta = match kind {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(image_error(format!("invalid PNG row filter {other}"))),
            };
            row[i] = row[i].wrapping_add(delta);
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let (pa, pb, pc) = ((p - i16::from(a)).abs(), (p - i16::from(b)).abs(), (p - i16::from(c)).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Variable-width (9 to 12 bit) LZW, most significant bit first.
fn lzw_decode(data: &[u8], early_change: bool) -> Result<Vec<u8>, BackendError> {
    let mut table: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
    table.push(Vec::new());
    table.push(Vec::new());

    let mut out = Vec::new();
    let mut code_len = 9;
    let mut prev: Option<usize> = None;
    let mut buffer: u32 = 0;
    let mut buffered = 0;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        buffered += 8;
        while buffered >= code_len {
            buffered -= code_len;
            let code = (buffer >> buffered) as usize & ((1 << code_len) - 1);
            buffer &= (1 << buffered) - 1;

            match code {
                LZW_CLEAR => {
                    table.truncate(LZW_EOD + 1);
                    code_len = 9;
                    prev = None;
                    continue;
                }
                LZW_EOD => return Ok(out),
                _ => {}
            }

            let entry = match (table.get(code), prev) {
                (Some(entry), _) if code > LZW_EOD || code < LZW_CLEAR => entry.clone(),
                (None, Some(p)) if code == table.len() => {
                    let mut entry = table[p].clone();
                    entry.push(table[p][0]);
                    entry
                }
                _ => return Err(image_error(format!("corrupt LZW code {code}"))),
            };
            out.extend_from_slice(&entry);

            if let Some(p) = prev
                && table.len() < LZW_MAX_CODES
            {
                let mut next = table[p].clone();
                next.push(entry[0]);
                table.push(next);
            }
            prev = Some(code);

            let next_code = table.len() + usize::from(early_change);
            code_len = match next_code {
                n if n >= 2048 => 12,
                n if n >= 1024 => 11,
                n if n >= 512 => 10,
                _ => 9,
            };
        }
    }
    Ok(out)
}

fn ascii_hex_decode(data: &[u8]) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &c in data {
        if c == b'>' {
            break;
        }
        if c.is_ascii_whitespace() {
            continue;
        }
        let digit = (c as char)
            .to_digit(16)
            .ok_or_else(|| image_error(format!("invalid hex digit {:?}", c as char)))?
            as u8;
        match high.take() {
            Some(h) => out.push(h << 4 | digit),
            None => high = Some(digit),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut len = 0;

    let mut bytes = data.iter().copied();
    while let Some(c) = bytes.next() {
        match c {
            b'~' => break,
            b'z' if len == 0 => out.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[len] = c - b'!';
                len += 1;
                if len == 5 {
                    out.extend_from_slice(&base85_word(&group).to_be_bytes());
                    len = 0;
                }
            }
            c if c.is_ascii_whitespace() => {}
            other => {
                return Err(image_error(format!("invalid ASCII85 byte {other:#04x}")));
            }
        }
    }
    if len == 1 {
        return Err(image_error("ASCII85 data ends with a single character"));
    }
    if len > 1 {
        group[len..].fill(b'u' - b'!');
        out.extend_from_slice(&base85_word(&group).to_be_bytes()[..len - 1]);
    }
    Ok(out)
}

fn base85_word(group: &[u8; 5]) -> u32 {
    group
        .iter()
        .fold(0u32, |acc, &d| acc.wrapping_mul(85).wrapping_add(u32::from(d)))
}

fn run_length_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while let Some(&len) = data.get(i) {
        match len {
            128 => break,
            0..=127 => {
                let end = (i + 2 + len as usize).min(data.len());
                out.extend_from_slice(&data[i + 1..end]);
                i = end;
            }
            _ => {
                if let Some(&byte) = data.get(i + 1) {
                    out.extend(std::iter::repeat_n(byte, 257 - len as usize));
                }
                i += 2;
            }
        }
    }
    out
}

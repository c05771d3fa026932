//! Embedded raster image lookup and decoding.

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use bookdiff_core::BackendError;

use crate::filters::decode as decode_filters;

/// Upper bound on `/Parent` hops when looking for inherited resources.
const MAX_TREE_DEPTH: usize = 64;

/// Refuse to allocate for images larger than this many pixels.
const MAX_PIXELS: u64 = 1 << 28;

/// Black in every supported base space (gray, RGB and CMYK prefixes).
const BLACK: [u8; 4] = [0, 0, 0, 255];

fn extraction_error(msg: impl Into<String>) -> BackendError {
    BackendError::ExtractionError(msg.into())
}

pub(crate) fn image_error(msg: impl Into<String>) -> BackendError {
    BackendError::ImageError(msg.into())
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, BackendError> {
    match obj {
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|e| extraction_error(format!("broken reference {} {}: {e}", id.0, id.1))),
        other => Ok(other),
    }
}

fn name(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// The page's `/Resources`, walking up the page tree if the page inherits them.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>, BackendError> {
    let mut node = doc
        .get_dictionary(page_id)
        .map_err(|e| extraction_error(format!("page object: {e}")))?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(doc, resources)?
                .as_dict()
                .map(Some)
                .map_err(|_| extraction_error("/Resources is not a dictionary"));
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => {
                node = doc
                    .get_dictionary(*parent)
                    .map_err(|e| extraction_error(format!("page tree node: {e}")))?;
            }
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// Image XObjects a page references, as `(resource name, stream)`.
pub(crate) fn page_image_streams(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<(String, &Stream)>, BackendError> {
    let Some(resources) = page_resources(doc, page_id)? else {
        return Ok(Vec::new());
    };
    let Ok(xobjects) = resources.get(b"XObject") else {
        return Ok(Vec::new());
    };
    let xobjects = resolve(doc, xobjects)?
        .as_dict()
        .map_err(|_| extraction_error("/XObject is not a dictionary"))?;

    let mut images = Vec::new();
    for (key, obj) in xobjects.iter() {
        let Ok(stream) = resolve(doc, obj)?.as_stream() else {
            continue;
        };
        if stream.dict.get(b"Subtype").ok().and_then(name) == Some(b"Image".as_slice()) {
            images.push((String::from_utf8_lossy(key).into_owned(), stream));
        }
    }
    Ok(images)
}

#[derive(Debug, Clone, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorModel>, palette: Vec<u8> },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Indexed { .. } => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }
}

/// The stream's data with all of its `/Filter`s undone.
fn stream_bytes(doc: &Document, stream: &Stream) -> Result<Vec<u8>, BackendError> {
    let filters = filter_names(doc, &stream.dict)?;
    if filters.is_empty() {
        return Ok(stream.content.clone());
    }
    decode_filters(doc, &stream.dict, &filters, &stream.content)
}

fn color_model(doc: &Document, obj: &Object) -> Result<ColorModel, BackendError> {
    match resolve(doc, obj)? {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorModel::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorModel::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
            other => Err(image_error(format!(
                "unsupported color space /{}",
                String::from_utf8_lossy(other)
            ))),
        },
        Object::Array(parts) => {
            let family = parts.first().and_then(name).unwrap_or_default();
            match family {
                b"CalGray" => Ok(ColorModel::Gray),
                b"CalRGB" => Ok(ColorModel::Rgb),
                b"ICCBased" => {
                    let profile = parts
                        .get(1)
                        .ok_or_else(|| image_error("ICCBased without a profile"))?;
                    let profile = resolve(doc, profile)?
                        .as_stream()
                        .map_err(|_| image_error("ICCBased profile is not a stream"))?;
                    match profile.dict.get(b"N").and_then(Object::as_i64) {
                        Ok(1) => Ok(ColorModel::Gray),
                        Ok(3) => Ok(ColorModel::Rgb),
                        Ok(4) => Ok(ColorModel::Cmyk),
                        _ => match profile.dict.get(b"Alternate") {
                            Ok(alternate) => color_model(doc, alternate),
                            Err(_) => Err(image_error("ICCBased profile without /N")),
                        },
                    }
                }
                b"Indexed" | b"I" => {
                    let base = parts
                        .get(1)
                        .ok_or_else(|| image_error("Indexed without a base space"))?;
                    let base = color_model(doc, base)?;
                    if matches!(base, ColorModel::Indexed { .. }) {
                        return Err(image_error("nested Indexed color space"));
                    }
                    let lookup = parts
                        .get(3)
                        .ok_or_else(|| image_error("Indexed without a lookup table"))?;
                    let palette = match resolve(doc, lookup)? {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(stream) => stream_bytes(doc, stream)?,
                        _ => return Err(image_error("Indexed lookup is not a string or stream")),
                    };
                    Ok(ColorModel::Indexed {
                        base: Box::new(base),
                        palette,
                    })
                }
                other => Err(image_error(format!(
                    "unsupported color space /{}",
                    String::from_utf8_lossy(other)
                ))),
            }
        }
        _ => Err(image_error("malformed /ColorSpace")),
    }
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Result<Vec<Vec<u8>>, BackendError> {
    let Ok(filter) = dict.get(b"Filter") else {
        return Ok(Vec::new());
    };
    match resolve(doc, filter)? {
        Object::Name(n) => Ok(vec![n.clone()]),
        Object::Array(items) => Ok(items.iter().filter_map(name).map(<[u8]>::to_vec).collect()),
        _ => Err(image_error("malformed /Filter")),
    }
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, BackendError> {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|&v| v > 0)
        .ok_or_else(|| image_error(format!("missing or invalid /{}", String::from_utf8_lossy(key))))
}

/// Decode an image XObject into a bitmap.
///
/// JPEG (`DCTDecode`) data is handed to the `image` crate as-is. Other
/// streams are run through their filters and interpreted according to
/// `/ColorSpace` and `/BitsPerComponent`. JPEG 2000, JBIG2 and CCITT data
/// are reported as [`BackendError::ImageError`].
pub fn decode_image(doc: &Document, stream: &Stream) -> Result<DynamicImage, BackendError> {
    let dict = &stream.dict;
    let filters = filter_names(doc, dict)?;

    for filter in &filters {
        match filter.as_slice() {
            b"DCTDecode" | b"DCT" if filters.len() == 1 => {
                return image::load_from_memory(&stream.content)
                    .map_err(|e| image_error(format!("JPEG: {e}")));
            }
            b"DCTDecode" | b"DCT" | b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode" | b"CCF" => {
                return Err(image_error(format!(
                    "unsupported image filter /{}",
                    String::from_utf8_lossy(filter)
                )));
            }
            _ => {}
        }
    }

    let width = dimension(dict, b"Width")?;
    let height = dimension(dict, b"Height")?;
    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(image_error(format!("image too large: {width}x{height}")));
    }

    let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let bits = if is_mask {
        1
    } else {
        dict.get(b"BitsPerComponent")
            .and_then(Object::as_i64)
            .unwrap_or(8)
    };
    let bits = match bits {
        1 | 2 | 4 | 8 | 16 => bits as u8,
        other => return Err(image_error(format!("unsupported BitsPerComponent {other}"))),
    };

    let model = if is_mask {
        ColorModel::Gray
    } else {
        let space = dict
            .get(b"ColorSpace")
            .map_err(|_| image_error("missing /ColorSpace"))?;
        color_model(doc, space)?
    };

    let raw = decode_filters(doc, dict, &filters, &stream.content)?;
    let scale = !matches!(model, ColorModel::Indexed { .. });
    let mut samples = unpack_samples(&raw, width, height, model.components(), bits, scale)?;

    if model.components() == 1 && scale && decode_inverted(dict) {
        samples.iter_mut().for_each(|s| *s = 255 - *s);
    }

    build_image(samples, width, height, &model)
}

/// `/Decode [1 0]` on a single-component image.
fn decode_inverted(dict: &Dictionary) -> bool {
    let Ok(Object::Array(decode)) = dict.get(b"Decode") else {
        return false;
    };
    let first = decode.first().and_then(|o| o.as_float().ok());
    let second = decode.get(1).and_then(|o| o.as_float().ok());
    matches!((first, second), (Some(a), Some(b)) if a > b)
}

/// Expand packed samples to one byte per component.
///
/// With `scale`, values are stretched to 0..=255; otherwise they are kept as
/// raw indices. Rows are padded to a byte boundary, as PDF requires.
fn unpack_samples(
    raw: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bits: u8,
    scale: bool,
) -> Result<Vec<u8>, BackendError> {
    let per_row = width as usize * components;
    let row_bytes = (per_row * bits as usize).div_ceil(8);
    let needed = row_bytes * height as usize;
    if raw.len() < needed {
        return Err(image_error(format!(
            "image data holds {} bytes, expected {needed}",
            raw.len()
        )));
    }

    let max = (1u32 << bits.min(8)) - 1;
    let mut out = Vec::with_capacity(per_row * height as usize);
    for row in raw[..needed].chunks_exact(row_bytes) {
        match bits {
            8 => out.extend_from_slice(&row[..per_row]),
            16 => out.extend(row.chunks_exact(2).take(per_row).map(|pair| pair[0])),
            _ => {
                for i in 0..per_row {
                    let bit = i * bits as usize;
                    let shift = 8 - bits as usize - (bit % 8);
                    let value = (u32::from(row[bit / 8]) >> shift) & max;
                    out.push(if scale { (value * 255 / max) as u8 } else { value as u8 });
                }
            }
        }
    }
    Ok(out)
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let channel = |v: u8| ((255 - u16::from(v)) * (255 - u16::from(k)) / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

fn build_image(
    samples: Vec<u8>,
    width: u32,
    height: u32,
    model: &ColorModel,
) -> Result<DynamicImage, BackendError> {
    let mismatch = || image_error("sample count does not match image size");
    match model {
        ColorModel::Gray => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(mismatch),
        ColorModel::Rgb => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(mismatch),
        ColorModel::Cmyk => {
            let rgb = samples
                .chunks_exact(4)
                .flat_map(|p| cmyk_to_rgb(p[0], p[1], p[2], p[3]))
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch)
        }
        ColorModel::Indexed { base, palette } => {
            let n = base.components();
            let mut rgb = Vec::with_capacity(samples.len() * 3);
            for index in samples {
                let start = index as usize * n;
                let entry = palette.get(start..start + n).unwrap_or(&BLACK[..n]);
                let pixel = match **base {
                    ColorModel::Gray => [entry[0]; 3],
                    ColorModel::Cmyk => cmyk_to_rgb(entry[0], entry[1], entry[2], entry[3]),
                    _ => [entry[0], entry[1], entry[2]],
                };
                rgb.extend_from_slice(&pixel);
            }
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch)
        }
    }
}

use std::io::{Cursor, Write};
use std::sync::Arc;

use bookdiff_core::mock::{MockBackend, MockOcr};
use bookdiff_core::{BackendError, PassError, PdfBackend, PdfPages, PdfTextExtractor};
use bookdiff_pdf_lopdf::LopdfBackend;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

enum Fixture {
    Text(&'static str),
    /// One image XObject per entry, drawn by the page content.
    Images(Vec<Stream>),
}

/// Grayscale 8-bit image whose pixels are the bytes of `text`. `MockOcr`
/// reads such images back as `text`.
fn text_image(text: &str) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => text.len() as i64,
            "Height" => 1i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8i64,
        },
        text.as_bytes().to_vec(),
    )
}

fn build_pdf(pages: Vec<Fixture>, inherit_resources: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    let mut shared_xobjects = Dictionary::new();
    for page in pages {
        let mut xobjects = Dictionary::new();
        let content = match page {
            Fixture::Text(text) => format!("BT /F1 12 Tf 10 50 Td ({text}) Tj ET"),
            Fixture::Images(images) => {
                let mut ops = String::new();
                for (i, image) in images.into_iter().enumerate() {
                    let image_id = doc.add_object(Object::Stream(image));
                    xobjects.set(format!("Im{i}"), image_id);
                    ops.push_str(&format!("q 50 0 0 20 10 {} cm /Im{i} Do Q ", 10 + i * 25));
                }
                ops
            }
        };
        let content_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.into_bytes(),
        )));

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
            "Contents" => content_id,
        };
        if inherit_resources {
            for (name, obj) in xobjects.iter() {
                shared_xobjects.set(name.clone(), obj.clone());
            }
        } else {
            page_dict.set(
                "Resources",
                dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects,
                },
            );
        }
        kids.push(doc.add_object(page_dict).into());
    }

    let mut pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids.clone(),
        "Count" => kids.len() as i64,
    };
    if inherit_resources {
        pages_dict.set(
            "Resources",
            dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => shared_xobjects,
            },
        );
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("failed to save test PDF");
    buf
}

fn fallback_only(ocr: Arc<MockOcr>) -> (Arc<MockBackend>, PdfTextExtractor) {
    let primary = Arc::new(MockBackend::unreadable("primary", "simulated crash"));
    let extractor = PdfTextExtractor::new(primary.clone(), Arc::new(LopdfBackend::new()), ocr);
    (primary, extractor)
}

#[test]
fn text_layer_is_read_per_page() {
    let data = build_pdf(
        vec![Fixture::Text("Chapter One"), Fixture::Text("Chapter Two")],
        false,
    );
    let document = LopdfBackend::new().open(&data).expect("open");

    assert_eq!(document.page_count(), 2);
    assert!(document.page_text(0).unwrap().contains("Chapter One"));
    assert!(document.page_text(1).unwrap().contains("Chapter Two"));
    assert!(document.page_images(0).unwrap().is_empty());
}

#[test]
fn garbage_is_an_open_error() {
    let err = LopdfBackend::new().open(b"not a pdf").err();
    assert!(matches!(err, Some(BackendError::OpenError(_))));
}

#[test]
fn images_are_decoded_in_resource_order() {
    let data = build_pdf(
        vec![Fixture::Images(vec![text_image("first"), text_image("second")])],
        false,
    );
    let document = LopdfBackend::new().open(&data).expect("open");
    let images = document.page_images(0).unwrap();

    assert_eq!(images.len(), 2);
    assert_eq!(images[0].width(), 5);
    assert_eq!(images[1].width(), 6);
}

#[test]
fn inherited_resources_are_found() {
    let data = build_pdf(vec![Fixture::Images(vec![text_image("shared")])], true);
    let document = LopdfBackend::new().open(&data).expect("open");
    assert_eq!(document.page_images(0).unwrap().len(), 1);
}

#[test]
fn flate_and_rgb_images_decode() {
    // Red first pixel, then blue; large enough that compression pays off.
    let mut pixels = vec![255, 0, 0];
    for _ in 1..128 {
        pixels.extend_from_slice(&[0, 0, 255]);
    }
    let mut rgb = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 64i64,
            "Height" => 2i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
        },
        pixels,
    );
    rgb.compress().expect("compress");
    assert!(rgb.dict.get(b"Filter").is_ok());

    let data = build_pdf(vec![Fixture::Images(vec![rgb])], false);
    let document = LopdfBackend::new().open(&data).expect("open");
    let image = document.page_images(0).unwrap().remove(0).to_rgb8();
    assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
    assert_eq!(image.get_pixel(1, 0).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(63, 1).0, [0, 0, 255]);
}

#[test]
fn lzw_images_decode() {
    // "-----A---B" as 9-bit LZW codes.
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 10i64,
            "Height" => 1i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8i64,
            "Filter" => "LZWDecode",
        },
        vec![0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01],
    );
    let data = build_pdf(vec![Fixture::Images(vec![stream])], false);
    let document = LopdfBackend::new().open(&data).expect("open");
    let image = document.page_images(0).unwrap().remove(0).to_luma8();
    assert_eq!(image.width(), 10);
    assert_eq!(image.get_pixel(4, 0).0, [b'-']);
    assert_eq!(image.get_pixel(5, 0).0, [b'A']);
    assert_eq!(image.get_pixel(9, 0).0, [b'B']);
}

#[test]
fn predicted_flate_image_is_ocrd_through_fallback() {
    // One PNG "Sub" row: each byte stored as the difference from its left neighbour.
    let text = b"Chapter Two";
    let mut row = vec![1u8];
    row.extend(
        text.iter()
            .enumerate()
            .map(|(i, &b)| if i == 0 { b } else { b.wrapping_sub(text[i - 1]) }),
    );
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&row).expect("deflate");
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => text.len() as i64,
            "Height" => 1i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8i64,
            "Filter" => "FlateDecode",
            "DecodeParms" => dictionary! {
                "Predictor" => 11i64,
                "Columns" => text.len() as i64,
            },
        },
        encoder.finish().expect("deflate"),
    );

    let data = build_pdf(
        vec![Fixture::Text("Chapter One"), Fixture::Images(vec![stream])],
        false,
    );
    let ocr = Arc::new(MockOcr::new());
    let (_, extractor) = fallback_only(ocr.clone());

    let text = extractor.extract(&data).expect("extract");
    assert!(text.ends_with("Chapter Two"), "{text:?}");
    assert_eq!(ocr.call_count(), 1);
}

#[test]
fn jpeg_images_decode() {
    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([200, 200, 200])))
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .expect("encode jpeg");
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 8i64,
            "Height" => 4i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    );

    let data = build_pdf(vec![Fixture::Images(vec![stream])], false);
    let document = LopdfBackend::new().open(&data).expect("open");
    let images = document.page_images(0).unwrap();
    assert_eq!((images[0].width(), images[0].height()), (8, 4));
}

#[test]
fn scanned_pages_are_ocrd_through_fallback() {
    let data = build_pdf(
        vec![
            Fixture::Text("Chapter One"),
            Fixture::Images(vec![text_image("Chapter "), text_image("Two")]),
        ],
        false,
    );
    let ocr = Arc::new(MockOcr::new());
    let (primary, extractor) = fallback_only(ocr.clone());

    let text = extractor.extract(&data).expect("extract");
    assert!(text.contains("Chapter One"));
    assert!(text.ends_with("Chapter Two"));
    assert_eq!(ocr.call_count(), 2);
    assert_eq!(primary.open_count(), 1);
}

#[test]
fn undecodable_image_fails_the_fallback() {
    let jbig2 = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 4i64,
            "Height" => 4i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 1i64,
            "Filter" => "JBIG2Decode",
        },
        vec![0; 8],
    );
    let data = build_pdf(vec![Fixture::Images(vec![jbig2])], false);
    let (_, extractor) = fallback_only(Arc::new(MockOcr::new()));

    let err = extractor.extract(&data).unwrap_err();
    assert_eq!(err.backend, "lopdf");
    assert!(matches!(
        err.source,
        PassError::Page {
            page: 1,
            source: BackendError::ImageError(_)
        }
    ));
}

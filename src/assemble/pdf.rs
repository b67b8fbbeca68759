//! PDF building blocks: text pages, raster pages, and the page merge.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::warn;

use super::AssembleError;

/// US letter in points.
pub const LETTER_WIDTH_PT: f32 = 612.0;
pub const LETTER_HEIGHT_PT: f32 = 792.0;

/// Text drawn on pages whose capture was exhausted.
pub const PLACEHOLDER_TEXT: &str = "Page capture failed";

/// Resolution assumed when a screenshot is laid out as a page.
pub const RASTER_DPI: f32 = 100.0;

const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"Resources", b"CropBox", b"Rotate"];

fn pdf_error(error: &lopdf::Error) -> AssembleError {
    AssembleError::Pdf {
        reason: error.to_string(),
    }
}

/// Single page of the given size with one line of Helvetica.
///
/// # Errors
///
/// Returns [`AssembleError::Pdf`] if the document cannot be serialized.
pub fn text_page_pdf(text: &str, width: f32, height: f32) -> Result<Vec<u8>, AssembleError> {
    let mut doc = Document::with_version("1.5");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    };
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(12)]),
            Operation::new("Td", vec![Object::Integer(100), Object::Real(height - 42.0)]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let stream = content.encode().map_err(|e| pdf_error(&e))?;
    single_page_document(doc, resources, stream, (width, height), false)
}

/// Letter-size page reading "Page capture failed".
///
/// Never fails in practice; a serialization error is logged and yields an
/// empty buffer, which the merge then rejects.
#[must_use]
pub fn placeholder_pdf() -> Vec<u8> {
    text_page_pdf(PLACEHOLDER_TEXT, LETTER_WIDTH_PT, LETTER_HEIGHT_PT).unwrap_or_else(|error| {
        warn!(%error, "placeholder page could not be built");
        Vec::new()
    })
}

/// Wraps an encoded image (PNG, JPEG, ...) into a single-page PDF at 100 dpi.
///
/// # Errors
///
/// Returns [`AssembleError::Pdf`] if the image cannot be decoded or the
/// document cannot be serialized.
pub fn image_to_pdf(encoded: &[u8]) -> Result<Vec<u8>, AssembleError> {
    let rgb = image::load_from_memory(encoded)
        .map_err(|e| AssembleError::Pdf {
            reason: format!("undecodable image: {e}"),
        })?
        .to_rgb8();
    let (pixel_width, pixel_height) = rgb.dimensions();
    #[allow(clippy::cast_precision_loss)]
    let (width, height) = (
        pixel_width as f32 * 72.0 / RASTER_DPI,
        pixel_height as f32 * 72.0 / RASTER_DPI,
    );

    let mut doc = Document::with_version("1.5");
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(i64::from(pixel_width)),
            "Height" => Object::Integer(i64::from(pixel_height)),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
        },
        rgb.into_raw(),
    ));
    let resources = dictionary! {
        "XObject" => dictionary! { "Im1" => image_id },
    };
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(height),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let stream = content.encode().map_err(|e| pdf_error(&e))?;
    single_page_document(doc, resources, stream, (width, height), true)
}

fn single_page_document(
    mut doc: Document,
    resources: Dictionary,
    content: Vec<u8>,
    (width, height): (f32, f32),
    compress: bool,
) -> Result<Vec<u8>, AssembleError> {
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width),
            Object::Real(height),
        ],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if compress {
        doc.compress();
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| AssembleError::Pdf {
        reason: e.to_string(),
    })?;
    Ok(bytes)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Dictionary(dict) => dict.get(b"Type").and_then(Object::as_name).ok(),
        _ => None,
    }
}

/// Copies attributes a page inherits from its `Pages` ancestors onto the page.
fn flatten_inherited(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key.to_vec(), value.clone());
            }
        }
        depth += 1;
        if depth > 32 {
            break;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

/// Concatenates the first page of every input document, in input order.
///
/// # Errors
///
/// Returns [`AssembleError::MergeFailed`] when there is no input, when an
/// input is not a readable PDF or has no page, or when the result cannot be
/// serialized.
pub fn merge_pdfs<B: AsRef<[u8]>>(inputs: &[B]) -> Result<Vec<u8>, AssembleError> {
    if inputs.is_empty() {
        return Err(AssembleError::MergeFailed {
            reason: "no pages to merge".to_string(),
        });
    }

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::with_capacity(inputs.len());

    for (position, input) in inputs.iter().enumerate() {
        let mut doc =
            Document::load_mem(input.as_ref()).map_err(|e| AssembleError::MergeFailed {
                reason: format!("page {} is not a readable PDF: {e}", position + 1),
            })?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let first_page = doc.get_pages().into_values().next().ok_or_else(|| {
            AssembleError::MergeFailed {
                reason: format!("page {} has no content", position + 1),
            }
        })?;
        let mut page = doc
            .get_dictionary(first_page)
            .map_err(|e| AssembleError::MergeFailed {
                reason: format!("page {}: {e}", position + 1),
            })?
            .clone();
        flatten_inherited(&doc, &mut page);
        page_ids.push(first_page);

        for (id, object) in doc.objects {
            match type_name(&object) {
                Some(b"Catalog" | b"Pages" | b"Outlines" | b"Outline") => {}
                Some(b"Page") if id != first_page => {}
                Some(b"Page") => {
                    merged.objects.insert(id, Object::Dictionary(page.clone()));
                }
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }
    }

    let pages_id = (next_id, 0);
    let catalog_id = (next_id + 1, 0);
    merged.max_id = next_id + 1;

    for page_id in &page_ids {
        if let Some(Object::Dictionary(page)) = merged.objects.get_mut(page_id) {
            page.set("Parent", pages_id);
        }
    }
    let count = i64::try_from(page_ids.len()).unwrap_or(i64::MAX);
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => Object::Integer(count),
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    merged.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    merged
        .save_to(&mut bytes)
        .map_err(|e| AssembleError::MergeFailed {
            reason: e.to_string(),
        })?;
    Ok(bytes)
}

/// Number of pages in a serialized PDF.
///
/// # Errors
///
/// Returns [`AssembleError::Pdf`] if the bytes are not a readable PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, AssembleError> {
    Document::load_mem(bytes)
        .map(|doc| doc.get_pages().len())
        .map_err(|e| pdf_error(&e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::browser::scripted::sample_png;

    fn page_text(doc: &Document, page: u32) -> String {
        let page_id = *doc.get_pages().get(&page).unwrap();
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    #[test]
    fn test_placeholder_is_single_letter_page() {
        let bytes = placeholder_pdf();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(page_text(&doc, 1).contains("(Page capture failed)"));
    }

    #[test]
    fn test_image_to_pdf_scales_at_100_dpi() {
        let bytes = image_to_pdf(&sample_png()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let media_box = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        // 20x30 px at 100 dpi is 14.4x21.6 pt.
        let width = media_box[2].as_float().unwrap();
        let height = media_box[3].as_float().unwrap();
        assert!((width - 14.4).abs() < 0.01);
        assert!((height - 21.6).abs() < 0.01);
    }

    #[test]
    fn test_image_to_pdf_rejects_garbage() {
        let error = image_to_pdf(b"not an image").unwrap_err();
        assert!(matches!(error, AssembleError::Pdf { .. }));
    }

    #[test]
    fn test_merge_preserves_order_and_count() {
        let inputs: Vec<Vec<u8>> = (1..=4)
            .map(|n| text_page_pdf(&format!("Page {n}"), 612.0, 792.0).unwrap())
            .collect();
        let merged = merge_pdfs(&inputs).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 4);
        for n in 1..=4 {
            assert!(page_text(&doc, n).contains(&format!("(Page {n})")));
        }
    }

    #[test]
    fn test_merge_mixes_raster_and_text_pages() {
        let inputs = vec![
            text_page_pdf("Page 1", 612.0, 792.0).unwrap(),
            image_to_pdf(&sample_png()).unwrap(),
            placeholder_pdf(),
        ];
        let merged = merge_pdfs(&inputs).unwrap();
        assert_eq!(page_count(&merged).unwrap(), 3);
    }

    #[test]
    fn test_merge_rejects_empty_and_unreadable_input() {
        let empty: Vec<Vec<u8>> = Vec::new();
        assert!(matches!(
            merge_pdfs(&empty),
            Err(AssembleError::MergeFailed { .. })
        ));

        let error = merge_pdfs(&[b"%PDF-garbage".to_vec()]).unwrap_err();
        match error {
            AssembleError::MergeFailed { reason } => assert!(reason.contains("page 1")),
            other => panic!("expected MergeFailed, got {other:?}"),
        }
    }
}

//! PDF page text and embedded image extraction.

use std::io::Cursor;
use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;

use super::Page;

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
fn create_pdfium(file: &str) -> Result<Pdfium, ExtractionError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ExtractionError::Parse {
            file: file.to_string(),
            message: format!("Failed to load PDFium library: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Extract every page of a PDF: its text verbatim and its embedded images as PNG bytes.
pub fn extract_pdf(path: &Path, file: &str) -> Result<Vec<Page>, ExtractionError> {
    let pdfium = create_pdfium(file)?;

    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ExtractionError::Parse {
            file: file.to_string(),
            message: format!("Failed to load PDF: {:?}", e),
        })?;

    let page_count = document.pages().len();
    info!(file = %file, pages = page_count, "Processing PDF pages");

    let mut pages = Vec::with_capacity(page_count as usize);
    for (index, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| ExtractionError::Parse {
                file: file.to_string(),
                message: format!("Failed to extract text from page {}: {:?}", index, e),
            })?
            .all();

        let images = extract_page_images(&page, file, index);

        pages.push(Page {
            document_id: file.to_string(),
            index,
            text,
            images,
        });
    }

    debug!(
        file = %file,
        pages = pages.len(),
        images = pages.iter().map(|p| p.images.len()).sum::<usize>(),
        "PDF extracted"
    );

    Ok(pages)
}

/// Re-encode each image object on the page as PNG. Undecodable images are skipped.
fn extract_page_images(page: &PdfPage, file: &str, index: usize) -> Vec<Vec<u8>> {
    let mut images = Vec::new();

    for object in page.objects().iter() {
        let PdfPageObject::Image(image_obj) = &object else {
            continue;
        };

        let raw = match image_obj.get_raw_image() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(file = %file, page = index, error = ?e, "Failed to decode embedded image");
                continue;
            }
        };

        let mut bytes = Vec::new();
        match raw.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png) {
            Ok(()) => images.push(bytes),
            Err(e) => {
                warn!(file = %file, page = index, error = %e, "Failed to encode embedded image");
            }
        }
    }

    images
}

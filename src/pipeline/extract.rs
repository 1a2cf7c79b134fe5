//! PDF text extraction: one [`PageText`] per page via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling while a large document is parsed.

use crate::error::Pdf2SchemaError;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Text layer of a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    pub text: String,
}

/// Extract the text of every page, in page order.
///
/// A document with N pages yields exactly N entries; pages without a text
/// layer (scans) yield an empty string rather than being skipped.
pub async fn extract_pages(
    pdf_path: &Path,
    pdfium_lib_path: Option<&Path>,
) -> Result<Vec<PageText>, Pdf2SchemaError> {
    let path = pdf_path.to_path_buf();
    let lib = pdfium_lib_path.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || extract_pages_blocking(&path, lib.as_deref()))
        .await
        .map_err(|e| Pdf2SchemaError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Blocking implementation of text extraction.
fn extract_pages_blocking(
    pdf_path: &Path,
    pdfium_lib_path: Option<&Path>,
) -> Result<Vec<PageText>, Pdf2SchemaError> {
    let pdfium = bind_pdfium(pdfium_lib_path)?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| match e {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                Pdf2SchemaError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
            other => Pdf2SchemaError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", other),
            },
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let text = page
            .text()
            .map_err(|e| Pdf2SchemaError::ExtractionFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?
            .all();
        debug!("Page {} → {} chars", page_num, text.len());
        results.push(PageText { page_num, text });
    }

    Ok(results)
}

/// Bind to a pdfium shared library.
///
/// Tried in order: the explicit path, `PDFIUM_LIB_PATH`, the working
/// directory, then the system library search path.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, Pdf2SchemaError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(p) = explicit {
        candidates.push(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("PDFIUM_LIB_PATH") {
        if !p.is_empty() {
            candidates.push(PathBuf::from(p));
        }
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

    let mut last_err = None;
    for candidate in &candidates {
        match Pdfium::bind_to_library(candidate) {
            Ok(bindings) => {
                debug!("Bound pdfium at {}", candidate.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => last_err = Some(format!("{}: {:?}", candidate.display(), e)),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            Pdf2SchemaError::PdfiumBindingFailed(match last_err {
                Some(prev) => format!("{:?} (also tried {})", e, prev),
                None => format!("{:?}", e),
            })
        })
}

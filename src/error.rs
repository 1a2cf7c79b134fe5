//! Error types for the edgequake-pdf2schema library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2SchemaError`]: **Fatal**: the request cannot proceed at all
//!   (missing credential, unreadable PDF, model call failed). Returned as
//!   `Err(Pdf2SchemaError)` from the top-level `process*` functions.
//!
//! * [`RenderError`]: **Non-fatal**: the diagram reply could not be turned
//!   into an image (no JSON payload, invalid node references, disk full) but
//!   the request still continues to schema synthesis. Stored inside
//!   [`crate::output::ExtractionOutput`] so the caller can show the message
//!   next to whatever else was produced.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2schema library.
#[derive(Debug, Error)]
pub enum Pdf2SchemaError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// No API key was supplied. Nothing else is attempted.
    #[error("Please enter your OpenAI API key.")]
    MissingCredential,

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password. Encrypted uploads are not supported.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// pdfium returned an error while reading a page's text layer.
    #[error("Text extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error. Not retried.
    #[error("LLM API error during {stage}: {message}")]
    LlmApiError { stage: String, message: String },

    /// The LLM API rejected the credential (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The model answered with nothing at all.
    #[error("LLM returned an empty reply during {stage}")]
    EmptyReply { stage: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the request workspace or write the staging file.
    #[error("Failed to write '{path}': {source}")]
    WorkspaceWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2SchemaError {
    /// True for errors caused by what the user submitted rather than by
    /// the host or an upstream service.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Pdf2SchemaError::MissingCredential
                | Pdf2SchemaError::FileNotFound { .. }
                | Pdf2SchemaError::PermissionDenied { .. }
                | Pdf2SchemaError::NotAPdf { .. }
                | Pdf2SchemaError::CorruptPdf { .. }
                | Pdf2SchemaError::PasswordRequired { .. }
        )
    }

    /// True for failures reported by the model provider.
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            Pdf2SchemaError::LlmApiError { .. }
                | Pdf2SchemaError::AuthError { .. }
                | Pdf2SchemaError::EmptyReply { .. }
                | Pdf2SchemaError::DownloadFailed { .. }
                | Pdf2SchemaError::DownloadTimeout { .. }
        )
    }
}

/// A non-fatal failure while turning the diagram reply into an image.
///
/// The request continues past it; the presentation step shows the message
/// and omits the image.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum RenderError {
    /// The reply held neither a fenced block nor a bare JSON object.
    #[error("No diagram description found in the model reply")]
    MissingPayload,

    /// A ``` fence was opened but never closed.
    #[error("Diagram description fence opened at line {line} is never closed")]
    UnterminatedFence { line: usize },

    /// The payload is not valid JSON for a diagram.
    #[error("Diagram description is not valid JSON: {detail}")]
    InvalidJson { detail: String },

    /// The diagram parsed but breaks a structural rule.
    #[error("Diagram description is invalid: {detail}")]
    InvalidDiagram { detail: String },

    /// The image could not be written.
    #[error("Failed to write diagram image '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_reads_like_a_prompt() {
        let msg = Pdf2SchemaError::MissingCredential.to_string();
        assert!(msg.contains("API key"), "got: {msg}");
    }

    #[test]
    fn llm_error_names_the_stage() {
        let e = Pdf2SchemaError::LlmApiError {
            stage: "diagram synthesis".into(),
            message: "503 overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("diagram synthesis"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn auth_error_display() {
        let e = Pdf2SchemaError::AuthError {
            provider: "openai".into(),
            detail: "invalid key".into(),
        };
        assert!(e.to_string().contains("openai"));
        assert!(e.to_string().contains("invalid key"));
    }

    #[test]
    fn error_classes() {
        assert!(Pdf2SchemaError::MissingCredential.is_input_error());
        assert!(!Pdf2SchemaError::MissingCredential.is_upstream_error());
        let upstream = Pdf2SchemaError::EmptyReply {
            stage: "schema synthesis".into(),
        };
        assert!(upstream.is_upstream_error());
        assert!(!Pdf2SchemaError::Internal("x".into()).is_input_error());
    }

    #[test]
    fn render_error_display() {
        let e = RenderError::UnterminatedFence { line: 3 };
        assert!(e.to_string().contains("line 3"));
        let e = RenderError::InvalidDiagram {
            detail: "edge 0 references unknown node 'x'".into(),
        };
        assert!(e.to_string().contains("unknown node"));
    }
}

//! Progress-callback trait for per-stage extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as a request moves through the pipeline. The CLI drives a spinner
//! from it; the web form does not use it.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2schema::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: Stage, detail: &str) {
//!         eprintln!("{stage} done: {detail}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// The steps of one request, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Intake,
    Extract,
    DiagramSynthesis,
    Render,
    SchemaSynthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Intake => "intake",
            Stage::Extract => "text extraction",
            Stage::DiagramSynthesis => "diagram synthesis",
            Stage::Render => "diagram rendering",
            Stage::SchemaSynthesis => "schema synthesis",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline as it enters and leaves each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage succeeds.
    ///
    /// `detail` is a short human-readable summary such as `"3 pages"`.
    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        let _ = (stage, detail);
    }

    /// Called when a stage fails. For [`Stage::Render`] the request goes on.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

//! Result types returned by [`crate::process`].

use crate::diagram::Diagram;
use crate::error::RenderError;
use crate::pipeline::extract::PageText;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything one request produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Workspace directory name under `work_dir`.
    pub request_id: String,

    /// Extracted text, one entry per page in page order.
    pub pages: Vec<PageText>,

    /// The diagram reply exactly as the model returned it.
    pub diagram_source: String,

    /// Parsed diagram, when the reply was renderable.
    pub diagram: Option<Diagram>,

    /// Rendered SVG. `None` whenever rendering failed.
    pub image_path: Option<PathBuf>,

    /// Why rendering failed, if it did.
    pub render_error: Option<RenderError>,

    /// The schema reply exactly as the model returned it.
    pub schema: String,

    pub stats: ExtractionStats,
}

/// Token usage and timings for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub page_count: usize,
    pub diagram_input_tokens: u64,
    pub diagram_output_tokens: u64,
    pub schema_input_tokens: u64,
    pub schema_output_tokens: u64,
    pub extract_duration_ms: u64,
    pub diagram_duration_ms: u64,
    pub render_duration_ms: u64,
    pub schema_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ExtractionStats {
    pub fn total_input_tokens(&self) -> u64 {
        self.diagram_input_tokens + self.schema_input_tokens
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.diagram_output_tokens + self.schema_output_tokens
    }
}

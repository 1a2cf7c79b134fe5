//! # edgequake-pdf2schema
//!
//! Turn a PDF into an entity diagram and a JSON schema using an LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Intake     stage the upload in a per-request workspace
//!  ├─ 2. Extract    per-page text via pdfium (spawn_blocking)
//!  ├─ 3. Diagram    model describes entities + relations as JSON
//!  ├─ 4. Render     JSON → layered layout → SVG (failure is non-fatal)
//!  ├─ 5. Schema     model writes a JSON schema from the diagram reply
//!  └─ 6. Present    web form regions or CLI output
//! ```
//!
//! The diagram reply is never executed. It is parsed as a constrained
//! [`Diagram`] and drawn by a fixed renderer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2schema::{process_file, Credential, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = Credential::new(std::env::var("OPENAI_API_KEY")?)?;
//!     let config = ExtractionConfig::default();
//!     let output = process_file("fund-facts.pdf", &key, &config).await?;
//!     println!("{}", output.schema);
//!     if let Some(path) = &output.image_path {
//!         eprintln!("diagram: {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | The axum upload form ([`server`]) |
//! | `cli`    | on      | The `pdf2schema` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credential;
pub mod diagram;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, SchemaSource};
pub use credential::Credential;
pub use diagram::{Diagram, Edge, Field, Node};
pub use error::{Pdf2SchemaError, RenderError};
pub use output::{ExtractionOutput, ExtractionStats};
pub use pipeline::extract::PageText;
pub use pipeline::layout::LayoutOptions;
pub use pipeline::llm::{ChatModel, Completion};
pub use process::{
    process_file, process_pages, process_submission, process_with_model, write_schema, Submission,
    Upload,
};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use workspace::RequestWorkspace;

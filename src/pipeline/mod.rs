//! Pipeline stages for PDF-to-schema extraction.
//!
//! Each submodule implements one step; [`crate::process`] runs them in order.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ extract ──▶ llm ──▶ payload ──▶ layout ──▶ render ──▶ llm
//! (stage)    (pdfium)   (diagram) (unwrap)   (BFS)      (SVG)    (schema)
//! ```
//!
//! 1. [`intake`]: stage the upload, or a CLI path/URL, in the request
//!    workspace
//! 2. [`extract`]: per-page text via pdfium in `spawn_blocking`
//! 3. [`llm`]: the two model calls behind the [`llm::ChatModel`] seam
//! 4. [`payload`]: pull the JSON body out of a fenced model reply
//! 5. [`layout`]: place nodes in layers, route edges
//! 6. [`render`]: draw the layout as SVG at the workspace image path

pub mod extract;
pub mod intake;
pub mod layout;
pub mod llm;
pub mod payload;
pub mod render;

//! Configuration types for PDF-to-schema extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One config is shared by every request
//! the web form handles.
//!
//! The API key is not part of the config: it arrives with each request as a
//! [`crate::credential::Credential`].

use crate::error::Pdf2SchemaError;
use crate::pipeline::layout::LayoutOptions;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4-0613";

/// Configuration for one or many extraction requests.
///
/// # Example
/// ```rust
/// use edgequake_pdf2schema::{ExtractionConfig, SchemaSource};
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4.1-mini")
///     .work_dir("/tmp/pdf2schema")
///     .schema_source(SchemaSource::Document)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// LLM provider name. Only `"openai"` can be built from a per-request
    /// credential. Default: `"openai"`.
    pub provider_name: String,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`
    /// and ignores the request credential.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Both calls ask for structured output; any creativity shows up as
    /// invented entities.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Root under which per-request workspaces are created. Default: `./digraph`.
    pub work_dir: PathBuf,

    /// Keep request workspaces on disk. When false the staged upload is
    /// removed after extraction, a failed request removes its workspace, and
    /// the web form removes it once the image is inlined. Default: true.
    pub keep_workspaces: bool,

    /// What the schema prompt is built from. Default: [`SchemaSource::Diagram`].
    pub schema_source: SchemaSource,

    /// Replacement for the built-in diagram prompt. Must contain `{content}`.
    pub diagram_prompt: Option<String>,

    /// Replacement for the built-in schema prompt. Must contain `{content}`.
    pub schema_prompt: Option<String>,

    /// Explicit pdfium shared library. If None, `PDFIUM_LIB_PATH`, the
    /// working directory and the system library path are tried in order.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Spacing and sizing of the rendered diagram.
    pub layout: LayoutOptions,

    /// Optional stage-progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: "openai".to_string(),
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            work_dir: PathBuf::from("./digraph"),
            keep_workspaces: true,
            schema_source: SchemaSource::default(),
            diagram_prompt: None,
            schema_prompt: None,
            pdfium_lib_path: None,
            download_timeout_secs: 120,
            layout: LayoutOptions::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("work_dir", &self.work_dir)
            .field("keep_workspaces", &self.keep_workspaces)
            .field("schema_source", &self.schema_source)
            .field("diagram_prompt", &self.diagram_prompt.as_ref().map(|_| "<custom>"))
            .field("schema_prompt", &self.schema_prompt.as_ref().map(|_| "<custom>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("layout", &self.layout)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn keep_workspaces(mut self, v: bool) -> Self {
        self.config.keep_workspaces = v;
        self
    }

    pub fn schema_source(mut self, source: SchemaSource) -> Self {
        self.config.schema_source = source;
        self
    }

    pub fn diagram_prompt(mut self, template: impl Into<String>) -> Self {
        self.config.diagram_prompt = Some(template.into());
        self
    }

    pub fn schema_prompt(mut self, template: impl Into<String>) -> Self {
        self.config.schema_prompt = Some(template.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn layout(mut self, layout: LayoutOptions) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2SchemaError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(Pdf2SchemaError::InvalidConfig(
                "model must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2SchemaError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        for (name, template) in [
            ("diagram_prompt", &c.diagram_prompt),
            ("schema_prompt", &c.schema_prompt),
        ] {
            if let Some(t) = template {
                if !t.contains(crate::prompts::CONTENT_PLACEHOLDER) {
                    return Err(Pdf2SchemaError::InvalidConfig(format!(
                        "{name} must contain the {} placeholder",
                        crate::prompts::CONTENT_PLACEHOLDER
                    )));
                }
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Input to the schema synthesis call.
///
/// | Source | Prompt built from |
/// |--------|-------------------|
/// | `Diagram` | the raw diagram reply (default) |
/// | `Document` | the extracted page text |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchemaSource {
    #[default]
    Diagram,
    Document,
}

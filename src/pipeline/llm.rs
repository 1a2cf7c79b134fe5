//! Model interaction: the two chat-completion calls of a request.
//!
//! [`ChatModel`] is the seam between the pipeline and the provider. The
//! production implementation, [`ProviderModel`], wraps an edgequake-llm
//! `LLMProvider`; tests substitute a scripted model. All prompt text lives in
//! [`crate::prompts`].
//!
//! Neither call is retried: a transport or authentication failure is fatal
//! for the request and is reported with the stage it happened in.

use crate::config::ExtractionConfig;
use crate::credential::Credential;
use crate::error::Pdf2SchemaError;
use crate::pipeline::extract::PageText;
use crate::prompts::{diagram_prompt, schema_prompt};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A model reply plus usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// Raw failure reported by a [`ChatModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatFailure(pub String);

impl fmt::Display for ChatFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that answers a single-turn prompt.
pub trait ChatModel: Send + Sync {
    /// Provider name used in error messages.
    fn provider_name(&self) -> &str;

    /// Send `prompt` as one user message and return the reply.
    fn complete(&self, prompt: String) -> impl Future<Output = Result<Completion, ChatFailure>> + Send;
}

/// [`ChatModel`] backed by an edgequake-llm provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    provider_name: String,
    options: CompletionOptions,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, provider_name: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
            options: build_options(config),
        }
    }
}

impl ChatModel for ProviderModel {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, prompt: String) -> Result<Completion, ChatFailure> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ChatFailure(format!("{}", e)))?;

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the provider for one request.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is; the credential
///    is not consulted. Useful in tests and for custom middleware.
/// 2. **`openai`**: an `OpenAIProvider` keyed with the request credential.
/// 3. **Any other name**: [`ProviderFactory::create_llm_provider`], which
///    reads that provider's key from the environment.
pub fn resolve_provider(
    config: &ExtractionConfig,
    credential: &Credential,
) -> Result<ProviderModel, Pdf2SchemaError> {
    if let Some(ref provider) = config.provider {
        return Ok(ProviderModel::new(Arc::clone(provider), "custom", config));
    }

    let name = config.provider_name.as_str();
    if name.eq_ignore_ascii_case("openai") {
        let provider = OpenAIProvider::new(credential.expose()).with_model(config.model.as_str());
        return Ok(ProviderModel::new(Arc::new(provider), "openai", config));
    }

    debug!("Provider '{}' reads its key from the environment", name);
    let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
        Pdf2SchemaError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(ProviderModel::new(provider, name, config))
}

/// Ask the model for a diagram description of `pages`.
pub async fn synthesize_diagram<M: ChatModel>(
    model: &M,
    pages: &[PageText],
    config: &ExtractionConfig,
) -> Result<Completion, Pdf2SchemaError> {
    let prompt = diagram_prompt(config.diagram_prompt.as_deref(), pages);
    call(model, prompt, "diagram synthesis").await
}

/// Ask the model for a JSON schema of `source`.
pub async fn synthesize_schema<M: ChatModel>(
    model: &M,
    source: &str,
    config: &ExtractionConfig,
) -> Result<Completion, Pdf2SchemaError> {
    let prompt = schema_prompt(config.schema_prompt.as_deref(), source);
    call(model, prompt, "schema synthesis").await
}

async fn call<M: ChatModel>(
    model: &M,
    prompt: String,
    stage: &str,
) -> Result<Completion, Pdf2SchemaError> {
    debug!("{}: sending {} prompt chars", stage, prompt.len());

    let completion = model.complete(prompt).await.map_err(|e| {
        warn!("{} failed: {}", stage, e);
        classify_failure(model.provider_name(), stage, e)
    })?;

    if completion.content.trim().is_empty() {
        return Err(Pdf2SchemaError::EmptyReply {
            stage: stage.to_string(),
        });
    }

    info!(
        "{}: {} input tokens, {} output tokens, {}ms",
        stage, completion.input_tokens, completion.output_tokens, completion.duration_ms
    );
    Ok(completion)
}

/// Map a raw provider failure onto a fatal error.
fn classify_failure(provider: &str, stage: &str, failure: ChatFailure) -> Pdf2SchemaError {
    let lower = failure.0.to_lowercase();
    let is_auth = ["401", "403", "unauthorized", "invalid_api_key", "incorrect api key", "authentication"]
        .iter()
        .any(|needle| lower.contains(needle));

    if is_auth {
        Pdf2SchemaError::AuthError {
            provider: provider.to_string(),
            detail: failure.0,
        }
    } else {
        Pdf2SchemaError::LlmApiError {
            stage: stage.to_string(),
            message: failure.0,
        }
    }
}

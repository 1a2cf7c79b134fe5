//! Request orchestration: credential → intake → extract → diagram → render → schema.
//!
//! Stage order and failure policy:
//!
//! | Stage | On failure |
//! |-------|------------|
//! | credential check | `MissingCredential`, nothing else runs |
//! | intake / extract | fatal |
//! | diagram synthesis | fatal, no render, no schema call |
//! | render | recorded in `render_error`, image suppressed, request continues |
//! | schema synthesis | fatal |
//!
//! Every request runs in its own [`RequestWorkspace`]. Unless
//! `keep_workspaces` is set, a failed request removes its workspace, and a
//! successful one keeps only the rendered image.

use crate::config::{ExtractionConfig, SchemaSource};
use crate::credential::Credential;
use crate::error::Pdf2SchemaError;
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::extract::{extract_pages, PageText};
use crate::pipeline::intake::{stage_input, stage_upload};
use crate::pipeline::llm::{resolve_provider, synthesize_diagram, synthesize_schema, ChatModel};
use crate::pipeline::render::render_reply;
use crate::progress::Stage;
use crate::prompts::format_pages;
use crate::workspace::RequestWorkspace;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An uploaded document.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// One form submission: the raw key field and an optional file.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub credential: String,
    pub document: Option<Upload>,
    /// Reuse a workspace instead of generating a fresh id.
    pub request_id: Option<String>,
}

/// Handle a form submission.
///
/// Returns `Ok(None)` when no document was attached. A blank credential is
/// rejected before anything touches the filesystem or the network.
pub async fn process_submission(
    submission: Submission,
    config: &ExtractionConfig,
) -> Result<Option<ExtractionOutput>, Pdf2SchemaError> {
    let credential = Credential::new(&submission.credential)?;

    let Some(upload) = submission.document else {
        debug!("No document attached; nothing to do");
        return Ok(None);
    };

    started(config, Stage::Intake);
    let ws = RequestWorkspace::create(&config.work_dir, submission.request_id.as_deref())
        .await
        .inspect_err(|e| failed(config, Stage::Intake, e))?;
    info!(
        "Request {}: {} ({} bytes)",
        ws.request_id(),
        upload.file_name,
        upload.bytes.len()
    );

    let result = async {
        stage_upload(&ws, &upload.bytes)
            .await
            .inspect_err(|e| failed(config, Stage::Intake, e))?;
        completed(config, Stage::Intake, &upload.file_name);

        let model = resolve_provider(config, &credential)?;
        process_with_model(&model, &ws, config).await
    }
    .await;

    release_on_failure(&ws, config, result).await.map(Some)
}

/// Handle a local path or URL, as the CLI does.
pub async fn process_file(
    input: &str,
    credential: &Credential,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2SchemaError> {
    started(config, Stage::Intake);
    let ws = RequestWorkspace::create(&config.work_dir, None)
        .await
        .inspect_err(|e| failed(config, Stage::Intake, e))?;

    let result = async {
        stage_input(&ws, input, config.download_timeout_secs)
            .await
            .inspect_err(|e| failed(config, Stage::Intake, e))?;
        completed(config, Stage::Intake, input);

        let model = resolve_provider(config, credential)?;
        process_with_model(&model, &ws, config).await
    }
    .await;

    release_on_failure(&ws, config, result).await
}

/// A failed request leaves nothing behind unless workspaces are kept.
async fn release_on_failure<T>(
    ws: &RequestWorkspace,
    config: &ExtractionConfig,
    result: Result<T, Pdf2SchemaError>,
) -> Result<T, Pdf2SchemaError> {
    if result.is_err() && !config.keep_workspaces {
        ws.discard().await;
    }
    result
}

/// Run extraction and both model calls against a staged workspace.
pub async fn process_with_model<M: ChatModel>(
    model: &M,
    ws: &RequestWorkspace,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2SchemaError> {
    let total_start = Instant::now();

    started(config, Stage::Extract);
    let extract_start = Instant::now();
    let extracted = extract_pages(&ws.staging_path(), config.pdfium_lib_path.as_deref()).await;
    if !config.keep_workspaces {
        ws.discard_staging().await;
    }
    let pages = extracted.inspect_err(|e| failed(config, Stage::Extract, e))?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    completed(config, Stage::Extract, &format!("{} pages", pages.len()));

    let mut output = process_pages(model, ws, pages, config).await?;
    output.stats.extract_duration_ms = extract_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// The model-facing half of a request, starting from extracted pages.
pub async fn process_pages<M: ChatModel>(
    model: &M,
    ws: &RequestWorkspace,
    pages: Vec<PageText>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2SchemaError> {
    let total_start = Instant::now();

    // ── Diagram synthesis ────────────────────────────────────────────────
    started(config, Stage::DiagramSynthesis);
    let diagram_reply = synthesize_diagram(model, &pages, config)
        .await
        .inspect_err(|e| failed(config, Stage::DiagramSynthesis, e))?;
    completed(
        config,
        Stage::DiagramSynthesis,
        &format!("{} tokens", diagram_reply.output_tokens),
    );

    // ── Render (non-fatal) ───────────────────────────────────────────────
    started(config, Stage::Render);
    let render_start = Instant::now();
    let image_path = ws.image_path();
    let (diagram, image_path, render_error) =
        match render_reply(&diagram_reply.content, &image_path, &config.layout).await {
            Ok(diagram) => {
                completed(config, Stage::Render, &image_path.display().to_string());
                (Some(diagram), Some(image_path), None)
            }
            Err(e) => {
                warn!("Request {}: diagram not rendered: {}", ws.request_id(), e);
                failed(config, Stage::Render, &e);
                (None, None, Some(e))
            }
        };
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Schema synthesis ─────────────────────────────────────────────────
    started(config, Stage::SchemaSynthesis);
    let source = match config.schema_source {
        SchemaSource::Diagram => diagram_reply.content.clone(),
        SchemaSource::Document => format_pages(&pages),
    };
    let schema_reply = synthesize_schema(model, &source, config)
        .await
        .inspect_err(|e| failed(config, Stage::SchemaSynthesis, e))?;
    completed(
        config,
        Stage::SchemaSynthesis,
        &format!("{} tokens", schema_reply.output_tokens),
    );

    let stats = ExtractionStats {
        page_count: pages.len(),
        diagram_input_tokens: diagram_reply.input_tokens,
        diagram_output_tokens: diagram_reply.output_tokens,
        schema_input_tokens: schema_reply.input_tokens,
        schema_output_tokens: schema_reply.output_tokens,
        extract_duration_ms: 0,
        diagram_duration_ms: diagram_reply.duration_ms,
        render_duration_ms,
        schema_duration_ms: schema_reply.duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Request {} complete: {} pages, image {}, {}ms",
        ws.request_id(),
        stats.page_count,
        if image_path.is_some() { "rendered" } else { "missing" },
        stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        request_id: ws.request_id().to_string(),
        pages,
        diagram_source: diagram_reply.content,
        diagram,
        image_path,
        render_error,
        schema: schema_reply.content,
        stats,
    })
}

/// Write the schema reply to `path` atomically (temp file + rename).
pub async fn write_schema(output: &ExtractionOutput, path: &Path) -> Result<(), Pdf2SchemaError> {
    let write_failed = |e: std::io::Error| Pdf2SchemaError::WorkspaceWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, output.schema.as_bytes())
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_failed)?;
    Ok(())
}

// ── Progress helpers ─────────────────────────────────────────────────────

fn started(config: &ExtractionConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
}

fn completed(config: &ExtractionConfig, stage: Stage, detail: &str) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage, detail);
    }
}

fn failed(config: &ExtractionConfig, stage: Stage, error: &impl std::fmt::Display) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_error(stage, &error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::pipeline::llm::{ChatFailure, Completion};
    use crate::progress::ExtractionProgressCallback;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const DIAGRAM: &str = r#"```json
{"title": "Fund", "nodes": [
  {"id": "ROOT", "fields": [{"name": "portfolio", "type": "object"}]},
  {"id": "portfolio", "fields": [{"name": "name", "type": "string"}]}
], "edges": [{"from": "ROOT", "to": "portfolio"}]}
```"#;

    const SCHEMA: &str = r#"{"type": "object", "properties": {"portfolio": {"type": "object"}}}"#;

    /// Replays canned replies in order and records every prompt.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl ChatModel for Scripted {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: String) -> Result<Completion, ChatFailure> {
            self.prompts.lock().unwrap().push(prompt);
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected model call");
            next.map(|content| Completion {
                content,
                input_tokens: 100,
                output_tokens: 50,
                duration_ms: 2,
            })
            .map_err(ChatFailure)
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ExtractionProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.0.lock().unwrap().push(format!("start {stage}"));
        }
        fn on_stage_error(&self, stage: Stage, _error: &str) {
            self.0.lock().unwrap().push(format!("error {stage}"));
        }
    }

    fn pages() -> Vec<PageText> {
        vec![
            PageText {
                page_num: 1,
                text: "Fund Facts: Example Balanced Portfolio".into(),
            },
            PageText {
                page_num: 2,
                text: "Management expense ratio 2.01%".into(),
            },
        ]
    }

    async fn setup() -> (TempDir, RequestWorkspace, ExtractionConfig) {
        let root = TempDir::new().unwrap();
        let ws = RequestWorkspace::create(root.path(), Some("req-1")).await.unwrap();
        let config = ExtractionConfig::builder()
            .work_dir(root.path())
            .build()
            .unwrap();
        (root, ws, config)
    }

    #[tokio::test]
    async fn blank_credential_stops_before_any_io() {
        let root = TempDir::new().unwrap();
        let work_dir = root.path().join("work");
        let config = ExtractionConfig::builder().work_dir(&work_dir).build().unwrap();

        let submission = Submission {
            credential: "   ".into(),
            document: Some(Upload {
                file_name: "fund.pdf".into(),
                bytes: b"%PDF-1.7".to_vec(),
            }),
            request_id: None,
        };
        let err = process_submission(submission, &config).await.unwrap_err();
        assert!(matches!(err, Pdf2SchemaError::MissingCredential));
        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn no_document_is_a_quiet_noop() {
        let root = TempDir::new().unwrap();
        let work_dir = root.path().join("work");
        let config = ExtractionConfig::builder().work_dir(&work_dir).build().unwrap();

        let submission = Submission {
            credential: "sk-test".into(),
            ..Default::default()
        };
        assert!(process_submission(submission, &config).await.unwrap().is_none());
        assert!(!work_dir.exists());
    }

    fn workspace_count(work_dir: &Path) -> usize {
        std::fs::read_dir(work_dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn failed_submission_leaves_no_workspace() {
        let root = TempDir::new().unwrap();
        let work_dir = root.path().join("work");
        let config = ExtractionConfig::builder()
            .work_dir(&work_dir)
            .keep_workspaces(false)
            .build()
            .unwrap();

        let submission = Submission {
            credential: "sk-test".into(),
            document: Some(Upload {
                file_name: "notes.txt".into(),
                bytes: b"this is not a pdf".to_vec(),
            }),
            request_id: None,
        };
        assert!(process_submission(submission, &config).await.is_err());
        assert_eq!(workspace_count(&work_dir), 0);
    }

    #[tokio::test]
    async fn failed_file_run_respects_keep_workspaces() {
        let root = TempDir::new().unwrap();
        let credential = Credential::new("sk-test").unwrap();

        for keep in [false, true] {
            let work_dir = root.path().join(format!("work-{keep}"));
            let config = ExtractionConfig::builder()
                .work_dir(&work_dir)
                .keep_workspaces(keep)
                .build()
                .unwrap();
            let err = process_file("/definitely/not/here.pdf", &credential, &config)
                .await
                .unwrap_err();
            assert!(matches!(err, Pdf2SchemaError::FileNotFound { .. }));
            assert_eq!(workspace_count(&work_dir), usize::from(keep));
        }
    }

    #[tokio::test]
    async fn happy_path_renders_and_builds_schema() {
        let (_root, ws, config) = setup().await;
        let model = Scripted::new(vec![Ok(DIAGRAM), Ok(SCHEMA)]);

        let out = process_pages(&model, &ws, pages(), &config).await.unwrap();

        assert_eq!(model.calls(), 2);
        assert_eq!(out.request_id, "req-1");
        assert_eq!(out.diagram_source, DIAGRAM);
        assert_eq!(out.schema, SCHEMA);
        assert_eq!(out.image_path.as_deref(), Some(ws.image_path().as_path()));
        assert!(ws.image_path().exists());
        assert!(out.render_error.is_none());
        assert_eq!(out.stats.page_count, 2);
        assert_eq!(out.stats.total_input_tokens(), 200);
    }

    #[tokio::test]
    async fn schema_prompt_is_built_from_diagram_reply() {
        let (_root, ws, config) = setup().await;
        let model = Scripted::new(vec![Ok(DIAGRAM), Ok(SCHEMA)]);
        process_pages(&model, &ws, pages(), &config).await.unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Management expense ratio 2.01%"));
        assert!(prompts[1].contains("\"ROOT\""));
        assert!(!prompts[1].contains("Management expense ratio"));
    }

    #[tokio::test]
    async fn document_source_uses_page_text() {
        let (root, ws, _) = setup().await;
        let config = ExtractionConfig::builder()
            .work_dir(root.path())
            .schema_source(SchemaSource::Document)
            .build()
            .unwrap();
        let model = Scripted::new(vec![Ok(DIAGRAM), Ok(SCHEMA)]);
        process_pages(&model, &ws, pages(), &config).await.unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[1].contains("--- page 2 ---\nManagement expense ratio 2.01%"));
    }

    #[tokio::test]
    async fn diagram_failure_skips_render_and_schema() {
        let (_root, ws, config) = setup().await;
        let model = Scripted::new(vec![Err("HTTP 500 upstream exploded")]);

        let err = process_pages(&model, &ws, pages(), &config).await.unwrap_err();

        assert!(matches!(err, Pdf2SchemaError::LlmApiError { ref stage, .. } if stage == "diagram synthesis"));
        assert_eq!(model.calls(), 1);
        assert!(!ws.image_path().exists());
    }

    #[tokio::test]
    async fn render_failure_still_produces_schema() {
        let (_root, ws, mut config) = setup().await;
        let recorder = Arc::new(Recorder::default());
        config.progress_callback = Some(recorder.clone());
        std::fs::write(ws.image_path(), "<svg>stale</svg>").unwrap();

        let model = Scripted::new(vec![Ok("Sorry, here is a picture instead."), Ok(SCHEMA)]);
        let out = process_pages(&model, &ws, pages(), &config).await.unwrap();

        assert_eq!(model.calls(), 2);
        assert_eq!(out.schema, SCHEMA);
        assert!(out.image_path.is_none());
        assert_eq!(out.render_error, Some(RenderError::MissingPayload));
        assert!(!ws.image_path().exists());

        let events = recorder.0.lock().unwrap();
        assert!(events.contains(&"error diagram rendering".to_string()));
        assert_eq!(events.last().unwrap(), "start schema synthesis");
    }

    #[tokio::test]
    async fn schema_failure_is_fatal() {
        let (_root, ws, config) = setup().await;
        let model = Scripted::new(vec![Ok(DIAGRAM), Err("401 Unauthorized")]);
        let err = process_pages(&model, &ws, pages(), &config).await.unwrap_err();
        assert!(matches!(err, Pdf2SchemaError::AuthError { .. }));
    }

    #[tokio::test]
    async fn same_request_id_overwrites_image() {
        let (_root, ws, config) = setup().await;
        let first = Scripted::new(vec![Ok(DIAGRAM), Ok(SCHEMA)]);
        process_pages(&first, &ws, pages(), &config).await.unwrap();
        let before = std::fs::read_to_string(ws.image_path()).unwrap();

        let changed = DIAGRAM.replace("\"Fund\"", "\"Second run\"");
        let second = Scripted::new(vec![Ok(changed.as_str()), Ok(SCHEMA)]);
        process_pages(&second, &ws, pages(), &config).await.unwrap();
        let after = std::fs::read_to_string(ws.image_path()).unwrap();

        assert_ne!(before, after);
        assert!(after.contains("Second run"));
    }

    #[tokio::test]
    async fn write_schema_is_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("schema.json");
        let out = ExtractionOutput {
            request_id: "r".into(),
            pages: vec![],
            diagram_source: String::new(),
            diagram: None,
            image_path: None,
            render_error: None,
            schema: SCHEMA.into(),
            stats: ExtractionStats::default(),
        };
        write_schema(&out, &path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SCHEMA);
        assert!(!path.with_extension("tmp").exists());
    }
}

//! Browser front end: a single page with a key field, a file picker and
//! three result regions.
//!
//! `GET /` serves the empty form. `POST /` accepts `multipart/form-data`
//! with an `api_key` text field and a `file` field, runs
//! [`process_submission`] and serves the form again with results below it.
//! The rendered SVG is inlined as a base64 data URI, so the workspace
//! directory never has to be served. Unless `keep_workspaces` is set, the
//! workspace is removed as soon as the image has been read back.

use crate::config::ExtractionConfig;
use crate::error::Pdf2SchemaError;
use crate::output::ExtractionOutput;
use crate::process::{process_submission, Submission, Upload};
use crate::workspace::RequestWorkspace;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::Engine;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Page heading.
pub const PAGE_TITLE: &str = "PDF to Entities Schema";

const SUBHEADING: &str = "Upload a PDF: the model describes its entities as a diagram, \
     draws it, then writes a JSON schema for them.";

/// Shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ExtractionConfig,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: ExtractionConfig, max_upload_mb: usize) -> Self {
        Self {
            config,
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(index).post(submit))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

async fn index() -> Html<String> {
    Html(page(None, None))
}

async fn submit(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let submission = match read_submission(multipart).await {
        Ok(s) => s,
        Err(detail) => {
            warn!("Rejected form body: {}", detail);
            let notice = Notice::error(format!("Could not read the upload: {detail}"));
            return (StatusCode::BAD_REQUEST, Html(page(Some(&notice), None))).into_response();
        }
    };

    match process_submission(submission, &state.config).await {
        Ok(None) => Html(page(None, None)).into_response(),
        Ok(Some(output)) => present(&state.config, &output).await.into_response(),
        Err(e) => {
            let (status, notice) = classify(&e);
            if status.is_server_error() {
                error!("Request failed: {}", e);
            }
            (status, Html(page(Some(&notice), None))).into_response()
        }
    }
}

/// Pull `api_key` and `file` out of the multipart body. Unknown fields are skipped.
async fn read_submission(mut multipart: Multipart) -> Result<Submission, String> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "api_key" => {
                submission.credential = field.text().await.map_err(|e| e.to_string())?;
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                // Browsers send an empty part when no file was picked.
                if !file_name.is_empty() || !bytes.is_empty() {
                    submission.document = Some(Upload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(submission)
}

fn classify(e: &Pdf2SchemaError) -> (StatusCode, Notice) {
    match e {
        Pdf2SchemaError::MissingCredential => (StatusCode::OK, Notice::warning(e.to_string())),
        e if e.is_input_error() => (StatusCode::BAD_REQUEST, Notice::error(e.to_string())),
        e if e.is_upstream_error() => (StatusCode::BAD_GATEWAY, Notice::error(e.to_string())),
        e => (StatusCode::INTERNAL_SERVER_ERROR, Notice::error(e.to_string())),
    }
}

async fn present(config: &ExtractionConfig, output: &ExtractionOutput) -> Html<String> {
    let image = inline_image(output).await;
    if !config.keep_workspaces {
        match RequestWorkspace::open(&config.work_dir, &output.request_id) {
            Ok(ws) => ws.discard().await,
            Err(e) => warn!("Not removing workspace {:?}: {}", output.request_id, e),
        }
    }
    Html(page(None, Some(Results { output, image })))
}

/// Read the rendered SVG back as a data URI.
async fn inline_image(output: &ExtractionOutput) -> Option<String> {
    let path = output.image_path.as_ref()?;
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

// ── HTML ─────────────────────────────────────────────────────────────────

struct Notice {
    class: &'static str,
    text: String,
}

impl Notice {
    fn warning(text: String) -> Self {
        Self {
            class: "warning",
            text,
        }
    }

    fn error(text: String) -> Self {
        Self {
            class: "error",
            text,
        }
    }
}

struct Results<'a> {
    output: &'a ExtractionOutput,
    image: Option<String>,
}

const STYLE: &str = r#"
body { font-family: Helvetica, Arial, sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; color: #222; }
h1 { margin-bottom: 0.2rem; }
.sub { color: #555; margin-top: 0; }
form { display: grid; gap: 0.75rem; margin: 1.5rem 0; }
.warning { background: #fff4d6; border: 1px solid #e0b400; padding: 0.75rem; }
.error { background: #fde2e2; border: 1px solid #d33; padding: 0.75rem; }
pre { background: #f6f8fa; padding: 1rem; overflow-x: auto; }
pre.numbered .ln { display: inline-block; width: 3em; color: #999; user-select: none; }
img.diagram { max-width: 100%; border: 1px solid #ddd; }
.stats { color: #666; font-size: 0.9rem; }
"#;

fn page(notice: Option<&Notice>, results: Option<Results<'_>>) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>{title}</h1>\n<p class=\"sub\">{sub}</p>\n",
        title = escape_html(PAGE_TITLE),
        sub = escape_html(SUBHEADING),
    );

    html.push_str(
        "<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
         <label>OpenAI API key <input type=\"password\" name=\"api_key\" autocomplete=\"off\"></label>\n\
         <label>PDF document <input type=\"file\" name=\"file\" accept=\".pdf,application/pdf\"></label>\n\
         <button type=\"submit\">Generate</button>\n</form>\n",
    );

    if let Some(n) = notice {
        html.push_str(&format!(
            "<div class=\"{}\">{}</div>\n",
            n.class,
            escape_html(&n.text)
        ));
    }

    if let Some(r) = results {
        html.push_str(&results_html(&r));
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn results_html(r: &Results<'_>) -> String {
    let out = r.output;
    let mut html = String::new();

    html.push_str("<section id=\"diagram-source\">\n<h2>Generated diagram description</h2>\n");
    html.push_str(&format!(
        "<pre><code>{}</code></pre>\n</section>\n",
        escape_html(&out.diagram_source)
    ));

    html.push_str("<section id=\"diagram-image\">\n");
    match (&r.image, &out.render_error) {
        (Some(uri), _) => html.push_str(&format!(
            "<img class=\"diagram\" alt=\"Entity diagram\" src=\"{uri}\">\n"
        )),
        (None, Some(e)) => html.push_str(&format!(
            "<div class=\"warning\">The diagram could not be drawn: {}</div>\n",
            escape_html(&e.to_string())
        )),
        (None, None) => {
            html.push_str("<div class=\"warning\">The diagram image is unavailable.</div>\n")
        }
    }
    html.push_str("</section>\n");

    html.push_str("<section id=\"schema\">\n<h2>Generated JSON schema</h2>\n");
    html.push_str(&format!(
        "<pre class=\"numbered\"><code>{}</code></pre>\n</section>\n",
        numbered_lines(&out.schema)
    ));

    let s = &out.stats;
    html.push_str(&format!(
        "<p class=\"stats\">{} pages · {} input / {} output tokens · {} ms</p>\n",
        s.page_count,
        s.total_input_tokens(),
        s.total_output_tokens(),
        s.total_duration_ms
    ));

    html
}

fn numbered_lines(text: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| format!("<span class=\"ln\">{}</span>{}", i + 1, escape_html(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::output::ExtractionStats;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn config(dir: &TempDir, keep_workspaces: bool) -> ExtractionConfig {
        ExtractionConfig::builder()
            .work_dir(dir.path().join("work"))
            .keep_workspaces(keep_workspaces)
            .build()
            .unwrap()
    }

    fn state(dir: &TempDir) -> AppState {
        AppState::new(config(dir, true), 4)
    }

    fn multipart_body(api_key: &str, file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"api_key\"\r\n\r\n{api_key}\r\n"
            )
            .as_bytes(),
        );
        if let Some((name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                     Content-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post(app: Router, body: Vec<u8>) -> (StatusCode, String) {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn get_serves_the_form() {
        let dir = TempDir::new().unwrap();
        let res = router(state(&dir))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("<h1>PDF to Entities Schema</h1>"));
        assert!(html.contains("type=\"password\" name=\"api_key\""));
        assert!(html.contains("accept=\".pdf,application/pdf\""));
    }

    #[tokio::test]
    async fn missing_key_shows_warning_without_work() {
        let dir = TempDir::new().unwrap();
        let body = multipart_body("", Some(("fund.pdf", b"%PDF-1.7")));
        let (status, html) = post(router(state(&dir)), body).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("class=\"warning\""));
        assert!(html.contains("Please enter your OpenAI API key."));
        assert!(!dir.path().join("work").exists());
    }

    #[tokio::test]
    async fn key_without_file_is_a_plain_form() {
        let dir = TempDir::new().unwrap();
        let body = multipart_body("sk-test", None);
        let (status, html) = post(router(state(&dir)), body).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!html.contains("class=\"warning\""));
        assert!(!html.contains("Generated JSON schema"));
    }

    #[tokio::test]
    async fn failed_request_workspace_is_removed() {
        let dir = TempDir::new().unwrap();
        let app = router(AppState::new(config(&dir, false), 4));
        let body = multipart_body("sk-test", Some(("notes.pdf", b"not a pdf at all")));
        let (status, html) = post(app, body).await;

        assert_ne!(status, StatusCode::OK);
        assert!(html.contains("class=\"error\""));
        let work = dir.path().join("work");
        assert_eq!(std::fs::read_dir(&work).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn workspace_is_removed_after_the_image_is_inlined() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, false);
        let ws = RequestWorkspace::create(&config.work_dir, None).await.unwrap();
        std::fs::write(ws.image_path(), "<svg/>").unwrap();

        let mut out = output(None);
        out.request_id = ws.request_id().to_string();
        out.image_path = Some(ws.image_path());
        let Html(html) = present(&config, &out).await;

        assert!(html.contains("src=\"data:image/svg+xml;base64,PHN2Zy8+\""));
        assert!(!ws.dir().exists());
    }

    #[tokio::test]
    async fn kept_workspace_survives_presentation() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, true);
        let ws = RequestWorkspace::create(&config.work_dir, None).await.unwrap();
        std::fs::write(ws.image_path(), "<svg/>").unwrap();

        let mut out = output(None);
        out.request_id = ws.request_id().to_string();
        out.image_path = Some(ws.image_path());
        present(&config, &out).await;

        assert!(ws.image_path().exists());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(classify(&Pdf2SchemaError::MissingCredential).0, StatusCode::OK);
        let corrupt = Pdf2SchemaError::CorruptPdf {
            path: "x.pdf".into(),
            detail: "bad xref".into(),
        };
        assert_eq!(classify(&corrupt).0, StatusCode::BAD_REQUEST);
        let upstream = Pdf2SchemaError::LlmApiError {
            stage: "diagram synthesis".into(),
            message: "timeout".into(),
        };
        assert_eq!(classify(&upstream).0, StatusCode::BAD_GATEWAY);
        assert_eq!(
            classify(&Pdf2SchemaError::Internal("x".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    fn output(render_error: Option<RenderError>) -> ExtractionOutput {
        ExtractionOutput {
            request_id: "r".into(),
            pages: vec![],
            diagram_source: "```json\n{\"nodes\": [{\"id\": \"<ROOT>\"}]}\n```".into(),
            diagram: None,
            image_path: None,
            render_error,
            schema: "{\n  \"type\": \"object\"\n}".into(),
            stats: ExtractionStats::default(),
        }
    }

    #[test]
    fn results_are_ordered_and_escaped() {
        let out = output(None);
        let html = page(
            None,
            Some(Results {
                output: &out,
                image: Some("data:image/svg+xml;base64,PHN2Zy8+".into()),
            }),
        );
        let source = html.find("Generated diagram description").unwrap();
        let image = html.find("<img class=\"diagram\"").unwrap();
        let schema = html.find("Generated JSON schema").unwrap();
        assert!(source < image && image < schema);
        assert!(html.contains("&lt;ROOT&gt;"));
        assert!(html.contains("<span class=\"ln\">3</span>}"));
    }

    #[test]
    fn render_failure_replaces_the_image() {
        let out = output(Some(RenderError::MissingPayload));
        let html = page(None, Some(Results { output: &out, image: None }));
        assert!(!html.contains("<img"));
        assert!(html.contains("The diagram could not be drawn"));
        assert!(html.contains("Generated JSON schema"));
    }

    #[test]
    fn escape_html_handles_specials() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}

//! SVG rendering of a laid-out diagram.
//!
//! This is the step that turns the model's diagram description into an
//! image. The description is data: it is parsed by
//! [`Diagram::from_reply`], placed by [`layout`] and drawn here with a fixed
//! routine. Label text goes through the `svg` crate's text node, which
//! escapes markup.

use crate::diagram::Diagram;
use crate::error::RenderError;
use crate::pipeline::layout::{layout, DiagramLayout, EdgePath, LayoutOptions, NodeBox};
use std::path::Path;
use svg::node::element::{Definitions, Group, Line, Marker, Path as SvgPath, Rectangle, Text};
use svg::Document;
use tracing::{debug, info, warn};

const FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";
const STROKE: &str = "#333333";
const HEADER_FILL: &str = "#dbe8f6";
const ARROW_ID: &str = "arrow-right";

/// Draw `l` as an SVG document.
pub fn render_svg(l: &DiagramLayout) -> Document {
    let mut doc = Document::new()
        .set("viewBox", format!("0 0 {} {}", l.width, l.height))
        .set("width", l.width)
        .set("height", l.height)
        .add(arrow_definitions())
        .add(
            Rectangle::new()
                .set("width", "100%")
                .set("height", "100%")
                .set("fill", "white"),
        );

    if let Some(title) = &l.title {
        doc = doc.add(
            Text::new(title.as_str())
                .set("x", l.width / 2.0)
                .set("y", l.options.margin + l.options.line_height)
                .set("text-anchor", "middle")
                .set("font-family", FONT_FAMILY)
                .set("font-size", 16)
                .set("font-weight", "bold"),
        );
    }

    let mut nodes = Group::new();
    for node in &l.nodes {
        nodes = nodes.add(render_node(node, l));
    }

    let mut edges = Group::new();
    for edge in &l.edges {
        edges = edges.add(render_edge(edge, l));
    }

    // Edges under boxes so arrowheads stop at borders.
    doc.add(edges).add(nodes)
}

fn arrow_definitions() -> Definitions {
    Definitions::new().add(
        Marker::new()
            .set("id", ARROW_ID)
            .set("viewBox", "0 0 10 10")
            .set("refX", 9)
            .set("refY", 5)
            .set("markerWidth", 6)
            .set("markerHeight", 6)
            .set("orient", "auto")
            .add(
                SvgPath::new()
                    .set("d", "M 0 0 L 10 5 L 0 10 z")
                    .set("fill", STROKE),
            ),
    )
}

fn render_node(node: &NodeBox, l: &DiagramLayout) -> Group {
    let opts = &l.options;
    let header_height = opts.line_height + 2.0 * opts.padding;

    let mut group = Group::new()
        .set("id", format!("node-{}", node.id))
        .add(
            Rectangle::new()
                .set("x", node.x)
                .set("y", node.y)
                .set("width", node.width)
                .set("height", node.height)
                .set("fill", "white")
                .set("stroke", STROKE)
                .set("stroke-width", 1),
        )
        .add(
            Rectangle::new()
                .set("x", node.x)
                .set("y", node.y)
                .set("width", node.width)
                .set("height", header_height.min(node.height))
                .set("fill", HEADER_FILL)
                .set("stroke", STROKE)
                .set("stroke-width", 1),
        )
        .add(
            Text::new(node.heading.as_str())
                .set("x", node.x + node.width / 2.0)
                .set("y", node.y + opts.padding + opts.line_height * 0.75)
                .set("text-anchor", "middle")
                .set("font-family", FONT_FAMILY)
                .set("font-size", 14)
                .set("font-weight", "bold"),
        );

    let mut y = node.y + header_height + opts.line_height * 0.5;
    for line in &node.lines {
        y += opts.line_height;
        group = group.add(
            Text::new(line.as_str())
                .set("x", node.x + opts.padding)
                .set("y", y - opts.line_height * 0.25)
                .set("font-family", FONT_FAMILY)
                .set("font-size", 12),
        );
    }

    group
}

fn render_edge(edge: &EdgePath, l: &DiagramLayout) -> Group {
    let mut group = Group::new().add(
        Line::new()
            .set("x1", edge.start.x)
            .set("y1", edge.start.y)
            .set("x2", edge.end.x)
            .set("y2", edge.end.y)
            .set("stroke", STROKE)
            .set("stroke-width", 1.5)
            .set("marker-end", format!("url(#{ARROW_ID})")),
    );

    if let Some(label) = edge.label.as_deref().filter(|s| !s.trim().is_empty()) {
        let mid_x = (edge.start.x + edge.end.x) / 2.0;
        let mid_y = (edge.start.y + edge.end.y) / 2.0;
        group = group.add(
            Text::new(label)
                .set("x", mid_x)
                .set("y", mid_y - l.options.line_height * 0.3)
                .set("text-anchor", "middle")
                .set("font-family", FONT_FAMILY)
                .set("font-size", 11),
        );
    }

    group
}

/// Lay out `diagram` and write it as SVG to `path`, replacing any existing file.
pub async fn render_to_file(
    diagram: &Diagram,
    path: &Path,
    options: &LayoutOptions,
) -> Result<(), RenderError> {
    let doc = render_svg(&layout(diagram, options));
    write_document(&doc, path).await?;
    info!(
        "Rendered {} nodes / {} edges to {}",
        diagram.nodes.len(),
        diagram.edges.len(),
        path.display()
    );
    Ok(())
}

/// Parse the raw diagram reply and render it to `path`.
///
/// Any file already at `path` is removed first, so a failed render never
/// leaves an image from an earlier run behind.
pub async fn render_reply(
    reply: &str,
    path: &Path,
    options: &LayoutOptions,
) -> Result<Diagram, RenderError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed previous image {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_failed(path, &e)),
    }

    let diagram = Diagram::from_reply(reply)?;
    render_to_file(&diagram, path, options).await?;
    Ok(diagram)
}

async fn write_document(doc: &Document, path: &Path) -> Result<(), RenderError> {
    tokio::fs::write(path, doc.to_string())
        .await
        .map_err(|e| write_failed(path, &e))
}

fn write_failed(path: &Path, e: &std::io::Error) -> RenderError {
    warn!("Failed to write {}: {}", path.display(), e);
    RenderError::WriteFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REPLY: &str = r#"```json
{"title": "Fund <Facts>", "nodes": [
  {"id": "ROOT", "fields": [{"name": "portfolio", "type": "object"}]},
  {"id": "portfolio", "label": "Portfolio & Co", "fields": [{"name": "name"}]}
], "edges": [{"from": "ROOT", "to": "portfolio", "label": "has"}]}
```"#;

    #[test]
    fn svg_contains_boxes_and_arrows() {
        let d = Diagram::from_reply(REPLY).unwrap();
        let svg = render_svg(&layout(&d, &LayoutOptions::default())).to_string();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("marker-end=\"url(#arrow-right)\""));
        assert!(svg.contains("portfolio: object"));
        assert!(svg.contains("name: string"));
        // svg writes text content on its own line.
        assert!(svg.contains("\nhas\n</text>"));
    }

    #[test]
    fn label_markup_is_escaped() {
        let d = Diagram::from_reply(REPLY).unwrap();
        let svg = render_svg(&layout(&d, &LayoutOptions::default())).to_string();
        assert!(svg.contains("Fund &lt;Facts&gt;"));
        assert!(svg.contains("Portfolio &amp; Co"));
        assert!(!svg.contains("<Facts>"));
    }

    #[tokio::test]
    async fn reply_is_rendered_to_the_image_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("diagram.svg");
        let d = render_reply(REPLY, &path, &LayoutOptions::default())
            .await
            .unwrap();
        assert_eq!(d.nodes.len(), 2);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("<svg"));
    }

    #[tokio::test]
    async fn failed_render_removes_stale_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("diagram.svg");
        std::fs::write(&path, "<svg>old</svg>").unwrap();

        let err = render_reply("I cannot draw that.", &path, &LayoutOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, RenderError::MissingPayload);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unwritable_target_is_a_render_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("diagram.svg");
        let err = render_reply(REPLY, &path, &LayoutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::WriteFailed { .. }));
    }
}

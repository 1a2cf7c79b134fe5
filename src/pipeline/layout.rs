//! Deterministic layered layout for a [`Diagram`].
//!
//! Nodes are assigned to layers by breadth-first search from the roots
//! (nodes without incoming edges). Layers run left to right; nodes of one
//! layer are stacked top to bottom in declaration order. Nodes unreachable
//! from any root (cycles) seed further searches in declaration order, so
//! every node ends up placed exactly once.
//!
//! Text width is estimated from a fixed per-character advance; no font
//! metrics are consulted.

use crate::diagram::Diagram;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Sizing knobs for the rendered diagram, in SVG user units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    /// Estimated advance of one character.
    pub char_width: f32,
    /// Height of one text line.
    pub line_height: f32,
    /// Padding between a box border and its text.
    pub padding: f32,
    /// Horizontal gap between layers.
    pub layer_spacing: f32,
    /// Vertical gap between boxes in one layer.
    pub node_spacing: f32,
    /// Blank border around the whole drawing.
    pub margin: f32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            char_width: 8.0,
            line_height: 18.0,
            padding: 10.0,
            layer_spacing: 80.0,
            node_spacing: 30.0,
            margin: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A placed entity box. `x`/`y` is the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBox {
    pub id: String,
    pub heading: String,
    pub lines: Vec<String>,
    pub layer: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NodeBox {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A routed edge: straight segment between two box borders.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePath {
    pub start: Point,
    pub end: Point,
    pub label: Option<String>,
}

/// Everything the renderer needs, in absolute coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramLayout {
    pub title: Option<String>,
    pub nodes: Vec<NodeBox>,
    pub edges: Vec<EdgePath>,
    pub width: f32,
    pub height: f32,
    pub options: LayoutOptions,
}

/// Place every node and route every edge of `diagram`.
pub fn layout(diagram: &Diagram, options: &LayoutOptions) -> DiagramLayout {
    let n = diagram.nodes.len();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut has_incoming = vec![false; n];
    for edge in &diagram.edges {
        if let (Some(from), Some(to)) = (diagram.node_index(&edge.from), diagram.node_index(&edge.to)) {
            if from != to {
                children[from].push(to);
                has_incoming[to] = true;
            }
        }
    }

    let layers = assign_layers(&children, &has_incoming);

    // Box sizes
    let sizes: Vec<(f32, f32)> = diagram
        .nodes
        .iter()
        .map(|node| {
            let widest = node
                .fields
                .iter()
                .map(|f| f.display().chars().count())
                .chain(std::iter::once(node.heading().chars().count()))
                .max()
                .unwrap_or(0);
            let width = widest as f32 * options.char_width + 2.0 * options.padding;
            // Heading line plus one line per field; the extra half line is
            // the gap below the heading separator.
            let lines = 1.0 + node.fields.len() as f32;
            let extra = if node.fields.is_empty() { 0.0 } else { 0.5 };
            let height = (lines + extra) * options.line_height + 2.0 * options.padding;
            (width, height)
        })
        .collect();

    let title_height = if diagram.title.is_some() {
        options.line_height * 2.0
    } else {
        0.0
    };

    // Layer x positions
    let mut boxes: Vec<Option<NodeBox>> = vec![None; n];
    let mut x = options.margin;
    let mut max_bottom: f32 = 0.0;
    for (layer_idx, members) in layers.iter().enumerate() {
        let layer_width = members
            .iter()
            .map(|&i| sizes[i].0)
            .fold(0.0_f32, f32::max);

        let mut y = options.margin + title_height;
        for (j, &i) in members.iter().enumerate() {
            if j > 0 {
                y += options.node_spacing;
            }
            let (w, h) = sizes[i];
            let node = &diagram.nodes[i];
            boxes[i] = Some(NodeBox {
                id: node.id.clone(),
                heading: node.heading().to_string(),
                lines: node.fields.iter().map(|f| f.display()).collect(),
                layer: layer_idx,
                x: x + (layer_width - w) / 2.0,
                y,
                width: w,
                height: h,
            });
            y += h;
        }
        max_bottom = max_bottom.max(y);
        x += layer_width + options.layer_spacing;
    }

    let nodes: Vec<NodeBox> = boxes.into_iter().flatten().collect();

    let edges = diagram
        .edges
        .iter()
        .filter_map(|edge| {
            let from = &nodes[diagram.node_index(&edge.from)?];
            let to = &nodes[diagram.node_index(&edge.to)?];
            Some(route(from, to, edge.label.clone()))
        })
        .collect();

    let right = x - options.layer_spacing;
    let title_width = diagram
        .title
        .as_ref()
        .map(|t| t.chars().count() as f32 * options.char_width)
        .unwrap_or(0.0);

    DiagramLayout {
        title: diagram.title.clone(),
        nodes,
        edges,
        width: right.max(options.margin + title_width) + options.margin,
        height: max_bottom + options.margin,
        options: options.clone(),
    }
}

/// BFS layer assignment. Returns node indices grouped by layer.
fn assign_layers(children: &[Vec<usize>], has_incoming: &[bool]) -> Vec<Vec<usize>> {
    let n = children.len();
    let mut layers: Vec<Vec<usize>> = Vec::new();
    let mut visited = vec![false; n];

    let roots: Vec<usize> = (0..n).filter(|&i| !has_incoming[i]).collect();

    let mut bfs = |starts: &[usize], layers: &mut Vec<Vec<usize>>, visited: &mut [bool]| {
        let mut queue: VecDeque<(usize, usize)> = starts.iter().map(|&s| (s, 0)).collect();
        while let Some((idx, layer)) = queue.pop_front() {
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            while layers.len() <= layer {
                layers.push(Vec::new());
            }
            layers[layer].push(idx);

            for &child in &children[idx] {
                if !visited[child] {
                    queue.push_back((child, layer + 1));
                }
            }
        }
    };

    bfs(&roots, &mut layers, &mut visited);

    // Pure cycles have no root
    while let Some(next) = visited.iter().position(|v| !v) {
        bfs(&[next], &mut layers, &mut visited);
    }

    layers
}

/// Connect the facing borders of two boxes.
fn route(from: &NodeBox, to: &NodeBox, label: Option<String>) -> EdgePath {
    let (fc, tc) = (from.center(), to.center());
    let (start, end) = if from.id == to.id {
        // Self-loop: short hop off the right border back onto the top.
        (
            Point::new(from.x + from.width, fc.y),
            Point::new(fc.x, from.y),
        )
    } else if to.layer > from.layer {
        (Point::new(from.x + from.width, fc.y), Point::new(to.x, tc.y))
    } else if to.layer < from.layer {
        (Point::new(from.x, fc.y), Point::new(to.x + to.width, tc.y))
    } else if to.y > from.y {
        (Point::new(fc.x, from.y + from.height), Point::new(tc.x, to.y))
    } else {
        (Point::new(fc.x, from.y), Point::new(tc.x, to.y + to.height))
    };
    EdgePath { start, end, label }
}

//! The constrained diagram description the model is asked to produce.
//!
//! A [`Diagram`] is plain data: a list of entity nodes (each with typed
//! fields) and a list of directed edges between node ids. Nothing in it is
//! executed; [`crate::pipeline::render`] draws it with a fixed routine.

use crate::error::RenderError;
use crate::pipeline::payload::unwrap_json_payload;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An entity-relation diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    /// Caption drawn above the diagram.
    #[serde(default)]
    pub title: Option<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// One entity box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Heading shown in the box. Falls back to `id` when absent.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// A `name: type` line inside an entity box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub ty: String,
}

/// A directed relation `from → to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_field_type() -> String {
    "string".to_string()
}

impl Node {
    /// Text for the box heading.
    pub fn heading(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

impl Field {
    /// The `name: type` line as drawn.
    pub fn display(&self) -> String {
        format!("{}: {}", self.name, self.ty)
    }
}

impl Diagram {
    /// Unwrap, parse and validate a raw model reply.
    pub fn from_reply(reply: &str) -> Result<Self, RenderError> {
        let payload = unwrap_json_payload(reply)?;
        let diagram: Diagram =
            serde_json::from_str(&payload).map_err(|e| RenderError::InvalidJson {
                detail: e.to_string(),
            })?;
        diagram.validate()?;
        Ok(diagram)
    }

    /// Check the structural rules a renderable diagram must satisfy.
    ///
    /// * at least one node
    /// * node ids are non-empty and unique
    /// * field names are non-empty
    /// * every edge endpoint is a known node id
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.nodes.is_empty() {
            return Err(invalid("diagram has no nodes".to_string()));
        }

        let mut ids = HashSet::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(invalid(format!("node {i} has an empty id")));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(invalid(format!("duplicate node id '{}'", node.id)));
            }
            if let Some(j) = node.fields.iter().position(|f| f.name.trim().is_empty()) {
                return Err(invalid(format!(
                    "node '{}' field {j} has an empty name",
                    node.id
                )));
            }
        }

        for (i, edge) in self.edges.iter().enumerate() {
            for endpoint in [&edge.from, &edge.to] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(invalid(format!(
                        "edge {i} references unknown node '{endpoint}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Index of the node with `id`.
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

fn invalid(detail: String) -> RenderError {
    RenderError::InvalidDiagram { detail }
}

//! Prompt templates for the two model calls.
//!
//! Both templates carry a single `{content}` placeholder. Callers can swap
//! either one via [`crate::config::ExtractionConfig::diagram_prompt`] /
//! [`crate::config::ExtractionConfig::schema_prompt`]; the constants here are
//! used only when no override is provided.

use crate::pipeline::extract::PageText;

/// Placeholder substituted with the call's input text.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

/// Hand-written example shown to the model as the expected output shape.
pub const DIAGRAM_EXAMPLE: &str = r#"```json
{
  "title": "Portfolio Structure",
  "nodes": [
    {"id": "ROOT", "label": "ROOT", "fields": [{"name": "portfolio", "type": "object"}]},
    {"id": "portfolio", "label": "portfolio", "fields": [
      {"name": "name", "type": "string"},
      {"name": "series", "type": "string"},
      {"name": "fees", "type": "object"},
      {"name": "withdrawalRights", "type": "object"},
      {"name": "contactInformation", "type": "object"},
      {"name": "yearByYearReturns", "type": "object[]"},
      {"name": "bestWorstReturns", "type": "object[]"},
      {"name": "averageReturn", "type": "string"},
      {"name": "targetInvestors", "type": "string[]"},
      {"name": "taxInformation", "type": "string"}
    ]},
    {"id": "fees", "label": "fees", "fields": [
      {"name": "salesCharges", "type": "string"},
      {"name": "fundExpenses", "type": "object"},
      {"name": "trailingCommissions", "type": "string"}
    ]},
    {"id": "withdrawalRights", "label": "withdrawalRights", "fields": [
      {"name": "timeLimit", "type": "string"},
      {"name": "conditions", "type": "string[]"}
    ]},
    {"id": "contactInformation", "label": "contactInformation", "fields": [
      {"name": "companyName", "type": "string"},
      {"name": "address", "type": "string"},
      {"name": "phone", "type": "string"},
      {"name": "email", "type": "string"},
      {"name": "website", "type": "string"}
    ]},
    {"id": "yearByYearReturns", "label": "yearByYearReturns", "fields": [
      {"name": "year", "type": "string"},
      {"name": "return", "type": "string"}
    ]},
    {"id": "bestWorstReturns", "label": "bestWorstReturns", "fields": [
      {"name": "type", "type": "string"},
      {"name": "return", "type": "string"},
      {"name": "date", "type": "string"},
      {"name": "investmentValue", "type": "string"}
    ]},
    {"id": "fundExpenses", "label": "fundExpenses", "fields": [
      {"name": "managementExpenseRatio", "type": "string"},
      {"name": "tradingExpenseRatio", "type": "string"},
      {"name": "totalExpenses", "type": "string"}
    ]}
  ],
  "edges": [
    {"from": "ROOT", "to": "portfolio"},
    {"from": "portfolio", "to": "fees"},
    {"from": "portfolio", "to": "withdrawalRights"},
    {"from": "portfolio", "to": "contactInformation"},
    {"from": "portfolio", "to": "yearByYearReturns"},
    {"from": "portfolio", "to": "bestWorstReturns"},
    {"from": "fees", "to": "fundExpenses"}
  ]
}
```"#;

/// Default diagram prompt. `{example}` is filled with [`DIAGRAM_EXAMPLE`].
pub const DEFAULT_DIAGRAM_PROMPT: &str = r#"Describe the entities found in the following PDF and the relationships between them as a directed graph.

Answer with ONLY a single ```json fenced block following exactly this format:
{example}

Rules:
- "nodes" lists every entity; "id" is unique, "fields" lists its attributes as name/type pairs
- "edges" connect a parent entity ("from") to a child entity ("to"); both must be node ids
- use a "ROOT" node for the document itself
- do not add commentary outside the fenced block

PDF content:
{content}"#;

/// Default schema prompt.
pub const DEFAULT_SCHEMA_PROMPT: &str =
    "Generate only the JSON code that describes the schema from the following diagram description:\n{content}";

/// Build the diagram-synthesis prompt from the extracted pages.
pub fn diagram_prompt(template: Option<&str>, pages: &[PageText]) -> String {
    let template = template.unwrap_or(DEFAULT_DIAGRAM_PROMPT);
    template
        .replace("{example}", DIAGRAM_EXAMPLE)
        .replace(CONTENT_PLACEHOLDER, &format_pages(pages))
}

/// Build the schema-synthesis prompt from `source` (diagram reply or page text).
pub fn schema_prompt(template: Option<&str>, source: &str) -> String {
    template
        .unwrap_or(DEFAULT_SCHEMA_PROMPT)
        .replace(CONTENT_PLACEHOLDER, source)
}

/// Render pages as `--- page N ---` delimited text, in page order.
pub fn format_pages(pages: &[PageText]) -> String {
    let mut out = String::new();
    for page in pages {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!("--- page {} ---\n", page.page_num));
        out.push_str(page.text.trim_end());
    }
    out
}

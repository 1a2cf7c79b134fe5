//! Payload unwrapping: pull the JSON diagram description out of a model reply.
//!
//! Chat models wrap structured output inconsistently: sometimes a ```` ```json ````
//! fence, sometimes a bare fence, sometimes bare JSON, occasionally preceded
//! by a sentence of chatter. Instead of slicing a fixed number of characters
//! off each end, this module recognises those shapes explicitly and reports
//! [`RenderError::MissingPayload`] when none of them is present.
//!
//! ## Rule Order
//!
//! 1. Normalise line endings (CRLF → LF)
//! 2. Strip invisible Unicode (BOM, zero-width spaces, soft hyphens)
//! 3. First fenced block tagged `json` or untagged wins
//! 4. Otherwise a reply whose trimmed text starts with `{` is taken whole
//! 5. Otherwise: no payload

use crate::error::RenderError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Extract the JSON text of a diagram description from a raw reply.
pub fn unwrap_json_payload(reply: &str) -> Result<String, RenderError> {
    let text = normalise_line_endings(reply);
    let text = remove_invisible_chars(&text);

    if let Some(block) = first_json_fence(&text)? {
        return Ok(block);
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }

    Err(RenderError::MissingPayload)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Fenced blocks ────────────────────────────────────────────────────

static RE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```\s*([A-Za-z0-9_+-]*)\s*$").unwrap());

static RE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*```\s*$").unwrap());

/// Content of the first fence tagged `json` (any case) or untagged.
///
/// Blocks with another language tag are skipped. An opened fence that never
/// closes is an error, whatever its tag.
fn first_json_fence(input: &str) -> Result<Option<String>, RenderError> {
    let mut lines = input.lines().enumerate();

    while let Some((open_idx, line)) = lines.next() {
        let Some(caps) = RE_FENCE_OPEN.captures(line) else {
            continue;
        };
        let tag = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let wanted = tag.is_empty() || tag.eq_ignore_ascii_case("json");

        let mut body = Vec::new();
        let mut closed = false;
        for (_, inner) in lines.by_ref() {
            if RE_FENCE_CLOSE.is_match(inner) {
                closed = true;
                break;
            }
            body.push(inner);
        }

        if !closed {
            return Err(RenderError::UnterminatedFence { line: open_idx + 1 });
        }
        if wanted {
            return Ok(Some(body.join("\n").trim().to_string()));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fence() {
        let reply = "```json\n{\"nodes\": []}\n```";
        assert_eq!(unwrap_json_payload(reply).unwrap(), "{\"nodes\": []}");
    }

    #[test]
    fn untagged_fence_with_chatter() {
        let reply = "Here is the diagram:\n\n```\n{\"a\": 1}\n```\nLet me know!";
        assert_eq!(unwrap_json_payload(reply).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn other_language_blocks_are_skipped() {
        let reply = "```python\nprint('x')\n```\n```JSON\n{\"b\": 2}\n```";
        assert_eq!(unwrap_json_payload(reply).unwrap(), "{\"b\": 2}");
    }

    #[test]
    fn bare_json() {
        let reply = "\u{FEFF}  {\"nodes\": []}  \n";
        assert_eq!(unwrap_json_payload(reply).unwrap(), "{\"nodes\": []}");
    }

    #[test]
    fn crlf_fence() {
        let reply = "```json\r\n{\"c\": 3}\r\n```\r\n";
        assert_eq!(unwrap_json_payload(reply).unwrap(), "{\"c\": 3}");
    }

    #[test]
    fn prose_only_is_missing() {
        assert_eq!(
            unwrap_json_payload("I cannot help with that."),
            Err(RenderError::MissingPayload)
        );
    }

    #[test]
    fn python_only_is_missing() {
        let reply = "```python\nfrom graphviz import Digraph\n```";
        assert_eq!(unwrap_json_payload(reply), Err(RenderError::MissingPayload));
    }

    #[test]
    fn unterminated_fence_reports_line() {
        let reply = "intro\n```json\n{\"nodes\": []}";
        assert_eq!(
            unwrap_json_payload(reply),
            Err(RenderError::UnterminatedFence { line: 2 })
        );
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{00AD}c"), "abc");
    }
}

//! Markdown documents.
//!
//! A notebook is saved as plain markdown: text cells verbatim, code cells
//! as ```` ```js ```` fences and setup cells as ```` ```setup ```` fences.
//! Fences with any other info string are ordinary markdown and stay inside
//! the surrounding text cell.

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::notebook::CellKind;

/// A cell read from or written to a document, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDraft {
    pub kind: CellKind,
    pub source: String,
}

impl CellDraft {
    pub fn new(kind: CellKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }
}

/// Split a markdown document into cells.
pub fn parse(text: &str) -> Result<Vec<CellDraft>, DocumentError> {
    let mut cells = Vec::new();
    let mut prose = String::new();
    let mut lines = text.lines().enumerate();

    while let Some((number, line)) = lines.next() {
        let Some((marker, info)) = fence_open(line) else {
            push_line(&mut prose, line);
            continue;
        };

        let kind = cell_kind(info);
        let mut body = String::new();
        let mut closed = false;
        for (_, inner) in lines.by_ref() {
            if is_fence_close(inner, marker) {
                closed = true;
                if kind.is_none() {
                    push_line(&mut body, inner);
                }
                break;
            }
            push_line(&mut body, inner);
        }
        if !closed {
            return Err(DocumentError::UnterminatedFence { line: number + 1 });
        }

        match kind {
            Some(kind) => {
                flush_text(&mut cells, &mut prose);
                cells.push(CellDraft::new(kind, body.trim_end_matches('\n')));
            }
            None => {
                push_line(&mut prose, line);
                prose.push_str(&body);
            }
        }
    }

    flush_text(&mut cells, &mut prose);
    Ok(cells)
}

/// Write cells back as markdown. `parse(&render(cells))` gives the same
/// kinds and sources.
pub fn render(cells: &[CellDraft]) -> String {
    let blocks: Vec<String> = cells
        .iter()
        .map(|cell| match cell.kind {
            CellKind::Text => cell.source.trim().to_string(),
            CellKind::Code => fenced("js", &cell.source),
            CellKind::Setup => fenced("setup", &cell.source),
        })
        .collect();

    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

fn fenced(info: &str, source: &str) -> String {
    let marker = "`".repeat(longest_backtick_run(source).max(2) + 1);
    format!("{marker}{info}\n{source}\n{marker}")
}

fn longest_backtick_run(source: &str) -> usize {
    source
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0)
}

/// An opening fence: the backtick run and the info string.
fn fence_open(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let ticks = trimmed.len() - trimmed.trim_start_matches('`').len();
    if ticks < 3 {
        return None;
    }
    let (marker, rest) = trimmed.split_at(ticks);
    let info = rest.trim();
    if info.contains('`') {
        return None;
    }
    Some((marker, info))
}

fn is_fence_close(line: &str, marker: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= marker.len() && trimmed.chars().all(|c| c == '`')
}

fn cell_kind(info: &str) -> Option<CellKind> {
    let language = info.split_whitespace().next().unwrap_or("");
    match language {
        "" | "js" | "javascript" => Some(CellKind::Code),
        "setup" | "script" => Some(CellKind::Setup),
        _ => None,
    }
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}

fn flush_text(cells: &mut Vec<CellDraft>, prose: &mut String) {
    let text = prose.trim();
    if !text.is_empty() {
        cells.push(CellDraft::new(CellKind::Text, text));
    }
    prose.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_text_and_code() {
        let doc = "# Title\n\nSome prose.\n\n```js\n4 + 5\n```\n\n```setup\n\"https://cdn/lib.js\"\n```\n\nMore.\n";
        let cells = parse(doc).unwrap();
        assert_eq!(
            cells,
            vec![
                CellDraft::new(CellKind::Text, "# Title\n\nSome prose."),
                CellDraft::new(CellKind::Code, "4 + 5"),
                CellDraft::new(CellKind::Setup, "\"https://cdn/lib.js\""),
                CellDraft::new(CellKind::Text, "More."),
            ]
        );
    }

    #[test]
    fn other_fences_stay_in_text() {
        let doc = "Intro\n```python\nprint(1)\n```\nOutro\n";
        let cells = parse(doc).unwrap();
        assert_eq!(
            cells,
            vec![CellDraft::new(
                CellKind::Text,
                "Intro\n```python\nprint(1)\n```\nOutro"
            )]
        );
    }

    #[test]
    fn bare_fence_is_code_and_keeps_blank_lines() {
        let cells = parse("```\n{\n  let x = 1\n\n  return x\n}\n```").unwrap();
        assert_eq!(
            cells,
            vec![CellDraft::new(CellKind::Code, "{\n  let x = 1\n\n  return x\n}")]
        );
    }

    #[test]
    fn blank_documents_have_no_cells() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n   \n\n").unwrap().is_empty());
    }

    #[test]
    fn unterminated_fence_reports_line() {
        let err = parse("text\n\n```js\n1 + 1\n").unwrap_err();
        assert_eq!(err, DocumentError::UnterminatedFence { line: 3 });
    }

    #[test]
    fn render_then_parse_keeps_cells() {
        let cells = vec![
            CellDraft::new(CellKind::Text, "# Notes"),
            CellDraft::new(CellKind::Code, "html`<b>${c0}</b>`"),
            CellDraft::new(CellKind::Setup, "\"lib\""),
            CellDraft::new(CellKind::Code, "[1, 2].map(x => x * 2)"),
        ];
        let text = render(&cells);
        assert!(text.contains("```js\n[1, 2].map(x => x * 2)\n```"));
        assert_eq!(parse(&text).unwrap(), cells);
    }

    #[test]
    fn render_widens_fence_around_backticks() {
        let cells = vec![CellDraft::new(CellKind::Code, "```")];
        let text = render(&cells);
        assert!(text.starts_with("````js\n"));
        assert_eq!(parse(&text).unwrap(), cells);
    }
}

//! Dependency Extraction
//!
//! Finds which other cells a cell's source refers to. The scan is purely
//! lexical: any identifier-shaped token that equals a candidate name counts,
//! wherever it appears (inside strings and comments too). It may report a
//! dependency the computation never reads, but it never misses one, because
//! the evaluator binds exactly the extracted names and nothing else.

use std::collections::HashSet;

use smallvec::SmallVec;

use crate::eval::{is_ident_continue, is_ident_start, is_keyword};
use crate::graph::CellId;

/// Input names of one binding, in first-occurrence order.
pub type Inputs = SmallVec<[String; 4]>;

/// Extract the names from `candidates` that `source` mentions.
///
/// A mention must be a whole token: `c1` does not match inside `c10` or
/// `xc1`. `own_name` is never reported; see [`mentions`] for that.
pub fn extract<S: AsRef<str>>(source: &str, candidates: &[S], own_name: &str) -> Inputs {
    let candidates: HashSet<&str> = candidates
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| *name != own_name)
        .collect();

    let mut inputs = Inputs::new();
    for token in identifier_tokens(source) {
        if candidates.contains(token) && !inputs.iter().any(|seen| seen == token) {
            inputs.push(token.to_string());
        }
    }
    inputs
}

/// Whether `source` mentions `name` as a whole token.
pub fn mentions(source: &str, name: &str) -> bool {
    identifier_tokens(source).any(|token| token == name)
}

/// Every maximal identifier-shaped run in `source`, in order.
///
/// Runs that begin with a digit (`10px`, `2e5`) are numbers, not names.
pub fn identifier_tokens(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !is_ident_continue(c))
        .filter(|run| run.chars().next().is_some_and(is_ident_start))
}

/// Whether `name` can be used as a binding name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_ident_start(first) && chars.all(is_ident_continue) && !is_keyword(name)
}

/// The binding name a notebook gives to `cell`.
pub fn binding_name(cell: CellId) -> String {
    format!("c{}", cell.raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_whole_token_mentions_in_order() {
        let inputs = extract("c1 + c0 * c1", &["c0", "c1", "c2"], "c3");
        assert_eq!(inputs.as_slice(), ["c1", "c0"]);
    }

    #[test]
    fn ignores_longer_identifiers() {
        let inputs = extract("c10 + xc1 + c1_total", &["c1"], "c2");
        assert!(inputs.is_empty());
    }

    #[test]
    fn excludes_own_name() {
        let inputs = extract("c0 + c1", &["c0", "c1"], "c0");
        assert_eq!(inputs.as_slice(), ["c1"]);
        assert!(mentions("c0 + c1", "c0"));
        assert!(!mentions("c10 + 1", "c1"));
    }

    #[test]
    fn over_approximates_strings_and_comments() {
        let inputs = extract("\"c0\" // uses c1", &["c0", "c1"], "c9");
        assert_eq!(inputs.as_slice(), ["c0", "c1"]);
    }

    #[test]
    fn template_substitutions_are_found() {
        let inputs = extract("html`<b>${c0}</b>`", &["c0"], "c1");
        assert_eq!(inputs.as_slice(), ["c0"]);
    }

    #[test]
    fn unknown_names_are_dropped() {
        let inputs = extract("c0 + c7", &["c0"], "c1");
        assert_eq!(inputs.as_slice(), ["c0"]);
    }

    #[test]
    fn numeric_runs_are_not_names() {
        let tokens: Vec<_> = identifier_tokens("2e5 + $x - _y1").collect();
        assert_eq!(tokens, ["$x", "_y1"]);
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("c0"));
        assert!(is_identifier("_total"));
        assert!(is_identifier("$el"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("0c"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("return"));
    }

    #[test]
    fn names_derive_from_ids() {
        assert_eq!(binding_name(CellId::from(12)), "c12");
    }
}

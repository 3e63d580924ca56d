//! Citation marker renumbering and link resolution.
//!
//! Generated answers carry `[N]` markers referencing the numbered source list
//! shown to the model. The numbers the model emits are arbitrary: repeated,
//! gapped, out of order, sometimes out of range. The renderer rewrites them
//! into a clean sequence over the **complete** answer text in two passes:
//!
//! 1. scan for markers in order of appearance and assign each distinct
//!    original number a new sequential number starting at 1 (first-seen
//!    order; repeats map to the same new number);
//! 2. rebuild the text in a single sweep, replacing every marker with its new
//!    number, linked to the source list entry at the new position when one
//!    exists.
//!
//! Renumbering keeps the displayed markers aligned with the displayed source
//! list: marker `[k]` always points at the k-th listed source. A marker whose
//! new number falls past the end of the list is kept as a plain `[k]` with no
//! link. Never applied to partial streamed text, since a marker can span a
//! chunk boundary.

use crate::context::Source;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

static CITATION_MARKER: OnceLock<Regex> = OnceLock::new();

fn citation_marker() -> &'static Regex {
    CITATION_MARKER.get_or_init(|| Regex::new(r"\[(\d+)\]").unwrap())
}

/// One renumbered citation marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// Number the model emitted
    pub original: usize,
    /// Number shown in the rendered answer
    pub renumbered: usize,
    /// Resolved link target, when the new number lands inside the source list
    pub url: Option<String>,
}

/// A `[digits]` token is only a citation marker at a clean token boundary:
/// not nested in another bracket and not already part of a Markdown link.
fn is_marker(text: &str, start: usize, end: usize) -> bool {
    if text[..start].ends_with('[') {
        return false;
    }
    let tail = &text[end..];
    !(tail.starts_with(']') || tail.starts_with('('))
}

/// Renumbers citation markers in a complete answer and resolves their links.
///
/// # Arguments
/// * `text` - The full generated answer
/// * `sources` - Ordered source list the markers resolve against
///
/// # Returns
/// The rewritten text plus one [`Citation`] per distinct marker, in
/// first-seen order.
///
/// # Example
/// ```
/// use sibyl_answer::citations::renumber_citations;
/// use sibyl_answer::context::Source;
///
/// let sources = vec![Source {
///     name: "Refund Policy".to_string(),
///     url: "https://docs.example.com/refund-policy".to_string(),
/// }];
/// let (text, citations) = renumber_citations("see [4] and [4]", &sources);
/// assert_eq!(text, "see [1](https://docs.example.com/refund-policy) and [1](https://docs.example.com/refund-policy)");
/// assert_eq!(citations.len(), 1);
/// ```
pub fn renumber_citations(text: &str, sources: &[Source]) -> (String, Vec<Citation>) {
    let marker = citation_marker();

    // Pass 1: distinct original numbers in first-seen order.
    let mut seen: Vec<usize> = Vec::new();
    for caps in marker.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        if !is_marker(text, whole.start(), whole.end()) {
            continue;
        }
        let Ok(original) = caps[1].parse::<usize>() else {
            continue;
        };
        if !seen.contains(&original) {
            seen.push(original);
        }
    }

    let citations: Vec<Citation> = seen
        .iter()
        .enumerate()
        .map(|(position, &original)| Citation {
            original,
            renumbered: position + 1,
            url: sources.get(position).map(|source| source.url.clone()),
        })
        .collect();

    // Pass 2: one substitution sweep over the same matches.
    let mut rendered = String::with_capacity(text.len());
    let mut tail_start = 0;
    for caps in marker.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        rendered.push_str(&text[tail_start..whole.start()]);
        tail_start = whole.end();

        let replacement = caps[1]
            .parse::<usize>()
            .ok()
            .filter(|_| is_marker(text, whole.start(), whole.end()))
            .and_then(|original| seen.iter().position(|&n| n == original))
            .map(|position| &citations[position]);

        match replacement {
            Some(citation) => match &citation.url {
                Some(url) => {
                    rendered.push_str(&format!("[{}]({})", citation.renumbered, url));
                }
                None => rendered.push_str(&format!("[{}]", citation.renumbered)),
            },
            None => rendered.push_str(whole.as_str()),
        }
    }
    rendered.push_str(&text[tail_start..]);

    (rendered, citations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(urls: &[&str]) -> Vec<Source> {
        urls.iter()
            .map(|url| Source {
                name: "Source".to_string(),
                url: url.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_renumbering_is_deterministic_first_seen_order() {
        let sources = sources(&["https://a.example/one", "https://a.example/two"]);
        let (text, citations) = renumber_citations("A[3] B[1] C[3] D[9]", &sources);

        assert_eq!(
            text,
            "A[1](https://a.example/one) B[2](https://a.example/two) \
             C[1](https://a.example/one) D[3]"
        );
        assert_eq!(
            citations,
            vec![
                Citation {
                    original: 3,
                    renumbered: 1,
                    url: Some("https://a.example/one".to_string()),
                },
                Citation {
                    original: 1,
                    renumbered: 2,
                    url: Some("https://a.example/two".to_string()),
                },
                Citation {
                    original: 9,
                    renumbered: 3,
                    url: None,
                },
            ]
        );
    }

    #[test]
    fn test_repeats_share_one_new_number() {
        let sources = sources(&["https://a.example/one"]);
        let (text, citations) = renumber_citations("x [7] y [7] z [7]", &sources);

        assert_eq!(citations.len(), 1);
        assert_eq!(text.matches("[1](https://a.example/one)").count(), 3);
    }

    #[test]
    fn test_markers_past_the_source_list_stay_unlinked() {
        let sources = sources(&["https://a.example/one"]);
        let (text, citations) = renumber_citations("first [2], second [5]", &sources);

        assert_eq!(text, "first [1](https://a.example/one), second [2]");
        assert_eq!(citations[1].url, None);
    }

    #[test]
    fn test_text_without_markers_is_untouched() {
        let (text, citations) = renumber_citations("no citations here", &sources(&[]));
        assert_eq!(text, "no citations here");
        assert!(citations.is_empty());
    }

    #[test]
    fn test_existing_links_are_not_rewritten() {
        let input = "already linked [1](https://a.example/keep) stays";
        let (text, citations) = renumber_citations(input, &sources(&["https://a.example/new"]));
        assert_eq!(text, input);
        assert!(citations.is_empty());
    }

    #[test]
    fn test_nested_brackets_are_not_markers() {
        let input = "matrix [[1]] is not a citation";
        let (text, citations) = renumber_citations(input, &sources(&["https://a.example/one"]));
        assert_eq!(text, input);
        assert!(citations.is_empty());
    }

    #[test]
    fn test_adjacent_markers_both_rewrite() {
        let sources = sources(&["https://a.example/one", "https://a.example/two"]);
        let (text, _) = renumber_citations("facts [2][1]", &sources);
        assert_eq!(
            text,
            "facts [1](https://a.example/one)[2](https://a.example/two)"
        );
    }

    #[test]
    fn test_unparseable_numbers_stay_literal() {
        let huge = "see [99999999999999999999999999]";
        let (text, citations) = renumber_citations(huge, &sources(&["https://a.example/one"]));
        assert_eq!(text, huge);
        assert!(citations.is_empty());
    }
}

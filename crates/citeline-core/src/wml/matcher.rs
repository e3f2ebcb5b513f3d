use crate::util::strings::{escape_text, fold_superscript};
use crate::wml::segment::TextSegmentIndex;
use std::ops::Range;
use tracing::debug;

/// Which strategy located a citation. Diagnostic only; correctness does not
/// depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    SuperscriptNormalized,
    Parenthesized,
    CompoundList,
    Bracketed,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::SuperscriptNormalized => "superscript_normalized",
            MatchStrategy::Parenthesized => "parenthesized",
            MatchStrategy::CompoundList => "compound_list",
            MatchStrategy::Bracketed => "bracketed",
        }
    }
}

/// A located citation: byte span within the combined text, plus the strategy
/// that found it. The span covers the citation literal itself, never the
/// surrounding punctuation a strategy used as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMatch {
    pub span: Range<usize>,
    pub strategy: MatchStrategy,
}

/// Find a citation's text inside the combined view, applying strategies in
/// order until one succeeds. `from` bounds the search to combined-text
/// offsets at or beyond it, letting the caller walk successive occurrences.
pub fn find_citation(index: &TextSegmentIndex, citation: &str, from: usize) -> Option<CitationMatch> {
    let combined = index.combined_text();
    if from > combined.len() {
        return None;
    }
    let haystack = &combined[from..];
    let needle = escape_text(citation);

    let found = exact(haystack, &needle)
        .or_else(|| superscript_normalized(haystack, &needle))
        .or_else(|| parenthesized(haystack, &needle))
        .or_else(|| compound_list(haystack, &needle))
        .or_else(|| bracketed(haystack, &needle));

    found.map(|(span, strategy)| {
        debug!(citation, strategy = strategy.as_str(), "citation matched");
        CitationMatch {
            span: (span.start + from)..(span.end + from),
            strategy,
        }
    })
}

fn exact(haystack: &str, needle: &str) -> Option<(Range<usize>, MatchStrategy)> {
    haystack
        .find(needle)
        .map(|at| (at..at + needle.len(), MatchStrategy::Exact))
}

/// Fold document superscript digits to ASCII in a shadow string, search
/// there, then map the hit back to raw offsets.
fn superscript_normalized(haystack: &str, needle: &str) -> Option<(Range<usize>, MatchStrategy)> {
    let mut folded = String::with_capacity(haystack.len());
    // Byte offset into the raw haystack for each folded byte.
    let mut map = Vec::with_capacity(haystack.len());
    for (at, c) in haystack.char_indices() {
        match fold_superscript(c) {
            Some(digit) => {
                folded.push(digit);
                map.push(at);
            }
            None => {
                for i in 0..c.len_utf8() {
                    map.push(at + i);
                }
                folded.push(c);
            }
        }
    }

    let at = folded.find(needle)?;
    let raw_start = map[at];
    let last = at + needle.len() - 1;
    let raw_end = map[last] + char_len_at(haystack, map[last]);
    Some((raw_start..raw_end, MatchStrategy::SuperscriptNormalized))
}

fn char_len_at(s: &str, at: usize) -> usize {
    s[at..].chars().next().map(|c| c.len_utf8()).unwrap_or(1)
}

/// The citation stored without surrounding punctuation: match it wrapped in
/// parentheses, but report only the inner span.
fn parenthesized(haystack: &str, needle: &str) -> Option<(Range<usize>, MatchStrategy)> {
    let wrapped = format!("({needle})");
    haystack
        .find(&wrapped)
        .map(|at| (at + 1..at + 1 + needle.len(), MatchStrategy::Parenthesized))
}

/// Last, first, or interior element of a semicolon/comma-joined compound
/// citation. The needle arrives with its own wrapping punctuation
/// ("(Park, 2021)"), which the document has merged into a shared pair, so
/// the inner literal is what gets located.
fn compound_list(haystack: &str, needle: &str) -> Option<(Range<usize>, MatchStrategy)> {
    let inner = strip_wrapping(needle);
    if inner == needle {
        // A bare needle inside a compound pair is already an exact hit.
        return None;
    }
    let contexts: [(String, usize); 6] = [
        (format!("; {inner})"), 2),
        (format!("({inner};"), 1),
        (format!("; {inner};"), 2),
        (format!(", {inner})"), 2),
        (format!("({inner},"), 1),
        (format!(", {inner},"), 2),
    ];
    for (pattern, lead) in &contexts {
        if let Some(at) = haystack.find(pattern.as_str()) {
            let start = at + lead;
            return Some((start..start + inner.len(), MatchStrategy::CompoundList));
        }
    }
    None
}

/// Remove one layer of matching surrounding parentheses or brackets.
pub fn strip_wrapping(text: &str) -> &str {
    let t = text.trim();
    if (t.starts_with('(') && t.ends_with(')')) || (t.starts_with('[') && t.ends_with(']')) {
        &t[1..t.len() - 1]
    } else {
        t
    }
}

/// The replacement literal corresponding to how the source was matched: a
/// compound-list hit covered only the inner literal, so the new text sheds
/// its wrapping the same way.
pub fn adapt_replacement<'a>(strategy: MatchStrategy, after: &'a str) -> &'a str {
    match strategy {
        MatchStrategy::CompoundList => strip_wrapping(after),
        _ => after,
    }
}

fn bracketed(haystack: &str, needle: &str) -> Option<(Range<usize>, MatchStrategy)> {
    let wrapped = format!("[{needle}]");
    haystack
        .find(&wrapped)
        .map(|at| (at + 1..at + 1 + needle.len(), MatchStrategy::Bracketed))
}

/// Extract reference numbers from bracket/paren/plain numeric citation text,
/// expanding ranges and comma lists. Range expansion is capped to bound cost.
pub fn extract_citation_numbers(text: &str, max_range_span: usize) -> Vec<u32> {
    let cleaned: String = text
        .chars()
        .map(|c| fold_superscript(c).unwrap_or(c))
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')'))
        .collect();

    let mut numbers = Vec::new();
    for part in cleaned.split([',', ';']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = split_range(part) {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                if lo <= hi {
                    for n in lo..=hi {
                        if numbers.len() >= max_range_span {
                            return numbers;
                        }
                        numbers.push(n);
                    }
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if numbers.len() >= max_range_span {
                return numbers;
            }
            numbers.push(n);
        }
    }
    numbers
}

fn split_range(part: &str) -> Option<(&str, &str)> {
    for sep in ['-', '\u{2013}', '\u{2014}'] {
        if let Some((lo, hi)) = part.split_once(sep) {
            return Some((lo, hi));
        }
    }
    None
}

use crate::types::ChangeKind;
use crate::wml::author::{contains_word, extract_author_token, extract_year};
use crate::wml::references::locate_reference_section;
use crate::wml::renderer::{apply_span_edit, strike_paragraph};
use crate::wml::revision::{RevisionIdAllocator, RevisionSettings};
use crate::wml::segment::TextSegmentIndex;
use crate::wml::settings::EngineSettings;
use std::ops::Range;
use tracing::{debug, warn};

/// One non-destructive reference edit for author-year documents.
#[derive(Debug, Clone)]
pub struct SelectiveEdit {
    pub old_text: String,
    pub new_text: String,
}

#[derive(Debug, Default)]
pub struct SelectiveStats {
    pub deleted: usize,
    pub edited: usize,
    pub not_found: Vec<String>,
}

/// Narrow path for author-year documents: edit or delete individual
/// reference paragraphs without rebuilding the whole section.
pub fn apply_selective_edits(
    ref_xml: &str,
    deleted_ref_texts: &[String],
    edited_refs: &[SelectiveEdit],
    settings: &EngineSettings,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
) -> (String, SelectiveStats) {
    let mut stats = SelectiveStats::default();

    let Some(split) = locate_reference_section(ref_xml, settings) else {
        warn!("no reference section, skipping selective edits");
        stats
            .not_found
            .extend(deleted_ref_texts.iter().cloned());
        stats
            .not_found
            .extend(edited_refs.iter().map(|e| e.old_text.clone()));
        return (ref_xml.to_string(), stats);
    };

    // Each entry paragraph carries through unchanged unless claimed by a
    // deletion or an edit.
    #[derive(Clone)]
    enum Disposition {
        Keep,
        Delete,
        EditYear { old_year: String, new_year: String },
    }
    let mut dispositions = vec![Disposition::Keep; split.entries.len()];

    for text in deleted_ref_texts {
        let Some(token) = extract_author_token(text) else {
            stats.not_found.push(text.clone());
            continue;
        };
        let hit = split.entries.iter().enumerate().find(|(ei, entry)| {
            matches!(dispositions[*ei], Disposition::Keep)
                && contains_word(&entry.text, &token.surname)
        });
        match hit {
            Some((ei, _)) => {
                dispositions[ei] = Disposition::Delete;
                stats.deleted += 1;
            }
            None => {
                debug!(text = %text, "deleted reference not found");
                stats.not_found.push(text.clone());
            }
        }
    }

    for edit in edited_refs {
        let token = extract_author_token(&edit.old_text);
        let old_year = token
            .as_ref()
            .and_then(|t| t.year.clone())
            .or_else(|| extract_year(&edit.old_text));
        let new_year = extract_year(&edit.new_text);

        let (Some(token), Some(old_year), Some(new_year)) = (token, old_year, new_year) else {
            stats.not_found.push(edit.old_text.clone());
            continue;
        };

        let hit = split.entries.iter().enumerate().find(|(ei, entry)| {
            matches!(dispositions[*ei], Disposition::Keep)
                && contains_word(&entry.text, &token.surname)
        });
        match hit {
            Some((ei, _)) => {
                dispositions[ei] = Disposition::EditYear { old_year, new_year };
                stats.edited += 1;
            }
            None => {
                debug!(text = %edit.old_text, "edited reference not found");
                stats.not_found.push(edit.old_text.clone());
            }
        }
    }

    let mut out = String::with_capacity(ref_xml.len());
    out.push_str(&ref_xml[..split.header.end]);
    for (ei, entry) in split.entries.iter().enumerate() {
        let raw = entry.raw(ref_xml);
        match &dispositions[ei] {
            Disposition::Keep => out.push_str(raw),
            Disposition::Delete => {
                if !settings.accept_changes {
                    out.push_str(&strike_paragraph(raw, ids, rev, &settings.scan));
                }
            }
            Disposition::EditYear { old_year, new_year } => {
                out.push_str(&patch_year(raw, old_year, new_year, settings, ids, rev));
            }
        }
    }
    out.push_str(&ref_xml[split.preserved_start..]);

    (out, stats)
}

/// Patch a year substring inside one paragraph. Three fallback patterns,
/// because a year and its enclosing parenthesis frequently land in
/// different runs due to formatting boundaries.
fn patch_year(
    raw: &str,
    old_year: &str,
    new_year: &str,
    settings: &EngineSettings,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
) -> String {
    let index = TextSegmentIndex::build(raw, &settings.scan);

    let span = year_after_paren_same_run(&index, old_year)
        .or_else(|| year_in_run_after_paren_run(&index, old_year))
        .or_else(|| index.combined_text().find(old_year).map(|at| at..at + old_year.len()));

    let Some(span) = span else {
        debug!(old_year, "year not found in target paragraph");
        return raw.to_string();
    };

    apply_span_edit(
        raw,
        &index,
        span,
        Some(new_year),
        ChangeKind::ReferenceSectionEdit,
        settings.accept_changes,
        ids,
        rev,
        &settings.scan,
    )
}

/// Pattern 1: the year adjoins an opening parenthesis within one run.
fn year_after_paren_same_run(index: &TextSegmentIndex, old_year: &str) -> Option<Range<usize>> {
    let needle = format!("({old_year}");
    let mut base = 0;
    for seg in index.segments() {
        if let Some(at) = seg.text.find(&needle) {
            let start = base + at + 1;
            return Some(start..start + old_year.len());
        }
        base += seg.text.len();
    }
    None
}

/// Pattern 2: the parenthesis ends one run and the year opens the next.
fn year_in_run_after_paren_run(index: &TextSegmentIndex, old_year: &str) -> Option<Range<usize>> {
    let segments = index.segments();
    let mut base = 0;
    for (i, seg) in segments.iter().enumerate() {
        let next_base = base + seg.text.len();
        if seg.text.trim_end().ends_with('(') {
            if let Some(next) = segments.get(i + 1) {
                let leading = next.text.len() - next.text.trim_start().len();
                if next.text.trim_start().starts_with(old_year) {
                    let start = next_base + leading;
                    return Some(start..start + old_year.len());
                }
            }
        }
        base = next_base;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wml::settings::ScanLimits;

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
    }

    fn section(entries: &[String]) -> String {
        format!("{}{}", para("References"), entries.concat())
    }

    fn run_edits(
        xml: &str,
        deleted: &[String],
        edits: &[SelectiveEdit],
        accept: bool,
    ) -> (String, SelectiveStats) {
        let settings = EngineSettings::default().with_accept_changes(accept);
        let mut ids = RevisionIdAllocator::new(1);
        let rev = RevisionSettings::default();
        apply_selective_edits(xml, deleted, edits, &settings, &mut ids, &rev)
    }

    #[test]
    fn year_patched_in_same_run() {
        let xml = section(&[para("Smith, J. (2019). A study.")]);
        let (out, stats) = run_edits(
            &xml,
            &[],
            &[SelectiveEdit {
                old_text: "Smith, J. (2019). A study.".to_string(),
                new_text: "Smith, J. (2021). A study.".to_string(),
            }],
            true,
        );
        assert_eq!(stats.edited, 1);
        let index = TextSegmentIndex::build(&out, &ScanLimits::default());
        assert!(index.combined_text().contains("(2021)"));
        assert!(!index.combined_text().contains("2019"));
    }

    #[test]
    fn year_patched_across_run_boundary() {
        // The parenthesis and the year live in different runs.
        let entry = concat!(
            "<w:p><w:r><w:t xml:space=\"preserve\">Smith, J. (</w:t></w:r>",
            "<w:r><w:rPr><w:i/></w:rPr><w:t>2019</w:t></w:r>",
            "<w:r><w:t xml:space=\"preserve\">). A study.</w:t></w:r></w:p>",
        );
        let xml = format!("{}{}", para("References"), entry);
        let (out, stats) = run_edits(
            &xml,
            &[],
            &[SelectiveEdit {
                old_text: "Smith, J. (2019)".to_string(),
                new_text: "Smith, J. (2022)".to_string(),
            }],
            true,
        );
        assert_eq!(stats.edited, 1);
        let index = TextSegmentIndex::build(&out, &ScanLimits::default());
        assert!(index.combined_text().contains("(2022). A study."));
    }

    #[test]
    fn bare_year_fallback() {
        let xml = section(&[para("Smith, J. 2019; A study.")]);
        let (out, stats) = run_edits(
            &xml,
            &[],
            &[SelectiveEdit {
                old_text: "Smith, 2019".to_string(),
                new_text: "Smith, 2020".to_string(),
            }],
            true,
        );
        assert_eq!(stats.edited, 1);
        let index = TextSegmentIndex::build(&out, &ScanLimits::default());
        assert!(index.combined_text().contains("Smith, J. 2020;"));
    }

    #[test]
    fn deletion_strikes_whole_paragraph() {
        let xml = section(&[
            para("Smith, J. (2019). Kept."),
            para("Jones, A. (2018). Removed."),
        ]);
        let (out, stats) = run_edits(&xml, &["Jones, A. (2018)".to_string()], &[], false);
        assert_eq!(stats.deleted, 1);
        assert!(out.contains("<w:delText"));
        assert!(out.contains("Kept."));
    }

    #[test]
    fn deletion_in_accept_mode_removes_paragraph() {
        let xml = section(&[
            para("Smith, J. (2019). Kept."),
            para("Jones, A. (2018). Removed."),
        ]);
        let (out, stats) = run_edits(&xml, &["Jones, A. (2018)".to_string()], &[], true);
        assert_eq!(stats.deleted, 1);
        assert!(!out.contains("Jones"));
        assert!(out.contains("Kept."));
    }

    #[test]
    fn unmatchable_reference_reported() {
        let xml = section(&[para("Smith, J. (2019). Only entry.")]);
        let (out, stats) = run_edits(&xml, &["Zimmer, Q. (2001)".to_string()], &[], false);
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.not_found, vec!["Zimmer, Q. (2001)".to_string()]);
        assert!(out.contains("Only entry."));
    }
}

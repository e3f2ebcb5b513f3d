use crate::types::{ChangeKind, ReferenceEntry, SwappedPair};
use crate::wml::author::contains_word;
use crate::wml::paragraph::{split_paragraphs, ParagraphInfo};
use crate::wml::renderer::{apply_span_edit, strike_paragraph};
use crate::wml::revision::{RevisionIdAllocator, RevisionSettings};
use crate::wml::segment::TextSegmentIndex;
use crate::wml::settings::EngineSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Leading number marker of a reference entry: `[3]` or `3.` or `3)`.
static NUMBER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\[(\d{1,4})\]|(\d{1,4})[.)])\s*").expect("number marker"));

/// Split of the working XML at the reference section: everything before the
/// header paragraph is body; the in-text replacement logic never crosses
/// this boundary.
#[derive(Debug)]
pub struct SectionSplit {
    /// Offset of the header paragraph's start; body is everything before.
    pub body_end: usize,
    pub header: ParagraphInfo,
    /// Candidate reference paragraphs, in document order.
    pub entries: Vec<ParagraphInfo>,
    /// Offset where verbatim-preserved trailing content begins.
    pub preserved_start: usize,
}

/// Locate the reference section: split on a known header, then bound the
/// entry list at the first non-reference marker or table/section break.
/// Everything from that point on is preserved verbatim, never reordered.
pub fn locate_reference_section(
    xml: &str,
    settings: &EngineSettings,
) -> Option<SectionSplit> {
    let paragraphs = split_paragraphs(xml, &settings.scan);
    let header_idx = paragraphs
        .iter()
        .position(|p| settings.is_section_header(&p.text))?;

    let header = paragraphs[header_idx].clone();
    let mut entries = Vec::new();
    let mut cursor = header.end;
    let mut preserved_start = xml.len();

    for para in &paragraphs[header_idx + 1..] {
        // A table or section break between paragraphs ends the list.
        let gap = &xml[cursor..para.start];
        let structural_stop = ["<w:tbl", "<w:sectPr"]
            .iter()
            .filter_map(|marker| gap.find(marker))
            .min();
        if let Some(at) = structural_stop {
            preserved_start = cursor + at;
            return Some(SectionSplit {
                body_end: header.start,
                header,
                entries,
                preserved_start,
            });
        }

        if settings.is_stop_marker(&para.text) {
            preserved_start = para.start;
            return Some(SectionSplit {
                body_end: header.start,
                header,
                entries,
                preserved_start,
            });
        }

        if para.text.trim().is_empty() {
            cursor = para.end;
            continue;
        }

        if !is_reference_paragraph(&para.text) {
            // Ambiguous content is conservatively kept as a reference
            // rather than dropped.
            debug!(text = %para.text, "keeping ambiguous paragraph as reference");
        }
        entries.push(para.clone());
        cursor = para.end;
    }

    if let Some(last) = entries.last() {
        preserved_start = last.end;
    } else {
        preserved_start = header.end;
    }

    Some(SectionSplit {
        body_end: header.start,
        header,
        entries,
        preserved_start,
    })
}

/// Whether a paragraph reads like a reference entry: a number marker, or an
/// author-name-like opening.
pub fn is_reference_paragraph(text: &str) -> bool {
    NUMBER_MARKER.is_match(text) || crate::wml::author::extract_author_token(text).is_some()
}

#[derive(Debug, Default)]
pub struct RebuildStats {
    pub reordered: bool,
    pub swapped: Vec<SwappedPair>,
    pub deleted: usize,
    pub not_found: Vec<String>,
}

/// Rebuild the reference region (header paragraph onwards) against the
/// authoritative entry order: match, reorder, detect swaps, reinsert
/// deletions at their original ordinal, renumber, re-style, reassemble.
pub fn rebuild_reference_section(
    ref_xml: &str,
    references: &[ReferenceEntry],
    settings: &EngineSettings,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
) -> (String, RebuildStats) {
    let mut stats = RebuildStats::default();

    let Some(split) = locate_reference_section(ref_xml, settings) else {
        warn!("reference region no longer locatable, leaving it untouched");
        return (ref_xml.to_string(), stats);
    };

    // Match each authoritative reference to the first unclaimed paragraph
    // containing its first author's surname at a word boundary.
    let mut claimed = vec![false; split.entries.len()];
    let mut matched: Vec<(usize, usize)> = Vec::new(); // (reference idx, entry idx)
    for (ri, reference) in references.iter().enumerate() {
        let Some(surname) = reference.first_author_surname() else {
            stats.not_found.push(reference.id.clone());
            continue;
        };
        if surname.len() < 2 {
            stats.not_found.push(reference.id.clone());
            continue;
        }
        let hit = split
            .entries
            .iter()
            .enumerate()
            .find(|(ei, entry)| !claimed[*ei] && contains_word(&entry.text, surname));
        match hit {
            Some((ei, _)) => {
                claimed[ei] = true;
                matched.push((ri, ei));
            }
            None => {
                debug!(reference = %reference.id, surname, "authoritative reference not found");
                stats.not_found.push(reference.id.clone());
            }
        }
    }

    stats.reordered = matched.iter().enumerate().any(|(k, (_, ei))| *ei != k);

    // Pairwise swaps: A's original ordinal is B's new ordinal and vice versa.
    let mut swapped_positions = vec![false; matched.len()];
    for i in 0..matched.len() {
        for j in (i + 1)..matched.len() {
            if matched[i].1 == j && matched[j].1 == i {
                swapped_positions[i] = true;
                swapped_positions[j] = true;
                stats.swapped.push(SwappedPair {
                    first: references[matched[i].0].id.clone(),
                    second: references[matched[j].0].id.clone(),
                });
            }
        }
    }

    // Render each kept paragraph in its new position.
    let mut rendered: Vec<(usize, String)> = Vec::with_capacity(matched.len());
    for (k, (ri, ei)) in matched.iter().enumerate() {
        let raw = split.entries[*ei].raw(ref_xml);
        let swapped = swapped_positions[k];
        let rendered_para = render_entry(
            raw,
            &references[*ri],
            k + 1,
            swapped,
            settings,
            ids,
            rev,
        );
        rendered.push((*ei, rendered_para));
    }

    // Unmatched document paragraphs are deletions, reinserted at their
    // original ordinal position.
    let deletions: Vec<usize> = (0..split.entries.len()).filter(|ei| !claimed[*ei]).collect();
    stats.deleted = deletions.len();
    for ei in deletions {
        let raw = split.entries[ei].raw(ref_xml);
        if settings.accept_changes {
            continue;
        }
        let struck = strike_paragraph(raw, ids, rev, &settings.scan);
        rendered.insert(ei.min(rendered.len()), (ei, struck));
    }

    let mut out = String::with_capacity(ref_xml.len());
    out.push_str(&ref_xml[..split.header.end]);
    for (_, para) in &rendered {
        out.push_str(para);
    }
    out.push_str(&ref_xml[split.preserved_start..]);

    (out, stats)
}

/// Renumber and/or re-style one kept entry paragraph.
fn render_entry(
    raw: &str,
    reference: &ReferenceEntry,
    new_number: usize,
    swapped: bool,
    settings: &EngineSettings,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
) -> String {
    let mut para = raw.to_string();

    // Patch the rendered number when it changed.
    let index = TextSegmentIndex::build(&para, &settings.scan);
    if let Some(span) = number_digits_span(index.combined_text()) {
        let old_number = &index.combined_text()[span.clone()];
        let new_text = new_number.to_string();
        if old_number != new_text {
            let kind = if swapped {
                ChangeKind::ReferenceReorder
            } else {
                ChangeKind::Renumber
            };
            para = apply_span_edit(
                &para,
                &index,
                span,
                Some(&new_text),
                kind,
                settings.accept_changes,
                ids,
                rev,
                &settings.scan,
            );
        }
    }

    // Replace the entry body with the target-style rendering, preserving a
    // leading number marker when the paragraph has one.
    if let Some(converted) = &reference.converted_text {
        let index = TextSegmentIndex::build(&para, &settings.scan);
        let combined = index.combined_text();
        let body_start = NUMBER_MARKER
            .find(combined)
            .map(|m| m.end())
            .unwrap_or(0);
        if body_start < combined.len() {
            para = apply_span_edit(
                &para,
                &index,
                body_start..combined.len(),
                Some(converted),
                ChangeKind::IntextStyleConversion,
                settings.accept_changes,
                ids,
                rev,
                &settings.scan,
            );
        }
    }

    para
}

/// Byte span of the digits inside a leading number marker.
fn number_digits_span(combined: &str) -> Option<std::ops::Range<usize>> {
    let caps = NUMBER_MARKER.captures(combined)?;
    let group = caps.get(1).or_else(|| caps.get(2))?;
    Some(group.range())
}

use crate::types::ChangeKind;
use crate::util::strings::escape_text;
use crate::wml::revision::{RevisionIdAllocator, RevisionSettings};
use crate::wml::segment::{scan_runs, TextSegmentIndex};
use crate::wml::settings::ScanLimits;
use quick_xml::escape::escape;
use std::ops::Range;

/// Highlight color cueing reviewers to the kind of change. Purely visual;
/// the revision semantics live in the ins/del markup itself.
pub fn highlight_for(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Renumber => "cyan",
        ChangeKind::IntextStyleConversion | ChangeKind::ReferenceSectionEdit => "green",
        ChangeKind::Delete => "red",
        ChangeKind::ReferenceReorder => "yellow",
    }
}

pub const DELETION_HIGHLIGHT: &str = "red";
pub const SWAP_HIGHLIGHT: &str = "yellow";

fn del_open(ids: &mut RevisionIdAllocator, rev: &RevisionSettings) -> String {
    format!(
        r#"<w:del w:id="{}" w:author="{}" w:date="{}">"#,
        ids.next_id(),
        escape(rev.author.as_str()),
        escape(rev.date_time.as_str()),
    )
}

fn ins_open(ids: &mut RevisionIdAllocator, rev: &RevisionSettings) -> String {
    format!(
        r#"<w:ins w:id="{}" w:author="{}" w:date="{}">"#,
        ids.next_id(),
        escape(rev.author.as_str()),
        escape(rev.date_time.as_str()),
    )
}

/// Deletion block holding already-escaped old text, highlighted red.
fn del_block(
    old_text_raw: &str,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
) -> String {
    format!(
        r#"{}<w:r><w:rPr><w:highlight w:val="{DELETION_HIGHLIGHT}"/></w:rPr><w:delText xml:space="preserve">{old_text_raw}</w:delText></w:r></w:del>"#,
        del_open(ids, rev),
    )
}

/// Insertion block holding the new text, highlighted per change kind.
fn ins_block(
    new_text: &str,
    color: &str,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
) -> String {
    format!(
        r#"{}<w:r><w:rPr><w:highlight w:val="{color}"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:ins>"#,
        ins_open(ids, rev),
        escape_text(new_text),
    )
}

/// Replace one combined-text span with new text (or delete it), emitting
/// revision markup or a clean substitution. Returns the new working XML;
/// the caller rebuilds the segment index afterwards, because every offset
/// downstream of the edit has shifted.
#[allow(clippy::too_many_arguments)]
pub fn apply_span_edit(
    xml: &str,
    index: &TextSegmentIndex,
    span: Range<usize>,
    new_text: Option<&str>,
    kind: ChangeKind,
    accept: bool,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
    limits: &ScanLimits,
) -> String {
    let slices = index.slices(span.clone());
    if slices.is_empty() {
        return xml.to_string();
    }

    let old_text_raw = index.combined_text()[span].to_string();
    let mut out = xml.to_string();

    // Later slices first, so earlier offsets stay valid.
    for slice in slices.iter().skip(1).rev() {
        out.replace_range(index.abs_range(slice), "");
    }

    let first = &slices[0];
    let first_abs = index.abs_range(first);
    let first_seg = &index.segments()[first.index];

    if accept {
        let replacement = new_text.map(escape_text).unwrap_or_default();
        out.replace_range(first_abs, &replacement);
    } else {
        let mut patch = String::new();
        patch.push_str("</w:t></w:r>");
        patch.push_str(&del_block(&old_text_raw, ids, rev));
        if let Some(new_text) = new_text {
            patch.push_str(&ins_block(new_text, highlight_for(kind), ids, rev));
        }
        patch.push_str("<w:r>");
        if let Some(rpr) = &first_seg.rpr {
            patch.push_str(rpr);
        }
        patch.push_str(r#"<w:t xml:space="preserve">"#);
        out.replace_range(first_abs, &patch);
    }

    // Substitution can leave behind runs whose text is now empty; prune
    // them, but only inside the window this edit touched.
    let window_start = first_seg.run_start;
    let last_seg = &index.segments()[slices.last().expect("non-empty").index];
    let delta = out.len() as isize - xml.len() as isize;
    let window_end = (last_seg.run_end as isize + delta) as usize;
    prune_empty_runs_in(&mut out, window_start..window_end, limits);

    out
}

/// Remove runs within the window whose only content is empty text nodes.
fn prune_empty_runs_in(xml: &mut String, window: Range<usize>, limits: &ScanLimits) {
    let end = window.end.min(xml.len());
    let start = window.start.min(end);
    let region = xml[start..end].to_string();

    let mut removals: Vec<Range<usize>> = Vec::new();
    for run in scan_runs(&region, limits) {
        if run.has_other_content || run.texts.is_empty() {
            continue;
        }
        if run.texts.iter().all(|t| t.is_empty()) {
            removals.push((start + run.start)..(start + run.end));
        }
    }
    for removal in removals.into_iter().rev() {
        xml.replace_range(removal, "");
    }
}

/// Mark a whole paragraph deleted: every run's text becomes `w:delText`
/// wrapped in `w:del`, and the paragraph mark itself is marked deleted so
/// accepting the revision removes the empty paragraph too.
pub fn strike_paragraph(
    raw: &str,
    ids: &mut RevisionIdAllocator,
    rev: &RevisionSettings,
    limits: &ScanLimits,
) -> String {
    let mut out = raw.to_string();

    // Ids are allocated in document order: paragraph mark first, then one
    // per run; the splicing below runs back-to-front.
    let mark_id = ids.next_id();
    let runs = scan_runs(raw, limits);
    let del_opens: Vec<String> = runs.iter().map(|_| del_open(ids, rev)).collect();

    for (run, del_open_tag) in runs.iter().zip(&del_opens).rev() {
        out.insert_str(run.end, "</w:del>");

        for content in run.texts.iter().rev() {
            if raw[content.end..].starts_with("</w:t>") {
                out.replace_range(content.end..content.end + 6, "</w:delText>");
            }
            if let Some(tag_start) = raw[..content.start].rfind("<w:t") {
                out.replace_range(tag_start..tag_start + 4, "<w:delText");
            }
        }

        match &run.rpr {
            Some(rpr) => {
                let insert_at = rpr.end - "</w:rPr>".len();
                out.insert_str(
                    insert_at,
                    r#"<w:highlight w:val="red"/>"#,
                );
            }
            None => {
                if let Some(gt) = raw[run.start..].find('>') {
                    out.insert_str(
                        run.start + gt + 1,
                        r#"<w:rPr><w:highlight w:val="red"/></w:rPr>"#,
                    );
                }
            }
        }

        out.insert_str(run.start, del_open_tag);
    }

    strike_paragraph_mark(&mut out, mark_id, rev);
    out
}

/// Mark the paragraph mark (pilcrow) deleted via `pPr/rPr/del`.
fn strike_paragraph_mark(out: &mut String, mark_id: i32, rev: &RevisionSettings) {
    let del = format!(
        r#"<w:del w:id="{mark_id}" w:author="{}" w:date="{}"/>"#,
        escape(rev.author.as_str()),
        escape(rev.date_time.as_str()),
    );

    if let Some(ppr_at) = out.find("<w:pPr>") {
        if let Some(close) = out[ppr_at..].find("</w:pPr>") {
            let ppr_end = ppr_at + close;
            // A run-level rPr found past the pPr block belongs to a run,
            // not to the paragraph mark.
            match out[ppr_at..ppr_end].find("<w:rPr>") {
                Some(rpr_at) => out.insert_str(ppr_at + rpr_at + 7, &del),
                None => out.insert_str(ppr_end, &format!("<w:rPr>{del}</w:rPr>")),
            }
            return;
        }
    }

    // No pPr: create one right after the paragraph open tag.
    if let Some(p_at) = out.find("<w:p") {
        if let Some(gt) = out[p_at..].find('>') {
            out.insert_str(
                p_at + gt + 1,
                &format!("<w:pPr><w:rPr>{del}</w:rPr></w:pPr>"),
            );
        }
    }
}

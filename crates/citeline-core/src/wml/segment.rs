use crate::wml::settings::ScanLimits;
use memchr::memchr;
use memchr::memmem;
use std::ops::Range;

/// One `w:t` text node inside a run, with raw byte offsets into the working
/// XML string. Segments are a derived, short-lived view: any structural edit
/// upstream of a segment invalidates its offsets, so the index is rebuilt
/// after every multi-segment replacement.
#[derive(Debug, Clone)]
pub struct TextSegment {
    /// Offset of `<` of the enclosing `<w:r>` open tag.
    pub run_start: usize,
    /// Offset one past the enclosing `</w:r>`.
    pub run_end: usize,
    /// Raw `<w:rPr>...</w:rPr>` block of the enclosing run, when present.
    pub rpr: Option<String>,
    /// First byte of text content inside the `w:t` element.
    pub content_start: usize,
    /// One past the last content byte.
    pub content_end: usize,
    /// Raw (entity-escaped) content, identical to `xml[content_start..content_end]`.
    pub text: String,
}

/// Portion of one segment covered by a combined-text span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSlice {
    pub index: usize,
    /// Byte range local to the segment's text.
    pub local: Range<usize>,
}

/// Offset-stable combined-text view over all text-bearing runs of an XML
/// region. Lets the engine treat text that the word processor split across
/// runs as one logical string.
pub struct TextSegmentIndex {
    segments: Vec<TextSegment>,
    /// Cumulative start of each segment's text within `combined`.
    offsets: Vec<usize>,
    combined: String,
}

/// Raw span of one run, shared by the index, the empty-run pruner, and the
/// paragraph striker.
#[derive(Debug, Clone)]
pub struct RunSpan {
    pub start: usize,
    pub end: usize,
    pub rpr: Option<Range<usize>>,
    /// `(content_start, content_end)` of each `w:t` in the run.
    pub texts: Vec<Range<usize>>,
    /// Whether the run contains non-text content (breaks, tabs, drawings).
    pub has_other_content: bool,
}

impl TextSegmentIndex {
    pub fn build(xml: &str, limits: &ScanLimits) -> Self {
        let mut segments = Vec::new();
        let mut offsets = Vec::new();
        let mut combined = String::new();

        for run in scan_runs(xml, limits) {
            let rpr = run.rpr.as_ref().map(|r| xml[r.clone()].to_string());
            for content in &run.texts {
                if content.is_empty() {
                    continue;
                }
                let text = &xml[content.clone()];
                offsets.push(combined.len());
                combined.push_str(text);
                segments.push(TextSegment {
                    run_start: run.start,
                    run_end: run.end,
                    rpr: rpr.clone(),
                    content_start: content.start,
                    content_end: content.end,
                    text: text.to_string(),
                });
            }
        }

        Self {
            segments,
            offsets,
            combined,
        }
    }

    pub fn combined_text(&self) -> &str {
        &self.combined
    }

    pub fn segments(&self) -> &[TextSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Map a combined-text byte offset to `(segment index, local offset)`.
    pub fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        if offset >= self.combined.len() {
            return None;
        }
        let idx = match self.offsets.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Some((idx, offset - self.offsets[idx]))
    }

    /// Decompose a combined-text span into per-segment covered ranges,
    /// in segment order.
    pub fn slices(&self, span: Range<usize>) -> Vec<SegmentSlice> {
        let mut out = Vec::new();
        if span.start >= span.end {
            return out;
        }
        for (i, seg) in self.segments.iter().enumerate() {
            let seg_start = self.offsets[i];
            let seg_end = seg_start + seg.text.len();
            if seg_end <= span.start {
                continue;
            }
            if seg_start >= span.end {
                break;
            }
            let local_start = span.start.max(seg_start) - seg_start;
            let local_end = span.end.min(seg_end) - seg_start;
            out.push(SegmentSlice {
                index: i,
                local: local_start..local_end,
            });
        }
        out
    }

    /// Absolute XML byte range covered by a slice.
    pub fn abs_range(&self, slice: &SegmentSlice) -> Range<usize> {
        let seg = &self.segments[slice.index];
        (seg.content_start + slice.local.start)..(seg.content_start + slice.local.end)
    }
}

/// Walk all runs in a region. Single forward pass; attribute regions and
/// per-run text content are capped so adversarial input cannot inflate the
/// scan beyond linear cost.
pub fn scan_runs(xml: &str, limits: &ScanLimits) -> Vec<RunSpan> {
    let bytes = xml.as_bytes();
    let run_open = memmem::Finder::new(b"<w:r");
    let run_close = memmem::Finder::new(b"</w:r>");
    let mut runs = Vec::new();
    let mut pos = 0;

    while let Some(found) = run_open.find(&bytes[pos..]) {
        let start = pos + found;
        let after = start + 4;
        // Reject <w:rPr, <w:rsid..., etc.
        match bytes.get(after).copied() {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {}
            _ => {
                pos = after;
                continue;
            }
        }

        let attr_window_end = (after + limits.max_attr_len).min(bytes.len());
        let Some(gt) = memchr(b'>', &bytes[after..attr_window_end]) else {
            pos = after;
            continue;
        };
        let open_end = after + gt + 1;
        if bytes[open_end - 2] == b'/' {
            // Self-closing empty run.
            pos = open_end;
            continue;
        }

        let Some(close) = run_close.find(&bytes[open_end..]) else {
            break;
        };
        let body_start = open_end;
        let body_end = open_end + close;
        let end = body_end + 6;

        runs.push(scan_run_body(xml, limits, start, body_start, body_end, end));
        pos = end;
    }

    runs
}

fn scan_run_body(
    xml: &str,
    limits: &ScanLimits,
    start: usize,
    body_start: usize,
    body_end: usize,
    end: usize,
) -> RunSpan {
    let bytes = xml.as_bytes();
    let body = &xml[body_start..body_end];

    let rpr = body.trim_start().starts_with("<w:rPr").then(|| {
        let rel = body.find("<w:rPr").expect("checked by starts_with");
        body.find("</w:rPr>")
            .map(|close| (body_start + rel)..(body_start + close + 8))
    });
    let rpr = rpr.flatten();

    let mut texts = Vec::new();
    let mut has_other_content = false;
    let t_open = memmem::Finder::new(b"<w:t");
    let mut cursor = body_start;

    while let Some(found) = t_open.find(&bytes[cursor..body_end]) {
        let t_start = cursor + found;
        let after = t_start + 4;
        match bytes.get(after).copied() {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {}
            _ => {
                // <w:tab/> and friends count as non-text run content.
                if bytes.get(after) == Some(&b'a') {
                    has_other_content = true;
                }
                cursor = after;
                continue;
            }
        }

        let attr_window_end = (after + limits.max_attr_len).min(body_end);
        let Some(gt) = memchr(b'>', &bytes[after..attr_window_end]) else {
            cursor = after;
            continue;
        };
        let open_end = after + gt + 1;
        if bytes[open_end - 2] == b'/' {
            texts.push(open_end..open_end);
            cursor = open_end;
            continue;
        }

        let close_window_end = (open_end + limits.max_run_text_len + 7).min(body_end);
        let Some(close) = memmem::find(&bytes[open_end..close_window_end], b"</w:t>") else {
            // Content over the cap: leave the run untouched rather than
            // indexing a truncated view of it.
            cursor = open_end;
            continue;
        };
        texts.push(open_end..(open_end + close));
        cursor = open_end + close + 6;
    }

    for marker in ["<w:br", "<w:drawing", "<w:pict", "<w:object", "<w:fldChar", "<w:sym"] {
        if body.contains(marker) {
            has_other_content = true;
            break;
        }
    }

    RunSpan {
        start,
        end,
        rpr,
        texts,
        has_other_content,
    }
}

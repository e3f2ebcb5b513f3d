use crate::wml::segment::TextSegmentIndex;
use crate::wml::settings::ScanLimits;
use memchr::memmem;

/// One paragraph of the working XML string: stable identifier when the
/// document carries one, concatenated run text, and the raw byte range.
/// Paragraph granularity is what reference deletion operates on; it is more
/// reliable than span-level deletion for whole entries.
#[derive(Debug, Clone)]
pub struct ParagraphInfo {
    pub para_id: Option<String>,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl ParagraphInfo {
    pub fn raw<'a>(&self, xml: &'a str) -> &'a str {
        &xml[self.start..self.end]
    }
}

/// Split a region into top-level paragraphs. Paragraphs nested inside text
/// boxes are folded into their host paragraph via depth tracking.
pub fn split_paragraphs(xml: &str, limits: &ScanLimits) -> Vec<ParagraphInfo> {
    let bytes = xml.as_bytes();
    let p_open = memmem::Finder::new(b"<w:p");
    let mut paragraphs = Vec::new();
    let mut pos = 0;

    while let Some(found) = p_open.find(&bytes[pos..]) {
        let start = pos + found;
        let after = start + 4;
        match bytes.get(after).copied() {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {}
            _ => {
                pos = after;
                continue;
            }
        }

        let attr_window_end = (after + limits.max_attr_len).min(bytes.len());
        let Some(gt) = memchr::memchr(b'>', &bytes[after..attr_window_end]) else {
            pos = after;
            continue;
        };
        let open_end = after + gt + 1;
        if bytes[open_end - 2] == b'/' {
            // Empty self-closing paragraph.
            paragraphs.push(ParagraphInfo {
                para_id: extract_para_id(&xml[start..open_end]),
                text: String::new(),
                start,
                end: open_end,
            });
            pos = open_end;
            continue;
        }

        let Some(end) = find_matching_close(xml, open_end, limits) else {
            break;
        };

        let para_id = extract_para_id(&xml[start..open_end]);
        let region = &xml[start..end];
        let text = TextSegmentIndex::build(region, limits)
            .combined_text()
            .to_string();

        paragraphs.push(ParagraphInfo {
            para_id,
            text,
            start,
            end,
        });
        pos = end;
    }

    paragraphs
}

/// Find the `</w:p>` closing the paragraph opened just before `from`,
/// counting nested paragraph opens (text-box content).
fn find_matching_close(xml: &str, from: usize, limits: &ScanLimits) -> Option<usize> {
    let bytes = xml.as_bytes();
    let p_open = memmem::Finder::new(b"<w:p");
    let p_close = memmem::Finder::new(b"</w:p>");
    let mut depth = 0usize;
    let mut pos = from;

    loop {
        let close = p_close.find(&bytes[pos..])?;
        let close_at = pos + close;

        // Count paragraph opens between pos and the close candidate.
        let mut scan = pos;
        while let Some(found) = p_open.find(&bytes[scan..close_at]) {
            let at = scan + found;
            let after = at + 4;
            match bytes.get(after).copied() {
                Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => {
                    let attr_window_end = (after + limits.max_attr_len).min(bytes.len());
                    match memchr::memchr(b'>', &bytes[after..attr_window_end]) {
                        Some(gt) if bytes[after + gt - 1] != b'/' => depth += 1,
                        _ => {}
                    }
                }
                _ => {}
            }
            scan = after;
        }

        if depth == 0 {
            return Some(close_at + 6);
        }
        depth -= 1;
        pos = close_at + 6;
    }
}

/// Pull the `w14:paraId` attribute out of a paragraph open tag.
fn extract_para_id(open_tag: &str) -> Option<String> {
    let at = open_tag.find("w14:paraId=\"")?;
    let value_start = at + 12;
    let value_end = open_tag[value_start..].find('"')? + value_start;
    Some(open_tag[value_start..value_end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ScanLimits {
        ScanLimits::default()
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    #[test]
    fn splits_flat_paragraphs() {
        let xml = format!("<w:body>{}{}{}</w:body>", para("one"), para("two"), para("three"));
        let paras = split_paragraphs(&xml, &limits());
        assert_eq!(paras.len(), 3);
        assert_eq!(paras[0].text, "one");
        assert_eq!(paras[2].text, "three");
        assert_eq!(paras[1].raw(&xml), para("two"));
    }

    #[test]
    fn para_id_extracted() {
        let xml = r#"<w:p w14:paraId="1A2B3C4D"><w:r><w:t>x</w:t></w:r></w:p>"#;
        let paras = split_paragraphs(xml, &limits());
        assert_eq!(paras[0].para_id.as_deref(), Some("1A2B3C4D"));
    }

    #[test]
    fn nested_textbox_paragraph_stays_inside_host() {
        let xml = "<w:p><w:r><w:t>host </w:t></w:r>\
                   <w:pict><w:txbxContent><w:p><w:r><w:t>boxed</w:t></w:r></w:p></w:txbxContent></w:pict>\
                   <w:r><w:t>tail</w:t></w:r></w:p><w:p><w:r><w:t>next</w:t></w:r></w:p>";
        let paras = split_paragraphs(xml, &limits());
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].text, "host boxedtail");
        assert_eq!(paras[1].text, "next");
    }

    #[test]
    fn ppr_is_not_a_paragraph() {
        let xml = "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr><w:r><w:t>centered</w:t></w:r></w:p>";
        let paras = split_paragraphs(xml, &limits());
        assert_eq!(paras.len(), 1);
        assert_eq!(paras[0].text, "centered");
    }

    #[test]
    fn self_closing_paragraph_is_empty() {
        let xml = "<w:p/><w:p><w:r><w:t>real</w:t></w:r></w:p>";
        let paras = split_paragraphs(xml, &limits());
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].text, "");
        assert_eq!(paras[1].text, "real");
    }
}

//! Shared helpers for integration tests: minimal in-memory packages and
//! text extraction from rewritten output.
#![allow(dead_code)]

use citeline_core::wml::{ScanLimits, TextSegmentIndex};
use std::io::{Cursor, Read, Write};
use zip::read::ZipArchive;
use zip::write::ZipWriter;

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

/// Minimal package with a content-types manifest and a main document part.
pub fn build_docx(main_xml: &str) -> Vec<u8> {
    build_docx_with_parts(main_xml, &[])
}

pub fn build_docx_with_parts(main_xml: &str, extra: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        zip.start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(CONTENT_TYPES.as_bytes()).unwrap();
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(main_xml.as_bytes()).unwrap();
        for (name, content) in extra {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer.into_inner()
}

pub fn wrap_body(inner: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body>{}</w:body></w:document>",
        ),
        inner
    )
}

pub fn para(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#
    )
}

/// Paragraph whose text is distributed across several runs, simulating the
/// formatting boundaries a word processor inserts.
pub fn para_split(pieces: &[&str]) -> String {
    let runs: String = pieces
        .iter()
        .map(|p| format!(r#"<w:r><w:t xml:space="preserve">{p}</w:t></w:r>"#))
        .collect();
    format!("<w:p>{runs}</w:p>")
}

pub fn read_part(bytes: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = zip.by_name(name).ok()?;
    let mut content = Vec::new();
    file.read_to_end(&mut content).unwrap();
    Some(content)
}

pub fn document_xml(bytes: &[u8]) -> String {
    String::from_utf8(read_part(bytes, "word/document.xml").unwrap()).unwrap()
}

/// Visible text of the output document (w:t content only; deleted text in
/// w:delText is not visible).
pub fn visible_text(bytes: &[u8]) -> String {
    let xml = document_xml(bytes);
    TextSegmentIndex::build(&xml, &ScanLimits::default())
        .combined_text()
        .to_string()
}

/// All w:id values on ins/del markup, in document order.
pub fn revision_ids(xml: &str) -> Vec<i32> {
    let mut ids = Vec::new();
    for tag in ["<w:ins ", "<w:del "] {
        let mut from = 0;
        while let Some(at) = xml[from..].find(tag) {
            let abs = from + at;
            if let Some(id_at) = xml[abs..].find("w:id=\"") {
                let start = abs + id_at + 6;
                let end = xml[start..].find('"').map(|p| start + p).unwrap();
                ids.push((abs, xml[start..end].parse::<i32>().unwrap()));
            }
            from = abs + tag.len();
        }
    }
    let mut ids: Vec<(usize, i32)> = ids;
    ids.sort_by_key(|(pos, _)| *pos);
    ids.into_iter().map(|(_, id)| id).collect()
}

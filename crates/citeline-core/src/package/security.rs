use crate::error::{CitelineError, Result};
use crate::package::archive::Archive;
use tracing::debug;

pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

#[derive(Debug, Clone)]
pub struct SecurityLimits {
    /// Ceiling on archive entry count; rejects archive-bomb-style packages.
    pub max_entries: usize,
    /// Ceiling on the primary XML payload size in bytes.
    pub max_xml_bytes: usize,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_xml_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Validates and sanitizes the incoming package before anything else touches
/// it. Any failure aborts the whole operation with no partial output.
#[derive(Debug, Clone, Default)]
pub struct SecurityGate {
    pub limits: SecurityLimits,
}

impl SecurityGate {
    pub fn new(limits: SecurityLimits) -> Self {
        Self { limits }
    }

    /// Structural checks over the archive: required entries present, entry
    /// count bounded, no hostile paths, no macro content.
    pub fn validate_archive(&self, archive: &dyn Archive) -> Result<()> {
        let entries = archive.list_entries()?;

        if entries.len() > self.limits.max_entries {
            return Err(CitelineError::SizeExceeded {
                what: "archive entry count",
                limit: self.limits.max_entries,
                actual: entries.len(),
            });
        }

        for required in [MAIN_DOCUMENT_PART, CONTENT_TYPES_PART] {
            if !entries.iter().any(|e| e == required) {
                return Err(CitelineError::MissingPart {
                    part_path: required.to_string(),
                });
            }
        }

        for entry in &entries {
            if is_unsafe_entry_path(entry) {
                return Err(CitelineError::StructureInvalid {
                    message: format!("unsafe entry path: {entry}"),
                });
            }
            if is_macro_entry(entry) {
                return Err(CitelineError::StructureInvalid {
                    message: format!("macro content detected: {entry}"),
                });
            }
        }

        // Macro-enabled packages also declare themselves in the manifest.
        if let Some(manifest) = archive.read_entry(CONTENT_TYPES_PART)? {
            let manifest = String::from_utf8_lossy(&manifest);
            if manifest.contains("macroEnabled") || manifest.contains("ms-word.document.macro") {
                return Err(CitelineError::StructureInvalid {
                    message: "macro-enabled content type in manifest".to_string(),
                });
            }
        }

        debug!(entries = entries.len(), "archive passed structural checks");
        Ok(())
    }

    /// Size-bound and sanitize the primary XML payload, then confirm the
    /// result is still well-formed. roxmltree performs no external entity
    /// resolution, so nothing stripped here can be resurrected downstream.
    pub fn sanitize_xml(&self, bytes: &[u8]) -> Result<String> {
        if bytes.len() > self.limits.max_xml_bytes {
            return Err(CitelineError::SizeExceeded {
                what: "document XML payload",
                limit: self.limits.max_xml_bytes,
                actual: bytes.len(),
            });
        }

        let xml = String::from_utf8(bytes.to_vec()).map_err(|_| CitelineError::StructureInvalid {
            message: "document XML is not valid UTF-8".to_string(),
        })?;

        let sanitized = strip_hostile_declarations(&xml);

        roxmltree::Document::parse(&sanitized).map_err(|e| CitelineError::XmlParse {
            message: e.to_string(),
        })?;

        Ok(sanitized)
    }
}

/// Entry paths must stay inside the package: no traversal sequences, no
/// absolute paths, no protocol-qualified names.
pub fn is_unsafe_entry_path(name: &str) -> bool {
    name.contains("..")
        || name.starts_with('/')
        || name.starts_with('\\')
        || name.contains("://")
        || name.contains(':')
}

/// Macro-bearing entries are rejected outright as policy.
pub fn is_macro_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("vbaproject") || lower.contains("vbadata") || lower.ends_with(".vbs")
}

/// Strip DOCTYPE/ENTITY declarations, parameter-entity references, and
/// processing instructions other than the XML declaration.
fn strip_hostile_declarations(xml: &str) -> String {
    let bytes = xml.as_bytes();
    let mut out = String::with_capacity(xml.len());
    let mut i = 0;

    while i < bytes.len() {
        let rest = &xml[i..];

        if rest.starts_with("<!DOCTYPE") || rest.starts_with("<!ENTITY") {
            i += skip_markup_declaration(rest);
            continue;
        }

        if rest.starts_with("<?") {
            let end = rest.find("?>").map(|p| p + 2).unwrap_or(rest.len());
            let target = rest[2..]
                .split(|c: char| c.is_whitespace() || c == '?')
                .next()
                .unwrap_or("");
            if target == "xml" {
                out.push_str(&rest[..end]);
            }
            i += end;
            continue;
        }

        if rest.starts_with('%') {
            // Parameter-entity reference: %name;
            if let Some(semi) = rest.find(';') {
                let name = &rest[1..semi];
                if !name.is_empty()
                    && semi <= 64
                    && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
                {
                    i += semi + 1;
                    continue;
                }
            }
        }

        let ch = rest.chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

/// Length of a `<!...>` declaration, honoring a bracketed internal subset.
fn skip_markup_declaration(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'>' if depth == 0 => return i + 1,
            _ => {}
        }
        i += 1;
    }
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_paths_detected() {
        assert!(is_unsafe_entry_path("../etc/passwd"));
        assert!(is_unsafe_entry_path("/absolute/path"));
        assert!(is_unsafe_entry_path("file://host/share"));
        assert!(is_unsafe_entry_path("C:\\windows"));
        assert!(!is_unsafe_entry_path("word/document.xml"));
    }

    #[test]
    fn macro_entries_detected() {
        assert!(is_macro_entry("word/vbaProject.bin"));
        assert!(is_macro_entry("word/vbaData.xml"));
        assert!(!is_macro_entry("word/document.xml"));
    }

    #[test]
    fn doctype_and_entities_stripped() {
        let xml = r#"<?xml version="1.0"?><!DOCTYPE doc [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><doc>ok</doc>"#;
        let result = strip_hostile_declarations(xml);
        assert!(!result.contains("DOCTYPE"));
        assert!(!result.contains("ENTITY"));
        assert!(result.contains("<doc>ok</doc>"));
        assert!(result.starts_with("<?xml"));
    }

    #[test]
    fn suspicious_processing_instructions_stripped() {
        let xml = r#"<?xml version="1.0"?><?php system("id"); ?><doc/>"#;
        let result = strip_hostile_declarations(xml);
        assert!(!result.contains("php"));
        assert!(result.starts_with("<?xml"));
        assert!(result.contains("<doc/>"));
    }

    #[test]
    fn parameter_entity_references_stripped() {
        let xml = "<doc>%file;</doc>";
        let result = strip_hostile_declarations(xml);
        assert_eq!(result, "<doc></doc>");
    }

    #[test]
    fn percent_in_plain_text_preserved() {
        let xml = "<doc>50% of cases; more text</doc>";
        let result = strip_hostile_declarations(xml);
        assert!(result.contains("50%"));
    }

    #[test]
    fn sanitize_rejects_oversized_payload() {
        let gate = SecurityGate::new(SecurityLimits {
            max_entries: 10,
            max_xml_bytes: 16,
        });
        let err = gate.sanitize_xml(b"<doc>0123456789012345</doc>").unwrap_err();
        assert_eq!(err.code(), "size_exceeded");
    }

    #[test]
    fn sanitize_accepts_clean_document() {
        let gate = SecurityGate::default();
        let result = gate.sanitize_xml(b"<doc>hello</doc>").unwrap();
        assert_eq!(result, "<doc>hello</doc>");
    }
}

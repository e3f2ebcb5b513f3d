use serde::{Deserialize, Serialize};

/// Caps on the bounded-cost markup scanner. Worst-case scan cost stays linear
/// in input size regardless of adversarial attribute or run-text lengths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanLimits {
    /// Maximum bytes scanned for one tag's attribute region.
    pub max_attr_len: usize,
    /// Maximum bytes of text content indexed for one run.
    pub max_run_text_len: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_attr_len: 512,
            max_run_text_len: 64 * 1024,
        }
    }
}

/// Settings for one engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Author identity stamped on revision markup. A fixed tool identity,
    /// not an end user.
    pub author: String,

    /// ISO-8601 timestamp for revision markup. Defaults to now.
    pub date_time: Option<String>,

    /// When true, edits are applied cleanly with no revision markup, exactly
    /// as if a reviewer had accepted every change.
    pub accept_changes: bool,

    /// Paragraph texts recognized as the reference-section header.
    pub section_headers: Vec<String>,

    /// Paragraph prefixes that end the reference list; everything from the
    /// first match onward is preserved verbatim.
    pub stop_markers: Vec<String>,

    /// Upper bound on occurrences rewritten for a single change request.
    pub max_replacements_per_change: usize,

    /// Cap on elements expanded from a numeric citation range like "2-4".
    pub max_range_span: usize,

    pub scan: ScanLimits,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            author: "citeline".to_string(),
            date_time: None,
            accept_changes: false,
            section_headers: vec![
                "References".to_string(),
                "Bibliography".to_string(),
                "Works Cited".to_string(),
                "Reference List".to_string(),
            ],
            stop_markers: vec![
                "correspondence".to_string(),
                "acknowledgment".to_string(),
                "acknowledgement".to_string(),
                "funding".to_string(),
                "orcid".to_string(),
                "affiliation".to_string(),
                "author contributions".to_string(),
                "conflict of interest".to_string(),
            ],
            max_replacements_per_change: 1_000,
            max_range_span: 50,
            scan: ScanLimits::default(),
        }
    }
}

impl EngineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_accept_changes(mut self, accept: bool) -> Self {
        self.accept_changes = accept;
        self
    }

    pub fn with_date_time(mut self, date_time: impl Into<String>) -> Self {
        self.date_time = Some(date_time.into());
        self
    }

    pub fn is_section_header(&self, paragraph_text: &str) -> bool {
        let text = paragraph_text.trim().trim_end_matches(':').trim();
        self.section_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(text))
    }

    pub fn is_stop_marker(&self, paragraph_text: &str) -> bool {
        let lower = paragraph_text.trim().to_lowercase();
        if lower.is_empty() {
            return false;
        }
        // Anchored at the paragraph start, so a reference whose title merely
        // mentions "funding" is not mistaken for a trailing section. ORCID
        // blocks are the exception; they rarely lead with the word.
        self.stop_markers
            .iter()
            .any(|m| lower.starts_with(m.as_str()) || (m == "orcid" && lower.contains("orcid")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_have_expected_values() {
        let settings = EngineSettings::default();
        assert_eq!(settings.author, "citeline");
        assert!(!settings.accept_changes);
        assert_eq!(settings.max_range_span, 50);
        assert_eq!(settings.section_headers.len(), 4);
    }

    #[test]
    fn builder_pattern_works() {
        let settings = EngineSettings::new()
            .with_author("tool")
            .with_accept_changes(true)
            .with_date_time("2026-01-01T00:00:00Z");
        assert_eq!(settings.author, "tool");
        assert!(settings.accept_changes);
        assert_eq!(
            settings.date_time,
            Some("2026-01-01T00:00:00Z".to_string())
        );
    }

    #[test]
    fn section_header_matching_is_case_insensitive() {
        let settings = EngineSettings::default();
        assert!(settings.is_section_header("REFERENCES"));
        assert!(settings.is_section_header("  Bibliography:  "));
        assert!(settings.is_section_header("Works cited"));
        assert!(!settings.is_section_header("Reference handling"));
    }

    #[test]
    fn stop_marker_matching() {
        let settings = EngineSettings::default();
        assert!(settings.is_stop_marker("Correspondence: Dr. Smith"));
        assert!(settings.is_stop_marker("Funding"));
        assert!(settings.is_stop_marker("Author ORCID iDs"));
        assert!(!settings.is_stop_marker("Smith, J. (2019). A title."));
    }
}

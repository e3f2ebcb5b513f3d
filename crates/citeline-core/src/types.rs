use serde::{Deserialize, Serialize};

/// One authoritative reference record, owned by the caller. The engine treats
/// these as read-only input; reorder/swap outcomes are reported through
/// [`ReplacementSummary`], never written back into the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<String>,
    pub title: String,
    #[serde(default)]
    pub journal_name: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub pages: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub sort_key: Option<String>,
    #[serde(default)]
    pub original_position: Option<usize>,
    #[serde(default)]
    pub is_swapped: bool,
    #[serde(default)]
    pub swapped_with: Option<String>,
    /// Target-style rendering of the entry body, when a style conversion was
    /// requested upstream.
    #[serde(default)]
    pub converted_text: Option<String>,
}

impl ReferenceEntry {
    /// Surname of the first author, used for paragraph matching. Handles both
    /// "Smith, J." and "Jane Smith" author renderings.
    pub fn first_author_surname(&self) -> Option<&str> {
        let first = self.authors.first()?;
        let surname = match first.split_once(',') {
            Some((before, _)) => before.trim(),
            None => first.split_whitespace().last()?.trim(),
        };
        if surname.is_empty() {
            None
        } else {
            Some(surname)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Renumber,
    Delete,
    ReferenceSectionEdit,
    ReferenceReorder,
    IntextStyleConversion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub start_offset: Option<usize>,
    #[serde(default)]
    pub is_footnote_style: Option<bool>,
    #[serde(default)]
    pub position: Option<usize>,
}

/// One requested edit, supplied by the citation intelligence service.
/// Immutable once submitted; the engine works only on its own copy of the
/// document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub kind: ChangeKind,
    pub before_text: String,
    #[serde(default)]
    pub after_text: Option<String>,
    #[serde(default)]
    pub metadata: Option<ChangeMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedEntry {
    pub from: String,
    pub to: String,
    pub count: usize,
    /// Which matching strategy located the citation. Diagnostic only.
    #[serde(default)]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwappedPair {
    pub first: String,
    pub second: String,
}

/// Aggregate outcome of one engine invocation. Non-fatal conditions land here
/// rather than being raised as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplacementSummary {
    pub changed: Vec<ChangedEntry>,
    pub orphaned: Vec<String>,
    pub unchanged: usize,
    pub references_reordered: bool,
    pub references_deleted: usize,
    pub swapped: Vec<SwappedPair>,
    pub references_not_found: Vec<String>,
    pub reference_section_found: bool,
}

impl ReplacementSummary {
    /// Changed entries win over orphan reports for the same citation text.
    /// A request that failed to match is only an orphan if no other request
    /// for the same text succeeded.
    pub fn finalize_orphans(&mut self) {
        let changed = &self.changed;
        let mut seen: Vec<String> = Vec::new();
        self.orphaned.retain(|text| {
            if changed.iter().any(|c| &c.from == text) || seen.contains(text) {
                return false;
            }
            seen.push(text.clone());
            true
        });
    }
}

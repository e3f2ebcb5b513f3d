mod author;
mod engine;
mod matcher;
mod paragraph;
mod references;
mod renderer;
mod revision;
mod segment;
mod selective;
mod settings;

pub use author::{contains_word, extract_author_token, extract_year, AuthorToken};
pub use engine::{CitationEngine, EngineOutput};
pub use matcher::{
    adapt_replacement, extract_citation_numbers, find_citation, strip_wrapping, CitationMatch,
    MatchStrategy,
};
pub use paragraph::{split_paragraphs, ParagraphInfo};
pub use references::{
    is_reference_paragraph, locate_reference_section, rebuild_reference_section, RebuildStats,
    SectionSplit,
};
pub use renderer::{apply_span_edit, highlight_for, strike_paragraph};
pub use revision::{find_max_revision_id, RevisionIdAllocator, RevisionSettings};
pub use segment::{scan_runs, RunSpan, SegmentSlice, TextSegment, TextSegmentIndex};
pub use selective::{apply_selective_edits, SelectiveEdit, SelectiveStats};
pub use settings::{EngineSettings, ScanLimits};

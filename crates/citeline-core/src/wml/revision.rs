use memchr::memmem;

/// Identity stamped on revision markup: a fixed tool identity and an
/// ISO-8601 timestamp, never an end user.
#[derive(Debug, Clone)]
pub struct RevisionSettings {
    pub author: String,
    pub date_time: String,
}

impl Default for RevisionSettings {
    fn default() -> Self {
        Self {
            author: "citeline".to_string(),
            date_time: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

impl RevisionSettings {
    pub fn new(author: impl Into<String>, date_time: Option<String>) -> Self {
        Self {
            author: author.into(),
            date_time: date_time
                .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        }
    }
}

/// Allocates revision identifiers, unique and strictly increasing within one
/// invocation. Owned by the invocation, not a process-wide counter, so
/// concurrent documents never interleave id sequences.
#[derive(Debug)]
pub struct RevisionIdAllocator {
    next: i32,
}

impl RevisionIdAllocator {
    pub fn new(start: i32) -> Self {
        Self { next: start }
    }

    /// Start numbering above any id already present in the document.
    pub fn seeded_from(xml: &str) -> Self {
        Self {
            next: find_max_revision_id(xml) + 1,
        }
    }

    pub fn next_id(&mut self) -> i32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next call will return; lets callers detect whether any
    /// revision markup was emitted since a checkpoint.
    pub fn current(&self) -> i32 {
        self.next
    }
}

/// Largest `w:id` attribute value present in the markup, or 0.
pub fn find_max_revision_id(xml: &str) -> i32 {
    let bytes = xml.as_bytes();
    let finder = memmem::Finder::new(b"w:id=\"");
    let mut max_id = 0;
    let mut pos = 0;

    while let Some(found) = finder.find(&bytes[pos..]) {
        let start = pos + found + 6;
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() && end - start < 10 {
            end += 1;
        }
        if end > start {
            if let Ok(id) = xml[start..end].parse::<i32>() {
                max_id = max_id.max(id);
            }
        }
        pos = start;
    }

    max_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_settings_default() {
        let settings = RevisionSettings::default();
        assert_eq!(settings.author, "citeline");
        assert!(!settings.date_time.is_empty());
    }

    #[test]
    fn allocator_is_strictly_increasing() {
        let mut ids = RevisionIdAllocator::new(100);
        assert_eq!(ids.next_id(), 100);
        assert_eq!(ids.next_id(), 101);
        assert_eq!(ids.next_id(), 102);
    }

    #[test]
    fn seeded_from_document_markup() {
        let xml = r#"<w:ins w:id="7" w:author="x"/><w:del w:id="12" w:author="x"/>"#;
        let mut ids = RevisionIdAllocator::seeded_from(xml);
        assert_eq!(ids.next_id(), 13);
    }

    #[test]
    fn max_id_of_clean_document_is_zero() {
        assert_eq!(find_max_revision_id("<w:document/>"), 0);
        let mut ids = RevisionIdAllocator::seeded_from("<w:document/>");
        assert_eq!(ids.next_id(), 1);
    }
}

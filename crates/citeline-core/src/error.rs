use thiserror::Error;

#[derive(Error, Debug)]
pub enum CitelineError {
    #[error("Invalid document structure: {message}")]
    StructureInvalid { message: String },

    #[error("Missing required part '{part_path}' in package")]
    MissingPart { part_path: String },

    #[error("{what} exceeds limit: {actual} > {limit}")]
    SizeExceeded {
        what: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error("Insufficient memory headroom: need {required} bytes free, {available} available")]
    MemoryPressure { required: u64, available: u64 },

    #[error("Circuit breaker open for tenant '{tenant}'")]
    CircuitOpen { tenant: String },

    #[error("XML parsing error: {message}")]
    XmlParse { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

impl CitelineError {
    /// Stable machine-readable code for fatal errors, suitable for callers
    /// that route on failure class rather than display text.
    pub fn code(&self) -> &'static str {
        match self {
            CitelineError::StructureInvalid { .. } => "structure_invalid",
            CitelineError::MissingPart { .. } => "structure_invalid",
            CitelineError::SizeExceeded { .. } => "size_exceeded",
            CitelineError::MemoryPressure { .. } => "memory_pressure",
            CitelineError::CircuitOpen { .. } => "circuit_open",
            CitelineError::XmlParse { .. } => "xml_parse",
            CitelineError::Io(_) => "io",
            CitelineError::Zip(_) => "archive",
        }
    }

    /// Whether the caller may retry later with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CitelineError::MemoryPressure { .. } | CitelineError::CircuitOpen { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CitelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let err = CitelineError::StructureInvalid {
            message: "test error".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid document structure: test error");
    }

    #[test]
    fn error_codes_are_stable() {
        let err = CitelineError::CircuitOpen {
            tenant: "t1".to_string(),
        };
        assert_eq!(err.code(), "circuit_open");
        assert!(err.is_retryable());

        let err = CitelineError::SizeExceeded {
            what: "archive entry count",
            limit: 1000,
            actual: 1001,
        };
        assert_eq!(err.code(), "size_exceeded");
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_part_maps_to_structure_invalid() {
        let err = CitelineError::MissingPart {
            part_path: "word/document.xml".to_string(),
        };
        assert_eq!(err.code(), "structure_invalid");
    }
}

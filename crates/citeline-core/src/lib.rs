pub mod error;
pub mod governor;
pub mod package;
pub mod types;
pub mod util;
pub mod wml;

pub use error::{CitelineError, Result};

pub use governor::{Admission, GovernorConfig, MemoryGovernor, MemoryProbe};
pub use package::{Archive, DocxPackage, SecurityGate, SecurityLimits, ZipStore};
pub use types::{
    ChangeKind, ChangeMetadata, ChangeRequest, ChangedEntry, ReferenceEntry, ReplacementSummary,
    SwappedPair,
};
pub use wml::{CitationEngine, EngineOutput, EngineSettings};

use crate::error::{CitelineError, Result};
use crate::package::archive::{Archive, ZipStore};
use crate::package::security::{CONTENT_TYPES_PART, MAIN_DOCUMENT_PART};
use tracing::debug;

pub const SETTINGS_PART: &str = "word/settings.xml";

const SETTINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";

const MINIMAL_SETTINGS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
    r#"<w:trackChanges/>"#,
    r#"</w:settings>"#,
);

/// Word-processing package over the [`Archive`] seam: primary document part
/// access plus the settings-part toggle for revision tracking.
pub struct DocxPackage {
    store: ZipStore,
}

impl DocxPackage {
    pub fn new(store: ZipStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ZipStore {
        &self.store
    }

    pub fn document_xml(&self) -> Result<Vec<u8>> {
        self.store
            .read_entry(MAIN_DOCUMENT_PART)?
            .ok_or_else(|| CitelineError::MissingPart {
                part_path: MAIN_DOCUMENT_PART.to_string(),
            })
    }

    pub fn set_document_xml(&mut self, xml: String) {
        self.store.write_entry(MAIN_DOCUMENT_PART, xml.into_bytes());
    }

    /// Enable `w:trackChanges` in the settings part, creating the part (and
    /// its content-type override) when the package has none.
    pub fn enable_track_changes(&mut self) -> Result<()> {
        match self.store.read_entry(SETTINGS_PART)? {
            Some(bytes) => {
                let settings =
                    String::from_utf8(bytes).map_err(|_| CitelineError::StructureInvalid {
                        message: "settings part is not valid UTF-8".to_string(),
                    })?;
                if settings.contains("<w:trackChanges") {
                    return Ok(());
                }
                let patched = insert_track_changes(&settings)?;
                self.store.write_entry(SETTINGS_PART, patched.into_bytes());
            }
            None => {
                debug!("package has no settings part, creating one");
                self.store
                    .write_entry(SETTINGS_PART, MINIMAL_SETTINGS_XML.as_bytes().to_vec());
                self.declare_settings_content_type()?;
            }
        }
        Ok(())
    }

    pub fn track_changes_enabled(&self) -> Result<bool> {
        Ok(match self.store.read_entry(SETTINGS_PART)? {
            Some(bytes) => String::from_utf8_lossy(&bytes).contains("<w:trackChanges"),
            None => false,
        })
    }

    fn declare_settings_content_type(&mut self) -> Result<()> {
        let Some(bytes) = self.store.read_entry(CONTENT_TYPES_PART)? else {
            return Ok(());
        };
        let manifest = String::from_utf8_lossy(&bytes);
        if manifest.contains("/word/settings.xml") {
            return Ok(());
        }
        let Some(close) = manifest.rfind("</Types>") else {
            return Ok(());
        };
        let override_decl = format!(
            r#"<Override PartName="/word/settings.xml" ContentType="{SETTINGS_CONTENT_TYPE}"/>"#
        );
        let mut patched = String::with_capacity(manifest.len() + override_decl.len());
        patched.push_str(&manifest[..close]);
        patched.push_str(&override_decl);
        patched.push_str(&manifest[close..]);
        self.store
            .write_entry(CONTENT_TYPES_PART, patched.into_bytes());
        Ok(())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.store.serialize()
    }
}

fn insert_track_changes(settings: &str) -> Result<String> {
    let open = settings
        .find("<w:settings")
        .ok_or_else(|| CitelineError::StructureInvalid {
            message: "settings part has no w:settings root".to_string(),
        })?;
    let tag_end = settings[open..]
        .find('>')
        .map(|p| open + p + 1)
        .ok_or_else(|| CitelineError::StructureInvalid {
            message: "unterminated w:settings root tag".to_string(),
        })?;

    let mut patched = String::with_capacity(settings.len() + 18);
    patched.push_str(&settings[..tag_end]);
    patched.push_str("<w:trackChanges/>");
    patched.push_str(&settings[tag_end..]);
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::ZipWriter;

    fn minimal_package(with_settings: Option<&str>) -> ZipStore {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            zip.start_file(CONTENT_TYPES_PART, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(
                br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
            )
            .unwrap();
            zip.start_file(MAIN_DOCUMENT_PART, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<w:document/>").unwrap();
            if let Some(settings) = with_settings {
                zip.start_file(SETTINGS_PART, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(settings.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        ZipStore::in_memory(buffer.into_inner())
    }

    #[test]
    fn enable_track_changes_patches_existing_settings() {
        let mut pkg = DocxPackage::new(minimal_package(Some(
            r#"<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:zoom w:percent="100"/></w:settings>"#,
        )));
        assert!(!pkg.track_changes_enabled().unwrap());
        pkg.enable_track_changes().unwrap();
        assert!(pkg.track_changes_enabled().unwrap());
    }

    #[test]
    fn enable_track_changes_is_idempotent() {
        let mut pkg = DocxPackage::new(minimal_package(Some(
            r#"<w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:trackChanges/></w:settings>"#,
        )));
        pkg.enable_track_changes().unwrap();
        let bytes = pkg.store().read_entry(SETTINGS_PART).unwrap().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.matches("<w:trackChanges").count(), 1);
    }

    #[test]
    fn enable_track_changes_creates_missing_part() {
        let mut pkg = DocxPackage::new(minimal_package(None));
        pkg.enable_track_changes().unwrap();
        assert!(pkg.track_changes_enabled().unwrap());

        let manifest = pkg
            .store()
            .read_entry(CONTENT_TYPES_PART)
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(manifest)
            .unwrap()
            .contains("/word/settings.xml"));
    }
}

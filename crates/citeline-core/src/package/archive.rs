use crate::error::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;
use zip::read::ZipArchive;
use zip::write::ZipWriter;
use zip::CompressionMethod;

/// Narrow capability interface over the package container. The engine never
/// touches the zip library shape directly; everything goes through this seam.
pub trait Archive {
    fn list_entries(&self) -> Result<Vec<String>>;
    fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>>;
    fn write_entry(&mut self, name: &str, data: Vec<u8>);
    fn serialize(&self) -> Result<Vec<u8>>;
}

enum Backing {
    /// Whole package held in memory.
    Memory(Vec<u8>),
    /// Package spooled to a scoped temporary file; the file is removed when
    /// the store is dropped, on every exit path.
    Spooled(NamedTempFile),
}

/// Reader over either backing, so `ZipArchive` stays a single concrete type.
pub enum ZipReader<'a> {
    Memory(Cursor<&'a [u8]>),
    File(File),
}

impl Read for ZipReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ZipReader::Memory(c) => c.read(buf),
            ZipReader::File(f) => f.read(buf),
        }
    }
}

impl Seek for ZipReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            ZipReader::Memory(c) => c.seek(pos),
            ZipReader::File(f) => f.seek(pos),
        }
    }
}

/// Zip-backed [`Archive`]. Reads are served from the original backing;
/// written entries shadow originals until `serialize`, which emits the
/// original entry order with overrides applied and new entries appended.
pub struct ZipStore {
    backing: Backing,
    overrides: HashMap<String, Vec<u8>>,
}

impl ZipStore {
    pub fn in_memory(bytes: Vec<u8>) -> Self {
        Self {
            backing: Backing::Memory(bytes),
            overrides: HashMap::new(),
        }
    }

    /// Spool the package to disk and serve reads from the temporary file.
    pub fn spooled(bytes: &[u8]) -> Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            backing: Backing::Spooled(file),
            overrides: HashMap::new(),
        })
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self.backing, Backing::Spooled(_))
    }

    fn open_archive(&self) -> Result<ZipArchive<ZipReader<'_>>> {
        let reader = match &self.backing {
            Backing::Memory(bytes) => ZipReader::Memory(Cursor::new(bytes.as_slice())),
            Backing::Spooled(file) => ZipReader::File(File::open(file.path())?),
        };
        Ok(ZipArchive::new(reader)?)
    }

    fn original_names(&self) -> Result<Vec<String>> {
        let zip = self.open_archive()?;
        Ok((0..zip.len())
            .filter_map(|i| zip.name_for_index(i).map(|n| n.to_string()))
            .collect())
    }
}

impl Archive for ZipStore {
    fn list_entries(&self) -> Result<Vec<String>> {
        let mut names = self.original_names()?;
        for name in self.overrides.keys() {
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }

    fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.overrides.get(name) {
            return Ok(Some(data.clone()));
        }
        let mut zip = self.open_archive()?;
        let mut file = match zip.by_name(name) {
            Ok(f) => f,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(Some(content))
    }

    fn write_entry(&mut self, name: &str, data: Vec<u8>) {
        self.overrides.insert(name.to_string(), data);
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let original_names = self.original_names()?;

        let mut buffer = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut buffer);
        let options: zip::write::FileOptions<'_, ()> =
            zip::write::FileOptions::default().compression_method(CompressionMethod::Deflated);

        for name in &original_names {
            let content = self.read_entry(name)?.unwrap_or_default();
            writer.start_file(name, options)?;
            writer.write_all(&content)?;
        }
        for (name, content) in &self.overrides {
            if original_names.iter().any(|n| n == name) {
                continue;
            }
            writer.start_file(name, options)?;
            writer.write_all(content)?;
        }

        writer.finish()?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_zip() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            zip.start_file("a.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<a/>").unwrap();
            zip.start_file("b.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<b/>").unwrap();
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn read_and_list() {
        let store = ZipStore::in_memory(sample_zip());
        assert_eq!(store.list_entries().unwrap(), vec!["a.xml", "b.xml"]);
        assert_eq!(store.read_entry("a.xml").unwrap().unwrap(), b"<a/>");
        assert!(store.read_entry("missing.xml").unwrap().is_none());
    }

    #[test]
    fn overrides_shadow_and_roundtrip() {
        let mut store = ZipStore::in_memory(sample_zip());
        store.write_entry("a.xml", b"<patched/>".to_vec());
        store.write_entry("new.xml", b"<new/>".to_vec());

        let bytes = store.serialize().unwrap();
        let reopened = ZipStore::in_memory(bytes);
        assert_eq!(
            reopened.read_entry("a.xml").unwrap().unwrap(),
            b"<patched/>"
        );
        assert_eq!(reopened.read_entry("b.xml").unwrap().unwrap(), b"<b/>");
        assert_eq!(reopened.read_entry("new.xml").unwrap().unwrap(), b"<new/>");
    }

    #[test]
    fn spooled_store_reads_from_disk() {
        let store = ZipStore::spooled(&sample_zip()).unwrap();
        assert!(store.is_spooled());
        assert_eq!(store.read_entry("b.xml").unwrap().unwrap(), b"<b/>");
    }
}

/// Directories. They have no content; receiving one creates it.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use ferry_transfer::{Item, ItemError, ItemHeader, OpenMode, TYPE_DIRECTORY};

use crate::path::resolve;

pub struct DirectoryItem {
    path: PathBuf,
    name: String,
    open: bool,
}

impl DirectoryItem {
    pub fn local(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            open: false,
        }
    }

    pub fn from_header(root: &Path, header: &ItemHeader) -> Result<Self, ItemError> {
        let path = resolve(root, &header.name).map_err(|e| ItemError::InvalidName {
            name: header.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::local(path, header.name.clone()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Item for DirectoryItem {
    fn item_type(&self) -> &str {
        TYPE_DIRECTORY
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        0
    }

    fn open(&mut self, mode: OpenMode) -> Result<(), ItemError> {
        if mode == OpenMode::Write {
            fs::create_dir_all(&self.path)?;
        }
        self.open = true;
        Ok(())
    }

    fn read(&mut self, _max: usize) -> Result<Bytes, ItemError> {
        Ok(Bytes::new())
    }

    fn write(&mut self, _data: &[u8]) -> Result<(), ItemError> {
        Err(ItemError::Other("directories have no content".into()))
    }

    fn close(&mut self) -> Result<(), ItemError> {
        if !std::mem::take(&mut self.open) {
            return Err(ItemError::NotOpen);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let header = ItemHeader::new("photos/2024", TYPE_DIRECTORY, 0);
        let mut item = DirectoryItem::from_header(root.path(), &header).unwrap();

        assert_eq!(item.size(), 0);
        item.open(OpenMode::Write).unwrap();
        item.close().unwrap();
        assert!(root.path().join("photos/2024").is_dir());
        assert!(item.write(b"x").is_err());
    }

    #[test]
    fn test_rejects_traversal() {
        let root = tempfile::tempdir().unwrap();
        let header = ItemHeader::new("../outside", TYPE_DIRECTORY, 0);
        assert!(DirectoryItem::from_header(root.path(), &header).is_err());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferry_transfer::{
    Handler, HandlerRegistry, Item, ItemError, ItemHeader, TYPE_DIRECTORY, TYPE_FILE,
};

use crate::directory::DirectoryItem;
use crate::file::FileItem;

/// Materializes `file` and `directory` items below a receive root.
#[derive(Debug, Clone)]
pub struct FilesystemHandler {
    root: PathBuf,
}

impl FilesystemHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registry with this handler for both filesystem item types.
    pub fn registry(root: impl Into<PathBuf>) -> HandlerRegistry {
        let handler = Arc::new(Self::new(root));
        let mut registry = HandlerRegistry::new();
        registry.add(TYPE_FILE, handler.clone());
        registry.add(TYPE_DIRECTORY, handler);
        registry
    }
}

impl Handler for FilesystemHandler {
    fn create_item(
        &self,
        item_type: &str,
        header: &ItemHeader,
    ) -> Result<Box<dyn Item>, ItemError> {
        tracing::debug!(
            root = %self.root.display(),
            name = %header.name,
            item_type,
            "creating item"
        );
        match item_type {
            TYPE_FILE => Ok(Box::new(FileItem::from_header(&self.root, header)?)),
            TYPE_DIRECTORY => Ok(Box::new(DirectoryItem::from_header(&self.root, header)?)),
            other => Err(ItemError::Other(format!(
                "filesystem handler cannot create \"{}\" items",
                other
            ))),
        }
    }
}

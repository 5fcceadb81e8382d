/// Collaborators that supply and materialize transfer content.
///
/// A sender hands the engine a `Bundle` of items. A receiver resolves each
/// announced item type through a `HandlerRegistry` to create the item it
/// writes into. The engine keeps at most one item open at a time.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::header::ItemHeader;

/// Mode an item is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Failure reported by an item or handler.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid item name \"{name}\": {reason}")]
    InvalidName { name: String, reason: String },
    #[error("item is not open")]
    NotOpen,
    #[error("{0}")]
    Other(String),
}

/// A single transferable entry.
pub trait Item: Send {
    /// Type identifier announced in the item header (e.g. `"file"`).
    fn item_type(&self) -> &str;

    /// Relative name using `/` separators.
    fn name(&self) -> &str;

    /// Content size in bytes. Zero means the item has no content phase.
    fn size(&self) -> u64;

    /// Extension fields added to the item header.
    fn properties(&self) -> Map<String, Value> {
        Map::new()
    }

    fn open(&mut self, mode: OpenMode) -> Result<(), ItemError>;

    /// Read the next run of content, at most `max` bytes.
    fn read(&mut self, max: usize) -> Result<Bytes, ItemError>;

    fn write(&mut self, data: &[u8]) -> Result<(), ItemError>;

    fn close(&mut self) -> Result<(), ItemError>;
}

/// Ordered collection of items selected for one transfer.
#[derive(Default)]
pub struct Bundle {
    items: Vec<Box<dyn Item>>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: Box<dyn Item>) {
        self.items.push(item);
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all item sizes.
    pub fn total_size(&self) -> u64 {
        self.items.iter().map(|item| item.size()).sum()
    }

    pub fn item_at(&self, index: usize) -> Option<&dyn Item> {
        self.items.get(index).map(|item| item.as_ref())
    }

    pub fn item_at_mut(&mut self, index: usize) -> Option<&mut (dyn Item + 'static)> {
        self.items.get_mut(index).map(|item| item.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Item> {
        self.items.iter().map(|item| item.as_ref())
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("items", &self.items.len())
            .field("total_size", &self.total_size())
            .finish()
    }
}

/// Creates concrete items for one or more item types on the receive side.
pub trait Handler: Send + Sync {
    fn create_item(
        &self,
        item_type: &str,
        header: &ItemHeader,
    ) -> Result<Box<dyn Item>, ItemError>;
}

/// Maps item-type strings to handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `item_type`, replacing any previous handler.
    pub fn add(&mut self, item_type: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(item_type.into(), handler);
    }

    pub fn remove(&mut self, item_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.remove(item_type)
    }

    pub fn find(&self, item_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(item_type).cloned()
    }

    /// Registered type identifiers, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryHandler, MemoryItem};

    #[test]
    fn test_bundle_totals() {
        let mut bundle = Bundle::new();
        assert!(bundle.is_empty());
        bundle.add(Box::new(MemoryItem::new("a.txt", b"test".to_vec())));
        bundle.add(Box::new(MemoryItem::new("b.txt", Vec::new())));
        bundle.add(Box::new(MemoryItem::new("c.txt", vec![0u8; 10])));

        assert_eq!(bundle.item_count(), 3);
        assert_eq!(bundle.total_size(), 14);
        assert_eq!(bundle.item_at(1).map(|i| i.name()), Some("b.txt"));
        assert!(bundle.item_at(3).is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.add("text", Arc::new(MemoryHandler::new()));
        registry.add("file", Arc::new(MemoryHandler::new()));

        assert!(registry.find("text").is_some());
        assert!(registry.find("symlink").is_none());
        assert_eq!(registry.types(), vec!["file", "text"]);

        assert!(registry.remove("text").is_some());
        assert!(registry.find("text").is_none());
    }
}

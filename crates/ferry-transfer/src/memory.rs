/// In-memory items for short payloads (text snippets, generated data) and tests.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::header::{ItemHeader, TYPE_FILE};
use crate::item::{Handler, Item, ItemError, OpenMode};

/// An item written on the receive side, as collected by `MemoryHandler`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedItem {
    pub item_type: String,
    pub name: String,
    pub properties: Map<String, Value>,
    pub data: Vec<u8>,
}

type Sink = Arc<Mutex<Vec<ReceivedItem>>>;

/// Item backed by a byte buffer.
pub struct MemoryItem {
    item_type: String,
    name: String,
    properties: Map<String, Value>,
    data: Vec<u8>,
    position: usize,
    mode: Option<OpenMode>,
    sink: Option<Sink>,
}

impl MemoryItem {
    /// A `file`-typed item holding `data`.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::with_type(TYPE_FILE, name, data)
    }

    pub fn with_type(item_type: impl Into<String>, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            item_type: item_type.into(),
            name: name.into(),
            properties: Map::new(),
            data,
            position: 0,
            mode: None,
            sink: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Item for MemoryItem {
    fn item_type(&self) -> &str {
        &self.item_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn properties(&self) -> Map<String, Value> {
        self.properties.clone()
    }

    fn open(&mut self, mode: OpenMode) -> Result<(), ItemError> {
        if mode == OpenMode::Write {
            self.data.clear();
        }
        self.position = 0;
        self.mode = Some(mode);
        Ok(())
    }

    fn read(&mut self, max: usize) -> Result<Bytes, ItemError> {
        if self.mode != Some(OpenMode::Read) {
            return Err(ItemError::NotOpen);
        }
        let end = (self.position + max).min(self.data.len());
        let chunk = Bytes::copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(chunk)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ItemError> {
        if self.mode != Some(OpenMode::Write) {
            return Err(ItemError::NotOpen);
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<(), ItemError> {
        let mode = self.mode.take().ok_or(ItemError::NotOpen)?;
        if mode == OpenMode::Write {
            if let Some(sink) = &self.sink {
                let mut received = sink
                    .lock()
                    .map_err(|e| ItemError::Other(format!("sink lock poisoned: {}", e)))?;
                received.push(ReceivedItem {
                    item_type: self.item_type.clone(),
                    name: self.name.clone(),
                    properties: self.properties.clone(),
                    data: self.data.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Handler that materializes any item type as a `MemoryItem` and collects
/// every completed item.
#[derive(Clone, Default)]
pub struct MemoryHandler {
    sink: Sink,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items closed so far, in completion order.
    pub fn received(&self) -> Vec<ReceivedItem> {
        match self.sink.lock() {
            Ok(items) => items.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Handler for MemoryHandler {
    fn create_item(
        &self,
        item_type: &str,
        header: &ItemHeader,
    ) -> Result<Box<dyn Item>, ItemError> {
        let mut item = MemoryItem::with_type(item_type, header.name.clone(), Vec::new());
        item.properties = header.properties.clone();
        item.sink = Some(self.sink.clone());
        Ok(Box::new(item))
    }
}

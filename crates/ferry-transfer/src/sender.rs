/// Send side of the transfer state machine.
///
/// Emits exactly one packet per step and waits for the transport to report
/// it flushed before the next step. After the last item the sender sits in
/// `Finished` until the receiver's Success arrives.

use crate::error::TransferError;
use crate::header::{ItemHeader, TransferHeader};
use crate::item::{Bundle, ItemError, OpenMode};
use crate::logging::TransferEvent;
use crate::protocol::Packet;
use crate::transfer::{Core, ProtocolState};

/// Header keys owned by the engine; item properties may not override them.
const RESERVED_KEYS: [&str; 3] = ["name", "type", "size"];

pub(crate) struct SendSide {
    bundle: Bundle,
    /// Index of the item being sent.
    cursor: usize,
    open: bool,
    /// Size announced in the current item's header.
    size: u64,
    /// Content bytes of the current item still to send.
    remaining: u64,
    block_size: usize,
    local_name: String,
}

impl SendSide {
    pub fn new(bundle: Bundle, local_name: String, block_size: usize) -> Self {
        Self {
            bundle,
            cursor: 0,
            open: false,
            size: 0,
            remaining: 0,
            block_size,
            local_name,
        }
    }

    pub fn step(&mut self, core: &mut Core) -> Result<(), TransferError> {
        match core.protocol_state {
            ProtocolState::TransferHeader => self.send_transfer_header(core),
            ProtocolState::ItemHeader => self.send_item_header(core),
            ProtocolState::ItemContent => self.send_item_content(core),
            ProtocolState::Finished => Ok(()),
        }
    }

    /// Close the current item if one is open, ignoring close errors.
    pub fn release(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Some(item) = self.bundle.item_at_mut(self.cursor) {
            let _ = item.close();
        }
    }

    fn send_transfer_header(&mut self, core: &mut Core) -> Result<(), TransferError> {
        let header = TransferHeader {
            name: self.local_name.clone(),
            size: core.stats.bytes_total,
            count: core.stats.item_count,
        };
        let json = header.to_json().map_err(|source| TransferError::Encode {
            what: "transfer header",
            source,
        })?;

        core.log(TransferEvent::Header {
            device_name: header.name,
            bytes_total: header.size,
            item_count: header.count,
        });
        core.send_packet(Packet::json(json))?;
        core.protocol_state = if self.bundle.is_empty() {
            ProtocolState::Finished
        } else {
            ProtocolState::ItemHeader
        };
        Ok(())
    }

    fn send_item_header(&mut self, core: &mut Core) -> Result<(), TransferError> {
        let Some(item) = self.bundle.item_at_mut(self.cursor) else {
            core.protocol_state = ProtocolState::Finished;
            return Ok(());
        };

        let name = item.name().to_string();
        if let Err(source) = item.open(OpenMode::Read) {
            return Err(TransferError::ItemOpen { name, source });
        }
        self.open = true;

        let size = item.size();
        let mut header = ItemHeader::new(name.clone(), item.item_type(), size);
        for (key, value) in item.properties() {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                header.properties.insert(key, value);
            }
        }
        let item_type = item.item_type().to_string();

        let json = header.to_json().map_err(|source| TransferError::Encode {
            what: "item header",
            source,
        })?;

        core.log(TransferEvent::ItemStarted {
            index: core.stats.item_index,
            name,
            item_type,
            size,
        });
        core.send_packet(Packet::json(json))?;

        self.size = size;
        if size == 0 {
            self.finish_item(core)
        } else {
            self.remaining = size;
            core.protocol_state = ProtocolState::ItemContent;
            Ok(())
        }
    }

    fn send_item_content(&mut self, core: &mut Core) -> Result<(), TransferError> {
        let remaining = self.remaining;
        let Some(item) = self.bundle.item_at_mut(self.cursor) else {
            return Err(TransferError::ItemRead {
                name: format!("#{}", self.cursor),
                source: ItemError::NotOpen,
            });
        };

        let want = remaining.min(self.block_size as u64) as usize;
        let data = match item.read(want) {
            Ok(data) => data,
            Err(source) => {
                return Err(TransferError::ItemRead {
                    name: item.name().to_string(),
                    source,
                });
            }
        };

        if data.is_empty() {
            return Err(TransferError::ItemRead {
                name: item.name().to_string(),
                source: ItemError::Other(format!(
                    "content ended with {} bytes still announced",
                    remaining
                )),
            });
        }
        let len = data.len() as u64;
        if len > remaining {
            return Err(TransferError::SizeMismatch {
                name: item.name().to_string(),
                expected: self.size,
                received: self.size - remaining + len,
            });
        }

        core.send_packet(Packet::binary(data))?;
        self.remaining -= len;
        core.add_bytes(len);

        if self.remaining == 0 {
            self.finish_item(core)?;
        }
        Ok(())
    }

    /// Close the current item and move to the next one (or `Finished`).
    fn finish_item(&mut self, core: &mut Core) -> Result<(), TransferError> {
        if let Some(item) = self.bundle.item_at_mut(self.cursor) {
            self.open = false;
            if let Err(source) = item.close() {
                return Err(TransferError::ItemClose {
                    name: item.name().to_string(),
                    source,
                });
            }
            core.log(TransferEvent::ItemCompleted {
                index: core.stats.item_index,
                name: item.name().to_string(),
            });
        }

        self.cursor += 1;
        core.stats.item_index += 1;
        core.protocol_state = if self.cursor >= self.bundle.item_count() {
            ProtocolState::Finished
        } else {
            ProtocolState::ItemHeader
        };
        Ok(())
    }
}

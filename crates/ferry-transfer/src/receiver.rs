/// Receive side of the transfer state machine.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::TransferError;
use crate::header::{ItemHeader, TransferHeader};
use crate::item::{HandlerRegistry, Item, OpenMode};
use crate::logging::TransferEvent;
use crate::protocol::{Packet, PacketType};
use crate::transfer::{Core, ProtocolState};

/// Item currently being written.
struct Incoming {
    item: Box<dyn Item>,
    name: String,
    size: u64,
    remaining: u64,
}

pub(crate) struct ReceiveSide {
    registry: Arc<HandlerRegistry>,
    current: Option<Incoming>,
}

impl ReceiveSide {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            current: None,
        }
    }

    pub fn process(&mut self, core: &mut Core, packet: Packet) -> Result<(), TransferError> {
        match core.protocol_state {
            ProtocolState::TransferHeader => {
                expect(&packet, PacketType::Json)?;
                self.receive_transfer_header(core, &packet.payload)
            }
            ProtocolState::ItemHeader => {
                expect(&packet, PacketType::Json)?;
                self.receive_item_header(core, &packet.payload)
            }
            ProtocolState::ItemContent => {
                expect(&packet, PacketType::Binary)?;
                self.receive_item_content(core, packet.payload)
            }
            ProtocolState::Finished => Err(TransferError::UnexpectedPacket(packet.kind)),
        }
    }

    /// Close the item being written, keeping whatever content arrived.
    pub fn release(&mut self) {
        if let Some(mut incoming) = self.current.take() {
            let _ = incoming.item.close();
        }
    }

    fn receive_transfer_header(
        &mut self,
        core: &mut Core,
        payload: &[u8],
    ) -> Result<(), TransferError> {
        let header =
            TransferHeader::from_json(payload).map_err(|source| TransferError::Malformed {
                what: "transfer header",
                source,
            })?;

        core.log(TransferEvent::Header {
            device_name: header.name.clone(),
            bytes_total: header.size,
            item_count: header.count,
        });
        core.set_device_name(header.name);
        core.stats.bytes_total = header.size;
        core.stats.item_count = header.count;

        if core.stats.all_items_done() {
            core.set_success(true);
        } else {
            core.protocol_state = ProtocolState::ItemHeader;
        }
        Ok(())
    }

    fn receive_item_header(&mut self, core: &mut Core, payload: &[u8]) -> Result<(), TransferError> {
        let header = ItemHeader::from_json(payload).map_err(|source| TransferError::Malformed {
            what: "item header",
            source,
        })?;

        let item_type = header.resolved_type().to_string();
        let handler = self
            .registry
            .find(&item_type)
            .ok_or_else(|| TransferError::UnrecognizedItemType(item_type.clone()))?;

        let mut item = handler
            .create_item(&item_type, &header)
            .map_err(|source| TransferError::ItemCreate {
                name: header.name.clone(),
                source,
            })?;
        item.open(OpenMode::Write)
            .map_err(|source| TransferError::ItemOpen {
                name: header.name.clone(),
                source,
            })?;

        let size = header.content_size();
        core.log(TransferEvent::ItemStarted {
            index: core.stats.item_index,
            name: header.name.clone(),
            item_type,
            size,
        });

        self.current = Some(Incoming {
            item,
            name: header.name,
            size,
            remaining: size,
        });

        if size == 0 {
            self.complete_item(core)
        } else {
            core.protocol_state = ProtocolState::ItemContent;
            Ok(())
        }
    }

    fn receive_item_content(&mut self, core: &mut Core, payload: Bytes) -> Result<(), TransferError> {
        let Some(incoming) = self.current.as_mut() else {
            return Err(TransferError::UnexpectedPacket(PacketType::Binary));
        };

        let len = payload.len() as u64;
        if len > incoming.remaining {
            return Err(TransferError::SizeMismatch {
                name: incoming.name.clone(),
                expected: incoming.size,
                received: incoming.size - incoming.remaining + len,
            });
        }
        incoming
            .item
            .write(&payload)
            .map_err(|source| TransferError::ItemWrite {
                name: incoming.name.clone(),
                source,
            })?;
        incoming.remaining -= len;
        let done = incoming.remaining == 0;

        core.add_bytes(len);
        if done {
            self.complete_item(core)?;
        }
        Ok(())
    }

    /// Close the current item and advance; finishes the transfer after the last one.
    fn complete_item(&mut self, core: &mut Core) -> Result<(), TransferError> {
        if let Some(mut incoming) = self.current.take() {
            incoming
                .item
                .close()
                .map_err(|source| TransferError::ItemClose {
                    name: incoming.name.clone(),
                    source,
                })?;
            core.log(TransferEvent::ItemCompleted {
                index: core.stats.item_index,
                name: incoming.name,
            });
        }

        core.stats.item_index += 1;
        if core.stats.all_items_done() {
            core.set_success(true);
        } else {
            core.protocol_state = ProtocolState::ItemHeader;
        }
        Ok(())
    }
}

fn expect(packet: &Packet, kind: PacketType) -> Result<(), TransferError> {
    if packet.kind == kind {
        Ok(())
    } else {
        Err(TransferError::UnexpectedPacket(packet.kind))
    }
}

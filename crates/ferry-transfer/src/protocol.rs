/// Packet framing for the transfer protocol.
///
/// ```text
/// [0..4]  Frame length (i32 LE), counts the type byte plus payload, always >= 1
/// [4]     Packet type (u8)
/// [5..]   Payload (length - 1 bytes)
/// ```
///
/// Frames ride on an ordered byte stream, so a frame may arrive split at any
/// point. `PacketDecoder` buffers input and yields whole packets in order.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the little-endian length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Size of the packet type field.
pub const TYPE_SIZE: usize = 1;

/// Default number of content bytes read from an item per Binary packet.
pub const BLOCK_SIZE: usize = 65536;

/// Largest block size a transfer may be configured with (4 MB).
pub const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Largest frame length accepted from a peer (16 MB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Wire codes for the four packet types.
pub const TYPE_SUCCESS: u8 = 0;
pub const TYPE_ERROR: u8 = 1;
pub const TYPE_JSON: u8 = 2;
pub const TYPE_BINARY: u8 = 3;

/// Packet type carried in the byte after the length prefix.
///
/// Codes outside the known range still decode; the state machine decides
/// that they are unexpected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Receiver confirms every item arrived. No payload.
    Success,
    /// Either peer aborts the transfer. UTF-8 message payload.
    Error,
    /// UTF-8 JSON document (transfer and item headers).
    Json,
    /// Opaque item content.
    Binary,
    Unknown(u8),
}

impl PacketType {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => TYPE_SUCCESS,
            Self::Error => TYPE_ERROR,
            Self::Json => TYPE_JSON,
            Self::Binary => TYPE_BINARY,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u8> for PacketType {
    fn from(code: u8) -> Self {
        match code {
            TYPE_SUCCESS => Self::Success,
            TYPE_ERROR => Self::Error,
            TYPE_JSON => Self::Json,
            TYPE_BINARY => Self::Binary,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Json => write!(f, "json"),
            Self::Binary => write!(f, "binary"),
            Self::Unknown(code) => write!(f, "unknown(0x{:02x})", code),
        }
    }
}

/// One typed unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(kind: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(PacketType::Success, Bytes::new())
    }

    pub fn error(message: &str) -> Self {
        Self::new(PacketType::Error, Bytes::copy_from_slice(message.as_bytes()))
    }

    pub fn json(document: Vec<u8>) -> Self {
        Self::new(PacketType::Json, document)
    }

    pub fn binary(content: Bytes) -> Self {
        Self::new(PacketType::Binary, content)
    }

    /// Payload interpreted as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Serialize into a complete frame.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        encode_packet(self.kind, &self.payload)
    }
}

/// Encode a frame: length (payload + 1, i32 LE), type byte, payload.
///
/// Fails for frames a peer's decoder would reject as too long.
pub fn encode_packet(kind: PacketType, payload: &[u8]) -> Result<Bytes, FrameError> {
    let len = payload.len() + TYPE_SIZE;
    let wire_len = i32::try_from(len)
        .ok()
        .filter(|_| len <= MAX_FRAME_LEN)
        .ok_or(FrameError::TooLarge(len))?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + len);
    buf.put_i32_le(wire_len);
    buf.put_u8(kind.code());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Fatal framing violations. The stream cannot be resynchronised after one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("invalid packet received: zero-length frame")]
    ZeroLength,
    #[error("invalid packet received: frame length {0} out of range")]
    OutOfRange(i64),
    #[error("packet too large: frame length {0} exceeds the limit")]
    TooLarge(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingLength,
    AwaitingBody(usize),
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct PacketDecoder {
    buf: BytesMut,
    state: DecodeState,
    failed: Option<FrameError>,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: DecodeState::AwaitingLength,
            failed: None,
        }
    }

    /// Append received bytes without decoding.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet consumed by a packet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete packet, if one is buffered.
    ///
    /// Once a framing error is returned, every later call returns it again.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, FrameError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        loop {
            match self.state {
                DecodeState::AwaitingLength => {
                    if self.buf.len() < LENGTH_PREFIX {
                        return Ok(None);
                    }
                    let len = self.buf.get_i32_le();
                    let err = match len {
                        0 => Some(FrameError::ZeroLength),
                        n if n < 0 || n as usize > MAX_FRAME_LEN => {
                            Some(FrameError::OutOfRange(n as i64))
                        }
                        _ => None,
                    };
                    if let Some(err) = err {
                        self.failed = Some(err.clone());
                        return Err(err);
                    }
                    self.state = DecodeState::AwaitingBody(len as usize);
                }
                DecodeState::AwaitingBody(len) => {
                    if self.buf.len() < len {
                        return Ok(None);
                    }
                    let mut body = self.buf.split_to(len);
                    let kind = PacketType::from(body.get_u8());
                    self.state = DecodeState::AwaitingLength;
                    return Ok(Some(Packet::new(kind, body.freeze())));
                }
            }
        }
    }

    /// Append bytes and decode every packet they complete, in order.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Packet>, FrameError> {
        self.extend(data);
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet()? {
            packets.push(packet);
        }
        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode_packet(PacketType::Json, b"{}").unwrap();
        assert_eq!(&frame[..], &[3, 0, 0, 0, TYPE_JSON, b'{', b'}']);

        let frame = Packet::success().encode().unwrap();
        assert_eq!(&frame[..], &[1, 0, 0, 0, TYPE_SUCCESS]);
    }

    #[test]
    fn test_decode_one_byte_at_a_time() {
        let payload: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let frame = encode_packet(PacketType::Binary, &payload).unwrap();

        let mut decoder = PacketDecoder::new();
        let mut decoded = Vec::new();
        for byte in frame.iter() {
            decoded.extend(decoder.feed(&[*byte]).unwrap());
        }

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].kind, PacketType::Binary);
        assert_eq!(&decoded[0].payload[..], &payload[..]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decode_arbitrary_split_points() {
        let frame = encode_packet(PacketType::Error, b"disk full").unwrap();
        for split in 0..=frame.len() {
            let mut decoder = PacketDecoder::new();
            let mut decoded = decoder.feed(&frame[..split]).unwrap();
            decoded.extend(decoder.feed(&frame[split..]).unwrap());
            assert_eq!(decoded, vec![Packet::error("disk full")], "split at {}", split);
        }
    }

    #[test]
    fn test_decode_several_frames_in_order() {
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&Packet::json(b"{\"a\":1}".to_vec()).encode().unwrap());
        stream.extend_from_slice(&Packet::binary(Bytes::from_static(b"abc")).encode().unwrap());
        stream.extend_from_slice(&Packet::success().encode().unwrap());

        let mut decoder = PacketDecoder::new();
        let packets = decoder.feed(&stream).unwrap();
        let kinds: Vec<_> = packets.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PacketType::Json, PacketType::Binary, PacketType::Success]
        );
        assert!(packets[2].payload.is_empty());
    }

    #[test]
    fn test_zero_length_is_fatal() {
        let mut decoder = PacketDecoder::new();
        assert_eq!(decoder.feed(&[0, 0, 0, 0]), Err(FrameError::ZeroLength));
        // Later input cannot recover the stream.
        assert_eq!(
            decoder.feed(&Packet::success().encode().unwrap()),
            Err(FrameError::ZeroLength)
        );
    }

    #[test]
    fn test_negative_and_oversized_lengths() {
        let mut decoder = PacketDecoder::new();
        assert_eq!(
            decoder.feed(&(-5i32).to_le_bytes()),
            Err(FrameError::OutOfRange(-5))
        );

        let mut decoder = PacketDecoder::new();
        let too_big = (MAX_FRAME_LEN as i32) + 1;
        assert_eq!(
            decoder.feed(&too_big.to_le_bytes()),
            Err(FrameError::OutOfRange(too_big as i64))
        );
    }

    #[test]
    fn test_encode_rejects_oversized_frame() {
        let payload = vec![0u8; MAX_FRAME_LEN];
        assert_eq!(
            encode_packet(PacketType::Binary, &payload),
            Err(FrameError::TooLarge(MAX_FRAME_LEN + 1))
        );
        assert!(encode_packet(PacketType::Binary, &payload[1..]).is_ok());
    }

    #[test]
    fn test_unknown_type_still_decodes() {
        let mut decoder = PacketDecoder::new();
        let packets = decoder.feed(&[2, 0, 0, 0, 0x7f, 0xaa]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].kind, PacketType::Unknown(0x7f));
        assert_eq!(&packets[0].payload[..], &[0xaa]);
    }
}

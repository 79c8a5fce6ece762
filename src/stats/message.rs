use crate::stats::{Error, PieceIndex, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::io::Cursor;
use tokio_util::bytes::Buf;

/// The unique name of the stats extension within the extended handshake registry.
pub const EXTENSION_NAME_STATS: &str = "ut_hodlong";
/// The expected stats piece size is 16 KiB
pub const STATS_PIECE_SIZE: usize = 1024 * 16;

/// The extension protocol message for the stats extension.
/// A data message additionally carries the raw piece bytes appended after the bencoded dictionary.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsMessage {
    /// Indicates which part of the stats blob this message refers to
    pub piece: PieceIndex,
    /// The total size in bytes of the stats blob.
    /// This is only present on the data message that first establishes the size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<usize>,
    #[serde(
        serialize_with = "serialize_stats_type",
        deserialize_with = "deserialize_stats_type"
    )]
    pub msg_type: StatsMessageType,
    /// The remaining raw bytes within the stats payload message
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl StatsMessage {
    /// Create a new request message for the given piece.
    pub fn request(piece: PieceIndex) -> Self {
        Self {
            piece,
            total_size: None,
            msg_type: StatsMessageType::Request,
            data: vec![],
        }
    }

    /// Create a new data message carrying the given piece bytes.
    pub fn data(piece: PieceIndex, total_size: Option<usize>, data: Vec<u8>) -> Self {
        Self {
            piece,
            total_size,
            msg_type: StatsMessageType::Data,
            data,
        }
    }

    /// Create a new reject message for the given piece.
    pub fn reject(piece: PieceIndex) -> Self {
        Self {
            piece,
            total_size: None,
            msg_type: StatsMessageType::Reject,
            data: vec![],
        }
    }

    /// Encode this message into its wire representation.
    /// The control dictionary is bencoded and the raw piece bytes are appended verbatim.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = serde_bencode::to_bytes(self)?;
        buffer.extend_from_slice(&self.data);
        Ok(buffer)
    }

    /// Decode a message from its wire representation.
    /// The dictionary is parsed structurally and the trailer starts at the exact offset reported
    /// by the parser, so trailer bytes that contain dictionary terminators are never misinterpreted.
    pub fn decode(payload: &[u8]) -> Result<StatsMessage> {
        let mut cursor = Cursor::new(payload);
        let mut deserializer = serde_bencode::de::Deserializer::new(&mut cursor);

        let mut message: StatsMessage = Deserialize::deserialize(&mut deserializer)
            .map_err(|e| Error::Parsing(e.to_string()))?;
        message.data = cursor.chunk().to_vec();

        Ok(message)
    }
}

impl Debug for StatsMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsMessage")
            .field("piece", &self.piece)
            .field("total_size", &self.total_size)
            .field("msg_type", &self.msg_type)
            .field("data", &format!("[size {}]", self.data.len()))
            .finish()
    }
}

/// The stats action type of the message.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatsMessageType {
    Request = 0,
    Data = 1,
    Reject = 2,
}

fn serialize_stats_type<S>(
    message_type: &StatsMessageType,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(*message_type as u8)
}

fn deserialize_stats_type<'de, D>(deserializer: D) -> std::result::Result<StatsMessageType, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u8::deserialize(deserializer)?;
    match value {
        0 => Ok(StatsMessageType::Request),
        1 => Ok(StatsMessageType::Data),
        2 => Ok(StatsMessageType::Reject),
        _ => Err(de::Error::custom(format!(
            "Invalid message type {} specified",
            value
        ))),
    }
}

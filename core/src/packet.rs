//! The packet capability the interceptor needs from a host pipeline.
//!
//! # Design
//! Hosts own their packet representation; the dispatcher only reads a few
//! named fields and writes one binary field back. `Packet` captures exactly
//! that. Reads return `Option` so a field missing from this packet's schema
//! is an ordinary outcome rather than an error the caller must catch.
//!
//! `CommandPacket` is a small schema-checked implementation for hosts written
//! in Rust and for tests.

use serde::{Deserialize, Serialize};

use crate::error::FieldWriteError;

/// Conventional stream identifier field of a CCSDS command header.
pub const STREAM_ID_FIELD: &str = "CCSDS_STREAMID";
/// Conventional function code field of a CCSDS command header.
pub const FUNCTION_CODE_FIELD: &str = "CCSDS_FC";
/// Binary slot that receives the decision service's response bytes.
pub const SERIALIZED_COMMAND_FIELD: &str = "SER_CMD";
pub const SERIALIZED_COMMAND_LEN: usize = 128;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Numeric equality with an integer, across all numeric variants.
    pub fn is_integer(&self, value: i64) -> bool {
        match self {
            FieldValue::Int(v) => *v == value,
            FieldValue::UInt(v) => i64::try_from(*v).is_ok_and(|v| v == value),
            FieldValue::Float(v) => *v == value as f64,
            FieldValue::Text(_) | FieldValue::Bytes(_) => false,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Named-field access to a structured command packet.
pub trait Packet {
    fn target_name(&self) -> &str;

    fn packet_name(&self) -> &str;

    /// Current value of `name`, or `None` if this packet has no such field.
    fn read_field(&self, name: &str) -> Option<FieldValue>;

    /// Overwrite the binary field `name` with `bytes`.
    fn write_field(&mut self, name: &str, bytes: &[u8]) -> Result<(), FieldWriteError>;
}

/// Declared type of a `CommandPacket` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    UInt,
    Float,
    Text,
    /// Variable-length binary field holding at most `max_len` bytes.
    Block { max_len: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct Field {
    name: String,
    kind: FieldKind,
    value: Option<FieldValue>,
}

/// In-memory command packet with a fixed field schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPacket {
    target_name: String,
    packet_name: String,
    fields: Vec<Field>,
}

impl CommandPacket {
    pub fn new(target_name: impl Into<String>, packet_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            packet_name: packet_name.into(),
            fields: Vec::new(),
        }
    }

    /// A packet carrying the usual CCSDS header fields and a 128-byte
    /// `SER_CMD` block.
    pub fn ccsds(
        target_name: impl Into<String>,
        packet_name: impl Into<String>,
        stream_id: u64,
        function_code: u64,
    ) -> Self {
        Self::new(target_name, packet_name)
            .with_field(STREAM_ID_FIELD, FieldKind::UInt, Some(stream_id.into()))
            .with_field(FUNCTION_CODE_FIELD, FieldKind::UInt, Some(function_code.into()))
            .with_field(
                SERIALIZED_COMMAND_FIELD,
                FieldKind::Block { max_len: SERIALIZED_COMMAND_LEN },
                None,
            )
    }

    /// Declare a field, replacing any earlier declaration with the same name.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        value: Option<FieldValue>,
    ) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(Field { name, kind, value });
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.field(name).map(|f| f.kind)
    }

    /// Bytes currently held by a block field.
    pub fn block(&self, name: &str) -> Option<&[u8]> {
        match self.field(name)?.value.as_ref()? {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Packet for CommandPacket {
    fn target_name(&self) -> &str {
        &self.target_name
    }

    fn packet_name(&self) -> &str {
        &self.packet_name
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        self.field(name).and_then(|f| f.value.clone())
    }

    fn write_field(&mut self, name: &str, bytes: &[u8]) -> Result<(), FieldWriteError> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| FieldWriteError::UnknownField(name.to_string()))?;
        let FieldKind::Block { max_len } = field.kind else {
            return Err(FieldWriteError::NotABlock(name.to_string()));
        };
        if bytes.len() > max_len {
            return Err(FieldWriteError::TooLarge {
                field: name.to_string(),
                len: bytes.len(),
                max: max_len,
            });
        }
        field.value = Some(FieldValue::Bytes(bytes.to_vec()));
        Ok(())
    }
}

use bytes::BytesMut;

use crate::asciimap::{decode_map, encode_map, AsciiMap};
use crate::error::Result;
use crate::format::FormatSpec;
use crate::object::StructuredObject;
use crate::value::Value;

/// Converts one kind of message to and from bytes.
///
/// A codec is fixed for the lifetime of the channel that owns it, so the
/// message shape (arity, kinds, layout) cannot change mid-stream.
pub trait Codec: Send {
    type Message;

    /// Append the encoded message to `dst`. Nothing is appended on error.
    fn encode(&self, message: &Self::Message, dst: &mut BytesMut) -> Result<()>;

    /// Decode one complete message.
    fn decode(&self, src: &[u8]) -> Result<Self::Message>;

    /// Short description for logs and CLI output.
    fn describe(&self) -> String;
}

/// Codec for typed tuples described by a format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCodec {
    spec: FormatSpec,
}

impl FormatCodec {
    pub fn new(spec: FormatSpec) -> Self {
        Self { spec }
    }

    /// Parse `format` and build a codec for it.
    pub fn parse(format: &str) -> Result<Self> {
        FormatSpec::parse(format).map(Self::new)
    }

    pub fn spec(&self) -> &FormatSpec {
        &self.spec
    }
}

impl Codec for FormatCodec {
    type Message = Vec<Value>;

    fn encode(&self, message: &Vec<Value>, dst: &mut BytesMut) -> Result<()> {
        self.spec.encode_into(message, dst)
    }

    fn decode(&self, src: &[u8]) -> Result<Vec<Value>> {
        self.spec.decode(src)
    }

    fn describe(&self) -> String {
        format!("format {:?}", self.spec.as_str())
    }
}

/// Codec for [`StructuredObject`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCodec;

impl Codec for ObjectCodec {
    type Message = StructuredObject;

    fn encode(&self, message: &StructuredObject, dst: &mut BytesMut) -> Result<()> {
        let mut encoded = BytesMut::new();
        message.encode_into(&mut encoded)?;
        dst.unsplit(encoded);
        Ok(())
    }

    fn decode(&self, src: &[u8]) -> Result<StructuredObject> {
        StructuredObject::decode(src)
    }

    fn describe(&self) -> String {
        "object".to_string()
    }
}

/// Codec for [`AsciiMap`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsciiMapCodec;

impl Codec for AsciiMapCodec {
    type Message = AsciiMap;

    fn encode(&self, message: &AsciiMap, dst: &mut BytesMut) -> Result<()> {
        encode_map(message, dst)
    }

    fn decode(&self, src: &[u8]) -> Result<AsciiMap> {
        decode_map(src)
    }

    fn describe(&self) -> String {
        "ascii map".to_string()
    }
}

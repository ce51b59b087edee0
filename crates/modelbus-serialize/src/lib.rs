//! Message codecs for modelbus channels.
//!
//! A channel carries one of three message shapes:
//! - typed tuples described by a printf-style format string ([`FormatSpec`]),
//! - mesh-like structured objects ([`StructuredObject`]),
//! - tab-delimited key/value maps ([`AsciiMap`]).
//!
//! Each shape has a [`Codec`] that turns messages into bytes and back. The
//! codecs know nothing about transports.

pub mod asciimap;
pub mod codec;
pub mod error;
pub mod format;
pub mod object;
pub mod value;

pub use asciimap::{decode_map, encode_map, AsciiMap};
pub use codec::{AsciiMapCodec, Codec, FormatCodec, ObjectCodec};
pub use error::{Result, SerializeError};
pub use format::{FieldDescriptor, FieldKind, FloatStyle, FormatSpec, Segment};
pub use object::{StructuredObject, OBJECT_LAYOUT_VERSION, OBJECT_MAGIC};
pub use value::{FromValue, FromValues, IntoValues, Value, ValueKind};

//! Length-prefixed message framing for socket transports.
//!
//! Sockets are byte streams; models exchange discrete messages. Every
//! message on a socket link is framed with:
//! - A 2-byte magic number ("MB") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian frame kind (message or end of input)
//!
//! [`StreamTransport`] wraps a connected [`IpcStream`](modelbus_transport::IpcStream)
//! in this framing and implements the byte-channel
//! [`Transport`](modelbus_transport::Transport) contract on top of it.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
#[cfg(unix)]
pub mod stream;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use kind::{END_OF_INPUT, MESSAGE};
pub use reader::FrameReader;
#[cfg(unix)]
pub use stream::StreamTransport;
pub use writer::FrameWriter;

//! Byte-channel transports for modelbus.
//!
//! This is the lowest layer of modelbus. It moves opaque, delimited byte
//! messages between two endpoints and knows nothing about their contents:
//! - In-process memory links ([`MemoryHub`]), for models sharing a process
//! - Unix domain sockets ([`UnixDomainSocket`], [`IpcStream`]), framed by
//!   the `modelbus-frame` crate
//!
//! Every transport implements [`Transport`]; higher layers never see which
//! one they are talking to.

pub mod address;
pub mod error;
pub mod memory;
pub mod stream;
pub mod transport;

#[cfg(unix)]
pub mod uds;

pub use address::Address;
pub use error::{Result, TransportError};
pub use memory::{MemoryEndpoint, MemoryHub, Side};
pub use stream::IpcStream;
pub use transport::{CloseHandle, Transport};

#[cfg(unix)]
pub use uds::UnixDomainSocket;

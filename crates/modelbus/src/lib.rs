//! Typed channels and RPC between coupled simulation models.
//!
//! Models exchange messages over named channels without knowing how the
//! channels are provisioned. A [`Registry`] resolves names to transport
//! addresses and opens typed channels or RPC endpoints on them.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-channel transports (memory links, Unix sockets)
//! - [`frame`]: length-prefixed framing for socket transports
//! - [`serialize`]: format-string, structured-object and key/value codecs
//! - [`comm`]: channels, RPC endpoints, the registry
//!
//! ```no_run
//! use modelbus::{ChannelDirectory, Direction, Registry};
//! use modelbus::transport::Address;
//!
//! # fn main() -> modelbus::Result<()> {
//! let registry = Registry::new(
//!     ChannelDirectory::new()
//!         .with("outputA", Address::memory("a"))
//!         .with("inputA", Address::memory("a")),
//! );
//! let mut out = registry.open_format_channel("outputA", "%6s\t%d\t%f\n", Direction::Output)?;
//! let mut input = registry.open_format_channel("inputA", "%6s\t%d\t%f\n", Direction::Input)?;
//!
//! out.send_tuple(("abcdef", 42i64, 3.14f64))?;
//! let (word, count, ratio): (String, i64, f64) = input.recv_tuple()?;
//! # let _ = (word, count, ratio);
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use modelbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use modelbus_frame::*;
}

/// Re-export codec types.
pub mod serialize {
    pub use modelbus_serialize::*;
}

/// Re-export channel, RPC and registry types.
pub mod comm {
    pub use modelbus_comm::*;
}

pub use modelbus_comm::{
    Channel, ChannelConfig, ChannelDirectory, ChannelError, ClientState, Direction, ErrorKind,
    Registry, Result, RpcClient, RpcServer, ServerState, StatusExt,
};
pub use modelbus_serialize::{StructuredObject, Value};

//! Typed channels and RPC endpoints for modelbus.
//!
//! This is the layer models talk to. A [`Registry`] resolves channel names
//! to transport addresses through a [`ChannelDirectory`] and hands out:
//! - [`Channel`]s, a transport paired with a fixed codec,
//! - [`RpcClient`] / [`RpcServer`] endpoints, two channels plus request
//!   sequencing.
//!
//! Every operation returns a [`ChannelError`] on failure; end of input is a
//! distinguished kind so read loops can stop cleanly.

pub mod channel;
pub mod config;
pub mod connector;
pub mod directory;
pub mod error;
pub mod registry;
pub mod rpc;

pub use channel::{Channel, Direction, Incoming};
pub use config::ChannelConfig;
pub use connector::open_transport;
pub use directory::{ChannelDirectory, CHANNELS_ENV};
pub use error::{ChannelError, ErrorKind, Result, StatusExt};
pub use registry::{Registration, Registry};
pub use rpc::{ClientState, RpcClient, RpcServer, Sequenced, ServerState};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use modelbus_serialize::{AsciiMapCodec, Codec, FormatCodec, ObjectCodec};
use modelbus_transport::{Address, CloseHandle, MemoryHub};
use tracing::{debug, info};

use crate::channel::{Channel, Direction};
use crate::config::ChannelConfig;
use crate::connector::open_transport;
use crate::directory::ChannelDirectory;
use crate::error::{ChannelError, Result};
use crate::rpc::{RpcClient, RpcServer, Sequenced};

const REQUEST_SUFFIX: &str = "request";
const RESPONSE_SUFFIX: &str = "response";

struct LiveEntry {
    id: u64,
    close: Option<CloseHandle>,
}

#[derive(Default)]
struct LiveTable {
    entries: Mutex<BTreeMap<String, LiveEntry>>,
    next_id: AtomicU64,
}

impl LiveTable {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, LiveEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof that a name is held in a [`Registry`]. Dropping it frees the name.
pub struct Registration {
    name: String,
    id: u64,
    table: Arc<LiveTable>,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn attach(&self, close: CloseHandle) {
        if let Some(entry) = self.table.lock().get_mut(&self.name) {
            if entry.id == self.id {
                entry.close = Some(close);
            }
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut entries = self.table.lock();
        if entries.get(&self.name).is_some_and(|e| e.id == self.id) {
            entries.remove(&self.name);
            debug!(channel = %self.name, "released channel name");
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The live channels of one process, keyed by name.
///
/// Names resolve through the registry's [`ChannelDirectory`]; memory
/// addresses share the registry's [`MemoryHub`]. A name maps to at most one
/// live channel or RPC endpoint. Dropping the registry closes everything it
/// opened.
pub struct Registry {
    directory: ChannelDirectory,
    hub: MemoryHub,
    config: ChannelConfig,
    live: Arc<LiveTable>,
}

impl Registry {
    pub fn new(directory: ChannelDirectory) -> Self {
        Self::with_config(directory, ChannelConfig::default())
    }

    pub fn with_config(directory: ChannelDirectory, config: ChannelConfig) -> Self {
        Self {
            directory,
            hub: MemoryHub::new(),
            config,
            live: Arc::new(LiveTable::default()),
        }
    }

    /// Registry over the directory in `MODELBUS_CHANNELS`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ChannelDirectory::from_env()?))
    }

    /// Share memory links with another registry (models in one process).
    pub fn with_hub(mut self, hub: MemoryHub) -> Self {
        self.hub = hub;
        self
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Open a channel carrying tuples described by `format`.
    pub fn open_format_channel(
        &self,
        name: &str,
        format: &str,
        direction: Direction,
    ) -> Result<Channel<FormatCodec>> {
        let codec = FormatCodec::parse(format).map_err(|err| ChannelError::codec(name, err))?;
        self.open_channel(name, codec, direction)
    }

    /// Open a channel carrying structured objects.
    pub fn open_object_channel(
        &self,
        name: &str,
        direction: Direction,
    ) -> Result<Channel<ObjectCodec>> {
        self.open_channel(name, ObjectCodec, direction)
    }

    /// Open a channel carrying key/value maps.
    pub fn open_map_channel(
        &self,
        name: &str,
        direction: Direction,
    ) -> Result<Channel<AsciiMapCodec>> {
        self.open_channel(name, AsciiMapCodec, direction)
    }

    /// Open a channel with any codec.
    pub fn open_channel<C: Codec>(
        &self,
        name: &str,
        codec: C,
        direction: Direction,
    ) -> Result<Channel<C>> {
        let address = self.resolve(name)?;
        let registration = self.reserve(name)?;
        let transport = open_transport(name, &address, direction, &self.config, &self.hub)?;

        info!(channel = name, %direction, codec = %codec.describe(), "opened channel");
        Ok(Channel::new(name, direction, codec, transport)
            .with_config(&self.config)
            .with_registration(registration))
    }

    /// Open the calling side of an RPC endpoint.
    pub fn open_rpc_client(
        &self,
        name: &str,
        request_format: &str,
        response_format: &str,
    ) -> Result<RpcClient> {
        let (request_codec, response_codec) =
            parse_rpc_formats(name, request_format, response_format)?;
        let address = self.resolve(name)?;
        let registration = self.reserve(name)?;

        let requests = self.open_rpc_channel(
            name,
            &address,
            REQUEST_SUFFIX,
            Direction::Output,
            request_codec,
        )?;
        let responses = self.open_rpc_channel(
            name,
            &address,
            RESPONSE_SUFFIX,
            Direction::Input,
            response_codec,
        )?;

        let client = RpcClient::new(name, requests, responses);
        registration.attach(client.close_handle());
        info!(endpoint = name, "opened rpc client");
        Ok(client.with_registration(registration))
    }

    /// Open the serving side of an RPC endpoint.
    pub fn open_rpc_server(
        &self,
        name: &str,
        request_format: &str,
        response_format: &str,
    ) -> Result<RpcServer> {
        let (request_codec, response_codec) =
            parse_rpc_formats(name, request_format, response_format)?;
        let address = self.resolve(name)?;
        let registration = self.reserve(name)?;

        let requests = self.open_rpc_channel(
            name,
            &address,
            REQUEST_SUFFIX,
            Direction::Input,
            request_codec,
        )?;
        let responses = self.open_rpc_channel(
            name,
            &address,
            RESPONSE_SUFFIX,
            Direction::Output,
            response_codec,
        )?;

        let server = RpcServer::new(name, requests, responses);
        registration.attach(server.close_handle());
        info!(endpoint = name, "opened rpc server");
        Ok(server.with_registration(registration))
    }

    fn open_rpc_channel(
        &self,
        name: &str,
        address: &Address,
        suffix: &str,
        direction: Direction,
        codec: FormatCodec,
    ) -> Result<Channel<Sequenced<FormatCodec>>> {
        let label = format!("{name}.{suffix}");
        let transport = open_transport(
            &label,
            &address.derive(suffix),
            direction,
            &self.config,
            &self.hub,
        )?;
        Ok(
            Channel::new(label, direction, Sequenced::new(codec), transport)
                .with_config(&self.config),
        )
    }

    /// Whether a channel or endpoint called `name` is live.
    pub fn is_live(&self, name: &str) -> bool {
        self.live.lock().contains_key(name)
    }

    /// Names of all live channels and endpoints, sorted.
    pub fn live_channels(&self) -> Vec<String> {
        self.live.lock().keys().cloned().collect()
    }

    /// Close every live channel and endpoint and forget their names.
    ///
    /// Blocked receivers wake up with `ChannelClosed`. Returns how many were
    /// closed.
    pub fn shutdown(&self) -> usize {
        let entries = std::mem::take(&mut *self.live.lock());
        let count = entries.len();
        for (name, entry) in entries {
            if let Some(close) = entry.close {
                close.close();
            }
            debug!(channel = %name, "closed by registry shutdown");
        }
        if count > 0 {
            info!(count, "registry shut down");
        }
        count
    }

    fn resolve(&self, name: &str) -> Result<Address> {
        self.directory
            .resolve(name)
            .cloned()
            .ok_or_else(|| ChannelError::Unavailable {
                name: name.to_string(),
                reason: "name not found in channel directory".to_string(),
            })
    }

    fn reserve(&self, name: &str) -> Result<Registration> {
        let mut entries = self.live.lock();
        if entries.contains_key(name) {
            return Err(ChannelError::AlreadyOpen(name.to_string()));
        }
        let id = self.live.next_id.fetch_add(1, Ordering::Relaxed);
        entries.insert(name.to_string(), LiveEntry { id, close: None });
        Ok(Registration {
            name: name.to_string(),
            id,
            table: Arc::clone(&self.live),
        })
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("directory", &self.directory)
            .field("live", &self.live_channels())
            .finish()
    }
}

fn parse_rpc_formats(
    name: &str,
    request_format: &str,
    response_format: &str,
) -> Result<(FormatCodec, FormatCodec)> {
    let request = FormatCodec::parse(request_format).map_err(|err| ChannelError::codec(name, err))?;
    let response =
        FormatCodec::parse(response_format).map_err(|err| ChannelError::codec(name, err))?;
    Ok((request, response))
}

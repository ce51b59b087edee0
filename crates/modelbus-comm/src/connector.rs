use modelbus_transport::{Address, MemoryHub, Side, Transport};
#[cfg(unix)]
use modelbus_transport::UnixDomainSocket;
use tracing::info;

use crate::channel::Direction;
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};

/// Open the transport behind `address` for a channel called `name`.
///
/// Memory links: an output channel takes side A, an input channel side B,
/// a bidirectional one whichever side is free. Unix sockets either bind and
/// wait for one peer (`unix-listen:`) or connect, retrying until the peer
/// listens; both are bounded by `config.connect_timeout`.
pub fn open_transport(
    name: &str,
    address: &Address,
    direction: Direction,
    config: &ChannelConfig,
    hub: &MemoryHub,
) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match address {
        Address::Memory(key) => {
            let endpoint = match direction {
                Direction::Output => hub.claim(key, Side::A),
                Direction::Input => hub.claim(key, Side::B),
                Direction::Bidirectional => hub.claim_any(key),
            }
            .map_err(|err| unavailable(name, err))?;
            Box::new(endpoint)
        }
        Address::Unix { path, listen } => open_unix(name, path, *listen, config)?,
    };

    info!(
        channel = name,
        %address,
        %direction,
        transport = address.transport_name(),
        "opened transport"
    );
    Ok(transport)
}

#[cfg(unix)]
fn open_unix(
    name: &str,
    path: &std::path::Path,
    listen: bool,
    config: &ChannelConfig,
) -> Result<Box<dyn Transport>> {
    use modelbus_frame::StreamTransport;

    let stream = if listen {
        let socket = UnixDomainSocket::bind(path).map_err(|err| unavailable(name, err))?;
        socket
            .accept_timeout(config.connect_timeout)
            .map_err(|err| unavailable(name, err))?
    } else {
        UnixDomainSocket::connect_timeout(path, config.connect_timeout)
            .map_err(|err| unavailable(name, err))?
    };

    let label = format!("{name} ({})", path.display());
    let transport = StreamTransport::with_config(stream, label, config.frame_config())
        .map_err(|err| ChannelError::transport(name, err))?;
    Ok(Box::new(transport))
}

#[cfg(not(unix))]
fn open_unix(
    name: &str,
    path: &std::path::Path,
    _listen: bool,
    _config: &ChannelConfig,
) -> Result<Box<dyn Transport>> {
    Err(ChannelError::Unavailable {
        name: name.to_string(),
        reason: format!(
            "unix domain sockets are not supported on this platform ({})",
            path.display()
        ),
    })
}

fn unavailable(name: &str, err: modelbus_transport::TransportError) -> ChannelError {
    ChannelError::Unavailable {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

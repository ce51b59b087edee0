use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Unix domain socket endpoint for a `unix-listen:` address.
///
/// The listening side of a model link: binds a filesystem socket, waits for
/// the peer model to connect, and removes the socket file on drop as long as
/// the path still refers to the socket it created.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 elsewhere.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `path`, replacing a stale socket file if present.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Only ever remove a leftover socket, never a regular file.
        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.file_type().is_socket() => {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(bind_err)?;
            }
            Ok(_) => {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(bind_err(err)),
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            created_inode: (created.dev(), created.ino()),
            path,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(IpcStream::from(stream))
    }

    /// Accept an incoming connection, giving up after `timeout`.
    ///
    /// Gives up with `Unavailable` so an orchestration mistake (the peer
    /// model never starts) surfaces as a construction-time failure.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<IpcStream> {
        self.listener
            .set_nonblocking(true)
            .map_err(TransportError::Accept)?;
        let deadline = Instant::now() + timeout;

        let accepted = loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => break stream,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Unavailable {
                            address: self.path.display().to_string(),
                            reason: format!("no peer connected within {timeout:?}"),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        };

        // The accepted socket may inherit non-blocking mode on some platforms.
        accepted
            .set_nonblocking(false)
            .map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(IpcStream::from(accepted))
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(IpcStream::from(stream))
    }

    /// Connect, retrying while the peer has not bound its socket yet.
    ///
    /// Models are started independently, so the listening side may come up
    /// after the connecting side.
    pub fn connect_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<IpcStream> {
        let path = path.as_ref();
        let deadline = Instant::now() + timeout;
        loop {
            match Self::connect(path) {
                Ok(stream) => return Ok(stream),
                Err(TransportError::Connect { source, .. })
                    if is_not_ready(&source) && Instant::now() < deadline =>
                {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_not_ready(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::ConnectionRefused
    )
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket()
            && metadata.dev() == expected_dev
            && metadata.ino() == expected_ino
        {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path replaced; skipping cleanup");
        }
    }
}

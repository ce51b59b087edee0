//! Transport endpoint addresses.
//!
//! Channel names are resolved to addresses by the surrounding
//! orchestration. Textual forms:
//!
//! | form                 | meaning                                        |
//! |----------------------|------------------------------------------------|
//! | `mem:<key>`          | in-process link `<key>` in a [`MemoryHub`]     |
//! | `unix:<path>`        | connect to a Unix socket bound by the peer     |
//! | `unix-listen:<path>` | bind a Unix socket and accept the peer         |
//!
//! [`MemoryHub`]: crate::MemoryHub

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::TransportError;

const MEM_PREFIX: &str = "mem:";
const UNIX_PREFIX: &str = "unix:";
const UNIX_LISTEN_PREFIX: &str = "unix-listen:";

/// Where a channel's bytes go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// In-process memory link.
    Memory(String),
    /// Unix domain socket; `listen` selects bind/accept over connect.
    Unix { path: PathBuf, listen: bool },
}

impl Address {
    /// In-process memory link address.
    pub fn memory(key: impl Into<String>) -> Self {
        Address::Memory(key.into())
    }

    /// Unix socket address on the connecting side.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Address::Unix {
            path: path.as_ref().to_path_buf(),
            listen: false,
        }
    }

    /// Unix socket address on the listening side.
    pub fn unix_listen(path: impl AsRef<Path>) -> Self {
        Address::Unix {
            path: path.as_ref().to_path_buf(),
            listen: true,
        }
    }

    /// Address of a sub-link derived from this one.
    ///
    /// RPC endpoints need one link per direction; both peers derive the
    /// same pair from a single configured address:
    /// `mem:fib` → `mem:fib/request`, `unix:/tmp/fib.sock` →
    /// `unix:/tmp/fib.request.sock`.
    pub fn derive(&self, suffix: &str) -> Self {
        match self {
            Address::Memory(key) => Address::Memory(format!("{key}/{suffix}")),
            Address::Unix { path, listen } => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let file_name = match path.extension() {
                    Some(ext) => format!("{stem}.{suffix}.{}", ext.to_string_lossy()),
                    None => format!("{stem}.{suffix}"),
                };
                Address::Unix {
                    path: path.with_file_name(file_name),
                    listen: *listen,
                }
            }
        }
    }

    /// Transport family name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Address::Memory(_) => "memory",
            Address::Unix { .. } => "unix-domain-socket",
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Memory(key) => write!(f, "{MEM_PREFIX}{key}"),
            Address::Unix { path, listen: true } => {
                write!(f, "{UNIX_LISTEN_PREFIX}{}", path.display())
            }
            Address::Unix {
                path,
                listen: false,
            } => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl FromStr for Address {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidAddress(s.to_string());

        if let Some(key) = s.strip_prefix(MEM_PREFIX) {
            if key.is_empty() {
                return Err(invalid());
            }
            return Ok(Address::memory(key));
        }
        if let Some(path) = s.strip_prefix(UNIX_LISTEN_PREFIX) {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Address::unix_listen(path));
        }
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Address::unix(path));
        }
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_forms() {
        assert_eq!(
            "mem:inputA".parse::<Address>().unwrap(),
            Address::memory("inputA")
        );
        assert_eq!(
            "unix:/tmp/a.sock".parse::<Address>().unwrap(),
            Address::unix("/tmp/a.sock")
        );
        assert_eq!(
            "unix-listen:/tmp/a.sock".parse::<Address>().unwrap(),
            Address::unix_listen("/tmp/a.sock")
        );
    }

    #[test]
    fn rejects_unknown_and_empty() {
        for bad in ["tcp:1.2.3.4", "mem:", "unix:", "unix-listen:", "inputA"] {
            assert!(
                matches!(bad.parse::<Address>(), Err(TransportError::InvalidAddress(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn display_matches_parse() {
        for text in ["mem:fib", "unix:/tmp/x.sock", "unix-listen:/tmp/x.sock"] {
            let addr: Address = text.parse().unwrap();
            assert_eq!(addr.to_string(), text);
        }
    }

    #[test]
    fn derive_memory_and_unix() {
        assert_eq!(
            Address::memory("fib").derive("request"),
            Address::memory("fib/request")
        );
        assert_eq!(
            Address::unix_listen("/tmp/fib.sock").derive("response"),
            Address::unix_listen("/tmp/fib.response.sock")
        );
        assert_eq!(
            Address::unix("/tmp/fib").derive("request"),
            Address::unix("/tmp/fib.request")
        );
    }
}

//! Channel name resolution.
//!
//! Provisioning transports is the orchestrator's job; models only know
//! channel names. The directory maps those names to [`Address`]es and is
//! usually handed over as JSON:
//!
//! ```json
//! { "channels": { "inputA": "mem:a", "fib_server": "unix-listen:/tmp/fib.sock" } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use modelbus_transport::Address;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Environment variable holding the directory JSON.
pub const CHANNELS_ENV: &str = "MODELBUS_CHANNELS";

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryDocument {
    #[serde(default)]
    channels: BTreeMap<String, String>,
}

/// Name → address table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDirectory {
    entries: BTreeMap<String, Address>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style.
    pub fn with(mut self, name: impl Into<String>, address: Address) -> Self {
        self.insert(name, address);
        self
    }

    /// Add or replace an entry; returns the previous address.
    pub fn insert(&mut self, name: impl Into<String>, address: Address) -> Option<Address> {
        self.entries.insert(name.into(), address)
    }

    pub fn resolve(&self, name: &str) -> Option<&Address> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Address)> {
        self.entries.iter().map(|(name, addr)| (name.as_str(), addr))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a directory document.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: DirectoryDocument = serde_json::from_str(json)?;
        let mut directory = Self::new();
        for (name, text) in document.channels {
            if name.is_empty() {
                return Err(ChannelError::Directory("empty channel name".to_string()));
            }
            let address = text
                .parse::<Address>()
                .map_err(|err| ChannelError::Directory(format!("channel {name:?}: {err}")))?;
            directory.insert(name, address);
        }
        Ok(directory)
    }

    /// Load a directory document from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| ChannelError::Directory(format!("{}: {err}", path.display())))?;
        Self::from_json(&json)
    }

    /// Load from [`CHANNELS_ENV`]; an unset variable gives an empty directory.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CHANNELS_ENV) {
            Ok(json) => Self::from_json(&json),
            Err(std::env::VarError::NotPresent) => Ok(Self::new()),
            Err(err) => Err(ChannelError::Directory(format!("{CHANNELS_ENV}: {err}"))),
        }
    }

    /// Render as a directory document.
    pub fn to_json(&self) -> Result<String> {
        let document = DirectoryDocument {
            channels: self
                .entries
                .iter()
                .map(|(name, addr)| (name.clone(), addr.to_string()))
                .collect(),
        };
        Ok(serde_json::to_string(&document)?)
    }
}

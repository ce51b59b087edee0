use std::time::Duration;

use modelbus_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Default time to wait for a socket peer while opening a channel.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Behavior shared by every channel a registry opens.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Bound for `recv` when no explicit timeout is given. `None` blocks.
    pub recv_timeout: Option<Duration>,
    /// Bound for a single socket write. `None` blocks.
    pub send_timeout: Option<Duration>,
    /// How long opening a socket channel waits for its peer.
    pub connect_timeout: Duration,
    /// Largest encoded message accepted on socket links.
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            recv_timeout: None,
            send_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ChannelConfig {
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Framing configuration for socket transports.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_message_size,
            write_timeout: self.send_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_and_frame_config() {
        let config = ChannelConfig::default()
            .with_recv_timeout(Some(Duration::from_secs(1)))
            .with_send_timeout(Some(Duration::from_millis(250)))
            .with_max_message_size(1024);

        assert_eq!(config.recv_timeout, Some(Duration::from_secs(1)));
        let frame = config.frame_config();
        assert_eq!(frame.max_payload_size, 1024);
        assert_eq!(frame.write_timeout, Some(Duration::from_millis(250)));
    }
}

use std::time::Duration;

use parley_core::sanitize::{DEFAULT_NICKNAME, MAX_NAME_LEN};

use crate::connection::Heartbeat;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub max_send_queue: usize,
    /// Messages replayed to a newly identified connection.
    pub history_limit: usize,
    pub max_name_len: usize,
    pub max_message_len: usize,
    pub default_nickname: String,
    pub identity_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Unanswered heartbeat intervals before a peer is considered gone.
    /// Also bounds how long a single socket write may stay pending.
    pub max_missed_pongs: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8099,
            max_send_queue: 256,
            history_limit: 50,
            max_name_len: MAX_NAME_LEN,
            max_message_len: 2000,
            default_nickname: DEFAULT_NICKNAME.into(),
            identity_timeout_secs: 60,
            heartbeat_interval_secs: 30,
            max_missed_pongs: 3,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_secs(self.identity_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn heartbeat(&self) -> Heartbeat {
        let interval = self.heartbeat_interval();
        Heartbeat {
            interval,
            timeout: interval * self.max_missed_pongs.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_chat_contract() {
        let config = ServerConfig::default();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.max_name_len, 20);
        assert_eq!(config.default_nickname, "Guest");
        assert_eq!(config.bind_addr(), "127.0.0.1:8099");
    }

    #[test]
    fn heartbeat_never_zero() {
        let config = ServerConfig {
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }

    #[test]
    fn heartbeat_timeout_spans_missed_pongs() {
        let config = ServerConfig {
            heartbeat_interval_secs: 10,
            max_missed_pongs: 3,
            ..Default::default()
        };
        assert_eq!(
            config.heartbeat(),
            Heartbeat {
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(30),
            }
        );

        let never_zero = ServerConfig {
            max_missed_pongs: 0,
            ..config
        };
        assert_eq!(never_zero.heartbeat().timeout, Duration::from_secs(10));
    }
}

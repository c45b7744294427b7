use serde::Deserialize;

use crate::utils::error::SettingsError;

/// Top-level configuration settings for the relay.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub hub: HubSettings,
    pub log: LogSettings,
}

/// Where the downstream WebSocket server listens.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// The broker connection and the topic to relay.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub uri: String,
    pub topic: String,
    pub username: String,
    pub password: String,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    /// Attempts made at startup before giving up.
    pub connect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

/// Fan-out limits.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    /// Undelivered messages a subscriber may hold before it is dropped.
    pub backlog: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
///
/// The top-level `uri`, `topic`, `username` and `password` keys accept a
/// flat `config.json` of the form `{"uri": .., "topic": .., ..}`. The
/// nested `upstream.*` keys win when both are set.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub upstream: Option<PartialUpstreamSettings>,
    pub hub: Option<PartialHubSettings>,
    pub log: Option<PartialLogSettings>,
    pub uri: Option<String>,
    pub topic: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialUpstreamSettings {
    pub uri: Option<String>,
    pub topic: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub connect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub max_reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHubSettings {
    pub backlog: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            uri: "mqtt://127.0.0.1:1883".to_string(),
            topic: "#".to_string(),
            username: String::new(),
            password: String::new(),
            client_id: None,
            keep_alive_secs: 30,
            connect_attempts: 5,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self { backlog: 1024 }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Fills every field missing from `partial` with its default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server.unwrap_or_default();
        let upstream = partial.upstream.unwrap_or_default();
        let hub = partial.hub.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            upstream: UpstreamSettings {
                uri: upstream
                    .uri
                    .or(partial.uri)
                    .unwrap_or(default.upstream.uri),
                topic: upstream
                    .topic
                    .or(partial.topic)
                    .unwrap_or(default.upstream.topic),
                username: upstream
                    .username
                    .or(partial.username)
                    .unwrap_or(default.upstream.username),
                password: upstream
                    .password
                    .or(partial.password)
                    .unwrap_or(default.upstream.password),
                client_id: upstream.client_id.or(default.upstream.client_id),
                keep_alive_secs: upstream
                    .keep_alive_secs
                    .unwrap_or(default.upstream.keep_alive_secs),
                connect_attempts: upstream
                    .connect_attempts
                    .unwrap_or(default.upstream.connect_attempts),
                reconnect_delay_ms: upstream
                    .reconnect_delay_ms
                    .unwrap_or(default.upstream.reconnect_delay_ms),
                max_reconnect_delay_ms: upstream
                    .max_reconnect_delay_ms
                    .unwrap_or(default.upstream.max_reconnect_delay_ms),
            },
            hub: HubSettings {
                backlog: hub.backlog.unwrap_or(default.hub.backlog),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }

    /// Rejects values the relay cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.upstream.topic.trim().is_empty() {
            return Err(SettingsError {
                key: "upstream.topic",
                reason: "must not be empty".to_string(),
            });
        }
        if self.upstream.uri.trim().is_empty() {
            return Err(SettingsError {
                key: "upstream.uri",
                reason: "must not be empty".to_string(),
            });
        }
        if self.upstream.connect_attempts == 0 {
            return Err(SettingsError {
                key: "upstream.connect_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.hub.backlog == 0 {
            return Err(SettingsError {
                key: "hub.backlog",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

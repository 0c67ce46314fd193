use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_motd")]
    pub motd: String,
    /// Slot registry capacity.
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// Path to a 64x64 PNG shown in the server list.
    #[serde(default)]
    pub favicon: Option<String>,
}

fn default_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25565
}

fn default_motd() -> String {
    "A Minecraft Server".into()
}

fn default_max_players() -> u32 {
    20
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            motd: default_motd(),
            max_players: default_max_players(),
            favicon: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkSection {
    /// Milliseconds between queue drains.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Drop a connection that sends nothing for this long. 0 = never.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_read_timeout_secs() -> u64 {
    30
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl NetworkSection {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

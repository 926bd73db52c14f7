use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub attendance: AttendanceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AttendanceConfig {
    /// Seconds between token rotations for every active session.
    pub rotation_interval_secs: u64,
    /// Bytes of randomness per token (16 = 128 bits).
    pub token_bytes: usize,
    /// How often a display connection re-checks its session.
    pub liveness_poll_ms: u64,
    /// Buffered rotation events per session channel.
    pub channel_capacity: usize,
}

impl AttendanceConfig {
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn liveness_poll(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms)
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            rotation_interval_secs: 10,
            token_bytes: 16,
            liveness_poll_ms: 1000,
            channel_capacity: 64,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

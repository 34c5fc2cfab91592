//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::player::PlayerStats;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,
    /// Simulation parameters
    pub game: GameConfig,
}

/// Simulation parameters shared by every match
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub map_width: f32,
    pub map_height: f32,
    /// Side length of the square player hitbox
    pub player_size: f32,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Movement snapshots per second
    pub snapshot_rate: u32,
    /// Upper bound on a single tick's delta, in seconds
    pub max_tick_delta: f32,
    /// Stats every player starts a match with
    pub player_stats: PlayerStats,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            map_width: 2000.0,
            map_height: 2000.0,
            player_size: 40.0,
            tick_rate: 60,
            snapshot_rate: 20,
            max_tick_delta: 0.25,
            player_stats: PlayerStats::default(),
        }
    }
}

impl GameConfig {
    /// Snapshot every N ticks
    pub fn snapshot_interval(&self) -> u32 {
        (self.tick_rate / self.snapshot_rate.max(1)).max(1)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            map_width: parse_var("MAP_WIDTH", defaults.map_width)?,
            map_height: parse_var("MAP_HEIGHT", defaults.map_height)?,
            player_size: parse_var("PLAYER_SIZE", defaults.player_size)?,
            tick_rate: parse_var("TICK_RATE", defaults.tick_rate)?,
            snapshot_rate: parse_var("SNAPSHOT_RATE", defaults.snapshot_rate)?,
            max_tick_delta: parse_var("MAX_TICK_DELTA_MS", 250u64)? as f32 / 1000.0,
            player_stats: defaults.player_stats,
        };
        game.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            game,
        })
    }
}

impl GameConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.map_width > 0.0 && self.map_height > 0.0) {
            return Err(ConfigError::Invalid("MAP_WIDTH/MAP_HEIGHT"));
        }
        if !(self.player_size > 0.0) {
            return Err(ConfigError::Invalid("PLAYER_SIZE"));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }
        if !(self.max_tick_delta > 0.0) {
            return Err(ConfigError::Invalid("MAX_TICK_DELTA_MS"));
        }
        Ok(())
    }
}

/// Read and parse an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

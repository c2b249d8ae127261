//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::weapon::WeaponTable;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format (`text` or `json`)
    pub log_format: LogFormat,
    /// Allowed client origins for CORS (comma separated), permissive when unset
    pub client_origin: Option<String>,
    /// Match constants handed to every match instance
    pub match_config: MatchConfig,
    /// Weapon archetype table
    pub weapons: WeaponTable,
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

        let weapons = match env::var("WEAPONS_FILE") {
            Ok(path) => WeaponTable::from_json_file(&path)?,
            Err(_) => WeaponTable::default(),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env_or("LOG_FORMAT", LogFormat::Text)?,
            client_origin: env::var("CLIENT_ORIGIN").ok(),
            match_config: MatchConfig::from_env()?,
            weapons,
        })
    }
}

/// Output format of the log subscriber
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {:?}", other)),
        }
    }
}

/// Constants consumed by every match instance
#[derive(Clone, Debug, PartialEq)]
pub struct MatchConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Regular snapshot cadence, in ticks
    pub broadcast_interval_ticks: u32,
    /// Radius of the circular arena centred on the origin
    pub arena_radius: f32,
    pub max_players: usize,
    pub min_players_to_start: usize,
    /// Countdown length before the match goes active
    pub countdown_seconds: u32,
    /// Delay between the match-ended notice and teardown
    pub post_match_delay_ms: u64,
    pub player_max_hp: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            broadcast_interval_ticks: 3,
            arena_radius: 20.0,
            max_players: 8,
            min_players_to_start: 2,
            countdown_seconds: 3,
            post_match_delay_ms: 5000,
            player_max_hp: 100.0,
        }
    }
}

impl MatchConfig {
    /// Defaults overridden by `MATCH_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            tick_rate: env_or("MATCH_TICK_RATE", defaults.tick_rate)?,
            broadcast_interval_ticks: env_or(
                "MATCH_BROADCAST_INTERVAL",
                defaults.broadcast_interval_ticks,
            )?,
            arena_radius: env_or("MATCH_ARENA_RADIUS", defaults.arena_radius)?,
            max_players: env_or("MATCH_MAX_PLAYERS", defaults.max_players)?,
            min_players_to_start: env_or("MATCH_MIN_PLAYERS", defaults.min_players_to_start)?,
            countdown_seconds: env_or("MATCH_COUNTDOWN_SECONDS", defaults.countdown_seconds)?,
            post_match_delay_ms: env_or("MATCH_POST_DELAY_MS", defaults.post_match_delay_ms)?,
            player_max_hp: env_or("MATCH_PLAYER_MAX_HP", defaults.player_max_hp)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject constants no match could run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("MATCH_TICK_RATE", "must be positive".into()));
        }
        if self.broadcast_interval_ticks == 0 {
            return Err(ConfigError::Invalid(
                "MATCH_BROADCAST_INTERVAL",
                "must be positive".into(),
            ));
        }
        if !(self.arena_radius.is_finite() && self.arena_radius > 0.0) {
            return Err(ConfigError::Invalid("MATCH_ARENA_RADIUS", "must be positive".into()));
        }
        if !(self.player_max_hp.is_finite() && self.player_max_hp > 0.0) {
            return Err(ConfigError::Invalid("MATCH_PLAYER_MAX_HP", "must be positive".into()));
        }
        if self.min_players_to_start == 0 || self.min_players_to_start > self.max_players {
            return Err(ConfigError::Invalid(
                "MATCH_MIN_PLAYERS",
                format!("must be within 1..={}", self.max_players),
            ));
        }
        Ok(())
    }

    /// Simulation step in seconds
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Simulation step in milliseconds
    pub fn tick_millis(&self) -> u64 {
        1000 / self.tick_rate as u64
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, format!("cannot parse {:?}", raw))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Failed to read weapon table {path}: {source}")]
    WeaponFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed weapon table: {0}")]
    WeaponFormat(#[from] serde_json::Error),

    #[error("Invalid weapon archetype {key}: {reason}")]
    WeaponArchetype { key: String, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_match_config_is_valid() {
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_min_players_above_max() {
        let config = MatchConfig {
            min_players_to_start: 9,
            max_players: 8,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("MATCH_MIN_PLAYERS", _))
        ));
    }

    #[test]
    fn rejects_zero_tick_rate() {
        let config = MatchConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tick_delta_matches_rate() {
        let config = MatchConfig::default();
        assert!((config.tick_delta() - 1.0 / 30.0).abs() < 1e-6);
        assert_eq!(config.tick_millis(), 33);
    }

    #[test]
    fn parses_log_format() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}

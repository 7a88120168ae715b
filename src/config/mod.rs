//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;

use glam::Vec3;

/// Process configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format (`text` or `json`)
    pub log_format: LogFormat,
    /// Server simulation ticks per second
    pub server_tick_rate: u32,
    /// Number of scripted clients the loopback binary spawns
    pub demo_bots: usize,
    /// How long the loopback binary runs before shutting down
    pub demo_seconds: u64,
    /// Simulation and synchronization knobs
    pub tuning: Tuning,
}

/// Output format of log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Numeric knobs shared by the server and every client.
///
/// Both roles must agree on these: prediction only converges when the
/// client replays commands with exactly the same constants the server used.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning {
    /// Seconds between outbound snapshots
    pub client_server_delay: f64,
    /// Snapshots older than this (seconds) are evicted on the next insert
    pub snapshot_ttl: f64,
    /// Offset subtracted from the local clock before sampling remote state
    pub render_delay: f64,
    /// Seconds between client command flushes
    pub input_send_interval: f64,
    /// Facing approach rate
    pub turn_smoothing: f32,
    /// Movement-scalar approach rate
    pub move_smoothing: f32,
    /// Below this magnitude a shrinking movement scalar snaps to zero
    pub movement_deadzone: f32,
    /// Units per second at full axis deflection
    pub run_speed: f32,
    /// Smooth-damp time for interpolated remote positions
    pub smooth_interpolation_time: f32,
    /// Orbit pitch clamp, degrees
    pub pitch_min: f32,
    pub pitch_max: f32,
    /// Orbit degrees per unit of mouse delta (before the 0.02 scale)
    pub orbit_speed_x: f32,
    pub orbit_speed_y: f32,
    /// Camera offset from the entity, in orbit space
    pub orbit_offset: Vec3,
    /// Length of a melee strike window, seconds
    pub swing_duration: f64,
    /// Distance from the entity to the melee blade
    pub melee_reach: f32,
    /// Damage before body-part scaling
    pub base_damage: i32,
    /// Hit points a freshly spawned entity starts with
    pub max_hp: i32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            client_server_delay: 0.1,
            snapshot_ttl: 0.5,
            render_delay: 0.1,
            input_send_interval: 0.033,
            turn_smoothing: 15.0,
            move_smoothing: 10.0,
            movement_deadzone: 0.1,
            run_speed: 4.0,
            smooth_interpolation_time: 0.05,
            pitch_min: -20.0,
            pitch_max: 80.0,
            orbit_speed_x: 15.0,
            orbit_speed_y: 15.0,
            orbit_offset: Vec3::new(0.5, 2.5, -2.75),
            swing_duration: 0.4,
            melee_reach: 2.0,
            base_damage: 30,
            max_hp: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Tuning::default();

        let tuning = Tuning {
            client_server_delay: parse_or("CLIENT_SERVER_DELAY", defaults.client_server_delay)?,
            snapshot_ttl: parse_or("SNAPSHOT_TTL", defaults.snapshot_ttl)?,
            render_delay: parse_or("RENDER_DELAY", defaults.render_delay)?,
            input_send_interval: parse_or("INPUT_SEND_INTERVAL", defaults.input_send_interval)?,
            turn_smoothing: parse_or("TURN_SMOOTHING", defaults.turn_smoothing)?,
            move_smoothing: parse_or("MOVE_SMOOTHING", defaults.move_smoothing)?,
            run_speed: parse_or("RUN_SPEED", defaults.run_speed)?,
            smooth_interpolation_time: parse_or(
                "SMOOTH_INTERPOLATION_TIME",
                defaults.smooth_interpolation_time,
            )?,
            pitch_min: parse_or("PITCH_MIN", defaults.pitch_min)?,
            pitch_max: parse_or("PITCH_MAX", defaults.pitch_max)?,
            ..defaults
        };

        if tuning.pitch_min > tuning.pitch_max {
            return Err(ConfigError::Invalid("PITCH_MIN"));
        }

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_or("LOG_FORMAT", LogFormat::default())?,
            server_tick_rate: parse_or("SERVER_TICK_RATE", 60)?,
            demo_bots: parse_or("DEMO_BOTS", 3)?,
            demo_seconds: parse_or("DEMO_SECONDS", 10)?,
            tuning,
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

use serde::Deserialize;
use std::time::Duration;

use tagrush_game::MatchRules;

/// Top-level server configuration, loaded from `tagrush.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub lobbies: LobbiesConfig,
    #[serde(rename = "match")]
    pub match_config: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            limits: LimitsConfig::default(),
            lobbies: LobbiesConfig::default(),
            match_config: MatchConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Outbound frames buffered per client before broadcasts are dropped.
    pub player_message_buffer: usize,
    /// Inbound frames allowed per connection per second.
    pub ws_rate_limit_per_sec: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            player_message_buffer: 256,
            ws_rate_limit_per_sec: 120.0,
        }
    }
}

/// Lobby lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LobbiesConfig {
    /// Open lobbies older than this are removed by the sweeper.
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for LobbiesConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 900,
            sweep_interval_secs: 60,
        }
    }
}

/// Match tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub round_secs: u32,
    pub countdown_secs: u8,
    pub tick_rate_hz: u32,
    pub tag_cooldown_ms: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            round_secs: 30,
            countdown_secs: 3,
            tick_rate_hz: 60,
            tag_cooldown_ms: 500,
        }
    }
}

impl MatchConfig {
    pub fn rules(&self) -> MatchRules {
        MatchRules {
            round_secs: self.round_secs,
            tag_cooldown: Duration::from_millis(self.tag_cooldown_ms),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file is
    /// missing or unparseable.
    pub fn load() -> Self {
        let path =
            std::env::var("TAGRUSH_CONFIG").unwrap_or_else(|_| "tagrush.toml".to_string());
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!("Failed to parse {path}: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => ServerConfig::default(),
        }
    }

    /// Validate configuration. Exits on fatal misconfiguration.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.match_config.tick_rate_hz == 0 || self.match_config.round_secs == 0 {
            tracing::error!("tick_rate_hz and round_secs must be nonzero");
            std::process::exit(1);
        }
        if self.limits.player_message_buffer == 0 {
            tracing::error!("player_message_buffer must be nonzero");
            std::process::exit(1);
        }
    }
}

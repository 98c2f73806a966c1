use std::time::Duration;

use serde::Deserialize;

use codeduel_core::problem::Language;

/// Default config file, overridable with `CODEDUEL_CONFIG`.
const DEFAULT_CONFIG_PATH: &str = "codeduel.toml";

/// Top-level server configuration, loaded from `codeduel.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_format: LogFormat,
    /// Optional TOML file with `[[problems]]` entries replacing the built-in set.
    pub problems_file: Option<String>,
    pub limits: LimitsConfig,
    pub matchmaking: MatchmakingConfig,
    pub rooms: RoomsConfig,
    pub battle: BattleConfig,
    pub judge: JudgeConfig,
    pub hint: HintConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_format: LogFormat::Pretty,
            problems_file: None,
            limits: LimitsConfig::default(),
            matchmaking: MatchmakingConfig::default(),
            rooms: RoomsConfig::default(),
            battle: BattleConfig::default(),
            judge: JudgeConfig::default(),
            hint: HintConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Infrastructure limits (connection caps, buffer sizes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub player_message_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 500,
            player_message_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Unpaired queue entries older than this are dropped.
    pub queue_ttl_secs: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            queue_ttl_secs: 300,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub idle_timeout_secs: u64,
    /// Also drives matchmaking queue expiry.
    pub idle_check_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            idle_check_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// How long a disconnected player may rejoin before forfeiting.
    pub disconnect_grace_secs: u64,
    pub max_code_bytes: usize,
    /// Language assumed when a submission does not name one.
    pub default_language: Language,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            disconnect_grace_secs: 30,
            max_code_bytes: 32 * 1024,
            default_language: Language::Javascript,
        }
    }
}

impl BattleConfig {
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }
}

/// Piston-compatible code execution service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub javascript_version: String,
    pub python_version: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            url: "https://emkc.org/api/v2/piston".to_string(),
            timeout_secs: 10,
            javascript_version: "18.15.0".to_string(),
            python_version: "3.10.0".to_string(),
        }
    }
}

impl JudgeConfig {
    pub fn version_for(&self, language: Language) -> &str {
        match language {
            Language::Javascript => &self.javascript_version,
            Language::Python => &self.python_version,
        }
    }
}

/// Hint generation service. Hints are disabled when `url` is unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HintConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 15,
        }
    }
}

impl ServerConfig {
    /// Fatal configuration problems, one message per issue.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "listen_addr is not a valid socket address: {}",
                self.listen_addr
            ));
        }
        if self.limits.max_ws_connections == 0 {
            errors.push("limits.max_ws_connections must be > 0".to_string());
        }
        if self.limits.player_message_buffer == 0 {
            errors.push("limits.player_message_buffer must be > 0".to_string());
        }
        if self.matchmaking.queue_ttl_secs == 0 {
            errors.push("matchmaking.queue_ttl_secs must be > 0".to_string());
        }
        if self.rooms.idle_timeout_secs == 0 {
            errors.push("rooms.idle_timeout_secs must be > 0".to_string());
        }
        if self.rooms.idle_check_interval_secs == 0 {
            errors.push("rooms.idle_check_interval_secs must be > 0".to_string());
        }
        if self.battle.max_code_bytes == 0 {
            errors.push("battle.max_code_bytes must be > 0".to_string());
        }
        if self.judge.url.is_empty() {
            errors.push("judge.url must be set".to_string());
        }
        if self.judge.timeout_secs == 0 {
            errors.push("judge.timeout_secs must be > 0".to_string());
        }
        if self.hint.timeout_secs == 0 {
            errors.push("hint.timeout_secs must be > 0".to_string());
        }
        errors
    }

    /// Validate configuration, logging warnings and exiting on fatal issues.
    pub fn validate(&self) {
        if self.hint.url.is_none() {
            tracing::warn!("hint.url is not set; hint requests will report an error");
        }
        if self.hint.api_key.is_some() {
            tracing::warn!(
                "hint.api_key is set in config file; use CODEDUEL_HINT_API_KEY env var in production"
            );
        }
        let errors = self.errors();
        if !errors.is_empty() {
            for e in &errors {
                tracing::error!("{e}");
            }
            std::process::exit(1);
        }
    }

    /// Load config from `codeduel.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let path =
            std::env::var("CODEDUEL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "Loaded configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(path = %path, "Failed to parse config: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(path = %path, "No config file found, using defaults");
                ServerConfig::default()
            },
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("CODEDUEL_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Ok(format) = std::env::var("CODEDUEL_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "json" => self.log_format = LogFormat::Json,
                "pretty" => self.log_format = LogFormat::Pretty,
                _ => {},
            }
        }
        if let Ok(path) = std::env::var("CODEDUEL_PROBLEMS_FILE")
            && !path.is_empty()
        {
            self.problems_file = Some(path);
        }
        if let Ok(url) = std::env::var("CODEDUEL_JUDGE_URL")
            && !url.is_empty()
        {
            self.judge.url = url;
        }
        if let Ok(url) = std::env::var("CODEDUEL_HINT_URL")
            && !url.is_empty()
        {
            self.hint.url = Some(url);
        }
        if let Ok(key) = std::env::var("CODEDUEL_HINT_API_KEY")
            && !key.is_empty()
        {
            self.hint.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("CODEDUEL_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("CODEDUEL_DISCONNECT_GRACE_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.battle.disconnect_grace_secs = n;
        }
    }
}

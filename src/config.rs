use crate::domain::{Decimal, Mode};
use crate::strategy::{self, DEFAULT_STRATEGY};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const ORCA_WHIRLPOOL: &str = "9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP";

const HELIUS_KEY_PLACEHOLDER: &str = "${HELIUS_API_KEY}";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub mode: Mode,
    /// Strategy name recorded on every trade and position.
    pub strategy: String,
    pub solana: SolanaConfig,
    pub listener: ListenerConfig,
    pub trading: TradingConfig,
    pub rules: RulesConfig,
    pub risk: RiskConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub wallet_path: String,
    pub jupiter_quote_url: String,
    pub jupiter_price_url: String,
    pub dexscreener_url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerMode {
    Websocket,
    Polling,
    Webhook,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub enabled: bool,
    pub mode: ListenerMode,
    pub polling_interval: Duration,
    pub programs: Vec<String>,
    pub webhook_port: u16,
    pub webhook_path: String,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradingConfig {
    /// Base-asset (SOL) spend per buy.
    pub max_spend_per_trade: Decimal,
    pub max_open_positions: usize,
    pub slippage_bps: u32,
    pub priority_fee_micro_lamports: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulesConfig {
    pub min_liquidity_usd: Decimal,
    /// 0 disables the age check.
    pub max_mint_age_sec: u64,
    pub min_holders: usize,
    pub dev_wallet_max_pct: Decimal,
    pub block_freeze_authority: bool,
    pub allow_mint_authority: bool,
}

/// A threshold of 0 disables that exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskConfig {
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_trade_duration_sec: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    pub dedup_window: Duration,
    pub recheck_interval: Duration,
    pub cleanup_interval: Duration,
    pub watch_ceiling: Duration,
    pub monitor_interval: Duration,
    pub shutdown_grace: Duration,
    pub summary_interval: Duration,
    pub event_queue_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(300),
            recheck_interval: Duration::from_secs(15),
            cleanup_interval: Duration::from_secs(60),
            watch_ceiling: Duration::from_secs(120),
            monitor_interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            summary_interval: Duration::from_secs(10),
            event_queue_capacity: 100,
        }
    }
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com".to_string(),
            wallet_path: "wallet.json".to_string(),
            jupiter_quote_url: "https://quote-api.jup.ag/v6".to_string(),
            jupiter_price_url: "https://api.jup.ag/price/v2".to_string(),
            dexscreener_url: "https://api.dexscreener.com/token-pairs/v1/solana".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ListenerMode::Websocket,
            polling_interval: Duration::from_secs(10),
            programs: vec![RAYDIUM_AMM_V4.to_string(), ORCA_WHIRLPOOL.to_string()],
            webhook_port: 8081,
            webhook_path: "/webhook".to_string(),
            webhook_secret: None,
        }
    }
}

impl Default for Config {
    /// Dry-run with the default strategy preset. Used by tests and as the
    /// base that environment variables override.
    fn default() -> Self {
        let preset = strategy::preset(DEFAULT_STRATEGY).unwrap_or_else(|| strategy::presets().remove(0));
        Self {
            port: 8080,
            database_path: "data/tokenscout.db".to_string(),
            mode: Mode::DryRun,
            strategy: preset.name.to_string(),
            solana: SolanaConfig::default(),
            listener: ListenerConfig::default(),
            trading: preset.trading,
            rules: preset.rules,
            risk: preset.risk,
            timing: TimingConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    /// Build a config from an environment map.
    ///
    /// Order of precedence: explicit variable, then the `STRATEGY` preset,
    /// then built-in defaults.
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let env = &env_map;

        if let Some(name) = get(env, "STRATEGY") {
            let preset = strategy::preset(name).ok_or_else(|| {
                let known: Vec<&str> = strategy::presets().iter().map(|p| p.name).collect();
                ConfigError::InvalidValue(
                    "STRATEGY".to_string(),
                    format!("unknown strategy {}, expected one of {}", name, known.join(", ")),
                )
            })?;
            config.strategy = preset.name.to_string();
            config.trading = preset.trading;
            config.rules = preset.rules;
            config.risk = preset.risk;
        }

        config.port = parse_var(env, "PORT", config.port)?;
        if let Some(path) = get(env, "DATABASE_PATH") {
            config.database_path = path.to_string();
        }
        config.mode = match get(env, "MODE").unwrap_or(config.mode.as_str()) {
            "dry_run" => Mode::DryRun,
            "live" => Mode::Live,
            other => {
                return Err(ConfigError::InvalidValue(
                    "MODE".to_string(),
                    format!("must be dry_run or live, got {}", other),
                ))
            }
        };

        // Solana endpoints
        let helius_key = get(env, "HELIUS_API_KEY");
        let solana = &mut config.solana;
        override_string(env, "SOLANA_RPC_URL", &mut solana.rpc_url);
        override_string(env, "SOLANA_WS_URL", &mut solana.ws_url);
        override_string(env, "WALLET_PATH", &mut solana.wallet_path);
        override_string(env, "JUPITER_API_URL", &mut solana.jupiter_quote_url);
        override_string(env, "JUPITER_PRICE_URL", &mut solana.jupiter_price_url);
        override_string(env, "DEXSCREENER_API_URL", &mut solana.dexscreener_url);
        solana.request_timeout = parse_secs(env, "HTTP_TIMEOUT_SEC", solana.request_timeout)?;
        if let Some(key) = helius_key {
            solana.rpc_url = inject_api_key(&solana.rpc_url, key);
            solana.ws_url = inject_api_key(&solana.ws_url, key);
        }
        if solana.rpc_url.contains(HELIUS_KEY_PLACEHOLDER) || solana.ws_url.contains(HELIUS_KEY_PLACEHOLDER) {
            return Err(ConfigError::MissingEnv("HELIUS_API_KEY".to_string()));
        }

        // Listener
        let listener = &mut config.listener;
        listener.enabled = parse_bool(env, "LISTENER_ENABLED", listener.enabled)?;
        if let Some(mode) = get(env, "LISTENER_MODE") {
            listener.mode = match mode {
                "websocket" => ListenerMode::Websocket,
                "polling" => ListenerMode::Polling,
                "webhook" => ListenerMode::Webhook,
                other => {
                    return Err(ConfigError::InvalidValue(
                        "LISTENER_MODE".to_string(),
                        format!("must be websocket, polling, or webhook, got {}", other),
                    ))
                }
            };
        }
        listener.polling_interval = parse_secs(env, "POLLING_INTERVAL_SEC", listener.polling_interval)?;
        if let Some(programs) = get(env, "LISTENER_PROGRAMS") {
            listener.programs = parse_list(programs);
        }
        listener.webhook_port = parse_var(env, "WEBHOOK_PORT", listener.webhook_port)?;
        override_string(env, "WEBHOOK_PATH", &mut listener.webhook_path);
        if !listener.webhook_path.starts_with('/') {
            listener.webhook_path.insert(0, '/');
        }
        listener.webhook_secret = get(env, "WEBHOOK_SECRET")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        // Trading / rules / risk
        let trading = &mut config.trading;
        trading.max_spend_per_trade = parse_var(env, "MAX_SPEND_PER_TRADE", trading.max_spend_per_trade)?;
        trading.max_open_positions = parse_var(env, "MAX_OPEN_POSITIONS", trading.max_open_positions)?;
        trading.slippage_bps = parse_var(env, "SLIPPAGE_BPS", trading.slippage_bps)?;
        trading.priority_fee_micro_lamports =
            parse_var(env, "PRIORITY_FEE_MICROLAMPORTS", trading.priority_fee_micro_lamports)?;

        let rules = &mut config.rules;
        rules.min_liquidity_usd = parse_var(env, "MIN_LIQUIDITY_USD", rules.min_liquidity_usd)?;
        rules.max_mint_age_sec = parse_var(env, "MAX_MINT_AGE_SEC", rules.max_mint_age_sec)?;
        rules.min_holders = parse_var(env, "MIN_HOLDERS", rules.min_holders)?;
        rules.dev_wallet_max_pct = parse_var(env, "DEV_WALLET_MAX_PCT", rules.dev_wallet_max_pct)?;
        rules.block_freeze_authority =
            parse_bool(env, "BLOCK_FREEZE_AUTHORITY", rules.block_freeze_authority)?;
        rules.allow_mint_authority = parse_bool(env, "ALLOW_MINT_AUTHORITY", rules.allow_mint_authority)?;

        let risk = &mut config.risk;
        risk.stop_loss_pct = parse_var(env, "STOP_LOSS_PCT", risk.stop_loss_pct)?;
        risk.take_profit_pct = parse_var(env, "TAKE_PROFIT_PCT", risk.take_profit_pct)?;
        risk.max_trade_duration_sec = parse_var(env, "MAX_TRADE_DURATION_SEC", risk.max_trade_duration_sec)?;

        // Engine timing
        let timing = &mut config.timing;
        timing.dedup_window = parse_secs(env, "DEDUP_WINDOW_SEC", timing.dedup_window)?;
        timing.recheck_interval = parse_secs(env, "RECHECK_INTERVAL_SEC", timing.recheck_interval)?;
        timing.cleanup_interval = parse_secs(env, "CLEANUP_INTERVAL_SEC", timing.cleanup_interval)?;
        timing.watch_ceiling = parse_secs(env, "WATCH_CEILING_SEC", timing.watch_ceiling)?;
        timing.monitor_interval = parse_secs(env, "MONITOR_INTERVAL_SEC", timing.monitor_interval)?;
        timing.shutdown_grace = parse_secs(env, "SHUTDOWN_GRACE_SEC", timing.shutdown_grace)?;
        timing.summary_interval = parse_secs(env, "SUMMARY_INTERVAL_SEC", timing.summary_interval)?;
        timing.event_queue_capacity =
            parse_var(env, "EVENT_QUEUE_CAPACITY", timing.event_queue_capacity)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with (zero-period timers,
    /// zero-capacity queues, negative thresholds).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("RECHECK_INTERVAL_SEC", self.timing.recheck_interval),
            ("CLEANUP_INTERVAL_SEC", self.timing.cleanup_interval),
            ("MONITOR_INTERVAL_SEC", self.timing.monitor_interval),
            ("SUMMARY_INTERVAL_SEC", self.timing.summary_interval),
            ("POLLING_INTERVAL_SEC", self.listener.polling_interval),
            ("HTTP_TIMEOUT_SEC", self.solana.request_timeout),
        ];
        for (key, value) in non_zero {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(key.to_string(), "must be > 0".to_string()));
            }
        }
        if self.timing.event_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "EVENT_QUEUE_CAPACITY".to_string(),
                "must be > 0".to_string(),
            ));
        }

        let non_negative = [
            ("MAX_SPEND_PER_TRADE", self.trading.max_spend_per_trade),
            ("MIN_LIQUIDITY_USD", self.rules.min_liquidity_usd),
            ("DEV_WALLET_MAX_PCT", self.rules.dev_wallet_max_pct),
            ("STOP_LOSS_PCT", self.risk.stop_loss_pct),
            ("TAKE_PROFIT_PCT", self.risk.take_profit_pct),
        ];
        for (key, value) in non_negative {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ConfigError::InvalidValue(key.to_string(), "must be >= 0".to_string()));
            }
        }

        if self.listener.enabled && self.listener.programs.is_empty() && self.listener.mode != ListenerMode::Webhook {
            return Err(ConfigError::InvalidValue(
                "LISTENER_PROGRAMS".to_string(),
                "at least one program is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn get<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(|s| s.trim())
}

fn override_string(env: &HashMap<String, String>, key: &str, target: &mut String) {
    if let Some(value) = get(env, key).filter(|v| !v.is_empty()) {
        *target = value.to_string();
    }
}

fn parse_var<T>(env: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match get(env, key) {
        None | Some("") => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("cannot parse {:?}", raw))
        }),
    }
}

fn parse_secs(env: &HashMap<String, String>, key: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(env, key, default.as_secs()).map(Duration::from_secs)
}

fn parse_bool(env: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match get(env, key).map(|s| s.to_ascii_lowercase()) {
        None => Ok(default),
        Some(s) if s.is_empty() => Ok(default),
        Some(s) => match s.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be true or false, got {}", other),
            )),
        },
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Replace the `${HELIUS_API_KEY}` placeholder in an endpoint URL.
pub fn inject_api_key(url: &str, api_key: &str) -> String {
    url.replace(HELIUS_KEY_PLACEHOLDER, api_key)
}

use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_FEED_URL: &str = "wss://api.upbit.com/websocket/v1";

/// Runtime settings, loaded from the environment with coded defaults.
/// `dotenvy::dotenv()` is expected to have run first.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub quote_currency: String,
    pub feed_url: String,
    pub cache_dir: PathBuf,
    pub paper_seed_balance: f64,
    pub max_positions: u32,
    pub min_order: f64,
    pub profit_target: f64,
    pub stop_loss: f64,
    pub cooldown_secs: u64,
    pub scan_hour: u32,
    pub scan_minute: u32,
    pub target_refresh_ticks: u64,
    pub min_feed_markets: usize,
    pub min_turnover: f64,
    pub start_active: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/coinpilot".to_string()),
            quote_currency: std::env::var("QUOTE_CURRENCY").unwrap_or_else(|_| "KRW".to_string()),
            feed_url: std::env::var("FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string()),
            cache_dir: PathBuf::from(
                std::env::var("CACHE_DIR").unwrap_or_else(|_| "cache".to_string()),
            ),
            paper_seed_balance: env_parse("PAPER_SEED_BALANCE", 1_000_000.0),
            max_positions: env_parse("MAX_POSITIONS", 1),
            min_order: env_parse("MIN_ORDER", 6_000.0),
            profit_target: env_parse("PROFIT_TARGET", 3.5),
            stop_loss: env_parse("STOP_LOSS", -3.0),
            cooldown_secs: env_parse("REBUY_COOLDOWN_SECS", 3_600),
            scan_hour: env_parse("SCAN_HOUR", 0),
            scan_minute: env_parse("SCAN_MINUTE", 1),
            target_refresh_ticks: env_parse("TARGET_REFRESH_TICKS", 300),
            min_feed_markets: env_parse("MIN_FEED_MARKETS", 10),
            min_turnover: env_parse("MIN_TURNOVER", 5_000_000_000.0),
            start_active: env_parse("START_ACTIVE", false),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

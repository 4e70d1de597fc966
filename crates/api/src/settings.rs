use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_KEY: &str = "dev-teller-key";
const DEFAULT_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

/// HTTP-facing knobs, separate from the router's own configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub api_key: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 120,
            allowed_origins: DEFAULT_ORIGINS.iter().map(|origin| origin.to_string()).collect(),
        }
    }
}

impl ApiSettings {
    /// Reads `TELLER_API_KEY`, `TELLER_RATE_LIMIT_WINDOW_SECONDS`,
    /// `TELLER_RATE_LIMIT_MAX` and `TELLER_ALLOWED_ORIGINS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env::var("TELLER_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .unwrap_or(defaults.api_key),
            rate_limit_window: parsed_var::<u64>("TELLER_RATE_LIMIT_WINDOW_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: parsed_var("TELLER_RATE_LIMIT_MAX").unwrap_or(defaults.rate_limit_max),
            allowed_origins: env::var("TELLER_ALLOWED_ORIGINS")
                .ok()
                .map(|raw| parse_origins(&raw))
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.allowed_origins),
        }
    }
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_RETRIEVAL_MIN_SCORE: f32 = 0.30;
pub const DEFAULT_ADAPTER_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct RouterConfig {
    /// Top retrieval score below this is treated as "no information found".
    pub retrieval_min_score: f32,
    #[serde(serialize_with = "as_millis")]
    pub adapter_timeout: Duration,
    pub retrieval_top_k: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retrieval_min_score: DEFAULT_RETRIEVAL_MIN_SCORE,
            adapter_timeout: Duration::from_millis(DEFAULT_ADAPTER_TIMEOUT_MS),
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }
}

impl RouterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retrieval_min_score: env_parse("TELLER_RETRIEVAL_MIN_SCORE")
                .filter(|score: &f32| score.is_finite())
                .unwrap_or(defaults.retrieval_min_score),
            adapter_timeout: env_parse("TELLER_ADAPTER_TIMEOUT_MS")
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.adapter_timeout),
            retrieval_top_k: env_parse("TELLER_RETRIEVAL_TOP_K")
                .filter(|k: &usize| *k > 0)
                .unwrap_or(defaults.retrieval_top_k),
        }
    }

    pub fn with_retrieval_min_score(mut self, score: f32) -> Self {
        self.retrieval_min_score = score;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}

fn as_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

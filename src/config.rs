//! Typed configuration tree, loaded via the `config` crate layered over
//! `.env` (via `dotenvy`) — the project's existing `AppConfig::load()`
//! composition-root pattern, generalized here into the option groups
//! named in §6/§9a rather than one flat struct.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_approx_maxlen")]
    pub approx_maxlen: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherConfigOptions {
    #[serde(default = "default_match_interval_ms")]
    pub match_interval_ms: u64,
    #[serde(default = "default_prune_interval_ms")]
    pub prune_interval_ms: u64,
    #[serde(default = "default_max_matches_per_iteration")]
    pub max_matches_per_iteration: usize,
    #[serde(default = "default_true")]
    pub emit_events: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnforcerConfigOptions {
    #[serde(default = "default_min_attention_seconds")]
    pub min_attention_seconds: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: i64,
    #[serde(default = "default_min_engagement_score")]
    pub min_engagement_score: f64,
    #[serde(default = "default_min_liveness_score")]
    pub min_liveness_score: f64,
    #[serde(default = "default_low_engagement_grace_period_sec")]
    pub low_engagement_grace_period_sec: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionPoolConfigOptions {
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    pub redis: RedisConfig,
    pub matcher: MatcherConfigOptions,
    pub enforcer: EnforcerConfigOptions,
    pub session_pool: SessionPoolConfigOptions,
}

impl AppConfig {
    /// Load configuration from `.env` (if present) layered with process
    /// environment variables prefixed `APP__`, e.g. `APP__REDIS__URL`,
    /// `APP__MATCHER__MATCH_INTERVAL_MS`.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

fn default_environment() -> String {
    "development".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    100
}
fn default_approx_maxlen() -> usize {
    10_000
}
fn default_match_interval_ms() -> u64 {
    10
}
fn default_prune_interval_ms() -> u64 {
    1_000
}
fn default_max_matches_per_iteration() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_min_attention_seconds() -> u64 {
    5
}
fn default_heartbeat_timeout_ms() -> i64 {
    30_000
}
fn default_min_engagement_score() -> f64 {
    0.30
}
fn default_min_liveness_score() -> f64 {
    0.50
}
fn default_low_engagement_grace_period_sec() -> i64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_config_defaults_match_the_documented_values() {
        let cfg: RedisConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn enforcer_config_defaults_match_the_documented_values() {
        let cfg: EnforcerConfigOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.min_attention_seconds, 5);
        assert_eq!(cfg.heartbeat_timeout_ms, 30_000);
        assert_eq!(cfg.min_engagement_score, 0.30);
        assert_eq!(cfg.min_liveness_score, 0.50);
        assert_eq!(cfg.low_engagement_grace_period_sec, 3);
    }
}

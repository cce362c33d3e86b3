//! `CoreConfig` (§SPEC_FULL.md 4.R): workspace-level tunables loadable from
//! environment variables via `tooling::config::ConfigBuilder`. Where the
//! spec fixes an exact constant (5-minute dedupe window, 60s circuit reset,
//! `N=10` entity history) the field still exists and is still overridable,
//! but its default matches the spec's literal value rather than an arbitrary
//! guess.

use tooling::config::{get_env_bool, get_env_parse_or, ConfigBuilder};
use tooling::{Result, ToolingError};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// §4.B: dedupe window for write operations, in milliseconds.
    pub dedupe_window_ms: u64,
    /// §4.C: max retry attempts per `executeWithRetry` call.
    pub max_retries: u32,
    /// §4.C: circuit breaker reset timeout, in seconds.
    pub circuit_reset_secs: u64,
    /// §4.C: failures while closed before the circuit opens.
    pub circuit_failure_threshold: u32,
    /// §3: bounded history length per entity type in the `EntityGraph`.
    pub entity_history_per_type: usize,
    /// §4.E: session-scoped resolver cache capacity (LRU).
    pub resolver_cache_capacity: usize,
    /// §4.E: resolver cache TTL, in seconds.
    pub resolver_cache_ttl_secs: u64,
    /// Whether an optional `QueryAnnotator` should be consulted when the
    /// coordinator is wired with one (§4.H: "LLM-assisted extraction when
    /// available"). Keyword-only planning ignores this.
    pub use_query_annotator: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 5 * 60 * 1000,
            max_retries: 3,
            circuit_reset_secs: 60,
            circuit_failure_threshold: 5,
            entity_history_per_type: 10,
            resolver_cache_capacity: 50,
            resolver_cache_ttl_secs: 60 * 60,
            use_query_annotator: true,
        }
    }
}

impl ConfigBuilder for CoreConfig {
    fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(ToolingError::General("max_retries must be non-zero".to_string()));
        }
        if self.entity_history_per_type == 0 {
            return Err(ToolingError::General("entity_history_per_type must be non-zero".to_string()));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            dedupe_window_ms: get_env_parse_or(&format!("{prefix}DEDUPE_WINDOW_MS"), defaults.dedupe_window_ms)?,
            max_retries: get_env_parse_or(&format!("{prefix}MAX_RETRIES"), defaults.max_retries)?,
            circuit_reset_secs: get_env_parse_or(&format!("{prefix}CIRCUIT_RESET_SECS"), defaults.circuit_reset_secs)?,
            circuit_failure_threshold: get_env_parse_or(
                &format!("{prefix}CIRCUIT_FAILURE_THRESHOLD"),
                defaults.circuit_failure_threshold,
            )?,
            entity_history_per_type: get_env_parse_or(
                &format!("{prefix}ENTITY_HISTORY_PER_TYPE"),
                defaults.entity_history_per_type,
            )?,
            resolver_cache_capacity: get_env_parse_or(
                &format!("{prefix}RESOLVER_CACHE_CAPACITY"),
                defaults.resolver_cache_capacity,
            )?,
            resolver_cache_ttl_secs: get_env_parse_or(
                &format!("{prefix}RESOLVER_CACHE_TTL_SECS"),
                defaults.resolver_cache_ttl_secs,
            )?,
            use_query_annotator: get_env_bool(&format!("{prefix}USE_QUERY_ANNOTATOR"))?
                .unwrap_or(defaults.use_query_annotator),
        })
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        self.dedupe_window_ms = other.dedupe_window_ms;
        self.max_retries = other.max_retries;
        self.circuit_reset_secs = other.circuit_reset_secs;
        self.circuit_failure_threshold = other.circuit_failure_threshold;
        self.entity_history_per_type = other.entity_history_per_type;
        self.resolver_cache_capacity = other.resolver_cache_capacity;
        self.resolver_cache_ttl_secs = other.resolver_cache_ttl_secs;
        self.use_query_annotator = other.use_query_annotator;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_spec_literal_constants() {
        let config = CoreConfig::default();
        assert_eq!(config.dedupe_window_ms, 300_000);
        assert_eq!(config.circuit_reset_secs, 60);
        assert_eq!(config.entity_history_per_type, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_max_retries_fails_validation() {
        let mut config = CoreConfig::default();
        config.max_retries = 0;
        assert!(config.validate().is_err());
    }
}

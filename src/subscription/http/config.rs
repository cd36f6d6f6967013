use std::time::Duration;

/// Configuration for query behavior.
///
/// This controls how queries cache data and when they consider it stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long data is considered fresh before becoming stale.
    ///
    /// When data is fresh, queries will use cached data without refetching.
    /// Once stale, a new subscriber shows the cached data as last-known-good
    /// and refetches.
    pub stale_time: Duration,

    /// How long an idle entry is retained before [`QueryClient::collect_garbage`]
    /// may remove it.
    ///
    /// `None` keeps entries for the lifetime of the client.
    ///
    /// [`QueryClient::collect_garbage`]: super::QueryClient::collect_garbage
    pub cache_time: Option<Duration>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(0), // immediately stale
            cache_time: None,
        }
    }
}

impl QueryConfig {
    /// Creates a new query configuration with the given stale and cache times.
    #[must_use]
    pub const fn new(stale_time: Duration, cache_time: Option<Duration>) -> Self {
        Self {
            stale_time,
            cache_time,
        }
    }
}

/// Per-subscription options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// When `false` the query stays idle and never fetches.
    pub enabled: bool,

    /// Overrides [`QueryConfig::stale_time`] for this query.
    pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
        }
    }
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueryConfig::default();
        assert_eq!(config.stale_time, Duration::from_secs(0));
        assert_eq!(config.cache_time, None);
    }

    #[test]
    fn test_new_config() {
        let config = QueryConfig::new(Duration::from_secs(30), Some(Duration::from_secs(300)));
        assert_eq!(config.stale_time, Duration::from_secs(30));
        assert_eq!(config.cache_time, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_options_builder() {
        let options = QueryOptions::new();
        assert!(options.enabled);
        assert_eq!(options.stale_time, None);

        let options = QueryOptions::new()
            .enabled(false)
            .stale_time(Duration::from_secs(5));
        assert!(!options.enabled);
        assert_eq!(options.stale_time, Some(Duration::from_secs(5)));
    }
}

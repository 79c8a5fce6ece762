use std::time::Duration;

pub(crate) const DEFAULT_MAX_STATS_SIZE: usize = 2 * 1024 * 1024;
pub(crate) const DEFAULT_MAX_BATCH_FAILURES: usize = 2;

/// The stats session configuration values.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsConfig {
    /// Aggregate stats from every peer instead of only filling locally known keys
    pub superpeer: bool,
    /// The maximum accepted stats blob size in bytes
    pub max_stats_size: usize,
    /// The number of full request batch failures which are tolerated before giving up
    pub max_batch_failures: usize,
    /// The time after which an unanswered request batch is treated as rejected
    pub batch_timeout: Option<Duration>,
}

impl StatsConfig {
    /// Create a new stats configuration builder.
    pub fn builder() -> StatsConfigBuilder {
        StatsConfigBuilder::builder()
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
pub struct StatsConfigBuilder {
    superpeer: Option<bool>,
    max_stats_size: Option<usize>,
    max_batch_failures: Option<usize>,
    batch_timeout: Option<Duration>,
}

impl StatsConfigBuilder {
    /// Create a new stats configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set whether the local node aggregates stats from every peer.
    pub fn superpeer(&mut self, superpeer: bool) -> &mut Self {
        self.superpeer = Some(superpeer);
        self
    }

    /// Set the maximum accepted stats blob size.
    /// Declarations above this bound are refused before any buffer is allocated.
    pub fn max_stats_size(&mut self, size: usize) -> &mut Self {
        self.max_stats_size = Some(size);
        self
    }

    /// Set the number of tolerated full request batch failures.
    pub fn max_batch_failures(&mut self, failures: usize) -> &mut Self {
        self.max_batch_failures = Some(failures);
        self
    }

    /// Set the timeout of an in-flight request batch.
    /// There is no timeout when left unset.
    pub fn batch_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.batch_timeout = Some(timeout);
        self
    }

    /// Build the stats configuration.
    pub fn build(&mut self) -> StatsConfig {
        let superpeer = self.superpeer.take().unwrap_or(false);
        let max_stats_size = self.max_stats_size.take().unwrap_or(DEFAULT_MAX_STATS_SIZE);
        let max_batch_failures = self
            .max_batch_failures
            .take()
            .unwrap_or(DEFAULT_MAX_BATCH_FAILURES);
        let batch_timeout = self.batch_timeout.take();

        StatsConfig {
            superpeer,
            max_stats_size,
            max_batch_failures,
            batch_timeout,
        }
    }
}

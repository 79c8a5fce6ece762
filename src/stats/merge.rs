use log::trace;
use serde_bencode::value::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use tokio::sync::Mutex;

/// The contents of a stats blob, a mapping of stat keys to their bencoded values.
pub type StatsDict = HashMap<String, Value>;

/// The shared owner of the stats which have been collected across peer sessions.
///
/// Merging follows an existing-wins, fill-missing policy: a key that already holds a value
/// is never overwritten, which keeps convergence monotone no matter how often or in which
/// order peers deliver their results.
/// The roles only differ in which keys are admitted:
///
/// - A superpeer aggregates, every new key from a peer is adopted once.
/// - A regular peer only fills gaps within its fixed, locally known key set and never
///   admits keys outside of it.
pub struct StatsRegistry {
    superpeer: bool,
    authoritative: HashSet<String>,
    stats: Mutex<StatsDict>,
}

impl StatsRegistry {
    /// Create a new empty stats registry.
    /// A regular peer registry created this way tracks no keys and will not admit any,
    /// use [StatsRegistry::with_stats] or [StatsRegistry::with_authoritative_keys] instead.
    pub fn new(superpeer: bool) -> Self {
        Self::with_stats(superpeer, StatsDict::new())
    }

    /// Create a stats registry seeded with the locally known stats.
    /// For a regular peer, the initial keys form the authoritative key set.
    pub fn with_stats(superpeer: bool, initial: StatsDict) -> Self {
        let authoritative = initial.keys().cloned().collect();
        Self {
            superpeer,
            authoritative,
            stats: Mutex::new(initial),
        }
    }

    /// Create a regular peer stats registry with an explicit authoritative key set.
    /// This allows keys to be tracked before they hold a value.
    pub fn with_authoritative_keys(initial: StatsDict, keys: HashSet<String>) -> Self {
        Self {
            superpeer: false,
            authoritative: keys,
            stats: Mutex::new(initial),
        }
    }

    /// Check if this registry aggregates stats from every peer.
    pub fn is_superpeer(&self) -> bool {
        self.superpeer
    }

    /// Merge the given incoming stats into the registry.
    /// The update is applied atomically so completions of multiple sessions never interleave.
    ///
    /// # Returns
    ///
    /// Returns a snapshot of the merged stats after the update.
    pub async fn merge(&self, incoming: StatsDict) -> StatsDict {
        let mut stats = self.stats.lock().await;

        for (key, value) in incoming {
            // settled keys are frozen
            if stats.contains_key(&key) {
                continue;
            }

            if self.superpeer || self.authoritative.contains(&key) {
                trace!("Adopting stat {} from peer", key);
                stats.insert(key, value);
            } else {
                trace!("Discarding unknown stat {} from peer", key);
            }
        }

        stats.clone()
    }

    /// Get a snapshot of the currently merged stats.
    pub async fn snapshot(&self) -> StatsDict {
        self.stats.lock().await.clone()
    }
}

impl Debug for StatsRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRegistry")
            .field("superpeer", &self.superpeer)
            .field("authoritative", &self.authoritative.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn stats(entries: Vec<(&str, i64)>) -> StatsDict {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), Value::Int(value)))
            .collect()
    }

    #[tokio::test]
    async fn test_merge_superpeer_admits_new_keys() {
        let registry = StatsRegistry::with_stats(true, stats(vec![("a", 1)]));
        let expected_result = stats(vec![("a", 1), ("b", 5)]);

        let result = registry.merge(stats(vec![("a", 2), ("b", 5)])).await;

        assert_eq!(expected_result, result);
    }

    #[tokio::test]
    async fn test_merge_fills_authoritative_gaps() {
        let keys = vec!["a".to_string(), "b".to_string()].into_iter().collect();
        let registry = StatsRegistry::with_authoritative_keys(stats(vec![("a", 1)]), keys);
        let expected_result = stats(vec![("a", 1), ("b", 5)]);

        let result = registry.merge(stats(vec![("a", 2), ("b", 5)])).await;

        assert_eq!(expected_result, result);
    }

    #[tokio::test]
    async fn test_merge_never_admits_unknown_keys() {
        let registry = StatsRegistry::with_stats(false, stats(vec![("a", 1)]));
        let expected_result = stats(vec![("a", 1)]);

        let result = registry.merge(stats(vec![("a", 2), ("b", 5)])).await;

        assert_eq!(
            expected_result, result,
            "expected the unknown key to be discarded"
        );
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let registry = StatsRegistry::with_stats(true, stats(vec![("a", 1)]));
        let incoming = stats(vec![("b", 5)]);
        let expected_result = stats(vec![("a", 1), ("b", 5)]);

        registry.merge(incoming.clone()).await;
        let result = registry.merge(incoming).await;

        assert_eq!(expected_result, result);
    }

    #[tokio::test]
    async fn test_merge_concurrent_sessions() {
        let registry = Arc::new(StatsRegistry::new(true));
        let mut handles = vec![];

        for i in 0..10 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .merge(stats(vec![("shared", 0), (format!("peer{}", i).as_str(), i)]))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let result = registry.snapshot().await;
        assert_eq!(11, result.len());
        assert_eq!(Some(&Value::Int(0)), result.get("shared"));
    }
}

use crate::stats::{PieceIndex, PieceStore};

/// The request scheduler gates the emission of outbound piece requests.
/// Requests are only emitted while fetching is active and the store is incomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestScheduler {
    fetching: bool,
}

impl RequestScheduler {
    pub fn new() -> Self {
        Self { fetching: false }
    }

    /// Check if fetching is currently active.
    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    /// Activate fetching and get the pieces that should be requested from the peer.
    ///
    /// # Returns
    ///
    /// Returns the missing pieces of the store, or an empty list when the size
    /// is still unknown or the store is already complete.
    pub fn start(&mut self, store: &PieceStore) -> Vec<PieceIndex> {
        self.fetching = true;

        if !store.is_declared() || store.is_complete() {
            return Vec::new();
        }

        store.missing_pieces()
    }

    /// Deactivate fetching.
    /// This doesn't retract requests which are already in-flight.
    pub fn stop(&mut self) {
        self.fetching = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::STATS_PIECE_SIZE;

    #[test]
    fn test_start_unknown_size() {
        let store = PieceStore::new();
        let mut scheduler = RequestScheduler::new();

        let result = scheduler.start(&store);

        assert_eq!(Vec::<PieceIndex>::new(), result);
        assert_eq!(
            true,
            scheduler.is_fetching(),
            "expected the fetch intent to be remembered"
        );
    }

    #[test]
    fn test_start_requests_all_missing_pieces() {
        let mut store = PieceStore::new();
        store.declare(STATS_PIECE_SIZE * 2 + 1).unwrap();
        let mut scheduler = RequestScheduler::new();

        let result = scheduler.start(&store);
        assert_eq!(vec![0, 1, 2], result);

        store.write(1, &[0u8; STATS_PIECE_SIZE]).unwrap();
        let result = scheduler.start(&store);
        assert_eq!(vec![0, 2], result);
    }

    #[test]
    fn test_start_complete_store() {
        let mut store = PieceStore::new();
        store.declare(3).unwrap();
        store.write(0, b"abc").unwrap();
        let mut scheduler = RequestScheduler::new();

        let result = scheduler.start(&store);

        assert_eq!(Vec::<PieceIndex>::new(), result);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut scheduler = RequestScheduler::new();
        let mut store = PieceStore::new();
        store.declare(1).unwrap();

        scheduler.start(&store);
        scheduler.stop();
        scheduler.stop();

        assert_eq!(false, scheduler.is_fetching());
    }
}

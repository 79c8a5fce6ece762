use rand::RngExt;
use std::fmt::{Display, Formatter};

/// The unique 20 byte identifier of a peer within the swarm.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Create a new random peer id.
    pub fn new() -> Self {
        let mut data = [0u8; 20];
        rand::rng().fill(&mut data);
        Self(data)
    }

    /// Create a peer id from the given raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the peer id.
    pub fn value(&self) -> &[u8; 20] {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

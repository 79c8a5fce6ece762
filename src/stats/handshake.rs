use crate::stats::{ExtensionNumber, ExtensionRegistry};
use serde::{Deserialize, Serialize};

/// The extended handshake dictionary which is exchanged right after the protocol handshake.
/// It advertises the supported extensions of a peer together with the stats blob it holds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtendedHandshake {
    /// Dictionary of supported extension messages which maps names of extensions to an extended message ID for each extension message.
    /// The only requirement on these IDs is that no extension message share the same one.
    /// The client should ignore any extension names it doesn't recognize.
    #[serde(default)]
    pub m: ExtensionRegistry,
    /// The total size in bytes of the stats blob held by the peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_size: Option<usize>,
    /// The full stats blob, inlined when the peer chooses to skip the piece exchange.
    #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<u8>>,
    /// Client name and version (as an utf-8 string).
    /// This is a much more reliable way of identifying the client than relying on the peer id encoding.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl ExtendedHandshake {
    /// Get the message identifier of the given extension name.
    pub fn extension_number(&self, name: &str) -> Option<ExtensionNumber> {
        self.m.get(name).cloned()
    }

    /// Check if the peer supports the given extension name.
    pub fn supports(&self, name: &str) -> bool {
        self.m.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::EXTENSION_NAME_STATS;

    #[test]
    fn test_supports() {
        let mut m = ExtensionRegistry::new();
        m.insert(EXTENSION_NAME_STATS.to_string(), 2);
        let handshake = ExtendedHandshake {
            m,
            ..Default::default()
        };

        assert_eq!(true, handshake.supports(EXTENSION_NAME_STATS));
        assert_eq!(false, handshake.supports("ut_metadata"));
        assert_eq!(
            Some(2),
            handshake.extension_number(EXTENSION_NAME_STATS),
            "expected the extension number to match the registry"
        );
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut m = ExtensionRegistry::new();
        m.insert(EXTENSION_NAME_STATS.to_string(), 1);
        let expected_result = ExtendedHandshake {
            m,
            stats_size: Some(1200),
            stats: None,
            client: Some("FxStats 0.1".to_string()),
        };

        let bytes = serde_bencode::to_bytes(&expected_result).unwrap();
        let result: ExtendedHandshake = serde_bencode::from_bytes(&bytes).unwrap();

        assert_eq!(expected_result, result);
    }

    #[test]
    fn test_deserialize_unknown_fields() {
        let payload = b"d1:md10:ut_hodlongi1e11:ut_metadatai2ee4:porti6881e10:stats_sizei64ee";

        let result: ExtendedHandshake =
            serde_bencode::from_bytes(payload).expect("expected a valid handshake");

        assert_eq!(Some(64), result.stats_size);
        assert_eq!(Some(1), result.extension_number(EXTENSION_NAME_STATS));
    }
}

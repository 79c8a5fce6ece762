use crate::stats::{ExtendedHandshake, PeerId, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;

/// The extension unique name
pub type ExtensionName = String;
/// The extension unique identifier
pub type ExtensionNumber = u8;
/// The registry of the known extensions and their identifiers
pub type ExtensionRegistry = HashMap<ExtensionName, ExtensionNumber>;
/// The list type of enabled extensions
pub type Extensions = Vec<Box<dyn Extension>>;

/// The connection events which are relevant to extensions.
/// These are raised by the host transport for each peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Indicates that the handshake with the remote peer has been completed
    HandshakeCompleted(PeerId),
    /// Indicates that the extended handshake with the remote peer has been completed
    ExtendedHandshakeCompleted(ExtendedHandshake),
}

/// The outbound boundary towards a single peer connection.
/// The host transport implements this trait to accept extension payloads for sending.
#[async_trait]
pub trait PeerChannel: Debug + Send + Sync {
    /// Send the given extension message payload to the remote peer.
    ///
    /// # Arguments
    ///
    /// * `extension` - The unique extension protocol name of the payload
    /// * `payload` - The raw message payload to send
    ///
    /// # Returns
    ///
    /// Returns an error when the payload couldn't be delivered to the remote peer.
    async fn send(&self, extension: &str, payload: Vec<u8>) -> Result<()>;
}

/// A peer extension that is carried over an extensible peer connection.
/// An extension can only be activated when the remote peer advertises it within the extended handshake.
///
/// Extensions are registered at the host session level and cloned through
/// [Extension::clone_boxed] for each created peer connection.
/// This means that an extension can store peer related information internally for later use.
#[async_trait]
pub trait Extension: Debug + Send + Sync {
    /// Get the unique extension protocol name.
    fn name(&self) -> &str;

    /// Handle the given extension message payload which has been received from the remote peer.
    /// If you want to store data internally, make use of [tokio::sync::Mutex] or [tokio::sync::RwLock].
    ///
    /// # Arguments
    ///
    /// * `payload` - The payload message of the extension from the remote peer
    /// * `peer` - The channel to send messages back to the remote peer
    ///
    /// # Returns
    ///
    /// Returns an error when the extension fails to process the payload successfully.
    async fn handle<'a>(&'a self, payload: &'a [u8], peer: &'a dyn PeerChannel) -> Result<()>;

    /// Invoked when an event is raised by the peer connection and this extension is enabled.
    ///
    /// # Arguments
    ///
    /// * `event` - The event raised by the peer connection
    /// * `peer` - The channel to send messages back to the remote peer
    async fn on<'a>(&'a self, event: &'a PeerEvent, peer: &'a dyn PeerChannel);

    /// Clone this extension into a new boxed instance for a new peer connection.
    ///
    /// # Returns
    ///
    /// A new boxed instance of this extension.
    fn clone_boxed(&self) -> Box<dyn Extension>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        #[derive(Debug)]
        pub PeerChannel {}

        #[async_trait]
        impl PeerChannel for PeerChannel {
            async fn send(&self, extension: &str, payload: Vec<u8>) -> Result<()>;
        }
    }
}

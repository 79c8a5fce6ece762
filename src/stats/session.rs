use crate::stats::{
    Error, ExtendedHandshake, Extension, PeerChannel, PeerEvent, PeerId, PieceIndex, PieceStore,
    RequestScheduler, Result, RetryGovernor, RetryVerdict, StatsConfig, StatsDict, StatsMessage,
    StatsMessageType, StatsRegistry, EXTENSION_NAME_STATS, STATS_PIECE_SIZE,
};
use async_trait::async_trait;
use derive_more::Display;
use fx_callback::{Callback, MultiThreadedCallback, Subscription};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// The state of a stats exchange session.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session has been created and the stats size is still unknown
    #[display("idle")]
    Idle,
    /// The stats size is known and the session is waiting for a fetch to start
    #[display("declared")]
    Declared,
    /// Piece requests are in-flight
    #[display("fetching")]
    Fetching,
    /// All pieces have been received and the assembled blob is being verified
    #[display("validating")]
    Validating,
    /// The stats blob has been received and validated
    #[display("complete")]
    Complete,
    /// The session has given up on retrieving the stats blob
    #[display("failed")]
    Failed,
}

/// The events raised by a stats session.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsEvent {
    /// Indicates that the state of the session has changed
    StateChanged(SessionState),
    /// Indicates that the stats blob has been fetched and validated
    Completed {
        /// The identity of the peer that delivered the stats
        peer_id: Option<PeerId>,
        /// The validated stats of the peer
        stats: StatsDict,
    },
    /// Indicates a non-fatal protocol diagnosis
    Warning(Error),
}

/// The stats extension controller for a single peer connection.
///
/// The controller fetches the stats blob of the remote peer in pieces, serves the local
/// copy to requesting peers, and merges validated results into the shared [StatsRegistry].
/// It is driven entirely by the inbound events of its connection together with the
/// [StatsExtension::fetch] and [StatsExtension::cancel] calls, no operation suspends on io
/// while session state is being mutated.
#[derive(Debug)]
pub struct StatsExtension {
    config: StatsConfig,
    registry: Arc<StatsRegistry>,
    session: RwLock<Session>,
    callbacks: MultiThreadedCallback<StatsEvent>,
}

impl StatsExtension {
    /// Create a new stats extension for a peer connection.
    pub fn new(config: StatsConfig, registry: Arc<StatsRegistry>) -> Self {
        Self {
            config,
            registry,
            session: RwLock::new(Session::new()),
            callbacks: MultiThreadedCallback::new(),
        }
    }

    /// Create a new stats extension which already holds a complete local stats blob.
    /// The session starts out complete and serves the blob to requesting peers.
    pub fn with_stats(
        config: StatsConfig,
        registry: Arc<StatsRegistry>,
        blob: Vec<u8>,
    ) -> Result<Self> {
        let mut session = Session::new();
        Self::install_stats(&config, &mut session, &blob)?;
        session.state = SessionState::Complete;

        Ok(Self {
            config,
            registry,
            session: RwLock::new(session),
            callbacks: MultiThreadedCallback::new(),
        })
    }

    /// Get the current state of the session.
    pub async fn state(&self) -> SessionState {
        self.session.read().await.state
    }

    /// Check if the session holds a complete, validated stats blob.
    pub async fn is_complete(&self) -> bool {
        self.session.read().await.store.is_complete()
    }

    /// Get the stats size to advertise within the local extended handshake.
    /// This is only available once a complete local copy is held.
    pub async fn advertised_stats_size(&self) -> Option<usize> {
        let session = self.session.read().await;
        if session.store.is_complete() {
            session.store.declared_size()
        } else {
            None
        }
    }

    /// Get a snapshot of the stats which have been merged across all sessions.
    pub async fn stats(&self) -> StatsDict {
        self.registry.snapshot().await
    }

    /// Declare the stats size through local configuration instead of the peer handshake.
    pub async fn declare(&self, size: usize) -> Result<()> {
        let mut session = self.session.write().await;
        self.declare_size(&mut session, size)?;
        Ok(())
    }

    /// Start fetching the stats blob from the remote peer.
    /// When the size of the blob is still unknown, the request batch starts as soon
    /// as the size is declared.
    pub async fn fetch(&self, peer: &dyn PeerChannel) -> Result<()> {
        let mut session = self.session.write().await;
        let session = &mut *session;

        match session.state {
            SessionState::Complete | SessionState::Failed | SessionState::Validating => {
                debug!("Ignoring stats fetch request, session is {}", session.state);
                Ok(())
            }
            _ => {
                if !session.store.is_declared() {
                    // remember the intent, requests start once the size is known
                    session.scheduler.start(&session.store);
                    debug!("Stats size is unknown, deferring piece requests");
                    return Ok(());
                }

                self.start_requests(session, peer).await;
                Ok(())
            }
        }
    }

    /// Stop asking the remote peer for stats pieces.
    /// Responses which are already in-flight are still processed, and a completed
    /// session stays complete.
    pub async fn cancel(&self) {
        let mut session = self.session.write().await;
        session.scheduler.stop();
        debug!("Stats fetching has been cancelled");
    }

    /// Install a locally held stats blob into the session.
    /// This cancels fetching and serves subsequent piece requests from the given blob.
    pub async fn set_stats(&self, blob: Vec<u8>) -> Result<()> {
        let mut session = self.session.write().await;
        if session.state == SessionState::Complete {
            return Ok(());
        }

        Self::install_stats(&self.config, &mut session, &blob)?;
        session.scheduler.stop();
        self.update_state(&mut session, SessionState::Complete);
        Ok(())
    }

    /// Check whether the in-flight request batch has exceeded the configured timeout.
    /// An expired batch is handled the same way as a peer reject.
    /// This is intended to be invoked periodically by the host.
    pub async fn check_timeout(&self, peer: &dyn PeerChannel) -> Result<()> {
        let Some(timeout) = self.config.batch_timeout else {
            return Ok(());
        };

        let mut session = self.session.write().await;
        if session.state != SessionState::Fetching {
            return Ok(());
        }

        let expired = session
            .batch_started_at
            .map(|started| started.elapsed() >= timeout)
            .unwrap_or(false);
        if expired {
            debug!("Stats request batch timed out after {:?}", timeout);
            self.on_batch_failure(&mut session, peer).await?;
        }

        Ok(())
    }

    fn declare_size(&self, session: &mut Session, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::InvalidSize(size));
        }
        // bound the declared size before any buffer is allocated
        if size > self.config.max_stats_size {
            return Err(Error::TooLarge(size, self.config.max_stats_size));
        }

        session.store.declare(size)?;
        session
            .retry
            .arm(session.store.piece_count(), self.config.max_batch_failures);
        debug!(
            "Stats blob of {} bytes requires {} pieces",
            size,
            session.store.piece_count()
        );
        self.update_state(session, SessionState::Declared);
        Ok(())
    }

    fn install_stats(config: &StatsConfig, session: &mut Session, blob: &[u8]) -> Result<StatsDict> {
        let stats: StatsDict =
            serde_bencode::from_bytes(blob).map_err(|e| Error::Parsing(e.to_string()))?;

        if blob.is_empty() {
            return Err(Error::InvalidSize(0));
        }
        if blob.len() > config.max_stats_size {
            return Err(Error::TooLarge(blob.len(), config.max_stats_size));
        }
        match session.store.declared_size() {
            Some(size) if size != blob.len() => return Err(Error::AlreadyDeclared),
            Some(_) => {}
            None => session.store.declare(blob.len())?,
        }

        for piece in 0..session.store.piece_count() {
            let start = piece * STATS_PIECE_SIZE;
            let end = (start + STATS_PIECE_SIZE).min(blob.len());
            session.store.write(piece, &blob[start..end])?;
        }

        Ok(stats)
    }

    async fn on_extended_handshake(&self, handshake: &ExtendedHandshake, peer: &dyn PeerChannel) {
        let mut session = self.session.write().await;

        if !handshake.supports(EXTENSION_NAME_STATS) {
            self.warn(Error::UnsupportedExtension);
            return;
        }
        let Some(size) = handshake.stats_size else {
            self.warn(Error::MissingStatsSize);
            return;
        };
        if session.remote_peer_id.is_none() {
            self.warn(Error::MissingPeerId);
            return;
        }

        if session.store.is_declared() {
            debug!("Ignoring stats size of peer, the size is already declared");
        } else if let Err(e) = self.declare_size(&mut session, size) {
            self.warn(e);
            return;
        }

        // a peer that inlines its full stats blob saves the piece exchange
        if let Some(blob) = handshake.stats.as_ref() {
            if !session.store.is_complete() && blob.len() == size {
                match Self::install_stats(&self.config, &mut session, blob) {
                    Ok(stats) => {
                        self.complete_session(&mut session, stats).await;
                        return;
                    }
                    Err(e) => self.warn(e),
                }
            }
        }

        // start the request batch when a fetch was requested before the size was known
        if session.scheduler.is_fetching() && !session.store.is_complete() {
            self.start_requests(&mut session, peer).await;
        }
    }

    async fn on_request(&self, piece: PieceIndex, peer: &dyn PeerChannel) -> Result<()> {
        let mut session = self.session.write().await;

        if !session.store.is_complete() {
            debug!(
                "Unable to provide stats piece {} to peer, local stats are incomplete",
                piece
            );
            return self.send(StatsMessage::reject(piece), peer).await;
        }

        let data = match session.store.read(piece) {
            Ok(data) => data.to_vec(),
            Err(Error::OutOfRange(_)) => {
                return self.send(StatsMessage::reject(piece), peer).await
            }
            Err(e) => return Err(e),
        };

        // the size is attached to the first data reply only
        let total_size = if session.size_announced {
            None
        } else {
            session.store.declared_size()
        };
        session.size_announced = true;
        self.send(StatsMessage::data(piece, total_size, data), peer)
            .await
    }

    async fn on_data(&self, message: StatsMessage, peer: &dyn PeerChannel) -> Result<()> {
        let mut session = self.session.write().await;

        if message.data.len() > STATS_PIECE_SIZE {
            trace!(
                "Dropping oversized stats piece {} of {} bytes",
                message.piece,
                message.data.len()
            );
            return Ok(());
        }

        let mut size_learned = false;
        if !session.store.is_declared() {
            let Some(size) = message.total_size else {
                warn!(
                    "Dropping stats piece {}, the stats size is unknown",
                    message.piece
                );
                return Ok(());
            };
            if let Err(e) = self.declare_size(&mut session, size) {
                self.warn(e);
                return Ok(());
            }
            size_learned = true;
        }

        if session.state == SessionState::Complete || session.state == SessionState::Failed {
            trace!(
                "Ignoring stats piece {}, session is {}",
                message.piece,
                session.state
            );
            return Ok(());
        }

        match session.store.write(message.piece, &message.data) {
            Ok(_) => trace!("Stored stats piece {}", message.piece),
            Err(e) => {
                warn!("Dropping stats piece {}, {}", message.piece, e);
                return Ok(());
            }
        }

        if session.store.is_complete() {
            self.update_state(&mut session, SessionState::Validating);
            self.validate(&mut session, peer).await?;
        } else if size_learned && session.scheduler.is_fetching() {
            // the size was learned from this message while a fetch was pending
            self.start_requests(&mut session, peer).await;
        }

        Ok(())
    }

    async fn on_reject(&self, piece: PieceIndex, peer: &dyn PeerChannel) -> Result<()> {
        let mut session = self.session.write().await;

        match session.state {
            SessionState::Fetching | SessionState::Validating => {
                debug!("Peer rejected the stats request of piece {}", piece);
                self.on_batch_failure(&mut session, peer).await
            }
            _ => {
                trace!(
                    "Ignoring stats piece reject {}, session is {}",
                    piece,
                    session.state
                );
                Ok(())
            }
        }
    }

    async fn validate(&self, session: &mut Session, peer: &dyn PeerChannel) -> Result<()> {
        match serde_bencode::from_bytes::<StatsDict>(session.store.bytes()) {
            Ok(stats) => {
                debug!("Assembled stats blob holds {} entries", stats.len());
                self.complete_session(session, stats).await;
                Ok(())
            }
            Err(e) => {
                debug!("Assembled stats blob is invalid, {}", e);
                self.on_batch_failure(session, peer).await
            }
        }
    }

    async fn complete_session(&self, session: &mut Session, stats: StatsDict) {
        session.scheduler.stop();
        session.batch_started_at = None;
        self.update_state(session, SessionState::Complete);

        let merged = self.registry.merge(stats.clone()).await;
        trace!("Stats registry now holds {} entries", merged.len());

        self.callbacks.invoke(StatsEvent::Completed {
            peer_id: session.remote_peer_id,
            stats,
        });
    }

    async fn on_batch_failure(&self, session: &mut Session, peer: &dyn PeerChannel) -> Result<()> {
        let piece_count = session.store.piece_count();
        session.store.reset();
        session.batch_started_at = None;

        match session.retry.on_batch_failure(piece_count) {
            RetryVerdict::Retry => {
                debug!(
                    "Retrying the stats request batch, {} piece credits remaining",
                    session.retry.remaining()
                );
                if session.scheduler.is_fetching() {
                    self.start_requests(session, peer).await;
                } else {
                    self.update_state(session, SessionState::Declared);
                }
                Ok(())
            }
            RetryVerdict::Exhausted => {
                session.scheduler.stop();
                self.update_state(session, SessionState::Failed);
                self.warn(Error::RetriesExhausted);
                Ok(())
            }
        }
    }

    async fn start_requests(&self, session: &mut Session, peer: &dyn PeerChannel) {
        let pieces = session.scheduler.start(&session.store);
        if pieces.is_empty() {
            return;
        }

        session.batch_started_at = Some(Instant::now());
        self.update_state(session, SessionState::Fetching);
        debug!("Requesting {} stats pieces from peer", pieces.len());
        for piece in pieces {
            if let Err(e) = self.send(StatsMessage::request(piece), peer).await {
                warn!("Failed to send stats request for piece {}, {}", piece, e);
            }
        }
    }

    async fn send(&self, message: StatsMessage, peer: &dyn PeerChannel) -> Result<()> {
        let payload = message.encode()?;
        trace!("Sending stats message {:?}", message);
        peer.send(EXTENSION_NAME_STATS, payload).await
    }

    fn update_state(&self, session: &mut Session, state: SessionState) {
        if session.state == state {
            return;
        }

        session.state = state;
        debug!("Stats session state changed to {}", state);
        self.callbacks.invoke(StatsEvent::StateChanged(state));
    }

    fn warn(&self, error: Error) {
        warn!("Stats session warning, {}", error);
        self.callbacks.invoke(StatsEvent::Warning(error));
    }
}

#[async_trait]
impl Extension for StatsExtension {
    fn name(&self) -> &str {
        EXTENSION_NAME_STATS
    }

    async fn handle<'a>(&'a self, payload: &'a [u8], peer: &'a dyn PeerChannel) -> Result<()> {
        let message = StatsMessage::decode(payload)?;
        trace!("Received stats message {:?}", message);

        match message.msg_type {
            StatsMessageType::Request => self.on_request(message.piece, peer).await,
            StatsMessageType::Data => self.on_data(message, peer).await,
            StatsMessageType::Reject => self.on_reject(message.piece, peer).await,
        }
    }

    async fn on<'a>(&'a self, event: &'a PeerEvent, peer: &'a dyn PeerChannel) {
        match event {
            PeerEvent::HandshakeCompleted(peer_id) => {
                let mut session = self.session.write().await;
                session.remote_peer_id = Some(*peer_id);
            }
            PeerEvent::ExtendedHandshakeCompleted(handshake) => {
                self.on_extended_handshake(handshake, peer).await
            }
        }
    }

    fn clone_boxed(&self) -> Box<dyn Extension> {
        // a fresh session for the new connection, sharing the stats registry
        Box::new(StatsExtension::new(
            self.config.clone(),
            self.registry.clone(),
        ))
    }
}

impl Callback<StatsEvent> for StatsExtension {
    fn subscribe(&self) -> Subscription<StatsEvent> {
        self.callbacks.subscribe()
    }
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    store: PieceStore,
    scheduler: RequestScheduler,
    retry: RetryGovernor,
    remote_peer_id: Option<PeerId>,
    size_announced: bool,
    batch_started_at: Option<Instant>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            store: PieceStore::new(),
            scheduler: RequestScheduler::new(),
            retry: RetryGovernor::new(),
            remote_peer_id: None,
            size_announced: false,
            batch_started_at: None,
        }
    }
}

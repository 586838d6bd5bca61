use std::sync::Arc;

use rustc_hash::FxHashSet;
use thiserror::Error as ThisError;
use tokio::sync::Notify;
use tracing::{error, warn};

use crate::association::{Association, AssociationConfig, DatagramLink, Role};
use crate::channel::{ChannelConfig, ChannelState, DataChannel};
use crate::lock::RwLock;
use crate::stats::{StatsCollector, TransportStats};
use crate::{MAX_MESSAGE_SIZE_UNSET, OUTBOUND_MTU, SCTP_MAX_CHANNELS};

/// Errors produced by the transport
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// The secured link is not connected, or no association is live
    #[error("transport not ready")]
    NotReady,
    /// Every stream identifier of the requested parity is already in use
    #[error("no available data channel identifier")]
    IdSpaceExhausted,
    /// A local or remote channel configuration is malformed
    #[error("invalid data channel configuration: {0}")]
    InvalidChannelConfig(String),
    /// The association shut down cleanly
    #[error("association closed")]
    Closed,
    /// The association failed
    #[error("association failure: {0}")]
    Association(String),
}

/// Lifecycle state of an [`SctpTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Constructed, [`SctpTransport::start`] not yet called
    New,
    /// Start was called; the association handshake has not completed
    Connecting,
    /// An association is live
    Connected,
    /// Stopped; the association has been aborted
    Closed,
}

/// Transport capabilities exchanged during signaling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Largest message the peer is willing to receive, or zero if unknown
    pub max_message_size: u32,
}

/// Parameters governing an [`SctpTransport`]
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    /// Upper bound on concurrently used data channels
    ///
    /// Bounds the stream identifier space; see
    /// [`SctpTransport::generate_and_reserve_id`].
    pub max_channels: u16,
    /// Receive buffer ceiling handed to the association layer, or zero for
    /// its default
    pub max_receive_buffer_size: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_channels: SCTP_MAX_CHANNELS,
            max_receive_buffer_size: 0,
        }
    }
}

type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;
type CloseHandler = Arc<dyn Fn(Option<Error>) + Send + Sync>;
type ChannelHandler = Arc<dyn Fn(Arc<DataChannel>) + Send + Sync>;

/// Shared mutable transport state, guarded by one reader/writer lock
///
/// Never hand out references into this; iteration outside the lock works on
/// copied-out snapshots.
struct Inner {
    state: TransportState,
    /// Set exactly once, at the first (successful or attempted) start call.
    /// The state enum alone cannot distinguish a repeated start during the
    /// handshake from a first one.
    is_started: bool,
    config: TransportConfig,
    association: Option<Arc<dyn Association>>,
    /// Wakes the accept loop on stop, bounding shutdown latency instead of
    /// relying only on the association abort unblocking it
    shutdown: Option<Arc<Notify>>,

    channels: Vec<Arc<DataChannel>>,
    ids_used: FxHashSet<u16>,
    opened: u32,
    requested: u32,
    accepted: u32,

    on_error: Option<ErrorHandler>,
    on_close: Option<CloseHandler>,
    on_data_channel: Option<ChannelHandler>,
    on_data_channel_opened: Option<ChannelHandler>,
}

/// Manages the SCTP association over a secured datagram link and the data
/// channels multiplexed on it
///
/// Both peers construct one and call [`start`](Self::start); SCTP's
/// simultaneous open lets both sides initiate and converge on a single
/// association. May be cloned to obtain another handle to the same
/// transport.
#[derive(Clone)]
pub struct SctpTransport {
    link: Arc<dyn DatagramLink>,
    inner: Arc<RwLock<Inner>>,
}

impl SctpTransport {
    /// Create a transport over `link` with default configuration
    pub fn new(link: Arc<dyn DatagramLink>) -> Self {
        Self::with_config(link, TransportConfig::default())
    }

    /// Create a transport over `link`
    pub fn with_config(link: Arc<dyn DatagramLink>, config: TransportConfig) -> Self {
        Self {
            link,
            inner: Arc::new(RwLock::new(Inner {
                state: TransportState::New,
                is_started: false,
                config,
                association: None,
                shutdown: None,
                channels: Vec::new(),
                ids_used: FxHashSet::default(),
                opened: 0,
                requested: 0,
                accepted: 0,
                on_error: None,
                on_close: None,
                on_data_channel: None,
                on_data_channel_opened: None,
            })),
        }
    }

    /// Start the transport, actively opening an association over the link
    ///
    /// Idempotent: once a start has been attempted, later calls return `Ok`
    /// without side effects. Requires the secured link to be connected.
    ///
    /// On success, any channel created while the transport was still
    /// connecting is opened over the new association (individual failures
    /// are logged and skipped), and the accept loop is launched in the
    /// background. Returns as soon as the association is established.
    pub async fn start(&self, capabilities: Capabilities) -> Result<(), Error> {
        {
            let mut inner = self.inner.write("start");
            if inner.is_started {
                return Ok(());
            }
            inner.is_started = true;
            inner.state = TransportState::Connecting;
        }

        let mut max_message_size = capabilities.max_message_size;
        if max_message_size == 0 {
            max_message_size = MAX_MESSAGE_SIZE_UNSET;
        }

        if !self.link.is_connected() {
            return Err(Error::NotReady);
        }

        let max_receive_buffer_size = self.inner.read("config").config.max_receive_buffer_size;
        let association = self
            .link
            .open_association(AssociationConfig {
                max_message_size,
                max_receive_buffer_size,
                mtu: OUTBOUND_MTU,
            })
            .await?;

        let shutdown = Arc::new(Notify::new());
        let channels = {
            let mut inner = self.inner.write("start association");
            inner.association = Some(association.clone());
            inner.state = TransportState::Connected;
            inner.shutdown = Some(shutdown.clone());
            inner.channels.clone()
        };

        let mut opened = 0;
        for channel in &channels {
            if channel.ready_state() == ChannelState::Connecting {
                if let Err(err) = channel.open(self) {
                    warn!("failed to open data channel: {err}");
                    continue;
                }
                opened += 1;
            }
        }
        if opened > 0 {
            self.inner.write("opened count").opened += opened;
        }

        // Seeded with the channels opened above so the loop does not
        // re-announce them as remote.
        let transport = self.clone();
        tokio::spawn(async move {
            transport
                .accept_channels(association, channels, shutdown)
                .await;
        });

        Ok(())
    }

    /// Stop the transport, aborting the association
    ///
    /// A no-op if no association is live. The accept loop is signaled to
    /// shut down and reports a clean close.
    pub fn stop(&self) -> Result<(), Error> {
        let mut inner = self.inner.write("stop");
        let Some(association) = inner.association.take() else {
            return Ok(());
        };
        association.abort("");
        inner.state = TransportState::Closed;
        if let Some(shutdown) = inner.shutdown.take() {
            shutdown.notify_one();
        }
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransportState {
        self.inner.read("state").state
    }

    /// The secured link this transport runs over
    pub fn link(&self) -> Arc<dyn DatagramLink> {
        self.link.clone()
    }

    /// Capabilities of this transport
    ///
    /// The maximum message size is reported by the live association; zero if
    /// none is established.
    pub fn get_capabilities(&self) -> Capabilities {
        let max_message_size = self.association().map_or(0, |a| a.max_message_size());
        Capabilities { max_message_size }
    }

    /// The maximum number of data channels that can be open simultaneously
    pub fn max_channels(&self) -> u16 {
        self.inner.read("max_channels").config.max_channels
    }

    /// Total bytes of user data queued on the association but not yet
    /// acknowledged, or zero if no association is live
    pub fn buffered_amount(&self) -> usize {
        self.inner
            .read("buffered_amount")
            .association
            .as_ref()
            .map_or(0, |a| a.buffered_amount())
    }

    /// Create a local data channel
    ///
    /// May be called before the transport is started; such channels are
    /// opened automatically once the association is up. When the transport
    /// is already connected, the channel is opened immediately.
    pub fn create_data_channel(&self, config: ChannelConfig) -> Result<Arc<DataChannel>, Error> {
        let channel = DataChannel::new(config)?;
        let connected = {
            let mut inner = self.inner.write("create data channel");
            if let Some(id) = channel.id() {
                inner.ids_used.insert(id);
            }
            inner.channels.push(channel.clone());
            inner.requested += 1;
            inner.state == TransportState::Connected
        };

        if connected {
            channel.open(self)?;
            self.inner.write("opened count").opened += 1;
        }

        Ok(channel)
    }

    /// Allocate and reserve a stream identifier for a locally-created
    /// channel
    ///
    /// The initiating (client) role draws even identifiers starting at 0,
    /// the other side odd ones starting at 1, stepping by 2 up to
    /// `max_channels - 1`. Identifiers are reserved for the lifetime of the
    /// transport: there is no release path, even after a channel closes.
    pub fn generate_and_reserve_id(&self, role: Role) -> Result<u16, Error> {
        let max = self.max_channels();
        let mut inner = self.inner.write("generate id");
        let mut id: u16 = match role {
            Role::Client => 0,
            Role::Server => 1,
        };
        while id < max.saturating_sub(1) {
            if inner.ids_used.insert(id) {
                return Ok(id);
            }
            id += 2;
        }
        Err(Error::IdSpaceExhausted)
    }

    /// Number of channels successfully opened over the association
    pub fn data_channels_opened(&self) -> u32 {
        self.inner.read("counters").opened
    }

    /// Number of channels requested locally
    pub fn data_channels_requested(&self) -> u32 {
        self.inner.read("counters").requested
    }

    /// Number of channels accepted from the remote peer
    pub fn data_channels_accepted(&self) -> u32 {
        self.inner.read("counters").accepted
    }

    /// Set the handler invoked when the association fails
    pub fn on_error(&self, handler: impl Fn(Error) + Send + Sync + 'static) {
        self.inner.write("on_error").on_error = Some(Arc::new(handler));
    }

    /// Set the handler invoked when the association closes
    ///
    /// The handler receives the failure that terminated the association, or
    /// `None` on clean shutdown.
    pub fn on_close(&self, handler: impl Fn(Option<Error>) + Send + Sync + 'static) {
        self.inner.write("on_close").on_close = Some(Arc::new(handler));
    }

    /// Set the handler invoked when the remote peer opens a data channel
    ///
    /// The accept loop waits for this handler to finish before the channel
    /// is marked open, so setup done here (such as attaching message
    /// listeners) completes before open notifications fire.
    pub fn on_data_channel(&self, handler: impl Fn(Arc<DataChannel>) + Send + Sync + 'static) {
        self.inner.write("on_data_channel").on_data_channel = Some(Arc::new(handler));
    }

    /// Set the handler invoked after an accepted data channel is marked open
    pub fn on_data_channel_opened(
        &self,
        handler: impl Fn(Arc<DataChannel>) + Send + Sync + 'static,
    ) {
        self.inner.write("on_data_channel_opened").on_data_channel_opened =
            Some(Arc::new(handler));
    }

    /// Snapshot association counters into `collector`
    ///
    /// All numeric fields are zero if no association is live.
    pub fn collect_stats(&self, collector: &StatsCollector) {
        let mut stats = TransportStats::new();
        if let Some(association) = self.association() {
            stats.bytes_sent = association.bytes_sent();
            stats.bytes_received = association.bytes_received();
            // Association reports milliseconds; the stats record carries
            // seconds.
            stats.smoothed_rtt = association.srtt_ms() * 0.001;
            stats.congestion_window = association.cwnd();
            stats.receiver_window = association.rwnd();
            stats.mtu = association.mtu();
        }
        collector.collect(stats);
    }

    pub(crate) fn role(&self) -> Role {
        self.link.role()
    }

    pub(crate) fn association(&self) -> Option<Arc<dyn Association>> {
        self.inner.read("association").association.clone()
    }

    /// Long-running accept loop, spawned once per successful start
    ///
    /// Terminates when the association closes or fails, or when `shutdown`
    /// fires. `existing` seeds the deduplication set so streams already
    /// owned locally are not surfaced again as remote channels.
    async fn accept_channels(
        self,
        association: Arc<dyn Association>,
        existing: Vec<Arc<DataChannel>>,
        shutdown: Arc<Notify>,
    ) {
        let mut known: FxHashSet<u16> = existing
            .iter()
            .filter_map(|channel| channel.materialized_stream_id())
            .collect();

        loop {
            let stream = tokio::select! {
                () = shutdown.notified() => {
                    self.notify_close(None);
                    return;
                }
                next = association.accept_stream() => match next {
                    Ok(stream) => stream,
                    Err(Error::Closed) => {
                        self.notify_close(None);
                        return;
                    }
                    Err(err) => {
                        error!("failed to accept data channel: {err}");
                        self.notify_error(err.clone());
                        self.notify_close(Some(err));
                        return;
                    }
                },
            };

            let identifier = stream.stream_identifier();
            if !known.insert(identifier) {
                // A stream we already own, re-surfaced by the association.
                continue;
            }

            let channel = match DataChannel::from_remote(identifier, &stream.config()) {
                Ok(channel) => channel,
                Err(err) => {
                    // Invalid remote configuration; other channels can still
                    // be accepted.
                    if let Err(close_err) = stream.close() {
                        error!("failed to close invalid data channel: {close_err}");
                    }
                    error!("failed to accept data channel: {err}");
                    self.notify_error(err);
                    known.remove(&identifier);
                    continue;
                }
            };

            // Wait for the handler so setup done in it completes before the
            // channel's own open notification and counters fire. Handler
            // failures stop at logging.
            if let Some(handler) = self.register_accepted(&channel) {
                let accepted = channel.clone();
                if let Err(err) = tokio::spawn(async move { handler(accepted) }).await {
                    warn!("data channel handler failed: {err}");
                }
            }
            channel.handle_open(Arc::from(stream));

            let handler = {
                let mut inner = self.inner.write("channel opened");
                inner.opened += 1;
                inner.on_data_channel_opened.clone()
            };
            if let Some(handler) = handler {
                let opened = channel.clone();
                tokio::spawn(async move { handler(opened) });
            }
        }
    }

    /// Register an accepted channel and return the `on_data_channel`
    /// handler to run for it
    fn register_accepted(&self, channel: &Arc<DataChannel>) -> Option<ChannelHandler> {
        let mut inner = self.inner.write("register accepted");
        inner.channels.push(channel.clone());
        inner.accepted += 1;
        match channel.id() {
            Some(id) => {
                inner.ids_used.insert(id);
            }
            // Cannot happen: accepted channels are always built with an id.
            None => error!("accepted data channel with no ID"),
        }
        inner.on_data_channel.clone()
    }

    fn notify_error(&self, err: Error) {
        let handler = self.inner.read("on error").on_error.clone();
        if let Some(handler) = handler {
            tokio::spawn(async move { handler(err) });
        }
    }

    fn notify_close(&self, err: Option<Error>) {
        let handler = self.inner.read("on close").on_close.clone();
        if let Some(handler) = handler {
            tokio::spawn(async move { handler(err) });
        }
    }
}

use std::{fmt::Debug, future::Future, pin::Pin, sync::Arc};

use crate::Error;

/// Which side of the secured link this peer negotiated during signaling
///
/// The role decides stream identifier parity: the initiating (client) side
/// allocates even identifiers, the other side odd ones, so concurrent local
/// opens on both peers never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The side that initiated the secured link
    Client,
    /// The side that accepted the secured link
    Server,
}

/// Parameters for the active open of an association
#[derive(Debug, Clone)]
pub struct AssociationConfig {
    /// Largest message the local side is willing to receive
    pub max_message_size: u32,
    /// Receive buffer ceiling, or zero for the association layer's default
    pub max_receive_buffer_size: u32,
    /// Path MTU assumed for outbound traffic
    pub mtu: u32,
}

/// Delivery mode negotiated for a stream, as carried on the wire
///
/// Mirrors the data-channel establishment protocol's channel types. The
/// `reliability_parameter` in [`StreamConfig`] carries the retransmit count
/// or lifetime for the partially reliable variants and is meaningless for
/// the fully reliable ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Ordered, fully reliable delivery
    Reliable,
    /// Unordered, fully reliable delivery
    ReliableUnordered,
    /// Ordered, retransmissions limited by count
    PartialReliableRexmit,
    /// Unordered, retransmissions limited by count
    PartialReliableRexmitUnordered,
    /// Ordered, retransmissions limited by lifetime in milliseconds
    PartialReliableTimed,
    /// Unordered, retransmissions limited by lifetime in milliseconds
    PartialReliableTimedUnordered,
}

/// Stream-level configuration exchanged by the framing codec
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Delivery mode for the stream
    pub channel_type: ChannelType,
    /// Retransmit count or lifetime, depending on `channel_type`
    pub reliability_parameter: u32,
    /// Application label for the channel
    pub label: String,
    /// Application subprotocol for the channel
    pub protocol: String,
    /// Whether the channel was negotiated out of band
    pub negotiated: bool,
}

/// The secured point-to-point datagram link an association runs over
///
/// Implemented by the DTLS-style transport collaborator. Object safety
/// follows the same shape as an async-runtime seam: the one async operation
/// returns a boxed future.
pub trait DatagramLink: Send + Sync + Debug + 'static {
    /// Whether the link's own handshake has completed
    ///
    /// An association can only be opened over a connected link.
    fn is_connected(&self) -> bool;

    /// The role this peer took when the link was established
    fn role(&self) -> Role;

    /// Actively open an association over the link
    ///
    /// Both peers call this; the association layer resolves the resulting
    /// simultaneous open internally and both calls yield the same session.
    fn open_association(
        &self,
        config: AssociationConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Association>, Error>> + Send + '_>>;
}

/// A live association: one reliable message session multiplexing many
/// streams
///
/// Retransmission, congestion control, and timeouts all live behind this
/// seam; the transport only opens, accepts, and observes.
pub trait Association: Send + Sync + Debug + 'static {
    /// Wait for the next stream opened by the remote peer
    ///
    /// Yields `Err(Error::Closed)` on clean shutdown of the association and
    /// `Err(Error::Association(_))` on abnormal failure. May re-surface a
    /// stream the caller already owns; deduplication is the caller's job.
    fn accept_stream(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ChannelStream>, Error>> + Send + '_>>;

    /// Open a locally-initiated stream with the given identifier
    fn open_stream(
        &self,
        identifier: u16,
        config: StreamConfig,
    ) -> Result<Box<dyn ChannelStream>, Error>;

    /// Abort the association, discarding pending data
    ///
    /// Unblocks any pending [`Self::accept_stream`] call.
    fn abort(&self, reason: &str);

    /// Largest message the peer is willing to receive
    fn max_message_size(&self) -> u32;

    /// Total user payload bytes sent
    fn bytes_sent(&self) -> u64;
    /// Total user payload bytes received
    fn bytes_received(&self) -> u64;
    /// Smoothed round-trip time estimate, in milliseconds
    fn srtt_ms(&self) -> f64;
    /// Current congestion window, in bytes
    fn cwnd(&self) -> u32;
    /// Peer's advertised receive window, in bytes
    fn rwnd(&self) -> u32;
    /// Current path MTU
    fn mtu(&self) -> u32;
    /// User data queued locally but not yet acknowledged, in bytes
    fn buffered_amount(&self) -> usize;
}

/// One framed, flow-controlled stream within an association
///
/// Produced either by [`Association::accept_stream`] (remote open, with the
/// configuration the peer announced) or [`Association::open_stream`] (local
/// open, echoing the configuration passed in).
pub trait ChannelStream: Send + Sync + Debug + 'static {
    /// The stream's identifier within the association
    fn stream_identifier(&self) -> u16;

    /// The configuration negotiated for this stream
    fn config(&self) -> StreamConfig;

    /// Close the stream without affecting the rest of the association
    fn close(&self) -> Result<(), Error>;
}

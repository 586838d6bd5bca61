//! SCTP data-channel transport multiplexing
//!
//! This crate manages a single reliable, message-oriented SCTP association on
//! top of an already-secured point-to-point datagram link, and multiplexes
//! many independent bidirectional data channels over it. The association
//! layer itself (retransmission, congestion control) and the per-stream
//! framing codec are external collaborators reached through the
//! [`DatagramLink`], [`Association`], and [`ChannelStream`] traits; this
//! crate owns the lifecycle state machine, the stream identifier space, the
//! channel registry, and the background accept loop.
//!
//! The entry point is [`SctpTransport`]. Both peers construct one over their
//! secured link and call [`SctpTransport::start`]; SCTP's simultaneous-open
//! handshake lets both sides actively open and converge on one association.
//! Channels may be created locally before or after the transport connects
//! ([`SctpTransport::create_data_channel`]), or arrive from the peer, in
//! which case they are surfaced through the handler registered with
//! [`SctpTransport::on_data_channel`].
//!
//! Stream identifiers are allocated with role-dependent parity (even for the
//! initiating side, odd for the other) so that two peers opening channels
//! concurrently never collide.

#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

mod association;
mod channel;
mod lock;
mod stats;
mod transport;

pub use crate::association::{
    Association, AssociationConfig, ChannelStream, ChannelType, DatagramLink, Role, StreamConfig,
};
pub use crate::channel::{ChannelConfig, ChannelState, DataChannel, Reliability};
pub use crate::stats::{StatsCollector, TransportStats};
pub use crate::transport::{Capabilities, Error, SctpTransport, TransportConfig, TransportState};


/// Maximum number of data channels that can be multiplexed over one
/// association
///
/// This bounds the stream identifier space; identifiers are drawn from
/// `[0, SCTP_MAX_CHANNELS - 1)`.
pub const SCTP_MAX_CHANNELS: u16 = 65535;

/// Sentinel passed to the association layer when the caller does not
/// constrain the maximum message size
///
/// Capability exchanges encode "unset" as zero; the association layer expects
/// a concrete value, so zero is replaced with this before the active open.
pub(crate) const MAX_MESSAGE_SIZE_UNSET: u32 = 65536;

/// Path MTU assumed for outbound association traffic
///
/// The secured link already accounts for its own framing overhead, so this is
/// deliberately conservative rather than discovered.
pub(crate) const OUTBOUND_MTU: u32 = 1200;

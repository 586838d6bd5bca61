use std::sync::{Arc, Mutex};

use crate::association::{ChannelStream, ChannelType, StreamConfig};
use crate::transport::SctpTransport;
use crate::Error;

/// Reliability mode of a data channel
///
/// Partial reliability limits retransmission either by count or by elapsed
/// time; the two limits are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    /// Every message is retransmitted until acknowledged
    Reliable,
    /// Retransmit each message at most this many times
    MaxRetransmits(u16),
    /// Retransmit each message for at most this many milliseconds
    MaxPacketLifeTime(u16),
}

/// Lifecycle of a single data channel, as seen by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created locally, not yet opened over a live association
    Connecting,
    /// Backed by a live stream
    Open,
    /// No longer usable
    Closed,
}

/// Parameters for creating a local data channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Application label, at most 65535 bytes
    pub label: String,
    /// Application subprotocol, at most 65535 bytes
    pub protocol: String,
    /// Whether the channel was negotiated out of band
    ///
    /// Negotiated channels carry a caller-chosen `id`; for the rest an
    /// identifier is allocated when the channel is opened.
    pub negotiated: bool,
    /// Whether messages are delivered in order
    pub ordered: bool,
    /// Reliability mode
    pub reliability: Reliability,
    /// Preset stream identifier, required iff `negotiated`
    pub id: Option<u16>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            protocol: String::new(),
            negotiated: false,
            ordered: true,
            reliability: Reliability::Reliable,
            id: None,
        }
    }
}

/// One multiplexed bidirectional stream exposed to the application
///
/// Created locally through [`SctpTransport::create_data_channel`] or
/// discovered by the transport's accept loop and handed to the
/// `on_data_channel` handler.
#[derive(Debug)]
pub struct DataChannel {
    label: String,
    protocol: String,
    negotiated: bool,
    ordered: bool,
    reliability: Reliability,
    inner: Mutex<ChannelInner>,
}

#[derive(Debug)]
struct ChannelInner {
    id: Option<u16>,
    state: ChannelState,
    stream: Option<Arc<dyn ChannelStream>>,
}

impl DataChannel {
    pub(crate) fn new(config: ChannelConfig) -> Result<Arc<Self>, Error> {
        // Label and protocol travel in 16-bit length-prefixed fields of the
        // establishment message.
        if config.label.len() > u16::MAX as usize {
            return Err(Error::InvalidChannelConfig("label too long".into()));
        }
        if config.protocol.len() > u16::MAX as usize {
            return Err(Error::InvalidChannelConfig("protocol too long".into()));
        }
        if config.negotiated && config.id.is_none() {
            return Err(Error::InvalidChannelConfig(
                "negotiated channel requires an id".into(),
            ));
        }

        Ok(Arc::new(Self {
            label: config.label,
            protocol: config.protocol,
            negotiated: config.negotiated,
            ordered: config.ordered,
            reliability: config.reliability,
            inner: Mutex::new(ChannelInner {
                id: config.id,
                state: ChannelState::Connecting,
                stream: None,
            }),
        }))
    }

    /// Build a channel for a stream the remote peer opened
    pub(crate) fn from_remote(identifier: u16, config: &StreamConfig) -> Result<Arc<Self>, Error> {
        let (ordered, reliability) = classify(config.channel_type, config.reliability_parameter);
        Self::new(ChannelConfig {
            label: config.label.clone(),
            protocol: config.protocol.clone(),
            negotiated: config.negotiated,
            ordered,
            reliability,
            id: Some(identifier),
        })
    }

    /// Application label for the channel
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Application subprotocol for the channel
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Whether the channel was negotiated out of band
    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    /// Whether messages are delivered in order
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    /// Reliability mode
    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    /// The channel's stream identifier, once one has been assigned
    pub fn id(&self) -> Option<u16> {
        self.inner.lock().unwrap().id
    }

    /// Current lifecycle state
    pub fn ready_state(&self) -> ChannelState {
        self.inner.lock().unwrap().state
    }

    /// Identifier of the backing stream, if one has been materialized
    pub(crate) fn materialized_stream_id(&self) -> Option<u16> {
        let inner = self.inner.lock().unwrap();
        inner.stream.as_ref().map(|s| s.stream_identifier())
    }

    /// Open the channel over the transport's live association
    ///
    /// Allocates a stream identifier first if the channel does not already
    /// carry one.
    pub(crate) fn open(&self, transport: &SctpTransport) -> Result<(), Error> {
        let association = transport.association().ok_or(Error::NotReady)?;

        // Allocate before locking `inner`: the registry reads channel ids
        // while holding the transport lock, so the two locks must never
        // nest in both orders.
        let current_id = self.inner.lock().unwrap().id;
        let id = match current_id {
            Some(id) => id,
            None => {
                let id = transport.generate_and_reserve_id(transport.role())?;
                self.inner.lock().unwrap().id = Some(id);
                id
            }
        };

        let (channel_type, reliability_parameter) = wire_type(self.ordered, self.reliability);
        let stream = association.open_stream(
            id,
            StreamConfig {
                channel_type,
                reliability_parameter,
                label: self.label.clone(),
                protocol: self.protocol.clone(),
                negotiated: self.negotiated,
            },
        )?;

        let mut inner = self.inner.lock().unwrap();
        inner.id = Some(id);
        inner.stream = Some(Arc::from(stream));
        inner.state = ChannelState::Open;

        Ok(())
    }

    /// Attach the remotely-opened stream and mark the channel open
    ///
    /// Called by the accept loop after the `on_data_channel` handler has
    /// finished, so handler-side setup is complete before the channel
    /// reports itself open.
    pub(crate) fn handle_open(&self, stream: Arc<dyn ChannelStream>) {
        let mut inner = self.inner.lock().unwrap();
        inner.stream = Some(stream);
        inner.state = ChannelState::Open;
    }
}

/// Map a wire channel type onto ordering and reliability
fn classify(channel_type: ChannelType, reliability_parameter: u32) -> (bool, Reliability) {
    let val = reliability_parameter as u16;
    match channel_type {
        ChannelType::Reliable => (true, Reliability::Reliable),
        ChannelType::ReliableUnordered => (false, Reliability::Reliable),
        ChannelType::PartialReliableRexmit => (true, Reliability::MaxRetransmits(val)),
        ChannelType::PartialReliableRexmitUnordered => (false, Reliability::MaxRetransmits(val)),
        ChannelType::PartialReliableTimed => (true, Reliability::MaxPacketLifeTime(val)),
        ChannelType::PartialReliableTimedUnordered => (false, Reliability::MaxPacketLifeTime(val)),
    }
}

/// Inverse of [`classify`], for locally-opened streams
fn wire_type(ordered: bool, reliability: Reliability) -> (ChannelType, u32) {
    match (ordered, reliability) {
        (true, Reliability::Reliable) => (ChannelType::Reliable, 0),
        (false, Reliability::Reliable) => (ChannelType::ReliableUnordered, 0),
        (true, Reliability::MaxRetransmits(n)) => (ChannelType::PartialReliableRexmit, n.into()),
        (false, Reliability::MaxRetransmits(n)) => {
            (ChannelType::PartialReliableRexmitUnordered, n.into())
        }
        (true, Reliability::MaxPacketLifeTime(t)) => (ChannelType::PartialReliableTimed, t.into()),
        (false, Reliability::MaxPacketLifeTime(t)) => {
            (ChannelType::PartialReliableTimedUnordered, t.into())
        }
    }
}

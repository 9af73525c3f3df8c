//! Ranging (RTT) seam.
//!
//! Ranging is driven by the core but implemented elsewhere. The core's
//! only job is to resolve session-scoped peer ids into peer MAC addresses
//! and hand the request off to the [`RangingDriver`].

use thiserror::Error;

use crate::types::{ClientId, MacAddress, PeerId, RangingId};

/// Reason a ranging request was rejected before reaching the driver.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RangingReason {
    /// The request referenced a session or peer that does not exist.
    #[error("invalid ranging request")]
    InvalidRequest,
}

/// A single ranging target as submitted by the client: a peer id scoped
/// to a discovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttRangingParams {
    pub peer_id: PeerId,
}

/// A ranging target with its peer id resolved to a MAC address. Peers the
/// session has never heard from resolve to [`MacAddress::ALL_ZERO`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangingPeer {
    pub peer_id: PeerId,
    pub peer_mac: MacAddress,
}

/// The RTT subsystem, driven by the core.
pub trait RangingDriver: Send + Sync {
    /// Start ranging against the resolved peers.
    fn start_ranging(&self, ranging_id: RangingId, client_id: ClientId, peers: Vec<RangingPeer>);
}

//! Core identifier and address types shared across the control plane.
//!
//! The firmware and the host name entities with small integers; these
//! aliases and newtypes keep the many id spaces from being mixed up at
//! call sites.

use std::fmt;

/// Identifier of a connected application client. Assigned by the caller
/// (the IPC layer) and unique across the process.
pub type ClientId = u32;

/// Identifier of a discovery session, allocated monotonically by the core.
pub type SessionId = u32;

/// Firmware-assigned identifier of a publish or subscribe session. Unique
/// across all live sessions in the process.
pub type PubSubId = u32;

/// Firmware-assigned identifier of a discovered peer within a session
/// (the "requestor instance id" of the NAN protocol).
pub type PeerId = u32;

/// Caller-supplied identifier of a follow-on message, echoed back on the
/// send-success / send-fail callbacks.
pub type MessageId = u32;

/// Firmware-assigned identifier of a NAN data-path.
pub type NdpId = u32;

/// Caller-supplied identifier of a ranging request.
pub type RangingId = u32;

/// Host-assigned token threaded through every HAL round-trip.
///
/// The counter is 16-bit and wraps; the sentinel value 0 means "ignore /
/// no command in flight" and is skipped by the allocator. A collision
/// with a long-outstanding id is resolved by treating the outstanding
/// command's timeout as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u16);

impl TransactionId {
    /// Sentinel: no response is expected under this id.
    pub const IGNORE: TransactionId = TransactionId(0);
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 6-byte IEEE 802.11 MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The all-zero address, used as "no discovery interface" placeholder.
    pub const ALL_ZERO: MacAddress = MacAddress([0; 6]);

    /// Returns true if this is the all-zero placeholder address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Cluster membership change reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterEvent {
    /// This device started a new cluster.
    Started,
    /// This device joined an existing cluster.
    Joined,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_display_is_colon_separated_hex() {
        let mac = MacAddress([0xaa, 0xbb, 0x0c, 0x1d, 0x2e, 0x3f]);
        assert_eq!(mac.to_string(), "aa:bb:0c:1d:2e:3f");
    }

    #[test]
    fn mac_address_zero_detection() {
        assert!(MacAddress::ALL_ZERO.is_zero());
        assert!(!MacAddress([0, 0, 0, 0, 0, 1]).is_zero());
    }

    #[test]
    fn transaction_id_ignore_is_zero() {
        assert_eq!(TransactionId::IGNORE, TransactionId(0));
    }
}

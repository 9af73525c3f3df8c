//! Data-path manager seam.
//!
//! The core triggers data-path operations and routes firmware callbacks;
//! the actual interface lifecycle (netd plumbing, network agent, etc.)
//! lives behind [`DataPathManager`]. The manager holds a non-owning
//! capability back into the dispatcher (a cloned [`HalEventSink`] or
//! control handle), never an owning reference to the state manager.
//!
//! [`HalEventSink`]: crate::hal::HalEventSink

use std::fmt;

use crate::hal::NanStatus;
use crate::types::{MacAddress, NdpId, PeerId, PubSubId};

/// Opaque key identifying a pending data-path negotiation. The core uses
/// it only to key the confirmation wake-timers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkSpecifier(pub String);

impl fmt::Display for NetworkSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Channel request type for an initiator-side data-path setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelRequestType {
    /// No channel preference.
    #[default]
    NotRequested,
    /// The given channel is preferred but not mandatory.
    Requested,
    /// The given channel is mandatory.
    Required,
}

/// Parameters of an initiator-side data-path setup, handed to the HAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPathInitiateRequest {
    pub peer_id: PeerId,
    pub channel_request_type: ChannelRequestType,
    pub channel: u32,
    pub peer: MacAddress,
    pub interface_name: String,
    pub app_info: Vec<u8>,
}

/// The data-path subsystem, driven by the core.
///
/// The `on_data_path_request` / `on_data_path_confirm` hooks return the
/// `NetworkSpecifier` of the negotiation they matched (if any) so the core
/// can arm or cancel the corresponding confirmation timer.
pub trait DataPathManager: Send + Sync {
    /// Create every data-path interface supported by the firmware.
    fn create_all_interfaces(&self);

    /// Delete all data-path interfaces.
    fn delete_all_interfaces(&self);

    /// The firmware confirmed creation of the named interface.
    fn on_interface_created(&self, interface_name: &str);

    /// The firmware confirmed deletion of the named interface.
    fn on_interface_deleted(&self, interface_name: &str);

    /// Initiator-side setup was accepted by the firmware (not completed).
    fn on_data_path_initiate_success(&self, network_specifier: &NetworkSpecifier, ndp_id: NdpId);

    /// Initiator-side setup was rejected by the firmware.
    fn on_data_path_initiate_fail(&self, network_specifier: &NetworkSpecifier, reason: NanStatus);

    /// A peer requested a data-path. Returns the matched negotiation key,
    /// or `None` if the request was not recognized / not accepted.
    fn on_data_path_request(
        &self,
        pub_sub_id: PubSubId,
        peer_mac: MacAddress,
        ndp_id: NdpId,
        app_info: &[u8],
    ) -> Option<NetworkSpecifier>;

    /// The data-path negotiation concluded. Returns the matched
    /// negotiation key, or `None` if unknown.
    fn on_data_path_confirm(
        &self,
        ndp_id: NdpId,
        peer_mac: MacAddress,
        accept: bool,
        reason: NanStatus,
        app_info: &[u8],
    ) -> Option<NetworkSpecifier>;

    /// The data-path was torn down.
    fn on_data_path_end(&self, ndp_id: NdpId);

    /// A confirmation wake-timer expired without the matching confirm.
    fn handle_data_path_timeout(&self, network_specifier: &NetworkSpecifier);

    /// NAN went down: drop all data-path state.
    fn on_nan_down_cleanup(&self);
}

//! Per-session discovery state.
//!
//! A [`DiscoverySessionState`] tracks one publish or subscribe session:
//! the host-allocated `session_id`, the firmware-allocated `pub_sub_id`,
//! the session callback capability, and the peers heard on the session
//! (instance id → MAC), which is what lets follow-on messages and ranging
//! requests address peers by id.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::callback::SessionCallback;
use crate::config::{PublishConfig, SubscribeConfig};
use crate::hal::HalApi;
use crate::types::{MacAddress, MessageId, PeerId, PubSubId, SessionId, TransactionId};

/// Whether a session publishes or subscribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Publish,
    Subscribe,
}

/// State of a single publish or subscribe discovery session.
pub struct DiscoverySessionState {
    session_id: SessionId,
    pub_sub_id: PubSubId,
    kind: SessionKind,
    callback: Arc<dyn SessionCallback>,
    peers: HashMap<PeerId, MacAddress>,
}

impl DiscoverySessionState {
    pub fn new(
        session_id: SessionId,
        pub_sub_id: PubSubId,
        kind: SessionKind,
        callback: Arc<dyn SessionCallback>,
    ) -> Self {
        Self {
            session_id,
            pub_sub_id,
            kind,
            callback,
            peers: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn pub_sub_id(&self) -> PubSubId {
        self.pub_sub_id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn callback(&self) -> &Arc<dyn SessionCallback> {
        &self.callback
    }

    /// MAC of a peer previously heard on this session, if any.
    pub fn peer_mac(&self, peer_id: PeerId) -> Option<MacAddress> {
        self.peers.get(&peer_id).copied()
    }

    /// Push an updated publish configuration under the existing
    /// `pub_sub_id`. Returns whether a HAL response should be awaited.
    pub fn update_publish(
        &self,
        transaction_id: TransactionId,
        hal: &dyn HalApi,
        config: &PublishConfig,
    ) -> bool {
        if self.kind != SessionKind::Publish {
            warn!(
                session_id = self.session_id,
                "update_publish on a subscribe session"
            );
            return false;
        }
        hal.publish(transaction_id, self.pub_sub_id, config)
    }

    /// Push an updated subscribe configuration under the existing
    /// `pub_sub_id`. Returns whether a HAL response should be awaited.
    pub fn update_subscribe(
        &self,
        transaction_id: TransactionId,
        hal: &dyn HalApi,
        config: &SubscribeConfig,
    ) -> bool {
        if self.kind != SessionKind::Subscribe {
            warn!(
                session_id = self.session_id,
                "update_subscribe on a publish session"
            );
            return false;
        }
        hal.subscribe(transaction_id, self.pub_sub_id, config)
    }

    /// Submit a follow-on message toward a peer of this session. Returns
    /// whether a HAL response should be awaited.
    pub fn send_message(
        &self,
        transaction_id: TransactionId,
        hal: &dyn HalApi,
        peer_id: PeerId,
        payload: &[u8],
        message_id: MessageId,
    ) -> bool {
        let Some(peer_mac) = self.peer_mac(peer_id) else {
            error!(
                session_id = self.session_id,
                peer_id, "send_message: no MAC recorded for peer"
            );
            return false;
        };

        hal.send_followon_message(
            transaction_id,
            self.pub_sub_id,
            peer_id,
            peer_mac,
            payload,
            message_id,
        )
    }

    /// Cancel the session in the firmware. Fire-and-forget; no response
    /// is awaited.
    pub fn terminate(&self, hal: &dyn HalApi) {
        match self.kind {
            SessionKind::Publish => {
                hal.stop_publish(TransactionId::IGNORE, self.pub_sub_id);
            }
            SessionKind::Subscribe => {
                hal.stop_subscribe(TransactionId::IGNORE, self.pub_sub_id);
            }
        }
    }

    /// A discovery match arrived for this session: record the peer and
    /// forward to the client.
    pub fn on_match(
        &mut self,
        requestor_instance_id: PeerId,
        peer_mac: MacAddress,
        service_specific_info: &[u8],
        match_filter: &[u8],
    ) {
        debug!(
            session_id = self.session_id,
            peer_id = requestor_instance_id,
            %peer_mac,
            "discovery match"
        );
        self.peers.insert(requestor_instance_id, peer_mac);
        self.callback
            .on_match(requestor_instance_id, service_specific_info, match_filter);
    }

    /// A follow-on message arrived for this session: record the peer and
    /// forward to the client.
    pub fn on_message_received(
        &mut self,
        requestor_instance_id: PeerId,
        peer_mac: MacAddress,
        payload: &[u8],
    ) {
        self.peers.insert(requestor_instance_id, peer_mac);
        self.callback.on_message_received(requestor_instance_id, payload);
    }
}

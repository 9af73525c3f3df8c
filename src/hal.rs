//! HAL adapter façade.
//!
//! The core drives the firmware through the [`HalApi`] trait and receives
//! everything back asynchronously: the adapter implementation turns raw
//! driver callbacks into dispatcher events via a [`HalEventSink`].
//!
//! ```text
//! ┌──────────────┐  HalApi (submit)   ┌──────────────┐
//! │  dispatcher  │ ─────────────────► │ HAL adapter  │
//! │    daemon    │ ◄───────────────── │  (firmware)  │
//! └──────────────┘  HalEventSink      └──────────────┘
//! ```
//!
//! Every submission method returns `bool`: whether the command reached
//! the driver. `false` means no response will ever arrive and the state
//! machine must not wait for one.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::{ConfigRequest, PublishConfig, SubscribeConfig};
use crate::datapath::DataPathInitiateRequest;
use crate::event::{CoreEvent, Notification, Response};
use crate::types::{
    ClusterEvent, MacAddress, MessageId, NdpId, PeerId, PubSubId, TransactionId,
};

/// Firmware status / reason codes surfaced to clients.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NanStatus {
    /// Generic failure.
    #[error("generic failure")]
    Error,
    /// Synthesized by the host when a firmware response never arrived.
    #[error("no response from firmware within the command timeout")]
    Timeout,
    /// Transmission was not acknowledged over the air.
    #[error("no over-the-air ack from peer")]
    NoOtaAck,
    /// Transmission failed before leaving the radio.
    #[error("transmit failed")]
    TxFail,
    /// The firmware rejected the request parameters.
    #[error("invalid request parameters")]
    InvalidArgs,
    /// The firmware is out of resources for the request.
    #[error("out of firmware resources")]
    NoResources,
    /// Internal firmware failure.
    #[error("internal firmware failure")]
    InternalFailure,
}

/// Firmware capability limits, fetched once per enable cycle and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub max_concurrent_clusters: u32,
    pub max_publishes: u32,
    pub max_subscribes: u32,
    pub max_service_name_len: u32,
    pub max_match_filter_len: u32,
    pub max_total_match_filter_len: u32,
    pub max_service_specific_info_len: u32,
    pub max_ndi_interfaces: u32,
    pub max_ndp_sessions: u32,
    pub max_queued_transmit_messages: u32,
}

/// The firmware-facing driver interface.
///
/// Calls are non-blocking request submissions; completions arrive later
/// as dispatcher events through the [`HalEventSink`]. The returned `bool`
/// indicates whether the command was submitted (and a response should be
/// awaited under the given transaction id).
pub trait HalApi: Send + Sync {
    /// Enable NAN and/or push a new merged configuration.
    /// `initial_configuration` is true on the first enable after NAN was
    /// down.
    fn enable_and_configure(
        &self,
        transaction_id: TransactionId,
        config: &ConfigRequest,
        initial_configuration: bool,
    ) -> bool;

    /// Disable NAN.
    fn disable(&self, transaction_id: TransactionId) -> bool;

    /// Start a new publish session (`pub_sub_id` 0) or update an existing
    /// one.
    fn publish(
        &self,
        transaction_id: TransactionId,
        pub_sub_id: PubSubId,
        config: &PublishConfig,
    ) -> bool;

    /// Cancel a publish session. Fire-and-forget; no response expected.
    fn stop_publish(&self, transaction_id: TransactionId, pub_sub_id: PubSubId) -> bool;

    /// Start a new subscribe session (`pub_sub_id` 0) or update an
    /// existing one.
    fn subscribe(
        &self,
        transaction_id: TransactionId,
        pub_sub_id: PubSubId,
        config: &SubscribeConfig,
    ) -> bool;

    /// Cancel a subscribe session. Fire-and-forget; no response expected.
    fn stop_subscribe(&self, transaction_id: TransactionId, pub_sub_id: PubSubId) -> bool;

    /// Queue a follow-on message toward a peer of a discovery session.
    #[allow(clippy::too_many_arguments)]
    fn send_followon_message(
        &self,
        transaction_id: TransactionId,
        pub_sub_id: PubSubId,
        requestor_instance_id: PeerId,
        dest: MacAddress,
        payload: &[u8],
        message_id: MessageId,
    ) -> bool;

    /// Query firmware capability limits.
    fn get_capabilities(&self, transaction_id: TransactionId) -> bool;

    /// Create a data-path (NDI) network interface.
    fn create_interface(&self, transaction_id: TransactionId, interface_name: &str) -> bool;

    /// Delete a data-path (NDI) network interface.
    fn delete_interface(&self, transaction_id: TransactionId, interface_name: &str) -> bool;

    /// Initiate a data-path toward a peer.
    fn initiate_data_path(
        &self,
        transaction_id: TransactionId,
        request: &DataPathInitiateRequest,
    ) -> bool;

    /// Respond to a peer's data-path request.
    fn respond_to_data_path_request(
        &self,
        transaction_id: TransactionId,
        accept: bool,
        ndp_id: NdpId,
        interface_name: &str,
        app_info: &[u8],
    ) -> bool;

    /// Tear down a data-path.
    fn end_data_path(&self, transaction_id: TransactionId, ndp_id: NdpId) -> bool;

    /// Release the driver; the next enable re-initializes it.
    fn deinit(&self);
}

/// Inbound event surface for the HAL adapter.
///
/// Cloneable; the adapter calls these from its own callback context and
/// the events are serialized onto the dispatcher queue. If the dispatcher
/// is gone (shutdown) the event is dropped with a debug log.
#[derive(Clone)]
pub struct HalEventSink {
    events: mpsc::UnboundedSender<CoreEvent>,
}

impl HalEventSink {
    pub(crate) fn new(events: mpsc::UnboundedSender<CoreEvent>) -> Self {
        Self { events }
    }

    /// Whether the dispatcher is still accepting events.
    pub fn is_connected(&self) -> bool {
        !self.events.is_closed()
    }

    fn response(&self, transaction_id: TransactionId, response: Response) {
        let name = response.name();
        if self
            .events
            .send(CoreEvent::Response {
                transaction_id,
                response,
            })
            .is_err()
        {
            debug!(response = name, "dispatcher gone; dropping response");
        }
    }

    fn notification(&self, notification: Notification) {
        let name = notification.name();
        if self.events.send(CoreEvent::Notification(notification)).is_err() {
            debug!(notification = name, "dispatcher gone; dropping notification");
        }
    }

    // ------------------------------------------------------------------
    // Responses
    // ------------------------------------------------------------------

    pub fn on_config_success(&self, transaction_id: TransactionId) {
        self.response(transaction_id, Response::ConfigSuccess);
    }

    pub fn on_config_fail(&self, transaction_id: TransactionId, reason: NanStatus) {
        self.response(transaction_id, Response::ConfigFail { reason });
    }

    pub fn on_session_config_success(
        &self,
        transaction_id: TransactionId,
        is_publish: bool,
        pub_sub_id: PubSubId,
    ) {
        self.response(
            transaction_id,
            Response::SessionConfigSuccess {
                is_publish,
                pub_sub_id,
            },
        );
    }

    pub fn on_session_config_fail(
        &self,
        transaction_id: TransactionId,
        is_publish: bool,
        reason: NanStatus,
    ) {
        self.response(
            transaction_id,
            Response::SessionConfigFail { is_publish, reason },
        );
    }

    pub fn on_message_send_queued_success(&self, transaction_id: TransactionId) {
        self.response(transaction_id, Response::MessageSendQueuedSuccess);
    }

    pub fn on_message_send_queued_fail(&self, transaction_id: TransactionId, reason: NanStatus) {
        self.response(transaction_id, Response::MessageSendQueuedFail { reason });
    }

    pub fn on_capabilities_updated(
        &self,
        transaction_id: TransactionId,
        capabilities: Capabilities,
    ) {
        self.response(transaction_id, Response::CapabilitiesUpdated { capabilities });
    }

    pub fn on_create_interface_response(
        &self,
        transaction_id: TransactionId,
        success: bool,
        reason: NanStatus,
    ) {
        self.response(transaction_id, Response::InterfaceCreated { success, reason });
    }

    pub fn on_delete_interface_response(
        &self,
        transaction_id: TransactionId,
        success: bool,
        reason: NanStatus,
    ) {
        self.response(transaction_id, Response::InterfaceDeleted { success, reason });
    }

    pub fn on_initiate_data_path_success(&self, transaction_id: TransactionId, ndp_id: NdpId) {
        self.response(transaction_id, Response::InitiateDataPathSuccess { ndp_id });
    }

    pub fn on_initiate_data_path_fail(&self, transaction_id: TransactionId, reason: NanStatus) {
        self.response(transaction_id, Response::InitiateDataPathFail { reason });
    }

    pub fn on_respond_to_data_path_setup_response(
        &self,
        transaction_id: TransactionId,
        success: bool,
        reason: NanStatus,
    ) {
        self.response(
            transaction_id,
            Response::RespondToDataPathSetup { success, reason },
        );
    }

    pub fn on_end_data_path_response(
        &self,
        transaction_id: TransactionId,
        success: bool,
        reason: NanStatus,
    ) {
        self.response(transaction_id, Response::EndDataPath { success, reason });
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub fn on_interface_address_change(&self, mac: MacAddress) {
        self.notification(Notification::InterfaceAddressChange { mac });
    }

    pub fn on_cluster_change(&self, event: ClusterEvent, cluster_id: MacAddress) {
        self.notification(Notification::ClusterChange { event, cluster_id });
    }

    pub fn on_match(
        &self,
        pub_sub_id: PubSubId,
        requestor_instance_id: PeerId,
        peer_mac: MacAddress,
        service_specific_info: Vec<u8>,
        match_filter: Vec<u8>,
    ) {
        self.notification(Notification::Match {
            pub_sub_id,
            requestor_instance_id,
            peer_mac,
            service_specific_info,
            match_filter,
        });
    }

    pub fn on_session_terminated(&self, pub_sub_id: PubSubId, reason: NanStatus, is_publish: bool) {
        self.notification(Notification::SessionTerminated {
            pub_sub_id,
            reason,
            is_publish,
        });
    }

    pub fn on_message_received(
        &self,
        pub_sub_id: PubSubId,
        requestor_instance_id: PeerId,
        peer_mac: MacAddress,
        payload: Vec<u8>,
    ) {
        self.notification(Notification::MessageReceived {
            pub_sub_id,
            requestor_instance_id,
            peer_mac,
            payload,
        });
    }

    pub fn on_nan_down(&self, reason: NanStatus) {
        self.notification(Notification::NanDown { reason });
    }

    pub fn on_message_send_success(&self, transaction_id: TransactionId) {
        self.notification(Notification::MessageSendSuccess { transaction_id });
    }

    pub fn on_message_send_fail(&self, transaction_id: TransactionId, reason: NanStatus) {
        self.notification(Notification::MessageSendFail {
            transaction_id,
            reason,
        });
    }

    pub fn on_data_path_request(
        &self,
        pub_sub_id: PubSubId,
        peer_mac: MacAddress,
        ndp_id: NdpId,
        app_info: Vec<u8>,
    ) {
        self.notification(Notification::DataPathRequest {
            pub_sub_id,
            peer_mac,
            ndp_id,
            app_info,
        });
    }

    pub fn on_data_path_confirm(
        &self,
        ndp_id: NdpId,
        peer_mac: MacAddress,
        accept: bool,
        reason: NanStatus,
        app_info: Vec<u8>,
    ) {
        self.notification(Notification::DataPathConfirm {
            ndp_id,
            peer_mac,
            accept,
            reason,
            app_info,
        });
    }

    pub fn on_data_path_end(&self, ndp_id: NdpId) {
        self.notification(Notification::DataPathEnd { ndp_id });
    }
}

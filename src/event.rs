//! Tagged event envelopes for the dispatcher.
//!
//! Every input to the core arrives as a [`CoreEvent`]: an application
//! command, a firmware response (carrying the echoed transaction id), a
//! firmware notification, or a timer expiry. One variant per concrete
//! operation, carrying exactly its typed payload, so the dispatcher's
//! `match` is exhaustive at compile time.

use std::sync::Arc;

use crate::callback::{EventCallback, SessionCallback};
use crate::config::{ConfigRequest, PublishConfig, SubscribeConfig};
use crate::datapath::{DataPathInitiateRequest, NetworkSpecifier};
use crate::hal::{Capabilities, NanStatus};
use crate::ranging::RttRangingParams;
use crate::types::{
    ClientId, ClusterEvent, MacAddress, MessageId, NdpId, PeerId, PubSubId, RangingId, SessionId,
    TransactionId,
};

/// An application-initiated action.
pub enum Command {
    Connect {
        client_id: ClientId,
        uid: u32,
        pid: u32,
        calling_package: String,
        callback: Arc<dyn EventCallback>,
        config_request: ConfigRequest,
        notify_identity_change: bool,
    },
    Disconnect {
        client_id: ClientId,
    },
    TerminateSession {
        client_id: ClientId,
        session_id: SessionId,
    },
    Publish {
        client_id: ClientId,
        config: PublishConfig,
        callback: Arc<dyn SessionCallback>,
    },
    UpdatePublish {
        client_id: ClientId,
        session_id: SessionId,
        config: PublishConfig,
    },
    Subscribe {
        client_id: ClientId,
        config: SubscribeConfig,
        callback: Arc<dyn SessionCallback>,
    },
    UpdateSubscribe {
        client_id: ClientId,
        session_id: SessionId,
        config: SubscribeConfig,
    },
    EnqueueSendMessage {
        client_id: ClientId,
        session_id: SessionId,
        peer_id: PeerId,
        payload: Vec<u8>,
        message_id: MessageId,
        retry_count: u32,
    },
    /// Internal: attempt to move the head of the host send queue into the
    /// firmware queue. The queues are inspected when the command executes,
    /// not when it is enqueued.
    TransmitNextMessage,
    EnableUsage,
    DisableUsage,
    StartRanging {
        client_id: ClientId,
        session_id: SessionId,
        ranging_id: RangingId,
        params: Vec<RttRangingParams>,
    },
    GetCapabilities,
    CreateAllDataPathInterfaces,
    DeleteAllDataPathInterfaces,
    CreateDataPathInterface {
        interface_name: String,
    },
    DeleteDataPathInterface {
        interface_name: String,
    },
    InitiateDataPathSetup {
        network_specifier: NetworkSpecifier,
        request: DataPathInitiateRequest,
    },
    RespondToDataPathSetupRequest {
        accept: bool,
        ndp_id: NdpId,
        interface_name: String,
        app_info: Vec<u8>,
    },
    EndDataPath {
        ndp_id: NdpId,
    },
}

impl Command {
    /// Short name for log records.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "CONNECT",
            Command::Disconnect { .. } => "DISCONNECT",
            Command::TerminateSession { .. } => "TERMINATE_SESSION",
            Command::Publish { .. } => "PUBLISH",
            Command::UpdatePublish { .. } => "UPDATE_PUBLISH",
            Command::Subscribe { .. } => "SUBSCRIBE",
            Command::UpdateSubscribe { .. } => "UPDATE_SUBSCRIBE",
            Command::EnqueueSendMessage { .. } => "ENQUEUE_SEND_MESSAGE",
            Command::TransmitNextMessage => "TRANSMIT_NEXT_MESSAGE",
            Command::EnableUsage => "ENABLE_USAGE",
            Command::DisableUsage => "DISABLE_USAGE",
            Command::StartRanging { .. } => "START_RANGING",
            Command::GetCapabilities => "GET_CAPABILITIES",
            Command::CreateAllDataPathInterfaces => "CREATE_ALL_DATA_PATH_INTERFACES",
            Command::DeleteAllDataPathInterfaces => "DELETE_ALL_DATA_PATH_INTERFACES",
            Command::CreateDataPathInterface { .. } => "CREATE_DATA_PATH_INTERFACE",
            Command::DeleteDataPathInterface { .. } => "DELETE_DATA_PATH_INTERFACE",
            Command::InitiateDataPathSetup { .. } => "INITIATE_DATA_PATH_SETUP",
            Command::RespondToDataPathSetupRequest { .. } => "RESPOND_TO_DATA_PATH_SETUP_REQUEST",
            Command::EndDataPath { .. } => "END_DATA_PATH",
        }
    }
}

/// A firmware reply to a previously issued command. Delivered alongside
/// the transaction id echoed by the firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ConfigSuccess,
    ConfigFail {
        reason: NanStatus,
    },
    SessionConfigSuccess {
        is_publish: bool,
        pub_sub_id: PubSubId,
    },
    SessionConfigFail {
        is_publish: bool,
        reason: NanStatus,
    },
    MessageSendQueuedSuccess,
    MessageSendQueuedFail {
        reason: NanStatus,
    },
    CapabilitiesUpdated {
        capabilities: Capabilities,
    },
    InterfaceCreated {
        success: bool,
        reason: NanStatus,
    },
    InterfaceDeleted {
        success: bool,
        reason: NanStatus,
    },
    InitiateDataPathSuccess {
        ndp_id: NdpId,
    },
    InitiateDataPathFail {
        reason: NanStatus,
    },
    RespondToDataPathSetup {
        success: bool,
        reason: NanStatus,
    },
    EndDataPath {
        success: bool,
        reason: NanStatus,
    },
}

impl Response {
    /// Short name for log records.
    pub fn name(&self) -> &'static str {
        match self {
            Response::ConfigSuccess => "ON_CONFIG_SUCCESS",
            Response::ConfigFail { .. } => "ON_CONFIG_FAIL",
            Response::SessionConfigSuccess { .. } => "ON_SESSION_CONFIG_SUCCESS",
            Response::SessionConfigFail { .. } => "ON_SESSION_CONFIG_FAIL",
            Response::MessageSendQueuedSuccess => "ON_MESSAGE_SEND_QUEUED_SUCCESS",
            Response::MessageSendQueuedFail { .. } => "ON_MESSAGE_SEND_QUEUED_FAIL",
            Response::CapabilitiesUpdated { .. } => "ON_CAPABILITIES_UPDATED",
            Response::InterfaceCreated { .. } => "ON_CREATE_INTERFACE",
            Response::InterfaceDeleted { .. } => "ON_DELETE_INTERFACE",
            Response::InitiateDataPathSuccess { .. } => "ON_INITIATE_DATA_PATH_SUCCESS",
            Response::InitiateDataPathFail { .. } => "ON_INITIATE_DATA_PATH_FAIL",
            Response::RespondToDataPathSetup { .. } => "ON_RESPOND_TO_DATA_PATH_SETUP_REQUEST",
            Response::EndDataPath { .. } => "ON_END_DATA_PATH",
        }
    }
}

/// A firmware-initiated event. Notifications bypass the command gate and
/// are processed in any dispatcher state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    InterfaceAddressChange {
        mac: MacAddress,
    },
    ClusterChange {
        event: ClusterEvent,
        cluster_id: MacAddress,
    },
    Match {
        pub_sub_id: PubSubId,
        requestor_instance_id: PeerId,
        peer_mac: MacAddress,
        service_specific_info: Vec<u8>,
        match_filter: Vec<u8>,
    },
    SessionTerminated {
        pub_sub_id: PubSubId,
        reason: NanStatus,
        is_publish: bool,
    },
    MessageReceived {
        pub_sub_id: PubSubId,
        requestor_instance_id: PeerId,
        peer_mac: MacAddress,
        payload: Vec<u8>,
    },
    NanDown {
        reason: NanStatus,
    },
    MessageSendSuccess {
        transaction_id: TransactionId,
    },
    MessageSendFail {
        transaction_id: TransactionId,
        reason: NanStatus,
    },
    DataPathRequest {
        pub_sub_id: PubSubId,
        peer_mac: MacAddress,
        ndp_id: NdpId,
        app_info: Vec<u8>,
    },
    DataPathConfirm {
        ndp_id: NdpId,
        peer_mac: MacAddress,
        accept: bool,
        reason: NanStatus,
        app_info: Vec<u8>,
    },
    DataPathEnd {
        ndp_id: NdpId,
    },
}

impl Notification {
    /// Short name for log records.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::InterfaceAddressChange { .. } => "INTERFACE_CHANGE",
            Notification::ClusterChange { .. } => "CLUSTER_CHANGE",
            Notification::Match { .. } => "MATCH",
            Notification::SessionTerminated { .. } => "SESSION_TERMINATED",
            Notification::MessageReceived { .. } => "MESSAGE_RECEIVED",
            Notification::NanDown { .. } => "NAN_DOWN",
            Notification::MessageSendSuccess { .. } => "ON_MESSAGE_SEND_SUCCESS",
            Notification::MessageSendFail { .. } => "ON_MESSAGE_SEND_FAIL",
            Notification::DataPathRequest { .. } => "ON_DATA_PATH_REQUEST",
            Notification::DataPathConfirm { .. } => "ON_DATA_PATH_CONFIRM",
            Notification::DataPathEnd { .. } => "ON_DATA_PATH_END",
        }
    }
}

/// The dispatcher-level envelope: everything the single-consumer loop can
/// receive.
pub enum CoreEvent {
    Command(Command),
    Response {
        transaction_id: TransactionId,
        response: Response,
    },
    Notification(Notification),
    /// The 5 s response timer of the in-flight command fired.
    ResponseTimeout {
        transaction_id: TransactionId,
    },
    /// The send-message transmission timer fired.
    SendMessageTimeout,
    /// A data-path confirmation timer fired.
    DataPathTimeout {
        network_specifier: NetworkSpecifier,
    },
}

impl CoreEvent {
    /// Short name for log records.
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::Command(_) => "COMMAND",
            CoreEvent::Response { .. } => "RESPONSE",
            CoreEvent::Notification(_) => "NOTIFICATION",
            CoreEvent::ResponseTimeout { .. } => "RESPONSE_TIMEOUT",
            CoreEvent::SendMessageTimeout => "SEND_MESSAGE_TIMEOUT",
            CoreEvent::DataPathTimeout { .. } => "DATA_PATH_TIMEOUT",
        }
    }
}

//! Core state and event handlers.
//!
//! [`CoreState`] owns everything the dispatcher mutates: the client
//! registry, the current firmware configuration, the discovery interface
//! address, the capabilities cache, the two-tier send queue, and the
//! data-path confirmation timers. All methods run on the dispatcher task;
//! nothing here is locked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::broadcast::StateBroadcaster;
use crate::client::ClientState;
use crate::config::{merge_config_requests, ConfigRequest, PublishConfig, SubscribeConfig};
use crate::datapath::{DataPathManager, NetworkSpecifier};
use crate::event::{Command, CoreEvent, Notification, Response};
use crate::hal::{Capabilities, HalApi, NanStatus};
use crate::ranging::{RangingDriver, RangingPeer, RangingReason, RttRangingParams};
use crate::sendqueue::{QueuedSendMessage, SendMessageQueue};
use crate::session::{DiscoverySessionState, SessionKind};
use crate::timer::WakeupTimer;
use crate::types::{
    ClientId, ClusterEvent, MacAddress, NdpId, PubSubId, RangingId, SessionId, TransactionId,
};

use super::ManagerConfig;

/// The command currently awaiting a firmware response, together with the
/// transaction id it was issued under. For transmit-next commands the
/// dequeued send message rides along so the response handler can move it
/// into the firmware tier (or put it back).
pub(crate) struct InFlightCommand {
    pub transaction_id: TransactionId,
    pub command: Command,
    pub sent_message: Option<QueuedSendMessage>,
}

/// All dispatcher-owned state of the NAN control plane.
pub(crate) struct CoreState {
    config: ManagerConfig,
    hal: Arc<dyn HalApi>,
    data_path: Arc<dyn DataPathManager>,
    ranging: Arc<dyn RangingDriver>,
    broadcaster: Arc<dyn StateBroadcaster>,
    /// Sender back into the dispatcher queue, used for self-enqueued
    /// commands (transmit-next, the enable-usage kick-offs) and timers.
    events: mpsc::UnboundedSender<CoreEvent>,
    /// The only cross-thread atom: read by external query paths without
    /// going through the dispatcher.
    usage_enabled: Arc<AtomicBool>,

    clients: HashMap<ClientId, ClientState>,
    capabilities: Option<Capabilities>,
    current_config: Option<ConfigRequest>,
    current_discovery_mac: MacAddress,
    next_session_id: SessionId,

    send_queue: SendMessageQueue,
    send_timeout_timer: WakeupTimer,
    data_path_timers: HashMap<NetworkSpecifier, WakeupTimer>,
}

impl CoreState {
    pub(crate) fn new(
        config: ManagerConfig,
        hal: Arc<dyn HalApi>,
        data_path: Arc<dyn DataPathManager>,
        ranging: Arc<dyn RangingDriver>,
        broadcaster: Arc<dyn StateBroadcaster>,
        events: mpsc::UnboundedSender<CoreEvent>,
        usage_enabled: Arc<AtomicBool>,
    ) -> Self {
        let send_timeout_timer = WakeupTimer::new(events.clone());
        Self {
            config,
            hal,
            data_path,
            ranging,
            broadcaster,
            events,
            usage_enabled,
            clients: HashMap::new(),
            capabilities: None,
            current_config: None,
            current_discovery_mac: MacAddress::ALL_ZERO,
            next_session_id: 1,
            send_queue: SendMessageQueue::new(),
            send_timeout_timer,
            data_path_timers: HashMap::new(),
        }
    }

    // ==================================================================
    // Commands
    // ==================================================================

    /// Execute a command. Returns the in-flight record when a firmware
    /// response must be awaited under `transaction_id`, `None` when the
    /// command completed locally (error in state, or a command that never
    /// round-trips).
    pub(crate) fn process_command(
        &mut self,
        transaction_id: TransactionId,
        command: Command,
    ) -> Option<InFlightCommand> {
        let mut sent_message = None;

        let wait_for_response = match &command {
            Command::Connect {
                client_id,
                uid,
                pid,
                calling_package,
                callback,
                config_request,
                notify_identity_change,
            } => self.connect_local(
                transaction_id,
                *client_id,
                *uid,
                *pid,
                calling_package,
                callback,
                config_request,
                *notify_identity_change,
            ),
            Command::Disconnect { client_id } => self.disconnect_local(transaction_id, *client_id),
            Command::TerminateSession {
                client_id,
                session_id,
            } => {
                self.terminate_session_local(*client_id, *session_id);
                false
            }
            Command::Publish { client_id, config, .. } => {
                self.publish_local(transaction_id, *client_id, config)
            }
            Command::UpdatePublish {
                client_id,
                session_id,
                config,
            } => self.update_publish_local(transaction_id, *client_id, *session_id, config),
            Command::Subscribe { client_id, config, .. } => {
                self.subscribe_local(transaction_id, *client_id, config)
            }
            Command::UpdateSubscribe {
                client_id,
                session_id,
                config,
            } => self.update_subscribe_local(transaction_id, *client_id, *session_id, config),
            Command::EnqueueSendMessage {
                client_id,
                session_id,
                peer_id,
                payload,
                message_id,
                retry_count,
            } => {
                let arrival_seq = self.send_queue.enqueue(
                    *client_id,
                    *session_id,
                    *peer_id,
                    payload.clone(),
                    *message_id,
                    *retry_count,
                );
                debug!(arrival_seq, message_id, "follow-on message queued on host");
                if !self.send_queue.is_blocked() {
                    self.transmit_next_message();
                }
                false
            }
            Command::TransmitNextMessage => {
                if self.send_queue.is_blocked() {
                    debug!("transmit-next: send queue blocked");
                    false
                } else if let Some(message) = self.send_queue.pop_next_host() {
                    if self.send_followon_local(transaction_id, &message) {
                        sent_message = Some(message);
                        true
                    } else {
                        warn!(
                            arrival_seq = message.arrival_seq,
                            message_id = message.message_id,
                            "transmit-next: submission failed, dropping message"
                        );
                        false
                    }
                } else {
                    debug!("transmit-next: host queue empty");
                    false
                }
            }
            Command::EnableUsage => {
                self.enable_usage_local();
                false
            }
            Command::DisableUsage => {
                self.disable_usage_local();
                false
            }
            Command::StartRanging {
                client_id,
                session_id,
                ranging_id,
                params,
            } => {
                self.start_ranging_local(*client_id, *session_id, *ranging_id, params);
                false
            }
            Command::GetCapabilities => {
                if self.capabilities.is_some() {
                    debug!("get-capabilities: already cached, skipping");
                    false
                } else {
                    self.hal.get_capabilities(transaction_id)
                }
            }
            Command::CreateAllDataPathInterfaces => {
                self.data_path.create_all_interfaces();
                false
            }
            Command::DeleteAllDataPathInterfaces => {
                self.data_path.delete_all_interfaces();
                false
            }
            Command::CreateDataPathInterface { interface_name } => {
                self.hal.create_interface(transaction_id, interface_name)
            }
            Command::DeleteDataPathInterface { interface_name } => {
                self.hal.delete_interface(transaction_id, interface_name)
            }
            Command::InitiateDataPathSetup {
                network_specifier,
                request,
            } => {
                let wait = self.hal.initiate_data_path(transaction_id, request);
                if wait {
                    self.schedule_data_path_confirm_timeout(network_specifier.clone());
                }
                wait
            }
            Command::RespondToDataPathSetupRequest {
                accept,
                ndp_id,
                interface_name,
                app_info,
            } => self.hal.respond_to_data_path_request(
                transaction_id,
                *accept,
                *ndp_id,
                interface_name,
                app_info,
            ),
            Command::EndDataPath { ndp_id } => self.hal.end_data_path(transaction_id, *ndp_id),
        };

        if wait_for_response {
            Some(InFlightCommand {
                transaction_id,
                command,
                sent_message,
            })
        } else {
            None
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn connect_local(
        &mut self,
        transaction_id: TransactionId,
        client_id: ClientId,
        uid: u32,
        pid: u32,
        calling_package: &str,
        callback: &Arc<dyn crate::callback::EventCallback>,
        config_request: &ConfigRequest,
        notify_identity_change: bool,
    ) -> bool {
        if !self.usage_enabled.load(Ordering::Relaxed) {
            warn!(client_id, "connect: usage is disabled");
            return false;
        }

        if self.clients.contains_key(&client_id) {
            error!(client_id, "connect: entry already exists for client id");
        }

        // Note: compares the requested config against the current firmware
        // configuration, not against the merge. A request that would merge
        // cleanly but differs from the current configuration is rejected.
        if let Some(current) = &self.current_config {
            if current != config_request {
                callback.on_connect_fail(NanStatus::Error);
                return false;
            }
        }

        let Some(merged) = merge_config_requests(
            Some(config_request),
            self.clients.values().map(ClientState::config_request),
        ) else {
            return false;
        };

        if self.current_config.as_ref() == Some(&merged) {
            // Firmware is already configured the way this client needs:
            // attach without a HAL round-trip.
            callback.on_connect_success(client_id);
            let client = ClientState::new(
                client_id,
                uid,
                pid,
                calling_package.to_string(),
                Arc::clone(callback),
                config_request.clone(),
                notify_identity_change,
            );
            client.on_interface_address_change(self.current_discovery_mac);
            self.clients.insert(client_id, client);
            return false;
        }

        let initial_configuration = self.current_config.is_none();
        self.hal
            .enable_and_configure(transaction_id, &merged, initial_configuration)
    }

    fn disconnect_local(&mut self, transaction_id: TransactionId, client_id: ClientId) -> bool {
        let Some(mut client) = self.clients.remove(&client_id) else {
            error!(client_id, "disconnect: no such client");
            return false;
        };
        client.destroy(self.hal.as_ref());

        if self.clients.is_empty() {
            self.current_config = None;
            self.hal.disable(TransactionId::IGNORE);
            return false;
        }

        let Some(merged) = merge_config_requests(
            None,
            self.clients.values().map(ClientState::config_request),
        ) else {
            return false;
        };
        if self.current_config.as_ref() == Some(&merged) {
            return false;
        }

        self.hal.enable_and_configure(transaction_id, &merged, false)
    }

    fn terminate_session_local(&mut self, client_id: ClientId, session_id: SessionId) {
        let hal = Arc::clone(&self.hal);
        match self.clients.get_mut(&client_id) {
            Some(client) => client.terminate_session(session_id, hal.as_ref()),
            None => error!(client_id, "terminate_session: no such client"),
        }
    }

    fn publish_local(
        &mut self,
        transaction_id: TransactionId,
        client_id: ClientId,
        config: &PublishConfig,
    ) -> bool {
        if !self.clients.contains_key(&client_id) {
            error!(client_id, "publish: no such client");
            return false;
        }
        // pub_sub_id 0 requests a new session from the firmware.
        self.hal.publish(transaction_id, 0, config)
    }

    fn update_publish_local(
        &mut self,
        transaction_id: TransactionId,
        client_id: ClientId,
        session_id: SessionId,
        config: &PublishConfig,
    ) -> bool {
        let Some(client) = self.clients.get(&client_id) else {
            error!(client_id, "update_publish: no such client");
            return false;
        };
        let Some(session) = client.session(session_id) else {
            error!(client_id, session_id, "update_publish: no such session");
            return false;
        };
        session.update_publish(transaction_id, self.hal.as_ref(), config)
    }

    fn subscribe_local(
        &mut self,
        transaction_id: TransactionId,
        client_id: ClientId,
        config: &SubscribeConfig,
    ) -> bool {
        if !self.clients.contains_key(&client_id) {
            error!(client_id, "subscribe: no such client");
            return false;
        }
        self.hal.subscribe(transaction_id, 0, config)
    }

    fn update_subscribe_local(
        &mut self,
        transaction_id: TransactionId,
        client_id: ClientId,
        session_id: SessionId,
        config: &SubscribeConfig,
    ) -> bool {
        let Some(client) = self.clients.get(&client_id) else {
            error!(client_id, "update_subscribe: no such client");
            return false;
        };
        let Some(session) = client.session(session_id) else {
            error!(client_id, session_id, "update_subscribe: no such session");
            return false;
        };
        session.update_subscribe(transaction_id, self.hal.as_ref(), config)
    }

    fn send_followon_local(
        &mut self,
        transaction_id: TransactionId,
        message: &QueuedSendMessage,
    ) -> bool {
        let Some(client) = self.clients.get(&message.client_id) else {
            error!(
                client_id = message.client_id,
                "send follow-on: no such client"
            );
            return false;
        };
        let Some(session) = client.session(message.session_id) else {
            error!(
                client_id = message.client_id,
                session_id = message.session_id,
                "send follow-on: no such session"
            );
            return false;
        };
        session.send_message(
            transaction_id,
            self.hal.as_ref(),
            message.peer_id,
            &message.payload,
            message.message_id,
        )
    }

    fn enable_usage_local(&mut self) {
        if self.usage_enabled.load(Ordering::Relaxed) {
            return;
        }

        // Force a re-init of the NAN HAL on the next configure.
        self.hal.deinit();

        self.usage_enabled.store(true, Ordering::Relaxed);
        self.enqueue_command(Command::GetCapabilities);
        self.enqueue_command(Command::CreateAllDataPathInterfaces);
        self.broadcaster.nan_state_changed(true);
    }

    fn disable_usage_local(&mut self) {
        if !self.usage_enabled.load(Ordering::Relaxed) {
            return;
        }

        self.on_nan_down_local();
        self.enqueue_command(Command::DeleteAllDataPathInterfaces);

        self.usage_enabled.store(false, Ordering::Relaxed);
        self.hal.disable(TransactionId::IGNORE);
        self.hal.deinit();

        self.broadcaster.nan_state_changed(false);
    }

    fn start_ranging_local(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
        ranging_id: RangingId,
        params: &[RttRangingParams],
    ) {
        let Some(client) = self.clients.get(&client_id) else {
            error!(client_id, "start_ranging: no such client");
            return;
        };
        let Some(session) = client.session(session_id) else {
            error!(client_id, session_id, "start_ranging: no such session");
            client.callback().on_ranging_failure(
                ranging_id,
                RangingReason::InvalidRequest,
                "Invalid session ID",
            );
            return;
        };

        let peers = params
            .iter()
            .map(|param| {
                let peer_mac = match session.peer_mac(param.peer_id) {
                    Some(mac) => mac,
                    None => {
                        debug!(peer_id = param.peer_id, "start_ranging: no MAC for peer");
                        MacAddress::ALL_ZERO
                    }
                };
                RangingPeer {
                    peer_id: param.peer_id,
                    peer_mac,
                }
            })
            .collect();

        self.ranging.start_ranging(ranging_id, client_id, peers);
    }

    // ==================================================================
    // Responses
    // ==================================================================

    pub(crate) fn process_response(&mut self, in_flight: InFlightCommand, response: Response) {
        match response {
            Response::ConfigSuccess => self.on_config_completed_local(in_flight),
            Response::ConfigFail { reason } => self.on_config_failed_local(in_flight, reason),
            Response::SessionConfigSuccess {
                is_publish,
                pub_sub_id,
            } => self.on_session_config_success_local(in_flight, pub_sub_id, is_publish),
            Response::SessionConfigFail { is_publish, reason } => {
                self.on_session_config_fail_local(in_flight, is_publish, reason)
            }
            Response::MessageSendQueuedSuccess => self.on_message_send_queued_success(in_flight),
            Response::MessageSendQueuedFail { reason } => {
                self.on_message_send_queued_fail(in_flight, reason)
            }
            Response::CapabilitiesUpdated { capabilities } => {
                debug!(?capabilities, "capabilities updated");
                self.capabilities = Some(capabilities);
            }
            Response::InterfaceCreated { success, reason } => {
                self.on_create_interface_response(in_flight, success, reason)
            }
            Response::InterfaceDeleted { success, reason } => {
                self.on_delete_interface_response(in_flight, success, reason)
            }
            Response::InitiateDataPathSuccess { ndp_id } => {
                self.on_initiate_data_path_response(in_flight, Ok(ndp_id))
            }
            Response::InitiateDataPathFail { reason } => {
                self.on_initiate_data_path_response(in_flight, Err(reason))
            }
            // TODO: surface respond/end data-path failures to the
            // data-path manager once it grows an interest in them.
            Response::RespondToDataPathSetup { success, reason } => {
                debug!(success, ?reason, "respond-to-data-path-setup response");
            }
            Response::EndDataPath { success, reason } => {
                debug!(success, ?reason, "end-data-path response");
            }
        }
    }

    fn on_config_completed_local(&mut self, in_flight: InFlightCommand) {
        match in_flight.command {
            Command::Connect {
                client_id,
                uid,
                pid,
                calling_package,
                callback,
                config_request,
                notify_identity_change,
            } => {
                let client = ClientState::new(
                    client_id,
                    uid,
                    pid,
                    calling_package,
                    Arc::clone(&callback),
                    config_request,
                    notify_identity_change,
                );
                self.clients.insert(client_id, client);
                callback.on_connect_success(client_id);
                if let Some(client) = self.clients.get(&client_id) {
                    client.on_interface_address_change(self.current_discovery_mac);
                }
            }
            Command::Disconnect { .. } => {
                // Configuration downgrade after removing a client; nothing
                // to report.
            }
            other => {
                error!(
                    command = other.name(),
                    "config-success response for an unexpected command"
                );
                return;
            }
        }

        self.current_config = merge_config_requests(
            None,
            self.clients.values().map(ClientState::config_request),
        );
    }

    fn on_config_failed_local(&mut self, in_flight: InFlightCommand, reason: NanStatus) {
        match in_flight.command {
            Command::Connect { callback, .. } => callback.on_connect_fail(reason),
            Command::Disconnect { .. } => {
                // Reconfiguration after a disconnect failed; the previous
                // configuration is still running, nothing to do.
            }
            other => error!(
                command = other.name(),
                "config-fail response for an unexpected command"
            ),
        }
    }

    fn on_session_config_success_local(
        &mut self,
        in_flight: InFlightCommand,
        pub_sub_id: PubSubId,
        is_publish: bool,
    ) {
        match in_flight.command {
            Command::Publish {
                client_id, callback, ..
            }
            | Command::Subscribe {
                client_id, callback, ..
            } => {
                if !self.clients.contains_key(&client_id) {
                    error!(client_id, "session-config success: no such client");
                    return;
                }

                let session_id = self.next_session_id;
                self.next_session_id += 1;
                callback.on_session_started(session_id);

                let kind = if is_publish {
                    SessionKind::Publish
                } else {
                    SessionKind::Subscribe
                };
                let session =
                    DiscoverySessionState::new(session_id, pub_sub_id, kind, callback);
                if let Some(client) = self.clients.get_mut(&client_id) {
                    client.add_session(session);
                }
            }
            Command::UpdatePublish {
                client_id,
                session_id,
                ..
            }
            | Command::UpdateSubscribe {
                client_id,
                session_id,
                ..
            } => {
                let Some(client) = self.clients.get(&client_id) else {
                    error!(client_id, "session-config success: no such client");
                    return;
                };
                let Some(session) = client.session(session_id) else {
                    error!(client_id, session_id, "session-config success: no such session");
                    return;
                };
                session.callback().on_session_config_success();
            }
            other => error!(
                command = other.name(),
                "session-config success for an unexpected command"
            ),
        }
    }

    fn on_session_config_fail_local(
        &mut self,
        in_flight: InFlightCommand,
        _is_publish: bool,
        reason: NanStatus,
    ) {
        match in_flight.command {
            Command::Publish { callback, .. } | Command::Subscribe { callback, .. } => {
                callback.on_session_config_fail(reason);
            }
            Command::UpdatePublish {
                client_id,
                session_id,
                ..
            }
            | Command::UpdateSubscribe {
                client_id,
                session_id,
                ..
            } => {
                let Some(client) = self.clients.get(&client_id) else {
                    error!(client_id, "session-config fail: no such client");
                    return;
                };
                let Some(session) = client.session(session_id) else {
                    error!(client_id, session_id, "session-config fail: no such session");
                    return;
                };
                session.callback().on_session_config_fail(reason);
            }
            other => error!(
                command = other.name(),
                "session-config fail for an unexpected command"
            ),
        }
    }

    fn on_message_send_queued_success(&mut self, in_flight: InFlightCommand) {
        let InFlightCommand {
            transaction_id,
            command,
            sent_message,
        } = in_flight;

        if !matches!(command, Command::TransmitNextMessage) {
            error!(
                command = command.name(),
                "send-queued success for an unexpected command"
            );
            return;
        }
        let Some(message) = sent_message else {
            error!("send-queued success with no message in flight");
            return;
        };

        debug!(
            arrival_seq = message.arrival_seq,
            transaction_id = transaction_id.0,
            "message accepted into firmware queue"
        );
        self.send_queue
            .record_firmware(transaction_id, message, Instant::now());
        self.update_send_message_timeout();
        if !self.send_queue.is_blocked() {
            self.transmit_next_message();
        }
    }

    fn on_message_send_queued_fail(&mut self, in_flight: InFlightCommand, reason: NanStatus) {
        let InFlightCommand {
            command,
            sent_message,
            ..
        } = in_flight;

        if !matches!(command, Command::TransmitNextMessage) {
            error!(
                command = command.name(),
                "send-queued fail for an unexpected command"
            );
            return;
        }
        let Some(message) = sent_message else {
            error!("send-queued fail with no message in flight");
            return;
        };

        // Firmware transmit queue is full: put the message back under its
        // original arrival sequence and hold off until a send completion
        // signals capacity.
        debug!(
            arrival_seq = message.arrival_seq,
            ?reason,
            "firmware queue full, blocking"
        );
        self.send_queue.requeue_host(message);
        self.send_queue.set_blocked(true);
    }

    fn on_create_interface_response(
        &mut self,
        in_flight: InFlightCommand,
        success: bool,
        reason: NanStatus,
    ) {
        let Command::CreateDataPathInterface { interface_name } = in_flight.command else {
            error!(
                command = in_flight.command.name(),
                "create-interface response for an unexpected command"
            );
            return;
        };
        if success {
            debug!(%interface_name, "data-path interface created");
            self.data_path.on_interface_created(&interface_name);
        } else {
            error!(%interface_name, ?reason, "data-path interface creation failed");
        }
    }

    fn on_delete_interface_response(
        &mut self,
        in_flight: InFlightCommand,
        success: bool,
        reason: NanStatus,
    ) {
        let Command::DeleteDataPathInterface { interface_name } = in_flight.command else {
            error!(
                command = in_flight.command.name(),
                "delete-interface response for an unexpected command"
            );
            return;
        };
        if success {
            debug!(%interface_name, "data-path interface deleted");
            self.data_path.on_interface_deleted(&interface_name);
        } else {
            error!(%interface_name, ?reason, "data-path interface deletion failed");
        }
    }

    fn on_initiate_data_path_response(
        &mut self,
        in_flight: InFlightCommand,
        result: Result<NdpId, NanStatus>,
    ) {
        let Command::InitiateDataPathSetup {
            network_specifier, ..
        } = in_flight.command
        else {
            error!(
                command = in_flight.command.name(),
                "initiate-data-path response for an unexpected command"
            );
            return;
        };
        match result {
            Ok(ndp_id) => self
                .data_path
                .on_data_path_initiate_success(&network_specifier, ndp_id),
            Err(reason) => self
                .data_path
                .on_data_path_initiate_fail(&network_specifier, reason),
        }
    }

    // ==================================================================
    // Response timeouts
    // ==================================================================

    /// The 5 s response timer fired for the in-flight command: synthesize
    /// the failure path the real response would have taken.
    pub(crate) fn process_response_timeout(&mut self, in_flight: InFlightCommand) {
        warn!(
            command = in_flight.command.name(),
            transaction_id = in_flight.transaction_id.0,
            "response timeout"
        );

        match &in_flight.command {
            Command::Connect { .. } | Command::Disconnect { .. } => {
                self.on_config_failed_local(in_flight, NanStatus::Error);
            }
            Command::Publish { .. } | Command::UpdatePublish { .. } => {
                self.on_session_config_fail_local(in_flight, true, NanStatus::Error);
            }
            Command::Subscribe { .. } | Command::UpdateSubscribe { .. } => {
                self.on_session_config_fail_local(in_flight, false, NanStatus::Error);
            }
            Command::TransmitNextMessage => {
                match in_flight.sent_message {
                    Some(message) => self.on_message_send_fail_local(&message, NanStatus::Error),
                    None => error!("transmit-next timeout with no message in flight"),
                }
                self.send_queue.set_blocked(false);
                self.transmit_next_message();
            }
            Command::GetCapabilities => {
                error!("get-capabilities timed out; will retry when next enabled");
            }
            Command::CreateDataPathInterface { .. } => {
                self.on_create_interface_response(in_flight, false, NanStatus::Timeout);
            }
            Command::DeleteDataPathInterface { .. } => {
                self.on_delete_interface_response(in_flight, false, NanStatus::Timeout);
            }
            Command::InitiateDataPathSetup { .. } => {
                self.on_initiate_data_path_response(in_flight, Err(NanStatus::Timeout));
            }
            Command::RespondToDataPathSetupRequest { .. } => {
                debug!("respond-to-data-path-setup timed out");
            }
            Command::EndDataPath { .. } => {
                debug!("end-data-path timed out");
            }
            other => error!(
                command = other.name(),
                "response timeout for a command that never waits"
            ),
        }
    }

    // ==================================================================
    // Notifications
    // ==================================================================

    pub(crate) fn process_notification(&mut self, notification: Notification) {
        match notification {
            Notification::InterfaceAddressChange { mac } => {
                self.on_interface_address_change_local(mac)
            }
            Notification::ClusterChange { event, cluster_id } => {
                self.on_cluster_change_local(event, cluster_id)
            }
            Notification::Match {
                pub_sub_id,
                requestor_instance_id,
                peer_mac,
                service_specific_info,
                match_filter,
            } => {
                match self.session_for_pub_sub_id(pub_sub_id) {
                    Some(session) => session.on_match(
                        requestor_instance_id,
                        peer_mac,
                        &service_specific_info,
                        &match_filter,
                    ),
                    None => error!(pub_sub_id, "match: no session found"),
                }
            }
            Notification::SessionTerminated {
                pub_sub_id,
                reason,
                is_publish,
            } => self.on_session_terminated_local(pub_sub_id, reason, is_publish),
            Notification::MessageReceived {
                pub_sub_id,
                requestor_instance_id,
                peer_mac,
                payload,
            } => match self.session_for_pub_sub_id(pub_sub_id) {
                Some(session) => {
                    session.on_message_received(requestor_instance_id, peer_mac, &payload)
                }
                None => error!(pub_sub_id, "message received: no session found"),
            },
            Notification::NanDown { reason } => {
                warn!(?reason, "NAN down");
                self.on_nan_down_local();
            }
            Notification::MessageSendSuccess { transaction_id } => {
                match self.send_queue.remove_firmware(transaction_id) {
                    Some(message) => {
                        self.update_send_message_timeout();
                        self.on_message_send_success_local(&message);
                    }
                    None => warn!(
                        transaction_id = transaction_id.0,
                        "send-success for unknown transaction (timed out?)"
                    ),
                }
                self.send_queue.set_blocked(false);
                self.transmit_next_message();
            }
            Notification::MessageSendFail {
                transaction_id,
                reason,
            } => match self.send_queue.remove_firmware(transaction_id) {
                Some(mut message) => {
                    self.update_send_message_timeout();

                    if message.retry_count > 0
                        && matches!(reason, NanStatus::NoOtaAck | NanStatus::TxFail)
                    {
                        debug!(
                            transaction_id = transaction_id.0,
                            ?reason,
                            retry_count = message.retry_count,
                            "retransmitting"
                        );
                        message.retry_count -= 1;
                        self.send_queue.requeue_host(message);
                    } else {
                        self.on_message_send_fail_local(&message, reason);
                    }
                    self.send_queue.set_blocked(false);
                    self.transmit_next_message();
                }
                None => warn!(
                    transaction_id = transaction_id.0,
                    "send-fail for unknown transaction (timed out?)"
                ),
            },
            Notification::DataPathRequest {
                pub_sub_id,
                peer_mac,
                ndp_id,
                app_info,
            } => {
                if let Some(network_specifier) =
                    self.data_path
                        .on_data_path_request(pub_sub_id, peer_mac, ndp_id, &app_info)
                {
                    self.schedule_data_path_confirm_timeout(network_specifier);
                }
            }
            Notification::DataPathConfirm {
                ndp_id,
                peer_mac,
                accept,
                reason,
                app_info,
            } => {
                if let Some(network_specifier) = self
                    .data_path
                    .on_data_path_confirm(ndp_id, peer_mac, accept, reason, &app_info)
                {
                    self.cancel_data_path_confirm_timeout(&network_specifier);
                }
            }
            Notification::DataPathEnd { ndp_id } => self.data_path.on_data_path_end(ndp_id),
        }
    }

    fn on_interface_address_change_local(&mut self, mac: MacAddress) {
        debug!(%mac, "discovery interface address changed");
        self.current_discovery_mac = mac;
        for client in self.clients.values() {
            client.on_interface_address_change(mac);
        }
    }

    fn on_cluster_change_local(&mut self, event: ClusterEvent, cluster_id: MacAddress) {
        debug!(?event, %cluster_id, "cluster change");
        for client in self.clients.values() {
            client.on_cluster_change(event, cluster_id, self.current_discovery_mac);
        }
    }

    fn on_session_terminated_local(
        &mut self,
        pub_sub_id: PubSubId,
        reason: NanStatus,
        is_publish: bool,
    ) {
        debug!(pub_sub_id, ?reason, is_publish, "session terminated");

        let mut found = None;
        for (client_id, client) in self.clients.iter_mut() {
            if let Some(session) = client.session_for_pub_sub_id(pub_sub_id) {
                session.callback().on_session_terminated(reason);
                found = Some((*client_id, session.session_id()));
                break;
            }
        }

        let Some((client_id, session_id)) = found else {
            error!(pub_sub_id, "session terminated: no session found");
            return;
        };
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.remove_session(session_id);
        }
    }

    fn on_nan_down_local(&mut self) {
        self.clients.clear();
        self.current_config = None;
        self.send_queue.purge();
        self.update_send_message_timeout();
        self.data_path.on_nan_down_cleanup();
        self.current_discovery_mac = MacAddress::ALL_ZERO;
    }

    fn on_message_send_success_local(&mut self, message: &QueuedSendMessage) {
        let Some(client) = self.clients.get(&message.client_id) else {
            error!(
                client_id = message.client_id,
                "message send success: no such client"
            );
            return;
        };
        let Some(session) = client.session(message.session_id) else {
            error!(
                client_id = message.client_id,
                session_id = message.session_id,
                "message send success: no such session"
            );
            return;
        };
        session.callback().on_message_send_success(message.message_id);
    }

    fn on_message_send_fail_local(&mut self, message: &QueuedSendMessage, reason: NanStatus) {
        let Some(client) = self.clients.get(&message.client_id) else {
            error!(
                client_id = message.client_id,
                "message send fail: no such client"
            );
            return;
        };
        let Some(session) = client.session(message.session_id) else {
            error!(
                client_id = message.client_id,
                session_id = message.session_id,
                "message send fail: no such session"
            );
            return;
        };
        session
            .callback()
            .on_message_send_fail(message.message_id, reason);
    }

    // ==================================================================
    // Timers and internal plumbing
    // ==================================================================

    /// The send-message transmission timer fired: expire overdue
    /// firmware-tier entries and restart transmission.
    pub(crate) fn process_send_message_timeout(&mut self) {
        let expired = self
            .send_queue
            .expire_firmware(Instant::now(), self.config.send_message_timeout);
        for message in &expired {
            self.on_message_send_fail_local(message, NanStatus::Error);
        }
        self.update_send_message_timeout();
        self.send_queue.set_blocked(false);
        self.transmit_next_message();
    }

    /// A data-path confirmation timer fired.
    pub(crate) fn process_data_path_timeout(&mut self, network_specifier: NetworkSpecifier) {
        debug!(%network_specifier, "data-path confirm timeout");
        self.data_path.handle_data_path_timeout(&network_specifier);
        self.data_path_timers.remove(&network_specifier);
    }

    /// Rearm the single send-message timer from the oldest firmware-tier
    /// entry; disarm it when the firmware tier is empty. Called after
    /// every firmware-tier mutation.
    fn update_send_message_timeout(&mut self) {
        match self
            .send_queue
            .first_firmware_deadline(self.config.send_message_timeout)
        {
            Some(deadline) => self
                .send_timeout_timer
                .schedule_at(deadline, CoreEvent::SendMessageTimeout),
            None => self.send_timeout_timer.cancel(),
        }
    }

    fn schedule_data_path_confirm_timeout(&mut self, network_specifier: NetworkSpecifier) {
        let mut timer = WakeupTimer::new(self.events.clone());
        timer.schedule(
            self.config.data_path_confirm_timeout,
            CoreEvent::DataPathTimeout {
                network_specifier: network_specifier.clone(),
            },
        );
        // Replaces (and thereby cancels) any previous registration.
        self.data_path_timers.insert(network_specifier, timer);
    }

    fn cancel_data_path_confirm_timeout(&mut self, network_specifier: &NetworkSpecifier) {
        if let Some(mut timer) = self.data_path_timers.remove(network_specifier) {
            timer.cancel();
        }
    }

    /// Self-enqueue the internal transmit-next command.
    fn transmit_next_message(&mut self) {
        self.enqueue_command(Command::TransmitNextMessage);
    }

    fn enqueue_command(&mut self, command: Command) {
        let name = command.name();
        if self.events.send(CoreEvent::Command(command)).is_err() {
            debug!(command = name, "dispatcher gone; dropping internal command");
        }
    }

    fn session_for_pub_sub_id(
        &mut self,
        pub_sub_id: PubSubId,
    ) -> Option<&mut DiscoverySessionState> {
        self.clients
            .values_mut()
            .find_map(|client| client.session_for_pub_sub_id(pub_sub_id))
    }
}

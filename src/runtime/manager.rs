//! The public face of the control plane.
//!
//! [`NanStateManager`] spawns the dispatcher daemon and hands out the two
//! capabilities everything else talks through:
//!
//! - a [`ControlHandle`] for the IPC layer (and for collaborators such as
//!   the data-path manager that need to schedule follow-up commands), and
//! - a [`HalEventSink`] for the HAL adapter's responses and notifications.
//!
//! # Usage
//!
//! ```ignore
//! use nanhost::runtime::{ManagerConfig, NanStateManager};
//!
//! let manager = NanStateManager::new(
//!     ManagerConfig::default(),
//!     hal,
//!     data_path,
//!     ranging,
//!     broadcaster,
//! );
//!
//! let control = manager.control();
//! control.enable_usage();
//! control.connect(client_id, uid, pid, pkg, callback, config, false);
//!
//! // When shutting down
//! manager.shutdown().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broadcast::StateBroadcaster;
use crate::callback::{EventCallback, SessionCallback};
use crate::config::{ConfigRequest, PublishConfig, SubscribeConfig};
use crate::datapath::{DataPathInitiateRequest, DataPathManager, NetworkSpecifier};
use crate::event::{Command, CoreEvent};
use crate::hal::{HalApi, HalEventSink};
use crate::ranging::{RangingDriver, RttRangingParams};
use crate::types::{ClientId, MessageId, NdpId, PeerId, RangingId, SessionId};

use super::core::CoreState;
use super::daemon::DispatcherDaemon;
use super::ManagerConfig;

/// Cloneable control surface consumed by the IPC layer.
///
/// Every method is a non-blocking enqueue onto the dispatcher; results
/// arrive on the callback capabilities registered with each request.
#[derive(Clone)]
pub struct ControlHandle {
    events: mpsc::UnboundedSender<CoreEvent>,
    usage_enabled: Arc<AtomicBool>,
}

impl ControlHandle {
    fn send(&self, command: Command) {
        let name = command.name();
        if self.events.send(CoreEvent::Command(command)).is_err() {
            warn!(command = name, "dispatcher gone; dropping command");
        }
    }

    /// Request a new client connection.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &self,
        client_id: ClientId,
        uid: u32,
        pid: u32,
        calling_package: impl Into<String>,
        callback: Arc<dyn EventCallback>,
        config_request: ConfigRequest,
        notify_identity_change: bool,
    ) {
        self.send(Command::Connect {
            client_id,
            uid,
            pid,
            calling_package: calling_package.into(),
            callback,
            config_request,
            notify_identity_change,
        });
    }

    /// Disconnect (destroy) an existing client.
    pub fn disconnect(&self, client_id: ClientId) {
        self.send(Command::Disconnect { client_id });
    }

    /// Stop a discovery session.
    pub fn terminate_session(&self, client_id: ClientId, session_id: SessionId) {
        self.send(Command::TerminateSession {
            client_id,
            session_id,
        });
    }

    /// Start a new publish discovery session.
    pub fn publish(
        &self,
        client_id: ClientId,
        config: PublishConfig,
        callback: Arc<dyn SessionCallback>,
    ) {
        self.send(Command::Publish {
            client_id,
            config,
            callback,
        });
    }

    /// Modify an existing publish discovery session.
    pub fn update_publish(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        config: PublishConfig,
    ) {
        self.send(Command::UpdatePublish {
            client_id,
            session_id,
            config,
        });
    }

    /// Start a new subscribe discovery session.
    pub fn subscribe(
        &self,
        client_id: ClientId,
        config: SubscribeConfig,
        callback: Arc<dyn SessionCallback>,
    ) {
        self.send(Command::Subscribe {
            client_id,
            config,
            callback,
        });
    }

    /// Modify an existing subscribe discovery session.
    pub fn update_subscribe(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        config: SubscribeConfig,
    ) {
        self.send(Command::UpdateSubscribe {
            client_id,
            session_id,
            config,
        });
    }

    /// Queue a follow-on message toward a peer of a discovery session.
    /// `retry_count` transparent retries are attempted on OTA failures.
    #[allow(clippy::too_many_arguments)]
    pub fn send_message(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        peer_id: PeerId,
        payload: Vec<u8>,
        message_id: MessageId,
        retry_count: u32,
    ) {
        self.send(Command::EnqueueSendMessage {
            client_id,
            session_id,
            peer_id,
            payload,
            message_id,
            retry_count,
        });
    }

    /// Range the given peers of a discovery session.
    pub fn start_ranging(
        &self,
        client_id: ClientId,
        session_id: SessionId,
        ranging_id: RangingId,
        params: Vec<RttRangingParams>,
    ) {
        self.send(Command::StartRanging {
            client_id,
            session_id,
            ranging_id,
            params,
        });
    }

    /// Enable NAN usage. Doesn't form clusters by itself; that happens
    /// when the first client connects.
    pub fn enable_usage(&self) {
        self.send(Command::EnableUsage);
    }

    /// Disable NAN usage, terminating all existing clients.
    pub fn disable_usage(&self) {
        self.send(Command::DisableUsage);
    }

    /// Whether NAN usage is enabled. Reads a shared flag; does not go
    /// through the dispatcher.
    pub fn is_usage_enabled(&self) -> bool {
        self.usage_enabled.load(Ordering::Relaxed)
    }

    /// Fetch (or refresh from cache) the firmware capabilities.
    pub fn get_capabilities(&self) {
        self.send(Command::GetCapabilities);
    }

    /// Create every data-path interface the firmware supports.
    pub fn create_all_data_path_interfaces(&self) {
        self.send(Command::CreateAllDataPathInterfaces);
    }

    /// Delete all data-path interfaces.
    pub fn delete_all_data_path_interfaces(&self) {
        self.send(Command::DeleteAllDataPathInterfaces);
    }

    /// Create the named data-path interface.
    pub fn create_data_path_interface(&self, interface_name: impl Into<String>) {
        self.send(Command::CreateDataPathInterface {
            interface_name: interface_name.into(),
        });
    }

    /// Delete the named data-path interface.
    pub fn delete_data_path_interface(&self, interface_name: impl Into<String>) {
        self.send(Command::DeleteDataPathInterface {
            interface_name: interface_name.into(),
        });
    }

    /// Initiate a data-path toward a peer (initiator side).
    pub fn initiate_data_path_setup(
        &self,
        network_specifier: NetworkSpecifier,
        request: DataPathInitiateRequest,
    ) {
        self.send(Command::InitiateDataPathSetup {
            network_specifier,
            request,
        });
    }

    /// Respond to a peer's data-path request (responder side).
    pub fn respond_to_data_path_request(
        &self,
        accept: bool,
        ndp_id: NdpId,
        interface_name: impl Into<String>,
        app_info: Vec<u8>,
    ) {
        self.send(Command::RespondToDataPathSetupRequest {
            accept,
            ndp_id,
            interface_name: interface_name.into(),
            app_info,
        });
    }

    /// Tear down the given data-path.
    pub fn end_data_path(&self, ndp_id: NdpId) {
        self.send(Command::EndDataPath { ndp_id });
    }
}

/// The NAN state manager: owns the dispatcher daemon and the core state.
///
/// Construct exactly one per process at startup and inject its handles;
/// there is deliberately no global instance.
pub struct NanStateManager {
    control: ControlHandle,
    shutdown: CancellationToken,
    daemon_handle: Option<JoinHandle<()>>,
}

impl NanStateManager {
    /// Create the manager and start the dispatcher daemon.
    pub fn new(
        config: ManagerConfig,
        hal: Arc<dyn HalApi>,
        data_path: Arc<dyn DataPathManager>,
        ranging: Arc<dyn RangingDriver>,
        broadcaster: Arc<dyn StateBroadcaster>,
    ) -> Self {
        info!("starting NAN state manager");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let usage_enabled = Arc::new(AtomicBool::new(false));

        let core = CoreState::new(
            config.clone(),
            hal,
            data_path,
            ranging,
            broadcaster,
            event_tx.clone(),
            Arc::clone(&usage_enabled),
        );
        let daemon = DispatcherDaemon::new(core, event_rx, event_tx.clone(), config.command_timeout);

        let shutdown = CancellationToken::new();
        let daemon_shutdown = shutdown.clone();
        let daemon_handle = Some(tokio::spawn(async move {
            daemon.run(daemon_shutdown).await;
        }));

        Self {
            control: ControlHandle {
                events: event_tx,
                usage_enabled,
            },
            shutdown,
            daemon_handle,
        }
    }

    /// The control surface for the IPC layer. Cloneable.
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// The inbound event surface for the HAL adapter. Cloneable.
    pub fn hal_event_sink(&self) -> HalEventSink {
        HalEventSink::new(self.control.events.clone())
    }

    /// Whether NAN usage is enabled right now.
    pub fn is_usage_enabled(&self) -> bool {
        self.control.is_usage_enabled()
    }

    /// Whether the dispatcher is still running.
    pub fn is_running(&self) -> bool {
        !self.control.events.is_closed()
    }

    /// Token cancelled when the manager shuts down, for external
    /// coordination.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the dispatcher and wait for it to drain.
    pub async fn shutdown(mut self) {
        info!("shutting down NAN state manager");
        self.shutdown.cancel();
        if let Some(handle) = self.daemon_handle.take() {
            match handle.await {
                Ok(()) => info!("NAN dispatcher shut down cleanly"),
                Err(e) => tracing::error!("NAN dispatcher task panicked: {}", e),
            }
        }
    }
}

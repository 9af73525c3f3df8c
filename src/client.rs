//! Per-client connection state.
//!
//! A [`ClientState`] is created when a connect request completes and owns
//! every discovery session the client starts. Destroying the client tears
//! its sessions down with it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use crate::callback::EventCallback;
use crate::config::ConfigRequest;
use crate::hal::HalApi;
use crate::session::DiscoverySessionState;
use crate::types::{ClientId, ClusterEvent, MacAddress, PubSubId, SessionId};

/// State of one connected application client.
pub struct ClientState {
    client_id: ClientId,
    uid: u32,
    pid: u32,
    calling_package: String,
    config_request: ConfigRequest,
    notify_identity_change: bool,
    callback: Arc<dyn EventCallback>,
    sessions: HashMap<SessionId, DiscoverySessionState>,
}

impl ClientState {
    pub fn new(
        client_id: ClientId,
        uid: u32,
        pid: u32,
        calling_package: String,
        callback: Arc<dyn EventCallback>,
        config_request: ConfigRequest,
        notify_identity_change: bool,
    ) -> Self {
        Self {
            client_id,
            uid,
            pid,
            calling_package,
            config_request,
            notify_identity_change,
            callback,
            sessions: HashMap::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn calling_package(&self) -> &str {
        &self.calling_package
    }

    pub fn config_request(&self) -> &ConfigRequest {
        &self.config_request
    }

    pub fn callback(&self) -> &Arc<dyn EventCallback> {
        &self.callback
    }

    pub fn add_session(&mut self, session: DiscoverySessionState) {
        self.sessions.insert(session.session_id(), session);
    }

    pub fn session(&self, session_id: SessionId) -> Option<&DiscoverySessionState> {
        self.sessions.get(&session_id)
    }

    pub fn session_mut(&mut self, session_id: SessionId) -> Option<&mut DiscoverySessionState> {
        self.sessions.get_mut(&session_id)
    }

    /// Remove a session locally, without a HAL cancel. Used when the
    /// firmware already reported the session terminated.
    pub fn remove_session(&mut self, session_id: SessionId) -> Option<DiscoverySessionState> {
        self.sessions.remove(&session_id)
    }

    /// Cancel a session in the firmware and remove it locally.
    pub fn terminate_session(&mut self, session_id: SessionId, hal: &dyn HalApi) {
        match self.sessions.remove(&session_id) {
            Some(session) => session.terminate(hal),
            None => error!(
                client_id = self.client_id,
                session_id, "terminate_session: no such session"
            ),
        }
    }

    /// Tear down every session; called when the client disconnects.
    pub fn destroy(&mut self, hal: &dyn HalApi) {
        for (_, session) in self.sessions.drain() {
            session.terminate(hal);
        }
    }

    /// The session bound to the given firmware `pub_sub_id`, if this
    /// client owns it.
    pub fn session_for_pub_sub_id(
        &mut self,
        pub_sub_id: PubSubId,
    ) -> Option<&mut DiscoverySessionState> {
        self.sessions
            .values_mut()
            .find(|session| session.pub_sub_id() == pub_sub_id)
    }

    /// The discovery interface address changed. Pushed to the client only
    /// if it opted in to identity-change notifications.
    pub fn on_interface_address_change(&self, mac: MacAddress) {
        if self.notify_identity_change {
            self.callback.on_identity_changed(mac);
        }
    }

    /// Cluster membership changed. The identity push carries the current
    /// discovery interface address, same opt-in gate as above.
    pub fn on_cluster_change(
        &self,
        _event: ClusterEvent,
        _cluster_id: MacAddress,
        current_mac: MacAddress,
    ) {
        if self.notify_identity_change {
            self.callback.on_identity_changed(current_mac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::SessionCallback;
    use crate::config::{PublishConfig, SubscribeConfig};
    use crate::datapath::DataPathInitiateRequest;
    use crate::hal::NanStatus;
    use crate::ranging::RangingReason;
    use crate::session::SessionKind;
    use crate::types::{MessageId, NdpId, PeerId, RangingId, TransactionId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct NullEventCallback {
        identity_changes: Mutex<Vec<MacAddress>>,
    }

    impl EventCallback for NullEventCallback {
        fn on_connect_success(&self, _client_id: ClientId) {}
        fn on_connect_fail(&self, _reason: NanStatus) {}
        fn on_identity_changed(&self, mac: MacAddress) {
            self.identity_changes.lock().unwrap().push(mac);
        }
        fn on_ranging_failure(
            &self,
            _ranging_id: RangingId,
            _reason: RangingReason,
            _description: &str,
        ) {
        }
    }

    struct NullSessionCallback;

    impl SessionCallback for NullSessionCallback {
        fn on_session_started(&self, _session_id: SessionId) {}
        fn on_session_config_success(&self) {}
        fn on_session_config_fail(&self, _reason: NanStatus) {}
        fn on_session_terminated(&self, _reason: NanStatus) {}
        fn on_match(&self, _peer_id: PeerId, _ssi: &[u8], _filter: &[u8]) {}
        fn on_message_received(&self, _peer_id: PeerId, _payload: &[u8]) {}
        fn on_message_send_success(&self, _message_id: MessageId) {}
        fn on_message_send_fail(&self, _message_id: MessageId, _reason: NanStatus) {}
    }

    /// HAL stub counting session cancels.
    #[derive(Default)]
    struct CancelCountingHal {
        stops: Mutex<Vec<PubSubId>>,
    }

    impl HalApi for CancelCountingHal {
        fn enable_and_configure(
            &self,
            _t: TransactionId,
            _c: &ConfigRequest,
            _i: bool,
        ) -> bool {
            true
        }
        fn disable(&self, _t: TransactionId) -> bool {
            true
        }
        fn publish(&self, _t: TransactionId, _p: PubSubId, _c: &PublishConfig) -> bool {
            true
        }
        fn stop_publish(&self, _t: TransactionId, pub_sub_id: PubSubId) -> bool {
            self.stops.lock().unwrap().push(pub_sub_id);
            true
        }
        fn subscribe(&self, _t: TransactionId, _p: PubSubId, _c: &SubscribeConfig) -> bool {
            true
        }
        fn stop_subscribe(&self, _t: TransactionId, pub_sub_id: PubSubId) -> bool {
            self.stops.lock().unwrap().push(pub_sub_id);
            true
        }
        fn send_followon_message(
            &self,
            _t: TransactionId,
            _p: PubSubId,
            _r: PeerId,
            _d: MacAddress,
            _payload: &[u8],
            _m: MessageId,
        ) -> bool {
            true
        }
        fn get_capabilities(&self, _t: TransactionId) -> bool {
            true
        }
        fn create_interface(&self, _t: TransactionId, _n: &str) -> bool {
            true
        }
        fn delete_interface(&self, _t: TransactionId, _n: &str) -> bool {
            true
        }
        fn initiate_data_path(&self, _t: TransactionId, _r: &DataPathInitiateRequest) -> bool {
            true
        }
        fn respond_to_data_path_request(
            &self,
            _t: TransactionId,
            _a: bool,
            _n: NdpId,
            _i: &str,
            _info: &[u8],
        ) -> bool {
            true
        }
        fn end_data_path(&self, _t: TransactionId, _n: NdpId) -> bool {
            true
        }
        fn deinit(&self) {}
    }

    fn client(notify: bool) -> (ClientState, Arc<NullEventCallback>) {
        let callback = Arc::new(NullEventCallback::default());
        let client = ClientState::new(
            7,
            1000,
            2000,
            "com.example.app".to_string(),
            callback.clone(),
            ConfigRequest::default(),
            notify,
        );
        (client, callback)
    }

    fn publish_session(session_id: SessionId, pub_sub_id: PubSubId) -> DiscoverySessionState {
        DiscoverySessionState::new(
            session_id,
            pub_sub_id,
            SessionKind::Publish,
            Arc::new(NullSessionCallback),
        )
    }

    #[test]
    fn session_lookup_by_pub_sub_id() {
        let (mut client, _) = client(false);
        client.add_session(publish_session(1, 42));
        client.add_session(publish_session(2, 43));

        assert_eq!(
            client.session_for_pub_sub_id(43).map(|s| s.session_id()),
            Some(2)
        );
        assert!(client.session_for_pub_sub_id(99).is_none());
    }

    #[test]
    fn destroy_cancels_every_session() {
        let (mut client, _) = client(false);
        client.add_session(publish_session(1, 42));
        client.add_session(publish_session(2, 43));

        let hal = CancelCountingHal::default();
        client.destroy(&hal);

        let mut stops = hal.stops.lock().unwrap().clone();
        stops.sort_unstable();
        assert_eq!(stops, vec![42, 43]);
        assert!(client.session(1).is_none());
    }

    #[test]
    fn identity_push_is_gated_on_opt_in() {
        let mac = MacAddress([1, 1, 1, 1, 1, 1]);

        let (opted_out, callback) = client(false);
        opted_out.on_interface_address_change(mac);
        assert!(callback.identity_changes.lock().unwrap().is_empty());

        let (opted_in, callback) = client(true);
        opted_in.on_interface_address_change(mac);
        assert_eq!(*callback.identity_changes.lock().unwrap(), vec![mac]);
    }
}

//! Client callback capabilities.
//!
//! The core never talks to an application directly; the IPC layer hands it
//! an opaque callback capability per client and per discovery session.
//! These traits abstract that transport so the core (and its tests) stay
//! independent of any binder/IPC machinery.

use crate::hal::NanStatus;
use crate::ranging::RangingReason;
use crate::types::{ClientId, MacAddress, MessageId, PeerId, RangingId, SessionId};

/// Per-client event callback, registered at connect time.
pub trait EventCallback: Send + Sync {
    /// The connect request was accepted and the client is attached.
    fn on_connect_success(&self, client_id: ClientId);

    /// The connect request was rejected.
    fn on_connect_fail(&self, reason: NanStatus);

    /// The discovery interface identity (MAC) changed. Only delivered to
    /// clients that opted in via `notify_identity_change`.
    fn on_identity_changed(&self, mac: MacAddress);

    /// A ranging request could not be started.
    fn on_ranging_failure(&self, ranging_id: RangingId, reason: RangingReason, description: &str);
}

/// Per-session event callback, registered when a publish or subscribe is
/// requested.
pub trait SessionCallback: Send + Sync {
    /// The session was created; `session_id` names it in later calls.
    fn on_session_started(&self, session_id: SessionId);

    /// An update to the session configuration was accepted.
    fn on_session_config_success(&self);

    /// The session configuration (new or update) was rejected.
    fn on_session_config_fail(&self, reason: NanStatus);

    /// The session was terminated, per plan or due to an error.
    fn on_session_terminated(&self, reason: NanStatus);

    /// A discovery match occurred on this session.
    fn on_match(&self, peer_id: PeerId, service_specific_info: &[u8], match_filter: &[u8]);

    /// A follow-on message was received from a peer.
    fn on_message_received(&self, peer_id: PeerId, payload: &[u8]);

    /// A follow-on message was acknowledged over the air.
    fn on_message_send_success(&self, message_id: MessageId);

    /// A follow-on message could not be delivered.
    fn on_message_send_fail(&self, message_id: MessageId, reason: NanStatus);
}

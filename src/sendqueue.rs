//! Two-tier follow-on message queue.
//!
//! The firmware has a bounded transmit queue that the host must not
//! overflow. User-submitted messages first land in the **host tier**,
//! ordered by arrival; they move one at a time into the **firmware tier**
//! when an enqueue command is accepted. A message lives in exactly one
//! tier until it is acknowledged, failed, or purged.
//!
//! ```text
//! send_message ──► host tier (by arrival_seq) ──► firmware tier (by tx id)
//!                        ▲                              │
//!                        └── retry / queue-full ◄───────┘
//! ```
//!
//! Retried messages are re-inserted under their original `arrival_seq`,
//! so a retry never jumps ahead of messages that arrived earlier and
//! never falls behind messages that arrived later.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::types::{ClientId, MessageId, PeerId, SessionId, TransactionId};

/// A follow-on message pending transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSendMessage {
    /// Monotonic sequence assigned on submission; defines FIFO order
    /// through retries.
    pub arrival_seq: u64,
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub peer_id: PeerId,
    pub payload: Vec<u8>,
    pub message_id: MessageId,
    /// Remaining transparent retries on OTA / TX failures.
    pub retry_count: u32,
    /// Stamped when the firmware accepts the message into its queue.
    pub enqueue_time: Option<Instant>,
}

/// The two-tier send queue plus the back-pressure flag.
pub struct SendMessageQueue {
    next_arrival_seq: u64,
    blocked: bool,
    host: BTreeMap<u64, QueuedSendMessage>,
    /// Firmware-accepted messages in insertion order, keyed by the
    /// transaction id under which each was queued. The firmware queue is
    /// small (single digits), so linear lookup is fine.
    firmware: Vec<(TransactionId, QueuedSendMessage)>,
}

impl SendMessageQueue {
    pub fn new() -> Self {
        Self {
            next_arrival_seq: 0,
            blocked: false,
            host: BTreeMap::new(),
            firmware: Vec::new(),
        }
    }

    /// Whether the firmware queue reported full; transmission is paused
    /// until a send-completion notification clears it.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub fn host_len(&self) -> usize {
        self.host.len()
    }

    pub fn firmware_len(&self) -> usize {
        self.firmware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty() && self.firmware.is_empty()
    }

    /// Accept a newly submitted message into the host tier, assigning its
    /// arrival sequence. Returns the assigned sequence.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &mut self,
        client_id: ClientId,
        session_id: SessionId,
        peer_id: PeerId,
        payload: Vec<u8>,
        message_id: MessageId,
        retry_count: u32,
    ) -> u64 {
        let arrival_seq = self.next_arrival_seq;
        self.next_arrival_seq += 1;

        self.host.insert(
            arrival_seq,
            QueuedSendMessage {
                arrival_seq,
                client_id,
                session_id,
                peer_id,
                payload,
                message_id,
                retry_count,
                enqueue_time: None,
            },
        );
        arrival_seq
    }

    /// Remove and return the oldest host-tier message.
    pub fn pop_next_host(&mut self) -> Option<QueuedSendMessage> {
        let (&arrival_seq, _) = self.host.iter().next()?;
        self.host.remove(&arrival_seq)
    }

    /// Re-insert a message into the host tier under its original arrival
    /// sequence (retry or firmware-queue-full).
    pub fn requeue_host(&mut self, mut message: QueuedSendMessage) {
        message.enqueue_time = None;
        self.host.insert(message.arrival_seq, message);
    }

    /// Record a firmware-accepted message under its transaction id,
    /// stamping the enqueue time.
    pub fn record_firmware(
        &mut self,
        transaction_id: TransactionId,
        mut message: QueuedSendMessage,
        now: Instant,
    ) {
        message.enqueue_time = Some(now);
        self.firmware.push((transaction_id, message));
    }

    /// Remove a firmware-tier message by transaction id. `None` for
    /// unknown ids (late notification after a timeout expiry).
    pub fn remove_firmware(&mut self, transaction_id: TransactionId) -> Option<QueuedSendMessage> {
        let index = self
            .firmware
            .iter()
            .position(|(tx, _)| *tx == transaction_id)?;
        Some(self.firmware.remove(index).1)
    }

    /// Deadline of the oldest firmware-tier message: its enqueue time
    /// plus `timeout`. `None` when the firmware tier is empty.
    pub fn first_firmware_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.firmware
            .first()
            .and_then(|(_, message)| message.enqueue_time)
            .map(|enqueued| enqueued + timeout)
    }

    /// Expire firmware-tier entries on timeout. The first entry is always
    /// expired (guarantees forward progress even when the clock cannot be
    /// observed to advance); subsequent entries expire while their
    /// `enqueue_time + timeout <= now`, stopping at the first survivor.
    pub fn expire_firmware(&mut self, now: Instant, timeout: Duration) -> Vec<QueuedSendMessage> {
        let mut expired = Vec::new();
        let mut first = true;

        while let Some((transaction_id, message)) = self.firmware.first() {
            let overdue = message
                .enqueue_time
                .map(|enqueued| enqueued + timeout <= now)
                .unwrap_or(true);
            if first || overdue {
                debug!(
                    transaction_id = transaction_id.0,
                    message_id = message.message_id,
                    "expiring firmware-queued message"
                );
                expired.push(self.firmware.remove(0).1);
                first = false;
            } else {
                break;
            }
        }
        expired
    }

    /// Drop everything (NAN down) and clear the back-pressure flag.
    pub fn purge(&mut self) {
        self.blocked = false;
        self.host.clear();
        self.firmware.clear();
    }
}

impl Default for SendMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

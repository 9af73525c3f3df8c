//! Dispatcher daemon: the single-consumer event loop and the
//! command-in-flight state machine.
//!
//! Events are drained in arrival order. Commands are only consumed in the
//! `Wait` state; while a HAL command is outstanding (`WaitForResponse`)
//! new commands are deferred to a side-buffer and replayed at the head of
//! the queue on the next state transition. Notifications and the
//! send-message / data-path timeouts bypass the command gate and are
//! handled in any state.
//!
//! ```text
//!            Command (round-trip)
//!   ┌──────┐ ─────────────────────► ┌─────────────────┐
//!   │ Wait │                        │ WaitForResponse │──► 5 s timer
//!   └──────┘ ◄───────────────────── └─────────────────┘
//!            Response (matching tx)
//!            or response timeout
//! ```
//!
//! Invariant: at most one transaction id is live at a time.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::event::{Command, CoreEvent};
use crate::timer::WakeupTimer;
use crate::types::TransactionId;

use super::core::{CoreState, InFlightCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsmState {
    /// Idle: ready to consume the next command.
    Wait,
    /// A HAL command is outstanding; commands are deferred.
    WaitForResponse,
}

/// The dispatcher event loop. Owns the core state; runs until shutdown.
pub(crate) struct DispatcherDaemon {
    core: CoreState,
    events: mpsc::UnboundedReceiver<CoreEvent>,
    command_timeout: Duration,

    state: FsmState,
    in_flight: Option<InFlightCommand>,
    next_transaction_id: u16,
    response_timer: WakeupTimer,

    /// Events set aside in the current state, replayed on transition.
    deferred: VecDeque<CoreEvent>,
    /// Replayed events, drained ahead of the channel.
    replay: VecDeque<CoreEvent>,
}

impl DispatcherDaemon {
    pub(crate) fn new(
        core: CoreState,
        events: mpsc::UnboundedReceiver<CoreEvent>,
        event_sender: mpsc::UnboundedSender<CoreEvent>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            core,
            events,
            command_timeout,
            state: FsmState::Wait,
            in_flight: None,
            next_transaction_id: 1,
            response_timer: WakeupTimer::new(event_sender),
            deferred: VecDeque::new(),
            replay: VecDeque::new(),
        }
    }

    /// Run until the shutdown token is cancelled or every sender is gone.
    pub(crate) async fn run(mut self, shutdown: CancellationToken) {
        info!("NAN dispatcher starting");

        loop {
            let event = if let Some(event) = self.replay.pop_front() {
                event
            } else {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        info!("NAN dispatcher shutting down");
                        break;
                    }

                    event = self.events.recv() => match event {
                        Some(event) => event,
                        None => {
                            info!("NAN dispatcher channel closed");
                            break;
                        }
                    }
                }
            };

            self.handle_event(event);
        }

        info!("NAN dispatcher stopped");
    }

    fn handle_event(&mut self, event: CoreEvent) {
        match event {
            // Handled in any state.
            CoreEvent::Notification(notification) => {
                self.core.process_notification(notification);
            }
            CoreEvent::SendMessageTimeout => self.core.process_send_message_timeout(),
            CoreEvent::DataPathTimeout { network_specifier } => {
                self.core.process_data_path_timeout(network_specifier);
            }

            CoreEvent::Command(command) => match self.state {
                FsmState::Wait => self.process_command_event(command),
                FsmState::WaitForResponse => {
                    debug!(command = command.name(), "deferring command while waiting");
                    self.deferred.push_back(CoreEvent::Command(command));
                }
            },

            CoreEvent::Response {
                transaction_id,
                response,
            } => match self.state {
                FsmState::Wait => {
                    // Remnant / delayed / out-of-sync response: let the
                    // waiting state examine it (it will be identified as
                    // out-of-date by its transaction id).
                    self.deferred.push_back(CoreEvent::Response {
                        transaction_id,
                        response,
                    });
                }
                FsmState::WaitForResponse => {
                    if self.current_transaction_id() == Some(transaction_id) {
                        if let Some(in_flight) = self.in_flight.take() {
                            self.core.process_response(in_flight, response);
                        }
                        self.transition_to_wait();
                    } else {
                        warn!(
                            transaction_id = transaction_id.0,
                            response = response.name(),
                            "non-matching transaction id on response (a very late response)"
                        );
                    }
                }
            },

            CoreEvent::ResponseTimeout { transaction_id } => match self.state {
                FsmState::Wait => {
                    self.deferred
                        .push_back(CoreEvent::ResponseTimeout { transaction_id });
                }
                FsmState::WaitForResponse => {
                    if self.current_transaction_id() == Some(transaction_id) {
                        if let Some(in_flight) = self.in_flight.take() {
                            self.core.process_response_timeout(in_flight);
                        }
                        self.transition_to_wait();
                    } else {
                        warn!(
                            transaction_id = transaction_id.0,
                            "non-matching transaction id on response timeout (either a \
                             non-cancelled timer or a race with cancel)"
                        );
                    }
                }
            },
        }
    }

    fn process_command_event(&mut self, command: Command) {
        if self.in_flight.is_some() {
            error!(
                command = command.name(),
                "processing a command but the previous one was never cleared"
            );
            self.in_flight = None;
        }

        let transaction_id = self.allocate_transaction_id();
        match self.core.process_command(transaction_id, command) {
            Some(in_flight) => self.enter_wait_for_response(in_flight),
            None => {
                // Completed locally; the allocated transaction id is never
                // referenced again.
            }
        }
    }

    fn current_transaction_id(&self) -> Option<TransactionId> {
        self.in_flight.as_ref().map(|f| f.transaction_id)
    }

    fn allocate_transaction_id(&mut self) -> TransactionId {
        next_transaction_id(&mut self.next_transaction_id)
    }

    fn enter_wait_for_response(&mut self, in_flight: InFlightCommand) {
        self.response_timer.schedule(
            self.command_timeout,
            CoreEvent::ResponseTimeout {
                transaction_id: in_flight.transaction_id,
            },
        );
        self.in_flight = Some(in_flight);
        self.state = FsmState::WaitForResponse;
        self.flush_deferred();
    }

    fn transition_to_wait(&mut self) {
        self.response_timer.cancel();
        self.state = FsmState::Wait;
        self.flush_deferred();
    }

    /// Move deferred events to the head of the queue, ahead of anything
    /// not yet received from the channel, preserving their arrival order.
    fn flush_deferred(&mut self) {
        self.replay.extend(self.deferred.drain(..));
    }
}

/// Advance the 16-bit transaction counter, skipping the 0 sentinel on
/// wrap. A wrapped id colliding with a long-outstanding one is resolved
/// by that command's response timer.
fn next_transaction_id(counter: &mut u16) -> TransactionId {
    let id = TransactionId(*counter);
    *counter = counter.wrapping_add(1);
    if *counter == 0 {
        *counter = 1;
    }
    id
}

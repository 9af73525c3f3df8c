//! The central runtime: dispatcher daemon, command-in-flight state
//! machine, and the core state they drive.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        NanStateManager                           │
//! │                                                                  │
//! │  ┌────────────────┐                    ┌──────────────────────┐  │
//! │  │ ControlHandle  │──────────────────► │  DispatcherDaemon    │  │
//! │  │ (IPC layer)    │    CoreEvent       │  (background task)   │  │
//! │  └────────────────┘    channel         │                      │  │
//! │  ┌────────────────┐                    │  Wait ⇄ WaitForResp  │  │
//! │  │ HalEventSink   │──────────────────► │  CoreState           │  │
//! │  │ (HAL adapter)  │                    └──────────────────────┘  │
//! │  └────────────────┘                                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state mutation happens on the daemon task; the control and HAL
//! surfaces only enqueue events. Timers re-enter through the same queue.

use std::time::Duration;

mod core;
mod daemon;
mod manager;

pub use manager::{ControlHandle, NanStateManager};

/// Default HAL command response timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default firmware transmission timeout for queued follow-on messages.
pub const DEFAULT_SEND_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for a data-path confirmation after setup starts.
pub const DEFAULT_DATA_PATH_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the state manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long to wait for a firmware response before synthesizing a
    /// failure for the in-flight command.
    pub command_timeout: Duration,
    /// How long a message may sit in the firmware transmit queue before
    /// it is expired.
    pub send_message_timeout: Duration,
    /// How long to wait for a data-path confirmation notification.
    pub data_path_confirm_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            send_message_timeout: DEFAULT_SEND_MESSAGE_TIMEOUT,
            data_path_confirm_timeout: DEFAULT_DATA_PATH_CONFIRM_TIMEOUT,
        }
    }
}

impl ManagerConfig {
    /// Override the HAL command response timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Override the firmware transmission timeout.
    pub fn with_send_message_timeout(mut self, timeout: Duration) -> Self {
        self.send_message_timeout = timeout;
        self
    }

    /// Override the data-path confirmation timeout.
    pub fn with_data_path_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.data_path_confirm_timeout = timeout;
        self
    }
}

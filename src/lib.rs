//! nanhost - host-side control plane for a Wi-Fi NAN subsystem
//!
//! This library mediates between multiple concurrent application clients
//! and a single underlying NAN (Neighbor Awareness Networking) firmware.
//! It serializes every HAL-bound command, tracks the in-flight
//! transaction, demultiplexes asynchronous firmware notifications back to
//! the correct client and session, merges heterogeneous client
//! configurations into one firmware configuration, and paces follow-on
//! message transmission against firmware back-pressure.
//!
//! # High-Level API
//!
//! The [`runtime`] module provides the entry point:
//!
//! ```ignore
//! use nanhost::runtime::{ManagerConfig, NanStateManager};
//!
//! let manager = NanStateManager::new(
//!     ManagerConfig::default(),
//!     hal,          // Arc<dyn HalApi>
//!     data_path,    // Arc<dyn DataPathManager>
//!     ranging,      // Arc<dyn RangingDriver>
//!     broadcaster,  // Arc<dyn StateBroadcaster>
//! );
//!
//! let control = manager.control();       // for the IPC layer
//! let sink = manager.hal_event_sink();   // for the HAL adapter
//! ```

pub mod broadcast;
pub mod callback;
pub mod client;
pub mod config;
pub mod datapath;
pub mod event;
pub mod hal;
pub mod ranging;
pub mod runtime;
pub mod sendqueue;
pub mod session;
pub mod timer;
pub mod types;

/// Version of the nanhost library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!VERSION.is_empty());
    }
}

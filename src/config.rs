//! Configuration requests and the multi-client merge algorithm.
//!
//! Every connected client brings its own [`ConfigRequest`]; the firmware
//! accepts exactly one configuration at a time. [`merge_config_requests`]
//! reduces the set of live requests (plus an optional incoming one) into
//! the single configuration pushed to the firmware.

use tracing::error;

/// Largest valid cluster id. A cluster range of `[0, CLUSTER_ID_MAX]` is
/// treated as "no constraint" by the merge.
pub const CLUSTER_ID_MAX: u16 = 0xFFFF;

/// A client's requested NAN configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRequest {
    /// Whether the client requires operation on the 5 GHz band.
    pub support_5g_band: bool,
    /// Master preference, used in the NAN election protocol.
    pub master_preference: u8,
    /// Lower bound of the requested cluster id range.
    pub cluster_low: u16,
    /// Upper bound of the requested cluster id range.
    pub cluster_high: u16,
}

impl Default for ConfigRequest {
    fn default() -> Self {
        Self {
            support_5g_band: false,
            master_preference: 0,
            cluster_low: 0,
            cluster_high: CLUSTER_ID_MAX,
        }
    }
}

impl ConfigRequest {
    /// Whether this request constrains the cluster id range at all.
    /// The full range `[0, CLUSTER_ID_MAX]` counts as unconstrained.
    pub fn has_cluster_constraint(&self) -> bool {
        self.cluster_low != 0 || self.cluster_high != CLUSTER_ID_MAX
    }
}

/// Publish session type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishType {
    /// Broadcast the service unsolicited.
    #[default]
    Unsolicited,
    /// Respond to active subscribers only.
    Solicited,
}

/// Configuration of a publish discovery session. Opaque to the core;
/// threaded through to the HAL unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishConfig {
    pub service_name: String,
    pub service_specific_info: Vec<u8>,
    pub match_filter: Vec<u8>,
    pub publish_type: PublishType,
    /// Number of discovery events before auto-termination; 0 = unlimited.
    pub publish_count: u8,
    /// Session lifetime in seconds; 0 = unlimited.
    pub ttl_sec: u16,
}

/// Subscribe session type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscribeType {
    /// Listen passively for unsolicited publishes.
    #[default]
    Passive,
    /// Transmit active subscribe frames.
    Active,
}

/// Configuration of a subscribe discovery session. Opaque to the core;
/// threaded through to the HAL unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscribeConfig {
    pub service_name: String,
    pub service_specific_info: Vec<u8>,
    pub match_filter: Vec<u8>,
    pub subscribe_type: SubscribeType,
    /// Number of discovery events before auto-termination; 0 = unlimited.
    pub subscribe_count: u8,
    /// Session lifetime in seconds; 0 = unlimited.
    pub ttl_sec: u16,
}

/// Merge an optional incoming request with the requests of all existing
/// clients into the single configuration to apply to the firmware.
///
/// Rules:
/// - `support_5g_band`: logical OR across all requests.
/// - `master_preference`: maximum across all requests.
/// - Cluster range: requests with the default full range are skipped;
///   constrained requests are unioned (min of lows, max of highs). If no
///   request constrains the range the default is returned.
///
/// Returns `None` (and logs) when called with no clients and no incoming
/// request: there is nothing to configure.
pub fn merge_config_requests<'a>(
    new_request: Option<&ConfigRequest>,
    existing: impl IntoIterator<Item = &'a ConfigRequest>,
) -> Option<ConfigRequest> {
    let mut support_5g_band = false;
    let mut master_preference = 0u8;
    let mut cluster_valid = false;
    let mut cluster_low = 0u16;
    let mut cluster_high = CLUSTER_ID_MAX;

    let mut any = false;
    if let Some(request) = new_request {
        any = true;
        support_5g_band = request.support_5g_band;
        master_preference = request.master_preference;
        if request.has_cluster_constraint() {
            cluster_valid = true;
            cluster_low = request.cluster_low;
            cluster_high = request.cluster_high;
        }
    }

    for request in existing {
        any = true;

        if request.support_5g_band {
            support_5g_band = true;
        }

        master_preference = master_preference.max(request.master_preference);

        if request.has_cluster_constraint() {
            if cluster_valid {
                cluster_low = cluster_low.min(request.cluster_low);
                cluster_high = cluster_high.max(request.cluster_high);
            } else {
                cluster_low = request.cluster_low;
                cluster_high = request.cluster_high;
            }
            cluster_valid = true;
        }
    }

    if !any {
        error!("merge_config_requests: called with no clients and no incoming request");
        return None;
    }

    Some(ConfigRequest {
        support_5g_band,
        master_preference,
        cluster_low,
        cluster_high,
    })
}

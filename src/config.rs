//! Environment-driven configuration.
//!
//! Every setting is read once at startup from a fixed set of upper-case
//! env var names; a malformed value fails fast (print-and-exit) before
//! any socket is bound. This crate has no CLI surface of its own.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::cluster::discovery::DiscoveryMode;
use crate::cluster::PeerIndex;
use crate::server::UnwrapFailure;

pub const DEFAULT_GOSSIP_PORT: u16 = 9000;
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_FANOUT: usize = 4;
pub const DEFAULT_SUSPECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_DEAD_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_FAILURE_CHECK_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_SPARSITY_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_EXPECTED_HUB_COUNT: u64 = 3;
pub const DEFAULT_ROOM_PROBE_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_ROOM_PROBE_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_ROOM_PROBE_PORT: u16 = 8080;
pub const DEFAULT_ROOM_EXPECTED_STATUS: &str = "WAITING_FOR_PLAYERS";

/// Every environment variable this hub reads, plus `LOG_LEVEL`.
/// Constructed once at startup with [`HubSettings::load`]; malformed
/// values fail fast before any socket is bound (`UnwrapFailure::failed_to`).
pub struct HubSettings {
    pub hub_index: PeerIndex,
    pub gossip_port: u16,
    pub http_port: u16,
    pub fanout: usize,

    pub suspect_timeout: Duration,
    pub dead_timeout: Duration,
    pub failure_check_interval: Duration,

    pub sparsity_check_interval: Duration,
    pub expected_hub_count: PeerIndex,

    pub discovery_mode: DiscoveryMode,
    pub k8s_namespace: String,
    pub hub_service_name: String,
    pub external_address: String,

    pub room_probe_interval: Duration,
    pub room_probe_timeout: Duration,
    pub room_probe_port: u16,
    pub room_expected_status: String,

    pub log_level: String,
}

fn get(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(value) => value
            .parse::<T>()
            .failed_to(&format!("parse environment variable {}", name)),
        None => default,
    }
}

fn duration_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(parse_or(name, default_secs))
}

impl HubSettings {
    /// Derives the hub's index from `HOSTNAME` (`^hub-(\d+)(\..*)?$`) and
    /// reads every other variable, applying defaults where one is allowed.
    /// Exits the process with a diagnostic on any malformed value.
    pub fn load() -> Self {
        let hostname = get("HOSTNAME").failed_to("read HOSTNAME (required to derive hub index)");
        let hub_index =
            parse_hub_index(&hostname).failed_to("parse HOSTNAME as 'hub-<N>[.<rest>]'");

        let discovery_mode = match get("HUB_DISCOVERY_MODE") {
            Some(value) => value
                .parse::<DiscoveryMode>()
                .failed_to("parse HUB_DISCOVERY_MODE"),
            None => DiscoveryMode::Manual,
        };

        let fanout: usize = parse_or("HUB_FANOUT", DEFAULT_FANOUT);
        if fanout == 0 {
            crate::server::failed_to("validate HUB_FANOUT: must be greater than zero");
        }

        HubSettings {
            hub_index,
            gossip_port: parse_or("GOSSIP_PORT", DEFAULT_GOSSIP_PORT),
            http_port: parse_or("HTTP_PORT", DEFAULT_HTTP_PORT),
            fanout,

            suspect_timeout: duration_secs(
                "FAILURE_DETECTOR_SUSPECT_TIMEOUT",
                DEFAULT_SUSPECT_TIMEOUT_SECS,
            ),
            dead_timeout: duration_secs(
                "FAILURE_DETECTOR_DEAD_TIMEOUT",
                DEFAULT_DEAD_TIMEOUT_SECS,
            ),
            failure_check_interval: duration_secs(
                "FAILURE_DETECTOR_CHECK_INTERVAL",
                DEFAULT_FAILURE_CHECK_INTERVAL_SECS,
            ),

            sparsity_check_interval: duration_secs(
                "CHECK_INTERVAL",
                DEFAULT_SPARSITY_CHECK_INTERVAL_SECS,
            ),
            expected_hub_count: parse_or("EXPECTED_HUB_COUNT", DEFAULT_EXPECTED_HUB_COUNT),

            discovery_mode,
            k8s_namespace: get("K8S_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            hub_service_name: get("HUB_SERVICE_NAME").unwrap_or_else(|| "hub".to_string()),
            external_address: get("EXTERNAL_ADDRESS").unwrap_or_else(|| "127.0.0.1".to_string()),

            room_probe_interval: duration_secs(
                "ROOM_HEALTH_CHECK_INTERVAL",
                DEFAULT_ROOM_PROBE_INTERVAL_SECS,
            ),
            room_probe_timeout: duration_secs(
                "ROOM_HEALTH_TIMEOUT",
                DEFAULT_ROOM_PROBE_TIMEOUT_SECS,
            ),
            room_probe_port: parse_or("ROOM_PROBE_PORT", DEFAULT_ROOM_PROBE_PORT),
            room_expected_status: get("ROOM_EXPECTED_STATUS")
                .unwrap_or_else(|| DEFAULT_ROOM_EXPECTED_STATUS.to_string()),

            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// The local gossip bind address. In `manual` mode every hub shares
    /// the same `GOSSIP_PORT` base and is addressed by peers at
    /// `GOSSIP_PORT + index`, so this hub must actually listen there for
    /// that formula to resolve anything. In `orchestrated` mode each hub
    /// is its own pod, so every hub binds the same `GOSSIP_PORT` and is
    /// differentiated by hostname instead.
    pub fn bind_addr(&self) -> SocketAddr {
        let port = match self.discovery_mode {
            DiscoveryMode::Manual => self
                .gossip_port
                .checked_add(self.hub_index as u16)
                .failed_to("compute gossip bind port: GOSSIP_PORT + hub_index overflowed u16"),
            DiscoveryMode::Orchestrated => self.gossip_port,
        };
        SocketAddr::from(([0, 0, 0, 0], port))
    }

    pub fn http_bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.http_port))
    }
}

/// Parses `hub-<N>` (optionally followed by `.<rest>`, as a pod's FQDN
/// would carry) into the hub's numeric index. Leading zeros are accepted.
pub fn parse_hub_index(hostname: &str) -> Result<PeerIndex, String> {
    let rest = hostname
        .strip_prefix("hub-")
        .ok_or_else(|| format!("hostname '{}' does not start with 'hub-'", hostname))?;
    let digits: String = rest
        .split('.')
        .next()
        .unwrap_or("")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let consumed = rest.split('.').next().unwrap_or("").len();
    if digits.is_empty() || digits.len() != consumed {
        return Err(format!(
            "hostname '{}' does not match '^hub-(\\d+)(\\..*)?$'",
            hostname
        ));
    }
    digits
        .parse::<PeerIndex>()
        .map_err(|e| format!("failed to parse hub index '{}': {}", digits, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_hub_hostname() {
        assert_eq!(parse_hub_index("hub-0").unwrap(), 0);
        assert_eq!(parse_hub_index("hub-12").unwrap(), 12);
    }

    #[test]
    fn accepts_leading_zeros() {
        assert_eq!(parse_hub_index("hub-007").unwrap(), 7);
    }

    #[test]
    fn accepts_fqdn_suffix() {
        assert_eq!(
            parse_hub_index("hub-3.hub-svc.default.svc.cluster.local").unwrap(),
            3
        );
    }

    #[test]
    fn rejects_mismatched_hostname() {
        assert!(parse_hub_index("worker-0").is_err());
        assert!(parse_hub_index("hub-abc").is_err());
        assert!(parse_hub_index("hub-").is_err());
    }
}

//! Outbound-address selection
//!
//! Workers advertise the address an admin should use to reach them.
//! Interface enumeration frequently yields VPN/hypervisor adapters and
//! link-local noise, so candidates are filtered by a name heuristic and
//! ranked by private range: 192.168/16 first, then 10/8, then
//! 172.16/12, then any other routable address.

use std::net::Ipv4Addr;

/// Substrings identifying virtual adapters we never want to advertise
const VIRTUAL_ADAPTER_NAMES: &[&str] = &[
    "virtual", "vmware", "vbox", "docker", "vethernet", "hyper-v",
];

/// A candidate interface address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceAddr {
    /// Interface name as reported by the OS
    pub name: String,
    /// IPv4 address bound to the interface
    pub ip: Ipv4Addr,
}

impl IfaceAddr {
    /// Create a new candidate
    pub fn new(name: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            ip,
        }
    }
}

fn is_virtual_adapter(name: &str) -> bool {
    let lower = name.to_lowercase();
    VIRTUAL_ADAPTER_NAMES.iter().any(|v| lower.contains(v))
}

/// Rank interface candidates and pick the address to advertise
///
/// Pure so the preference order is testable without real interfaces.
pub fn pick_preferred_ipv4(candidates: &[IfaceAddr]) -> Option<Ipv4Addr> {
    let mut private_candidate: Option<Ipv4Addr> = None;
    let mut fallback: Option<Ipv4Addr> = None;

    for candidate in candidates {
        let ip = candidate.ip;

        if ip.is_loopback() || ip.is_link_local() {
            continue;
        }
        if is_virtual_adapter(&candidate.name) {
            continue;
        }

        let octets = ip.octets();

        // 192.168.x.x wins outright
        if octets[0] == 192 && octets[1] == 168 {
            return Some(ip);
        }
        // 10/8 and 172.16/12 are kept as second-tier candidates
        if octets[0] == 10 || (octets[0] == 172 && (16..=31).contains(&octets[1])) {
            private_candidate.get_or_insert(ip);
            continue;
        }

        fallback.get_or_insert(ip);
    }

    private_candidate.or(fallback)
}

/// Detect the preferred local IPv4 address of this host
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!("Failed to enumerate interfaces: {}", e);
            return None;
        }
    };

    let candidates: Vec<IfaceAddr> = interfaces
        .into_iter()
        .filter_map(|iface| match iface.ip() {
            std::net::IpAddr::V4(ip) => Some(IfaceAddr::new(iface.name, ip)),
            std::net::IpAddr::V6(_) => None,
        })
        .collect();

    pick_preferred_ipv4(&candidates)
}

/// Preferred local address as a string, "unknown" when detection fails
pub fn local_ip_string() -> String {
    local_ipv4()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str, a: u8, b: u8, c: u8, d: u8) -> IfaceAddr {
        IfaceAddr::new(name, Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_prefers_192_168_over_everything() {
        let candidates = vec![
            addr("eth0", 10, 1, 2, 3),
            addr("eth1", 203, 0, 113, 7),
            addr("wlan0", 192, 168, 1, 50),
        ];
        assert_eq!(
            pick_preferred_ipv4(&candidates),
            Some(Ipv4Addr::new(192, 168, 1, 50))
        );
    }

    #[test]
    fn test_second_tier_private_beats_public() {
        let candidates = vec![
            addr("eth0", 203, 0, 113, 7),
            addr("eth1", 172, 20, 0, 9),
        ];
        assert_eq!(
            pick_preferred_ipv4(&candidates),
            Some(Ipv4Addr::new(172, 20, 0, 9))
        );
    }

    #[test]
    fn test_172_outside_private_block_is_fallback_only() {
        let candidates = vec![addr("eth0", 172, 32, 0, 1)];
        // Still returned, but as a plain fallback
        assert_eq!(
            pick_preferred_ipv4(&candidates),
            Some(Ipv4Addr::new(172, 32, 0, 1))
        );
    }

    #[test]
    fn test_skips_loopback_link_local_and_virtual() {
        let candidates = vec![
            addr("lo", 127, 0, 0, 1),
            addr("eth0", 169, 254, 10, 10),
            addr("vEthernet (WSL)", 192, 168, 200, 1),
            addr("docker0", 172, 17, 0, 1),
            addr("VMware Network Adapter", 192, 168, 56, 1),
        ];
        assert_eq!(pick_preferred_ipv4(&candidates), None);
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(pick_preferred_ipv4(&[]), None);
    }
}

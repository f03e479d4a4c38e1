//! Subnet host enumeration from the machine's own interfaces.

use std::net::Ipv4Addr;

use tracing::debug;

/// Enumerates probe targets on every usable local IPv4 network.
///
/// Loopback and link-local interfaces are skipped. The interface's own
/// address, the network address and the broadcast address are excluded
/// from the result.
pub fn local_subnet_hosts() -> Vec<Ipv4Addr> {
    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return Vec::new();
    };

    let mut hosts = Vec::new();
    for iface in interfaces {
        let if_addrs::IfAddr::V4(v4) = iface.addr else {
            continue;
        };
        if !usable(v4.ip) {
            continue;
        }
        let subnet = hosts_for(v4.ip, v4.netmask);
        debug!(
            interface = %iface.name,
            ip = %v4.ip,
            netmask = %v4.netmask,
            hosts = subnet.len(),
            "enumerated subnet"
        );
        hosts.extend(subnet);
    }
    hosts.sort_unstable();
    hosts.dedup();
    hosts
}

/// Whether an interface address is worth scanning from.
fn usable(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    if octets[0] == 127 {
        return false;
    }
    if octets[0] == 169 && octets[1] == 254 {
        return false;
    }
    true
}

/// Host addresses of the network containing `addr`.
///
/// Networks wider than /24 are clamped to the /24 around `addr`; a home
/// gateway sits next to the client, and walking a /16 would take minutes.
pub(crate) fn hosts_for(addr: Ipv4Addr, netmask: Ipv4Addr) -> Vec<Ipv4Addr> {
    let prefix = u32::from(netmask).count_ones();
    let effective_prefix = prefix.max(24);
    if effective_prefix >= 31 {
        // /31 and /32 have no other hosts to probe.
        return Vec::new();
    }

    let mask = u32::MAX << (32 - effective_prefix);
    let network = u32::from(addr) & mask;
    let broadcast = network | !mask;
    let own = u32::from(addr);

    (network + 1..broadcast)
        .filter(|&host| host != own)
        .map(Ipv4Addr::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash24_yields_253_other_hosts() {
        let hosts = hosts_for("192.168.1.17".parse().unwrap(), "255.255.255.0".parse().unwrap());
        assert_eq!(hosts.len(), 253);
        assert!(!hosts.contains(&"192.168.1.17".parse().unwrap()));
        assert!(!hosts.contains(&"192.168.1.0".parse().unwrap()));
        assert!(!hosts.contains(&"192.168.1.255".parse().unwrap()));
        assert!(hosts.contains(&"192.168.1.1".parse().unwrap()));
        assert!(hosts.contains(&"192.168.1.254".parse().unwrap()));
    }

    #[test]
    fn wide_networks_clamp_to_slash24() {
        let hosts = hosts_for("10.1.2.3".parse().unwrap(), "255.255.0.0".parse().unwrap());
        assert_eq!(hosts.len(), 253);
        assert!(hosts.iter().all(|h| h.octets()[0] == 10 && h.octets()[2] == 2));
    }

    #[test]
    fn narrow_networks_keep_their_prefix() {
        let hosts = hosts_for("192.168.1.5".parse().unwrap(), "255.255.255.240".parse().unwrap());
        // /28: 16 addresses minus network, broadcast and self.
        assert_eq!(hosts.len(), 13);
    }

    #[test]
    fn point_to_point_has_no_targets() {
        assert!(hosts_for("10.0.0.1".parse().unwrap(), "255.255.255.254".parse().unwrap()).is_empty());
        assert!(hosts_for("10.0.0.1".parse().unwrap(), "255.255.255.255".parse().unwrap()).is_empty());
    }

    #[test]
    fn loopback_and_link_local_are_unusable() {
        assert!(!usable("127.0.0.1".parse().unwrap()));
        assert!(!usable("169.254.12.9".parse().unwrap()));
        assert!(usable("192.168.1.4".parse().unwrap()));
    }
}

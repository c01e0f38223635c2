use std::net::IpAddr;

use pnet::datalink;
use regex::Regex;
use reqwest::Client;
use shared::protocol::PUBLIC_INTERFACE;
use shared::types::InterfaceEntry;

use crate::error::SnapshotError;

/// Container bridge hidden from the snapshot regardless of configuration
const CONTAINER_BRIDGE: &str = "docker0";

/// Matches interface names against the configured exclusion prefixes.
pub struct InterfaceFilter {
    patterns: Vec<Regex>,
}

impl InterfaceFilter {
    pub fn new(prefixes: &[String]) -> Self {
        let mut patterns = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            match Regex::new(&format!("^{}.*", prefix)) {
                Ok(re) => patterns.push(re),
                Err(e) => {
                    tracing::warn!("Ignoring invalid interface prefix {:?}: {}", prefix, e);
                }
            }
        }
        Self { patterns }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        name == CONTAINER_BRIDGE || self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// An interface as reported by the host, before filtering
pub struct HostInterface {
    pub name: String,
    pub addrs: Vec<IpAddr>,
}

/// Enumerate host interfaces and their assigned addresses.
pub fn host_interfaces() -> Result<Vec<HostInterface>, SnapshotError> {
    let interfaces = datalink::interfaces();
    if interfaces.is_empty() {
        // Linux always reports at least loopback; an empty list means the
        // underlying query failed.
        return Err(SnapshotError::InterfaceEnumeration);
    }

    Ok(interfaces
        .into_iter()
        .map(|iface| HostInterface {
            name: iface.name,
            addrs: iface.ips.iter().map(|net| net.ip()).collect(),
        })
        .collect())
}

/// One entry per routable IPv4 address on a non-excluded interface.
/// An interface holding several addresses yields several entries.
pub fn filter_interfaces(
    interfaces: &[HostInterface],
    filter: &InterfaceFilter,
) -> Vec<InterfaceEntry> {
    let mut entries = Vec::new();
    for iface in interfaces {
        if filter.is_excluded(&iface.name) {
            continue;
        }
        for addr in &iface.addrs {
            let v4 = match addr {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(_) => continue,
            };
            if v4.is_loopback() || v4.is_link_local() {
                continue;
            }
            entries.push(InterfaceEntry {
                name: iface.name.clone(),
                ip: v4.to_string(),
            });
        }
    }
    entries
}

/// Fetch the public address from a plain-text endpoint. Failures are logged
/// and swallowed so the local snapshot still renders.
pub async fn lookup_public_ip(client: &Client, url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }

    let response = match client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Public IP lookup failed: {}", e);
            return None;
        }
    };

    match response.text().await {
        Ok(body) => {
            let ip = body.trim().to_string();
            if ip.is_empty() {
                None
            } else {
                Some(ip)
            }
        }
        Err(e) => {
            tracing::warn!("Failed to read public IP response: {}", e);
            None
        }
    }
}

/// Full interface snapshot: filtered local entries, plus a synthetic
/// public entry appended when the lookup succeeds.
pub async fn snapshot_interfaces(
    filter: &InterfaceFilter,
    client: &Client,
    public_ip_url: &str,
) -> Result<Vec<InterfaceEntry>, SnapshotError> {
    let hosts = host_interfaces()?;
    let mut entries = filter_interfaces(&hosts, filter);

    if let Some(ip) = lookup_public_ip(client, public_ip_url).await {
        entries.push(InterfaceEntry {
            name: PUBLIC_INTERFACE.to_string(),
            ip,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, addrs: &[&str]) -> HostInterface {
        HostInterface {
            name: name.to_string(),
            addrs: addrs.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn excludes_by_prefix_and_container_bridge() {
        let filter = InterfaceFilter::new(&[
            "lo".to_string(),
            "br-".to_string(),
            "veth".to_string(),
        ]);
        assert!(filter.is_excluded("lo"));
        assert!(filter.is_excluded("br-1a2b3c"));
        assert!(filter.is_excluded("veth01ab"));
        assert!(filter.is_excluded("docker0"));
        assert!(!filter.is_excluded("eth0"));
        assert!(!filter.is_excluded("wlan0"));
    }

    #[test]
    fn keeps_only_routable_ipv4() {
        let filter = InterfaceFilter::new(&[]);
        let hosts = vec![host(
            "eth0",
            &["127.0.0.1", "169.254.1.5", "192.168.1.10", "::1", "fe80::1"],
        )];

        let entries = filter_interfaces(&hosts, &filter);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "eth0");
        assert_eq!(entries[0].ip, "192.168.1.10");
    }

    #[test]
    fn interface_with_two_addresses_yields_two_entries() {
        let filter = InterfaceFilter::new(&[]);
        let hosts = vec![host("eth0", &["192.168.1.10", "10.0.0.2"])];

        let entries = filter_interfaces(&hosts, &filter);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.name == "eth0"));
    }

    #[test]
    fn excluded_interface_contributes_nothing() {
        let filter = InterfaceFilter::new(&["veth".to_string()]);
        let hosts = vec![
            host("veth01ab", &["192.168.100.2"]),
            host("eth0", &["192.168.1.10"]),
        ];

        let entries = filter_interfaces(&hosts, &filter);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "eth0");
    }

    #[test]
    fn invalid_prefix_is_ignored() {
        let filter = InterfaceFilter::new(&["[".to_string(), "eth".to_string()]);
        assert!(filter.is_excluded("eth0"));
        assert!(!filter.is_excluded("wlan0"));
    }

    #[tokio::test]
    async fn empty_url_disables_lookup() {
        let client = Client::new();
        assert_eq!(lookup_public_ip(&client, "").await, None);
    }
}

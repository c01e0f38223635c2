use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use shared::types::{Protocol, ServiceEntry, SocketState};

use crate::error::SnapshotError;

/// First process name inside a `users:(("name",pid=...,fd=...))` column
static PROCESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"users:\(\("([^"]+)".*?\)"#).expect("Failed to compile process regex")
});

/// Provider of raw socket-table text.
///
/// Production code shells out to `ss`; tests substitute canned output.
pub trait SocketSource: Send + Sync {
    /// Full socket table with process info (`ss -tulnp`)
    fn socket_table(&self) -> Result<String, SnapshotError>;

    /// Listening-socket summary without process info (`ss -tuln`)
    fn used_port_summary(&self) -> Result<String, SnapshotError>;
}

/// The real thing: invokes the system `ss` binary.
pub struct SsSocketSource;

impl SsSocketSource {
    fn run(&self, args: &[&str], command: &'static str) -> Result<String, SnapshotError> {
        let output = Command::new("ss")
            .args(args)
            .output()
            .map_err(|source| SnapshotError::CommandExecution { command, source })?;

        if !output.status.success() {
            return Err(SnapshotError::CommandStatus {
                command,
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SocketSource for SsSocketSource {
    fn socket_table(&self) -> Result<String, SnapshotError> {
        self.run(&["-tulnp"], "ss -tulnp")
    }

    fn used_port_summary(&self) -> Result<String, SnapshotError> {
        self.run(&["-tuln"], "ss -tuln")
    }
}

/// Parse `ss -tulnp` output into service entries, skipping the header and
/// anything that does not look like a TCP or UDP row.
pub fn parse_socket_table(raw: &str) -> Vec<ServiceEntry> {
    raw.lines().filter_map(parse_row).collect()
}

fn parse_row(line: &str) -> Option<ServiceEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }

    let protocol = Protocol::from_token(fields[0])?;
    let (local_address, local_port) = split_address_port(fields[4])?;

    let raw_process_info = if fields.len() > 6 {
        fields[6..].join(" ")
    } else {
        String::new()
    };
    let process_label = PROCESS_RE
        .captures(&raw_process_info)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "N/A".to_string());

    Some(ServiceEntry {
        protocol,
        local_address,
        local_port,
        state: normalize_state(fields[1]),
        process_label,
        raw_process_info,
    })
}

/// Split an `ss` local-address column at the last colon. IPv6 addresses
/// arrive bracketed (`[::1]:9090`); the brackets come off only when both
/// are present.
fn split_address_port(field: &str) -> Option<(String, String)> {
    let (addr, port) = field.rsplit_once(':')?;
    let addr = match addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        Some(inner) => inner,
        None => addr,
    };
    Some((addr.to_string(), port.to_string()))
}

fn normalize_state(token: &str) -> SocketState {
    match token {
        "LISTEN" => SocketState::Listening,
        "ESTAB" => SocketState::Established,
        "TIME-WAIT" => SocketState::TimeWait,
        "CLOSE-WAIT" => SocketState::CloseWait,
        other => SocketState::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"Netid  State      Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
udp    UNCONN     0      0      0.0.0.0:68           0.0.0.0:*
tcp    LISTEN     0      128    0.0.0.0:8080         0.0.0.0:*          users:(("nginx",pid=100,fd=6))
tcp    LISTEN     0      128    [::1]:9090           [::]:*             users:(("sshd",pid=200,fd=3))
tcp    ESTAB      0      0      192.168.1.5:44312    93.184.216.34:443  users:(("curl",pid=300,fd=5))
"#;

    #[test]
    fn parses_ipv4_listener_with_process() {
        let entries = parse_socket_table(SAMPLE);
        let nginx = entries
            .iter()
            .find(|e| e.process_label == "nginx")
            .unwrap();
        assert_eq!(nginx.protocol, Protocol::Tcp);
        assert_eq!(nginx.local_address, "0.0.0.0");
        assert_eq!(nginx.local_port, "8080");
        assert_eq!(nginx.state, SocketState::Listening);
        assert_eq!(nginx.raw_process_info, r#"users:(("nginx",pid=100,fd=6))"#);
    }

    #[test]
    fn strips_ipv6_brackets() {
        let entries = parse_socket_table(SAMPLE);
        let sshd = entries.iter().find(|e| e.process_label == "sshd").unwrap();
        assert_eq!(sshd.local_address, "::1");
        assert_eq!(sshd.local_port, "9090");
    }

    #[test]
    fn header_and_short_rows_are_skipped() {
        let entries = parse_socket_table(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.local_port.parse::<u32>().is_ok()));
    }

    #[test]
    fn row_without_process_column_gets_placeholder() {
        let entries = parse_socket_table(SAMPLE);
        let dhcp = entries.iter().find(|e| e.local_port == "68").unwrap();
        assert_eq!(dhcp.process_label, "N/A");
        assert_eq!(dhcp.raw_process_info, "");
        assert_eq!(dhcp.protocol, Protocol::Udp);
        assert_eq!(dhcp.state, SocketState::Other("UNCONN".to_string()));
    }

    #[test]
    fn established_state_is_normalized() {
        let entries = parse_socket_table(SAMPLE);
        let curl = entries.iter().find(|e| e.process_label == "curl").unwrap();
        assert_eq!(curl.state, SocketState::Established);
    }

    #[test]
    fn trailing_process_fields_are_rejoined() {
        let line = r#"tcp LISTEN 0 128 127.0.0.1:631 0.0.0.0:* users:(("cupsd",pid=1,fd=7)) extra tail"#;
        let entry = parse_row(line).unwrap();
        assert_eq!(
            entry.raw_process_info,
            r#"users:(("cupsd",pid=1,fd=7)) extra tail"#
        );
        assert_eq!(entry.process_label, "cupsd");
    }

    #[test]
    fn wildcard_address_splits_at_last_colon() {
        let entry = parse_row("tcp LISTEN 0 128 *:80 *:* -").unwrap();
        assert_eq!(entry.local_address, "*");
        assert_eq!(entry.local_port, "80");
    }

    #[test]
    fn address_without_colon_is_skipped() {
        assert!(parse_row("tcp LISTEN 0 128 nonsense 0.0.0.0:*").is_none());
    }

    #[test]
    fn unknown_netid_is_skipped() {
        assert!(parse_row("raw UNCONN 0 0 0.0.0.0:1 0.0.0.0:*").is_none());
    }

    #[test]
    fn time_wait_and_close_wait_map_to_variants() {
        assert_eq!(normalize_state("TIME-WAIT"), SocketState::TimeWait);
        assert_eq!(normalize_state("CLOSE-WAIT"), SocketState::CloseWait);
    }

    #[test]
    fn identity_key_combines_address_port_protocol() {
        let entries = parse_socket_table(SAMPLE);
        let nginx = entries
            .iter()
            .find(|e| e.process_label == "nginx")
            .unwrap();
        assert_eq!(nginx.identity_key(), "0.0.0.0:8080:tcp");
    }
}

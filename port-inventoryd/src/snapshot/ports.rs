use std::collections::HashSet;
use std::net::TcpListener;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SnapshotError;
use crate::snapshot::sockets::SocketSource;

/// Largest run of consecutive free ports a single request may ask for
pub const MAX_WINDOW: usize = 100;

/// Port number at the end of a listening-socket summary line
static USED_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\d+)\s*$").expect("Failed to compile used-port regex"));

/// Resolve a named range preset to inclusive bounds. Absent or unknown
/// presets fall back to the full scan range.
pub fn range_from_preset(preset: Option<&str>) -> (u16, u16) {
    match preset {
        Some("1000-10000") => (1000, 10000),
        Some("10001-30000") => (10001, 30000),
        Some("30001-50000") => (30001, 50000),
        Some("50001-65530") => (50001, 65530),
        _ => (1000, 65530),
    }
}

/// Ports currently bound according to an `ss -tuln` summary
pub fn parse_used_ports(raw: &str) -> HashSet<u16> {
    let mut used = HashSet::new();
    for line in raw.lines() {
        if let Some(caps) = USED_PORT_RE.captures(line) {
            if let Ok(port) = caps[1].parse::<u16>() {
                used.insert(port);
            }
        }
    }
    used
}

/// Find the first run of `count` consecutive ports in `[low, high]` that
/// are absent from the used set and currently bindable.
pub fn find_free_ports(
    source: &dyn SocketSource,
    count: usize,
    low: u16,
    high: u16,
) -> Result<Vec<u16>, SnapshotError> {
    let summary = source.used_port_summary()?;
    let used = parse_used_ports(&summary);

    scan_window(&used, bind_probe, count, low, high)
        .ok_or(SnapshotError::InsufficientFreePorts { count, low, high })
}

fn scan_window(
    used: &HashSet<u16>,
    probe: impl Fn(u16) -> bool,
    count: usize,
    low: u16,
    high: u16,
) -> Option<Vec<u16>> {
    if count == 0 {
        return Some(Vec::new());
    }

    // u32 arithmetic: the window end overflows u16 when high is 65535.
    let count = count as u32;
    let high = high as u32;
    let mut current = low as u32;

    while current + count - 1 <= high {
        let mut failed_at = None;
        for offset in 0..count {
            let port = (current + offset) as u16;
            if used.contains(&port) || !probe(port) {
                failed_at = Some(offset);
                break;
            }
        }

        match failed_at {
            None => return Some((0..count).map(|o| (current + o) as u16).collect()),
            Some(offset) => {
                // No window containing the failed port can succeed, so
                // resume just past it.
                current += offset + 1;
            }
        }
    }

    None
}

/// A successful bind means nothing holds the port at this instant. The
/// answer is advisory; the port can be taken again the moment the probe
/// socket closes.
fn bind_probe(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

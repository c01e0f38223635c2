/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Synthetic interface name for the public/WAN entry
pub const PUBLIC_INTERFACE: &str = "public";

/// Presentation groupings of services by protocol and address family.
/// Column-visibility writes fan out to every kind so they always agree.
pub const TABLE_KINDS: [&str; 4] = ["tcpv4", "tcpv6", "udpv4", "udpv6"];

/// Columns a dashboard may toggle per table
pub const KNOWN_COLUMNS: [&str; 7] = [
    "process_name",
    "service_name",
    "protocol",
    "listen_addr",
    "state",
    "url_path",
    "access_links",
];

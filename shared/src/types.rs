use std::fmt;
use serde::{Serialize, Deserialize};

/// Transport protocol of an observed socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Parse the protocol column of a socket listing. Anything other than
    /// plain "tcp"/"udp" (header rows, raw sockets, netlink) is rejected.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Connection state of a socket, normalized from the listing utility's
/// raw tokens. States outside the normalized set pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SocketState {
    Listening,
    Established,
    TimeWait,
    CloseWait,
    Other(String),
}

impl From<SocketState> for String {
    fn from(state: SocketState) -> String {
        match state {
            SocketState::Listening => "Listening".to_string(),
            SocketState::Established => "Established".to_string(),
            SocketState::TimeWait => "TimeWait".to_string(),
            SocketState::CloseWait => "CloseWait".to_string(),
            SocketState::Other(raw) => raw,
        }
    }
}

impl From<String> for SocketState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Listening" => SocketState::Listening,
            "Established" => SocketState::Established,
            "TimeWait" => SocketState::TimeWait,
            "CloseWait" => SocketState::CloseWait,
            _ => SocketState::Other(raw),
        }
    }
}

/// One observed listening/connected socket.
/// This is the canonical data model used by the snapshot engine, API, and clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Transport protocol
    pub protocol: Protocol,

    /// Local IP literal, brackets stripped for IPv6; may be a wildcard
    /// such as "0.0.0.0", "*", or "::"
    pub local_address: String,

    /// Local port, kept as the textual column value
    pub local_port: String,

    /// Normalized connection state
    pub state: SocketState,

    /// Name of the owning process, or "N/A" when unknown
    pub process_label: String,

    /// Full unparsed process/owner column, for tooltips and diagnostics
    pub raw_process_info: String,
}

impl ServiceEntry {
    /// Identity key joining live snapshots with stored annotations.
    /// Stable across snapshots as long as the service keeps its address,
    /// port and protocol.
    pub fn identity_key(&self) -> String {
        format!("{}:{}:{}", self.local_address, self.local_port, self.protocol)
    }
}

/// One interface/address pair. An interface with several usable IPv4
/// addresses produces one entry per address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceEntry {
    /// Interface name, or the synthetic public label for the WAN entry
    pub name: String,

    /// IPv4 literal
    pub ip: String,
}

/// Saved display name for one service identity key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNameRecord {
    pub service_id: String,
    pub name: String,
}

/// Link visibility for one interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfigRecord {
    pub name: String,
    pub show_links: bool,
}

/// Column visibility for one (table-kind, column) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfigRecord {
    pub table: String,
    pub column: String,
    pub visible: bool,
}

/// Saved URL path for one service identity key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPathRecord {
    pub service_id: String,
    pub path: String,
}

/// On-disk and over-the-wire shape of the whole annotation store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationDocument {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub service_names: Vec<ServiceNameRecord>,

    #[serde(default, deserialize_with = "nullable_vec")]
    pub interface_configs: Vec<InterfaceConfigRecord>,

    #[serde(default, deserialize_with = "nullable_vec")]
    pub column_configs: Vec<ColumnConfigRecord>,

    #[serde(default, deserialize_with = "nullable_vec")]
    pub url_paths: Vec<UrlPathRecord>,
}

/// Files written with empty mappings may encode an array as JSON null;
/// treat that the same as an absent array.
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    let value = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

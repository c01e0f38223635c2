use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failures while collecting a live snapshot of sockets, interfaces,
/// or free ports.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to run `{command}`: {source}")]
    CommandExecution {
        command: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}")]
    CommandStatus {
        command: &'static str,
        status: ExitStatus,
    },

    #[error("no network interfaces could be enumerated")]
    InterfaceEnumeration,

    #[error("no run of {count} consecutive free ports between {low} and {high}")]
    InsufficientFreePorts { count: usize, low: u16, high: u16 },
}

/// Failures while reading or writing the annotation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist annotations to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode annotations: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("annotation store is no longer running")]
    Unavailable,
}

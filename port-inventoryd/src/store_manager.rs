use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;

use tokio::sync::{mpsc, oneshot};

use crate::error::StoreError;
use crate::store::AnnotationData;

/// Commands sent to the annotation store thread
pub enum StoreCommand {
    Fetch(oneshot::Sender<AnnotationData>),
    SetServiceName {
        service_id: String,
        name: String,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    SetInterfaceLinks {
        interface: String,
        show_links: bool,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    SetUrlPath {
        service_id: String,
        path: String,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    SetColumns {
        visibility: HashMap<String, bool>,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Shutdown,
}

/// Handle to interact with the annotation store
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn the store thread. All mutations funnel through it, so
    /// concurrent writers can never interleave partial saves.
    pub fn spawn(mut data: AnnotationData, path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Fetch(reply) => {
                        let _ = reply.send(data.clone());
                    }
                    StoreCommand::SetServiceName {
                        service_id,
                        name,
                        reply,
                    } => {
                        // Memory first, then disk. A failed save is reported
                        // but the in-memory annotation stays applied.
                        data.set_service_name(&service_id, &name);
                        let _ = reply.send(data.save(&path));
                    }
                    StoreCommand::SetInterfaceLinks {
                        interface,
                        show_links,
                        reply,
                    } => {
                        data.set_interface_links(&interface, show_links);
                        let _ = reply.send(data.save(&path));
                    }
                    StoreCommand::SetUrlPath {
                        service_id,
                        path: url_path,
                        reply,
                    } => {
                        data.set_url_path(&service_id, &url_path);
                        let _ = reply.send(data.save(&path));
                    }
                    StoreCommand::SetColumns { visibility, reply } => {
                        data.set_columns_for_all_tables(&visibility);
                        let _ = reply.send(data.save(&path));
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Annotation store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Snapshot of the current annotation state
    pub async fn fetch(&self) -> Result<AnnotationData, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::Fetch(reply))
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)
    }

    /// Name a service and persist
    pub async fn set_service_name(
        &self,
        service_id: String,
        name: String,
    ) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::SetServiceName {
                service_id,
                name,
                reply,
            })
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)?
    }

    /// Toggle access links for an interface and persist
    pub async fn set_interface_links(
        &self,
        interface: String,
        show_links: bool,
    ) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::SetInterfaceLinks {
                interface,
                show_links,
                reply,
            })
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)?
    }

    /// Set a service's URL path and persist
    pub async fn set_url_path(&self, service_id: String, path: String) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::SetUrlPath {
                service_id,
                path,
                reply,
            })
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)?
    }

    /// Apply column toggles across every table kind and persist
    pub async fn set_columns(&self, visibility: HashMap<String, bool>) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::SetColumns { visibility, reply })
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.tx
            .send(StoreCommand::Shutdown)
            .await
            .map_err(|_| StoreError::Unavailable)
    }
}

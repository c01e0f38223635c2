use std::collections::HashMap;
use std::path::Path;

use shared::protocol::TABLE_KINDS;
use shared::types::{
    AnnotationDocument, ColumnConfigRecord, InterfaceConfigRecord, ServiceNameRecord,
    UrlPathRecord,
};

use crate::error::StoreError;

/// In-memory annotation state, keyed for lookup. The JSON file on disk
/// stores the same data as flat record arrays.
#[derive(Debug, Clone, Default)]
pub struct AnnotationData {
    service_names: HashMap<String, String>,
    interface_links: HashMap<String, bool>,
    column_visibility: HashMap<String, HashMap<String, bool>>,
    url_paths: HashMap<String, String>,
}

impl AnnotationData {
    /// Read annotations from disk. A missing file is a normal first start;
    /// an unreadable or corrupt file is logged and treated as empty rather
    /// than blocking startup.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No annotation file at {}, starting empty", path.display());
            return Self::default();
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    "Failed to read annotation file {}: {}",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };

        match serde_json::from_str::<AnnotationDocument>(&contents) {
            Ok(doc) => {
                let data = Self::from_document(doc);
                tracing::info!(
                    "Loaded {} service names, {} interface configs, {} url paths from {}",
                    data.service_names.len(),
                    data.interface_links.len(),
                    data.url_paths.len(),
                    path.display()
                );
                data
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse annotation file {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Write the full annotation state to disk, creating parent directories
    /// as needed.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Persistence {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let bytes = serde_json::to_vec_pretty(&self.to_document())?;
        std::fs::write(path, bytes).map_err(|source| StoreError::Persistence {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_document(doc: AnnotationDocument) -> Self {
        let mut data = Self::default();
        for record in doc.service_names {
            data.service_names.insert(record.service_id, record.name);
        }
        for record in doc.interface_configs {
            data.interface_links.insert(record.name, record.show_links);
        }
        for record in doc.column_configs {
            if record.table.is_empty() || record.column.is_empty() {
                continue;
            }
            data.column_visibility
                .entry(record.table)
                .or_default()
                .insert(record.column, record.visible);
        }
        for record in doc.url_paths {
            data.url_paths.insert(record.service_id, record.path);
        }
        data
    }

    /// Flatten to record arrays, sorted by key so repeated saves of the
    /// same state produce identical files.
    pub fn to_document(&self) -> AnnotationDocument {
        let mut service_names: Vec<ServiceNameRecord> = self
            .service_names
            .iter()
            .map(|(service_id, name)| ServiceNameRecord {
                service_id: service_id.clone(),
                name: name.clone(),
            })
            .collect();
        service_names.sort_by(|a, b| a.service_id.cmp(&b.service_id));

        let mut interface_configs: Vec<InterfaceConfigRecord> = self
            .interface_links
            .iter()
            .map(|(name, show_links)| InterfaceConfigRecord {
                name: name.clone(),
                show_links: *show_links,
            })
            .collect();
        interface_configs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut column_configs: Vec<ColumnConfigRecord> = self
            .column_visibility
            .iter()
            .flat_map(|(table, columns)| {
                columns.iter().map(|(column, visible)| ColumnConfigRecord {
                    table: table.clone(),
                    column: column.clone(),
                    visible: *visible,
                })
            })
            .collect();
        column_configs.sort_by(|a, b| (&a.table, &a.column).cmp(&(&b.table, &b.column)));

        let mut url_paths: Vec<UrlPathRecord> = self
            .url_paths
            .iter()
            .map(|(service_id, path)| UrlPathRecord {
                service_id: service_id.clone(),
                path: path.clone(),
            })
            .collect();
        url_paths.sort_by(|a, b| a.service_id.cmp(&b.service_id));

        AnnotationDocument {
            service_names,
            interface_configs,
            column_configs,
            url_paths,
        }
    }

    pub fn set_service_name(&mut self, service_id: &str, name: &str) {
        self.service_names
            .insert(service_id.to_string(), name.to_string());
    }

    pub fn set_interface_links(&mut self, interface: &str, show_links: bool) {
        self.interface_links
            .insert(interface.to_string(), show_links);
    }

    pub fn set_url_path(&mut self, service_id: &str, path: &str) {
        self.url_paths
            .insert(service_id.to_string(), normalize_path(path));
    }

    /// Apply one set of column toggles to every table kind, keeping the
    /// four tables in agreement.
    pub fn set_columns_for_all_tables(&mut self, visibility: &HashMap<String, bool>) {
        for table in TABLE_KINDS {
            let columns = self.column_visibility.entry(table.to_string()).or_default();
            for (column, visible) in visibility {
                columns.insert(column.clone(), *visible);
            }
        }
    }

    /// Saved name, else a well-known name for the port, else "N/A"
    pub fn display_name(&self, service_id: &str, port: &str) -> String {
        if let Some(name) = self.service_names.get(service_id) {
            return name.clone();
        }
        well_known_service(port)
            .unwrap_or("N/A")
            .to_string()
    }

    pub fn show_links(&self, interface: &str) -> bool {
        self.interface_links.get(interface).copied().unwrap_or(true)
    }

    pub fn url_path(&self, service_id: &str) -> String {
        self.url_paths
            .get(service_id)
            .cloned()
            .unwrap_or_else(|| "/".to_string())
    }

    pub fn column_visible(&self, table: &str, column: &str) -> bool {
        self.column_visibility
            .get(table)
            .and_then(|columns| columns.get(column))
            .copied()
            .unwrap_or(true)
    }
}

/// URL paths always start with a slash; empty input means the root.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Display names for ports most people recognize on sight
fn well_known_service(port: &str) -> Option<&'static str> {
    match port {
        "22" => Some("SSH"),
        "80" => Some("HTTP"),
        "443" => Some("HTTPS"),
        "3306" => Some("MySQL"),
        "5432" => Some("PostgreSQL"),
        "6379" => Some("Redis"),
        "8080" => Some("HTTP Alt"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");

        let mut data = AnnotationData::default();
        data.set_service_name("0.0.0.0:8080:tcp", "dashboard");
        data.set_interface_links("eth0", false);
        data.set_url_path("0.0.0.0:8080:tcp", "admin");
        data.set_columns_for_all_tables(&HashMap::from([("state".to_string(), false)]));
        data.save(&path).unwrap();

        let loaded = AnnotationData::load(&path);
        assert_eq!(loaded.display_name("0.0.0.0:8080:tcp", "8080"), "dashboard");
        assert!(!loaded.show_links("eth0"));
        assert_eq!(loaded.url_path("0.0.0.0:8080:tcp"), "/admin");
        assert!(!loaded.column_visible("udpv6", "state"));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let data = AnnotationData::load(&dir.path().join("absent.json"));
        assert!(data.to_document().service_names.is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        std::fs::write(&path, "{not json").unwrap();

        let data = AnnotationData::load(&path);
        assert!(data.to_document().service_names.is_empty());
    }

    #[test]
    fn url_paths_are_normalized() {
        let mut data = AnnotationData::default();
        data.set_url_path("a", "admin");
        data.set_url_path("b", "/status");
        data.set_url_path("c", "");

        assert_eq!(data.url_path("a"), "/admin");
        assert_eq!(data.url_path("b"), "/status");
        assert_eq!(data.url_path("c"), "/");
        assert_eq!(data.url_path("unset"), "/");
    }

    #[test]
    fn column_toggle_fans_out_to_every_table() {
        let mut data = AnnotationData::default();
        data.set_columns_for_all_tables(&HashMap::from([("url_path".to_string(), false)]));

        let doc = data.to_document();
        assert_eq!(doc.column_configs.len(), 4);
        for table in TABLE_KINDS {
            assert!(!data.column_visible(table, "url_path"));
        }
        assert!(data.column_visible("tcpv4", "state"));
    }

    #[test]
    fn display_name_prefers_saved_then_well_known() {
        let mut data = AnnotationData::default();
        data.set_service_name("10.0.0.1:443:tcp", "internal proxy");

        assert_eq!(data.display_name("10.0.0.1:443:tcp", "443"), "internal proxy");
        assert_eq!(data.display_name("0.0.0.0:443:tcp", "443"), "HTTPS");
        assert_eq!(data.display_name("0.0.0.0:12345:tcp", "12345"), "N/A");
    }

    #[test]
    fn document_output_is_sorted() {
        let mut data = AnnotationData::default();
        data.set_service_name("b", "second");
        data.set_service_name("a", "first");

        let doc = data.to_document();
        assert_eq!(doc.service_names[0].service_id, "a");
        assert_eq!(doc.service_names[1].service_id, "b");
    }

    #[test]
    fn document_tolerates_null_arrays() {
        let doc: AnnotationDocument =
            serde_json::from_str(r#"{"service_names": null}"#).unwrap();
        assert!(doc.service_names.is_empty());
        assert!(doc.url_paths.is_empty());
    }

    #[test]
    fn records_with_blank_table_or_column_are_dropped() {
        let doc: AnnotationDocument = serde_json::from_str(
            r#"{"column_configs": [
                {"table": "", "column": "state", "visible": false},
                {"table": "tcpv4", "column": "", "visible": false},
                {"table": "tcpv4", "column": "state", "visible": false}
            ]}"#,
        )
        .unwrap();

        let data = AnnotationData::from_document(doc);
        assert_eq!(data.to_document().column_configs.len(), 1);
        assert!(!data.column_visible("tcpv4", "state"));
    }
}

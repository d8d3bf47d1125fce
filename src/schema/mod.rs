//! Schema Lifecycle
//!
//! - **scripts**: versioned create/update/drop scripts and their repositories
//! - **version**: the version manager state machine
//! - **error**: error types
//!
//! [`SchemaManager`] wires the version manager to the configured store
//! account and script source.

pub mod error;
pub mod scripts;
pub mod version;

pub use error::{SchemaError, SchemaResult};
pub use scripts::{
    DirectoryScripts, ScriptProperties, ScriptRepository, ScriptSet, Task, UpdateFile, UpdateFolder,
};
pub use version::VersionManager;

use crate::config::{SchemaConfig, StoreConfig};
use crate::gateway::{Cluster, Credentials, StorageSession};
use std::sync::Arc;

/// Entry point for schema operations driven by configuration
pub struct SchemaManager {
    versions: VersionManager,
    properties: ScriptProperties,
}

impl SchemaManager {
    pub fn new(cluster: Arc<dyn Cluster>, store: &StoreConfig, schema: &SchemaConfig) -> Self {
        let scripts: Arc<dyn ScriptRepository> = match &schema.scripts_dir {
            Some(dir) => {
                tracing::info!("Using schema scripts from {}", dir);
                Arc::new(DirectoryScripts::new(dir))
            }
            None => Arc::new(ScriptSet::bundled()),
        };
        Self::with_scripts(cluster, store, scripts)
    }

    pub fn with_scripts(
        cluster: Arc<dyn Cluster>,
        store: &StoreConfig,
        scripts: Arc<dyn ScriptRepository>,
    ) -> Self {
        let mut properties = ScriptProperties::new();
        properties.insert("admin_username".to_string(), store.username.clone());

        Self {
            versions: VersionManager::new(
                cluster,
                Credentials::new(&store.username, &store.password),
                Credentials::new(&store.default_admin_username, &store.default_admin_password),
                scripts,
            ),
            properties,
        }
    }

    pub async fn install(&self) -> SchemaResult<u32> {
        self.versions.install(&self.properties).await
    }

    pub async fn update(&self) -> SchemaResult<u32> {
        self.versions.update(&self.properties).await
    }

    pub async fn drop(&self) -> SchemaResult<()> {
        self.versions.drop().await
    }

    pub async fn check_compatibility(&self) -> SchemaResult<u32> {
        self.versions.check_compatibility().await
    }

    pub async fn installed_version(&self) -> SchemaResult<u32> {
        self.versions.installed_version().await
    }

    /// Operating session, refused unless the installed schema is compatible
    pub async fn connect(&self) -> SchemaResult<Arc<dyn StorageSession>> {
        self.versions.compatible_session().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::EmbeddedCluster;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_manager_from_config() {
        let dir = tempdir().unwrap();
        let store = StoreConfig {
            path: dir.path().join("strata.db").to_string_lossy().to_string(),
            ..StoreConfig::default()
        };
        let cluster = Arc::new(
            EmbeddedCluster::open(std::path::Path::new(&store.path), store.nodes.clone()).unwrap(),
        );
        let manager = SchemaManager::new(cluster, &store, &SchemaConfig::default());

        assert_eq!(manager.install().await.unwrap(), 3);
        assert_eq!(manager.check_compatibility().await.unwrap(), 3);
        assert_eq!(manager.update().await.unwrap(), 3);
        assert!(manager.connect().await.is_ok());

        manager.drop().await.unwrap();
        assert!(matches!(
            manager.installed_version().await,
            Err(SchemaError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_manager_with_script_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("scripts");
        let bundled = ScriptSet::bundled();
        for task in [Task::Create, Task::Drop] {
            let folder = root.join(task.folder());
            std::fs::create_dir_all(&folder).unwrap();
            for file in bundled.folder(task).unwrap().files() {
                std::fs::write(folder.join(file.name()), file.content()).unwrap();
            }
        }
        std::fs::create_dir_all(root.join("update")).unwrap();
        std::fs::write(
            root.join("update").join("0001_only.sql"),
            "CREATE TABLE IF NOT EXISTS only_table (id INTEGER);",
        )
        .unwrap();

        let store = StoreConfig::default();
        let schema = SchemaConfig {
            scripts_dir: Some(root.to_string_lossy().to_string()),
        };
        let cluster = Arc::new(EmbeddedCluster::in_memory(vec![]).unwrap());
        let manager = SchemaManager::new(cluster, &store, &schema);

        assert_eq!(manager.install().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_requires_installed_schema() {
        let cluster = Arc::new(EmbeddedCluster::in_memory(vec![]).unwrap());
        let manager =
            SchemaManager::new(cluster, &StoreConfig::default(), &SchemaConfig::default());

        assert!(matches!(
            manager.connect().await,
            Err(SchemaError::AuthenticationFailed(_))
        ));
    }
}

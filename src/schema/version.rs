//! Schema Version Manager
//!
//! Lifecycle of the storage schema:
//!
//! ```text
//! Unknown ──► NotInstalled ──create──► Installed(0) ──update──► Installed(latest)
//!        └──► Installed(v) ──update──► Installed(latest)
//! ```
//!
//! `TooOld`, `TooAdvanced` and `NotInstalled` are reported to the caller and
//! never retried here. Every applied update script is recorded in the
//! `schema_version` ledger right after it succeeds, so an interrupted update
//! resumes from the last recorded version.

use crate::gateway::{BoundStatement, Cluster, Credentials, GatewayError, StorageSession, Value};
use crate::schema::error::{SchemaError, SchemaResult};
use crate::schema::scripts::{ScriptProperties, ScriptRepository, Task, UpdateFile};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SCHEMA_EXISTS_QUERY: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'";
const INSTALLED_VERSION_QUERY: &str = "SELECT MAX(version) FROM schema_version";
const RECORD_VERSION_QUERY: &str = "INSERT INTO schema_version (version, time) VALUES (?, ?)";
const USER_EXISTS_QUERY: &str = "SELECT username FROM auth_users WHERE username = ?";
const SET_AUTH_REPLICATION_QUERY: &str =
    "UPDATE auth_settings SET replication_factor = ? WHERE keyspace_name = ?";

/// Keyspace whose replication is raised before any account is created
pub const AUTH_KEYSPACE: &str = crate::gateway::embedded::AUTH_KEYSPACE;

/// Outcome of connecting with the operating credentials
enum SessionState {
    /// The operating account exists and authenticated
    Operating(Arc<dyn StorageSession>),
    /// The store still only knows its default administrative account
    Pristine,
}

/// Replication factor for the auth keyspace on a cluster of `nodes` nodes
pub fn replication_factor(nodes: usize) -> u32 {
    match nodes {
        0 | 1 => 1,
        2 | 3 => 2,
        _ => 3,
    }
}

/// Creates, upgrades, verifies and removes the storage schema
pub struct VersionManager {
    cluster: Arc<dyn Cluster>,
    credentials: Credentials,
    default_credentials: Credentials,
    scripts: Arc<dyn ScriptRepository>,
}

impl VersionManager {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        credentials: Credentials,
        default_credentials: Credentials,
        scripts: Arc<dyn ScriptRepository>,
    ) -> Self {
        Self {
            cluster,
            credentials,
            default_credentials,
            scripts,
        }
    }

    /// Create the schema if the store is pristine, then bring it up to date.
    /// Returns the installed version.
    pub async fn install(&self, properties: &ScriptProperties) -> SchemaResult<u32> {
        info!("Preparing to install storage schema");

        match self.operating_session().await? {
            SessionState::Operating(_) => {
                debug!("Operating account {} already exists", self.credentials.username);
            }
            SessionState::Pristine => {
                debug!("Operating account rejected, creating the storage schema");
                self.create().await?;
            }
        }

        self.update(properties).await
    }

    /// Bootstrap a pristine store under the default administrative account
    pub async fn create(&self) -> SchemaResult<()> {
        let folder = self.scripts.folder(Task::Create)?;
        let properties = {
            let session = self.cluster.connect(&self.default_credentials).await?;

            let nodes = self.cluster.node_count().await?;
            let factor = replication_factor(nodes);
            info!(
                "Setting replication factor of {} to {} for {} node(s)",
                AUTH_KEYSPACE, factor, nodes
            );
            session
                .execute(&BoundStatement::new(
                    SET_AUTH_REPLICATION_QUERY,
                    vec![Value::from(factor), Value::from(AUTH_KEYSPACE)],
                ))
                .await
                .map_err(fatal("setting auth replication"))?;

            let properties = self.create_properties(factor);

            if schema_exists(session.as_ref()).await? {
                info!("Storage schema already exists");
            } else {
                execute_script(session.as_ref(), folder.get(0)?, &properties).await?;
                info!("Storage schema created");
            }
            properties
        };

        // Reconnect as the account the first script created
        let session = self.cluster.connect(&self.credentials).await?;
        execute_script(session.as_ref(), folder.get(1)?, &properties).await?;
        info!("Default administrative account locked down");

        Ok(())
    }

    /// Apply pending update scripts in version order. Returns the installed
    /// version afterwards.
    pub async fn update(&self, properties: &ScriptProperties) -> SchemaResult<u32> {
        let session = self.cluster.connect(&self.credentials).await?;

        if !schema_exists(session.as_ref()).await? {
            error!("Storage schema not installed");
            return Err(SchemaError::NotInstalled);
        }

        let mut folder = self.scripts.folder(Task::Update)?;
        let installed = installed_version(session.as_ref()).await?;
        let required = folder.latest_version();
        info!("Installed storage schema version is {}", installed);
        info!("Required storage schema version is {}", required);

        if installed == required {
            info!("Storage schema version is current ({}), no updates applied", installed);
            return Ok(installed);
        }
        if installed > required {
            error!(
                "Installed storage schema version {} is newer than required version {}",
                installed, required
            );
            return Err(SchemaError::TooAdvanced { installed, required });
        }

        info!(
            "Updating storage schema from version {} to version {}",
            installed, required
        );
        folder.remove_applied_updates(installed);

        let mut current = installed;
        for file in folder.files() {
            execute_script(session.as_ref(), file, properties).await?;

            session
                .execute(&BoundStatement::new(
                    RECORD_VERSION_QUERY,
                    vec![
                        Value::from(file.version()),
                        Value::Int(Utc::now().timestamp_millis()),
                    ],
                ))
                .await
                .map_err(|source| SchemaError::Script {
                    file: file.name().to_string(),
                    version: file.version(),
                    source,
                })?;

            info!(
                "Storage schema update {} applied ({} -> {})",
                file,
                current,
                file.version()
            );
            current = file.version();
        }

        Ok(current)
    }

    /// Remove the schema and the operating account, restoring the store's
    /// default access control. Safe to run repeatedly.
    pub async fn drop(&self) -> SchemaResult<()> {
        info!("Preparing to drop storage schema");
        let folder = self.scripts.folder(Task::Drop)?;
        let properties = self.drop_properties();

        match self.operating_session().await? {
            SessionState::Operating(session) => {
                execute_script(session.as_ref(), folder.get(0)?, &properties).await?;
                info!("Default administrative account restored");
            }
            SessionState::Pristine => {
                debug!(
                    "Cannot connect as {}, continuing with the default administrative account",
                    self.credentials.username
                );
            }
        }

        let session = self.cluster.connect(&self.default_credentials).await?;

        if schema_exists(session.as_ref()).await? {
            execute_script(session.as_ref(), folder.get(1)?, &properties).await?;
            info!("Storage schema dropped");
        } else {
            info!("Storage schema does not exist, nothing to drop");
        }

        if user_exists(session.as_ref(), &self.credentials.username).await? {
            execute_script(session.as_ref(), folder.get(2)?, &properties).await?;
            info!("Operating account {} dropped", self.credentials.username);
        } else {
            info!(
                "Operating account {} does not exist, nothing to drop",
                self.credentials.username
            );
        }

        Ok(())
    }

    /// Verify the installed schema matches the bundled scripts exactly.
    /// Connectivity and authentication errors are returned as is.
    pub async fn check_compatibility(&self) -> SchemaResult<u32> {
        info!("Preparing to check storage schema compatibility");
        let result = self.compare_versions().await;
        info!("Completed storage schema compatibility check");
        result
    }

    async fn compare_versions(&self) -> SchemaResult<u32> {
        let installed = self.installed_version().await?;
        let required = self.scripts.folder(Task::Update)?.latest_version();

        if installed < required {
            error!(
                "Storage schema version {} is older than required version {}, update the schema",
                installed, required
            );
            return Err(SchemaError::TooOld { installed, required });
        }
        if installed > required {
            error!(
                "Storage schema version {} is newer than required version {}",
                installed, required
            );
            return Err(SchemaError::TooAdvanced { installed, required });
        }
        Ok(installed)
    }

    /// Session for the operating account, opened only once the installed
    /// schema is compatible. Nothing touches the schema's tables before that.
    pub async fn compatible_session(&self) -> SchemaResult<Arc<dyn StorageSession>> {
        let version = self.check_compatibility().await?;
        debug!("Connecting to storage schema version {}", version);
        Ok(self.cluster.connect(&self.credentials).await?)
    }

    /// Highest version in the ledger, read with the operating credentials
    pub async fn installed_version(&self) -> SchemaResult<u32> {
        let session = self.cluster.connect(&self.credentials).await?;
        if !schema_exists(session.as_ref()).await? {
            error!("Storage schema not installed");
            return Err(SchemaError::NotInstalled);
        }
        installed_version(session.as_ref()).await
    }

    async fn operating_session(&self) -> SchemaResult<SessionState> {
        match self.cluster.connect(&self.credentials).await {
            Ok(session) => Ok(SessionState::Operating(session)),
            Err(GatewayError::Authentication(user)) => {
                warn!("Authentication as {} failed", user);
                Ok(SessionState::Pristine)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create_properties(&self, replication_factor: u32) -> ScriptProperties {
        let mut properties = self.drop_properties();
        properties.insert("replication_factor".to_string(), replication_factor.to_string());
        properties.insert(
            "service_account_password".to_string(),
            uuid::Uuid::new_v4().to_string(),
        );
        properties.insert("admin_password".to_string(), self.credentials.password.clone());
        properties
    }

    fn drop_properties(&self) -> ScriptProperties {
        let mut properties = ScriptProperties::new();
        properties.insert("admin_username".to_string(), self.credentials.username.clone());
        properties.insert(
            "default_admin_username".to_string(),
            self.default_credentials.username.clone(),
        );
        properties.insert(
            "default_admin_password".to_string(),
            self.default_credentials.password.clone(),
        );
        properties
    }
}

fn fatal(context: &'static str) -> impl Fn(GatewayError) -> SchemaError {
    move |e| match e {
        GatewayError::Unavailable(_) | GatewayError::Authentication(_) => e.into(),
        other => SchemaError::Fatal(format!("{}: {}", context, other)),
    }
}

async fn execute_script(
    session: &dyn StorageSession,
    file: &UpdateFile,
    properties: &ScriptProperties,
) -> SchemaResult<()> {
    let statements = file.statements(properties)?;
    debug!("Executing {} ({} statements)", file, statements.len());

    for statement in &statements {
        session
            .execute_query(statement)
            .await
            .map_err(|source| SchemaError::Script {
                file: file.name().to_string(),
                version: file.version(),
                source,
            })?;
    }
    Ok(())
}

async fn schema_exists(session: &dyn StorageSession) -> SchemaResult<bool> {
    Ok(!session.execute_query(SCHEMA_EXISTS_QUERY).await?.is_empty())
}

async fn installed_version(session: &dyn StorageSession) -> SchemaResult<u32> {
    let result = session.execute_query(INSTALLED_VERSION_QUERY).await?;
    let Some(row) = result.one() else {
        return Ok(0);
    };
    if row.is_null(0)? {
        return Ok(0);
    }
    let version = row.get_long(0)?;
    u32::try_from(version)
        .map_err(|_| SchemaError::Fatal(format!("invalid schema version {} in ledger", version)))
}

async fn user_exists(session: &dyn StorageSession, username: &str) -> SchemaResult<bool> {
    let result = session
        .execute(&BoundStatement::new(
            USER_EXISTS_QUERY,
            vec![Value::from(username)],
        ))
        .await?;
    Ok(!result.is_empty())
}

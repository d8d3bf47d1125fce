//! # Strata
//!
//! Storage core of a fleet-monitoring platform: measurements are kept at
//! decreasing resolution (raw, 1 hour, 6 hour, 24 hour) in a partitioned,
//! TTL-capable column store.
//!
//! ## Features
//!
//! - **Aggregation index**: records which schedules have data pending rollup,
//!   per bucket, day, partition and time slice, so rollups never scan raw data
//! - **Index loading**: paged loads of the current slice and day-by-day walks
//!   over the retention window
//! - **Schema lifecycle**: versioned create, update, check and drop of the
//!   storage schema, with a ledger of applied versions
//!
//! ## Modules
//!
//! - [`gateway`]: statement execution contract, row streams, embedded store
//! - [`metrics`]: buckets, retention policy, index entries and the loader
//! - [`schema`]: schema scripts and the version manager
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let cluster = Arc::new(EmbeddedCluster::open(
//!         std::path::Path::new(&config.store.path),
//!         config.store.nodes.clone(),
//!     )?);
//!
//!     // Create or upgrade the schema
//!     let schema = SchemaManager::new(cluster, &config.store, &config.schema);
//!     schema.install().await?;
//!
//!     // Load what the next rollup has to process; refused unless the
//!     // installed schema version is compatible
//!     let session = schema.connect().await?;
//!     let policy = Arc::new(MetricsPolicy::try_from(&config.metrics)?);
//!     let dao = Arc::new(MetricsDao::new(session, policy.clone()));
//!     let loader = IndexEntriesLoader::new(dao, chrono::Utc::now());
//!
//!     let entries = loader
//!         .load_current_index_entries(Bucket::Raw, policy.index_page_size())
//!         .await?;
//!     println!("{} index entries pending", entries.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod gateway;
pub mod metrics;
pub mod schema;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, LoggingConfig, MetricsConfig, SchemaConfig, StoreConfig};

pub use gateway::{
    BoundStatement, Cluster, Credentials, EmbeddedCluster, GatewayError, GatewayResult,
    ResultSet, Row, RowStream, StorageSession, Value,
};

pub use metrics::{
    Bucket, BucketPolicy, IndexEntriesLoader, IndexEntry, IndexError, IndexResult, MetricsDao,
    MetricsPolicy, ModuloPartitioner, Partitioner,
};

pub use schema::{
    DirectoryScripts, SchemaError, SchemaManager, SchemaResult, ScriptProperties,
    ScriptRepository, ScriptSet, Task, VersionManager,
};

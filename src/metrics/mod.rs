//! Aggregation Index
//!
//! The index records, per bucket and partition, which schedules have data
//! waiting to be rolled up, so aggregation never scans the measurement tables:
//!
//! - **types**: buckets and index entries
//! - **policy**: retention, TTL and time slicing per bucket
//! - **partition**: schedule id to shard assignment
//! - **codec**: index rows to entries and back
//! - **dao**: statements against the index table
//! - **loader**: current slice and past window loads
//! - **error**: error types

pub mod codec;
pub mod dao;
pub mod error;
pub mod loader;
pub mod partition;
pub mod policy;
pub mod types;

pub use dao::MetricsDao;
pub use error::{IndexError, IndexResult};
pub use loader::IndexEntriesLoader;
pub use partition::{ModuloPartitioner, Partitioner};
pub use policy::{BucketPolicy, MetricsPolicy};
pub use types::{Bucket, IndexEntry};

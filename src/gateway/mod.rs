//! Column-Store Gateway
//!
//! Thin contract over asynchronous statement execution:
//!
//! - **types**: values, rows, result sets and bound statements
//! - **rows**: lazy concatenation of several statements into one row stream
//! - **embedded**: single-file store backed by SQLite, used by the binary and tests
//! - **error**: error types
//!
//! Everything above this module talks to the store only through
//! [`Cluster`] and [`StorageSession`], so a networked driver can be dropped in
//! without touching the index loader or the schema manager.

pub mod embedded;
pub mod error;
pub mod rows;
pub mod types;

pub use embedded::EmbeddedCluster;
pub use error::{GatewayError, GatewayResult};
pub use rows::RowStream;
pub use types::{BoundStatement, Credentials, ResultSet, Row, Value};

use async_trait::async_trait;
use std::sync::Arc;

/// An authenticated session able to run statements
#[async_trait]
pub trait StorageSession: Send + Sync {
    /// User the session was opened for
    fn username(&self) -> &str;

    /// Execute one statement and collect its rows
    async fn execute(&self, statement: &BoundStatement) -> GatewayResult<ResultSet>;

    /// Execute a statement that takes no parameters
    async fn execute_query(&self, query: &str) -> GatewayResult<ResultSet> {
        self.execute(&BoundStatement::unbound(query)).await
    }
}

/// Entry point to a store deployment
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Open a session, failing with [`GatewayError::Authentication`] when the
    /// credentials are rejected and [`GatewayError::Unavailable`] when no node
    /// answers
    async fn connect(&self, credentials: &Credentials) -> GatewayResult<Arc<dyn StorageSession>>;

    /// Number of nodes in the deployment
    async fn node_count(&self) -> GatewayResult<usize>;
}

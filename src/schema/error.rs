//! Schema lifecycle error types

use crate::gateway::GatewayError;
use thiserror::Error;

/// Errors raised while installing, updating, checking or dropping the schema
#[derive(Error, Debug)]
pub enum SchemaError {
    /// No store node could be reached
    #[error("Storage cluster unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected the credentials of the named user
    #[error("Authentication failed for user {0}")]
    AuthenticationFailed(String),

    #[error("Storage schema not installed")]
    NotInstalled,

    #[error("Storage schema version {installed} is older than required version {required}")]
    TooOld { installed: u32, required: u32 },

    #[error(
        "Storage schema version {installed} is newer than version {required} \
         supported by this installation"
    )]
    TooAdvanced { installed: u32, required: u32 },

    /// A statement of a schema script failed
    #[error("Script {file} (version {version}) failed: {source}")]
    Script {
        file: String,
        version: u32,
        #[source]
        source: GatewayError,
    },

    /// A script references a property nobody supplied
    #[error("Script {file} references unknown property %{name}%")]
    MissingProperty { file: String, name: String },

    /// Scripts could not be listed or read
    #[error("Script repository error: {0}")]
    ScriptRepository(String),

    /// Any other failure; the operation cannot proceed
    #[error("Fatal schema error: {0}")]
    Fatal(String),
}

impl From<GatewayError> for SchemaError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => SchemaError::StoreUnavailable(msg),
            GatewayError::Authentication(user) => SchemaError::AuthenticationFailed(user),
            other => SchemaError::Fatal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SchemaError {
    fn from(err: std::io::Error) -> Self {
        SchemaError::ScriptRepository(err.to_string())
    }
}

/// Result type alias for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_keep_their_kind() {
        assert!(matches!(
            SchemaError::from(GatewayError::Unavailable("no hosts".to_string())),
            SchemaError::StoreUnavailable(_)
        ));
        assert!(matches!(
            SchemaError::from(GatewayError::Authentication("strata_admin".to_string())),
            SchemaError::AuthenticationFailed(user) if user == "strata_admin"
        ));
        assert!(matches!(
            SchemaError::from(GatewayError::Query("syntax".to_string())),
            SchemaError::Fatal(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let err = SchemaError::TooOld {
            installed: 5,
            required: 7,
        };
        assert_eq!(
            err.to_string(),
            "Storage schema version 5 is older than required version 7"
        );

        let err = SchemaError::Script {
            file: "0002_measurements.sql".to_string(),
            version: 2,
            source: GatewayError::Query("no such table: foo".to_string()),
        };
        assert!(err.to_string().starts_with("Script 0002_measurements.sql (version 2) failed"));
    }
}

//! Values, rows and statements exchanged with the column store
//!
//! Statements carry positional parameters only. Rows are read by ordinal,
//! either raw through [`Row::get`] or through the typed accessors, which
//! also coerce the storage encodings (epoch millis for timestamps, JSON
//! arrays for integer sets) back into their logical types.

use crate::gateway::error::{GatewayError, GatewayResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::collections::BTreeSet;
use std::fmt;

/// A single column value or statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    IntSet(BTreeSet<i32>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<BTreeSet<i32>> for Value {
    fn from(v: BTreeSet<i32>) -> Self {
        Value::IntSet(v)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Int(i) => ToSqlOutput::Owned(Sql::Integer(*i)),
            Value::Double(f) => ToSqlOutput::Owned(Sql::Real(*f)),
            Value::Timestamp(ts) => ToSqlOutput::Owned(Sql::Integer(ts.timestamp_millis())),
            Value::IntSet(set) => {
                let json = serde_json::to_string(set)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::Owned(Sql::Text(json))
            }
        })
    }
}

impl TryFrom<ValueRef<'_>> for Value {
    type Error = GatewayError;

    fn try_from(value: ValueRef<'_>) -> GatewayResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::Int(i)),
            ValueRef::Real(f) => Ok(Value::Double(f)),
            ValueRef::Text(t) => Ok(Value::Text(String::from_utf8_lossy(t).into_owned())),
            ValueRef::Blob(_) => Err(GatewayError::Query(
                "blob columns are not supported".to_string(),
            )),
        }
    }
}

/// One result row, addressed by column ordinal
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<Value>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Raw access by ordinal
    pub fn get(&self, index: usize) -> GatewayResult<&Value> {
        self.columns.get(index).ok_or(GatewayError::ColumnIndex {
            index,
            len: self.columns.len(),
        })
    }

    pub fn is_null(&self, index: usize) -> GatewayResult<bool> {
        Ok(matches!(self.get(index)?, Value::Null))
    }

    pub fn get_string(&self, index: usize) -> GatewayResult<String> {
        match self.get(index)? {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(GatewayError::ColumnType {
                index,
                expected: "text",
            }),
        }
    }

    pub fn get_long(&self, index: usize) -> GatewayResult<i64> {
        match self.get(index)? {
            Value::Int(i) => Ok(*i),
            _ => Err(GatewayError::ColumnType {
                index,
                expected: "bigint",
            }),
        }
    }

    pub fn get_int(&self, index: usize) -> GatewayResult<i32> {
        let wide = self.get_long(index).map_err(|_| GatewayError::ColumnType {
            index,
            expected: "int",
        })?;
        i32::try_from(wide).map_err(|_| GatewayError::ColumnType {
            index,
            expected: "int",
        })
    }

    /// Timestamps are stored as epoch milliseconds
    pub fn get_timestamp(&self, index: usize) -> GatewayResult<DateTime<Utc>> {
        let err = GatewayError::ColumnType {
            index,
            expected: "timestamp",
        };
        match self.get(index)? {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Int(ms) => Utc.timestamp_millis_opt(*ms).single().ok_or(err),
            _ => Err(err),
        }
    }

    /// Integer sets are stored as JSON arrays
    pub fn get_int_set(&self, index: usize) -> GatewayResult<BTreeSet<i32>> {
        match self.get(index)? {
            Value::IntSet(set) => Ok(set.clone()),
            Value::Text(json) => Ok(serde_json::from_str(json)?),
            _ => Err(GatewayError::ColumnType {
                index,
                expected: "set<int>",
            }),
        }
    }
}

/// The fully materialized rows of one statement
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row, if any
    pub fn one(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// A statement with its positional parameters bound
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub query: String,
    pub params: Vec<Value>,
}

impl BoundStatement {
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    /// A statement without parameters
    pub fn unbound(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} params)", self.query.trim(), self.params.len())
    }
}

/// Username/password pair used to open a session
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors_coerce_storage_encodings() {
        let row = Row::new(vec![
            Value::Text("raw".to_string()),
            Value::Int(1_700_000_000_000),
            Value::Text("[3,1,2]".to_string()),
            Value::Null,
        ]);

        assert_eq!(row.get_string(0).unwrap(), "raw");
        assert_eq!(
            row.get_timestamp(1).unwrap().timestamp_millis(),
            1_700_000_000_000
        );
        assert_eq!(
            row.get_int_set(2).unwrap(),
            [1, 2, 3].into_iter().collect::<BTreeSet<i32>>()
        );
        assert!(row.is_null(3).unwrap());
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let row = Row::new(vec![Value::Text("x".to_string()), Value::Int(i64::MAX)]);

        assert!(matches!(
            row.get_int(0),
            Err(GatewayError::ColumnType { index: 0, .. })
        ));
        // Does not fit an int
        assert!(row.get_int(1).is_err());
        assert!(matches!(
            row.get(5),
            Err(GatewayError::ColumnIndex { index: 5, len: 2 })
        ));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("admin", "s3cret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("s3cret"));
    }
}

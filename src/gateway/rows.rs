//! Row Stream - concatenates the rows of several statements
//!
//! Statements are executed one at a time, and only once the rows of the
//! previous statement have been consumed, so a stream never keeps more than
//! one query in flight. Streams are single pass; build a new one to replay.
//! A failed statement terminates the stream: later reads fail with
//! [`GatewayError::Aborted`] instead of moving on to the next statement.

use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::types::{BoundStatement, Row};
use crate::gateway::StorageSession;
use futures_util::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;

/// Lazy, forward-only sequence over the rows of an ordered statement list
pub struct RowStream {
    session: Arc<dyn StorageSession>,
    pending: VecDeque<BoundStatement>,
    rows: std::vec::IntoIter<Row>,
    executed: usize,
    failed: bool,
}

impl RowStream {
    pub fn new(session: Arc<dyn StorageSession>) -> Self {
        Self {
            session,
            pending: VecDeque::new(),
            rows: Vec::new().into_iter(),
            executed: 0,
            failed: false,
        }
    }

    pub fn with_statements(
        session: Arc<dyn StorageSession>,
        statements: impl IntoIterator<Item = BoundStatement>,
    ) -> Self {
        let mut stream = Self::new(session);
        stream.pending.extend(statements);
        stream
    }

    /// Queue another statement behind the ones already added
    pub fn add(&mut self, statement: BoundStatement) {
        self.pending.push_back(statement);
    }

    /// Number of statements executed so far
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Whether another row is available, executing queued statements until
    /// one yields rows or the queue runs dry
    pub async fn has_next(&mut self) -> GatewayResult<bool> {
        if self.failed {
            return Err(GatewayError::Aborted);
        }
        loop {
            if !self.rows.as_slice().is_empty() {
                return Ok(true);
            }

            let Some(statement) = self.pending.pop_front() else {
                return Ok(false);
            };

            tracing::debug!("Executing {}", statement);
            let result = match self.session.execute(&statement).await {
                Ok(result) => result,
                Err(e) => {
                    self.failed = true;
                    self.pending.clear();
                    return Err(e);
                }
            };
            self.executed += 1;
            self.rows = result.into_iter();
        }
    }

    /// Next row; fails with [`GatewayError::Exhausted`] once drained
    pub async fn next_row(&mut self) -> GatewayResult<Row> {
        if !self.has_next().await? {
            return Err(GatewayError::Exhausted);
        }
        self.rows.next().ok_or(GatewayError::Exhausted)
    }

    /// Next row, or `None` once drained
    pub async fn try_next(&mut self) -> GatewayResult<Option<Row>> {
        if self.has_next().await? {
            Ok(self.rows.next())
        } else {
            Ok(None)
        }
    }

    /// Adapt into a [`Stream`] of rows
    pub fn into_stream(self) -> impl Stream<Item = GatewayResult<Row>> {
        stream::try_unfold(self, |mut rows| async move {
            let next = rows.try_next().await?;
            Ok::<_, GatewayError>(next.map(|row| (row, rows)))
        })
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("pending", &self.pending.len())
            .field("buffered", &self.rows.len())
            .field("executed", &self.executed)
            .field("failed", &self.failed)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::types::{ResultSet, Value};
    use async_trait::async_trait;
    use futures_util::TryStreamExt;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Session answering from canned result sets and recording every query
    pub(crate) struct ScriptedSession {
        results: HashMap<String, Vec<Row>>,
        pub(crate) log: Mutex<Vec<String>>,
    }

    impl ScriptedSession {
        pub(crate) fn new() -> Self {
            Self {
                results: HashMap::new(),
                log: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn answer(mut self, query: &str, values: &[i64]) -> Self {
            let rows = values
                .iter()
                .map(|v| Row::new(vec![Value::Int(*v)]))
                .collect();
            self.results.insert(query.to_string(), rows);
            self
        }
    }

    #[async_trait]
    impl StorageSession for ScriptedSession {
        fn username(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, statement: &BoundStatement) -> GatewayResult<ResultSet> {
            self.log.lock().unwrap().push(statement.query.clone());
            match self.results.get(&statement.query) {
                Some(rows) => Ok(ResultSet::new(rows.clone())),
                None => Err(GatewayError::Query(format!("unexpected {}", statement.query))),
            }
        }
    }

    fn values(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r.get_long(0).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_concatenates_in_statement_order() {
        let session = Arc::new(
            ScriptedSession::new()
                .answer("a", &[1, 2])
                .answer("b", &[3])
                .answer("c", &[4, 5]),
        );
        let mut stream = RowStream::with_statements(
            session,
            ["a", "b", "c"].map(BoundStatement::unbound),
        );

        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await.unwrap() {
            rows.push(row);
        }

        assert_eq!(values(&rows), vec![1, 2, 3, 4, 5]);
        assert_eq!(stream.executed(), 3);
    }

    #[tokio::test]
    async fn test_executes_lazily() {
        let session = Arc::new(ScriptedSession::new().answer("a", &[1, 2]).answer("b", &[3]));
        let mut stream = RowStream::with_statements(
            session.clone(),
            ["a", "b"].map(BoundStatement::unbound),
        );

        assert_eq!(stream.executed(), 0);
        stream.next_row().await.unwrap();
        assert_eq!(stream.executed(), 1);
        stream.next_row().await.unwrap();
        // "b" only runs once "a" is drained
        assert_eq!(stream.executed(), 1);
        stream.next_row().await.unwrap();
        assert_eq!(stream.executed(), 2);
        assert_eq!(*session.log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_skips_empty_results() {
        let session = Arc::new(
            ScriptedSession::new()
                .answer("a", &[])
                .answer("b", &[])
                .answer("c", &[7]),
        );
        let mut stream = RowStream::with_statements(
            session,
            ["a", "b", "c"].map(BoundStatement::unbound),
        );

        assert!(stream.has_next().await.unwrap());
        assert_eq!(stream.next_row().await.unwrap().get_long(0).unwrap(), 7);
        assert!(!stream.has_next().await.unwrap());
    }

    #[tokio::test]
    async fn test_next_after_exhaustion_fails() {
        let session = Arc::new(ScriptedSession::new().answer("a", &[1]));
        let mut stream = RowStream::with_statements(session, [BoundStatement::unbound("a")]);

        stream.next_row().await.unwrap();
        assert!(matches!(
            stream.next_row().await,
            Err(GatewayError::Exhausted)
        ));
    }

    #[tokio::test]
    async fn test_error_stops_stream() {
        let session = Arc::new(ScriptedSession::new().answer("a", &[1]));
        let mut stream = RowStream::with_statements(
            session,
            ["a", "missing"].map(BoundStatement::unbound),
        );

        stream.next_row().await.unwrap();
        assert!(matches!(stream.try_next().await, Err(GatewayError::Query(_))));
    }

    #[tokio::test]
    async fn test_failed_stream_stays_terminated() {
        let session = Arc::new(ScriptedSession::new().answer("a", &[1]).answer("c", &[3]));
        let mut stream = RowStream::with_statements(
            session.clone(),
            ["a", "missing", "c"].map(BoundStatement::unbound),
        );

        stream.next_row().await.unwrap();
        assert!(matches!(stream.try_next().await, Err(GatewayError::Query(_))));
        assert!(matches!(stream.try_next().await, Err(GatewayError::Aborted)));
        assert!(matches!(stream.has_next().await, Err(GatewayError::Aborted)));
        assert_eq!(*session.log.lock().unwrap(), vec!["a", "missing"]);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let session = Arc::new(ScriptedSession::new().answer("a", &[1]).answer("b", &[2]));
        let mut stream = RowStream::new(session);
        stream.add(BoundStatement::unbound("a"));
        stream.add(BoundStatement::unbound("b"));

        let rows: Vec<Row> = stream.into_stream().try_collect().await.unwrap();
        assert_eq!(values(&rows), vec![1, 2]);
    }
}

//! Metrics DAO - statements against the index table
//!
//! Every finder returns a [`RowStream`] with one statement per index
//! partition, so a read across all shards still keeps a single query in
//! flight. Rows whose TTL has elapsed are filtered on `expires_at`, which
//! makes reads consistent with the store's expiry even before a purge.

use crate::gateway::{BoundStatement, RowStream, StorageSession, Value};
use crate::metrics::codec::{self, INDEX_COLUMNS};
use crate::metrics::error::IndexResult;
use crate::metrics::partition::{ModuloPartitioner, Partitioner};
use crate::metrics::policy::MetricsPolicy;
use crate::metrics::types::{Bucket, IndexEntry};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Index table created by the first update script
pub const INDEX_TABLE: &str = "metrics_idx";

/// Data access for the aggregation index
pub struct MetricsDao {
    session: Arc<dyn StorageSession>,
    policy: Arc<MetricsPolicy>,
    partitioner: Arc<dyn Partitioner>,
}

impl MetricsDao {
    pub fn new(session: Arc<dyn StorageSession>, policy: Arc<MetricsPolicy>) -> Self {
        Self::with_partitioner(session, policy, Arc::new(ModuloPartitioner))
    }

    pub fn with_partitioner(
        session: Arc<dyn StorageSession>,
        policy: Arc<MetricsPolicy>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Self {
        Self {
            session,
            policy,
            partitioner,
        }
    }

    pub fn policy(&self) -> &MetricsPolicy {
        &self.policy
    }

    pub fn partition_for(&self, schedule_id: i32) -> u32 {
        self.partitioner
            .partition(schedule_id, self.policy.index_partitions())
    }

    // ==================== Write Methods ====================

    /// Upsert one entry. The key columns identify the row, so writing the
    /// same key again replaces its schedule ids. Rows expire one bucket TTL
    /// after `insert_time_slice`.
    pub async fn update_index(&self, entry: &IndexEntry) -> IndexResult<()> {
        entry.validate(self.policy.index_partitions())?;

        let expires_at =
            entry.insert_time_slice + Duration::seconds(self.policy.ttl_secs(entry.bucket) as i64);
        let mut params = codec::encode(entry);
        params.push(Value::from(expires_at));

        let statement = BoundStatement::new(
            format!(
                "INSERT OR REPLACE INTO {} ({}, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                INDEX_TABLE, INDEX_COLUMNS
            ),
            params,
        );
        self.session.execute(&statement).await?;
        Ok(())
    }

    /// Register schedule ids with data in `collection_time_slice`, writing one
    /// entry per (partition, start schedule id) group. Ids already registered
    /// for a group are kept and merged with the ones given here. Returns the
    /// number of entries written.
    pub async fn index_schedules(
        &self,
        bucket: Bucket,
        collection_time_slice: DateTime<Utc>,
        schedule_ids: impl IntoIterator<Item = i32>,
        insert_time_slice: DateTime<Utc>,
    ) -> IndexResult<usize> {
        let mut groups: BTreeMap<(u32, i32), BTreeSet<i32>> = BTreeMap::new();
        for schedule_id in schedule_ids {
            let key = (
                self.partition_for(schedule_id),
                self.policy.start_schedule_id_for(schedule_id),
            );
            groups.entry(key).or_default().insert(schedule_id);
        }

        let day = self.policy.day_of(collection_time_slice);
        let written = groups.len();
        for ((partition, start_schedule_id), ids) in groups {
            let mut entry = IndexEntry {
                bucket,
                day,
                partition,
                collection_time_slice,
                start_schedule_id,
                insert_time_slice,
                schedule_ids: ids,
            };
            if let Some(existing) = self.find_entry(&entry, insert_time_slice).await? {
                entry.schedule_ids.extend(existing.schedule_ids);
            }
            self.update_index(&entry).await?;
        }

        tracing::debug!(
            "Indexed {} entries for {} slice {}",
            written,
            bucket,
            collection_time_slice
        );
        Ok(written)
    }

    // ==================== Query Methods ====================

    /// The live entry stored under the key of `entry`, if any
    pub async fn find_entry(
        &self,
        entry: &IndexEntry,
        as_of: DateTime<Utc>,
    ) -> IndexResult<Option<IndexEntry>> {
        let (bucket, day, partition, time_slice, start_schedule_id) = entry.key();
        let statement = BoundStatement::new(
            format!(
                "SELECT {} FROM {} WHERE bucket = ? AND day = ? AND partition_id = ? \
                 AND collection_time_slice = ? AND start_schedule_id = ? AND expires_at > ?",
                INDEX_COLUMNS, INDEX_TABLE
            ),
            vec![
                Value::from(bucket.as_str()),
                Value::from(day),
                Value::from(partition),
                Value::from(time_slice),
                Value::from(start_schedule_id),
                Value::from(as_of),
            ],
        );

        let result = self.session.execute(&statement).await?;
        result.rows().first().map(codec::decode).transpose()
    }

    /// One page per listed partition of the entries in `time_slice`, each
    /// page starting after that partition's cursor (or at the beginning)
    pub fn find_current_index_entries(
        &self,
        bucket: Bucket,
        day: DateTime<Utc>,
        time_slice: DateTime<Utc>,
        cursors: &[(u32, Option<i32>)],
        page_size: usize,
        as_of: DateTime<Utc>,
    ) -> RowStream {
        let statements = cursors.iter().map(|(partition, cursor)| {
            let mut params = vec![
                Value::from(bucket.as_str()),
                Value::from(day),
                Value::from(*partition),
                Value::from(time_slice),
            ];
            let cursor_clause = match cursor {
                Some(start_schedule_id) => {
                    params.push(Value::from(*start_schedule_id));
                    "AND start_schedule_id > ? "
                }
                None => "",
            };
            params.push(Value::from(as_of));
            params.push(Value::Int(page_size as i64));

            BoundStatement::new(
                format!(
                    "SELECT {} FROM {} WHERE bucket = ? AND day = ? AND partition_id = ? \
                     AND collection_time_slice = ? {}AND expires_at > ? \
                     ORDER BY start_schedule_id LIMIT ?",
                    INDEX_COLUMNS, INDEX_TABLE, cursor_clause
                ),
                params,
            )
        });

        RowStream::with_statements(Arc::clone(&self.session), statements.collect::<Vec<_>>())
    }

    /// Entries of `day` from `time_slice` onward
    pub fn find_past_index_entries_before_today(
        &self,
        bucket: Bucket,
        day: DateTime<Utc>,
        time_slice: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> RowStream {
        self.per_partition(bucket, day, Some((">=", time_slice)), as_of)
    }

    /// Every entry of `day`
    pub fn find_index_entries_by_day(
        &self,
        bucket: Bucket,
        day: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> RowStream {
        self.per_partition(bucket, day, None, as_of)
    }

    /// Entries of `day` strictly before `time_slice`
    pub fn find_past_index_entries_from_today(
        &self,
        bucket: Bucket,
        day: DateTime<Utc>,
        time_slice: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> RowStream {
        self.per_partition(bucket, day, Some(("<", time_slice)), as_of)
    }

    fn per_partition(
        &self,
        bucket: Bucket,
        day: DateTime<Utc>,
        slice_bound: Option<(&str, DateTime<Utc>)>,
        as_of: DateTime<Utc>,
    ) -> RowStream {
        let slice_clause = match slice_bound {
            Some((op, _)) => format!("AND collection_time_slice {} ? ", op),
            None => String::new(),
        };
        let query = format!(
            "SELECT {} FROM {} WHERE bucket = ? AND day = ? AND partition_id = ? {}\
             AND expires_at > ? ORDER BY collection_time_slice, start_schedule_id",
            INDEX_COLUMNS, INDEX_TABLE, slice_clause
        );

        let statements = (0..self.policy.index_partitions()).map(|partition| {
            let mut params = vec![
                Value::from(bucket.as_str()),
                Value::from(day),
                Value::from(partition),
            ];
            if let Some((_, time_slice)) = slice_bound {
                params.push(Value::from(time_slice));
            }
            params.push(Value::from(as_of));
            BoundStatement::new(query.clone(), params)
        });

        RowStream::with_statements(Arc::clone(&self.session), statements.collect::<Vec<_>>())
    }
}

//! Index Loader
//!
//! Issues the queries that find which schedules have data waiting to be
//! rolled up:
//!
//! - **current slice**: every entry of the bucket's active time slice, across
//!   all partitions, paged by `start_schedule_id`
//! - **past slices**: entries for slices before the current one, back to the
//!   start of the retention window, walked one day at a time
//!
//! Both loads are all-or-nothing. A failed query discards what was read so
//! far and surfaces as [`IndexError::QueryFailure`], so callers simply retry.

use crate::gateway::RowStream;
use crate::metrics::codec;
use crate::metrics::dao::MetricsDao;
use crate::metrics::error::{IndexError, IndexResult};
use crate::metrics::types::{Bucket, IndexEntry};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Loads index entries relative to a fixed "now"
pub struct IndexEntriesLoader {
    dao: Arc<MetricsDao>,
    now: DateTime<Utc>,
}

impl IndexEntriesLoader {
    pub fn new(dao: Arc<MetricsDao>, now: DateTime<Utc>) -> Self {
        Self { dao, now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Start of the active slice of `bucket`
    pub fn current_time_slice(&self, bucket: Bucket) -> DateTime<Utc> {
        self.dao.policy().current_time_slice(bucket, self.now)
    }

    pub fn current_day(&self) -> DateTime<Utc> {
        self.dao.policy().day_of(self.now)
    }

    /// Every entry of the active slice of `bucket`.
    ///
    /// Each partition is paged on its own: a partition whose page came back
    /// full is asked for its next page after its last `start_schedule_id`,
    /// until no partition fills a page or a round adds nothing. A partition
    /// holding an exact multiple of `page_size` entries costs one extra empty
    /// query and nothing is dropped.
    pub async fn load_current_index_entries(
        &self,
        bucket: Bucket,
        page_size: usize,
    ) -> IndexResult<Vec<IndexEntry>> {
        let time_slice = self.current_time_slice(bucket);
        let day = self.current_day();

        self.page_current(bucket, day, time_slice, page_size)
            .await
            .map_err(|e| {
                IndexError::query_failure(
                    format!(
                        "Failed to load {} index entries for current time slice {}",
                        bucket, time_slice
                    ),
                    e,
                )
            })
    }

    async fn page_current(
        &self,
        bucket: Bucket,
        day: DateTime<Utc>,
        time_slice: DateTime<Utc>,
        page_size: usize,
    ) -> IndexResult<Vec<IndexEntry>> {
        if page_size == 0 {
            return Err(IndexError::InvalidPageSize(page_size));
        }

        let mut entries = Vec::new();
        let mut cursors: Vec<(u32, Option<i32>)> = (0..self.dao.policy().index_partitions())
            .map(|partition| (partition, None))
            .collect();
        let mut rounds = 0;

        while !cursors.is_empty() {
            let stream = self.dao.find_current_index_entries(
                bucket, day, time_slice, &cursors, page_size, self.now,
            );
            let page = drain(stream).await?;
            rounds += 1;
            if page.is_empty() {
                break;
            }

            // (entries read, last cursor) per partition in this round
            let mut filled: BTreeMap<u32, (usize, i32)> = BTreeMap::new();
            for entry in &page {
                let slot = filled.entry(entry.partition).or_insert((0, entry.start_schedule_id));
                slot.0 += 1;
                slot.1 = entry.start_schedule_id;
            }
            cursors = filled
                .into_iter()
                .filter(|(_, (count, _))| *count == page_size)
                .map(|(partition, (_, last))| (partition, Some(last)))
                .collect();
            entries.extend(page);
        }

        tracing::debug!(
            "Loaded {} {} index entries for {} in {} rounds",
            entries.len(),
            bucket,
            time_slice,
            rounds
        );
        Ok(entries)
    }

    /// Raw entries for every slice before the current one, back to
    /// `start_day` inclusive
    pub async fn load_past_index_entries(
        &self,
        start_day: DateTime<Utc>,
    ) -> IndexResult<Vec<IndexEntry>> {
        self.load_past_bucket_entries(Bucket::Raw, start_day).await
    }

    /// Entries of `bucket` for every slice before the current one, back to
    /// `start_day` inclusive, in day order:
    ///
    /// 1. `start_day` from the current slice's hour of day onward
    /// 2. every whole day between `start_day` and today
    /// 3. today, before the current slice
    ///
    /// When `start_day` is today or later only the third step runs.
    pub async fn load_past_bucket_entries(
        &self,
        bucket: Bucket,
        start_day: DateTime<Utc>,
    ) -> IndexResult<Vec<IndexEntry>> {
        let policy = self.dao.policy();
        let current_slice = self.current_time_slice(bucket);
        let current_day = self.current_day();
        let mut day = policy.day_of(start_day);
        let mut entries = Vec::new();

        let context = |day: DateTime<Utc>| {
            format!(
                "Failed to load {} index entries prior to current time slice {} (day {})",
                bucket, current_slice, day
            )
        };

        if day < current_day {
            let time_slice = policy.same_hour_on(day, current_slice);
            let stream = self
                .dao
                .find_past_index_entries_before_today(bucket, day, time_slice, self.now);
            entries.extend(
                drain(stream)
                    .await
                    .map_err(|e| IndexError::query_failure(context(day), e))?,
            );
            day = day + Duration::days(1);

            while day < current_day {
                let stream = self.dao.find_index_entries_by_day(bucket, day, self.now);
                entries.extend(
                    drain(stream)
                        .await
                        .map_err(|e| IndexError::query_failure(context(day), e))?,
                );
                day = day + Duration::days(1);
            }
        }

        let stream = self.dao.find_past_index_entries_from_today(
            bucket,
            current_day,
            current_slice,
            self.now,
        );
        entries.extend(
            drain(stream)
                .await
                .map_err(|e| IndexError::query_failure(context(current_day), e))?,
        );

        tracing::debug!(
            "Loaded {} past {} index entries since {}",
            entries.len(),
            bucket,
            start_day
        );
        Ok(entries)
    }
}

async fn drain(mut stream: RowStream) -> IndexResult<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    while let Some(row) = stream.try_next().await? {
        entries.push(codec::decode(&row)?);
    }
    Ok(entries)
}

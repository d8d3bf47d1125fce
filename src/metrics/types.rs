//! Core data types for the aggregation index
//!
//! - `Bucket`: the four resolutions data is kept at
//! - `IndexEntry`: one page of schedule ids with pending data in a bucket/slice

use crate::metrics::error::{IndexError, IndexResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Resolution at which measurements are stored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Samples as collected
    Raw,
    /// One hour rollups of raw data
    OneHour,
    /// Six hour rollups of one hour data
    SixHour,
    /// Daily rollups of six hour data
    TwentyFourHour,
}

impl Bucket {
    /// Get all buckets, finest first
    pub fn all() -> &'static [Bucket] {
        &[
            Bucket::Raw,
            Bucket::OneHour,
            Bucket::SixHour,
            Bucket::TwentyFourHour,
        ]
    }

    /// Name as stored in index rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Raw => "raw",
            Bucket::OneHour => "one_hour",
            Bucket::SixHour => "six_hour",
            Bucket::TwentyFourHour => "twenty_four_hour",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = IndexError;

    fn from_str(s: &str) -> IndexResult<Self> {
        Bucket::all()
            .iter()
            .copied()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| IndexError::UnknownBucket(s.to_string()))
    }
}

/// Registers the schedule ids that have data in a bucket for one
/// (day, partition, collection time slice), one page at a time.
///
/// The key is (bucket, day, partition, collection_time_slice,
/// start_schedule_id); writing the same key again replaces the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub bucket: Bucket,
    /// Midnight UTC of the collection time slice
    pub day: DateTime<Utc>,
    /// Shard in `[0, index_partitions)`
    pub partition: u32,
    pub collection_time_slice: DateTime<Utc>,
    /// Smallest schedule id of the page, also the pagination cursor
    pub start_schedule_id: i32,
    /// When the entry was written
    pub insert_time_slice: DateTime<Utc>,
    pub schedule_ids: BTreeSet<i32>,
}

impl IndexEntry {
    /// Check the invariants the store schema cannot express
    pub fn validate(&self, partitions: u32) -> IndexResult<()> {
        if self.schedule_ids.is_empty() {
            return Err(IndexError::InvalidEntry(format!(
                "no schedule ids for {} slice {} partition {}",
                self.bucket, self.collection_time_slice, self.partition
            )));
        }
        if self.partition >= partitions {
            return Err(IndexError::InvalidEntry(format!(
                "partition {} outside [0, {})",
                self.partition, partitions
            )));
        }
        Ok(())
    }

    /// Key columns, in clustering order
    pub fn key(&self) -> (Bucket, DateTime<Utc>, u32, DateTime<Utc>, i32) {
        (
            self.bucket,
            self.day,
            self.partition,
            self.collection_time_slice,
            self.start_schedule_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_names_round_trip() {
        for bucket in Bucket::all() {
            assert_eq!(bucket.as_str().parse::<Bucket>().unwrap(), *bucket);
        }
        assert!(matches!(
            "raw_metrics".parse::<Bucket>(),
            Err(IndexError::UnknownBucket(name)) if name == "raw_metrics"
        ));
    }

    #[test]
    fn test_entry_validation() {
        let slice = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut entry = IndexEntry {
            bucket: Bucket::Raw,
            day: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            partition: 3,
            collection_time_slice: slice,
            start_schedule_id: 100,
            insert_time_slice: slice,
            schedule_ids: [100, 101].into_iter().collect(),
        };

        assert!(entry.validate(10).is_ok());
        assert!(entry.validate(3).is_err());

        entry.schedule_ids.clear();
        assert!(matches!(entry.validate(10), Err(IndexError::InvalidEntry(_))));
    }
}

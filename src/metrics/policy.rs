//! Bucket/Retention Policy
//!
//! Immutable per-deployment settings consumed by every index component:
//! TTL, retention and time-slice width per bucket, plus the index page size
//! and shard count. Built once from [`MetricsConfig`] and shared by `Arc`.

use crate::config::{ConfigError, MetricsConfig};
use crate::metrics::types::Bucket;
use chrono::{DateTime, Duration, Timelike, Utc};

const MILLIS_PER_DAY: i64 = 24 * 3600 * 1000;

/// Settings for one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPolicy {
    /// TTL applied to rows written to the bucket
    pub ttl_secs: u32,
    /// How long data is kept
    pub retention: Duration,
    /// Width of a collection time slice
    pub time_slice: Duration,
}

impl BucketPolicy {
    fn new(
        retention_days: i64,
        ttl_secs: Option<u32>,
        slice_hours: i64,
    ) -> Result<Self, ConfigError> {
        if retention_days <= 0 {
            return Err(ConfigError::Invalid(format!(
                "retention must be positive, got {} days",
                retention_days
            )));
        }
        if slice_hours <= 0 || 24 % slice_hours != 0 {
            return Err(ConfigError::Invalid(format!(
                "time slice of {} hours does not divide a day",
                slice_hours
            )));
        }

        let retention = Duration::days(retention_days);
        let ttl_secs = match ttl_secs {
            Some(ttl) => ttl,
            None => u32::try_from(retention.num_seconds()).map_err(|_| {
                ConfigError::Invalid(format!(
                    "retention of {} days too long for a TTL",
                    retention_days
                ))
            })?,
        };

        Ok(Self {
            ttl_secs,
            retention,
            time_slice: Duration::hours(slice_hours),
        })
    }
}

/// Retention and index layout for all buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsPolicy {
    raw: BucketPolicy,
    one_hour: BucketPolicy,
    six_hour: BucketPolicy,
    twenty_four_hour: BucketPolicy,
    index_page_size: usize,
    index_partitions: u32,
    schedule_batch_size: i32,
}

impl MetricsPolicy {
    pub fn bucket(&self, bucket: Bucket) -> &BucketPolicy {
        match bucket {
            Bucket::Raw => &self.raw,
            Bucket::OneHour => &self.one_hour,
            Bucket::SixHour => &self.six_hour,
            Bucket::TwentyFourHour => &self.twenty_four_hour,
        }
    }

    pub fn ttl_secs(&self, bucket: Bucket) -> u32 {
        self.bucket(bucket).ttl_secs
    }

    pub fn retention(&self, bucket: Bucket) -> Duration {
        self.bucket(bucket).retention
    }

    pub fn time_slice(&self, bucket: Bucket) -> Duration {
        self.bucket(bucket).time_slice
    }

    pub fn index_page_size(&self) -> usize {
        self.index_page_size
    }

    pub fn index_partitions(&self) -> u32 {
        self.index_partitions
    }

    pub fn schedule_batch_size(&self) -> i32 {
        self.schedule_batch_size
    }

    /// Builder: override the page size (tests use tiny pages)
    pub fn with_index_page_size(mut self, page_size: usize) -> Self {
        self.index_page_size = page_size.max(1);
        self
    }

    /// Builder: override the shard count
    pub fn with_index_partitions(mut self, partitions: u32) -> Self {
        self.index_partitions = partitions.max(1);
        self
    }

    /// Start of the collection time slice containing `time`
    pub fn current_time_slice(&self, bucket: Bucket, time: DateTime<Utc>) -> DateTime<Utc> {
        truncate(time, self.time_slice(bucket).num_milliseconds())
    }

    /// Midnight UTC of the day containing `time`
    pub fn day_of(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        truncate(time, MILLIS_PER_DAY)
    }

    /// First day still inside the raw retention window
    pub fn past_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.day_of(now) - Duration::days(self.raw.retention.num_days())
    }

    /// `day` at the hour of day of `time_slice`
    pub fn same_hour_on(&self, day: DateTime<Utc>, time_slice: DateTime<Utc>) -> DateTime<Utc> {
        self.day_of(day) + Duration::hours(time_slice.hour() as i64)
    }

    /// Cursor value for the index page holding `schedule_id`
    pub fn start_schedule_id_for(&self, schedule_id: i32) -> i32 {
        schedule_id - schedule_id.rem_euclid(self.schedule_batch_size)
    }
}

fn truncate(time: DateTime<Utc>, unit_millis: i64) -> DateTime<Utc> {
    time - Duration::milliseconds(time.timestamp_millis().rem_euclid(unit_millis))
}

impl TryFrom<&MetricsConfig> for MetricsPolicy {
    type Error = ConfigError;

    fn try_from(config: &MetricsConfig) -> Result<Self, ConfigError> {
        if config.index_page_size == 0 {
            return Err(ConfigError::Invalid("index_page_size must be positive".to_string()));
        }
        if config.index_partitions == 0 {
            return Err(ConfigError::Invalid("index_partitions must be positive".to_string()));
        }
        if config.schedule_batch_size <= 0 {
            return Err(ConfigError::Invalid(
                "schedule_batch_size must be positive".to_string(),
            ));
        }

        Ok(Self {
            raw: BucketPolicy::new(
                config.raw_retention_days,
                config.raw_ttl_secs,
                config.raw_time_slice_hours,
            )?,
            one_hour: BucketPolicy::new(
                config.one_hour_retention_days,
                config.one_hour_ttl_secs,
                config.one_hour_time_slice_hours,
            )?,
            six_hour: BucketPolicy::new(
                config.six_hour_retention_days,
                config.six_hour_ttl_secs,
                config.six_hour_time_slice_hours,
            )?,
            twenty_four_hour: BucketPolicy::new(
                config.twenty_four_hour_retention_days,
                config.twenty_four_hour_ttl_secs,
                config.twenty_four_hour_time_slice_hours,
            )?,
            index_page_size: config.index_page_size,
            index_partitions: config.index_partitions,
            schedule_batch_size: config.schedule_batch_size,
        })
    }
}

impl Default for MetricsPolicy {
    fn default() -> Self {
        let day = Duration::days(1);
        Self {
            raw: BucketPolicy {
                ttl_secs: 7 * 86_400,
                retention: Duration::days(7),
                time_slice: Duration::hours(1),
            },
            one_hour: BucketPolicy {
                ttl_secs: 14 * 86_400,
                retention: Duration::days(14),
                time_slice: Duration::hours(6),
            },
            six_hour: BucketPolicy {
                ttl_secs: 31 * 86_400,
                retention: Duration::days(31),
                time_slice: day,
            },
            twenty_four_hour: BucketPolicy {
                ttl_secs: 365 * 86_400,
                retention: Duration::days(365),
                time_slice: day,
            },
            index_page_size: 2500,
            index_partitions: 10,
            schedule_batch_size: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, m, 17).unwrap()
    }

    #[test]
    fn test_default_matches_default_config() {
        let policy = MetricsPolicy::try_from(&MetricsConfig::default()).unwrap();
        assert_eq!(policy, MetricsPolicy::default());
    }

    #[test]
    fn test_time_slices() {
        let policy = MetricsPolicy::default();
        let now = at(10, 14, 35);

        assert_eq!(
            policy.current_time_slice(Bucket::Raw, now),
            Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap()
        );
        assert_eq!(
            policy.current_time_slice(Bucket::OneHour, now),
            Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
        );
        assert_eq!(
            policy.current_time_slice(Bucket::SixHour, now),
            Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(policy.day_of(now), policy.current_time_slice(Bucket::SixHour, now));
    }

    #[test]
    fn test_past_window_start() {
        let policy = MetricsPolicy::default();
        assert_eq!(
            policy.past_window_start(at(10, 14, 35)),
            Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            policy.same_hour_on(at(3, 2, 0), at(10, 14, 0)),
            Utc.with_ymd_and_hms(2024, 5, 3, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_start_schedule_id() {
        let policy = MetricsPolicy::default();
        assert_eq!(policy.start_schedule_id_for(0), 0);
        assert_eq!(policy.start_schedule_id_for(4), 0);
        assert_eq!(policy.start_schedule_id_for(5), 5);
        assert_eq!(policy.start_schedule_id_for(1234), 1230);
    }

    #[test]
    fn test_ttl_defaults_to_retention() {
        let config = MetricsConfig {
            raw_retention_days: 2,
            one_hour_ttl_secs: Some(60),
            ..MetricsConfig::default()
        };
        let policy = MetricsPolicy::try_from(&config).unwrap();

        assert_eq!(policy.ttl_secs(Bucket::Raw), 2 * 86_400);
        assert_eq!(policy.ttl_secs(Bucket::OneHour), 60);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = [
            MetricsConfig {
                index_page_size: 0,
                ..MetricsConfig::default()
            },
            MetricsConfig {
                index_partitions: 0,
                ..MetricsConfig::default()
            },
            MetricsConfig {
                raw_time_slice_hours: 5,
                ..MetricsConfig::default()
            },
            MetricsConfig {
                six_hour_retention_days: 0,
                ..MetricsConfig::default()
            },
        ];

        for config in &bad {
            assert!(matches!(
                MetricsPolicy::try_from(config),
                Err(ConfigError::Invalid(_))
            ));
        }
    }
}

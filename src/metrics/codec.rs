//! Index Entry Codec
//!
//! Maps index rows to [`IndexEntry`] by column position:
//!
//! ```text
//! 0 bucket | 1 day | 2 partition | 3 collection_time_slice |
//! 4 start_schedule_id | 5 insert_time_slice | 6 schedule_ids
//! ```
//!
//! Only type coercion happens here; invariants are checked by callers.

use crate::gateway::{Row, Value};
use crate::metrics::error::{IndexError, IndexResult};
use crate::metrics::types::{Bucket, IndexEntry};

/// Column list matching the decode order
pub const INDEX_COLUMNS: &str = "bucket, day, partition_id, collection_time_slice, \
     start_schedule_id, insert_time_slice, schedule_ids";

pub fn decode(row: &Row) -> IndexResult<IndexEntry> {
    let bucket: Bucket = row.get_string(0)?.parse()?;
    let partition = row.get_int(2)?;

    Ok(IndexEntry {
        bucket,
        day: row.get_timestamp(1)?,
        partition: u32::try_from(partition)
            .map_err(|_| IndexError::InvalidEntry(format!("negative partition {}", partition)))?,
        collection_time_slice: row.get_timestamp(3)?,
        start_schedule_id: row.get_int(4)?,
        insert_time_slice: row.get_timestamp(5)?,
        schedule_ids: row.get_int_set(6)?,
    })
}

pub fn decode_all<'a>(rows: impl IntoIterator<Item = &'a Row>) -> IndexResult<Vec<IndexEntry>> {
    rows.into_iter().map(decode).collect()
}

/// Positional values in [`INDEX_COLUMNS`] order
pub fn encode(entry: &IndexEntry) -> Vec<Value> {
    vec![
        Value::from(entry.bucket.as_str()),
        Value::from(entry.day),
        Value::from(entry.partition),
        Value::from(entry.collection_time_slice),
        Value::from(entry.start_schedule_id),
        Value::from(entry.insert_time_slice),
        Value::from(entry.schedule_ids.clone()),
    ]
}

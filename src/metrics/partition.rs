//! Shard assignment for index entries
//!
//! The write path picks the partition; readers only need to know the shard
//! count. Whatever function is used must stay fixed for the lifetime of the
//! data, since readers cannot tell which function placed a past entry.

/// Deterministic mapping from schedule id to index shard
pub trait Partitioner: Send + Sync {
    fn partition(&self, schedule_id: i32, partitions: u32) -> u32;
}

/// Spreads consecutive schedule ids round-robin across shards
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuloPartitioner;

impl Partitioner for ModuloPartitioner {
    fn partition(&self, schedule_id: i32, partitions: u32) -> u32 {
        (schedule_id as i64).rem_euclid(partitions.max(1) as i64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulo_partitioner() {
        let p = ModuloPartitioner;
        assert_eq!(p.partition(0, 10), 0);
        assert_eq!(p.partition(17, 10), 7);
        assert_eq!(p.partition(-3, 10), 7);
        assert_eq!(p.partition(5, 0), 0);
    }
}

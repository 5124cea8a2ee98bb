//! The narrow aggregate-query surface the algorithms consume from a storage
//! backend. See `spec.md` §4.6. The core is ignorant of query-language
//! details; everything here is expressed in terms of `Attribute` filters and
//! plain integers.

pub mod memory;

use std::collections::HashMap;

use crate::attribute::Attribute;
use crate::config::Config;
use crate::numrange::NumRange;
use crate::partition::Partition;

/// The abstract backend contract consumed by Mondrian and Datafly.
///
/// Implementations are the core's sole point of I/O (`spec.md` §5): every
/// method may block. The core never retries a failed call; `Self::Err` is
/// surfaced to the driver as-is.
pub trait Backend {
    type Err: std::fmt::Display;

    /// Count of records matching every `Attribute` filter, or the whole
    /// dataset's size when `attributes` is `None`.
    fn document_count(
        &self,
        attributes: Option<&HashMap<String, Attribute>>,
    ) -> Result<u64, Self::Err>;

    /// Min and max of the named field, under the optional filter.
    fn attribute_min_max(
        &self,
        name: &str,
        attributes: Option<&HashMap<String, Attribute>>,
    ) -> Result<(i64, i64), Self::Err>;

    /// The median value and the next unique value strictly greater than it,
    /// within the partition; when the median equals the partition's max,
    /// returns `(prev_unique_before_max, median)` instead. `None` when no
    /// such interior split point exists (e.g. every value in the partition
    /// is equal) — this is the "split-unproductive" signal, not an error.
    fn value_to_split_at_and_next_unique_value(
        &self,
        name: &str,
        partition: &Partition,
    ) -> Result<Option<(i64, i64)>, Self::Err>;

    /// Percentile-based contiguous buckets over the whole dataset, used for
    /// Datafly's initial numeric bucketing.
    fn spread_attribute_into_uniform_buckets(
        &self,
        name: &str,
        num_buckets: u32,
    ) -> Result<Vec<NumRange>, Self::Err>;

    /// Persists one anonymized record per source record: QID fields carry
    /// the partition's generalized values, sensitive fields are copied
    /// verbatim.
    fn push_partitions(&mut self, partitions: &[Partition], config: &Config) -> Result<(), Self::Err>;
}

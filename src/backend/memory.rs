//! An in-process `Backend` fixture. Not a production collaborator — the
//! concrete Elasticsearch/MySQL backends are out of scope (`spec.md` §7) —
//! this is what the test suite and the `memory` CLI backend drive the
//! algorithms against, in the same spirit as a small in-memory dataset used
//! to exercise a tree builder without a real index on disk.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::attribute::{Attribute, AttributeKind};
use crate::config::Config;
use crate::numrange::NumRange;
use crate::partition::Partition;

use super::Backend;

/// One field of a record: either the numeric form a range/IP QID is stored
/// in, or the leaf category a hierarchical QID or a sensitive attribute is
/// stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

pub type Record = HashMap<String, FieldValue>;

#[derive(Debug)]
pub struct MemoryBackendError(String);

impl fmt::Display for MemoryBackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed table of records held in memory, plus whatever `push_partitions`
/// has written so far (inspectable by tests as `published`).
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    records: Vec<Record>,
    pub published: Vec<HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new(records: Vec<Record>) -> Self {
        InMemoryBackend { records, published: Vec::new() }
    }

    fn matching<'a>(&'a self, attributes: Option<&'a HashMap<String, Attribute>>) -> impl Iterator<Item = &'a Record> {
        self.records.iter().filter(move |record| match attributes {
            None => true,
            Some(attrs) => attrs.iter().all(|(name, attr)| match record.get(name) {
                Some(value) => attribute_matches(attr, value),
                None => false,
            }),
        })
    }

    fn int_values(&self, name: &str, attributes: Option<&HashMap<String, Attribute>>) -> Vec<i64> {
        let mut values: Vec<i64> = self
            .matching(attributes)
            .filter_map(|record| match record.get(name) {
                Some(FieldValue::Int(v)) => Some(*v),
                _ => None,
            })
            .collect();
        values.sort_unstable();
        values
    }
}

/// Whether a record's raw field value falls within an attribute's current
/// generalization. Interpreting an `Attribute` this way is backend-specific
/// (an ES backend would instead build a range/terms query); the core never
/// inspects record storage itself.
fn attribute_matches(attr: &Attribute, value: &FieldValue) -> bool {
    match (&attr.kind, value) {
        (AttributeKind::Hierarchical { tree }, FieldValue::Str(s)) => match tree.node(&attr.gen_value) {
            Some(node) => node.leaf_values().iter().any(|leaf| leaf == s),
            None => false,
        },
        (AttributeKind::IntegerRange { min, max, .. }, FieldValue::Int(v))
        | (AttributeKind::DateRange { min, max, .. }, FieldValue::Int(v)) => *v >= *min && *v <= *max,
        (AttributeKind::IpRange { base, mask }, FieldValue::Int(v)) => {
            let v = *v as u32;
            if *mask == 0 {
                true
            } else {
                let shift = 32 - *mask as u32;
                (v >> shift) == (*base >> shift)
            }
        }
        _ => false,
    }
}

/// Nearest-rank percentile over an already-sorted slice: the smallest value
/// whose rank covers at least `p` percent of the population.
fn percentile(sorted_values: &[i64], p: f64) -> i64 {
    let n = sorted_values.len();
    let idx = ((p / 100.0 * n as f64).ceil() as usize).saturating_sub(1).min(n - 1);
    sorted_values[idx]
}

impl Backend for InMemoryBackend {
    type Err = MemoryBackendError;

    fn document_count(&self, attributes: Option<&HashMap<String, Attribute>>) -> Result<u64, Self::Err> {
        Ok(self.matching(attributes).count() as u64)
    }

    fn attribute_min_max(
        &self,
        name: &str,
        attributes: Option<&HashMap<String, Attribute>>,
    ) -> Result<(i64, i64), Self::Err> {
        let values = self.int_values(name, attributes);
        let min = values
            .first()
            .copied()
            .ok_or_else(|| MemoryBackendError(format!("no values for '{name}' to compute min/max over")))?;
        let max = *values.last().unwrap();
        Ok((min, max))
    }

    fn value_to_split_at_and_next_unique_value(
        &self,
        name: &str,
        partition: &Partition,
    ) -> Result<Option<(i64, i64)>, Self::Err> {
        let values = self.int_values(name, Some(&partition.attributes));
        if values.is_empty() {
            return Ok(None);
        }

        let unique: Vec<i64> = values.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let max = *unique.last().unwrap();
        let median = percentile(&values, 50.0);

        if median == max {
            match unique.iter().rev().find(|&&v| v < max) {
                Some(&prev) => Ok(Some((prev, median))),
                None => Ok(None),
            }
        } else {
            match unique.iter().find(|&&v| v > median) {
                Some(&next) => Ok(Some((median, next))),
                None => Ok(None),
            }
        }
    }

    fn spread_attribute_into_uniform_buckets(&self, name: &str, num_buckets: u32) -> Result<Vec<NumRange>, Self::Err> {
        let values = self.int_values(name, None);
        let min = values
            .first()
            .copied()
            .ok_or_else(|| MemoryBackendError(format!("no values for '{name}' to bucket")))?;

        let interval = 100.0 / num_buckets as f64;
        let bounds: Vec<i64> = (1..=num_buckets).map(|i| percentile(&values, interval * i as f64)).collect();

        let mut ranges = Vec::with_capacity(bounds.len());
        for (i, &bound) in bounds.iter().enumerate() {
            if i == 0 {
                ranges.push(NumRange::new(min, bound));
            } else if bounds[i - 1] == bound {
                ranges.push(NumRange::new(bound, bound));
            } else {
                ranges.push(NumRange::new(bounds[i - 1] + 1, bound));
            }
        }
        Ok(ranges)
    }

    fn push_partitions(&mut self, partitions: &[Partition], config: &Config) -> Result<(), Self::Err> {
        for partition in partitions {
            let matching: Vec<&Record> = self.matching(Some(&partition.attributes)).collect();
            for record in matching {
                let mut out = HashMap::new();
                for name in &config.qid_names {
                    if let Some(attr) = partition.attributes.get(name) {
                        out.insert(name.clone(), attr.gen_value.clone());
                    }
                }
                for sensitive in &config.sensitive_attributes {
                    if let Some(value) = record.get(sensitive) {
                        let rendered = match value {
                            FieldValue::Int(v) => v.to_string(),
                            FieldValue::Str(s) => s.clone(),
                        };
                        out.insert(sensitive.clone(), rendered);
                    }
                }
                self.published.push(out);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::config::AttrMetadata;

    fn record(age: i64) -> Record {
        let mut r = HashMap::new();
        r.insert("age".to_string(), FieldValue::Int(age));
        r
    }

    fn partition_over(ages_min: i64, ages_max: i64, count: u64) -> Partition {
        let attr = Attribute::root("age", &AttrMetadata::Range(NumRange::new(ages_min, ages_max)));
        let mut attrs = HashMap::new();
        attrs.insert("age".to_string(), attr);
        Partition::new(count, attrs)
    }

    #[test]
    fn median_split_point_on_even_population() {
        let backend = InMemoryBackend::new(vec![record(10), record(20), record(30), record(40)]);
        let partition = partition_over(10, 40, 4);
        let split = backend
            .value_to_split_at_and_next_unique_value("age", &partition)
            .unwrap();
        assert_eq!(split, Some((20, 30)));
    }

    #[test]
    fn median_equal_to_max_walks_back_to_prior_unique_value() {
        let backend = InMemoryBackend::new(vec![record(10), record(10), record(10)]);
        let partition = partition_over(10, 10, 3);
        let split = backend
            .value_to_split_at_and_next_unique_value("age", &partition)
            .unwrap();
        assert_eq!(split, None);
    }

    #[test]
    fn uniform_buckets_are_contiguous() {
        let records: Vec<Record> = (0..40).map(record).collect();
        let backend = InMemoryBackend::new(records);
        let buckets = backend.spread_attribute_into_uniform_buckets("age", 4).unwrap();
        assert_eq!(buckets.len(), 4);
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].max + 1, pair[1].min);
        }
    }

    #[test]
    fn document_count_filters_by_attribute() {
        let backend = InMemoryBackend::new(vec![record(5), record(15), record(25)]);
        let attr = Attribute::root("age", &AttrMetadata::Range(NumRange::new(0, 10)));
        let mut attrs = HashMap::new();
        attrs.insert("age".to_string(), attr);
        assert_eq!(backend.document_count(Some(&attrs)).unwrap(), 1);
        assert_eq!(backend.document_count(None).unwrap(), 3);
    }
}

//! Top-down recursive median-cut partitioning. See `spec.md` §4.3.

use std::collections::HashMap;

use crate::attribute::Attribute;
use crate::backend::Backend;
use crate::config::{Config, QidType};
use crate::error::{Error, Result};
use crate::partition::Partition;

/// Runs Mondrian to a fixed point and returns the final partitions.
///
/// The initial partition spans the whole dataset with every Attribute at
/// its root generalization (`spec.md` §4.3 "Initial partition").
pub fn run<B: Backend>(backend: &B, config: &Config) -> Result<Vec<Partition>> {
    let root_attributes: HashMap<String, Attribute> = config
        .qid_names
        .iter()
        .map(|name| (name.clone(), Attribute::root(name, &config.attr_metadata[name])))
        .collect();
    let root = Partition::new(config.dataset_size, root_attributes);

    let mut finals = Vec::new();
    anonymize(root, backend, config, &mut finals)?;

    let total: u64 = finals.iter().map(|p| p.count).sum();
    if total != config.dataset_size {
        return Err(Error::Invariant(format!(
            "final partitions carry {total} records, expected {}",
            config.dataset_size
        )));
    }

    Ok(finals)
}

fn anonymize<B: Backend>(partition: Partition, backend: &B, config: &Config, finals: &mut Vec<Partition>) -> Result<()> {
    if !is_splittable(&partition, config) {
        log::debug!("finalizing partition of {} records (not splittable)", partition.count);
        finals.push(partition);
        return Ok(());
    }

    let qid_name = choose_qid_name(&partition, config)?;
    log::trace!("splitting {} records on '{qid_name}'", partition.count);
    let (partition, children) = split_partition(partition, &qid_name, backend, config)?;

    if children.is_empty() {
        log::warn!("split on '{qid_name}' was unproductive, closing it and retrying");
        let mut partition = partition;
        let closed = partition.attributes[&qid_name].with_split_allowed(false);
        partition.attributes.insert(qid_name, closed);
        anonymize(partition, backend, config, finals)
    } else {
        for child in children {
            anonymize(child, backend, config, finals)?;
        }
        Ok(())
    }
}

fn is_splittable(partition: &Partition, config: &Config) -> bool {
    partition.count >= 2 * config.k as u64 && partition.attributes.values().any(|attr| attr.split_allowed)
}

/// Among splittable Attributes, the one with maximum normalized width; ties
/// keep the first in `config.qid_names` order (`spec.md` §5 "Ordering").
fn choose_qid_name(partition: &Partition, config: &Config) -> Result<String> {
    let mut best: Option<(&str, f64)> = None;

    for name in &config.qid_names {
        let Some(attr) = partition.attributes.get(name) else { continue };
        if !attr.split_allowed {
            continue;
        }

        let width = attr.normalized_width(config);
        if width > 1.0 {
            return Err(Error::Invariant(format!("normalized width of '{name}' exceeds 1")));
        }

        match best {
            Some((_, best_width)) if best_width >= width => {}
            _ => best = Some((name, width)),
        }
    }

    best.map(|(name, _)| name.to_string())
        .ok_or_else(|| Error::Invariant("splittability check passed but no candidate QID was found".to_string()))
}

fn split_partition<B: Backend>(
    partition: Partition,
    qid_name: &str,
    backend: &B,
    config: &Config,
) -> Result<(Partition, Vec<Partition>)> {
    match config.qid_types[qid_name] {
        QidType::Numerical | QidType::Date => split_numerical(partition, qid_name, backend, config),
        QidType::Hierarchical | QidType::Ip => {
            let children = split_enumerated(&partition, qid_name, backend, config)?;
            Ok((partition, children))
        }
    }
}

/// `spec.md` §4.3 "Hierarchical split" — also covers IP-range splitting,
/// which enumerates exactly two candidates the same way.
fn split_enumerated<B: Backend>(
    partition: &Partition,
    qid_name: &str,
    backend: &B,
    config: &Config,
) -> Result<Vec<Partition>> {
    let candidates = partition.attributes[qid_name].split();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut children = Vec::new();
    for candidate in candidates {
        let mut attrs = partition.attributes.clone();
        attrs.insert(qid_name.to_string(), candidate);
        let count = backend.document_count(Some(&attrs)).map_err(|e| Error::Backend(e.to_string()))?;

        if count == 0 {
            continue;
        }
        if count < config.k as u64 {
            return Ok(Vec::new());
        }
        children.push(Partition::new(count, attrs));
    }

    let total: u64 = children.iter().map(|p| p.count).sum();
    if total != partition.count {
        return Err(Error::Invariant(format!(
            "split of '{qid_name}' produced child counts summing to {total}, expected {}",
            partition.count
        )));
    }

    Ok(children)
}

/// `spec.md` §4.3 "Numeric split". The in-partition min/max refresh is kept
/// even when the split below is rejected — a tightening, never undone
/// (`spec.md` §9, resolved open question).
fn split_numerical<B: Backend>(
    mut partition: Partition,
    qid_name: &str,
    backend: &B,
    config: &Config,
) -> Result<(Partition, Vec<Partition>)> {
    let (min, max) = backend
        .attribute_min_max(qid_name, Some(&partition.attributes))
        .map_err(|e| Error::Backend(e.to_string()))?;

    let refreshed = partition.attributes[qid_name].with_refreshed_bounds(min, max);
    partition.attributes.insert(qid_name.to_string(), refreshed.clone());

    let split_point = backend
        .value_to_split_at_and_next_unique_value(qid_name, &partition)
        .map_err(|e| Error::Backend(e.to_string()))?;

    let (value_to_split_at, next_unique_value) = match split_point {
        Some(pair) => pair,
        None => return Ok((partition, Vec::new())),
    };

    let candidates = refreshed.with_limits([(min, value_to_split_at), (next_unique_value, max)]).split();
    let mut candidates = candidates.into_iter();
    let l_candidate = candidates.next().expect("range split always produces two candidates");
    let r_candidate = candidates.next().expect("range split always produces two candidates");

    let mut l_attrs = partition.attributes.clone();
    l_attrs.insert(qid_name.to_string(), l_candidate);
    let mut r_attrs = partition.attributes.clone();
    r_attrs.insert(qid_name.to_string(), r_candidate);

    let l_count = backend.document_count(Some(&l_attrs)).map_err(|e| Error::Backend(e.to_string()))?;
    let r_count = backend.document_count(Some(&r_attrs)).map_err(|e| Error::Backend(e.to_string()))?;

    if l_count < config.k as u64 || r_count < config.k as u64 {
        return Ok((partition, Vec::new()));
    }

    Ok((partition, vec![Partition::new(l_count, l_attrs), Partition::new(r_count, r_attrs)]))
}

//! Iterative greedy full-domain generalization. See `spec.md` §4.4.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::attribute::{Attribute, AttributeKind};
use crate::backend::Backend;
use crate::config::{AttrMetadata, Config, QidType};
use crate::error::{Error, Result};
use crate::gentree::GenTree;
use crate::partition::Partition;

/// Runs Datafly to a fixed point and returns the final partitions.
pub fn run<B: Backend>(backend: &B, config: &Config) -> Result<Vec<Partition>> {
    let mut partitions = generate_initial_partitions(backend, config)?;
    log::debug!("{} initial partitions", partitions.len());

    // Literal per `spec.md` §9: the guard compares suppressed mass against
    // k itself, not against 0 or some other function of k.
    while suppressed_mass(&partitions, config.k) > config.k as u64 {
        let qid_name = choose_qid_to_generalize(&partitions, config)?;
        log::trace!("generalizing '{qid_name}' across {} partitions", partitions.len());
        partitions = generalize(partitions, &qid_name, config)?;
        partitions = merge_duplicates(partitions, config);
    }

    let partitions = close_out(partitions, config);

    let total: u64 = partitions.iter().map(|p| p.count).sum();
    if total != config.dataset_size {
        return Err(Error::Invariant(format!(
            "final partitions carry {total} records, expected {}",
            config.dataset_size
        )));
    }

    Ok(partitions)
}

fn suppressed_mass(partitions: &[Partition], k: u32) -> u64 {
    partitions.iter().filter(|p| p.count < k as u64).map(|p| p.count).sum()
}

/// Cartesian product of per-QID candidate generalizations, dropping
/// combinations the backend reports as empty (`spec.md` §4.4 "Initial
/// partitions").
fn generate_initial_partitions<B: Backend>(backend: &B, config: &Config) -> Result<Vec<Partition>> {
    let mut combinations: Vec<HashMap<String, Attribute>> = vec![HashMap::new()];

    for name in &config.qid_names {
        let tuning = config.datafly_tuning.get(name).copied().unwrap_or_default();

        let candidates = match config.qid_types[name] {
            QidType::Numerical | QidType::Date => {
                let num_buckets = tuning.num_of_buckets.unwrap_or(0);
                if num_buckets == 0 {
                    continue;
                }
                let is_date = config.qid_types[name] == QidType::Date;
                backend
                    .spread_attribute_into_uniform_buckets(name, num_buckets)
                    .map_err(|e| Error::Backend(e.to_string()))?
                    .into_iter()
                    .map(|range| numeric_attribute(name, range.min, range.max, is_date))
                    .collect::<Vec<_>>()
            }
            QidType::Hierarchical => {
                let level = tuning.initial_level.unwrap_or(0);
                if level == 0 {
                    continue;
                }
                let tree = match &config.attr_metadata[name] {
                    AttrMetadata::Hierarchical(tree) => tree.clone(),
                    _ => unreachable!("hierarchical QID must carry a GenTree"),
                };
                tree.root()
                    .values_on_level(level as usize)?
                    .into_iter()
                    .map(|value| hierarchical_attribute(name, &tree, &value))
                    .collect()
            }
            QidType::Ip => continue,
        };

        combinations = combine(combinations, name, candidates);
    }

    let mut partitions = Vec::new();
    for attrs in combinations {
        if attrs.is_empty() {
            continue;
        }
        let count = backend.document_count(Some(&attrs)).map_err(|e| Error::Backend(e.to_string()))?;
        if count == 0 {
            continue;
        }
        partitions.push(Partition::new(count, attrs));
    }
    Ok(partitions)
}

fn combine(
    existing: Vec<HashMap<String, Attribute>>,
    name: &str,
    candidates: Vec<Attribute>,
) -> Vec<HashMap<String, Attribute>> {
    let mut out = Vec::with_capacity(existing.len() * candidates.len().max(1));
    for base in &existing {
        for candidate in &candidates {
            let mut combined = base.clone();
            combined.insert(name.to_string(), candidate.clone());
            out.push(combined);
        }
    }
    out
}

fn numeric_attribute(name: &str, min: i64, max: i64, is_date: bool) -> Attribute {
    let kind = if is_date {
        AttributeKind::DateRange { min, max, limits: None }
    } else {
        AttributeKind::IntegerRange { min, max, limits: None }
    };
    Attribute {
        name: name.to_string(),
        width: max - min,
        gen_value: if min == max { min.to_string() } else { format!("{min},{max}") },
        split_allowed: min != max,
        kind,
    }
}

fn hierarchical_attribute(name: &str, tree: &Arc<GenTree>, value: &str) -> Attribute {
    let node = tree.node(value).expect("values_on_level must resolve to nodes of its own tree");
    Attribute {
        name: name.to_string(),
        width: node.leaf_count() as i64,
        gen_value: node.value().to_string(),
        split_allowed: node.has_children(),
        kind: AttributeKind::Hierarchical { tree: tree.clone() },
    }
}

/// Among QIDs still present (and still mergeable — more than one distinct
/// value) in the current partition set, the one with the most distinct
/// generalized values; ties keep the first in `config.qid_names` order.
fn choose_qid_to_generalize(partitions: &[Partition], config: &Config) -> Result<String> {
    let mut best: Option<(&str, usize)> = None;

    for name in &config.qid_names {
        let mut distinct = HashSet::new();
        let mut present = false;
        for partition in partitions {
            if let Some(attr) = partition.attributes.get(name) {
                present = true;
                distinct.insert(attr.gen_value.clone());
            }
        }
        if !present || distinct.len() < 2 {
            continue;
        }

        match best {
            Some((_, best_count)) if best_count >= distinct.len() => {}
            _ => best = Some((name, distinct.len())),
        }
    }

    best.map(|(name, _)| name.to_string())
        .ok_or_else(|| Error::Invariant("Datafly iteration has no QID left to generalize".to_string()))
}

fn generalize(partitions: Vec<Partition>, qid_name: &str, config: &Config) -> Result<Vec<Partition>> {
    match config.qid_types[qid_name] {
        QidType::Numerical => Ok(generalize_numeric(partitions, qid_name, false)),
        QidType::Date => Ok(generalize_numeric(partitions, qid_name, true)),
        QidType::Hierarchical => {
            let tree = match &config.attr_metadata[qid_name] {
                AttrMetadata::Hierarchical(tree) => tree.clone(),
                _ => unreachable!("hierarchical QID must carry a GenTree"),
            };
            Ok(generalize_hierarchical(partitions, qid_name, &tree))
        }
        QidType::Ip => Err(Error::Invariant(format!("QID '{qid_name}' has no Datafly generalization path"))),
    }
}

/// Pairs adjacent distinct ranges at indices `2i`/`2i+1` (`spec.md` §9,
/// resolved open question); a trailing unpaired range passes through
/// unchanged.
fn generalize_numeric(partitions: Vec<Partition>, qid_name: &str, is_date: bool) -> Vec<Partition> {
    let mut distinct: Vec<(i64, i64)> = Vec::new();
    for partition in &partitions {
        if let Some((min, max)) = range_of(partition, qid_name) {
            if !distinct.contains(&(min, max)) {
                distinct.push((min, max));
            }
        }
    }
    distinct.sort_unstable();

    let mut merge_into: HashMap<(i64, i64), (i64, i64)> = HashMap::new();
    for chunk in distinct.chunks(2) {
        if chunk.len() == 2 {
            let merged = (chunk[0].0, chunk[1].1);
            merge_into.insert(chunk[0], merged);
            merge_into.insert(chunk[1], merged);
        } else {
            merge_into.insert(chunk[0], chunk[0]);
        }
    }

    partitions
        .into_iter()
        .map(|mut partition| {
            if let Some((min, max)) = range_of(&partition, qid_name) {
                if let Some(&(new_min, new_max)) = merge_into.get(&(min, max)) {
                    let merged = numeric_attribute(qid_name, new_min, new_max, is_date);
                    partition.attributes.insert(qid_name.to_string(), merged);
                }
            }
            partition
        })
        .collect()
}

fn range_of(partition: &Partition, qid_name: &str) -> Option<(i64, i64)> {
    match partition.attributes.get(qid_name).map(|attr| &attr.kind) {
        Some(AttributeKind::IntegerRange { min, max, .. }) | Some(AttributeKind::DateRange { min, max, .. }) => {
            Some((*min, *max))
        }
        _ => None,
    }
}

/// Generalizes every partition whose node for this QID sits at the current
/// maximum level to its direct parent; shallower partitions wait for others
/// to catch up (`spec.md` §4.4 "Hierarchical QID").
fn generalize_hierarchical(partitions: Vec<Partition>, qid_name: &str, tree: &Arc<GenTree>) -> Vec<Partition> {
    let max_level = partitions
        .iter()
        .filter_map(|partition| partition.attributes.get(qid_name))
        .filter_map(|attr| tree.node(&attr.gen_value).map(|node| node.level()))
        .max()
        .unwrap_or(0);

    partitions
        .into_iter()
        .map(|mut partition| {
            if let Some(attr) = partition.attributes.get(qid_name) {
                if let Some(node) = tree.node(&attr.gen_value) {
                    if node.level() == max_level {
                        if let Some(parent) = node.parent() {
                            let generalized = Attribute {
                                name: qid_name.to_string(),
                                width: parent.leaf_count() as i64,
                                gen_value: parent.value().to_string(),
                                split_allowed: parent.has_children(),
                                kind: AttributeKind::Hierarchical { tree: tree.clone() },
                            };
                            partition.attributes.insert(qid_name.to_string(), generalized);
                        }
                    }
                }
            }
            partition
        })
        .collect()
}

fn merge_duplicates(partitions: Vec<Partition>, config: &Config) -> Vec<Partition> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Partition> = HashMap::new();

    for partition in partitions {
        let signature = partition.signature(config);
        match merged.get_mut(&signature) {
            Some(existing) => existing.count += partition.count,
            None => {
                order.push(signature.clone());
                merged.insert(signature, partition);
            }
        }
    }

    order.into_iter().map(|signature| merged.remove(&signature).unwrap()).collect()
}

/// Any QID absent from a partition's attribute map (`initial_level = 0` or
/// `num_of_buckets = 0`) is set to its root generalization.
fn close_out(partitions: Vec<Partition>, config: &Config) -> Vec<Partition> {
    partitions
        .into_iter()
        .map(|mut partition| {
            for name in &config.qid_names {
                if !partition.attributes.contains_key(name) {
                    partition.attributes.insert(name.clone(), Attribute::root(name, &config.attr_metadata[name]));
                }
            }
            partition
        })
        .collect()
}

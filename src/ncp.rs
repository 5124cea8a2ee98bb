//! Normalized Certainty Penalty: the information-loss metric used to
//! compare anonymization runs. See `spec.md` §4.5.

use crate::config::Config;
use crate::partition::Partition;

/// The dataset-wide NCP, as a percentage in `[0, 100]`.
///
/// `sum(partition.weighted_ncp_term(config) for partition in partitions)`,
/// divided by the number of QIDs and the dataset size, times 100.
pub fn normalized_certainty_penalty(partitions: &[Partition], config: &Config) -> f64 {
    if config.qid_names.is_empty() || config.dataset_size == 0 {
        return 0.0;
    }

    let total: f64 = partitions.iter().map(|partition| partition.weighted_ncp_term(config)).sum();
    100.0 * total / (config.qid_names.len() as f64 * config.dataset_size as f64)
}

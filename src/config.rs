//! Resolved, immutable run parameters. See `spec.md` §3 ("Config") and §6.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::gentree::{GenTree, GenTreeSpec};
use crate::numrange::NumRange;

/// The `{ type, [tree], [datafly_init_level], [datafly_num_of_buckets] }`
/// shape of one QID entry in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawQid {
    #[serde(rename = "type")]
    pub qid_type: String,
    pub tree: Option<GenTreeSpec>,
    #[serde(default)]
    pub datafly_init_level: Option<u32>,
    #[serde(default)]
    pub datafly_num_of_buckets: Option<u32>,
}

/// The on-disk configuration document, as described in `spec.md` §6.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub k: u32,
    pub qids: HashMap<String, RawQid>,
    #[serde(default)]
    pub sensitive_attributes: Vec<String>,
}

/// The resolved type tag of a QID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QidType {
    Hierarchical,
    Numerical,
    Date,
    Ip,
}

impl QidType {
    fn parse(s: &str) -> Result<QidType> {
        match s {
            "hierarchical" => Ok(QidType::Hierarchical),
            "numerical" => Ok(QidType::Numerical),
            "date" => Ok(QidType::Date),
            "ip" => Ok(QidType::Ip),
            other => Err(Error::Configuration(format!("unknown QID type '{other}'"))),
        }
    }
}

/// The root generalization metadata for one QID: either a taxonomy tree, a
/// numeric interval, or (for IP QIDs) a fixed bit width.
#[derive(Debug, Clone)]
pub enum AttrMetadata {
    Hierarchical(Arc<GenTree>),
    Range(NumRange),
    Ip { bits: u32 },
}

impl AttrMetadata {
    /// `len(root_metadata)`, the denominator of normalized width.
    pub fn len(&self) -> i64 {
        match self {
            AttrMetadata::Hierarchical(tree) => tree.len() as i64,
            AttrMetadata::Range(range) => range.len(),
            AttrMetadata::Ip { bits } => *bits as i64,
        }
    }
}

/// Per-QID Datafly tuning: `initial_level` for hierarchical QIDs,
/// `num_of_buckets` for numerical/date QIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataflyTuning {
    pub initial_level: Option<u32>,
    pub num_of_buckets: Option<u32>,
}

/// Resolved, immutable, process-wide run parameters. Shared read-only across
/// the whole run (see `spec.md` §3, Ownership).
#[derive(Debug, Clone)]
pub struct Config {
    pub k: u32,
    pub qid_names: Vec<String>,
    pub sensitive_attributes: Vec<String>,
    pub qid_types: HashMap<String, QidType>,
    pub datafly_tuning: HashMap<String, DataflyTuning>,
    pub attr_metadata: HashMap<String, AttrMetadata>,
    pub dataset_size: u64,
}

impl Config {
    /// Resolves a `Config` from its raw, on-disk shape, querying the backend
    /// for numeric-QID bounds and the total dataset size. See `spec.md`
    /// §4.7 / `utils/config_processor.py::parse_config` in the original.
    pub fn resolve<B: Backend>(raw: RawConfig, backend: &B) -> Result<Config> {
        if raw.k < 2 {
            return Err(Error::Configuration(format!("k must be >= 2, got {}", raw.k)));
        }

        // QID order: insertion order is not preserved by a HashMap, so fix a
        // deterministic order (sorted by name) for the ordered-iteration
        // invariant the algorithms rely on (`spec.md` §3/§5).
        let mut qid_names: Vec<String> = raw.qids.keys().cloned().collect();
        qid_names.sort();

        let mut qid_types = HashMap::new();
        let mut datafly_tuning = HashMap::new();
        let mut attr_metadata = HashMap::new();

        for name in &qid_names {
            let raw_qid = &raw.qids[name];
            let qid_type = QidType::parse(&raw_qid.qid_type)?;
            qid_types.insert(name.clone(), qid_type);

            datafly_tuning.insert(
                name.clone(),
                DataflyTuning {
                    initial_level: raw_qid.datafly_init_level,
                    num_of_buckets: raw_qid.datafly_num_of_buckets,
                },
            );

            let metadata = match qid_type {
                QidType::Hierarchical => {
                    let spec = raw_qid.tree.as_ref().ok_or_else(|| {
                        Error::Configuration(format!("QID '{name}' is hierarchical but has no tree"))
                    })?;
                    AttrMetadata::Hierarchical(GenTree::build(spec))
                }
                QidType::Numerical | QidType::Date => {
                    let (min, max) = backend
                        .attribute_min_max(name, None)
                        .map_err(|e| Error::Backend(e.to_string()))?;
                    AttrMetadata::Range(NumRange::new(min, max))
                }
                QidType::Ip => AttrMetadata::Ip { bits: 32 },
            };
            attr_metadata.insert(name.clone(), metadata);
        }

        let dataset_size = backend
            .document_count(None)
            .map_err(|e| Error::Backend(e.to_string()))?;

        Ok(Config {
            k: raw.k,
            qid_names,
            sensitive_attributes: raw.sensitive_attributes,
            qid_types,
            datafly_tuning,
            attr_metadata,
            dataset_size,
        })
    }

    /// `len(root_metadata)` for the named QID, used to normalize widths.
    pub fn root_len(&self, qid_name: &str) -> i64 {
        self.attr_metadata[qid_name].len()
    }
}

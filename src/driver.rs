//! Selects algorithm and backend, resolves `Config`, runs, and reports the
//! NCP metric. See `spec.md` §2 "Driver" and §6 "CLI surface".

use std::fmt;

use crate::algorithms::{datafly, mondrian};
use crate::backend::Backend;
use crate::config::{Config, RawConfig};
use crate::error::{Error, Result};
use crate::ncp::normalized_certainty_penalty;
use crate::partition::Partition;

/// Which anonymization algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Mondrian,
    Datafly,
}

impl Algorithm {
    pub fn parse(s: &str) -> Result<Algorithm> {
        match s {
            "mondrian" => Ok(Algorithm::Mondrian),
            "datafly" => Ok(Algorithm::Datafly),
            other => Err(Error::Configuration(format!("unknown algorithm '{other}'"))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Mondrian => "mondrian",
            Algorithm::Datafly => "datafly",
        };
        write!(f, "{name}")
    }
}

/// The outcome of one run.
pub struct RunReport {
    pub partitions: Vec<Partition>,
    pub ncp: f64,
}

/// Resolves `Config`, runs the chosen algorithm, and persists the result
/// through the backend (`spec.md` §2 "Control flow").
pub fn run<B: Backend>(algorithm: Algorithm, raw_config: RawConfig, backend: &mut B) -> Result<RunReport> {
    log::info!("resolving configuration (k={})", raw_config.k);
    let config = Config::resolve(raw_config, &*backend)?;

    log::info!("running {algorithm} over {} records", config.dataset_size);
    let partitions = match algorithm {
        Algorithm::Mondrian => mondrian::run(&*backend, &config)?,
        Algorithm::Datafly => datafly::run(&*backend, &config)?,
    };
    log::info!("produced {} partitions", partitions.len());

    let ncp = normalized_certainty_penalty(&partitions, &config);
    log::info!("NCP = {ncp:.2}%");

    backend.push_partitions(&partitions, &config).map_err(|e| Error::Backend(e.to_string()))?;

    Ok(RunReport { partitions, ncp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{FieldValue, InMemoryBackend, Record};
    use crate::config::RawQid;
    use std::collections::HashMap;

    fn record(age: i64) -> Record {
        let mut r = HashMap::new();
        r.insert("age".to_string(), FieldValue::Int(age));
        r.insert("diagnosis".to_string(), FieldValue::Str("flu".to_string()));
        r
    }

    #[test]
    fn mondrian_run_produces_k_anonymous_published_output() {
        let records: Vec<Record> = vec![10, 20, 30, 40].into_iter().map(record).collect();
        let mut backend = InMemoryBackend::new(records);

        let mut qids = HashMap::new();
        qids.insert(
            "age".to_string(),
            RawQid { qid_type: "numerical".to_string(), tree: None, datafly_init_level: None, datafly_num_of_buckets: None },
        );
        let raw_config = RawConfig { k: 2, qids, sensitive_attributes: vec!["diagnosis".to_string()] };

        let report = run(Algorithm::Mondrian, raw_config, &mut backend).unwrap();
        assert_eq!(report.partitions.len(), 2);
        assert!(report.ncp >= 0.0 && report.ncp <= 100.0);
        assert_eq!(backend.published.len(), 4);
        assert!(backend.published.iter().all(|r| r.contains_key("diagnosis") && r.contains_key("age")));
    }

    #[test]
    fn algorithm_parse_rejects_unknown_names() {
        assert!(Algorithm::parse("mondrian").is_ok());
        assert!(Algorithm::parse("datafly").is_ok());
        assert!(Algorithm::parse("bogus").is_err());
    }
}

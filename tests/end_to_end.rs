//! Integration tests exercising the full `Config::resolve` -> algorithm ->
//! `push_partitions` path against `InMemoryBackend`, as a black box would
//! drive the crate. See `spec.md` §8 scenarios S1 and S6.

use std::collections::HashMap;

use kanon::backend::memory::{FieldValue, InMemoryBackend, Record};
use kanon::driver::{self, Algorithm};
use kanon::{Config, RawConfig, RawQid};

fn numeric_qid() -> RawQid {
    RawQid { qid_type: "numerical".to_string(), tree: None, datafly_init_level: None, datafly_num_of_buckets: None }
}

fn int_record(age: i64, diagnosis: &str) -> Record {
    let mut r = HashMap::new();
    r.insert("age".to_string(), FieldValue::Int(age));
    r.insert("diagnosis".to_string(), FieldValue::Str(diagnosis.to_string()));
    r
}

#[test]
fn mondrian_end_to_end_is_k_anonymous_and_conserves_records() {
    let ages = [12, 15, 19, 22, 31, 45, 52, 60, 61, 63];
    let records: Vec<Record> = ages.iter().map(|&a| int_record(a, "flu")).collect();
    let mut backend = InMemoryBackend::new(records);

    let mut qids = HashMap::new();
    qids.insert("age".to_string(), numeric_qid());
    let raw_config = RawConfig { k: 3, qids, sensitive_attributes: vec!["diagnosis".to_string()] };

    let report = driver::run(Algorithm::Mondrian, raw_config, &mut backend).unwrap();

    assert!(report.partitions.iter().all(|p| p.count >= 3));
    let total: u64 = report.partitions.iter().map(|p| p.count).sum();
    assert_eq!(total, ages.len() as u64);
    assert!(report.ncp >= 0.0 && report.ncp <= 100.0);

    assert_eq!(backend.published.len(), ages.len());
    for record in &backend.published {
        assert!(record.contains_key("age"));
        assert_eq!(record.get("diagnosis").map(String::as_str), Some("flu"));
    }
}

#[test]
fn datafly_end_to_end_is_k_anonymous_and_conserves_records() {
    let records: Vec<Record> = (0..30).map(|i| int_record(i, "check-up")).collect();
    let mut backend = InMemoryBackend::new(records);

    let mut qids = HashMap::new();
    qids.insert(
        "age".to_string(),
        RawQid { qid_type: "numerical".to_string(), tree: None, datafly_init_level: None, datafly_num_of_buckets: Some(6) },
    );
    let raw_config = RawConfig { k: 6, qids, sensitive_attributes: vec!["diagnosis".to_string()] };

    let report = driver::run(Algorithm::Datafly, raw_config, &mut backend).unwrap();

    assert!(report.partitions.iter().all(|p| p.count >= 6));
    let total: u64 = report.partitions.iter().map(|p| p.count).sum();
    assert_eq!(total, 30);
    assert_eq!(backend.published.len(), 30);
}

#[test]
fn configuration_error_rejects_k_below_two() {
    let records = vec![int_record(10, "flu")];
    let backend = InMemoryBackend::new(records);

    let mut qids = HashMap::new();
    qids.insert("age".to_string(), numeric_qid());
    let raw_config = RawConfig { k: 1, qids, sensitive_attributes: vec![] };

    let err = Config::resolve(raw_config, &backend).unwrap_err();
    assert!(err.to_string().contains("k must be"));
}

#[test]
fn configuration_error_rejects_unknown_qid_type() {
    let records = vec![int_record(10, "flu")];
    let backend = InMemoryBackend::new(records);

    let mut qids = HashMap::new();
    qids.insert(
        "age".to_string(),
        RawQid { qid_type: "nonsense".to_string(), tree: None, datafly_init_level: None, datafly_num_of_buckets: None },
    );
    let raw_config = RawConfig { k: 2, qids, sensitive_attributes: vec![] };

    let err = Config::resolve(raw_config, &backend).unwrap_err();
    assert!(err.to_string().contains("unknown QID type"));
}

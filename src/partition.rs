//! A multiset of source records characterized by one `Attribute` per QID.
//! See `spec.md` §3 ("Partition").

use std::collections::HashMap;

use crate::attribute::Attribute;
use crate::config::Config;

/// One equivalence class under construction (Mondrian) or in its initial /
/// merged form (Datafly).
#[derive(Debug, Clone)]
pub struct Partition {
    pub count: u64,
    pub attributes: HashMap<String, Attribute>,
}

impl Partition {
    pub fn new(count: u64, attributes: HashMap<String, Attribute>) -> Partition {
        debug_assert!(count > 0, "a partition must describe at least one record");
        Partition { count, attributes }
    }

    /// The ordered concatenation of `(qid, generalized value)` pairs, used
    /// as the de-duplication key for Datafly's merge step. Ordering follows
    /// `config.qid_names`, not HashMap iteration order (`spec.md` §3, §5).
    pub fn signature(&self, config: &Config) -> String {
        let mut out = String::new();
        for name in &config.qid_names {
            if let Some(attr) = self.attributes.get(name) {
                out.push_str(name);
                out.push('=');
                out.push_str(&attr.gen_value);
                out.push(';');
            }
        }
        out
    }

    /// Sum of normalized widths across every QID, weighted by this
    /// partition's count — the per-partition term of the NCP metric
    /// (`spec.md` §4.5), before the caller sums across partitions.
    pub fn weighted_ncp_term(&self, config: &Config) -> f64 {
        let width_sum: f64 = config
            .qid_names
            .iter()
            .filter_map(|name| self.attributes.get(name))
            .map(|attr| attr.normalized_width(config))
            .sum();

        width_sum * self.count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeKind};
    use crate::config::{AttrMetadata, Config, QidType};
    use crate::numrange::NumRange;
    use std::collections::HashMap;

    fn tiny_config() -> Config {
        let mut attr_metadata = HashMap::new();
        attr_metadata.insert("age".to_string(), AttrMetadata::Range(NumRange::new(10, 40)));

        let mut qid_types = HashMap::new();
        qid_types.insert("age".to_string(), QidType::Numerical);

        Config {
            k: 2,
            qid_names: vec!["age".to_string()],
            sensitive_attributes: vec![],
            qid_types,
            datafly_tuning: HashMap::new(),
            attr_metadata,
            dataset_size: 4,
        }
    }

    fn int_attr(name: &str, min: i64, max: i64) -> Attribute {
        Attribute {
            name: name.to_string(),
            width: max - min,
            gen_value: if min == max { min.to_string() } else { format!("{min},{max}") },
            split_allowed: min != max,
            kind: AttributeKind::IntegerRange { min, max, limits: None },
        }
    }

    #[test]
    fn signature_is_ordered_by_config_qid_order() {
        let config = tiny_config();
        let mut attrs = HashMap::new();
        attrs.insert("age".to_string(), int_attr("age", 10, 20));
        let partition = Partition::new(2, attrs);
        assert_eq!(partition.signature(&config), "age=10,20;");
    }
}

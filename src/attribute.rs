//! The generalization state of one QID within one partition. See `spec.md`
//! §3 ("Attribute") and §4.2 ("Attribute splitting").
//!
//! `Attribute` is treated as value-like throughout the algorithms: splitting
//! always produces fresh `Attribute`s rather than mutating one shared by
//! multiple partitions (`spec.md` §5, §9 "Avoid alias mutation").

use std::sync::Arc;

use crate::config::{AttrMetadata, Config};
use crate::gentree::GenTree;

/// The per-variant state of an `Attribute`.
#[derive(Debug, Clone)]
pub enum AttributeKind {
    Hierarchical { tree: Arc<GenTree> },
    IntegerRange { min: i64, max: i64, limits: Option<[(i64, i64); 2]> },
    DateRange { min: i64, max: i64, limits: Option<[(i64, i64); 2]> },
    /// `base` is the IPv4 address as a big-endian u32; `mask` is the number
    /// of fixed high-order bits of the current generalization (0..=31).
    IpRange { base: u32, mask: u8 },
}

/// The generalization state of one QID within one partition.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub width: i64,
    pub gen_value: String,
    pub split_allowed: bool,
    pub kind: AttributeKind,
}

impl Attribute {
    /// The root (least-generalized... i.e. fully-generalized / widest)
    /// attribute for a QID, from its shared metadata. This is the starting
    /// point of both Mondrian's initial whole-dataset partition and
    /// Datafly's root-generalization close-out.
    pub fn root(name: &str, metadata: &AttrMetadata) -> Attribute {
        match metadata {
            AttrMetadata::Hierarchical(tree) => {
                let root = tree.root();
                Attribute {
                    name: name.to_string(),
                    width: root.leaf_count() as i64,
                    gen_value: root.value().to_string(),
                    split_allowed: root.has_children(),
                    kind: AttributeKind::Hierarchical { tree: tree.clone() },
                }
            }
            AttrMetadata::Range(range) => Attribute {
                name: name.to_string(),
                width: range.width(),
                gen_value: range.value(),
                split_allowed: range.min != range.max,
                kind: AttributeKind::IntegerRange { min: range.min, max: range.max, limits: None },
            },
            AttrMetadata::Ip { bits } => Attribute {
                name: name.to_string(),
                width: *bits as i64,
                gen_value: "0.0.0.0/0".to_string(),
                split_allowed: true,
                kind: AttributeKind::IpRange { base: 0, mask: 0 },
            },
        }
    }

    /// `width / len(root_metadata)`.
    pub fn normalized_width(&self, config: &Config) -> f64 {
        let root_len = config.root_len(&self.name) as f64;
        if root_len == 0.0 {
            0.0
        } else {
            self.width as f64 / root_len
        }
    }

    /// Returns a clone of this attribute with `split_allowed` set, without
    /// mutating whatever else holds a reference to the original (`spec.md`
    /// §9 "Avoid alias mutation").
    pub fn with_split_allowed(&self, split_allowed: bool) -> Attribute {
        let mut clone = self.clone();
        clone.split_allowed = split_allowed;
        clone
    }

    /// Refreshes an integer/date-range attribute's recorded min/max and
    /// width/gen_value in place (as a fresh clone) to reflect a tighter
    /// in-partition bound, without discarding any `limits` already set.
    /// `spec.md` §9: "the refresh is always kept (it is a tightening, never
    /// a loosening)."
    pub fn with_refreshed_bounds(&self, min: i64, max: i64) -> Attribute {
        let mut clone = self.clone();
        match &mut clone.kind {
            AttributeKind::IntegerRange { min: m, max: x, .. } | AttributeKind::DateRange { min: m, max: x, .. } => {
                *m = min;
                *x = max;
            }
            _ => panic!("with_refreshed_bounds only applies to range attributes"),
        }
        clone.width = max - min;
        clone.gen_value = if min == max { min.to_string() } else { format!("{min},{max}") };
        clone
    }

    /// Sets the `[(lo1,hi1),(lo2,hi2)]` sub-range pair a Mondrian numeric
    /// split will materialize into child attributes via `split()`.
    pub fn with_limits(&self, new_limits: [(i64, i64); 2]) -> Attribute {
        let mut clone = self.clone();
        match &mut clone.kind {
            AttributeKind::IntegerRange { limits, .. } | AttributeKind::DateRange { limits, .. } => {
                *limits = Some(new_limits);
            }
            _ => panic!("with_limits only applies to range attributes"),
        }
        clone
    }

    /// Maps this attribute to the `Attribute`s that would result from
    /// advancing generalization one step. Empty iff this attribute cannot be
    /// split further along its own axis at all (e.g. a leaf tree node) —
    /// k-anonymity rejection of a split is the caller's concern, not this
    /// method's (`spec.md` §4.2 / §4.3).
    pub fn split(&self) -> Vec<Attribute> {
        match &self.kind {
            AttributeKind::Hierarchical { tree } => {
                let node = tree
                    .node(&self.gen_value)
                    .expect("gen_value must resolve to a node in its own tree");
                node.children()
                    .map(|child| Attribute {
                        name: self.name.clone(),
                        width: child.leaf_count() as i64,
                        gen_value: child.value().to_string(),
                        split_allowed: child.has_children(),
                        kind: AttributeKind::Hierarchical { tree: tree.clone() },
                    })
                    .collect()
            }
            AttributeKind::IntegerRange { limits, .. } => self.split_range(*limits, false),
            AttributeKind::DateRange { limits, .. } => self.split_range(*limits, true),
            AttributeKind::IpRange { base, mask } => self.split_ip(*base, *mask),
        }
    }

    fn split_range(&self, limits: Option<[(i64, i64); 2]>, is_date: bool) -> Vec<Attribute> {
        let limits = match limits {
            Some(l) => l,
            None => return Vec::new(),
        };

        limits
            .into_iter()
            .map(|(lo, hi)| {
                let kind = if is_date {
                    AttributeKind::DateRange { min: lo, max: hi, limits: None }
                } else {
                    AttributeKind::IntegerRange { min: lo, max: hi, limits: None }
                };
                Attribute {
                    name: self.name.clone(),
                    width: hi - lo,
                    gen_value: if lo == hi { lo.to_string() } else { format!("{lo},{hi}") },
                    split_allowed: lo != hi,
                    kind,
                }
            })
            .collect()
    }

    fn split_ip(&self, base: u32, mask: u8) -> Vec<Attribute> {
        if mask >= 31 {
            return Vec::new();
        }

        let new_mask = mask + 1;
        let bit = 1u32 << (31 - mask);

        (0..2u32)
            .map(|b| {
                let child_base = if b == 0 { base & !bit } else { base | bit };
                Attribute {
                    name: self.name.clone(),
                    width: (32 - new_mask) as i64,
                    gen_value: format_cidr(child_base, new_mask),
                    split_allowed: new_mask < 31,
                    kind: AttributeKind::IpRange { base: child_base, mask: new_mask },
                }
            })
            .collect()
    }
}

fn format_cidr(base: u32, mask: u8) -> String {
    let octets = base.to_be_bytes();
    format!("{}.{}.{}.{}/{}", octets[0], octets[1], octets[2], octets[3], mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gentree::{GenTree, GenTreeSpec};

    fn spec(value: &str, children: Vec<GenTreeSpec>) -> GenTreeSpec {
        GenTreeSpec { value: value.to_string(), children }
    }

    #[test]
    fn hierarchical_split_children_inherit_split_allowed() {
        let tree_spec = spec("*", vec![spec("A", vec![spec("A1", vec![]), spec("A2", vec![])]), spec("B", vec![])]);
        let tree = GenTree::build(&tree_spec);
        let root = Attribute::root("job", &AttrMetadata::Hierarchical(tree));

        let children = root.split();
        assert_eq!(children.len(), 2);
        let a = children.iter().find(|a| a.gen_value == "A").unwrap();
        assert!(a.split_allowed);
        let b = children.iter().find(|a| a.gen_value == "B").unwrap();
        assert!(!b.split_allowed);
    }

    #[test]
    fn numeric_split_without_limits_is_empty() {
        let attr = Attribute::root("age", &AttrMetadata::Range(crate::numrange::NumRange::new(10, 40)));
        assert!(attr.split().is_empty());
    }

    #[test]
    fn numeric_split_with_limits_produces_two_children() {
        let attr = Attribute::root("age", &AttrMetadata::Range(crate::numrange::NumRange::new(10, 40)));
        let attr = attr.with_limits([(10, 20), (30, 40)]);
        let children = attr.split();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].gen_value, "10,20");
        assert_eq!(children[1].gen_value, "30,40");
        assert!(children[0].split_allowed);
    }

    #[test]
    fn numeric_split_collapses_to_point() {
        let attr = Attribute::root("age", &AttrMetadata::Range(crate::numrange::NumRange::new(10, 40)));
        let attr = attr.with_limits([(10, 10), (11, 40)]);
        let children = attr.split();
        assert_eq!(children[0].gen_value, "10");
        assert!(!children[0].split_allowed);
    }

    #[test]
    fn ip_split_bisects_mask() {
        let attr = Attribute::root("ip", &AttrMetadata::Ip { bits: 32 });
        let children = attr.split();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| matches!(c.kind, AttributeKind::IpRange { mask: 1, .. })));
    }

    #[test]
    fn ip_split_closes_at_mask_31() {
        let attr = Attribute {
            name: "ip".to_string(),
            width: 1,
            gen_value: "0.0.0.0/31".to_string(),
            split_allowed: true,
            kind: AttributeKind::IpRange { base: 0, mask: 31 },
        };
        assert!(attr.split().is_empty());
    }
}

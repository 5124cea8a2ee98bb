//! Generalization hierarchies (taxonomy trees) for categorical QIDs.
//!
//! A `GenTree` is built once, bottom-up in terms of leaf-count propagation,
//! from a nested `{value, children}` description, and is shared by reference
//! (via `Arc`) across every partition of a run. See `spec.md` §3 and §4.1.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};

/// The JSON-like nested description a `GenTree` is parsed from.
#[derive(Debug, Clone, Deserialize)]
pub struct GenTreeSpec {
    pub value: String,
    #[serde(default)]
    pub children: Vec<GenTreeSpec>,
}

#[derive(Debug)]
struct Node {
    value: String,
    level: usize,
    /// Nearest-first: `ancestors[0]` is the direct parent.
    ancestors: Vec<usize>,
    children: Vec<usize>,
    /// value -> node id, scoped to the subtree rooted at this node.
    covered: HashMap<String, usize>,
    leaf_count: usize,
}

/// A rooted taxonomy tree over a categorical QID's domain.
#[derive(Debug)]
pub struct GenTree {
    nodes: Vec<Node>,
}

impl GenTree {
    /// Builds a `GenTree` from its root's nested description.
    pub fn build(spec: &GenTreeSpec) -> Arc<GenTree> {
        let mut nodes = Vec::new();
        build_node(spec, &[], &mut nodes);
        Arc::new(GenTree { nodes })
    }

    /// The root node of the tree.
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef { tree: self, id: 0 }
    }

    /// Looks up a node by value, starting from the root's covered-nodes index.
    pub fn node(&self, value: &str) -> Option<NodeRef<'_>> {
        self.root().node(value)
    }

    /// The root's leaf-count, i.e. `len(tree)`.
    pub fn len(&self) -> usize {
        self.root().leaf_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_node(spec: &GenTreeSpec, ancestors: &[usize], nodes: &mut Vec<Node>) -> usize {
    let id = nodes.len();
    let level = ancestors.len();

    let mut covered = HashMap::new();
    covered.insert(spec.value.clone(), id);

    nodes.push(Node {
        value: spec.value.clone(),
        level,
        ancestors: ancestors.to_vec(),
        children: Vec::new(),
        covered,
        leaf_count: 0,
    });

    for &ancestor in ancestors {
        nodes[ancestor].covered.insert(spec.value.clone(), id);
    }

    if spec.children.is_empty() {
        for &ancestor in ancestors {
            nodes[ancestor].leaf_count += 1;
        }
        return id;
    }

    let mut child_ancestors = Vec::with_capacity(ancestors.len() + 1);
    child_ancestors.push(id);
    child_ancestors.extend_from_slice(ancestors);

    for child_spec in &spec.children {
        let child_id = build_node(child_spec, &child_ancestors, nodes);
        nodes[id].children.push(child_id);
    }

    id
}

/// A handle to one node of a `GenTree`, borrowing the tree it belongs to.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a GenTree,
    id: usize,
}

impl<'a> NodeRef<'a> {
    pub fn value(&self) -> &'a str {
        &self.tree.nodes[self.id].value
    }

    pub fn level(&self) -> usize {
        self.tree.nodes[self.id].level
    }

    /// Number of descendants with no children. Zero for a leaf node itself.
    pub fn leaf_count(&self) -> usize {
        self.tree.nodes[self.id].leaf_count
    }

    pub fn has_children(&self) -> bool {
        !self.tree.nodes[self.id].children.is_empty()
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        tree.nodes[self.id].children.iter().map(move |&id| NodeRef { tree, id })
    }

    /// The direct parent, if any (`ancestors[0]`).
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.tree.nodes[self.id].ancestors.first().map(|&id| NodeRef { tree: self.tree, id })
    }

    /// Looks up a descendant (or self) by value, within this node's own subtree.
    pub fn node(&self, value: &str) -> Option<NodeRef<'a>> {
        self.tree.nodes[self.id].covered.get(value).map(|&id| NodeRef { tree: self.tree, id })
    }

    /// Enumerates the values of every descendant (including self) at `level`.
    pub fn values_on_level(&self, level: usize) -> Result<Vec<String>> {
        let covered_ids: std::collections::HashSet<usize> =
            self.tree.nodes[self.id].covered.values().copied().collect();

        let values: Vec<String> = covered_ids
            .into_iter()
            .map(|id| &self.tree.nodes[id])
            .filter(|node| node.level == level)
            .map(|node| node.value.clone())
            .collect();

        if values.is_empty() {
            return Err(Error::Configuration(format!(
                "level {level} does not exist in the generalization hierarchy"
            )));
        }

        Ok(values)
    }

    /// Enumerates the leaf values of this node's subtree.
    pub fn leaf_values(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<String>) {
        if self.has_children() {
            for child in self.children() {
                child.collect_leaves(out);
            }
        } else {
            out.push(self.value().to_string());
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(value: &str, children: Vec<GenTreeSpec>) -> GenTreeSpec {
        GenTreeSpec { value: value.to_string(), children }
    }

    fn job_tree_spec() -> GenTreeSpec {
        spec(
            "*",
            vec![
                spec("A", vec![spec("A1", vec![]), spec("A2", vec![])]),
                spec("B", vec![]),
            ],
        )
    }

    #[test]
    fn root_leaf_count_covers_whole_tree() {
        let tree = GenTree::build(&job_tree_spec());
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().value(), "*");
        assert_eq!(tree.root().level(), 0);
    }

    #[test]
    fn leaves_have_zero_leaf_count() {
        let tree = GenTree::build(&job_tree_spec());
        let a1 = tree.node("A1").unwrap();
        assert_eq!(a1.leaf_count(), 0);
        assert!(!a1.has_children());
    }

    #[test]
    fn internal_node_leaf_count_is_descendant_leaves() {
        let tree = GenTree::build(&job_tree_spec());
        let a = tree.node("A").unwrap();
        assert_eq!(a.leaf_count(), 2);
        let b = tree.node("B").unwrap();
        assert_eq!(b.leaf_count(), 0);
    }

    #[test]
    fn node_lookup_from_any_node() {
        let tree = GenTree::build(&job_tree_spec());
        let a = tree.node("A").unwrap();
        assert!(a.node("A1").is_some());
        assert!(a.node("B").is_none());
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let tree = GenTree::build(&job_tree_spec());
        let a1 = tree.node("A1").unwrap();
        assert_eq!(a1.parent().unwrap().value(), "A");
    }

    #[test]
    fn values_on_level() {
        let tree = GenTree::build(&job_tree_spec());
        let level1 = tree.root().values_on_level(1).unwrap();
        let mut level1 = level1;
        level1.sort();
        assert_eq!(level1, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn leaf_values_of_subtree() {
        let tree = GenTree::build(&job_tree_spec());
        let a = tree.node("A").unwrap();
        let mut leaves = a.leaf_values();
        leaves.sort();
        assert_eq!(leaves, vec!["A1".to_string(), "A2".to_string()]);
    }
}

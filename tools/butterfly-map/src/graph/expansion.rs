//! Multi-connection expansion table
//!
//! Overview maps collapse chains of underview nodes into a single edge. The
//! table maps the collapsed edge's `(first, last)` node pair back to the nodes
//! it passes through, so an overview route can be expanded to full detail.

use std::collections::BTreeMap;

use super::NodeId;
use crate::item::ItemId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeExpansionTable {
    entries: BTreeMap<(NodeId, NodeId), Vec<NodeId>>,
}

impl NodeExpansionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the intermediate nodes between `first` and `last`.
    /// Returns the previous list when the pair was already present.
    pub fn add(&mut self, first: NodeId, last: NodeId, intermediate: Vec<NodeId>) -> Option<Vec<NodeId>> {
        self.entries.insert((first, last), intermediate)
    }

    pub fn get(&self, first: NodeId, last: NodeId) -> Option<&[NodeId]> {
        self.entries.get(&(first, last)).map(Vec::as_slice)
    }

    /// Drops every entry whose first or last node belongs to `item`.
    /// Intermediate nodes name underview items and are left alone.
    pub fn remove_item(&mut self, item: ItemId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|&(first, last), _| first.item() != item && last.item() != item);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by `(first, last)`
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId, &[NodeId])> + '_ {
        self.entries
            .iter()
            .map(|(&(first, last), nodes)| (first, last, nodes.as_slice()))
    }

    /// Replaces every adjacent pair of `path` found in the table with the
    /// pair plus its intermediate nodes. Pairs not in the table are kept as is.
    pub fn expand_node_ids(&self, path: &[NodeId]) -> Vec<NodeId> {
        let mut expanded = Vec::with_capacity(path.len());
        let Some(&first) = path.first() else {
            return expanded;
        };
        expanded.push(first);
        for pair in path.windows(2) {
            if let Some(intermediate) = self.entries.get(&(pair[0], pair[1])) {
                expanded.extend_from_slice(intermediate);
            }
            expanded.push(pair[1]);
        }
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: u32) -> NodeId {
        ItemId::new(10, i).node0()
    }

    #[test]
    fn expands_known_pairs_only() {
        let mut table = NodeExpansionTable::new();
        table.add(n(1), n(5), vec![n(2), n(3), n(4)]);
        let path = [n(0), n(1), n(5), n(6)];
        assert_eq!(
            table.expand_node_ids(&path),
            vec![n(0), n(1), n(2), n(3), n(4), n(5), n(6)]
        );
    }

    #[test]
    fn pair_direction_matters() {
        let mut table = NodeExpansionTable::new();
        table.add(n(1), n(5), vec![n(3)]);
        assert_eq!(table.expand_node_ids(&[n(5), n(1)]), vec![n(5), n(1)]);
    }

    #[test]
    fn empty_and_single_paths() {
        let table = NodeExpansionTable::new();
        assert!(table.expand_node_ids(&[]).is_empty());
        assert_eq!(table.expand_node_ids(&[n(7)]), vec![n(7)]);
    }
}

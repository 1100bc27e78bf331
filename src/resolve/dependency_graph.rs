use crate::syntax::SyntaxRef;
use rustc_hash::{FxHashMap, FxHashSet};

/// Which pending work items are blocked on which expressions
#[derive(Debug)]
pub struct DependencyGraph {
    /// Adjacency list: item -> expressions it waits on
    edges: FxHashMap<usize, Vec<SyntaxRef>>,
    /// All blocking expressions
    nodes: FxHashSet<SyntaxRef>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            edges: FxHashMap::default(),
            nodes: FxHashSet::default(),
        }
    }

    /// Record that `item` cannot proceed until `blockers` infer
    pub fn add_dependency(&mut self, item: usize, blockers: Vec<SyntaxRef>) {
        self.nodes.extend(blockers.iter().copied());
        self.edges.insert(item, blockers);
    }

    /// Drop an item once it resolved or was forced
    pub fn remove_item(&mut self, item: usize) -> Option<Vec<SyntaxRef>> {
        self.edges.remove(&item)
    }

    pub fn blockers(&self, item: usize) -> &[SyntaxRef] {
        self.edges.get(&item).map(Vec::as_slice).unwrap_or_default()
    }

    /// Items waiting on `node`
    pub fn dependents(&self, node: SyntaxRef) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .edges
            .iter()
            .filter(|(_, blockers)| blockers.contains(&node))
            .map(|(item, _)| *item)
            .collect();
        out.sort_unstable();
        out
    }

    /// Pending items in ascending order
    pub fn pending(&self) -> Vec<usize> {
        let mut items: Vec<usize> = self.edges.keys().copied().collect();
        items.sort_unstable();
        items
    }

    pub fn contains(&self, node: SyntaxRef) -> bool {
        self.nodes.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{DocumentId, NodeId};

    fn node(id: u32) -> SyntaxRef {
        SyntaxRef::new(DocumentId(0), NodeId(id))
    }

    #[test]
    fn test_dependents_and_removal() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(2, vec![node(10)]);
        graph.add_dependency(0, vec![node(10), node(11)]);

        assert_eq!(graph.dependents(node(10)), vec![0, 2]);
        assert_eq!(graph.pending(), vec![0, 2]);
        assert!(graph.contains(node(11)));

        assert_eq!(graph.remove_item(0), Some(vec![node(10), node(11)]));
        assert_eq!(graph.dependents(node(11)), Vec::<usize>::new());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_readding_replaces_blockers() {
        let mut graph = DependencyGraph::default();
        graph.add_dependency(1, vec![node(1)]);
        graph.add_dependency(1, vec![node(2)]);
        assert_eq!(graph.blockers(1), &[node(2)]);
        assert!(!graph.is_empty());
    }
}

//! In-memory topology graph store.
//!
//! The graph is mutated only through [`GraphStore::merge`],
//! [`GraphStore::merge_with_edges`], [`GraphStore::select`] and
//! [`GraphStore::clear`]. Every mutation is broadcast as a [`GraphChange`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::broadcast;

use reconmap_core::{EdgeData, NodeData, NodeId};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// The displayed network map.
///
/// Invariants: `selected` names an existing node; both endpoints of every
/// edge exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopologyGraph {
    pub nodes: BTreeMap<NodeId, NodeData>,
    pub edges: BTreeSet<EdgeData>,
    pub selected: Option<NodeId>,
}

impl TopologyGraph {
    pub fn selected_node(&self) -> Option<&NodeData> {
        self.selected.as_ref().and_then(|id| self.nodes.get(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Find a node by its IP address.
    pub fn find_by_ip(&self, ip: &str) -> Option<&NodeData> {
        self.nodes.values().find(|n| n.ip.as_deref() == Some(ip))
    }
}

/// A mutation notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphChange {
    NodesMerged {
        added: usize,
        updated: usize,
        edges: usize,
    },
    SelectionChanged {
        selected: Option<NodeId>,
    },
    Cleared,
}

/// Outcome of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
    pub edges_added: usize,
    pub edges_dropped: usize,
}

/// Shared topology graph with change notifications.
#[derive(Debug)]
pub struct GraphStore {
    graph: RwLock<TopologyGraph>,
    changes: broadcast::Sender<GraphChange>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            graph: RwLock::new(TopologyGraph::default()),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TopologyGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TopologyGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, change: GraphChange) {
        // Nobody listening is fine.
        let _ = self.changes.send(change);
    }

    /// Upsert nodes by ID. An existing node is replaced wholesale.
    pub fn merge(&self, nodes: Vec<NodeData>) -> MergeSummary {
        self.merge_with_edges(nodes, Vec::new())
    }

    /// Upsert nodes, then add edges whose endpoints both exist. Dangling
    /// edges are dropped.
    pub fn merge_with_edges(&self, nodes: Vec<NodeData>, edges: Vec<EdgeData>) -> MergeSummary {
        let mut summary = MergeSummary::default();

        {
            let mut graph = self.write();

            for node in nodes {
                if graph.nodes.insert(node.id, node).is_some() {
                    summary.updated += 1;
                } else {
                    summary.added += 1;
                }
            }

            for edge in edges {
                let (a, b) = edge.endpoints();
                if graph.nodes.contains_key(&a) && graph.nodes.contains_key(&b) {
                    if graph.edges.insert(edge) {
                        summary.edges_added += 1;
                    }
                } else {
                    summary.edges_dropped += 1;
                }
            }
        }

        if summary.edges_dropped > 0 {
            tracing::warn!(dropped = summary.edges_dropped, "Dropped edges with unknown endpoints");
        }
        tracing::info!(
            added = summary.added,
            updated = summary.updated,
            edges = summary.edges_added,
            "Merged nodes into topology"
        );

        self.publish(GraphChange::NodesMerged {
            added: summary.added,
            updated: summary.updated,
            edges: summary.edges_added,
        });
        summary
    }

    /// Set or clear the selection. An unknown ID is ignored and returns
    /// `false`.
    pub fn select(&self, id: Option<&NodeId>) -> bool {
        let changed = {
            let mut graph = self.write();
            if let Some(id) = id {
                if !graph.nodes.contains_key(id) {
                    drop(graph);
                    tracing::warn!(node_id = %id, "Ignoring selection of unknown node");
                    return false;
                }
            }
            let next = id.copied();
            let changed = graph.selected != next;
            graph.selected = next;
            changed
        };

        if changed {
            tracing::debug!(selected = ?id, "Selection changed");
            self.publish(GraphChange::SelectionChanged {
                selected: id.copied(),
            });
        }
        true
    }

    /// Remove all nodes, edges and the selection.
    pub fn clear(&self) {
        *self.write() = TopologyGraph::default();
        tracing::info!("Topology cleared");
        self.publish(GraphChange::Cleared);
    }

    pub fn snapshot(&self) -> TopologyGraph {
        self.read().clone()
    }

    pub fn node(&self, id: &NodeId) -> Option<NodeData> {
        self.read().nodes.get(id).cloned()
    }

    pub fn selected_node(&self) -> Option<NodeData> {
        self.read().selected_node().cloned()
    }

    pub fn node_count(&self) -> usize {
        self.read().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.read().edge_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use reconmap_core::NodeType;

    use super::*;

    fn node(ip: &str, name: &str) -> NodeData {
        NodeData {
            id: NodeId::for_ip(ip),
            node_type: NodeType::Host,
            name: name.to_string(),
            ip: Some(ip.to_string()),
            source_host: None,
            vulnerabilities: None,
        }
    }

    #[test]
    fn test_merge_upserts_by_id() {
        let store = GraphStore::new();

        let summary = store.merge(vec![node("10.0.0.1", "a"), node("10.0.0.2", "b")]);
        assert_eq!((summary.added, summary.updated), (2, 0));

        let summary = store.merge(vec![node("10.0.0.1", "a-renamed")]);
        assert_eq!((summary.added, summary.updated), (0, 1));

        assert_eq!(store.node_count(), 2);
        assert_eq!(
            store.node(&NodeId::for_ip("10.0.0.1")).unwrap().name,
            "a-renamed"
        );
    }

    #[test]
    fn test_merge_is_additive() {
        let store = GraphStore::new();
        store.merge(vec![node("10.0.0.1", "a")]);
        store.merge(vec![node("10.0.0.2", "b")]);
        store.merge(Vec::new());
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_dangling_edges_dropped() {
        let store = GraphStore::new();
        let a = NodeId::for_ip("10.0.0.1");
        let b = NodeId::for_ip("10.0.0.2");
        let ghost = NodeId::for_ip("10.0.0.99");

        let summary = store.merge_with_edges(
            vec![node("10.0.0.1", "a"), node("10.0.0.2", "b")],
            vec![EdgeData::new(a, b), EdgeData::new(b, a), EdgeData::new(a, ghost)],
        );

        assert_eq!(summary.edges_added, 1);
        assert_eq!(summary.edges_dropped, 1);
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn test_select_validates_id() {
        let store = GraphStore::new();
        store.merge(vec![node("10.0.0.1", "a")]);
        let id = NodeId::for_ip("10.0.0.1");

        assert!(store.select(Some(&id)));
        assert_eq!(store.selected_node().unwrap().name, "a");

        assert!(!store.select(Some(&NodeId::for_ip("10.9.9.9"))));
        assert_eq!(store.snapshot().selected, Some(id));

        assert!(store.select(None));
        assert!(store.selected_node().is_none());
    }

    #[test]
    fn test_selection_survives_merge() {
        let store = GraphStore::new();
        store.merge(vec![node("10.0.0.1", "a")]);
        let id = NodeId::for_ip("10.0.0.1");
        store.select(Some(&id));

        store.merge(vec![node("10.0.0.1", "a2"), node("10.0.0.3", "c")]);
        assert_eq!(store.selected_node().unwrap().name, "a2");
    }

    #[test]
    fn test_clear_resets_everything() {
        let store = GraphStore::new();
        store.merge(vec![node("10.0.0.1", "a")]);
        store.select(Some(&NodeId::for_ip("10.0.0.1")));

        store.clear();
        let graph = store.snapshot();
        assert_eq!(graph, TopologyGraph::default());
    }

    #[test]
    fn test_changes_are_broadcast() {
        let store = GraphStore::new();
        let mut rx = store.subscribe();
        let id = NodeId::for_ip("10.0.0.1");

        store.merge(vec![node("10.0.0.1", "a")]);
        store.select(Some(&id));
        store.select(Some(&id));
        store.select(Some(&NodeId::for_ip("10.0.0.2")));
        store.clear();

        assert_eq!(
            rx.try_recv().unwrap(),
            GraphChange::NodesMerged {
                added: 1,
                updated: 0,
                edges: 0
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            GraphChange::SelectionChanged { selected: Some(id) }
        );
        assert_eq!(rx.try_recv().unwrap(), GraphChange::Cleared);
        assert!(rx.try_recv().is_err());
    }
}

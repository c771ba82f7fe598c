//! Node Registry
//!
//! Owns every live `RouterNode` and the two lookup paths into them:
//! by transient connect id during handshake, and by stable outer conn id
//! once the route is confirmed. Nodes live in a primary arena keyed by an
//! internal `NodeId`; the two wire-visible keys are secondary indexes into
//! it, so a node can be reachable by either, both, or momentarily neither
//! without being cloned.
//!
//! The registry is deliberately unbounded; growth control is entirely the
//! sweeper's job.

use super::node::RouterNode;
use std::collections::HashMap;

/// Internal handle to a node in the arena. Never appears on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Registry of live routes.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    /// Primary storage.
    nodes: HashMap<NodeId, RouterNode>,
    /// Handshake lookup: connect id -> node.
    by_connect_id: HashMap<u32, NodeId>,
    /// Established lookup: outer conn -> node.
    by_outer_conn: HashMap<u32, NodeId>,
    /// Next arena handle.
    next_id: u64,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created node, indexing it by connect id only.
    ///
    /// The caller must have checked that the connect id is free; a stale
    /// entry under the same id would be shadowed otherwise.
    pub fn insert(&mut self, node: RouterNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.by_connect_id.insert(node.connect_id, id);
        self.nodes.insert(id, node);
        id
    }

    /// Index a node by its outer conn id.
    ///
    /// Returns false without touching the index when the key is already
    /// held by a *different* node; outer conn collisions reject the
    /// offending attempt rather than stealing the route. Promoting a node
    /// that already holds its slot is a no-op success.
    pub fn promote(&mut self, id: NodeId) -> bool {
        let outer_conn = match self.nodes.get(&id) {
            Some(node) => node.outer_conn,
            None => return false,
        };
        match self.by_outer_conn.get(&outer_conn) {
            Some(&existing) if existing != id => false,
            Some(_) => true,
            None => {
                self.by_outer_conn.insert(outer_conn, id);
                true
            }
        }
    }

    /// Drop the connect-id index entry for a node, ending its handshake
    /// reachability. The node itself stays in the arena.
    pub fn drop_connect_index(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get(&id) {
            if self.by_connect_id.get(&node.connect_id) == Some(&id) {
                self.by_connect_id.remove(&node.connect_id);
            }
        }
    }

    /// Re-key a node's connect-id index for a fresh reconnect attempt.
    ///
    /// Returns false if the new id is held by a different node; the node
    /// is left untouched in that case.
    pub fn rebind_connect_id(&mut self, id: NodeId, new_connect_id: u32) -> bool {
        match self.by_connect_id.get(&new_connect_id) {
            Some(&existing) if existing != id => return false,
            _ => {}
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            if self.by_connect_id.get(&node.connect_id) == Some(&id) {
                self.by_connect_id.remove(&node.connect_id);
            }
            node.connect_id = new_connect_id;
            self.by_connect_id.insert(new_connect_id, id);
            true
        } else {
            false
        }
    }

    /// Look up the arena handle by connect id.
    pub fn id_by_connect(&self, connect_id: u32) -> Option<NodeId> {
        self.by_connect_id.get(&connect_id).copied()
    }

    /// Look up the arena handle by outer conn id.
    pub fn id_by_outer(&self, outer_conn: u32) -> Option<NodeId> {
        self.by_outer_conn.get(&outer_conn).copied()
    }

    pub fn get(&self, id: NodeId) -> Option<&RouterNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut RouterNode> {
        self.nodes.get_mut(&id)
    }

    /// Remove a node and both its index entries. Idempotent: evicting a
    /// handle twice returns `None` the second time.
    pub fn evict(&mut self, id: NodeId) -> Option<RouterNode> {
        let node = self.nodes.remove(&id)?;
        if self.by_connect_id.get(&node.connect_id) == Some(&id) {
            self.by_connect_id.remove(&node.connect_id);
        }
        if self.by_outer_conn.get(&node.outer_conn) == Some(&id) {
            self.by_outer_conn.remove(&node.outer_conn);
        }
        Some(node)
    }

    /// Handles of all connect-id-reachable nodes, for the handshake sweep.
    pub fn connect_indexed_ids(&self) -> Vec<NodeId> {
        self.by_connect_id.values().copied().collect()
    }

    /// Handles of all outer-conn-reachable nodes, for the idle sweep.
    pub fn outer_indexed_ids(&self) -> Vec<NodeId> {
        self.by_outer_conn.values().copied().collect()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node and index entry. Only valid at router shutdown.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_connect_id.clear();
        self.by_outer_conn.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::node::RouterNode;

    fn make_node(connect_id: u32, outer_conn: u32) -> RouterNode {
        RouterNode::new(
            connect_id,
            outer_conn,
            7,
            "203.0.113.9:40001".parse().unwrap(),
            "10.0.0.5:9000".parse().unwrap(),
            "10.0.0.5:9000".to_string(),
            1000,
        )
    }

    #[test]
    fn test_insert_indexes_connect_only() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));

        assert_eq!(reg.id_by_connect(42), Some(id));
        assert_eq!(reg.id_by_outer(100), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_promote() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));

        assert!(reg.promote(id));
        assert_eq!(reg.id_by_outer(100), Some(id));

        // Re-promotion of the holder is a no-op success.
        assert!(reg.promote(id));
    }

    #[test]
    fn test_promote_collision_rejected() {
        let mut reg = NodeRegistry::new();
        let first = reg.insert(make_node(42, 100));
        let second = reg.insert(make_node(43, 100));

        assert!(reg.promote(first));
        assert!(!reg.promote(second));
        // The established route keeps its slot.
        assert_eq!(reg.id_by_outer(100), Some(first));
    }

    #[test]
    fn test_drop_connect_index() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));
        reg.promote(id);

        reg.drop_connect_index(id);
        assert_eq!(reg.id_by_connect(42), None);
        // Still reachable by outer conn and still alive.
        assert_eq!(reg.id_by_outer(100), Some(id));
        assert!(reg.get(id).is_some());
    }

    #[test]
    fn test_rebind_connect_id() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));

        assert!(reg.rebind_connect_id(id, 77));
        assert_eq!(reg.id_by_connect(42), None);
        assert_eq!(reg.id_by_connect(77), Some(id));
        assert_eq!(reg.get(id).unwrap().connect_id, 77);
    }

    #[test]
    fn test_rebind_collision_rejected() {
        let mut reg = NodeRegistry::new();
        let a = reg.insert(make_node(42, 100));
        let _b = reg.insert(make_node(43, 101));

        assert!(!reg.rebind_connect_id(a, 43));
        // Untouched on rejection.
        assert_eq!(reg.id_by_connect(42), Some(a));
        assert_eq!(reg.get(a).unwrap().connect_id, 42);
    }

    #[test]
    fn test_rebind_to_own_id() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));
        assert!(reg.rebind_connect_id(id, 42));
        assert_eq!(reg.id_by_connect(42), Some(id));
    }

    #[test]
    fn test_evict_removes_both_indexes() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));
        reg.promote(id);

        let node = reg.evict(id).unwrap();
        assert_eq!(node.outer_conn, 100);
        assert_eq!(reg.id_by_connect(42), None);
        assert_eq!(reg.id_by_outer(100), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_evict_idempotent() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));

        assert!(reg.evict(id).is_some());
        assert!(reg.evict(id).is_none());
    }

    #[test]
    fn test_evict_leaves_same_key_holders_alone() {
        let mut reg = NodeRegistry::new();
        let first = reg.insert(make_node(42, 100));
        reg.promote(first);
        // Second pending route colliding on outer_conn, never promoted.
        let second = reg.insert(make_node(43, 100));

        reg.evict(second);
        // First node's outer index must survive.
        assert_eq!(reg.id_by_outer(100), Some(first));
    }

    #[test]
    fn test_sweep_id_lists() {
        let mut reg = NodeRegistry::new();
        let a = reg.insert(make_node(42, 100));
        let b = reg.insert(make_node(43, 101));
        reg.promote(b);
        reg.drop_connect_index(b);

        let connect: Vec<_> = reg.connect_indexed_ids();
        let outer: Vec<_> = reg.outer_indexed_ids();
        assert_eq!(connect, vec![a]);
        assert_eq!(outer, vec![b]);
    }

    #[test]
    fn test_clear() {
        let mut reg = NodeRegistry::new();
        let id = reg.insert(make_node(42, 100));
        reg.promote(id);

        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.id_by_connect(42), None);
        assert_eq!(reg.id_by_outer(100), None);
    }
}

//! Link graph: strong/weak edges between properties, cycle rejection
//! restricted to the strong subgraph, and the topological order the
//! scheduler evaluates nodes in.
//!
//! Grounded on `SPEC_FULL.md`'s node-owned-arena redesign of the source's
//! raw property back-pointers (see `types::property`): edges live here as
//! plain `PropertyRef` pairs rather than pointers threaded through the
//! node arenas, which is what makes `unlink`/`destroy` a lookup instead of
//! a pointer hunt.

use std::collections::{HashMap, VecDeque};

use crate::error::LogicError;
use crate::ids::NodeId;
use crate::types::property::{PropertyRef, TreeSide};
use crate::types::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: PropertyRef,
    pub dst: PropertyRef,
    pub weak: bool,
}

/// The engine's link graph: one edge set (distinguished by `weak`) over
/// every property in every node. Node-level adjacency (used for
/// topological ordering and cycle detection) is derived from the strong
/// edges' owning nodes, since ordering only needs to respect node, not
/// property, dependencies.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    incoming: HashMap<PropertyRef, (PropertyRef, bool)>,
    outgoing: HashMap<PropertyRef, Vec<PropertyRef>>,
    strong_adj: HashMap<NodeId, Vec<NodeId>>,
    order_cache: Option<Vec<NodeId>>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and records `src -> dst`. Validation order follows §4.F:
    /// type match, side correctness, distinctness, no existing incoming
    /// edge on `dst`, then (for strong edges only) a cycle check.
    pub fn link(
        &mut self,
        src: PropertyRef,
        dst: PropertyRef,
        weak: bool,
        src_type: ValueType,
        dst_type: ValueType,
    ) -> Result<(), LogicError> {
        if src_type != dst_type {
            return Err(LogicError::TypeMismatch {
                expected: dst_type.to_string(),
                found: src_type.to_string(),
            });
        }
        if !src.side.is_output_like() {
            return Err(LogicError::IllegalArgument("link source must be an output-side property".to_string()));
        }
        if !dst.side.is_input_like() {
            return Err(LogicError::IllegalArgument("link target must be an input-side property".to_string()));
        }
        if src == dst {
            return Err(LogicError::IllegalArgument("cannot link a property to itself".to_string()));
        }
        if src.node == dst.node {
            return Err(LogicError::IllegalArgument(
                "link source and target must belong to different nodes".to_string(),
            ));
        }
        if self.incoming.contains_key(&dst) {
            return Err(LogicError::IllegalArgument(format!(
                "property {:?} already has an incoming link",
                dst
            )));
        }
        if !weak && self.reaches(dst.node, src.node) {
            return Err(LogicError::CycleDetected);
        }

        self.incoming.insert(dst, (src, weak));
        self.outgoing.entry(src).or_default().push(dst);
        if !weak {
            self.strong_adj.entry(src.node).or_default().push(dst.node);
        }
        self.order_cache = None;
        Ok(())
    }

    /// Removes the exact edge `src -> dst`; fails if it doesn't exist.
    pub fn unlink(&mut self, src: PropertyRef, dst: PropertyRef) -> Result<(), LogicError> {
        match self.incoming.get(&dst) {
            Some(&(actual_src, weak)) if actual_src == src => {
                self.incoming.remove(&dst);
                if let Some(outs) = self.outgoing.get_mut(&src) {
                    outs.retain(|&d| d != dst);
                }
                if !weak {
                    if let Some(adj) = self.strong_adj.get_mut(&src.node) {
                        if let Some(pos) = adj.iter().position(|&n| n == dst.node) {
                            adj.remove(pos);
                        }
                    }
                }
                self.order_cache = None;
                Ok(())
            }
            _ => Err(LogicError::IllegalArgument(format!("no link from {:?} to {:?}", src, dst))),
        }
    }

    /// Removes every edge touching `node` (either endpoint), used by
    /// `destroy` (§4.G picks "implicitly remove touching links"; see
    /// `DESIGN.md`). Returns the removed edges for caller bookkeeping.
    pub fn remove_edges_touching(&mut self, node: NodeId) -> Vec<Edge> {
        let mut removed = Vec::new();
        let dsts: Vec<PropertyRef> = self.incoming.keys().copied().collect();
        for dst in dsts {
            let (src, weak) = self.incoming[&dst];
            if src.node == node || dst.node == node {
                self.incoming.remove(&dst);
                if let Some(outs) = self.outgoing.get_mut(&src) {
                    outs.retain(|&d| d != dst);
                }
                if !weak {
                    if let Some(adj) = self.strong_adj.get_mut(&src.node) {
                        if let Some(pos) = adj.iter().position(|&n| n == dst.node) {
                            adj.remove(pos);
                        }
                    }
                }
                removed.push(Edge { src, dst, weak });
            }
        }
        if !removed.is_empty() {
            self.order_cache = None;
        }
        removed
    }

    pub fn incoming_of(&self, dst: PropertyRef) -> Option<(PropertyRef, bool)> {
        self.incoming.get(&dst).copied()
    }

    pub fn outgoing_of(&self, src: PropertyRef) -> &[PropertyRef] {
        self.outgoing.get(&src).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn node_is_linked(&self, node: NodeId) -> bool {
        self.incoming.iter().any(|(&dst, &(src, _))| dst.node == node || src.node == node)
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.incoming.iter().map(|(&dst, &(src, weak))| Edge { src, dst, weak })
    }

    /// Whether `to` can reach `from` via existing strong edges -- used to
    /// reject a would-be strong edge `from -> to` that would close a cycle.
    fn reaches(&self, from_start: NodeId, target: NodeId) -> bool {
        if from_start == target {
            return true;
        }
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![from_start];
        while let Some(n) = stack.pop() {
            if !visited.insert(n) {
                continue;
            }
            if n == target {
                return true;
            }
            if let Some(adj) = self.strong_adj.get(&n) {
                stack.extend(adj.iter().copied());
            }
        }
        false
    }

    pub fn structure_dirty(&self) -> bool {
        self.order_cache.is_none()
    }

    /// Recomputes (or returns the cached) topological order over
    /// `all_nodes`, a stable Kahn's-algorithm sort on strong edges. Ties
    /// (nodes with no ordering constraint between them) keep `all_nodes`'
    /// relative order.
    pub fn topological_order(&mut self, all_nodes: &[NodeId]) -> Result<Vec<NodeId>, LogicError> {
        if let Some(cached) = &self.order_cache {
            return Ok(cached.clone());
        }
        let mut indegree: HashMap<NodeId, usize> = all_nodes.iter().map(|&n| (n, 0)).collect();
        for (&node, adj) in &self.strong_adj {
            if !indegree.contains_key(&node) {
                continue;
            }
            for &dst in adj {
                if let Some(d) = indegree.get_mut(&dst) {
                    *d += 1;
                }
            }
        }
        let mut queue: VecDeque<NodeId> = all_nodes.iter().copied().filter(|n| indegree[n] == 0).collect();
        let mut order = Vec::with_capacity(all_nodes.len());
        while let Some(n) = queue.pop_front() {
            order.push(n);
            if let Some(adj) = self.strong_adj.get(&n) {
                for &dst in adj {
                    if let Some(d) = indegree.get_mut(&dst) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(dst);
                        }
                    }
                }
            }
        }
        if order.len() != all_nodes.len() {
            return Err(LogicError::CycleDetected);
        }
        self.order_cache = Some(order.clone());
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref(node: u64, side: TreeSide, idx: u32) -> PropertyRef {
        PropertyRef::new(NodeId(node), side, crate::types::property::PropertyIndex(idx))
    }

    #[test]
    fn linking_mismatched_types_is_rejected() {
        let mut g = LinkGraph::new();
        let err = g
            .link(pref(1, TreeSide::Output, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Int32)
            .unwrap_err();
        assert!(matches!(err, LogicError::TypeMismatch { .. }));
    }

    #[test]
    fn linking_wrong_sides_is_rejected() {
        let mut g = LinkGraph::new();
        let err = g
            .link(pref(1, TreeSide::Input, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float)
            .unwrap_err();
        assert!(matches!(err, LogicError::IllegalArgument(_)));
    }

    #[test]
    fn target_with_existing_incoming_edge_is_rejected() {
        let mut g = LinkGraph::new();
        g.link(pref(1, TreeSide::Output, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float).unwrap();
        let err = g
            .link(pref(3, TreeSide::Output, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float)
            .unwrap_err();
        assert!(matches!(err, LogicError::IllegalArgument(_)));
    }

    #[test]
    fn strong_cycle_is_rejected_but_weak_succeeds() {
        let mut g = LinkGraph::new();
        g.link(pref(1, TreeSide::Output, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float).unwrap();
        let err = g
            .link(pref(2, TreeSide::Output, 0), pref(1, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float)
            .unwrap_err();
        assert!(matches!(err, LogicError::CycleDetected));
        g.link(pref(2, TreeSide::Output, 0), pref(1, TreeSide::Input, 0), true, ValueType::Float, ValueType::Float).unwrap();
    }

    #[test]
    fn unlink_requires_the_exact_edge() {
        let mut g = LinkGraph::new();
        g.link(pref(1, TreeSide::Output, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float).unwrap();
        assert!(g.unlink(pref(9, TreeSide::Output, 0), pref(2, TreeSide::Input, 0)).is_err());
        assert!(g.unlink(pref(1, TreeSide::Output, 0), pref(2, TreeSide::Input, 0)).is_ok());
        assert!(g.incoming_of(pref(2, TreeSide::Input, 0)).is_none());
    }

    #[test]
    fn topological_order_respects_strong_edges() {
        let mut g = LinkGraph::new();
        g.link(pref(2, TreeSide::Output, 0), pref(3, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float).unwrap();
        g.link(pref(1, TreeSide::Output, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float).unwrap();
        let order = g.topological_order(&[NodeId(3), NodeId(2), NodeId(1)]).unwrap();
        let pos = |n: u64| order.iter().position(|&x| x == NodeId(n)).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));
    }

    #[test]
    fn order_without_edges_keeps_input_order() {
        let mut g = LinkGraph::new();
        let order = g.topological_order(&[NodeId(5), NodeId(1), NodeId(3)]).unwrap();
        assert_eq!(order, vec![NodeId(5), NodeId(1), NodeId(3)]);
    }

    #[test]
    fn remove_edges_touching_clears_both_incoming_and_outgoing() {
        let mut g = LinkGraph::new();
        g.link(pref(1, TreeSide::Output, 0), pref(2, TreeSide::Input, 0), false, ValueType::Float, ValueType::Float).unwrap();
        let removed = g.remove_edges_touching(NodeId(2));
        assert_eq!(removed.len(), 1);
        assert!(g.incoming_of(pref(2, TreeSide::Input, 0)).is_none());
        assert!(!g.node_is_linked(NodeId(1)));
    }
}

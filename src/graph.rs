//! Graph Store & Mutation.
//!
//! Dense node/edge tables keyed by `slotmap`, a CSR projection rebuilt
//! lazily and on demand, and the mutation protocol (load/add/remove/bulk
//! update) that keeps the CPU tables and the CSR in a documented state
//! without tearing a running simulation.
//!
//! Grounded on `angelocarly-mycelia/src/graph.rs` for the node/edge table
//! and per-field update shape, generalized from its raw `Vec`s to
//! `slotmap`-backed storage for id stability across mutation, plus a
//! dense-parallel-array idiom (`extract_subset`, `duplicate_selected`)
//! for the bulk array operations.

use crate::error::{Error, Result};
use crate::ids::{EdgeIndex, NodeIndex, NodeKey};
use bitflags::bitflags;
use slotmap::{Key, SecondaryMap, SlotMap};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u32 {
        const PINNED = 0b0001;
        /// Removed but not yet recycled (fenced until the next frame
        /// boundary so no in-flight GPU read observes a recycled slot).
        const DEAD = 0b0010;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int(i32),
    Text(Arc<str>),
}

#[derive(Clone)]
pub struct NodeData {
    pub key: NodeKey,
    pub pos: [f32; 2],
    pub vel: [f32; 2],
    pub radius: f32,
    pub color: [f32; 4],
    pub type_tag: Option<TypeTag>,
    pub flags: NodeFlags,
    pub visibility_mask: u32,
    pub metadata: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

impl NodeData {
    fn new(key: NodeKey) -> Self {
        Self {
            key,
            pos: [0.0, 0.0],
            vel: [0.0, 0.0],
            radius: 4.0,
            color: [1.0, 1.0, 1.0, 1.0],
            type_tag: None,
            flags: NodeFlags::empty(),
            visibility_mask: u32::MAX,
            metadata: None,
        }
    }
}

#[derive(Clone)]
pub struct EdgeData {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub width: f32,
    pub color: [f32; 4],
    pub curvature: f32,
    pub type_tag: Option<TypeTag>,
}

/// Input record for `load`/`addNodes`.
#[derive(Clone)]
pub struct NodeInput {
    pub key: NodeKey,
    pub pos: Option<[f32; 2]>,
    pub radius: Option<f32>,
    pub color: Option<[f32; 4]>,
    pub type_tag: Option<TypeTag>,
}

/// Input record for `load`/`addEdges`.
#[derive(Clone)]
pub struct EdgeInput {
    pub source_key: NodeKey,
    pub target_key: NodeKey,
    pub width: Option<f32>,
    pub color: Option<[f32; 4]>,
    pub curvature: Option<f32>,
    pub type_tag: Option<TypeTag>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadCounts {
    pub kept_nodes: usize,
    pub dropped_nodes: usize,
    pub kept_edges: usize,
    pub dropped_edges: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum EdgeAddResult {
    Added(EdgeIndex),
    Rejected,
}

/// Compressed-sparse-row adjacency projection.
#[derive(Debug, Clone, Default)]
pub struct Csr {
    /// `offsets.len() == node_capacity + 1`; index by GPU row (see
    /// [`Graph::row_of`]), not by `NodeIndex` directly.
    pub offsets: Vec<u32>,
    pub targets: Vec<u32>,
}

pub struct Graph {
    nodes: SlotMap<NodeIndex, NodeData>,
    edges: SlotMap<EdgeIndex, EdgeData>,
    key_to_index: HashMap<NodeKey, NodeIndex>,
    /// Edges incident to each node, for cascade-remove.
    incident: SecondaryMap<NodeIndex, Vec<EdgeIndex>>,
    csr: Csr,
    csr_dirty: bool,
    /// Nodes marked dead this frame; recycled at the next `end_frame()`.
    pending_recycle: Vec<NodeIndex>,
    capacity_floor: usize,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Graph {
    pub fn new(capacity_floor: usize) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            key_to_index: HashMap::new(),
            incident: SecondaryMap::new(),
            csr: Csr::default(),
            csr_dirty: true,
            pending_recycle: Vec::new(),
            capacity_floor,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Dense GPU row for a node index: the low 32 bits of slotmap's
    /// `KeyData`, stable until the slot is recycled.
    pub fn row_of(idx: NodeIndex) -> u32 {
        idx.data().as_ffi() as u32
    }

    pub fn get_node(&self, idx: NodeIndex) -> Option<&NodeData> {
        self.nodes.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: NodeIndex) -> Option<&mut NodeData> {
        self.nodes.get_mut(idx)
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<NodeIndex> {
        self.key_to_index.get(key).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &NodeData)> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (NodeIndex, &mut NodeData)> {
        self.nodes.iter_mut()
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, &EdgeData)> {
        self.edges.iter()
    }

    fn insert_node(&mut self, input: NodeInput) -> NodeIndex {
        let mut data = NodeData::new(input.key.clone());
        if let Some(p) = input.pos {
            data.pos = p;
        }
        if let Some(r) = input.radius {
            data.radius = r;
        }
        if let Some(c) = input.color {
            data.color = c;
        }
        data.type_tag = input.type_tag;
        let idx = self.nodes.insert(data);
        self.key_to_index.insert(input.key, idx);
        self.incident.insert(idx, Vec::new());
        idx
    }

    /// `load(nodes, edges)` — full replacement.
    pub fn load(&mut self, nodes: Vec<NodeInput>, edges: Vec<EdgeInput>) -> LoadCounts {
        self.nodes = SlotMap::with_key();
        self.edges = SlotMap::with_key();
        self.key_to_index = HashMap::new();
        self.incident = SecondaryMap::new();
        self.pending_recycle.clear();

        let mut counts = LoadCounts::default();
        let mut seen = std::collections::HashSet::new();
        for n in nodes {
            if !seen.insert(n.key.clone()) {
                counts.dropped_nodes += 1;
                continue;
            }
            self.insert_node(n);
            counts.kept_nodes += 1;
        }

        for e in edges {
            let src = self.key_to_index.get(&e.source_key).copied();
            let tgt = self.key_to_index.get(&e.target_key).copied();
            match (src, tgt) {
                (Some(s), Some(t)) => {
                    self.insert_edge_resolved(s, t, e.width, e.color, e.curvature, e.type_tag);
                    counts.kept_edges += 1;
                }
                _ => counts.dropped_edges += 1,
            }
        }

        self.csr_dirty = true;
        tracing::info!(
            kept_nodes = counts.kept_nodes,
            dropped_nodes = counts.dropped_nodes,
            kept_edges = counts.kept_edges,
            dropped_edges = counts.dropped_edges,
            "graph loaded"
        );
        counts
    }

    fn insert_edge_resolved(
        &mut self,
        source: NodeIndex,
        target: NodeIndex,
        width: Option<f32>,
        color: Option<[f32; 4]>,
        curvature: Option<f32>,
        type_tag: Option<TypeTag>,
    ) -> EdgeIndex {
        let data = EdgeData {
            source,
            target,
            width: width.unwrap_or(1.0),
            color: color.unwrap_or([0.6, 0.6, 0.6, 1.0]),
            curvature: curvature.unwrap_or(0.0),
            type_tag,
        };
        let idx = self.edges.insert(data);
        self.incident.entry(source).unwrap().or_default().push(idx);
        self.incident.entry(target).unwrap().or_default().push(idx);
        idx
    }

    /// `addNodes(list)` — append, returning assigned indices in input order.
    pub fn add_nodes(&mut self, list: Vec<NodeInput>) -> Vec<NodeIndex> {
        let mut out = Vec::with_capacity(list.len());
        for n in list {
            out.push(self.insert_node(n));
        }
        out
    }

    /// `addEdges(list)` — resolve keys, skip dead endpoints, mark CSR dirty.
    pub fn add_edges(&mut self, list: Vec<EdgeInput>) -> Vec<EdgeAddResult> {
        let mut out = Vec::with_capacity(list.len());
        let mut any_added = false;
        for e in list {
            let src = self.key_to_index.get(&e.source_key).copied();
            let tgt = self.key_to_index.get(&e.target_key).copied();
            match (src, tgt) {
                (Some(s), Some(t))
                    if !self.nodes[s].flags.contains(NodeFlags::DEAD)
                        && !self.nodes[t].flags.contains(NodeFlags::DEAD) =>
                {
                    let idx = self.insert_edge_resolved(s, t, e.width, e.color, e.curvature, e.type_tag);
                    out.push(EdgeAddResult::Added(idx));
                    any_added = true;
                }
                _ => out.push(EdgeAddResult::Rejected),
            }
        }
        if any_added {
            self.csr_dirty = true;
        }
        out
    }

    /// `removeNodes(keys)` — cascade-remove incident edges; recycle after
    /// the next `end_frame()` fence.
    pub fn remove_nodes(&mut self, keys: &[NodeKey]) -> usize {
        let mut removed = 0;
        for key in keys {
            let Some(idx) = self.key_to_index.remove(key) else {
                continue;
            };
            if let Some(node) = self.nodes.get_mut(idx) {
                if node.flags.contains(NodeFlags::DEAD) {
                    continue;
                }
                node.flags.insert(NodeFlags::DEAD);
                removed += 1;
            }
            if let Some(incident) = self.incident.remove(idx) {
                for edge_idx in incident {
                    self.edges.remove(edge_idx);
                }
            }
            self.pending_recycle.push(idx);
        }
        if removed > 0 {
            self.csr_dirty = true;
        }
        removed
    }

    /// `removeEdges(indices)` — mark dead, mark CSR dirty.
    pub fn remove_edges(&mut self, indices: &[EdgeIndex]) -> usize {
        let mut removed = 0;
        for &idx in indices {
            if let Some(edge) = self.edges.remove(idx) {
                if let Some(v) = self.incident.get_mut(edge.source) {
                    v.retain(|e| *e != idx);
                }
                if let Some(v) = self.incident.get_mut(edge.target) {
                    v.retain(|e| *e != idx);
                }
                removed += 1;
            }
        }
        if removed > 0 {
            self.csr_dirty = true;
        }
        removed
    }

    /// Frame-boundary fence: actually recycle nodes marked dead during the
    /// frame that just completed. Call once per tick, after the GPU
    /// submission for that tick has been recorded.
    pub fn end_frame(&mut self) {
        for idx in self.pending_recycle.drain(..) {
            self.nodes.remove(idx);
        }
    }

    pub fn set_node_positions(&mut self, values: &[[f32; 2]]) -> Result<()> {
        self.bulk_update_nodes(values, |n, v| n.pos = v)
    }

    pub fn set_node_colors(&mut self, values: &[[f32; 4]]) -> Result<()> {
        self.bulk_update_nodes(values, |n, v| n.color = v)
    }

    pub fn set_node_sizes(&mut self, values: &[f32]) -> Result<()> {
        self.bulk_update_nodes(values, |n, v| n.radius = v)
    }

    pub fn set_edge_widths(&mut self, values: &[f32]) -> Result<()> {
        self.bulk_update_edges(values, |e, v| e.width = v)
    }

    pub fn set_edge_colors(&mut self, values: &[[f32; 4]]) -> Result<()> {
        self.bulk_update_edges(values, |e, v| e.color = v)
    }

    pub fn set_edge_curvatures(&mut self, values: &[f32]) -> Result<()> {
        self.bulk_update_edges(values, |e, v| e.curvature = v)
    }

    fn bulk_update_nodes<T: Copy>(&mut self, values: &[T], apply: impl Fn(&mut NodeData, T)) -> Result<()> {
        if values.len() != self.nodes.len() {
            return Err(Error::ShapeMismatch {
                expected: self.nodes.len(),
                actual: values.len(),
            });
        }
        for ((_, node), &v) in self.nodes.iter_mut().zip(values.iter()) {
            apply(node, v);
        }
        Ok(())
    }

    fn bulk_update_edges<T: Copy>(&mut self, values: &[T], apply: impl Fn(&mut EdgeData, T)) -> Result<()> {
        if values.len() != self.edges.len() {
            return Err(Error::ShapeMismatch {
                expected: self.edges.len(),
                actual: values.len(),
            });
        }
        for ((_, edge), &v) in self.edges.iter_mut().zip(values.iter()) {
            apply(edge, v);
        }
        Ok(())
    }

    pub fn set_pinned(&mut self, idx: Option<NodeIndex>) {
        for (_, node) in self.nodes.iter_mut() {
            node.flags.remove(NodeFlags::PINNED);
        }
        if let Some(idx) = idx {
            if let Some(node) = self.nodes.get_mut(idx) {
                node.flags.insert(NodeFlags::PINNED);
            }
        }
    }

    pub fn csr_is_dirty(&self) -> bool {
        self.csr_dirty
    }

    pub fn csr(&self) -> &Csr {
        &self.csr
    }

    /// Rebuild the CSR projection if dirty. O(V + E); returns the measured
    /// duration as a latency sample for the host.
    pub fn rebuild_csr_if_dirty(&mut self) -> Option<Duration> {
        if !self.csr_dirty {
            return None;
        }
        let start = Instant::now();

        let row_capacity = self
            .nodes
            .keys()
            .map(Self::row_of)
            .max()
            .map(|m| m as usize + 1)
            .unwrap_or(0)
            .max(self.capacity_floor);

        let mut degree = vec![0u32; row_capacity + 1];
        for (_, edge) in self.edges.iter() {
            degree[Self::row_of(edge.source) as usize] += 1;
            degree[Self::row_of(edge.target) as usize] += 1;
        }

        let mut offsets = vec![0u32; row_capacity + 1];
        for i in 0..row_capacity {
            offsets[i + 1] = offsets[i] + degree[i];
        }

        let mut cursor = offsets.clone();
        let mut targets = vec![0u32; offsets[row_capacity] as usize];
        for (_, edge) in self.edges.iter() {
            let s = Self::row_of(edge.source) as usize;
            let t = Self::row_of(edge.target) as usize;
            targets[cursor[s] as usize] = t as u32;
            cursor[s] += 1;
            targets[cursor[t] as usize] = s as u32;
            cursor[t] += 1;
        }

        self.csr = Csr { offsets, targets };
        self.csr_dirty = false;
        let elapsed = start.elapsed();
        tracing::debug!(elapsed_us = elapsed.as_micros(), "CSR rebuilt");
        Some(elapsed)
    }

    /// Neighbours of `idx` per the current (possibly stale) CSR; callers
    /// needing a fresh projection must call `rebuild_csr_if_dirty` first.
    pub fn neighbours(&self, idx: NodeIndex) -> &[u32] {
        let row = Self::row_of(idx) as usize;
        if row + 1 >= self.csr.offsets.len() {
            return &[];
        }
        let start = self.csr.offsets[row] as usize;
        let end = self.csr.offsets[row + 1] as usize;
        &self.csr.targets[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &str) -> NodeInput {
        NodeInput {
            key: key.into(),
            pos: None,
            radius: None,
            color: None,
            type_tag: None,
        }
    }

    fn edge(s: &str, t: &str) -> EdgeInput {
        EdgeInput {
            source_key: s.into(),
            target_key: t.into(),
            width: None,
            color: None,
            curvature: None,
            type_tag: None,
        }
    }

    #[test]
    fn duplicate_dropping_load() {
        let mut g = Graph::new(16);
        let counts = g.load(
            vec![node("a"), node("a"), node("b")],
            vec![edge("a", "b"), edge("a", "c")],
        );
        assert_eq!(counts.kept_nodes, 2);
        assert_eq!(counts.dropped_nodes, 1);
        assert_eq!(counts.kept_edges, 1);
        assert_eq!(counts.dropped_edges, 1);
    }

    #[test]
    fn graph_closure_after_remove() {
        let mut g = Graph::new(16);
        g.load(vec![node("a"), node("b"), node("c")], vec![edge("a", "b"), edge("b", "c")]);
        g.remove_nodes(&[NodeKey::from("b")]);
        g.end_frame();
        for (_, e) in g.edges() {
            assert!(g.get_node(e.source).is_some());
            assert!(g.get_node(e.target).is_some());
        }
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn csr_matches_edge_list() {
        let mut g = Graph::new(16);
        g.load(
            vec![node("a"), node("b"), node("c")],
            vec![edge("a", "b"), edge("a", "c")],
        );
        g.rebuild_csr_if_dirty();
        let a = g.index_of(&"a".into()).unwrap();
        let b = g.index_of(&"b".into()).unwrap();
        let c = g.index_of(&"c".into()).unwrap();
        let mut neighbours: Vec<u32> = g.neighbours(a).to_vec();
        neighbours.sort();
        let mut expected = vec![Graph::row_of(b), Graph::row_of(c)];
        expected.sort();
        assert_eq!(neighbours, expected);
    }

    #[test]
    fn id_stability_across_unrelated_mutations() {
        let mut g = Graph::new(16);
        g.load(vec![node("a"), node("b")], vec![]);
        let a = g.index_of(&"a".into()).unwrap();
        g.set_node_positions(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        g.add_nodes(vec![node("c")]);
        g.remove_nodes(&[NodeKey::from("b")]);
        g.end_frame();
        assert_eq!(g.index_of(&"a".into()), Some(a));
        assert_eq!(g.get_node(a).unwrap().pos, [1.0, 2.0]);
    }

    #[test]
    fn shape_mismatch_rejected() {
        let mut g = Graph::new(16);
        g.load(vec![node("a"), node("b")], vec![]);
        let err = g.set_node_positions(&[[0.0, 0.0]]).unwrap_err();
        matches!(err, Error::ShapeMismatch { .. });
    }

    #[test]
    fn id_stability_under_random_add_remove() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut g = Graph::new(16);
        let mut live: std::collections::HashMap<String, NodeIndex> = std::collections::HashMap::new();
        let mut next_key = 0u64;

        for _ in 0..500 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let key = format!("n{next_key}");
                next_key += 1;
                let added = g.add_nodes(vec![node(&key)]);
                live.insert(key, added[0]);
            } else {
                let victim = live.keys().nth(rng.gen_range(0..live.len())).cloned().unwrap();
                let idx = live.remove(&victim).unwrap();
                g.remove_nodes(&[NodeKey::from(victim.as_str())]);
                g.end_frame();
                assert!(g.get_node(idx).is_none(), "removed node {victim} still resolves");
            }

            for (key, idx) in &live {
                assert_eq!(g.index_of(&NodeKey::from(key.as_str())), Some(*idx));
                assert!(g.get_node(*idx).is_some());
            }
        }
    }
}

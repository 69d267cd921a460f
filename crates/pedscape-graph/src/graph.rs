use std::io::Write;

use fxhash::FxHashMap;

use pedscape_core::{Error, Result};

use crate::edge::{Edge, EdgeSet, IntEdge, StepType};
use crate::node::Node;

fn bit_key(n: &Node) -> (u32, u32, u32) {
    (n.x.to_bits(), n.y.to_bits(), n.z.to_bits())
}

/// One compressed cost layer: sorted-by-column CSR triple.
#[derive(Debug, Clone, Default)]
struct CsrLayer {
    /// length N+1
    offsets: Vec<i32>,
    /// length NNZ, column (child) ids
    targets: Vec<i32>,
    /// length NNZ, per-edge weight
    data: Vec<f32>,
}

impl CsrLayer {
    fn row(&self, r: i32) -> (&[i32], &[f32]) {
        let start = self.offsets[r as usize] as usize;
        let end = self.offsets[r as usize + 1] as usize;
        (&self.targets[start..end], &self.data[start..end])
    }
}

/// Read-only zero-copy view over one cost layer's CSR arrays.
pub struct CsrView<'a> {
    pub nnz: usize,
    pub rows: usize,
    pub cols: usize,
    pub data: &'a [f32],
    pub inner: &'a [i32],
    pub outer: &'a [i32],
}

/// Per-node reduction kind used by `Graph::aggregate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Count,
    Sum,
    Average,
    Max,
    Min,
}

type Adjacency = FxHashMap<i32, FxHashMap<i32, f32>>;

/// Directed, multi-cost graph: a dense node set plus a primary CSR cost
/// layer and zero or more named alternate CSR overlays whose pattern is a
/// subset of the primary's.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    coord_index: FxHashMap<(u32, u32, u32), i32>,
    adjacency: Adjacency,
    primary: Option<CsrLayer>,
    alt_adjacency: FxHashMap<String, Adjacency>,
    alt_layers: FxHashMap<String, CsrLayer>,
    compressed: bool,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    fn register_node(&mut self, node: Node) -> i32 {
        let key = bit_key(&node);
        if let Some(&id) = self.coord_index.get(&key) {
            return id;
        }
        let id = self.nodes.len() as i32;
        let mut stored = node;
        stored.id = id;
        self.nodes.push(stored);
        self.coord_index.insert(key, id);
        id
    }

    /// Inserts or updates an edge between two nodes in the primary (or a
    /// named) cost layer, registering either node if it hasn't been seen
    /// before.
    pub fn add_edge(
        &mut self,
        parent: Node,
        child: Node,
        score: f32,
        cost_name: Option<&str>,
    ) -> Result<()> {
        let parent_id = self.register_node(parent);
        let child_id = self.register_node(child);
        self.add_edge_by_id(parent_id, child_id, score, cost_name)
    }

    pub fn add_edge_by_id(
        &mut self,
        parent_id: i32,
        child_id: i32,
        score: f32,
        cost_name: Option<&str>,
    ) -> Result<()> {
        let n = self.nodes.len() as i32;
        if parent_id < 0 || parent_id >= n || child_id < 0 || child_id >= n {
            return Err(Error::OutOfRange);
        }
        match cost_name {
            None => {
                self.adjacency
                    .entry(parent_id)
                    .or_default()
                    .insert(child_id, score);
                self.compressed = false;
                self.primary = None;
            }
            Some(name) => {
                if !self.compressed {
                    return Err(Error::NoGraph);
                }
                self.alt_adjacency
                    .entry(name.to_string())
                    .or_default()
                    .entry(parent_id)
                    .or_default()
                    .insert(child_id, score);
                self.rebuild_alt_layer(name)?;
            }
        }
        Ok(())
    }

    /// Bulk insert of out-edge sets into a named alternate layer. Requires
    /// a compressed primary.
    pub fn add_edges(&mut self, edge_sets: &[EdgeSet], cost_name: &str) -> Result<()> {
        if !self.compressed {
            return Err(Error::NoGraph);
        }
        let n = self.nodes.len() as i32;
        let layer_adj = self.alt_adjacency.entry(cost_name.to_string()).or_default();
        for set in edge_sets {
            if set.parent_id < 0 || set.parent_id >= n {
                return Err(Error::OutOfRange);
            }
            let row = layer_adj.entry(set.parent_id).or_default();
            for ie in &set.children {
                if ie.child_id < 0 || ie.child_id >= n {
                    return Err(Error::OutOfRange);
                }
                row.insert(ie.child_id, ie.weight);
            }
        }
        self.rebuild_alt_layer(cost_name)
    }

    fn compress_layer(n: usize, adjacency: &Adjacency) -> CsrLayer {
        let mut offsets = Vec::with_capacity(n + 1);
        let mut targets = Vec::new();
        let mut data = Vec::new();
        offsets.push(0);
        for row in 0..n as i32 {
            if let Some(children) = adjacency.get(&row) {
                let mut sorted: Vec<(i32, f32)> = children.iter().map(|(&c, &w)| (c, w)).collect();
                sorted.sort_by_key(|(c, _)| *c);
                for (c, w) in sorted {
                    targets.push(c);
                    data.push(w);
                }
            }
            offsets.push(targets.len() as i32);
        }
        CsrLayer {
            offsets,
            targets,
            data,
        }
    }

    fn rebuild_alt_layer(&mut self, name: &str) -> Result<()> {
        let adjacency = self
            .alt_adjacency
            .get(name)
            .expect("alt layer adjacency must exist before rebuild");
        let layer = Self::compress_layer(self.nodes.len(), adjacency);

        let primary = self.primary.as_ref().ok_or(Error::NoGraph)?;
        for row in 0..self.nodes.len() as i32 {
            let (alt_cols, _) = layer.row(row);
            let (primary_cols, _) = primary.row(row);
            for col in alt_cols {
                if !primary_cols.contains(col) {
                    return Err(Error::InvalidArgument(format!(
                        "alternate cost layer {name:?} has an edge ({row},{col}) absent from the primary layer"
                    )));
                }
            }
        }

        self.alt_layers.insert(name.to_string(), layer);
        Ok(())
    }

    /// Sorts and finalizes the primary CSR layer. Idempotent.
    pub fn compress(&mut self) {
        if self.compressed {
            return;
        }
        let start = std::time::Instant::now();
        self.primary = Some(Self::compress_layer(self.nodes.len(), &self.adjacency));
        self.compressed = true;
        log::info!(
            "compressed graph with {} nodes in {:?}",
            self.nodes.len(),
            start.elapsed()
        );
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.coord_index.clear();
        self.adjacency.clear();
        self.primary = None;
        self.alt_adjacency.clear();
        self.alt_layers.clear();
        self.compressed = false;
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_id(&self) -> i32 {
        self.nodes.len() as i32 - 1
    }

    pub fn id_of(&self, node: &Node) -> Result<i32> {
        self.coord_index.get(&bit_key(node)).copied().ok_or(Error::NotFound)
    }

    pub fn node_of(&self, id: i32) -> Result<Node> {
        self.nodes.get(id as usize).copied().ok_or(Error::OutOfRange)
    }

    pub fn has_key(&self, node: &Node) -> bool {
        self.coord_index.contains_key(&bit_key(node))
    }

    fn layer(&self, cost_name: Option<&str>) -> Result<&CsrLayer> {
        match cost_name {
            None => self.primary.as_ref().ok_or(Error::NoGraph),
            Some(name) => self
                .alt_layers
                .get(name)
                .ok_or_else(|| Error::NoCost(name.to_string())),
        }
    }

    /// Outgoing edges of a node in the current primary layer, with
    /// `step_type` joined from the `"step_type"` alternate layer when one
    /// has been derived (defaulting to `StepType::None` otherwise).
    pub fn subgraph(&self, id: i32) -> Result<(Node, Vec<Edge>)> {
        let parent = self.node_of(id)?;
        let primary = self.primary.as_ref().ok_or(Error::NoGraph)?;
        let (cols, weights) = primary.row(id);
        let step_layer = self.alt_layers.get("step_type");

        let mut edges = Vec::with_capacity(cols.len());
        for (&col, &weight) in cols.iter().zip(weights.iter()) {
            let step_type = step_layer
                .and_then(|layer| {
                    let (scols, sdata) = layer.row(id);
                    scols
                        .iter()
                        .position(|&c| c == col)
                        .map(|i| sdata[i])
                })
                .and_then(StepType::from_f32)
                .unwrap_or(StepType::None);
            edges.push(Edge {
                child: self.node_of(col)?,
                score: weight,
                step_type,
            });
        }
        Ok((parent, edges))
    }

    /// All outgoing edges for a named cost layer (or the primary).
    pub fn edges(&self, cost_name: Option<&str>) -> Result<Vec<EdgeSet>> {
        let layer = self.layer(cost_name)?;
        let mut out = Vec::with_capacity(self.nodes.len());
        for row in 0..self.nodes.len() as i32 {
            let (cols, weights) = layer.row(row);
            let children = cols
                .iter()
                .zip(weights.iter())
                .map(|(&c, &w)| IntEdge {
                    child_id: c,
                    weight: w,
                })
                .collect();
            out.push(EdgeSet {
                parent_id: row,
                children,
            });
        }
        Ok(out)
    }

    /// Per-node reduction over outgoing (and, if `directed=false`, incoming)
    /// edge costs.
    pub fn aggregate(&self, kind: AggKind, directed: bool, cost_name: Option<&str>) -> Result<Vec<f32>> {
        let layer = self.layer(cost_name)?;
        let n = self.nodes.len();
        let mut out = vec![0.0f32; n];

        for row in 0..n as i32 {
            let (_, weights) = layer.row(row);
            out[row as usize] = Self::reduce(kind, weights.iter().copied());
        }

        if !directed {
            // Incoming costs require scanning every row for columns equal
            // to this node; cheap enough given CSR's already-sorted rows.
            let mut incoming: Vec<Vec<f32>> = vec![Vec::new(); n];
            for row in 0..n as i32 {
                let (cols, weights) = layer.row(row);
                for (&c, &w) in cols.iter().zip(weights.iter()) {
                    incoming[c as usize].push(w);
                }
            }
            for row in 0..n {
                let (_, out_weights) = layer.row(row as i32);
                let combined = out_weights.iter().copied().chain(incoming[row].iter().copied());
                out[row] = Self::reduce(kind, combined);
            }
        }

        Ok(out)
    }

    fn reduce(kind: AggKind, values: impl Iterator<Item = f32> + Clone) -> f32 {
        match kind {
            AggKind::Count => values.count() as f32,
            AggKind::Sum => values.sum(),
            AggKind::Average => {
                let count = values.clone().count();
                if count == 0 {
                    0.0
                } else {
                    values.sum::<f32>() / count as f32
                }
            }
            AggKind::Max => {
                let mut any = false;
                let mut m = f32::NEG_INFINITY;
                for v in values {
                    any = true;
                    m = m.max(v);
                }
                if any {
                    m
                } else {
                    0.0
                }
            }
            AggKind::Min => {
                let mut any = false;
                let mut m = f32::INFINITY;
                for v in values {
                    any = true;
                    m = m.min(v);
                }
                if any {
                    m
                } else {
                    0.0
                }
            }
        }
    }

    /// Read-only CSR view for zero-copy consumers.
    pub fn csr_pointers(&self, cost_name: Option<&str>) -> Result<CsrView<'_>> {
        let layer = self.layer(cost_name)?;
        Ok(CsrView {
            nnz: layer.targets.len(),
            rows: self.nodes.len(),
            cols: self.nodes.len(),
            data: &layer.data,
            inner: &layer.targets,
            outer: &layer.offsets,
        })
    }

    /// Row view used internally by the pathfinder: column ids and weights
    /// for one node's out-edges in the given cost layer.
    pub(crate) fn row(&self, id: i32, cost_name: Option<&str>) -> Result<(&[i32], &[f32])> {
        Ok(self.layer(cost_name)?.row(id))
    }

    /// Dumps `{ nodes, edges, costs }` to a JSON file. Tool-facing only,
    /// not a stable wire format.
    pub fn dump_to_json(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        #[derive(serde::Serialize)]
        struct NodeOut {
            id: i32,
            x: f32,
            y: f32,
            z: f32,
        }
        #[derive(serde::Serialize)]
        struct EdgeOut {
            parent_id: i32,
            child_id: i32,
            weight: f32,
        }
        #[derive(serde::Serialize)]
        struct Dump {
            nodes: Vec<NodeOut>,
            edges: Vec<EdgeOut>,
            costs: FxHashMap<String, Vec<EdgeOut>>,
        }

        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeOut {
                id: n.id,
                x: n.x,
                y: n.y,
                z: n.z,
            })
            .collect();

        let primary_edges = self
            .edges(None)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|set| {
                set.children.into_iter().map(move |ie| EdgeOut {
                    parent_id: set.parent_id,
                    child_id: ie.child_id,
                    weight: ie.weight,
                })
            })
            .collect();

        let mut costs = FxHashMap::default();
        for name in self.alt_layers.keys() {
            let layer_edges = self
                .edges(Some(name))
                .unwrap_or_default()
                .into_iter()
                .flat_map(|set| {
                    set.children.into_iter().map(move |ie| EdgeOut {
                        parent_id: set.parent_id,
                        child_id: ie.child_id,
                        weight: ie.weight,
                    })
                })
                .collect();
            costs.insert(name.clone(), layer_edges);
        }

        let dump = Dump {
            nodes,
            edges: primary_edges,
            costs,
        };
        let json = serde_json::to_string_pretty(&dump)
            .map_err(|e| Error::GenericError(e.to_string()))?;
        let mut file =
            std::fs::File::create(path).map_err(|e| Error::GenericError(e.to_string()))?;
        file.write_all(json.as_bytes())
            .map_err(|e| Error::GenericError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn n(x: f32, y: f32, z: f32, id: i32) -> Node {
        Node::new(x, y, z, id, NodeType::Graph)
    }

    #[test]
    fn compress_csr_invariants_hold() {
        let mut g = Graph::new();
        g.add_edge(n(0.0, 0.0, 0.0, -1), n(1.0, 0.0, 0.0, -1), 1.0, None)
            .unwrap();
        g.add_edge(n(0.0, 0.0, 0.0, -1), n(0.0, 1.0, 0.0, -1), 1.0, None)
            .unwrap();
        g.compress();
        let view = g.csr_pointers(None).unwrap();
        assert_eq!(view.outer[view.rows], view.nnz as i32);
        for w in view.outer.windows(2) {
            assert!(w[0] <= w[1]);
        }
        for &col in view.inner {
            assert!((col as usize) < view.rows);
        }
    }

    #[test]
    fn compress_is_idempotent() {
        let mut g = Graph::new();
        g.add_edge(n(0.0, 0.0, 0.0, -1), n(1.0, 0.0, 0.0, -1), 1.0, None)
            .unwrap();
        g.compress();
        let before = g.csr_pointers(None).unwrap().outer.to_vec();
        g.compress();
        let after = g.csr_pointers(None).unwrap().outer.to_vec();
        assert_eq!(before, after);
    }

    #[test]
    fn alt_layer_must_be_subset_of_primary() {
        let mut g = Graph::new();
        g.add_edge(n(0.0, 0.0, 0.0, -1), n(1.0, 0.0, 0.0, -1), 1.0, None)
            .unwrap();
        g.compress();
        let bogus = EdgeSet {
            parent_id: 0,
            children: vec![IntEdge {
                child_id: 1,
                weight: 99.0,
            }],
        };
        assert!(g.add_edges(&[bogus], "ok").is_ok());

        let extra_node = g.register_node(n(5.0, 5.0, 5.0, -1));
        let bad = EdgeSet {
            parent_id: 0,
            children: vec![IntEdge {
                child_id: extra_node,
                weight: 1.0,
            }],
        };
        assert!(g.add_edges(&[bad], "bad").is_err());
    }

    #[test]
    fn add_edges_requires_compressed_primary() {
        let mut g = Graph::new();
        g.add_edge(n(0.0, 0.0, 0.0, -1), n(1.0, 0.0, 0.0, -1), 1.0, None)
            .unwrap();
        let bogus = EdgeSet {
            parent_id: 0,
            children: vec![IntEdge {
                child_id: 1,
                weight: 1.0,
            }],
        };
        assert!(matches!(
            g.add_edges(&[bogus], "too_early"),
            Err(Error::NoGraph)
        ));
    }

    #[test]
    fn aggregate_count_and_sum() {
        let mut g = Graph::new();
        g.add_edge(n(0.0, 0.0, 0.0, -1), n(1.0, 0.0, 0.0, -1), 2.0, None)
            .unwrap();
        g.add_edge(n(0.0, 0.0, 0.0, -1), n(0.0, 1.0, 0.0, -1), 3.0, None)
            .unwrap();
        g.compress();
        let counts = g.aggregate(AggKind::Count, true, None).unwrap();
        assert_eq!(counts[0], 2.0);
        let sums = g.aggregate(AggKind::Sum, true, None).unwrap();
        assert_eq!(sums[0], 5.0);
    }
}

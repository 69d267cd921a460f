use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fxhash::FxHashMap;
use pedscape_core::{Error, Result};
use rayon::prelude::*;

use crate::graph::Graph;
use crate::path::{Path, PathMember};

/// One Dijkstra search result row: distance and predecessor arrays, both
/// of length N. `predecessor[i] == i` is the "no predecessor" sentinel.
#[derive(Debug, Clone)]
struct DijkstraRow {
    distance: Vec<f32>,
    predecessor: Vec<i32>,
}

#[derive(Copy, Clone, PartialEq)]
struct HeapEntry {
    dist: f32,
    node: i32,
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on `dist`.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node.cmp(&self.node))
    }
}

fn dijkstra_row(graph: &Graph, start: i32, cost_name: Option<&str>) -> Result<DijkstraRow> {
    let n = graph.size();
    let mut distance = vec![f32::INFINITY; n];
    let mut predecessor: Vec<i32> = (0..n as i32).collect();
    let mut visited = vec![false; n];

    distance[start as usize] = 0.0;
    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry {
        dist: 0.0,
        node: start,
    });

    while let Some(HeapEntry { dist, node }) = heap.pop() {
        let idx = node as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;

        let (targets, weights) = graph.row(node, cost_name)?;
        for (&child, &weight) in targets.iter().zip(weights.iter()) {
            let next_dist = dist + weight;
            let child_idx = child as usize;
            if next_dist < distance[child_idx] {
                distance[child_idx] = next_dist;
                predecessor[child_idx] = node;
                heap.push(HeapEntry {
                    dist: next_dist,
                    node: child,
                });
            }
        }
    }

    Ok(DijkstraRow {
        distance,
        predecessor,
    })
}

fn reconstruct(row: &DijkstraRow, start: i32, end: i32) -> Path {
    if start == end {
        return Path::new(vec![PathMember {
            node_id: start,
            cost_to_next: 0.0,
        }]);
    }
    if row.predecessor[end as usize] == end {
        return Path::new(Vec::new());
    }

    let n = row.distance.len();
    let mut chain = vec![end];
    let mut cur = end;
    for _ in 0..=n {
        if cur == start {
            break;
        }
        cur = row.predecessor[cur as usize];
        chain.push(cur);
        assert!(
            chain.len() <= n + 1,
            "path reconstruction exceeded node count: predecessor chain is corrupt"
        );
    }
    chain.reverse();

    let mut members = Vec::with_capacity(chain.len());
    for i in 0..chain.len() {
        let cost_to_next = if i + 1 < chain.len() {
            row.distance[chain[i + 1] as usize] - row.distance[chain[i] as usize]
        } else {
            0.0
        };
        members.push(PathMember {
            node_id: chain[i],
            cost_to_next,
        });
    }
    Path::new(members)
}

/// Dijkstra-based path queries over a borrowed `Graph`.
pub struct Pathfinder<'g> {
    graph: &'g Graph,
}

impl<'g> Pathfinder<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Pathfinder { graph }
    }

    fn check_node(&self, id: i32) -> Result<()> {
        if id < 0 || id as usize >= self.graph.size() {
            Err(Error::OutOfRange)
        } else {
            Ok(())
        }
    }

    pub fn find_path(&self, start: i32, end: i32, cost_name: Option<&str>) -> Result<Path> {
        self.check_node(start)?;
        self.check_node(end)?;
        let row = dijkstra_row(self.graph, start, cost_name)?;
        Ok(reconstruct(&row, start, end))
    }

    /// Memoizes Dijkstra per distinct start, then reconstructs each pair.
    pub fn find_paths(
        &self,
        starts: &[i32],
        ends: &[i32],
        cost_name: Option<&str>,
    ) -> Result<Vec<Path>> {
        if starts.len() != ends.len() {
            return Err(Error::InvalidArgument(
                "starts and ends must have matching length".into(),
            ));
        }
        for &s in starts {
            self.check_node(s)?;
        }
        for &e in ends {
            self.check_node(e)?;
        }

        let mut cache: FxHashMap<i32, DijkstraRow> = FxHashMap::default();
        let mut out = Vec::with_capacity(starts.len());
        for (&s, &e) in starts.iter().zip(ends.iter()) {
            if !cache.contains_key(&s) {
                cache.insert(s, dijkstra_row(self.graph, s, cost_name)?);
            }
            out.push(reconstruct(&cache[&s], s, e));
        }
        Ok(out)
    }

    /// Every ordered pair `(i, j)` in row-major order.
    pub fn all_to_all_paths(&self, cost_name: Option<&str>) -> Result<Vec<Path>> {
        let n = self.graph.size() as i32;
        let rows: Result<Vec<DijkstraRow>> = (0..n)
            .into_par_iter()
            .map(|s| dijkstra_row(self.graph, s, cost_name))
            .collect();
        let rows = rows?;

        let mut out = Vec::with_capacity((n * n) as usize);
        for i in 0..n {
            for j in 0..n {
                out.push(reconstruct(&rows[i as usize], i, j));
            }
        }
        Ok(out)
    }

    /// One Dijkstra per row, computed in parallel; unreachable cells map to
    /// `dist = -1, pred = -1`.
    pub fn distance_and_predecessor_matrix(
        &self,
        cost_name: Option<&str>,
    ) -> Result<(Vec<f32>, Vec<i32>)> {
        let start = std::time::Instant::now();
        let n = self.graph.size() as i32;
        let rows: Result<Vec<DijkstraRow>> = (0..n)
            .into_par_iter()
            .map(|s| dijkstra_row(self.graph, s, cost_name))
            .collect();
        let rows = rows?;

        let mut dist = vec![0.0f32; (n * n) as usize];
        let mut pred = vec![0i32; (n * n) as usize];
        for i in 0..n as usize {
            for j in 0..n as usize {
                let idx = i * n as usize + j;
                if rows[i].distance[j].is_finite() {
                    dist[idx] = rows[i].distance[j];
                    pred[idx] = rows[i].predecessor[j];
                } else {
                    dist[idx] = -1.0;
                    pred[idx] = -1;
                }
            }
        }
        log::info!(
            "computed {}x{} distance/predecessor matrix in {:?}",
            n,
            n,
            start.elapsed()
        );
        Ok((dist, pred))
    }

    /// Every `(i, j)` path concatenated; `lengths[i*N+j]` is the path's
    /// node count (0 for unreachable pairs and for `i == j`).
    pub fn all_pred_to_path(&self, cost_name: Option<&str>) -> Result<(Vec<i32>, Vec<i32>)> {
        let n = self.graph.size() as i32;
        let rows: Result<Vec<DijkstraRow>> = (0..n)
            .into_par_iter()
            .map(|s| dijkstra_row(self.graph, s, cost_name))
            .collect();
        let rows = rows?;

        let mut nodes_flat = Vec::new();
        let mut lengths = vec![0i32; (n * n) as usize];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let path = reconstruct(&rows[i as usize], i, j);
                if path.is_empty() {
                    continue;
                }
                let idx = (i * n + j) as usize;
                lengths[idx] = path.len() as i32;
                nodes_flat.extend(path.members().iter().map(|m| m.node_id));
            }
        }
        Ok((nodes_flat, lengths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeType};

    fn n(id: i32) -> Node {
        Node::new(id as f32, 0.0, 0.0, id, NodeType::Graph)
    }

    fn scenario_graph() -> Graph {
        // 0->1 (1), 0->2 (2), 1->3 (3), 2->4 (1), 3->4 (5)
        let mut g = Graph::new();
        for _ in 0..5 {
            // ensure dense ids 0..5 regardless of insertion order below
        }
        g.add_edge(n(0), n(1), 1.0, None).unwrap();
        g.add_edge(n(0), n(2), 2.0, None).unwrap();
        g.add_edge(n(1), n(3), 3.0, None).unwrap();
        g.add_edge(n(2), n(4), 1.0, None).unwrap();
        g.add_edge(n(3), n(4), 5.0, None).unwrap();
        g.compress();
        g
    }

    #[test]
    fn find_path_matches_literal_scenario() {
        let g = scenario_graph();
        let pf = Pathfinder::new(&g);
        let path = pf.find_path(0, 4, None).unwrap();
        let ids: Vec<i32> = path.members().iter().map(|m| m.node_id).collect();
        assert_eq!(ids, vec![0, 2, 4]);
        let costs: Vec<f32> = path.members().iter().map(|m| m.cost_to_next).collect();
        assert_eq!(costs, vec![2.0, 1.0, 0.0]);
        assert_eq!(path.cost_sum(), 3.0);
    }

    #[test]
    fn find_path_same_node_is_trivial() {
        let g = scenario_graph();
        let pf = Pathfinder::new(&g);
        let path = pf.find_path(2, 2, None).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.members()[0].cost_to_next, 0.0);
    }

    #[test]
    fn unreachable_pair_returns_empty_path() {
        let mut g = Graph::new();
        g.add_edge(n(0), n(1), 1.0, None).unwrap();
        // node 2 has no inbound edge from 0
        g.add_edge(n(2), n(1), 1.0, None).unwrap();
        g.compress();
        let pf = Pathfinder::new(&g);
        let path = pf.find_path(0, 2, None).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn distance_matrix_diagonal_is_zero_and_unreachable_is_sentinel() {
        let g = scenario_graph();
        let pf = Pathfinder::new(&g);
        let (dist, _pred) = pf.distance_and_predecessor_matrix(None).unwrap();
        let n5 = 5;
        for i in 0..n5 {
            assert_eq!(dist[i * n5 + i], 0.0);
        }
        // node 4 has no outgoing edges, so row 4 is unreachable elsewhere
        assert_eq!(dist[4 * n5 + 0], -1.0);
    }

    #[test]
    fn find_path_cost_matches_distance_matrix() {
        let g = scenario_graph();
        let pf = Pathfinder::new(&g);
        let (dist, _) = pf.distance_and_predecessor_matrix(None).unwrap();
        let path = pf.find_path(0, 4, None).unwrap();
        assert_eq!(path.cost_sum(), dist[0 * 5 + 4]);
    }
}

use glam::DVec3;
use pedscape_core::{RayTracer, Result};
use pedscape_graph::{Graph, Node, NodeType, StepType, UniqueQueue};
use rayon::prelude::*;

use crate::directions::generate_directions;
use crate::params::{GoalFlag, GraphParams, HitFilterMode};

fn passes_filter(mesh_id: i32, goal: GoalFlag, params: &GraphParams) -> bool {
    if params.hit_filter_mode == HitFilterMode::AllIntersections || goal == GoalFlag::Both {
        return true;
    }
    match params.hit_filter_mode {
        HitFilterMode::ObstaclesOnly => {
            if goal == GoalFlag::Obstacles {
                params.obstacle_ids.contains(&mesh_id)
            } else {
                !params.obstacle_ids.contains(&mesh_id)
            }
        }
        HitFilterMode::ObstaclesAndFloors => match goal {
            GoalFlag::Obstacles => params.obstacle_ids.contains(&mesh_id),
            GoalFlag::Floors => params.walkable_ids.contains(&mesh_id),
            GoalFlag::Both => unreachable!(),
        },
        HitFilterMode::AllIntersections => unreachable!(),
    }
}

/// Casts a straight-down ray tagged with `goal`, filtering the hit against
/// the configured mesh-id mode.
fn check_ray(rt: &RayTracer, origin: DVec3, goal: GoalFlag, params: &GraphParams) -> Option<f64> {
    let hit = rt.intersect(origin, DVec3::new(0.0, 0.0, -1.0));
    if !hit.did_hit() {
        return None;
    }
    if passes_filter(hit.mesh_id, goal, params) {
        Some(origin.z - hit.distance)
    } else {
        None
    }
}

/// A parallel breadth-first crawl over a mesh's walkable surface, emitting
/// graph nodes at valid positions and edges annotated (via the separately
/// derived `"step_type"` cost layer) with how the step crosses the terrain.
pub struct GraphGenerator<'a> {
    raytracer: &'a RayTracer,
    params: GraphParams,
}

impl<'a> GraphGenerator<'a> {
    pub fn new(raytracer: &'a RayTracer, params: GraphParams) -> Self {
        GraphGenerator { raytracer, params }
    }

    /// Casts a ray straight down from the (rounded) start point; snaps Z to
    /// the hit when one lands on walkable geometry, otherwise signals an
    /// empty graph.
    fn validate_start(&self) -> Option<Node> {
        let x = self.params.round_spacing_x(self.params.start_point.x);
        let y = self.params.round_spacing_y(self.params.start_point.y);
        let origin = DVec3::new(x as f64, y as f64, self.params.start_point.z as f64);
        let hit_z = check_ray(self.raytracer, origin, GoalFlag::Floors, &self.params)?;
        let z = self.params.round_z(hit_z as f32);
        Some(Node::new(x, y, z, 0, NodeType::Graph))
    }

    fn validate_ground(&self, parent: &Node, x: f32, y: f32, z_guess: f32) -> Option<Node> {
        let origin = DVec3::new(x as f64, y as f64, z_guess as f64);
        let hit_z = check_ray(self.raytracer, origin, GoalFlag::Floors, &self.params)?;
        let z = self.params.round_z(hit_z as f32);
        let dz = z - parent.z;
        if dz > 0.0 && dz >= self.params.up_step {
            return None;
        }
        if dz < 0.0 && -dz >= self.params.down_step {
            return None;
        }
        Some(Node::new(x, y, z, -1, NodeType::Graph))
    }

    /// Occlusion-test parent -> child at the given offsets, returning
    /// whether the ray between them is clear.
    fn is_clear(&self, parent: &Node, child: &Node, parent_lift: f32, child_lift: f32) -> bool {
        let p = DVec3::new(
            parent.x as f64,
            parent.y as f64,
            parent.z as f64 + parent_lift as f64,
        );
        let c = DVec3::new(
            child.x as f64,
            child.y as f64,
            child.z as f64 + child_lift as f64,
        );
        let delta = c - p;
        let dist = delta.length();
        if dist < 1e-9 {
            return true;
        }
        !self.raytracer.occluded(p, delta / dist, dist)
    }

    /// Two-pass classification: a flat/slope/blocked test with the shared
    /// ground offset, then, if blocked, a re-test with the lower endpoint
    /// (Up/Over) or higher endpoint (Down) lifted by the full step height.
    fn classify_connection(&self, parent: &Node, child: &Node) -> StepType {
        let go = self.params.precision.ground_offset;
        if self.is_clear(parent, child, go, go) {
            let dz = child.z - parent.z;
            if dz.abs() < go {
                return StepType::None;
            }
            let horiz = ((child.x - parent.x).powi(2) + (child.y - parent.y).powi(2)).sqrt();
            let slope_deg = dz.atan2(horiz).to_degrees();
            if slope_deg > -self.params.down_slope && slope_deg < self.params.up_slope {
                return StepType::None;
            }
            return StepType::NotConnected;
        }

        let tentative = if child.z > parent.z {
            StepType::Up
        } else if child.z < parent.z {
            StepType::Down
        } else {
            StepType::Over
        };

        let clear = match tentative {
            StepType::Up | StepType::Over => {
                self.is_clear(parent, child, self.params.up_step, go)
            }
            StepType::Down => self.is_clear(parent, child, self.params.down_step + go, go),
            _ => unreachable!(),
        };

        if clear {
            tentative
        } else {
            StepType::NotConnected
        }
    }

    /// Both validation passes for one candidate direction from `parent`.
    fn classify_child(&self, parent: &Node, dx: i32, dy: i32) -> Option<(Node, f32, StepType)> {
        let sx = self.params.spacing.x;
        let sy = self.params.spacing.y;
        let sz = self.params.spacing.z;
        let x = self.params.round_spacing_x(parent.x + dx as f32 * sx);
        let y = self.params.round_spacing_y(parent.y + dy as f32 * sy);
        let z_guess = self.params.round_z(parent.z + sz);

        let child = self.validate_ground(parent, x, y, z_guess)?;
        let step_type = self.classify_connection(parent, &child);
        if step_type == StepType::NotConnected {
            return None;
        }
        let dist = parent.distance_to(&child);
        Some((child, dist, step_type))
    }

    fn generate_children(&self, parent: &Node) -> Vec<(Node, f32, StepType)> {
        generate_directions(self.params.max_step_connection)
            .into_iter()
            .filter_map(|(dx, dy)| self.classify_child(parent, dx, dy))
            .collect()
    }

    /// Runs the crawl to completion and returns the compressed graph.
    pub fn build_network(&self) -> Result<Graph> {
        let start_time = std::time::Instant::now();
        let mut graph = Graph::new();
        let Some(start) = self.validate_start() else {
            log::info!("crawl start point has no geometry below it; returning empty graph");
            return Ok(graph);
        };

        let mut queue = UniqueQueue::new();
        queue.push(start);
        let mut num_nodes: i32 = 0;

        if self.params.core_count == 0 || self.params.core_count == 1 {
            self.crawl_serial(&mut graph, &mut queue, &mut num_nodes)?;
        } else {
            self.crawl_parallel(&mut graph, &mut queue, &mut num_nodes)?;
        }

        graph.compress();
        log::info!(
            "crawl reached {} nodes in {:?}",
            num_nodes,
            start_time.elapsed()
        );
        Ok(graph)
    }

    fn budget_reached(&self, num_nodes: i32) -> bool {
        self.params.max_nodes >= 0 && num_nodes >= self.params.max_nodes
    }

    fn crawl_serial(
        &self,
        graph: &mut Graph,
        queue: &mut UniqueQueue,
        num_nodes: &mut i32,
    ) -> Result<()> {
        while !self.budget_reached(*num_nodes) {
            let Some(parent) = queue.pop() else {
                break;
            };
            let children = self.generate_children(&parent);
            if (children.len() as i32) < self.params.min_connections {
                continue;
            }
            for (child, dist, _step_type) in children {
                graph.add_edge(parent, child, dist, None)?;
                queue.push(child);
            }
            *num_nodes += 1;
        }
        Ok(())
    }

    fn crawl_parallel(
        &self,
        graph: &mut Graph,
        queue: &mut UniqueQueue,
        num_nodes: &mut i32,
    ) -> Result<()> {
        let threads = if self.params.core_count < 0 {
            num_cpus::get()
        } else {
            self.params.core_count.max(1) as usize
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| pedscape_core::Error::GenericError(e.to_string()))?;

        loop {
            if queue.empty() || self.budget_reached(*num_nodes) {
                break;
            }
            let remaining_budget = if self.params.max_nodes < 0 {
                queue.size()
            } else {
                (self.params.max_nodes - *num_nodes).max(0) as usize
            };
            let batch_size = queue.size().min(remaining_budget.max(1));
            let batch = queue.pop_many(batch_size);
            if batch.is_empty() {
                break;
            }

            // Per-parent child generation runs in parallel; the results are
            // then applied to the graph and queue sequentially to keep id
            // assignment deterministic.
            let results: Vec<(Node, Vec<(Node, f32, StepType)>)> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|parent| (*parent, self.generate_children(parent)))
                    .collect()
            });

            for (parent, children) in results {
                if self.budget_reached(*num_nodes) {
                    break;
                }
                if (children.len() as i32) < self.params.min_connections {
                    continue;
                }
                for (child, dist, _step_type) in children {
                    graph.add_edge(parent, child, dist, None)?;
                    queue.push(child);
                }
                *num_nodes += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use pedscape_core::Mesh;
    use std::collections::HashSet;

    fn flat_plane_raytracer() -> RayTracer {
        let verts = vec![
            Vec3::new(-10.0, -10.0, 0.0),
            Vec3::new(10.0, -10.0, 0.0),
            Vec3::new(10.0, 10.0, 0.0),
            Vec3::new(-10.0, 10.0, 0.0),
        ];
        let idx = vec![[0, 1, 2], [0, 2, 3]];
        let mesh = Mesh::from_indexed(verts, idx, 0, "plane").unwrap();
        let mut rt = RayTracer::new(true);
        rt.add_mesh(&mesh, true).unwrap();
        rt
    }

    fn scenario_1_params(max_nodes: i32, core_count: i32) -> GraphParams {
        GraphParams {
            start_point: Vec3::new(0.0, 0.0, 0.25),
            spacing: Vec3::new(1.0, 1.0, 1.0),
            max_nodes,
            up_step: 1.0,
            down_step: 1.0,
            up_slope: 45.0,
            down_slope: 45.0,
            max_step_connection: 1,
            min_connections: 1,
            precision: crate::params::Precision::new(0.01, 0.01, 0.01),
            core_count,
            hit_filter_mode: HitFilterMode::AllIntersections,
            obstacle_ids: vec![],
            walkable_ids: vec![],
        }
    }

    #[test]
    fn flat_plane_accessibility_yields_flat_edges() {
        let rt = flat_plane_raytracer();
        let params = scenario_1_params(5, 1);
        let gen = GraphGenerator::new(&rt, params);
        let graph = gen.build_network().unwrap();

        assert!(graph.size() >= 5);
        for node in graph.nodes() {
            assert!((node.z - 0.0).abs() < 0.01);
        }
        let (_, edges) = graph.subgraph(0).unwrap();
        for edge in &edges {
            assert!((edge.score - 1.0).abs() < 1e-4 || (edge.score - std::f32::consts::SQRT_2).abs() < 1e-4);
        }
    }

    #[test]
    fn start_with_no_geometry_below_yields_empty_graph() {
        let rt = flat_plane_raytracer();
        let mut params = scenario_1_params(5, 1);
        params.start_point = Vec3::new(1000.0, 1000.0, 0.25);
        let gen = GraphGenerator::new(&rt, params);
        let graph = gen.build_network().unwrap();
        assert_eq!(graph.size(), 0);
    }

    #[test]
    fn serial_and_parallel_crawl_reach_the_same_coordinate_set() {
        let rt = flat_plane_raytracer();
        let serial_params = scenario_1_params(50, 1);
        let parallel_params = scenario_1_params(50, 4);

        let serial_graph = GraphGenerator::new(&rt, serial_params).build_network().unwrap();
        let parallel_graph = GraphGenerator::new(&rt, parallel_params).build_network().unwrap();

        let to_set = |g: &Graph| -> HashSet<(i64, i64, i64)> {
            g.nodes()
                .iter()
                .map(|n| {
                    (
                        (n.x * 1000.0).round() as i64,
                        (n.y * 1000.0).round() as i64,
                        (n.z * 1000.0).round() as i64,
                    )
                })
                .collect()
        };

        assert_eq!(to_set(&serial_graph), to_set(&parallel_graph));
    }

    #[test]
    fn wall_occludes_visibility_between_opposite_observers() {
        // Flat plane plus a vertical wall along y=0.
        let plane_verts = vec![
            Vec3::new(-10.0, -10.0, 0.0),
            Vec3::new(10.0, -10.0, 0.0),
            Vec3::new(10.0, 10.0, 0.0),
            Vec3::new(-10.0, 10.0, 0.0),
        ];
        let plane_idx = vec![[0u32, 1, 2], [0, 2, 3]];
        let plane = Mesh::from_indexed(plane_verts, plane_idx, 0, "plane").unwrap();

        let wall_verts = vec![
            Vec3::new(-10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 5.0),
            Vec3::new(-10.0, 0.0, 5.0),
        ];
        let wall_idx = vec![[0u32, 1, 2], [0, 2, 3]];
        let wall = Mesh::from_indexed(wall_verts, wall_idx, 1, "wall").unwrap();

        let mut rt = RayTracer::new(true);
        rt.add_mesh(&plane, false).unwrap();
        rt.add_mesh(&wall, true).unwrap();

        let gen = GraphGenerator::new(
            &rt,
            GraphParams {
                start_point: Vec3::new(0.0, -1.0, 1.7),
                ..scenario_1_params(-1, 1)
            },
        );
        // Build two tiny single-node "graphs" directly via the occlusion
        // classifier rather than a full crawl, to test visibility across
        // the wall specifically.
        let observer_a = pedscape_graph::Node::new(0.0, -1.0, 1.7, 0, NodeType::Graph);
        let observer_b = pedscape_graph::Node::new(0.0, 1.0, 1.7, 1, NodeType::Graph);
        let step = gen.classify_connection(&observer_a, &observer_b);
        assert_eq!(step, StepType::NotConnected);
    }
}

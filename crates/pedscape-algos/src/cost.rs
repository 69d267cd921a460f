use glam::DVec3;
use pedscape_core::RayTracer;
use pedscape_graph::{EdgeSet, Graph, IntEdge, Node, Result, StepType};

use crate::params::GraphParams;

fn is_clear(rt: &RayTracer, parent: &Node, child: &Node, parent_lift: f32, child_lift: f32) -> bool {
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
    !rt.occluded(p, delta / dist, dist)
}

/// Re-classifies an already-traversable edge. Since the edge is known to be
/// traversable by construction, a clear parent-child sightline is reported
/// flat without re-checking the slope limits (unlike the generator's first
/// classification pass, which still has to decide whether to keep the edge
/// at all).
fn classify_for_cost(rt: &RayTracer, parent: &Node, child: &Node, params: &GraphParams) -> StepType {
    let go = params.precision.ground_offset;
    if is_clear(rt, parent, child, go, go) {
        return StepType::None;
    }

    let tentative = if child.z > parent.z {
        StepType::Up
    } else if child.z < parent.z {
        StepType::Down
    } else {
        StepType::Over
    };

    let clear = match tentative {
        StepType::Up | StepType::Over => is_clear(rt, parent, child, params.up_step, go),
        StepType::Down => is_clear(rt, parent, child, params.down_step + go, go),
        _ => unreachable!(),
    };

    if clear {
        tentative
    } else {
        StepType::NotConnected
    }
}

/// Walks every (parent, child) edge of `graph`'s primary layer, classifies
/// it with `f`, and writes the result into a new alternate cost layer named
/// `cost_name`. Idempotent: re-running with the same `f` overwrites the
/// layer with identical values.
pub fn derive_cost_layer<F>(graph: &mut Graph, cost_name: &str, mut f: F) -> Result<()>
where
    F: FnMut(Node, Node) -> f32,
{
    let edge_sets = graph.edges(None)?;
    let mut derived = Vec::with_capacity(edge_sets.len());
    for set in edge_sets {
        let parent = graph.node_of(set.parent_id)?;
        let mut children = Vec::with_capacity(set.children.len());
        for ie in &set.children {
            let child = graph.node_of(ie.child_id)?;
            children.push(IntEdge {
                child_id: ie.child_id,
                weight: f(parent, child),
            });
        }
        derived.push(EdgeSet {
            parent_id: set.parent_id,
            children,
        });
    }
    graph.add_edges(&derived, cost_name)
}

/// Re-derives the `"step_type"` alternate cost layer for every edge already
/// present in the compressed primary layer.
pub fn calculate_step_type(graph: &mut Graph, rt: &RayTracer, params: &GraphParams) -> Result<()> {
    derive_cost_layer(graph, "step_type", |parent, child| {
        classify_for_cost(rt, &parent, &child, params).as_f32()
    })
}

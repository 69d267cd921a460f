//! Common imports for callers driving the whole pipeline: load a mesh, hand
//! it to a `RayTracer`, crawl an accessibility `Graph` with a
//! `GraphGenerator`, then query it with a `Pathfinder` or `ViewAnalysis`.

pub use pedscape_core::{Error, HitStruct, Mesh, RayTracer, Result, Vec3, Vec3d, NO_HIT};

pub use pedscape_graph::{
    AggKind, Edge, EdgeSet, Graph, IntEdge, Node, NodeType, Path, PathMember, Pathfinder,
    StepType, UniqueQueue,
};

pub use pedscape_algos::{
    calculate_step_type, derive_cost_layer, AggregationKind, GoalFlag, GraphGenerator,
    GraphParams, HitFilterMode, Precision, ViewAnalysis,
};

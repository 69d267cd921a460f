//! Human-scale spatial analysis over 3D building meshes.
//!
//! This crate is a thin facade over the three layers that do the actual
//! work: [`pedscape_core`] (meshes and ray intersection), [`pedscape_graph`]
//! (the accessibility graph and Dijkstra pathfinder), and [`pedscape_algos`]
//! (the graph generator, view analysis, and cost-layer derivations). Most
//! callers only need `pedscape::prelude::*`.

pub use pedscape_algos as algos;
pub use pedscape_core as core;
pub use pedscape_graph as graph;

pub mod prelude;

//! Node/edge types, the sparse multi-cost `Graph`, `UniqueQueue`, and the
//! Dijkstra-based `Pathfinder`.

pub mod edge;
pub mod graph;
pub mod node;
pub mod path;
pub mod pathfinder;
pub mod queue;

pub use edge::{Edge, EdgeSet, IntEdge, StepType};
pub use graph::{AggKind, CsrView, Graph};
pub use node::{Node, NodeType};
pub use path::{Path, PathMember};
pub use pathfinder::Pathfinder;
pub use queue::UniqueQueue;

pub use pedscape_core::{Error, Result};

//! Accessibility graph generation, spherical view analysis, and the
//! cost-layer derivation passes that run on top of a generated graph.

pub mod cost;
pub mod directions;
pub mod generator;
pub mod params;
pub mod view;

pub use cost::{calculate_step_type, derive_cost_layer};
pub use generator::GraphGenerator;
pub use params::{GoalFlag, GraphParams, HitFilterMode, Precision};
pub use view::{AggregationKind, ViewAnalysis};

pub use pedscape_core::{Error, Result};

use glam::Vec3;

/// The classification a downward ray is cast on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalFlag {
    Floors,
    Obstacles,
    Both,
}

/// How a hit's mesh id is filtered against `obstacle_ids`/`walkable_ids`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitFilterMode {
    AllIntersections,
    ObstaclesOnly,
    ObstaclesAndFloors,
}

/// Rounding and ray-bias precisions for the crawl.
#[derive(Debug, Clone, Copy)]
pub struct Precision {
    pub node_z: f32,
    pub node_spacing: f32,
    pub ground_offset: f32,
}

impl Precision {
    pub fn new(node_z: f32, node_spacing: f32, ground_offset: f32) -> Self {
        assert!(
            ground_offset >= node_z,
            "ground_offset must be >= node_z precision"
        );
        Precision {
            node_z,
            node_spacing,
            ground_offset,
        }
    }
}

/// The parameter bundle threaded through every crawl helper, collapsing the
/// generator's separate "private implementation" type into one struct
/// passed by shared borrow.
#[derive(Debug, Clone)]
pub struct GraphParams {
    pub start_point: Vec3,
    pub spacing: Vec3,
    pub max_nodes: i32,
    pub up_step: f32,
    pub down_step: f32,
    pub up_slope: f32,
    pub down_slope: f32,
    pub max_step_connection: i32,
    pub min_connections: i32,
    pub precision: Precision,
    /// -1 = all cores, 0/1 = serial, else thread count.
    pub core_count: i32,
    pub hit_filter_mode: HitFilterMode,
    pub obstacle_ids: Vec<i32>,
    pub walkable_ids: Vec<i32>,
}

impl GraphParams {
    pub fn round_spacing_x(&self, v: f32) -> f32 {
        round_to(v, self.precision.node_spacing)
    }

    pub fn round_spacing_y(&self, v: f32) -> f32 {
        round_to(v, self.precision.node_spacing)
    }

    pub fn round_z(&self, v: f32) -> f32 {
        round_to(v, self.precision.node_z)
    }
}

pub(crate) fn round_to(value: f32, precision: f32) -> f32 {
    if precision <= 0.0 {
        return value;
    }
    (value / precision).round() * precision
}

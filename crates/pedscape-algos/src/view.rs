use glam::Vec3;
use pedscape_core::{HitStruct, RayTracer, Result};
use rayon::prelude::*;

/// Golden-angle increment used by the Fibonacci sphere distribution.
fn golden_increment() -> f32 {
    std::f32::consts::PI * (3.0 - 5.0f32.sqrt())
}

fn to_radians(degrees: f32) -> f32 {
    degrees.to_radians()
}

/// Altitude of a direction vector, measured as the polar angle of its third
/// (z) component against the vector's own magnitude — matching the exact
/// construction below, where the height parameter of the Fibonacci sweep
/// does not coincide with the axis the field-of-view limits are checked
/// against.
fn altitude_within_range(p: Vec3, max_angle: f32, min_angle: f32) -> bool {
    let r = p.length();
    let phi = (p.z / r).acos();
    phi >= min_angle && phi <= max_angle
}

/// One raw pass of the Fibonacci sweep: `num_points` requested, yields at
/// most that many directions after FOV trimming.
fn fibbonacci_dist(num_points: i32, upward_fov: f32, downward_fov: f32) -> Vec<Vec3> {
    if num_points <= 0 {
        return Vec::new();
    }
    let upper_limit = to_radians(upward_fov);
    let lower_limit = to_radians(downward_fov);
    let max_phi = std::f32::consts::FRAC_PI_2 + lower_limit;
    let min_phi = std::f32::consts::FRAC_PI_2 - upper_limit;

    let n = num_points;
    let offset = 2.0 / n as f32;
    let increment = golden_increment();

    let mut out = Vec::new();
    for i in 5..n + 5 {
        let y = (i as f32 * offset) - 1.0 - (offset / 0.2);
        let r = (1.0 - y * y).sqrt();
        let phi = (i + 1) as f32 * increment;
        let x = phi.cos() * r;
        let z = phi.sin() * r;

        if !x.is_finite() || !y.is_finite() || !z.is_finite() {
            continue;
        }
        let p = Vec3::new(x, y, z).normalize();
        if altitude_within_range(p, max_phi, min_phi) {
            out.push(p);
        }
    }
    out
}

/// Runs the sweep once, then re-runs with a corrected `n` that compensates
/// for the fraction of points the FOV trim discarded, so the final count
/// approximates the caller's request.
fn fibbonacci_distribute_points(num_points: i32, upward_fov: f32, downward_fov: f32) -> Vec<Vec3> {
    let first_pass = fibbonacci_dist(num_points, upward_fov, downward_fov);
    if first_pass.len() as i32 >= num_points || first_pass.is_empty() {
        return first_pass;
    }
    let points_removed = num_points - first_pass.len() as i32;
    let percent_removed = points_removed as f64 / num_points as f64;
    if percent_removed >= 1.0 {
        return first_pass;
    }
    let corrected_n = (num_points as f64 / (1.0 - percent_removed)) as i32;
    fibbonacci_dist(corrected_n, upward_fov, downward_fov)
}

/// Per-node reduction kind for `ViewAnalysis::aggregate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    Count,
    Sum,
    Average,
    Max,
    Min,
}

fn reduce(kind: AggregationKind, hits: &[HitStruct]) -> f32 {
    let hit_distances = || hits.iter().filter(|h| h.did_hit()).map(|h| h.distance as f32);
    match kind {
        AggregationKind::Count => hits.iter().filter(|h| h.did_hit()).count() as f32,
        AggregationKind::Sum => hit_distances().sum(),
        AggregationKind::Average => {
            let mut sum = 0.0f32;
            let mut count = 0u32;
            for d in hit_distances() {
                count += 1;
                sum += d;
            }
            if count == 0 {
                0.0
            } else {
                sum / count as f32
            }
        }
        AggregationKind::Max => hit_distances().fold(0.0f32, f32::max),
        AggregationKind::Min => {
            let m = hit_distances().fold(f32::INFINITY, f32::min);
            if m.is_finite() {
                m
            } else {
                0.0
            }
        }
    }
}

/// Spherical view analysis over a RayTracer's geometry: generates a
/// Fibonacci-distributed direction set and casts it from each observer node.
pub struct ViewAnalysis<'a> {
    raytracer: &'a RayTracer,
}

impl<'a> ViewAnalysis<'a> {
    pub fn new(raytracer: &'a RayTracer) -> Self {
        ViewAnalysis { raytracer }
    }

    /// Isotropic distribute-only API for callers that want to cast their
    /// own rays.
    pub fn distribute(num_points: i32, upward_fov: f32, downward_fov: f32) -> Vec<Vec3> {
        fibbonacci_distribute_points(num_points, upward_fov, downward_fov)
    }

    fn cast_from(&self, origin: Vec3, directions: &[Vec3]) -> Vec<HitStruct> {
        let origin = origin.as_dvec3();
        directions
            .iter()
            .map(|d| self.raytracer.intersect(origin, d.as_dvec3()))
            .collect()
    }

    /// Flat per-ray results: record `i*K + k` is node `i`'s hit along
    /// direction `k`.
    pub fn no_aggregate(&self, nodes: &[Vec3], height: f32, directions: &[Vec3]) -> Result<Vec<HitStruct>> {
        let rows: Vec<Vec<HitStruct>> = nodes
            .par_iter()
            .map(|&node| {
                let origin = node + Vec3::new(0.0, 0.0, height);
                self.cast_from(origin, directions)
            })
            .collect();
        Ok(rows.into_iter().flatten().collect())
    }

    /// One aggregated score per node.
    pub fn aggregate(
        &self,
        nodes: &[Vec3],
        height: f32,
        directions: &[Vec3],
        kind: AggregationKind,
    ) -> Result<Vec<f32>> {
        let scores: Vec<f32> = nodes
            .par_iter()
            .map(|&node| {
                let origin = node + Vec3::new(0.0, 0.0, height);
                let hits = self.cast_from(origin, directions);
                reduce(kind, &hits)
            })
            .collect();
        Ok(scores)
    }
}

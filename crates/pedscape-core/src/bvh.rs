use glam::DVec3;

/// Axis-aligned bounding box in the raytracer's double-precision space.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn empty() -> Self {
        Aabb {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    pub fn expand(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn centroid(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn longest_axis(&self) -> usize {
        let extent = self.max - self.min;
        if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        }
    }

    /// Slab-test intersection; returns the entry distance if the ray hits
    /// this box within `[0, t_max]`.
    pub fn ray_intersect(&self, origin: DVec3, inv_dir: DVec3, t_max: f64) -> Option<f64> {
        let mut t_min = 0.0f64;
        let mut t_max = t_max;
        for axis in 0..3 {
            let o = origin[axis];
            let d = inv_dir[axis];
            let mut t0 = (self.min[axis] - o) * d;
            let mut t1 = (self.max[axis] - o) * d;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return None;
            }
        }
        Some(t_min)
    }
}

/// A BVH node: either a leaf over a contiguous range of `triangle_ids`, or
/// an internal split with two children.
#[derive(Debug, Clone)]
pub(crate) enum BvhNode {
    Leaf {
        aabb: Aabb,
        start: u32,
        count: u32,
    },
    Branch {
        aabb: Aabb,
        left: u32,
        right: u32,
    },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } => aabb,
            BvhNode::Branch { aabb, .. } => aabb,
        }
    }
}

const LEAF_THRESHOLD: usize = 4;

/// Binary AABB tree over a flat list of global triangle ids. Built once by
/// recursive median splitting on triangle centroids along the longest axis,
/// the same recursive-split shape as an octree accelerator generalized to
/// two-way splitting.
#[derive(Debug, Clone)]
pub(crate) struct Bvh {
    nodes: Vec<BvhNode>,
    root: Option<u32>,
    /// Global triangle ids, reordered so each leaf's range is contiguous.
    pub(crate) tri_order: Vec<u32>,
}

impl Bvh {
    pub(crate) fn empty() -> Self {
        Bvh {
            nodes: Vec::new(),
            root: None,
            tri_order: Vec::new(),
        }
    }

    pub(crate) fn build(triangle_aabbs: &[Aabb]) -> Self {
        if triangle_aabbs.is_empty() {
            return Self::empty();
        }
        let mut entries: Vec<(u32, Aabb, DVec3)> = triangle_aabbs
            .iter()
            .enumerate()
            .map(|(i, aabb)| (i as u32, *aabb, aabb.centroid()))
            .collect();

        let mut nodes = Vec::new();
        let root = Self::build_recursive(&mut entries, 0, &mut nodes);
        let tri_order = entries.iter().map(|(id, _, _)| *id).collect();

        Bvh {
            nodes,
            root: Some(root),
            tri_order,
        }
    }

    /// `base` is this slice's starting offset within the final, fully
    /// partitioned `entries` array — needed because leaves store their
    /// triangle range as an absolute `[start, start+count)` into that array.
    fn build_recursive(entries: &mut [(u32, Aabb, DVec3)], base: u32, nodes: &mut Vec<BvhNode>) -> u32 {
        let mut bounds = Aabb::empty();
        for (_, aabb, _) in entries.iter() {
            bounds = bounds.merge(aabb);
        }

        if entries.len() <= LEAF_THRESHOLD {
            let idx = nodes.len() as u32;
            nodes.push(BvhNode::Leaf {
                aabb: bounds,
                start: base,
                count: entries.len() as u32,
            });
            return idx;
        }

        let axis = bounds.longest_axis();
        entries.sort_by(|a, b| a.2[axis].partial_cmp(&b.2[axis]).unwrap());
        let mid = entries.len() / 2;
        let (left_entries, right_entries) = entries.split_at_mut(mid);

        let left = Self::build_recursive(left_entries, base, nodes);
        let right = Self::build_recursive(right_entries, base + mid as u32, nodes);

        let idx = nodes.len() as u32;
        nodes.push(BvhNode::Branch {
            aabb: bounds,
            left,
            right,
        });
        idx
    }

    /// Finds the nearest leaf triangle (by global id) hit by the ray,
    /// restricted to `t in [0, t_max]`. `test` evaluates a single triangle
    /// and returns its hit distance if any.
    pub(crate) fn nearest<F: FnMut(u32) -> Option<f64>>(
        &self,
        origin: DVec3,
        direction: DVec3,
        t_max: f64,
        mut test: F,
    ) -> Option<(u32, f64)> {
        let root = self.root?;
        let inv_dir = DVec3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);

        let mut best: Option<(u32, f64)> = None;
        let mut stack = vec![root];
        let mut limit = t_max;

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            if node.aabb().ray_intersect(origin, inv_dir, limit).is_none() {
                continue;
            }
            match node {
                BvhNode::Leaf { start, count, .. } => {
                    for slot in *start..(*start + *count) {
                        let tri_id = self.tri_order[slot as usize];
                        if let Some(t) = test(tri_id) {
                            if t >= 0.0 && t <= limit && best.map_or(true, |(_, bt)| t < bt) {
                                best = Some((tri_id, t));
                                limit = t;
                            }
                        }
                    }
                }
                BvhNode::Branch { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        best
    }

    /// True if any triangle is hit within `[0, t_max]`; stops at the first.
    pub(crate) fn any_hit<F: FnMut(u32) -> Option<f64>>(
        &self,
        origin: DVec3,
        direction: DVec3,
        t_max: f64,
        mut test: F,
    ) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        let inv_dir = DVec3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        let mut stack = vec![root];

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            if node.aabb().ray_intersect(origin, inv_dir, t_max).is_none() {
                continue;
            }
            match node {
                BvhNode::Leaf { start, count, .. } => {
                    for slot in *start..(*start + *count) {
                        let tri_id = self.tri_order[slot as usize];
                        if let Some(t) = test(tri_id) {
                            if t >= 0.0 && t <= t_max {
                                return true;
                            }
                        }
                    }
                }
                BvhNode::Branch { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        false
    }
}

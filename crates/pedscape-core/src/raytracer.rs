use glam::DVec3;
use rayon::prelude::*;

use crate::bvh::{Aabb, Bvh};
use crate::error::{Error, Result};
use crate::mesh::Mesh;

/// Sentinel `mesh_id` for a missed ray, matching the boundary's `FAIL`
/// constant.
pub const NO_HIT: i32 = -1;

const MOLLER_EPSILON: f64 = 1e-7;
const NEAR_RAY_OFFSET: f64 = 1e-5;

/// Result of a single ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HitStruct {
    pub distance: f64,
    pub mesh_id: i32,
}

impl HitStruct {
    pub fn miss() -> Self {
        HitStruct {
            distance: -1.0,
            mesh_id: NO_HIT,
        }
    }

    pub fn did_hit(&self) -> bool {
        self.mesh_id != NO_HIT
    }
}

struct MeshRecord {
    mesh_id: i32,
    vertices: Vec<DVec3>,
    indices: Vec<[u32; 3]>,
}

/// Global triangle id -> (mesh slot, local triangle index).
#[derive(Clone, Copy)]
struct TriRef {
    mesh_slot: u32,
    tri_idx: u32,
}

/// Builds a BVH over one or more meshes and answers nearest-hit and
/// occlusion queries against it.
pub struct RayTracer {
    meshes: Vec<MeshRecord>,
    tri_refs: Vec<TriRef>,
    bvh: Bvh,
    use_precise: bool,
    next_id: i32,
}

fn moller_trumbore(
    origin: DVec3,
    dir: DVec3,
    v1: DVec3,
    v2: DVec3,
    v3: DVec3,
) -> Option<f64> {
    let e1 = v2 - v1;
    let e2 = v3 - v1;
    let h = dir.cross(e2);
    let a = e1.dot(h);
    if a.abs() < MOLLER_EPSILON {
        return None;
    }
    let f = 1.0 / a;
    let s = origin - v1;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = f * dir.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    Some(f * e2.dot(q))
}

impl RayTracer {
    pub fn new(use_precise: bool) -> Self {
        RayTracer {
            meshes: Vec::new(),
            tri_refs: Vec::new(),
            bvh: Bvh::empty(),
            use_precise,
            next_id: 0,
        }
    }

    pub fn use_precise(&self) -> bool {
        self.use_precise
    }

    fn allocate_id(&mut self, requested: i32) -> i32 {
        let used = |id: i32| self.meshes.iter().any(|m| m.mesh_id == id);
        let id = if requested >= 0 && !used(requested) {
            requested
        } else {
            while used(self.next_id) {
                self.next_id += 1;
            }
            self.next_id
        };
        self.next_id = self.next_id.max(id + 1);
        id
    }

    /// Copies `mesh`'s geometry into backend buffers, assigning a fresh id
    /// if the requested one is already taken. Rebuilds the BVH immediately
    /// when `commit` is true.
    pub fn add_mesh(&mut self, mesh: &Mesh, commit: bool) -> Result<i32> {
        let id = self.allocate_id(mesh.mesh_id());
        let vertices = mesh.vertices().iter().map(|v| v.as_dvec3()).collect();
        let indices = mesh.indices().to_vec();
        self.meshes.push(MeshRecord {
            mesh_id: id,
            vertices,
            indices,
        });
        if commit {
            self.commit();
        }
        Ok(id)
    }

    /// Adds several meshes, deferring a single BVH rebuild to the end.
    pub fn add_meshes(&mut self, meshes: &[Mesh], commit: bool) -> Result<Vec<i32>> {
        let mut ids = Vec::with_capacity(meshes.len());
        for mesh in meshes {
            ids.push(self.add_mesh(mesh, false)?);
        }
        if commit {
            self.commit();
        }
        Ok(ids)
    }

    /// Rebuilds the BVH from the currently registered meshes.
    pub fn commit(&mut self) {
        let start = std::time::Instant::now();
        let mut tri_refs = Vec::new();
        let mut aabbs = Vec::new();
        for (slot, mesh) in self.meshes.iter().enumerate() {
            for (tri_idx, tri) in mesh.indices.iter().enumerate() {
                let v1 = mesh.vertices[tri[0] as usize];
                let v2 = mesh.vertices[tri[1] as usize];
                let v3 = mesh.vertices[tri[2] as usize];
                let mut aabb = Aabb::empty();
                aabb.expand(v1);
                aabb.expand(v2);
                aabb.expand(v3);
                aabbs.push(aabb);
                tri_refs.push(TriRef {
                    mesh_slot: slot as u32,
                    tri_idx: tri_idx as u32,
                });
            }
        }
        self.bvh = Bvh::build(&aabbs);
        self.tri_refs = tri_refs;
        log::info!(
            "rebuilt BVH over {} triangles in {:?}",
            self.tri_refs.len(),
            start.elapsed()
        );
    }

    fn triangle(&self, tri_id: u32) -> (DVec3, DVec3, DVec3, i32) {
        let tref = self.tri_refs[tri_id as usize];
        let mesh = &self.meshes[tref.mesh_slot as usize];
        let tri = mesh.indices[tref.tri_idx as usize];
        (
            mesh.vertices[tri[0] as usize],
            mesh.vertices[tri[1] as usize],
            mesh.vertices[tri[2] as usize],
            mesh.mesh_id,
        )
    }

    /// Nearest intersection along `origin + t*direction`, `t > 0`. Uses a
    /// small near-ray bias to avoid self-hits at the origin.
    pub fn intersect(&self, origin: DVec3, direction: DVec3) -> HitStruct {
        let dir = direction.normalize();
        let biased_origin = origin + dir * NEAR_RAY_OFFSET;
        let found = self.bvh.nearest(biased_origin, dir, f64::INFINITY, |tri_id| {
            let (v1, v2, v3, _) = self.triangle(tri_id);
            moller_trumbore(biased_origin, dir, v1, v2, v3)
        });
        match found {
            None => HitStruct::miss(),
            Some((tri_id, t)) => {
                // The BVH's own leaf test already is Möller-Trumbore, so in
                // precise mode there is nothing further to recompute: `t` is
                // already the bit-stable double-precision distance. The
                // flag is kept on `RayTracer` as API surface for a future
                // coarser/alternate backend that would need the override.
                let (_, _, _, mesh_id) = self.triangle(tri_id);
                HitStruct {
                    distance: t + NEAR_RAY_OFFSET,
                    mesh_id,
                }
            }
        }
    }

    /// True iff any triangle is hit within `max_distance`.
    pub fn occluded(&self, origin: DVec3, direction: DVec3, max_distance: f64) -> bool {
        let dir = direction.normalize();
        let biased_origin = origin + dir * NEAR_RAY_OFFSET;
        self.bvh
            .any_hit(biased_origin, dir, max_distance, |tri_id| {
                let (v1, v2, v3, _) = self.triangle(tri_id);
                moller_trumbore(biased_origin, dir, v1, v2, v3)
            })
    }

    /// Mutates `origin_inout` to the hit point on success; leaves it
    /// unchanged on miss.
    pub fn point_intersection(&self, origin_inout: &mut DVec3, direction: DVec3) -> bool {
        let hit = self.intersect(*origin_inout, direction);
        if hit.did_hit() {
            *origin_inout += direction.normalize() * hit.distance;
            true
        } else {
            false
        }
    }

    /// Batched nearest-hit queries. Accepts equal-length paired origins
    /// and directions, a single origin against many directions, or many
    /// origins against a single direction.
    pub fn intersect_many(
        &self,
        origins: &[DVec3],
        directions: &[DVec3],
        use_parallel: bool,
        max_distance: Option<f64>,
        mesh_id_filter: Option<&[i32]>,
    ) -> Result<Vec<HitStruct>> {
        let n = match (origins.len(), directions.len()) {
            (o, d) if o == d => o,
            (1, d) => d,
            (o, 1) => o,
            _ => {
                return Err(Error::InvalidArgument(
                    "origins/directions shapes are incompatible".into(),
                ))
            }
        };

        let at = |slice: &[DVec3], i: usize| -> DVec3 {
            if slice.len() == 1 {
                slice[0]
            } else {
                slice[i]
            }
        };

        let max_distance = max_distance.unwrap_or(f64::INFINITY);
        let compute = |i: usize| -> HitStruct {
            let origin = at(origins, i);
            let direction = at(directions, i);
            let mut hit = self.intersect(origin, direction);
            if hit.did_hit() {
                if hit.distance > max_distance {
                    hit = HitStruct::miss();
                } else if let Some(filter) = mesh_id_filter {
                    if !filter.contains(&hit.mesh_id) {
                        hit = HitStruct::miss();
                    }
                }
            }
            hit
        };

        if use_parallel {
            Ok((0..n).into_par_iter().map(compute).collect())
        } else {
            Ok((0..n).map(compute).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use glam::Vec3;

    fn flat_plane() -> Mesh {
        let verts = vec![
            Vec3::new(-10.0, -10.0, 0.0),
            Vec3::new(10.0, -10.0, 0.0),
            Vec3::new(10.0, 10.0, 0.0),
            Vec3::new(-10.0, 10.0, 0.0),
        ];
        let idx = vec![[0, 1, 2], [0, 2, 3]];
        Mesh::from_indexed(verts, idx, 0, "plane").unwrap()
    }

    #[test]
    fn straight_down_ray_hits_plane_at_unit_distance() {
        let mut rt = RayTracer::new(true);
        rt.add_mesh(&flat_plane(), true).unwrap();
        let hit = rt.intersect(DVec3::new(0.0, 0.0, 1.0), DVec3::new(0.0, 0.0, -1.0));
        assert!(hit.did_hit());
        assert!((hit.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn miss_returns_sentinel() {
        let mut rt = RayTracer::new(false);
        rt.add_mesh(&flat_plane(), true).unwrap();
        let hit = rt.intersect(DVec3::new(0.0, 0.0, 1.0), DVec3::new(0.0, 0.0, 1.0));
        assert!(!hit.did_hit());
        assert_eq!(hit.mesh_id, NO_HIT);
    }

    #[test]
    fn occluded_respects_max_distance() {
        let mut rt = RayTracer::new(false);
        rt.add_mesh(&flat_plane(), true).unwrap();
        assert!(rt.occluded(DVec3::new(0.0, 0.0, 1.0), DVec3::new(0.0, 0.0, -1.0), 2.0));
        assert!(!rt.occluded(DVec3::new(0.0, 0.0, 1.0), DVec3::new(0.0, 0.0, -1.0), 0.5));
    }

    #[test]
    fn intersect_many_rejects_mismatched_shapes() {
        let rt = RayTracer::new(false);
        let origins = vec![DVec3::ZERO, DVec3::X];
        let directions = vec![DVec3::Z, DVec3::Z, DVec3::Z];
        assert!(rt.intersect_many(&origins, &directions, false, None, None).is_err());
    }

    #[test]
    fn ray_inside_closed_box_hits_in_any_direction() {
        // A unit cube around the origin.
        let verts: Vec<Vec3> = vec![
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ];
        let idx = vec![
            [0, 1, 2], [0, 2, 3], // bottom
            [4, 6, 5], [4, 7, 6], // top
            [0, 4, 5], [0, 5, 1], // front
            [2, 6, 7], [2, 7, 3], // back
            [1, 5, 6], [1, 6, 2], // right
            [0, 3, 7], [0, 7, 4], // left
        ];
        let cube = Mesh::from_indexed(verts, idx, 0, "cube").unwrap();
        let mut rt = RayTracer::new(true);
        rt.add_mesh(&cube, true).unwrap();
        for dir in [
            DVec3::X,
            DVec3::NEG_X,
            DVec3::Y,
            DVec3::NEG_Y,
            DVec3::Z,
            DVec3::NEG_Z,
        ] {
            assert!(rt.intersect(DVec3::ZERO, dir).did_hit());
        }
    }
}

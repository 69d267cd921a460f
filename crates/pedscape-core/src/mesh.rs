use fxhash::FxHashMap;
use glam::{Quat, Vec3};

use crate::error::{Error, Result};

const MESH_COMPARE_TOLERANCE: f32 = 0.001;

/// Indexed triangle geometry for one mesh.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mesh {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
    mesh_id: i32,
    name: String,
}

fn bit_key(v: Vec3) -> (u32, u32, u32) {
    (v.x.to_bits(), v.y.to_bits(), v.z.to_bits())
}

impl Mesh {
    /// Build a mesh from already-indexed buffers. Every index must be
    /// in range, the mesh needs at least one triangle and three vertices.
    pub fn from_indexed(
        vertices: Vec<Vec3>,
        indices: Vec<[u32; 3]>,
        mesh_id: i32,
        name: impl Into<String>,
    ) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(Error::InvalidMesh("fewer than 3 vertices".into()));
        }
        if indices.is_empty() {
            return Err(Error::InvalidMesh("no triangles".into()));
        }
        let v = vertices.len() as u32;
        for tri in &indices {
            if tri.iter().any(|&i| i >= v) {
                return Err(Error::InvalidMesh("index out of range".into()));
            }
        }
        Ok(Mesh {
            vertices,
            indices,
            mesh_id,
            name: name.into(),
        })
    }

    /// Build a mesh from an unindexed triangle soup, de-duplicating
    /// vertices by exact bit pattern into unique ids.
    pub fn from_triangle_soup(
        triangles: &[Vec3],
        mesh_id: i32,
        name: impl Into<String>,
    ) -> Result<Self> {
        if triangles.len() % 3 != 0 {
            return Err(Error::InvalidMesh(
                "triangle soup length is not a multiple of 3".into(),
            ));
        }
        if triangles.is_empty() {
            return Err(Error::InvalidMesh("empty triangle soup".into()));
        }

        let mut seen: FxHashMap<(u32, u32, u32), u32> = FxHashMap::default();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(triangles.len() / 3);

        for chunk in triangles.chunks_exact(3) {
            let mut tri = [0u32; 3];
            for (slot, &v) in tri.iter_mut().zip(chunk) {
                let key = bit_key(v);
                *slot = *seen.entry(key).or_insert_with(|| {
                    let id = vertices.len() as u32;
                    vertices.push(v);
                    id
                });
            }
            indices.push(tri);
        }

        Self::from_indexed(vertices, indices, mesh_id, name)
    }

    pub fn vertex(&self, i: usize) -> Result<Vec3> {
        self.vertices.get(i).copied().ok_or(Error::OutOfRange)
    }

    pub fn triangle(&self, t: usize) -> Result<(Vec3, Vec3, Vec3)> {
        let tri = self.indices.get(t).ok_or(Error::OutOfRange)?;
        Ok((
            self.vertices[tri[0] as usize],
            self.vertices[tri[1] as usize],
            self.vertices[tri[2] as usize],
        ))
    }

    pub fn num_verts(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_tris(&self) -> usize {
        self.indices.len()
    }

    pub fn mesh_id(&self) -> i32 {
        self.mesh_id
    }

    pub fn set_id(&mut self, id: i32) {
        self.mesh_id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Rotate every vertex in place by Euler angles in degrees, applied
    /// intrinsically as Z (roll) then Y (yaw) then X (pitch).
    pub fn rotate(&mut self, rx: f32, ry: f32, rz: f32) -> Result<()> {
        let quat = Quat::from_euler(
            glam::EulerRot::ZYX,
            rz.to_radians(),
            ry.to_radians(),
            rx.to_radians(),
        );
        for v in &mut self.vertices {
            let rotated = quat * *v;
            if !rotated.is_finite() {
                return Err(Error::NumericError(
                    "rotation produced a non-finite vertex".into(),
                ));
            }
            *v = rotated;
        }
        Ok(())
    }

    /// OBJ (Y-up) to Z-up: +90 degrees about X.
    pub fn convert_obj_to_zup(&mut self) -> Result<()> {
        self.rotate(90.0, 0.0, 0.0)
    }

    /// Z-up to OBJ (Y-up): -90 degrees about X.
    pub fn convert_zup_to_obj(&mut self) -> Result<()> {
        self.rotate(-90.0, 0.0, 0.0)
    }

    /// Distance-based comparison: same topology, every vertex pair within
    /// `0.001` of each other.
    pub fn equals(&self, other: &Mesh) -> bool {
        if self.vertices.len() != other.vertices.len() || self.indices != other.indices {
            return false;
        }
        self.vertices
            .iter()
            .zip(other.vertices.iter())
            .all(|(a, b)| a.distance(*b) < MESH_COMPARE_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soup_dedups_shared_vertices() {
        // Two triangles sharing an edge: 4 unique vertices, 6 soup entries.
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let c = Vec3::new(1.0, 1.0, 0.0);
        let d = Vec3::new(0.0, 1.0, 0.0);
        let soup = vec![a, b, c, a, c, d];
        let mesh = Mesh::from_triangle_soup(&soup, 0, "quad").unwrap();
        assert_eq!(mesh.num_verts(), 4);
        assert_eq!(mesh.num_tris(), 2);
    }

    #[test]
    fn soup_length_not_multiple_of_three_fails() {
        let soup = vec![Vec3::ZERO, Vec3::X];
        assert!(Mesh::from_triangle_soup(&soup, 0, "bad").is_err());
    }

    #[test]
    fn from_indexed_rejects_out_of_range_index() {
        let verts = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let bad = vec![[0, 1, 5]];
        assert!(Mesh::from_indexed(verts, bad, 0, "bad").is_err());
    }

    #[test]
    fn obj_zup_round_trip_restores_vertices() {
        let verts = vec![
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(-1.0, 0.5, 2.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let mut mesh = Mesh::from_indexed(verts.clone(), vec![[0, 1, 2]], 0, "tri").unwrap();
        mesh.convert_obj_to_zup().unwrap();
        mesh.convert_zup_to_obj().unwrap();
        for (orig, got) in verts.iter().zip(mesh.vertices().iter()) {
            assert!(orig.distance(*got) < 1e-4);
        }
    }

    #[test]
    fn rotate_nan_input_is_caught() {
        let verts = vec![
            Vec3::new(f32::NAN, 0.0, 0.0),
            Vec3::X,
            Vec3::Y,
        ];
        let mut mesh = Mesh::from_indexed(verts, vec![[0, 1, 2]], 0, "bad").unwrap();
        assert!(mesh.rotate(10.0, 0.0, 0.0).is_err());
    }
}

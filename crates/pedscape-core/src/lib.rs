//! Geometry and ray-intersection primitives: meshes, a BVH, and a
//! RayTracer built on top of it.

pub mod bvh;
pub mod error;
pub mod mesh;
pub mod raytracer;

pub use error::{Error, Result};
pub use glam::{DVec3 as Vec3d, Vec3};
pub use mesh::Mesh;
pub use raytracer::{HitStruct, RayTracer, NO_HIT};

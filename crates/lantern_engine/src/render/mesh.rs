//! Mesh data and instance classification
//!
//! Meshes are registered once with the renderer; every drawable placement of
//! a mesh is a [`MeshInstance`] bound to a scene component. Instances are
//! classified by [`MeshKind`] and [`BlendModel`] into the renderer's buckets.

use bytemuck::{Pod, Zeroable};

use crate::foundation::collections::{ComponentId, MeshId};
use crate::foundation::math::Vec3;
use crate::render::device::MeshBufferHandle;
use crate::scene::AABB;

/// Vertex layout shared by every mesh kind
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub tex_coord: [f32; 2],

    /// Vertex colour
    pub color: [f32; 4],
}

impl Vertex {
    /// Vertex with a position and normal, white, at uv (0, 0)
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            tex_coord: [0.0, 0.0],
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// How a mesh is animated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    /// Immutable geometry
    Static,
    /// Geometry deformed by a skeleton
    Skeletal,
    /// Geometry rewritten on the CPU
    Dynamic,
}

impl MeshKind {
    /// Every kind, in bucket order
    pub const ALL: [MeshKind; 3] = [MeshKind::Static, MeshKind::Skeletal, MeshKind::Dynamic];

    pub(crate) fn index(self) -> usize {
        match self {
            MeshKind::Static => 0,
            MeshKind::Skeletal => 1,
            MeshKind::Dynamic => 2,
        }
    }
}

/// How an instance's material composites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendModel {
    /// No transparency
    #[default]
    Opaque,
    /// Alpha-tested cut-outs
    Masked,
    /// Alpha blended, drawn back to front after lighting
    Transparent,
}

impl BlendModel {
    /// Every blend model, in bucket order
    pub const ALL: [BlendModel; 3] = [BlendModel::Opaque, BlendModel::Masked, BlendModel::Transparent];

    pub(crate) fn index(self) -> usize {
        match self {
            BlendModel::Opaque => 0,
            BlendModel::Masked => 1,
            BlendModel::Transparent => 2,
        }
    }
}

/// Geometry registered with the renderer
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Vertex data
    pub vertices: Vec<Vertex>,

    /// Triangle list indices
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a mesh from vertices and triangle indices
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles
    pub fn face_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Bounding box of the vertex positions
    pub fn aabb(&self) -> AABB {
        let mut positions = self.vertices.iter().map(|v| Vec3::from(v.position));
        let Some(first) = positions.next() else {
            return AABB::new(Vec3::zeros(), Vec3::zeros());
        };
        let (min, max) = positions.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p)));
        AABB::new(min, max)
    }

    /// Unit cube centred on the origin
    pub fn cube() -> Self {
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ];

        for (normal, u, v) in faces {
            let base = u32::try_from(vertices.len()).unwrap_or(u32::MAX);
            let normal_v = Vec3::from(normal);
            let (u, v) = (Vec3::from(u), Vec3::from(v));
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let p = normal_v * 0.5 + u * su + v * sv;
                vertices.push(Vertex::new([p.x, p.y, p.z], normal));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self { vertices, indices }
    }
}

/// Mesh stored in the renderer's registry
#[derive(Debug, Clone)]
pub struct RegisteredMesh {
    /// Kind the mesh was registered as
    pub kind: MeshKind,

    /// CPU-side geometry
    pub mesh: Mesh,

    /// GPU buffers, present once uploaded
    pub buffers: Option<MeshBufferHandle>,
}

/// Placement of a mesh in the scene
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    /// Geometry to draw
    pub mesh: MeshId,

    /// Kind, copied from the mesh at registration
    pub kind: MeshKind,

    /// Bucket the instance is filed under
    pub blend_model: BlendModel,

    /// Component providing the world transform
    pub component: ComponentId,

    /// Whether the instance casts shadows
    pub casts_shadow: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_counts_and_bounds() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.face_count(), 12);

        let aabb = cube.aabb();
        assert_relative_eq!(aabb.min, Vec3::new(-0.5, -0.5, -0.5), epsilon = 1e-6);
        assert_relative_eq!(aabb.max, Vec3::new(0.5, 0.5, 0.5), epsilon = 1e-6);
    }

    #[test]
    fn test_vertex_is_plain_bytes() {
        let vertices = [Vertex::new([1.0, 2.0, 3.0], [0.0, 0.0, 1.0])];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), std::mem::size_of::<Vertex>());
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
    }
}

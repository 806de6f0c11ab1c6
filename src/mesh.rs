//! GPU meshes for the robot scene.
//!
//! - [`Vertex3d`]: the vertex format shared by every lit mesh
//! - [`Mesh`]: GPU-resident vertex and index buffers
//! - [`MeshLibrary`]: the unit shapes joint markers and links are drawn with
//!
//! # Vertex Layout
//!
//! [`Vertex3d`] is 24 bytes per vertex:
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |

use wgpu::util::DeviceExt;

use crate::canvas::Shape;
use crate::error::GeometryError;
use crate::gpu::GpuContext;
use crate::primitives::{self, Primitive};

/// A vertex with position and normal.
///
/// `#[repr(C)]` plus [`bytemuck::Pod`] so slices can be uploaded directly.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    /// Position in model space.
    pub position: [f32; 3],
    /// Unit surface normal.
    pub normal: [f32; 3],
}

impl Vertex3d {
    /// The wgpu vertex buffer layout for this vertex type.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    };

    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }
}

/// GPU-resident triangle mesh.
///
/// Immutable after creation; all built-in shapes wind counter-clockwise.
#[derive(Debug)]
pub struct Mesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
}

impl Mesh {
    /// Uploads vertex and index data.
    pub fn new(gpu: &GpuContext, vertices: &[Vertex3d], indices: &[u32]) -> Self {
        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    /// Uploads a procedural [`Primitive`].
    pub fn from_primitive(gpu: &GpuContext, primitive: &Primitive) -> Self {
        Self::new(gpu, &primitive.to_vertices(), &primitive.indices)
    }
}

/// Unit meshes for every [`Shape`], scaled per draw.
///
/// - sphere: radius 1
/// - cube: side 1, centred
/// - cylinder: radius 1, spanning z in `0..1`
#[derive(Debug)]
pub struct MeshLibrary {
    sphere: Mesh,
    cube: Mesh,
    cylinder: Mesh,
}

impl MeshLibrary {
    pub fn new(gpu: &GpuContext, sphere_detail: u32) -> Result<Self, GeometryError> {
        Ok(Self {
            sphere: Mesh::from_primitive(gpu, &primitives::sphere(1.0, sphere_detail, sphere_detail)?),
            cube: Mesh::from_primitive(gpu, &primitives::cuboid(1.0, 1.0, 1.0)?),
            cylinder: Mesh::from_primitive(gpu, &primitives::cylinder(1.0, 1.0, 16, false)?),
        })
    }

    pub fn get(&self, shape: Shape) -> &Mesh {
        match shape {
            Shape::Sphere => &self.sphere,
            Shape::Cube => &self.cube,
            Shape::Cylinder => &self.cylinder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_struct() {
        assert_eq!(std::mem::size_of::<Vertex3d>(), 24);
        assert_eq!(Vertex3d::LAYOUT.array_stride, 24);
        assert_eq!(Vertex3d::LAYOUT.attributes.len(), 2);
    }

    #[test]
    fn primitive_conversion_interleaves() {
        let cube = primitives::cuboid(2.0, 2.0, 2.0).unwrap();
        let vertices = cube.to_vertices();
        assert_eq!(vertices.len(), 24);
        assert_eq!(vertices[0], Vertex3d::new([-1.0, -1.0, 1.0], [0.0, 0.0, 1.0]));
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 24 * 24);
    }
}

//! Procedural geometry for joint markers and links.
//!
//! Every generator returns a [`Primitive`]: flat vertex and normal buffers
//! (three floats per vertex) plus a triangle-list index buffer. Generation is
//! deterministic and pure; uploading to the GPU happens in
//! [`Mesh::from_primitive`](crate::Mesh::from_primitive).
//!
//! Shapes are built for a Z-up world: sphere poles and the cylinder axis lie
//! on the local z axis, which is also the DH joint axis.
//!
//! ```
//! use dhview::primitives;
//!
//! let sphere = primitives::sphere(0.5, 8, 16).unwrap();
//! assert_eq!(sphere.vertex_count(), 9 * 17);
//! assert_eq!(sphere.triangle_count(), 8 * 16 * 2);
//!
//! assert!(primitives::sphere(0.5, 2, 16).is_err());
//! ```
//!
//! All shapes use counter-clockwise winding for outward faces.

use std::f32::consts::{PI, TAU};

use crate::error::GeometryError;
use crate::mesh::Vertex3d;

/// CPU-side triangle mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Primitive {
    /// `x, y, z` per vertex.
    pub vertices: Vec<f32>,
    /// Triangle list into `vertices`.
    pub indices: Vec<u32>,
    /// Unit normal per vertex, same layout as `vertices`.
    pub normals: Vec<f32>,
}

impl Primitive {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn position(&self, i: usize) -> [f32; 3] {
        [self.vertices[3 * i], self.vertices[3 * i + 1], self.vertices[3 * i + 2]]
    }

    pub fn normal(&self, i: usize) -> [f32; 3] {
        [self.normals[3 * i], self.normals[3 * i + 1], self.normals[3 * i + 2]]
    }

    /// Interleaves positions and normals into the GPU vertex format.
    pub fn to_vertices(&self) -> Vec<Vertex3d> {
        (0..self.vertex_count())
            .map(|i| Vertex3d::new(self.position(i), self.normal(i)))
            .collect()
    }

    fn push(&mut self, position: [f32; 3], normal: [f32; 3]) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&position);
        self.normals.extend_from_slice(&normal);
        index
    }

    fn quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.indices.extend_from_slice(&[a, b, c, c, d, a]);
    }
}

fn check_segments(what: &'static str, got: u32) -> Result<(), GeometryError> {
    if got < 3 {
        return Err(GeometryError::TooFewSegments { what, got });
    }
    Ok(())
}

fn check_dimension(what: &'static str, value: f32) -> Result<(), GeometryError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(GeometryError::InvalidDimension { what, value });
    }
    Ok(())
}

/// UV sphere centred at the origin.
///
/// `lat` is the number of rings from pole to pole and `long` the number of
/// segments around the z axis. Produces `(lat + 1) * (long + 1)` vertices.
pub fn sphere(radius: f32, lat: u32, long: u32) -> Result<Primitive, GeometryError> {
    check_dimension("sphere radius", radius)?;
    check_segments("sphere latitude", lat)?;
    check_segments("sphere longitude", long)?;

    let mut mesh = Primitive::default();
    for ring in 0..=lat {
        let phi = PI * ring as f32 / lat as f32;
        let (ring_radius, z) = phi.sin_cos();
        for seg in 0..=long {
            let theta = TAU * seg as f32 / long as f32;
            let normal = [ring_radius * theta.cos(), ring_radius * theta.sin(), z];
            mesh.push(normal.map(|c| c * radius), normal);
        }
    }

    for ring in 0..lat {
        for seg in 0..long {
            let current = ring * (long + 1) + seg;
            let next = current + long + 1;
            mesh.indices
                .extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
        }
    }
    Ok(mesh)
}

/// Capped cylinder along the z axis.
///
/// With `centered` the body spans `-length/2..length/2`, otherwise
/// `0..length`. The side and the two caps have separate vertices so both get
/// flat-correct normals.
pub fn cylinder(
    radius: f32,
    length: f32,
    segments: u32,
    centered: bool,
) -> Result<Primitive, GeometryError> {
    check_dimension("cylinder radius", radius)?;
    check_dimension("cylinder length", length)?;
    check_segments("cylinder", segments)?;

    let (z0, z1) = if centered {
        (-length / 2.0, length / 2.0)
    } else {
        (0.0, length)
    };

    let mut mesh = Primitive::default();
    let ring = |seg: u32| {
        let theta = TAU * seg as f32 / segments as f32;
        (theta.cos(), theta.sin())
    };

    // Side: one quad per segment.
    for seg in 0..=segments {
        let (c, s) = ring(seg);
        mesh.push([radius * c, radius * s, z0], [c, s, 0.0]);
        mesh.push([radius * c, radius * s, z1], [c, s, 0.0]);
    }
    for seg in 0..segments {
        let bottom = 2 * seg;
        mesh.quad(bottom, bottom + 2, bottom + 3, bottom + 1);
    }

    // Caps: a fan around a centre vertex each.
    for (z, nz) in [(z0, -1.0f32), (z1, 1.0)] {
        let centre = mesh.push([0.0, 0.0, z], [0.0, 0.0, nz]);
        for seg in 0..segments {
            let (c, s) = ring(seg);
            mesh.push([radius * c, radius * s, z], [0.0, 0.0, nz]);
        }
        for seg in 0..segments {
            let a = centre + 1 + seg;
            let b = centre + 1 + (seg + 1) % segments;
            if nz > 0.0 {
                mesh.indices.extend_from_slice(&[centre, a, b]);
            } else {
                mesh.indices.extend_from_slice(&[centre, b, a]);
            }
        }
    }
    Ok(mesh)
}

/// Axis-aligned box centred at the origin with 24 vertices (4 per face), so
/// each face carries its own normal.
pub fn cuboid(w: f32, h: f32, d: f32) -> Result<Primitive, GeometryError> {
    check_dimension("box width", w)?;
    check_dimension("box height", h)?;
    check_dimension("box depth", d)?;

    let (x, y, z) = (w / 2.0, h / 2.0, d / 2.0);
    #[rustfmt::skip]
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([ 0.0,  0.0,  1.0], [[-x, -y,  z], [ x, -y,  z], [ x,  y,  z], [-x,  y,  z]]),
        ([ 0.0,  0.0, -1.0], [[ x, -y, -z], [-x, -y, -z], [-x,  y, -z], [ x,  y, -z]]),
        ([ 0.0,  1.0,  0.0], [[-x,  y,  z], [ x,  y,  z], [ x,  y, -z], [-x,  y, -z]]),
        ([ 0.0, -1.0,  0.0], [[-x, -y, -z], [ x, -y, -z], [ x, -y,  z], [-x, -y,  z]]),
        ([ 1.0,  0.0,  0.0], [[ x, -y,  z], [ x, -y, -z], [ x,  y, -z], [ x,  y,  z]]),
        ([-1.0,  0.0,  0.0], [[-x, -y, -z], [-x, -y,  z], [-x,  y,  z], [-x,  y, -z]]),
    ];

    let mut mesh = Primitive::default();
    for (normal, corners) in faces {
        let [a, b, c, e] = corners.map(|p| mesh.push(p, normal));
        mesh.quad(a, b, c, e);
    }
    Ok(mesh)
}

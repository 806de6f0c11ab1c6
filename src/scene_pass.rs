//! GPU submission of a recorded frame.
//!
//! [`ScenePass`] turns a [`FrameRecording`] into two draws per mesh kind:
//! lit, depth-tested instances of the unit meshes in [`MeshLibrary`], and an
//! unlit line list for the grid, axes and frame triads.
//!
//! # Bind Groups
//!
//! - **Group 0**: camera uniforms (view-projection, light direction)
//!
//! Per-draw data (model matrix, normal matrix, colour) travels in an
//! instance vertex buffer, so a frame costs one buffer upload regardless of
//! how many joints the robot has.

use std::ops::Range;

use glam::{DMat3, Vec3};

use crate::canvas::{FrameRecording, LineSegment, Shape, ShapeDraw};
use crate::gpu::GpuContext;
use crate::mesh::{MeshLibrary, Vertex3d};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Shapes in the order their instances are packed.
const SHAPE_ORDER: [Shape; 3] = [Shape::Sphere, Shape::Cube, Shape::Cylinder];

/// Camera uniforms, uploaded once per frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// Direction towards the light in world space; `w` is padding.
    pub light_dir: [f32; 4],
}

impl CameraUniforms {
    pub fn new(frame: &FrameRecording) -> Self {
        // Light sits over the viewer's right shoulder.
        let light = Vec3::new(0.4, 0.3, 1.0).normalize();
        Self {
            view_proj: frame.view_projection().to_cols_array_2d(),
            light_dir: light.extend(0.0).to_array(),
        }
    }
}

/// Per-instance data for one mesh draw.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of the model's upper 3x3, one column per row.
    pub normal: [[f32; 4]; 3],
    pub color: [f32; 4],
}

impl InstanceRaw {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<InstanceRaw>() as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &wgpu::vertex_attr_array![
            2 => Float32x4,
            3 => Float32x4,
            4 => Float32x4,
            5 => Float32x4,
            6 => Float32x4,
            7 => Float32x4,
            8 => Float32x4,
            9 => Float32x4,
        ],
    };

    pub fn from_draw(draw: &ShapeDraw) -> Self {
        let upper = DMat3::from_mat4(draw.transform);
        // Degenerate scales (a zero-length link) keep the raw rotation.
        let normal = if upper.determinant().abs() > 1e-12 {
            upper.inverse().transpose()
        } else {
            upper
        }
        .as_mat3();
        let column = |v: Vec3| v.extend(0.0).to_array();
        Self {
            model: draw.transform.as_mat4().to_cols_array_2d(),
            normal: [
                column(normal.x_axis),
                column(normal.y_axis),
                column(normal.z_axis),
            ],
            color: draw.color.to_array(),
        }
    }
}

/// Line vertex: world position and colour.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<LineVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4],
    };
}

/// Instances grouped by shape, with the instance range of each group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceBatch {
    pub instances: Vec<InstanceRaw>,
    pub ranges: Vec<(Shape, Range<u32>)>,
}

impl InstanceBatch {
    pub fn from_frame(frame: &FrameRecording) -> Self {
        let mut batch = Self::default();
        for shape in SHAPE_ORDER {
            let start = batch.instances.len() as u32;
            batch.instances.extend(
                frame
                    .shapes
                    .iter()
                    .filter(|d| d.shape == shape)
                    .map(InstanceRaw::from_draw),
            );
            let end = batch.instances.len() as u32;
            if end > start {
                batch.ranges.push((shape, start..end));
            }
        }
        batch
    }
}

pub fn line_vertices(lines: &[LineSegment]) -> Vec<LineVertex> {
    lines
        .iter()
        .flat_map(|line| {
            let color = line.color.to_array();
            [
                LineVertex {
                    position: line.start.as_vec3().to_array(),
                    color,
                },
                LineVertex {
                    position: line.end.as_vec3().to_array(),
                    color,
                },
            ]
        })
        .collect()
}

/// A vertex buffer that grows to fit its largest upload.
struct DynamicBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl DynamicBuffer {
    fn new(device: &wgpu::Device, label: &'static str, capacity: u64) -> Self {
        Self {
            label,
            buffer: Self::allocate(device, label, capacity),
            capacity,
        }
    }

    fn allocate(device: &wgpu::Device, label: &'static str, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn upload(&mut self, gpu: &GpuContext, bytes: &[u8]) {
        let needed = bytes.len() as u64;
        if needed > self.capacity {
            self.capacity = needed.next_power_of_two();
            self.buffer = Self::allocate(&gpu.device, self.label, self.capacity);
            log::debug!("{} grown to {} bytes", self.label, self.capacity);
        }
        if !bytes.is_empty() {
            gpu.queue.write_buffer(&self.buffer, 0, bytes);
        }
    }
}

/// Draws [`FrameRecording`]s to the window surface.
pub struct ScenePass {
    mesh_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    instances: DynamicBuffer,
    lines: DynamicBuffer,
    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
}

impl ScenePass {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });
        let line_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Line Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/line.wgsl").into()),
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniforms"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&camera_bind_group_layout],
            push_constant_ranges: &[],
        });

        let depth_stencil = wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };

        let mesh_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &mesh_shader,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT, InstanceRaw::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &mesh_shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil.clone()),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let line_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Line Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &line_shader,
                entry_point: Some("vs"),
                buffers: &[LineVertex::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &line_shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let instance_size = std::mem::size_of::<InstanceRaw>() as u64;
        let line_size = std::mem::size_of::<LineVertex>() as u64;

        Self {
            mesh_pipeline,
            line_pipeline,
            camera_buffer,
            camera_bind_group,
            instances: DynamicBuffer::new(device, "Scene Instance Buffer", 64 * instance_size),
            lines: DynamicBuffer::new(device, "Scene Line Buffer", 256 * line_size),
            depth_view: Self::create_depth_view(gpu),
            depth_size: (gpu.width(), gpu.height()),
        }
    }

    fn create_depth_view(gpu: &GpuContext) -> wgpu::TextureView {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Scene Depth Texture"),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Recreates the depth buffer if the surface was resized.
    pub fn ensure_depth_size(&mut self, gpu: &GpuContext) {
        if self.depth_size != (gpu.width(), gpu.height()) {
            self.depth_view = Self::create_depth_view(gpu);
            self.depth_size = (gpu.width(), gpu.height());
        }
    }

    /// Renders `frame` and presents it.
    ///
    /// A lost or outdated surface is reconfigured and the frame skipped;
    /// other acquire errors are logged and the frame skipped.
    pub fn render(&mut self, gpu: &GpuContext, frame: &FrameRecording, meshes: &MeshLibrary) {
        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost, reconfiguring");
                gpu.reconfigure();
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface acquire timed out");
                return;
            }
            Err(e) => {
                log::error!("cannot acquire surface texture: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.ensure_depth_size(gpu);

        gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[CameraUniforms::new(frame)]),
        );

        let batch = InstanceBatch::from_frame(frame);
        self.instances
            .upload(gpu, bytemuck::cast_slice(&batch.instances));
        let line_vertices = line_vertices(&frame.lines);
        self.lines.upload(gpu, bytemuck::cast_slice(&line_vertices));

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame.clear_color.into()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

            if !batch.ranges.is_empty() {
                render_pass.set_pipeline(&self.mesh_pipeline);
                render_pass.set_vertex_buffer(1, self.instances.buffer.slice(..));
                for (shape, range) in &batch.ranges {
                    let mesh = meshes.get(*shape);
                    render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    render_pass
                        .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..mesh.index_count, 0, range.clone());
                }
            }

            if !line_vertices.is_empty() {
                render_pass.set_pipeline(&self.line_pipeline);
                render_pass.set_vertex_buffer(0, self.lines.buffer.slice(..));
                render_pass.draw(0..line_vertices.len() as u32, 0..1);
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Color;
    use glam::{DMat4, DVec3};

    fn draw(shape: Shape, transform: DMat4) -> ShapeDraw {
        ShapeDraw {
            shape,
            transform,
            color: Color::RED,
        }
    }

    #[test]
    fn instances_are_grouped_by_shape() {
        let frame = FrameRecording {
            shapes: vec![
                draw(Shape::Cylinder, DMat4::IDENTITY),
                draw(Shape::Sphere, DMat4::IDENTITY),
                draw(Shape::Cylinder, DMat4::IDENTITY),
            ],
            ..Default::default()
        };
        let batch = InstanceBatch::from_frame(&frame);
        assert_eq!(batch.instances.len(), 3);
        assert_eq!(
            batch.ranges,
            vec![(Shape::Sphere, 0..1), (Shape::Cylinder, 1..3)]
        );
    }

    #[test]
    fn normal_matrix_undoes_nonuniform_scale() {
        let raw = InstanceRaw::from_draw(&draw(
            Shape::Cylinder,
            DMat4::from_scale(DVec3::new(2.0, 2.0, 0.5)),
        ));
        assert_eq!(raw.normal[0][0], 0.5);
        assert_eq!(raw.normal[2][2], 2.0);
        assert_eq!(raw.model[3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(raw.color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn flat_draws_do_not_produce_nan_normals() {
        let raw = InstanceRaw::from_draw(&draw(
            Shape::Cylinder,
            DMat4::from_scale(DVec3::new(1.0, 1.0, 0.0)),
        ));
        assert!(raw.normal.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn each_line_becomes_two_vertices() {
        let lines = [LineSegment {
            start: DVec3::ZERO,
            end: DVec3::new(1.0, 2.0, 3.0),
            color: Color::GREEN,
        }];
        let vertices = line_vertices(&lines);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].position, [1.0, 2.0, 3.0]);
        assert_eq!(vertices[0].color, Color::GREEN.to_array());
    }

    #[test]
    fn uniform_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 80);
        assert_eq!(std::mem::size_of::<InstanceRaw>(), 128);
        assert_eq!(std::mem::size_of::<LineVertex>(), 28);
    }
}

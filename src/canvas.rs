//! Immediate-mode drawing surface used by the scene graph.
//!
//! The scene graph never talks to the GPU. It draws into a [`Canvas`]: a
//! matrix stack plus a handful of primitive calls. [`DrawQueue`] records
//! those calls into a [`FrameRecording`] that
//! [`ScenePass`](crate::ScenePass) later submits, and that tests inspect
//! directly.
//!
//! ```
//! use dhview::canvas::{Canvas, DrawQueue, Shape};
//! use dhview::Color;
//! use glam::{DMat4, DVec3};
//!
//! let mut canvas = DrawQueue::new();
//! canvas.push();
//! canvas.multiply(DMat4::from_translation(DVec3::X));
//! canvas.draw_shape(Shape::Sphere, DMat4::IDENTITY, Color::WHITE);
//! canvas.pop();
//!
//! assert_eq!(canvas.depth(), 0);
//! assert_eq!(canvas.frame().shapes.len(), 1);
//! ```

use glam::{DMat4, DVec3, Mat4};
use serde::{Deserialize, Serialize};

/// Linear RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "opaque")]
    pub a: f32,
}

fn opaque() -> f32 {
    1.0
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn gray(v: f32) -> Self {
        Self::rgb(v, v, v)
    }

    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<Color> for wgpu::Color {
    fn from(c: Color) -> Self {
        wgpu::Color {
            r: c.r as f64,
            g: c.g as f64,
            b: c.b as f64,
            a: c.a as f64,
        }
    }
}

/// Explicit model-view matrix stack.
///
/// The bottom entry is never popped, so [`current`](Self::current) is always
/// defined.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformStack {
    stack: Vec<DMat4>,
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStack {
    pub fn new() -> Self {
        Self {
            stack: vec![DMat4::IDENTITY],
        }
    }

    /// Duplicates the top entry.
    pub fn push(&mut self) {
        let top = self.current();
        self.stack.push(top);
    }

    /// Discards the top entry. Returns `false` on underflow and leaves the
    /// base entry in place.
    pub fn pop(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            log::warn!("transform stack underflow");
            false
        }
    }

    /// Number of pushes not yet popped.
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    pub fn current(&self) -> DMat4 {
        self.stack.last().copied().unwrap_or(DMat4::IDENTITY)
    }

    /// Post-multiplies the top entry: `top = top * m`.
    pub fn multiply(&mut self, m: DMat4) {
        if let Some(top) = self.stack.last_mut() {
            *top *= m;
        }
    }

    pub fn load_identity(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            *top = DMat4::IDENTITY;
        }
    }
}

/// The unit meshes a canvas can draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Radius 1 at the origin.
    Sphere,
    /// Side 1 centred at the origin.
    Cube,
    /// Radius 1 along z from 0 to 1.
    Cylinder,
}

/// One mesh instance in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeDraw {
    pub shape: Shape,
    pub transform: DMat4,
    pub color: Color,
}

/// One world-space line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSegment {
    pub start: DVec3,
    pub end: DVec3,
    pub color: Color,
}

/// Everything drawn during one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecording {
    pub clear_color: Color,
    pub projection: DMat4,
    pub view: DMat4,
    pub shapes: Vec<ShapeDraw>,
    pub lines: Vec<LineSegment>,
}

impl Default for FrameRecording {
    fn default() -> Self {
        Self {
            clear_color: Color::BLACK,
            projection: DMat4::IDENTITY,
            view: DMat4::IDENTITY,
            shapes: Vec::new(),
            lines: Vec::new(),
        }
    }
}

impl FrameRecording {
    /// `projection * view` in f32 for the GPU.
    pub fn view_projection(&self) -> Mat4 {
        (self.projection * self.view).as_mat4()
    }
}

/// A drawing target with a matrix stack.
///
/// Geometry passed to `draw_*` is in the coordinates of the current stack
/// top.
pub trait Canvas {
    fn stack(&self) -> &TransformStack;
    fn stack_mut(&mut self) -> &mut TransformStack;

    /// Starts a frame: clears colour and depth and empties pending draws.
    fn clear(&mut self, color: Color);
    fn set_projection(&mut self, projection: DMat4);
    fn set_view(&mut self, view: DMat4);

    /// Draws `shape` transformed by `local` relative to the stack top.
    fn draw_shape(&mut self, shape: Shape, local: DMat4, color: Color);
    fn draw_line(&mut self, start: DVec3, end: DVec3, color: Color);

    fn push(&mut self) {
        self.stack_mut().push();
    }

    fn pop(&mut self) -> bool {
        self.stack_mut().pop()
    }

    fn multiply(&mut self, m: DMat4) {
        self.stack_mut().multiply(m);
    }

    fn depth(&self) -> usize {
        self.stack().depth()
    }
}

/// A [`Canvas`] that records into a [`FrameRecording`].
#[derive(Clone, Debug, Default)]
pub struct DrawQueue {
    stack: TransformStack,
    frame: FrameRecording,
}

impl DrawQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame recorded so far.
    pub fn frame(&self) -> &FrameRecording {
        &self.frame
    }
}

impl Canvas for DrawQueue {
    fn stack(&self) -> &TransformStack {
        &self.stack
    }

    fn stack_mut(&mut self) -> &mut TransformStack {
        &mut self.stack
    }

    fn clear(&mut self, color: Color) {
        if self.stack.depth() != 0 {
            log::warn!("frame started with {} unpopped transforms", self.stack.depth());
        }
        self.stack = TransformStack::new();
        self.frame.clear_color = color;
        self.frame.shapes.clear();
        self.frame.lines.clear();
    }

    fn set_projection(&mut self, projection: DMat4) {
        self.frame.projection = projection;
    }

    fn set_view(&mut self, view: DMat4) {
        self.frame.view = view;
    }

    fn draw_shape(&mut self, shape: Shape, local: DMat4, color: Color) {
        self.frame.shapes.push(ShapeDraw {
            shape,
            transform: self.stack.current() * local,
            color,
        });
    }

    fn draw_line(&mut self, start: DVec3, end: DVec3, color: Color) {
        let top = self.stack.current();
        self.frame.lines.push(LineSegment {
            start: top.transform_point3(start),
            end: top.transform_point3(end),
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_never_underflows() {
        let mut stack = TransformStack::new();
        assert!(!stack.pop());
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.current(), DMat4::IDENTITY);
    }

    #[test]
    fn push_pop_restores_top() {
        let mut stack = TransformStack::new();
        let t = DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0));
        stack.multiply(t);
        stack.push();
        stack.multiply(DMat4::from_rotation_z(1.0));
        assert_eq!(stack.depth(), 1);
        assert!(stack.pop());
        assert_eq!(stack.current(), t);
    }

    #[test]
    fn lines_are_recorded_in_world_space() {
        let mut queue = DrawQueue::new();
        queue.multiply(DMat4::from_translation(DVec3::Z));
        queue.draw_line(DVec3::ZERO, DVec3::X, Color::RED);
        let line = queue.frame().lines[0];
        assert_eq!(line.start, DVec3::Z);
        assert_eq!(line.end, DVec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn clear_resets_frame() {
        let mut queue = DrawQueue::new();
        queue.push();
        queue.draw_shape(Shape::Cube, DMat4::IDENTITY, Color::WHITE);
        queue.clear(Color::gray(0.18));
        assert_eq!(queue.depth(), 0);
        assert!(queue.frame().shapes.is_empty());
        assert_eq!(queue.frame().clear_color, Color::gray(0.18));
    }
}

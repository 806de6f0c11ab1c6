//! Per-frame orchestration.
//!
//! [`RenderLoop::render`] records one frame into a [`Canvas`]: clear,
//! projection, camera view, ground grid, world axes, then the robot (or a
//! placeholder cube when nothing is loaded). It only reads the scene and the
//! camera.

use glam::{DMat4, DVec3};

use crate::camera::aspect_ratio;
use crate::canvas::{Canvas, Color, Shape};
use crate::config::RenderConfig;
use crate::orbit_camera::OrbitCamera;
use crate::scene_graph::SceneGraph;

/// Most grid lines drawn on each side of an axis.
///
/// [`Config`](crate::Config) rejects settings above this; the render loop
/// clamps as well so a hand-built [`RenderConfig`] cannot stall a frame.
pub const MAX_GRID_LINES: i64 = 1000;

/// Drawable surface size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height; a zero height gives 1 rather than infinity.
    pub fn aspect(&self) -> f64 {
        aspect_ratio(self.width, self.height)
    }
}

/// Records complete frames from a camera and an optional scene.
///
/// The loop owns the [`RenderConfig`] and nothing else, so the same loop can
/// draw any scene through any [`Canvas`].
///
/// # Example
/// ```
/// use dhview::{DrawQueue, OrbitCamera, RenderLoop, Viewport};
///
/// let render_loop = RenderLoop::default();
/// let mut canvas = DrawQueue::new();
/// render_loop.render(&mut canvas, &OrbitCamera::new(), None, Viewport::new(800, 600));
/// assert_eq!(canvas.frame().shapes.len(), 1); // placeholder cube
/// ```
#[derive(Clone, Debug, Default)]
pub struct RenderLoop {
    config: RenderConfig,
}

impl RenderLoop {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RenderConfig {
        &mut self.config
    }

    /// Records one frame.
    ///
    /// In order: clear colour, projection for `viewport`, the camera view,
    /// ground grid, world axes, then `scene` or the placeholder cube when it
    /// is `None`. The canvas transform stack is left as it was found; an
    /// unbalanced stack is logged.
    ///
    /// # Arguments
    /// * `canvas` - Receives the draw calls
    /// * `camera` - Orbit camera providing view and field of view
    /// * `scene` - The robot, if one is loaded
    /// * `viewport` - Surface size used for the aspect ratio
    pub fn render<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        camera: &OrbitCamera,
        scene: Option<&SceneGraph>,
        viewport: Viewport,
    ) {
        let view = camera.camera();
        canvas.clear(self.config.clear_color);
        canvas.set_projection(view.projection_matrix(viewport.aspect()));
        canvas.set_view(view.view_matrix());

        self.draw_grid(canvas);
        self.draw_axes(canvas);

        match scene {
            Some(scene) => scene.draw(canvas, &self.config.style),
            None => {
                let size = self.config.placeholder_size;
                canvas.draw_shape(
                    Shape::Cube,
                    DMat4::from_scale(DVec3::splat(size)),
                    self.config.placeholder_color,
                );
            }
        }

        if canvas.depth() != 0 {
            log::warn!("transform stack depth {} after frame", canvas.depth());
        }
    }

    fn draw_grid<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        let (size, step) = (self.config.grid_size, self.config.grid_step);
        if !(size > 0.0 && step > 0.0) || !size.is_finite() {
            return;
        }
        let lines = (size / step).round().min(MAX_GRID_LINES as f64) as i64;
        let step = if lines > 0 { size / lines as f64 } else { step };
        for k in -lines..=lines {
            let t = k as f64 * step;
            canvas.draw_line(DVec3::new(-size, t, 0.0), DVec3::new(size, t, 0.0), self.config.grid_color);
            canvas.draw_line(DVec3::new(t, -size, 0.0), DVec3::new(t, size, 0.0), self.config.grid_color);
        }
    }

    fn draw_axes<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        let length = self.config.axes_length;
        if length <= 0.0 {
            return;
        }
        canvas.draw_line(DVec3::ZERO, DVec3::X * length, Color::RED);
        canvas.draw_line(DVec3::ZERO, DVec3::Y * length, Color::GREEN);
        canvas.draw_line(DVec3::ZERO, DVec3::Z * length, Color::BLUE);
    }
}

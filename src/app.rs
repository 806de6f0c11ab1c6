//! The viewer window and its event loop.
//!
//! [`run`] opens a window, creates the GPU context once the platform hands
//! one out, and drives a [`RobotView`] from keyboard and mouse input. The
//! loop sleeps until something changes; frames are only requested after a
//! mutation or while the robot animates or the camera auto-rotates.
//!
//! | Input             | Action                        |
//! |-------------------|-------------------------------|
//! | left drag         | orbit                         |
//! | wheel             | zoom                          |
//! | arrow keys        | orbit 10° per press           |
//! | `+` / `-`         | zoom in / out                 |
//! | `R`               | reset camera                  |
//! | `Space`           | toggle joint animation        |
//! | `Escape`          | quit                          |

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::canvas::DrawQueue;
use crate::config::AppConfig;
use crate::error::{GpuError, RunError};
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::mesh::MeshLibrary;
use crate::render_loop::Viewport;
use crate::scene_pass::ScenePass;
use crate::viewer::RobotView;

/// Degrees turned per arrow key press.
const KEY_ROTATE_STEP: f64 = 10.0;
const KEY_ZOOM_IN: f64 = 0.8;
const KEY_ZOOM_OUT: f64 = 1.2;
/// Wake-up interval while something moves on its own (about 60 fps).
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// What the event loop should do after a round of input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Keep the window open.
    Continue,
    /// Close the window and return from [`run`].
    Quit,
}

/// Applies this frame's key presses to the view.
///
/// Only presses that started this frame count, so holding a key does not
/// repeat the command. Escape wins over everything else.
///
/// # Example
/// ```
/// use dhview::{Control, Input, KeyCode, RobotView, apply_key_commands};
///
/// let mut view = RobotView::default();
/// let mut input = Input::new();
/// input.press_key(KeyCode::ArrowRight);
///
/// assert_eq!(apply_key_commands(&mut view, &input), Control::Continue);
/// assert_eq!(view.camera().azimuth, 55.0);
/// ```
pub fn apply_key_commands(view: &mut RobotView, input: &Input) -> Control {
    if input.key_pressed(KeyCode::Escape) {
        return Control::Quit;
    }
    if input.key_pressed(KeyCode::ArrowLeft) {
        view.rotate(-KEY_ROTATE_STEP, 0.0);
    }
    if input.key_pressed(KeyCode::ArrowRight) {
        view.rotate(KEY_ROTATE_STEP, 0.0);
    }
    if input.key_pressed(KeyCode::ArrowUp) {
        view.rotate(0.0, KEY_ROTATE_STEP);
    }
    if input.key_pressed(KeyCode::ArrowDown) {
        view.rotate(0.0, -KEY_ROTATE_STEP);
    }
    if input.key_pressed(KeyCode::Equal) || input.key_pressed(KeyCode::NumpadAdd) {
        view.zoom(KEY_ZOOM_IN);
    }
    if input.key_pressed(KeyCode::Minus) || input.key_pressed(KeyCode::NumpadSubtract) {
        view.zoom(KEY_ZOOM_OUT);
    }
    if input.key_pressed(KeyCode::KeyR) {
        view.reset_camera();
    }
    if input.key_pressed(KeyCode::Space) {
        view.toggle_animation();
        log::info!(
            "animation {}",
            if view.is_animating() { "on" } else { "off" }
        );
    }
    Control::Continue
}

/// Opens the viewer window and blocks until it is closed.
///
/// The window and GPU are created when the platform first resumes the app.
/// If that fails the loop exits and the error is returned here; closing the
/// window or pressing Escape returns `Ok`.
///
/// # Arguments
/// * `config` - Window title, size and vsync
/// * `view` - The robot, camera and render settings to show
///
/// # Example
/// ```no_run
/// use dhview::{AppConfig, RobotView, Sample, run};
///
/// let mut view = RobotView::default();
/// view.load_sample(Sample::TwoArm).unwrap();
/// run(AppConfig::new().title("two arms"), view).unwrap();
/// ```
pub fn run(config: AppConfig, view: RobotView) -> Result<(), RunError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = ViewerApp::Pending {
        config,
        view: Some(view),
    };
    event_loop.run_app(&mut app)?;

    match app {
        ViewerApp::Failed(err) => Err(err),
        _ => Ok(()),
    }
}

/// Window lifecycle: waiting for `resumed`, running, or failed during setup.
enum ViewerApp {
    Pending {
        config: AppConfig,
        view: Option<RobotView>,
    },
    Running {
        window: Arc<Window>,
        gpu: GpuContext,
        scene_pass: ScenePass,
        meshes: MeshLibrary,
        canvas: DrawQueue,
        view: RobotView,
        input: Input,
        start_time: Instant,
        last_update: Instant,
    },
    Failed(RunError),
}

impl ViewerApp {
    /// Creates the window, GPU context, meshes and render pass.
    fn start(
        event_loop: &ActiveEventLoop,
        config: &AppConfig,
        view: RobotView,
    ) -> Result<Self, RunError> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let gpu = GpuContext::new(window.clone(), config.vsync)?;
        let meshes = MeshLibrary::new(&gpu, view.render_config().sphere_detail)
            .map_err(GpuError::from)?;
        let scene_pass = ScenePass::new(&gpu);
        log::info!("window {}x{} ready", gpu.width(), gpu.height());

        Ok(ViewerApp::Running {
            window,
            gpu,
            scene_pass,
            meshes,
            canvas: DrawQueue::new(),
            view,
            input: Input::new(),
            start_time: Instant::now(),
            last_update: Instant::now(),
        })
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let ViewerApp::Pending { config, view } = self else {
            return;
        };
        let Some(view) = view.take() else {
            return;
        };
        match ViewerApp::start(event_loop, config, view) {
            Ok(running) => *self = running,
            Err(err) => {
                log::error!("{err}");
                *self = ViewerApp::Failed(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let ViewerApp::Running {
            gpu,
            scene_pass,
            meshes,
            canvas,
            view,
            input,
            ..
        } = self
        else {
            return;
        };

        input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                gpu.resize(size.width, size.height);
                view.invalidate();
            }
            WindowEvent::RedrawRequested => {
                view.render(canvas, Viewport::new(gpu.width(), gpu.height()));
                scene_pass.render(gpu, canvas.frame(), meshes);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let ViewerApp::Running {
            window,
            view,
            input,
            start_time,
            last_update,
            ..
        } = self
        else {
            return;
        };

        let now = Instant::now();
        let dt = now.duration_since(*last_update).as_secs_f64();
        *last_update = now;

        if apply_key_commands(view, input) == Control::Quit {
            event_loop.exit();
            return;
        }
        view.update_camera(input, dt);
        view.animate(start_time.elapsed().as_secs_f64());
        input.begin_frame();

        if view.take_redraw() {
            window.request_redraw();
        }
        if view.is_animating() || view.camera_is_moving() {
            event_loop.set_control_flow(ControlFlow::WaitUntil(now + FRAME_INTERVAL));
        } else {
            event_loop.set_control_flow(ControlFlow::Wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(key: KeyCode) -> Input {
        let mut input = Input::new();
        input.press_key(key);
        input
    }

    #[test]
    fn escape_quits() {
        let mut view = RobotView::default();
        assert_eq!(apply_key_commands(&mut view, &tap(KeyCode::Escape)), Control::Quit);
        assert_eq!(
            apply_key_commands(&mut view, &Input::new()),
            Control::Continue
        );
    }

    #[test]
    fn arrows_orbit_in_fixed_steps() {
        let mut view = RobotView::default();
        apply_key_commands(&mut view, &tap(KeyCode::ArrowRight));
        assert_eq!(view.camera().azimuth, 55.0);
        apply_key_commands(&mut view, &tap(KeyCode::ArrowDown));
        assert_eq!(view.camera().elevation, 20.0);
    }

    #[test]
    fn plus_minus_zoom_and_r_resets() {
        let mut view = RobotView::default();
        apply_key_commands(&mut view, &tap(KeyCode::Equal));
        assert!((view.camera().distance - 2.4).abs() < 1e-12);
        apply_key_commands(&mut view, &tap(KeyCode::Minus));
        assert!((view.camera().distance - 2.88).abs() < 1e-12);
        apply_key_commands(&mut view, &tap(KeyCode::KeyR));
        assert_eq!(view.camera().distance, 3.0);
    }

    #[test]
    fn space_toggles_animation() {
        let mut view = RobotView::default();
        apply_key_commands(&mut view, &tap(KeyCode::Space));
        assert!(view.is_animating());
        apply_key_commands(&mut view, &tap(KeyCode::Space));
        assert!(!view.is_animating());
    }
}

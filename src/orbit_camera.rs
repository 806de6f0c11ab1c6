use std::f64::consts::FRAC_PI_2;

use glam::DVec3;
use winit::event::MouseButton;

use crate::camera::Camera;
use crate::input::Input;

/// Controls how the orbit camera moves.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum OrbitMode {
    /// Mouse drag rotates, the wheel zooms.
    #[default]
    Interactive,
    /// Azimuth advances on its own; input is ignored.
    AutoRotate {
        /// Degrees per second.
        speed: f64,
    },
}

/// Orbit camera around a look-at centre in a Z-up world.
///
/// Angles are in degrees. Azimuth is measured in the XY plane from +X and
/// kept in `[0, 360)`; elevation is measured from the XY plane and clamped to
/// `[-89, 89]`; distance is clamped to `[min_distance, max_distance]`.
///
/// Commands only mutate state. Requesting a redraw is the caller's job.
///
/// # Example
/// ```
/// use dhview::OrbitCamera;
///
/// let mut orbit = OrbitCamera::new();
/// orbit.rotate(10.0, 100.0);
/// assert_eq!(orbit.azimuth, 55.0);
/// assert_eq!(orbit.elevation, 89.0);
///
/// orbit.zoom(100.0);
/// assert_eq!(orbit.distance, orbit.max_distance);
///
/// orbit.reset();
/// assert_eq!(orbit.distance, 3.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    /// Point the camera orbits around.
    pub target: DVec3,
    pub distance: f64,
    pub azimuth: f64,
    pub elevation: f64,
    /// Vertical field of view in degrees.
    pub fov: f64,
    pub mode: OrbitMode,
    /// Degrees per pixel of mouse drag.
    pub sensitivity: f64,
    /// Distance factor per wheel line scrolled towards the scene.
    pub zoom_step: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    home: Home,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Home {
    distance: f64,
    azimuth: f64,
    elevation: f64,
}

const MIN_ELEVATION: f64 = -89.0;
const MAX_ELEVATION: f64 = 89.0;
const FRAME_MARGIN: f64 = 1.2;

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: DVec3::ZERO,
            distance: 3.0,
            azimuth: 45.0,
            elevation: 30.0,
            fov: 45.0,
            mode: OrbitMode::Interactive,
            sensitivity: 0.5,
            zoom_step: 0.9,
            min_distance: 0.5,
            max_distance: 10.0,
            home: Home {
                distance: 3.0,
                azimuth: 45.0,
                elevation: 30.0,
            },
        }
    }
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: impl Into<DVec3>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the distance, also used by [`reset`](Self::reset).
    pub fn distance(mut self, distance: f64) -> Self {
        self.distance = distance.clamp(self.min_distance, self.max_distance);
        self.home.distance = self.distance;
        self
    }

    pub fn mode(mut self, mode: OrbitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn fov(mut self, fov_degrees: f64) -> Self {
        self.fov = fov_degrees;
        self
    }

    /// Sets the azimuth in degrees, also used by [`reset`](Self::reset).
    pub fn azimuth(mut self, azimuth: f64) -> Self {
        self.azimuth = azimuth.rem_euclid(360.0);
        self.home.azimuth = self.azimuth;
        self
    }

    /// Sets the elevation in degrees, also used by [`reset`](Self::reset).
    pub fn elevation(mut self, elevation: f64) -> Self {
        self.elevation = elevation.clamp(MIN_ELEVATION, MAX_ELEVATION);
        self.home.elevation = self.elevation;
        self
    }

    pub fn sensitivity(mut self, degrees_per_pixel: f64) -> Self {
        self.sensitivity = degrees_per_pixel;
        self
    }

    pub fn zoom_step(mut self, factor: f64) -> Self {
        self.zoom_step = factor;
        self
    }

    /// Sets the zoom range. Limits that are not finite, not positive, or
    /// inverted are ignored with a warning and the previous range is kept.
    pub fn distance_limits(mut self, min: f64, max: f64) -> Self {
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
            log::warn!("ignoring camera distance limits [{min}, {max}]");
            return self;
        }
        self.min_distance = min;
        self.max_distance = max;
        self.distance = self.distance.clamp(min, max);
        self.home.distance = self.home.distance.clamp(min, max);
        self
    }

    /// Centres the view on a sphere and backs off until it fits the field of
    /// view with a 20% margin. Angles are kept.
    ///
    /// [`reset`](Self::reset) still returns to the home distance and angles;
    /// the target stays on the sphere. When the sphere needs more room than
    /// `max_distance` allows, the limit grows to fit it.
    pub fn frame_sphere(&mut self, center: DVec3, radius: f64) {
        if !center.is_finite() || !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let half_fov = (self.fov.to_radians() * 0.5).clamp(1e-3, FRAC_PI_2);
        let fit = radius * FRAME_MARGIN / half_fov.sin();
        if fit > self.max_distance {
            log::debug!("camera range widened to {fit:.3} to frame the robot");
            self.max_distance = fit;
        }
        self.target = center;
        self.distance = fit.clamp(self.min_distance, self.max_distance);
    }

    /// Adds to azimuth and elevation, in degrees.
    pub fn rotate(&mut self, delta_azimuth: f64, delta_elevation: f64) {
        if !delta_azimuth.is_finite() || !delta_elevation.is_finite() {
            return;
        }
        self.azimuth = (self.azimuth + delta_azimuth).rem_euclid(360.0);
        self.elevation = (self.elevation + delta_elevation).clamp(MIN_ELEVATION, MAX_ELEVATION);
    }

    /// Multiplies the distance by `factor`. Non-positive or non-finite
    /// factors are ignored.
    pub fn zoom(&mut self, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.distance = (self.distance * factor).clamp(self.min_distance, self.max_distance);
    }

    /// Restores the home distance, azimuth and elevation.
    pub fn reset(&mut self) {
        self.distance = self.home.distance;
        self.azimuth = self.home.azimuth;
        self.elevation = self.home.elevation;
    }

    /// Rotates from a mouse drag in pixels.
    pub fn drag(&mut self, dx: f64, dy: f64) {
        self.rotate(dx * self.sensitivity, dy * self.sensitivity);
    }

    /// Applies this frame's input. Returns `true` if the camera moved.
    pub fn update(&mut self, input: &Input, dt: f64) -> bool {
        let before = (self.distance, self.azimuth, self.elevation);
        match self.mode {
            OrbitMode::Interactive => {
                if input.mouse_down(MouseButton::Left) {
                    let delta = input.mouse_delta();
                    if delta.x != 0.0 || delta.y != 0.0 {
                        self.drag(delta.x as f64, delta.y as f64);
                    }
                }

                let scroll = input.scroll_delta().y as f64;
                if scroll != 0.0 {
                    // wheel up moves closer
                    self.zoom(self.zoom_step.powf(scroll));
                }
            }
            OrbitMode::AutoRotate { speed } => {
                self.rotate(speed * dt, 0.0);
            }
        }
        before != (self.distance, self.azimuth, self.elevation)
    }

    /// Eye position relative to the target (spherical to Cartesian, Z up).
    pub fn offset(&self) -> DVec3 {
        let (az, el) = (self.azimuth.to_radians(), self.elevation.to_radians());
        self.distance * DVec3::new(el.cos() * az.cos(), el.cos() * az.sin(), el.sin())
    }

    pub fn camera(&self) -> Camera {
        Camera {
            eye: self.target + self.offset(),
            target: self.target,
            up: DVec3::Z,
            fov: self.fov,
            ..Camera::default()
        }
    }
}

use glam::{DMat4, DVec3};

/// A look-at camera in a Z-up world.
///
/// Produced each frame by [`OrbitCamera::camera`](crate::OrbitCamera::camera)
/// and turned into view and projection matrices by the render loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: DVec3,
    pub target: DVec3,
    pub up: DVec3,
    /// Vertical field of view in degrees.
    pub fov: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: DVec3::new(3.0, 0.0, 0.0),
            target: DVec3::ZERO,
            up: DVec3::Z,
            fov: 45.0,
            near: 0.1,
            far: 50.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Right-handed perspective with a `0..1` depth range.
    pub fn projection_matrix(&self, aspect: f64) -> DMat4 {
        DMat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    pub fn forward(&self) -> DVec3 {
        (self.target - self.eye).normalize_or(DVec3::NEG_Z)
    }
}

/// `width / height`, or 1.0 when the height is zero (minimised window).
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    if height == 0 {
        1.0
    } else {
        width as f64 / height as f64
    }
}

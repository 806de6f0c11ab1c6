//! Viewer configuration.
//!
//! [`Config`] groups window, render, camera and animation settings. Every
//! field has a default, so a JSON file only needs the keys it changes:
//!
//! ```json
//! {
//!   "window": { "title": "RX90", "width": 1280, "height": 720 },
//!   "camera": { "distance": 4.0, "elevation": 20.0 },
//!   "render": { "style": { "show_frames": false } }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canvas::Color;
use crate::error::ConfigError;
use crate::model::{JointModel, RobotTable};
use crate::orbit_camera::{OrbitCamera, OrbitMode};
use crate::render_loop::MAX_GRID_LINES;
use crate::scene_graph::SceneStyle;

/// Allowed range of [`RenderConfig::sphere_detail`].
pub const SPHERE_DETAIL_RANGE: std::ops::RangeInclusive<u32> = 3..=256;

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(key, format!("must be finite and positive, got {value}")))
    }
}

/// Window settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "dhview".to_string(),
            width: 1024,
            height: 768,
            vsync: true,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

/// What the render loop draws around the robot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub clear_color: Color,
    /// Half-extent of the XY ground grid.
    pub grid_size: f64,
    pub grid_step: f64,
    pub grid_color: Color,
    /// World axis triad at the origin; 0 hides it.
    pub axes_length: f64,
    /// Edge of the cube drawn when no robot is loaded.
    pub placeholder_size: f64,
    pub placeholder_color: Color,
    /// Joint marker scale; guessed from link lengths when absent.
    pub length_scale: Option<f64>,
    pub sphere_detail: u32,
    pub style: SceneStyle,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: Color::gray(0.18),
            grid_size: 5.0,
            grid_step: 0.5,
            grid_color: Color::gray(0.3),
            axes_length: 1.5,
            placeholder_size: 0.3,
            placeholder_color: Color::gray(0.7),
            length_scale: None,
            sphere_detail: 24,
            style: SceneStyle::default(),
        }
    }
}

impl RenderConfig {
    /// Checks the grid, marker and mesh settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("render.grid_step", self.grid_step)?;
        if !self.grid_size.is_finite() || self.grid_size < 0.0 {
            return Err(invalid(
                "render.grid_size",
                format!("must be finite and not negative, got {}", self.grid_size),
            ));
        }
        let lines = (self.grid_size / self.grid_step).round();
        if lines > MAX_GRID_LINES as f64 {
            return Err(invalid(
                "render.grid_step",
                format!("{lines} grid lines per side, at most {MAX_GRID_LINES} allowed"),
            ));
        }
        if !self.axes_length.is_finite() || self.axes_length < 0.0 {
            return Err(invalid(
                "render.axes_length",
                format!("must be finite and not negative, got {}", self.axes_length),
            ));
        }
        positive("render.placeholder_size", self.placeholder_size)?;
        if let Some(scale) = self.length_scale {
            positive("render.length_scale", scale)?;
        }
        if !SPHERE_DETAIL_RANGE.contains(&self.sphere_detail) {
            return Err(invalid(
                "render.sphere_detail",
                format!(
                    "must be in {}..={}, got {}",
                    SPHERE_DETAIL_RANGE.start(),
                    SPHERE_DETAIL_RANGE.end(),
                    self.sphere_detail
                ),
            ));
        }
        Ok(())
    }
}

/// Orbit camera settings, angles in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub distance: f64,
    pub azimuth: f64,
    pub elevation: f64,
    pub fov: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    /// Degrees per pixel of drag.
    pub sensitivity: f64,
    /// Distance factor per wheel line.
    pub zoom_step: f64,
    /// Degrees per second; when set the camera spins on its own.
    pub auto_rotate: Option<f64>,
    /// Frame the robot whenever it is loaded or edited.
    pub auto_fit: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            distance: 3.0,
            azimuth: 45.0,
            elevation: 30.0,
            fov: 45.0,
            min_distance: 0.5,
            max_distance: 10.0,
            sensitivity: 0.5,
            zoom_step: 0.9,
            auto_rotate: None,
            auto_fit: true,
        }
    }
}

impl CameraConfig {
    /// Requires `0 < min_distance <= max_distance`, all finite, and a
    /// field of view strictly between 0 and 180 degrees.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("camera.min_distance", self.min_distance)?;
        positive("camera.max_distance", self.max_distance)?;
        if self.min_distance > self.max_distance {
            return Err(invalid(
                "camera.min_distance",
                format!(
                    "{} is larger than max_distance {}",
                    self.min_distance, self.max_distance
                ),
            ));
        }
        positive("camera.distance", self.distance)?;
        positive("camera.zoom_step", self.zoom_step)?;
        if !(self.fov > 0.0 && self.fov < 180.0) {
            return Err(invalid(
                "camera.fov",
                format!("must be between 0 and 180 degrees, got {}", self.fov),
            ));
        }
        for (key, value) in [
            ("camera.azimuth", self.azimuth),
            ("camera.elevation", self.elevation),
            ("camera.sensitivity", self.sensitivity),
        ] {
            if !value.is_finite() {
                return Err(invalid(key, format!("must be finite, got {value}")));
            }
        }
        if let Some(speed) = self.auto_rotate.filter(|s| !s.is_finite()) {
            return Err(invalid("camera.auto_rotate", format!("must be finite, got {speed}")));
        }
        Ok(())
    }

    pub fn orbit_camera(&self) -> OrbitCamera {
        let mode = match self.auto_rotate {
            Some(speed) => OrbitMode::AutoRotate { speed },
            None => OrbitMode::Interactive,
        };
        OrbitCamera::new()
            .distance_limits(self.min_distance, self.max_distance)
            .distance(self.distance)
            .azimuth(self.azimuth)
            .elevation(self.elevation)
            .fov(self.fov)
            .sensitivity(self.sensitivity)
            .zoom_step(self.zoom_step)
            .mode(mode)
    }
}

/// Joint sweep played when animation is toggled on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Seconds per full sweep.
    pub period: f64,
    /// Revolute swing in degrees around the start pose.
    pub revolute_amplitude: f64,
    /// Prismatic stroke in length units around the start pose.
    pub prismatic_amplitude: f64,
    /// Start animating immediately.
    pub autoplay: bool,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            period: 4.0,
            revolute_amplitude: 45.0,
            prismatic_amplitude: 0.2,
            autoplay: false,
        }
    }
}

/// All viewer settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: AppConfig,
    pub render: RenderConfig,
    pub camera: CameraConfig,
    pub animation: AnimationConfig,
}

impl AnimationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("animation.period", self.period)?;
        for (key, value) in [
            ("animation.revolute_amplitude", self.revolute_amplitude),
            ("animation.prismatic_amplitude", self.prismatic_amplitude),
        ] {
            if !value.is_finite() {
                return Err(invalid(key, format!("must be finite, got {value}")));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Parses and validates a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section; the first bad setting is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid(
                "window.width",
                format!(
                    "window size must be non-zero, got {}x{}",
                    self.window.width, self.window.height
                ),
            ));
        }
        self.render.validate()?;
        self.camera.validate()?;
        self.animation.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_json(&fs::read_to_string(path)?)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// Reads a [`RobotTable`] from JSON text and builds the model.
pub fn robot_from_json(text: &str) -> Result<JointModel, ConfigError> {
    let table: RobotTable = serde_json::from_str(text)?;
    Ok(JointModel::from_table(table)?)
}

/// Reads a robot description file.
pub fn load_robot(path: impl AsRef<Path>) -> Result<JointModel, ConfigError> {
    let path = path.as_ref();
    let model = robot_from_json(&fs::read_to_string(path)?)?;
    log::info!(
        "loaded robot '{}' ({} joints) from {}",
        model.name(),
        model.joint_count(),
        path.display()
    );
    Ok(model)
}

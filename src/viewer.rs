//! The viewer's single owned state object.
//!
//! [`RobotView`] bundles the loaded model, its transform engine and scene
//! graph, the current pose, the orbit camera and the render settings. Every
//! mutation goes through a method that also marks the view dirty, and the
//! event loop asks [`RobotView::take_redraw`] whether a frame is due.

use glam::{DMat4, DVec3};

use crate::canvas::Canvas;
use crate::config::{AnimationConfig, Config, RenderConfig};
use crate::dh::{DhField, DhParams, DhValue, JointType};
use crate::error::{ModelResult, ParameterError};
use crate::input::Input;
use crate::model::JointModel;
use crate::orbit_camera::{OrbitCamera, OrbitMode};
use crate::render_loop::{RenderLoop, Viewport};
use crate::samples::Sample;
use crate::scene_graph::SceneGraph;
use crate::transform::{Evaluation, JointValues, TransformEngine};

/// A loaded robot: model plus everything derived from it.
#[derive(Clone, Debug)]
struct Loaded {
    model: JointModel,
    engine: TransformEngine,
    scene: SceneGraph,
}

impl Loaded {
    fn new(model: JointModel, length_scale: Option<f64>) -> Self {
        let engine = TransformEngine::new(&model);
        let mut scene = SceneGraph::from_model(&model);
        let scale = length_scale.unwrap_or_else(|| SceneGraph::suggested_length_scale(&model));
        scene.init_geometry(scale);
        Self {
            model,
            engine,
            scene,
        }
    }
}

/// Everything the viewer shows, owned in one place.
///
/// A view starts empty and draws a placeholder cube. Loading a robot is
/// atomic: a table that fails validation leaves the previous robot on
/// screen.
///
/// # Example
/// ```
/// use dhview::{DhField, JointValues, RobotView, Sample};
///
/// let mut view = RobotView::default();
/// view.load_sample(Sample::Planar2R).unwrap();
/// view.apply_pose(&JointValues::new().with("q1", 90.0));
/// view.mutate(2, DhField::R, 0.5).unwrap();
///
/// let tip = view.frame_transforms()[2].w_axis;
/// assert!((tip.y - 1.5).abs() < 1e-9);
/// ```
#[derive(Clone, Debug)]
pub struct RobotView {
    loaded: Option<Loaded>,
    pose: JointValues,
    camera: OrbitCamera,
    render_loop: RenderLoop,
    animation: AnimationConfig,
    animating: bool,
    auto_fit: bool,
    dirty: bool,
}

/// Smallest radius the camera frames, so a robot folded onto its base
/// still gets a sensible view.
const MIN_FIT_RADIUS: f64 = 0.25;

impl Default for RobotView {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl RobotView {
    /// An empty view using the render, camera and animation settings of
    /// `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            loaded: None,
            pose: JointValues::new(),
            camera: config.camera.orbit_camera(),
            render_loop: RenderLoop::new(config.render.clone()),
            animation: config.animation.clone(),
            animating: config.animation.autoplay,
            auto_fit: config.camera.auto_fit,
            dirty: true,
        }
    }

    /// Builds and shows a robot from its DH table.
    ///
    /// On error nothing changes and the previous robot stays loaded.
    pub fn load(
        &mut self,
        dh_table: Vec<DhParams>,
        joint_types: Vec<JointType>,
        parent_indices: Vec<usize>,
    ) -> ModelResult<()> {
        let model = JointModel::build(dh_table, joint_types, parent_indices)?;
        self.load_model(model);
        Ok(())
    }

    /// Shows an already validated model. The pose is reset to zero and,
    /// unless auto-fit is off, the camera is framed on the robot.
    pub fn load_model(&mut self, model: JointModel) {
        log::info!(
            "showing '{}' with {} joints",
            model.name(),
            model.joint_count()
        );
        self.loaded = Some(Loaded::new(model, self.render_loop.config().length_scale));
        self.pose = JointValues::new();
        if self.auto_fit {
            self.fit_camera();
        }
        self.dirty = true;
    }

    /// Shows one of the built-in robots.
    pub fn load_sample(&mut self, sample: Sample) -> ModelResult<()> {
        self.load_model(sample.build()?);
        Ok(())
    }

    /// Removes the robot; the placeholder is drawn instead.
    pub fn unload(&mut self) {
        self.loaded = None;
        self.pose = JointValues::new();
        self.dirty = true;
    }

    pub fn model(&self) -> Option<&JointModel> {
        self.loaded.as_ref().map(|l| &l.model)
    }

    pub fn scene(&self) -> Option<&SceneGraph> {
        self.loaded.as_ref().map(|l| &l.scene)
    }

    pub fn engine(&self) -> Option<&TransformEngine> {
        self.loaded.as_ref().map(|l| &l.engine)
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn render_config(&self) -> &RenderConfig {
        self.render_loop.config()
    }

    /// Mutable camera access; marks the view dirty.
    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        self.dirty = true;
        &mut self.camera
    }

    /// The last pose applied, as given (revolute in degrees).
    pub fn pose(&self) -> &JointValues {
        &self.pose
    }

    /// Applies `{variable -> value}`. Revolute values are degrees, prismatic
    /// values length units; unknown names are ignored and joints not named
    /// keep their value. Returns the number of joints updated.
    pub fn apply_pose(&mut self, values: &JointValues) -> usize {
        let Some(loaded) = self.loaded.as_mut() else {
            return 0;
        };
        let applied = loaded.scene.apply_pose(values);
        let known: Vec<String> = loaded.model.variables().into_iter().map(|v| v.name).collect();
        for (name, value) in values.iter() {
            if known.iter().any(|k| k == name) {
                self.pose.set(name, value);
            }
        }
        log::debug!("pose updated: {applied} joints");
        self.dirty = true;
        applied
    }

    /// Edits one DH field of the loaded model in place and rebuilds the
    /// derived state, keeping the current pose.
    pub fn mutate(
        &mut self,
        joint: usize,
        field: DhField,
        value: impl Into<DhValue>,
    ) -> Result<(), ParameterError> {
        let Some(loaded) = self.loaded.as_mut() else {
            return Err(ParameterError::IndexOutOfRange { joint, last: 0 });
        };
        let mut model = loaded.model.clone();
        model.mutate(joint, field, value)?;
        *loaded = Loaded::new(model, self.render_loop.config().length_scale);
        let pose = self.pose.clone();
        self.apply_pose(&pose);
        if self.auto_fit {
            self.fit_camera();
        }
        Ok(())
    }

    /// Aims the camera at the centre of the frame origins (and the world
    /// origin) and backs off until they all fit in view.
    pub fn fit_camera(&mut self) {
        let transforms = self.frame_transforms();
        if transforms.is_empty() {
            return;
        }
        let (lo, hi) = transforms
            .iter()
            .map(|m| m.w_axis.truncate())
            .fold((DVec3::ZERO, DVec3::ZERO), |(lo, hi), p| (lo.min(p), hi.max(p)));
        let radius = (0.5 * (hi - lo).length()).max(MIN_FIT_RADIUS);
        self.camera.frame_sphere(0.5 * (lo + hi), radius);
        self.dirty = true;
    }

    /// Orbits the camera, in degrees.
    pub fn rotate(&mut self, delta_azimuth: f64, delta_elevation: f64) {
        self.camera.rotate(delta_azimuth, delta_elevation);
        self.dirty = true;
    }

    /// Scales the camera distance; below 1 moves closer.
    pub fn zoom(&mut self, factor: f64) {
        self.camera.zoom(factor);
        self.dirty = true;
    }

    /// Returns the camera to its home distance and angles. A fitted target
    /// is kept.
    pub fn reset_camera(&mut self) {
        self.camera.reset();
        self.dirty = true;
    }

    pub fn drag(&mut self, dx: f64, dy: f64) {
        self.camera.drag(dx, dy);
        self.dirty = true;
    }

    /// Feeds mouse input (or auto-rotation) to the camera.
    pub fn update_camera(&mut self, input: &Input, dt: f64) {
        if self.camera.update(input, dt) {
            self.dirty = true;
        }
    }

    /// Whether the camera moves on its own and needs continuous frames.
    pub fn camera_is_moving(&self) -> bool {
        matches!(self.camera.mode, OrbitMode::AutoRotate { .. })
    }

    /// Symbolically evaluates the base to `frame` transform at the current
    /// pose. Joint variables never posed count as zero.
    pub fn evaluate(&self, frame: usize) -> Option<Evaluation> {
        let loaded = self.loaded.as_ref()?;
        loaded.engine.evaluate(frame, &self.pose_values(&loaded.model))
    }

    /// Transform of frame `to` expressed in frame `from` at the current pose.
    pub fn evaluate_relative(&self, from: usize, to: usize) -> Option<Evaluation> {
        let loaded = self.loaded.as_ref()?;
        loaded
            .engine
            .evaluate_relative(from, to, &self.pose_values(&loaded.model))
    }

    fn pose_values(&self, model: &JointModel) -> JointValues {
        model
            .variables()
            .into_iter()
            .map(|v| {
                let value = self.pose.get(&v.name).unwrap_or(0.0);
                (v.name, value)
            })
            .collect()
    }

    /// World transform of every frame at the current pose.
    pub fn frame_transforms(&self) -> Vec<DMat4> {
        self.loaded
            .as_ref()
            .map(|l| l.scene.world_transforms())
            .unwrap_or_default()
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub fn set_animating(&mut self, on: bool) {
        self.animating = on;
        self.dirty = true;
    }

    pub fn toggle_animation(&mut self) {
        self.set_animating(!self.animating);
    }

    /// Sweeps every joint around the stored pose at time `t` seconds.
    ///
    /// Does nothing unless animation is on. The stored pose is not changed,
    /// so stopping returns the robot to it on the next pose update.
    pub fn animate(&mut self, t: f64) {
        if !self.animating {
            return;
        }
        let Some(loaded) = self.loaded.as_mut() else {
            return;
        };
        let period = self.animation.period.max(1e-3);
        let phase = std::f64::consts::TAU * t / period;

        let values: JointValues = loaded
            .model
            .variables()
            .into_iter()
            .enumerate()
            .map(|(k, v)| {
                let amplitude = match v.joint_type {
                    JointType::Revolute => self.animation.revolute_amplitude,
                    _ => self.animation.prismatic_amplitude,
                };
                let base = self.pose.get(&v.name).unwrap_or(0.0);
                let value = base + amplitude * (phase + k as f64 * 0.7).sin();
                (v.name, value)
            })
            .collect();
        loaded.scene.apply_pose(&values);
        self.dirty = true;
    }

    /// Records the current frame.
    pub fn render<C: Canvas + ?Sized>(&self, canvas: &mut C, viewport: Viewport) {
        self.render_loop
            .render(canvas, &self.camera, self.scene(), viewport);
    }

    /// Marks the view as needing a redraw.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Returns whether a redraw is due and clears the flag. Always `true`
    /// while animating or auto-rotating.
    pub fn take_redraw(&mut self) -> bool {
        let due = self.dirty || self.animating || self.camera_is_moving();
        self.dirty = false;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::DrawQueue;
    use crate::error::{ModelError, StructureError};
    use approx::assert_relative_eq;

    fn planar() -> (Vec<DhParams>, Vec<JointType>, Vec<usize>) {
        (
            vec![
                DhParams::new().theta("q1").r(1.0),
                DhParams::new().theta("q2").r(1.0),
            ],
            vec![JointType::Revolute; 2],
            vec![0, 1],
        )
    }

    #[test]
    fn failed_load_keeps_previous_robot() {
        let mut view = RobotView::default();
        let (dh, types, parents) = planar();
        view.load(dh, types, parents).unwrap();

        let (dh, types, _) = planar();
        let err = view.load(dh, types, vec![0, 7]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Structure(StructureError::ParentOutOfRange { .. })
        ));
        assert_eq!(view.model().unwrap().parents(), &[None, Some(0), Some(1)]);
    }

    #[test]
    fn pose_moves_frames() {
        let mut view = RobotView::default();
        let (dh, types, parents) = planar();
        view.load(dh, types, parents).unwrap();
        view.apply_pose(&JointValues::new().with("q1", 90.0).with("q2", 0.0));

        let frames = view.frame_transforms();
        assert_relative_eq!(frames[1].w_axis.y, 1.0, epsilon = 1e-9);
        assert_relative_eq!(frames[2].w_axis.y, 2.0, epsilon = 1e-9);

        let symbolic = view.evaluate(2).unwrap().into_result(2).unwrap();
        assert_relative_eq!(symbolic.w_axis.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn mutate_keeps_pose() {
        let mut view = RobotView::default();
        view.load_sample(Sample::Planar2R).unwrap();
        view.apply_pose(&JointValues::new().with("q1", 90.0));
        view.mutate(1, DhField::R, 2.0).unwrap();
        let frames = view.frame_transforms();
        assert_relative_eq!(frames[1].w_axis.y, 2.0, epsilon = 1e-9);
        assert_eq!(view.pose().get("q1"), Some(90.0));
    }

    #[test]
    fn loading_frames_the_robot() {
        let mut view = RobotView::default();
        view.load(
            vec![DhParams::new().theta("q1").r(5.0), DhParams::new().theta("q2").r(5.0)],
            vec![JointType::Revolute; 2],
            vec![0, 1],
        )
        .unwrap();
        let camera = view.camera();
        assert!(camera.target.abs_diff_eq(DVec3::new(5.0, 0.0, 0.0), 1e-9));
        assert!(camera.distance > 10.0);
        assert!(camera.distance <= camera.max_distance);

        // growing a link refits
        let before = view.camera().distance;
        view.mutate(2, DhField::R, 9.0).unwrap();
        assert!(view.camera().distance > before);
    }

    #[test]
    fn auto_fit_can_be_turned_off() {
        let mut config = Config::default();
        config.camera.auto_fit = false;
        let mut view = RobotView::new(&config);
        view.load_sample(Sample::Rx90).unwrap();
        assert_eq!(view.camera(), &config.camera.orbit_camera());
    }

    #[test]
    fn relative_evaluation_uses_current_pose() {
        let mut view = RobotView::default();
        let (dh, types, parents) = planar();
        view.load(dh, types, parents).unwrap();
        view.apply_pose(&JointValues::new().with("q1", 30.0).with("q2", 90.0));

        let frames = view.frame_transforms();
        let m = view.evaluate_relative(1, 2).unwrap().into_result(2).unwrap();
        assert!(m.abs_diff_eq(frames[1].inverse() * frames[2], 1e-9));
        assert_relative_eq!(m.w_axis.y, 1.0, epsilon = 1e-9);
        assert!(view.evaluate_relative(0, 5).is_none());
    }

    #[test]
    fn camera_commands_request_redraw() {
        let mut view = RobotView::default();
        assert!(view.take_redraw());
        assert!(!view.take_redraw());
        view.rotate(10.0, 0.0);
        assert!(view.take_redraw());
        view.zoom(1.2);
        view.reset_camera();
        assert!(view.take_redraw());
        assert_eq!(view.camera().azimuth, 45.0);
    }

    #[test]
    fn animation_leaves_stored_pose() {
        let mut view = RobotView::default();
        view.load_sample(Sample::Planar2R).unwrap();
        view.toggle_animation();
        view.animate(0.5);
        assert!(view.pose().is_empty());
        assert!(view.take_redraw());
        assert!(view.take_redraw());
        let moved = view.scene().unwrap().joint_vector();
        assert!(moved[1] != 0.0);
    }

    #[test]
    fn unloaded_view_renders_placeholder() {
        let view = RobotView::default();
        let mut canvas = DrawQueue::new();
        view.render(&mut canvas, Viewport::new(100, 100));
        assert_eq!(canvas.frame().shapes.len(), 1);
    }
}

//! The drawable joint tree.
//!
//! A [`SceneGraph`] mirrors a [`JointModel`]'s topology with owned
//! [`JointNode`]s. Each node applies its local DH transform on the canvas
//! matrix stack, draws its marker, recurses into its children in declaration
//! order, and pops, so a full draw leaves the stack where it found it.

use std::collections::HashMap;

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::canvas::{Canvas, Color, Shape};
use crate::dh::{DhParams, JointType};
use crate::model::JointModel;
use crate::transform::{JointValues, ResolvedDh};

pub const REVOLUTE_COLOR: Color = Color::rgb(0.8, 0.2, 0.2);
pub const PRISMATIC_COLOR: Color = Color::rgb(0.2, 0.8, 0.2);
pub const BASE_COLOR: Color = Color::gray(0.3);
pub const LINK_COLOR: Color = Color::rgb(0.2, 0.4, 0.8);

/// Marker scale used before [`SceneGraph::init_geometry`] is called.
pub const DEFAULT_LENGTH_SCALE: f64 = 0.1;

/// What the scene graph draws besides joint markers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneStyle {
    /// Cylinders from each joint origin to its children's origins.
    pub show_links: bool,
    pub link_radius: f64,
    /// RGB axis triads at every joint frame.
    pub show_frames: bool,
    pub frame_size: f64,
}

impl Default for SceneStyle {
    fn default() -> Self {
        Self {
            show_links: true,
            link_radius: 0.02,
            show_frames: true,
            frame_size: 0.15,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Transforms apply but no geometry is drawn.
    Uninitialized,
    Posed,
}

/// One joint frame in the scene graph.
#[derive(Clone, Debug)]
pub struct JointNode {
    index: usize,
    parent: Option<usize>,
    joint_type: JointType,
    params: DhParams,
    resolved: ResolvedDh,
    variable: Option<String>,
    children: Vec<JointNode>,
    q: f64,
    length_scale: f64,
    state: NodeState,
}

impl JointNode {
    fn from_model(model: &JointModel, index: usize) -> Self {
        let params = model.params(index).cloned().unwrap_or_default();
        let joint_type = model.joint_type(index).unwrap_or(JointType::Fixed);
        let (resolved, missing) = ResolvedDh::resolve(&params, joint_type, model.constants());
        if !missing.is_empty() {
            log::warn!("joint {index}: unbound constants {missing:?} drawn as 0");
        }

        let children = model
            .get_children(index)
            .iter()
            .map(|&child| JointNode::from_model(model, child))
            .collect();

        Self {
            index,
            parent: model.parent(index),
            joint_type,
            params,
            resolved,
            variable: model.variable_name(index),
            children,
            q: 0.0,
            length_scale: DEFAULT_LENGTH_SCALE,
            state: NodeState::Uninitialized,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn params(&self) -> &DhParams {
        &self.params
    }

    /// Name of the joint variable driving this node, if any.
    pub fn variable(&self) -> Option<&str> {
        self.variable.as_deref()
    }

    pub fn children(&self) -> &[JointNode] {
        &self.children
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Sets the marker scale and marks the node drawable.
    pub fn init_geometry(&mut self, length_scale: f64) {
        self.length_scale = length_scale;
        self.state = NodeState::Posed;
    }

    /// Sets the joint variable in radians (revolute) or length units.
    pub fn set_q(&mut self, q: f64) {
        self.q = q;
    }

    /// Transform from the parent frame to this frame at the current `q`.
    pub fn local_transform(&self) -> DMat4 {
        self.resolved.matrix(self.q)
    }

    /// Draws this node and its subtree.
    pub fn draw_recursive<C: Canvas + ?Sized>(&self, canvas: &mut C, style: &SceneStyle) {
        canvas.push();
        canvas.multiply(self.local_transform());

        if self.state == NodeState::Posed {
            self.draw_marker(canvas);
            if style.show_links {
                for child in &self.children {
                    let end = child.local_transform().w_axis.truncate();
                    draw_link(canvas, end, style.link_radius);
                }
            }
            if style.show_frames {
                draw_triad(canvas, style.frame_size);
            }
        }

        for child in &self.children {
            child.draw_recursive(canvas, style);
        }

        canvas.pop();
    }

    fn draw_marker<C: Canvas + ?Sized>(&self, canvas: &mut C) {
        let s = self.length_scale;
        let (shape, size, color) = match (self.index, self.joint_type) {
            (0, _) => (Shape::Sphere, s / 4.0, BASE_COLOR),
            (_, JointType::Revolute) => (Shape::Sphere, s / 6.0, REVOLUTE_COLOR),
            // Cube side is the full extent.
            (_, JointType::Prismatic) => (Shape::Cube, s / 4.0, PRISMATIC_COLOR),
            (_, JointType::Fixed) => (Shape::Sphere, s / 8.0, BASE_COLOR),
        };
        canvas.draw_shape(shape, DMat4::from_scale(DVec3::splat(size)), color);
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a JointNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    fn visit_mut(&mut self, f: &mut impl FnMut(&mut JointNode)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    fn accumulate(&self, parent: DMat4, out: &mut [DMat4]) {
        let world = parent * self.local_transform();
        if let Some(slot) = out.get_mut(self.index) {
            *slot = world;
        }
        for child in &self.children {
            child.accumulate(world, out);
        }
    }
}

fn draw_link<C: Canvas + ?Sized>(canvas: &mut C, end: DVec3, radius: f64) {
    let length = end.length();
    if length < 1e-6 {
        return;
    }
    let rotation = DQuat::from_rotation_arc(DVec3::Z, end / length);
    let local =
        DMat4::from_scale_rotation_translation(DVec3::new(radius, radius, length), rotation, DVec3::ZERO);
    canvas.draw_shape(Shape::Cylinder, local, LINK_COLOR);
}

fn draw_triad<C: Canvas + ?Sized>(canvas: &mut C, size: f64) {
    canvas.draw_line(DVec3::ZERO, DVec3::X * size, Color::RED);
    canvas.draw_line(DVec3::ZERO, DVec3::Y * size, Color::GREEN);
    canvas.draw_line(DVec3::ZERO, DVec3::Z * size, Color::BLUE);
}

/// Scene graph rooted at the base frame.
#[derive(Clone, Debug)]
pub struct SceneGraph {
    root: JointNode,
    len: usize,
    variables: HashMap<String, (usize, JointType)>,
}

impl SceneGraph {
    /// Builds one node per model frame by walking the parent links.
    ///
    /// The model is already validated, so construction cannot fail.
    pub fn from_model(model: &JointModel) -> Self {
        let variables = model
            .variables()
            .into_iter()
            .map(|v| (v.name, (v.joint, v.joint_type)))
            .collect();
        Self {
            root: JointNode::from_model(model, 0),
            len: model.len(),
            variables,
        }
    }

    /// Marker scale guess from the model's numeric link lengths.
    pub fn suggested_length_scale(model: &JointModel) -> f64 {
        let lengths: Vec<f64> = (1..model.len())
            .filter_map(|i| model.params(i))
            .flat_map(|p| [p.r.as_number(), p.d.as_number()])
            .flatten()
            .map(f64::abs)
            .filter(|v| *v > 1e-9)
            .collect();
        if lengths.is_empty() {
            return 0.3;
        }
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        (mean * 0.5).clamp(0.05, 1.0)
    }

    pub fn root(&self) -> &JointNode {
        &self.root
    }

    /// Number of nodes, base included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn node(&self, index: usize) -> Option<&JointNode> {
        let mut found = None;
        self.root.visit(&mut |n| {
            if n.index == index {
                found = Some(n);
            }
        });
        found
    }

    /// Calls `init_geometry` on every node.
    pub fn init_geometry(&mut self, length_scale: f64) {
        self.root.visit_mut(&mut |n| n.init_geometry(length_scale));
    }

    /// Sets `q` of node `index`. Returns `false` if there is no such node.
    pub fn set_q(&mut self, index: usize, q: f64) -> bool {
        let mut hit = false;
        self.root.visit_mut(&mut |n| {
            if n.index == index {
                n.set_q(q);
                hit = true;
            }
        });
        hit
    }

    /// Applies a `{variable -> value}` pose.
    ///
    /// Revolute values are degrees, prismatic values length units. Unknown
    /// names are ignored and joints not named keep their `q`. Returns the
    /// number of joints updated.
    pub fn apply_pose(&mut self, values: &JointValues) -> usize {
        let mut updates: HashMap<usize, f64> = HashMap::new();
        for (name, value) in values.iter() {
            match self.variables.get(name) {
                Some(&(joint, JointType::Revolute)) => {
                    updates.insert(joint, value.to_radians());
                }
                Some(&(joint, _)) => {
                    updates.insert(joint, value);
                }
                None => log::debug!("pose: ignoring unknown variable '{name}'"),
            }
        }
        let count = updates.len();
        self.root.visit_mut(&mut |n| {
            if let Some(&q) = updates.get(&n.index) {
                n.set_q(q);
            }
        });
        count
    }

    /// Current `q` of every frame, by index (base is 0).
    pub fn joint_vector(&self) -> Vec<f64> {
        let mut q = vec![0.0; self.len];
        self.root.visit(&mut |n| q[n.index] = n.q);
        q
    }

    /// Cumulative base-to-frame transforms, by frame index.
    pub fn world_transforms(&self) -> Vec<DMat4> {
        let mut out = vec![DMat4::IDENTITY; self.len];
        self.root.accumulate(DMat4::IDENTITY, &mut out);
        out
    }

    pub fn draw<C: Canvas + ?Sized>(&self, canvas: &mut C, style: &SceneStyle) {
        self.root.draw_recursive(canvas, style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::DrawQueue;
    use crate::transform::forward_kinematics;
    use approx::assert_relative_eq;

    fn tree() -> JointModel {
        // base -> 1 (R) -> 2 (P); base -> 3 (R)
        JointModel::build(
            vec![
                DhParams::new().theta("q1").d(0.5),
                DhParams::new().d("q2").r(0.2).alpha(1.0),
                DhParams::new().theta("q3").r(0.7),
            ],
            vec![JointType::Revolute, JointType::Prismatic, JointType::Revolute],
            vec![0, 1, 0],
        )
        .unwrap()
    }

    #[test]
    fn topology_mirrors_model() {
        let graph = SceneGraph::from_model(&tree());
        let root = graph.root();
        assert_eq!(root.index(), 0);
        let kids: Vec<usize> = root.children().iter().map(JointNode::index).collect();
        assert_eq!(kids, vec![1, 3]);
        assert_eq!(root.children()[0].children()[0].index(), 2);
        assert_eq!(graph.node(2).unwrap().parent(), Some(1));
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn draw_keeps_stack_depth() {
        let mut graph = SceneGraph::from_model(&tree());
        graph.init_geometry(0.2);
        let mut canvas = DrawQueue::new();
        canvas.push();
        graph.draw(&mut canvas, &SceneStyle::default());
        assert_eq!(canvas.depth(), 1);
        // one marker per node and one link per edge
        assert_eq!(canvas.frame().shapes.len(), 4 + 3);
        assert_eq!(canvas.frame().lines.len(), 4 * 3);
    }

    #[test]
    fn uninitialized_nodes_draw_nothing() {
        let graph = SceneGraph::from_model(&tree());
        assert_eq!(graph.root().state(), NodeState::Uninitialized);
        let mut canvas = DrawQueue::new();
        graph.draw(&mut canvas, &SceneStyle::default());
        assert!(canvas.frame().shapes.is_empty());
        assert_eq!(canvas.depth(), 0);
    }

    #[test]
    fn pose_converts_degrees_and_ignores_unknowns() {
        let mut graph = SceneGraph::from_model(&tree());
        let pose = JointValues::new()
            .with("q1", 90.0)
            .with("q2", 0.3)
            .with("bogus", 1.0);
        assert_eq!(graph.apply_pose(&pose), 2);
        assert_relative_eq!(graph.node(1).unwrap().q(), std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(graph.node(2).unwrap().q(), 0.3);
        assert_eq!(graph.node(3).unwrap().q(), 0.0);

        // missing names keep prior values
        graph.apply_pose(&JointValues::new().with("q3", 10.0));
        assert_relative_eq!(graph.node(2).unwrap().q(), 0.3);
    }

    #[test]
    fn set_q_is_idempotent() {
        let mut graph = SceneGraph::from_model(&tree());
        graph.set_q(1, 0.4);
        let once = graph.world_transforms();
        graph.set_q(1, 0.4);
        assert_eq!(graph.world_transforms(), once);
        assert!(!graph.set_q(42, 1.0));
    }

    #[test]
    fn world_transforms_match_forward_kinematics() {
        let model = tree();
        let mut graph = SceneGraph::from_model(&model);
        let q = [0.3, 0.2, -1.1];
        for (k, v) in q.iter().enumerate() {
            graph.set_q(k + 1, *v);
        }
        let expected = forward_kinematics(&model, &q);
        for (a, b) in graph.world_transforms().iter().zip(&expected) {
            for (x, y) in a.to_cols_array().into_iter().zip(b.to_cols_array()) {
                assert_relative_eq!(x, y, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn drawn_markers_sit_on_frame_origins() {
        let model = tree();
        let mut graph = SceneGraph::from_model(&model);
        graph.init_geometry(0.2);
        graph.set_q(2, 0.4);
        let mut canvas = DrawQueue::new();
        let style = SceneStyle {
            show_links: false,
            show_frames: false,
            ..Default::default()
        };
        graph.draw(&mut canvas, &style);

        let world = graph.world_transforms();
        let origins: Vec<DVec3> = canvas
            .frame()
            .shapes
            .iter()
            .map(|s| s.transform.w_axis.truncate())
            .collect();
        // draw order is depth-first: 0, 1, 2, 3
        for (origin, frame) in origins.iter().zip([0, 1, 2, 3]) {
            assert!((*origin - world[frame].w_axis.truncate()).length() < 1e-12);
        }
        assert_eq!(canvas.frame().shapes[2].shape, Shape::Cube);
    }

    #[test]
    fn length_scale_guess() {
        assert_relative_eq!(
            SceneGraph::suggested_length_scale(&tree()),
            0.7 / 3.0,
            epsilon = 1e-12
        );
    }
}

//! # dhview
//!
//! **Denavit-Hartenberg robots as a live 3D scene graph.**
//!
//! Describe a robot as a DH table with joint types and parent links, and
//! dhview validates it, derives the symbolic transform of every frame, and
//! draws it as nested joint markers and links you can orbit around.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dhview::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut view = RobotView::default();
//!     view.load(
//!         vec![
//!             DhParams::new().theta("q1").r(1.0),
//!             DhParams::new().theta("q2").r(0.8),
//!         ],
//!         vec![JointType::Revolute; 2],
//!         vec![0, 1],
//!     )?;
//!     view.apply_pose(&JointValues::new().with("q1", 30.0).with("q2", -45.0));
//!
//!     run(AppConfig::default(), view)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! - **Model**: [`JointModel`] validates the table; [`TransformEngine`]
//!   builds symbolic local and chained transforms.
//! - **Scene**: [`SceneGraph`] mirrors the tree and draws into any
//!   [`canvas::Canvas`], so everything above the GPU is testable headless.
//! - **Window**: [`run`] drives a [`RobotView`] with winit and wgpu.
//!
//! Kinematics use `f64` throughout; only the GPU sees `f32`.

mod app;
mod camera;
pub mod canvas;
pub mod config;
pub mod dh;
pub mod error;
mod gpu;
mod input;
mod mesh;
pub mod model;
mod orbit_camera;
pub mod primitives;
mod render_loop;
pub mod samples;
pub mod scene_graph;
mod scene_pass;
pub mod symbolic;
pub mod transform;
mod viewer;

pub use app::{Control, apply_key_commands, run};
pub use camera::{Camera, aspect_ratio};
pub use canvas::{Color, DrawQueue, FrameRecording, Shape, TransformStack};
pub use config::{AnimationConfig, AppConfig, CameraConfig, Config, RenderConfig, load_robot, robot_from_json};
pub use dh::{DhField, DhParams, DhValue, JointType};
pub use error::{
    ConfigError, GeometryError, GpuError, ModelError, ModelResult, ParameterError, RunError,
    StructureError, UnresolvedSymbols,
};
pub use gpu::GpuContext;
pub use input::Input;
pub use mesh::{Mesh, MeshLibrary, Vertex3d};
pub use model::{JointModel, JointVariable, RobotTable};
pub use orbit_camera::{OrbitCamera, OrbitMode};
pub use render_loop::{RenderLoop, Viewport};
pub use samples::{Sample, UnknownSample};
pub use scene_graph::{JointNode, NodeState, SceneGraph, SceneStyle};
pub use scene_pass::ScenePass;
pub use symbolic::{Expr, SymMatrix};
pub use transform::{
    Evaluation, JointValues, TransformEngine, dh_matrix, extended_dh_matrix, forward_kinematics,
    joint_positions,
};
pub use viewer::RobotView;

// Re-export glam math types for convenience
pub use glam::{DMat4, DVec3};

// Re-export commonly used winit types for convenience
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

//! Error types for model construction, geometry generation and evaluation.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::dh::DhField;

/// The parent graph handed to [`JointModel::build`](crate::JointModel::build)
/// is not a tree rooted at the base frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    /// A joint names a parent index that does not exist.
    #[error("joint {joint} references parent {parent}, but the model only has frames 0..={last}")]
    ParentOutOfRange {
        joint: usize,
        parent: usize,
        last: usize,
    },

    /// A joint names itself as its parent.
    #[error("joint {joint} is its own parent and never reaches the base frame")]
    Cycle { joint: usize },

    /// A parent must be declared before its children.
    #[error("joint {joint} references parent {parent}, which is not declared before it")]
    ParentNotBefore { joint: usize, parent: usize },
}

/// A DH row (or a single DH field) is malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    /// Table, joint-type list and parent list disagree on the joint count.
    #[error("expected {expected} {what}, found {found}")]
    Arity {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A numeric field is NaN or infinite.
    #[error("joint {joint}: field {field} is not a finite number ({value})")]
    NonFinite {
        joint: usize,
        field: DhField,
        value: f64,
    },

    /// A symbolic field is not a valid identifier.
    #[error("joint {joint}: field {field} has invalid symbol name '{name}'")]
    InvalidSymbol {
        joint: usize,
        field: DhField,
        name: String,
    },

    /// A joint variable also appears in a fixed slot of some row.
    #[error("joint {joint}: field {field} uses joint variable '{name}' as a constant")]
    VariableInFixedSlot {
        joint: usize,
        field: DhField,
        name: String,
    },

    /// Two joints share a variable name.
    #[error("joint variable '{name}' is used by both joint {first} and joint {second}")]
    DuplicateVariable {
        name: String,
        first: usize,
        second: usize,
    },

    /// Not an editable joint: the base frame or an index past the end.
    #[error("joint index {joint} is out of range (joints are 1..={last})")]
    IndexOutOfRange { joint: usize, last: usize },

    /// Text that is neither a number, a multiple of pi, nor an identifier.
    #[error("cannot parse DH value '{0}'")]
    Parse(String),

    /// Unknown DH field name.
    #[error("unknown DH field '{0}'")]
    UnknownField(String),

    /// Unknown joint type tag.
    #[error("unknown joint type '{0}'")]
    UnknownJointType(String),
}

/// Any failure while building a [`JointModel`](crate::JointModel).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Invalid input to a procedural primitive generator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("{what} needs at least 3 segments, got {got}")]
    TooFewSegments { what: &'static str, got: u32 },

    #[error("{what} must be finite and positive, got {value}")]
    InvalidDimension { what: &'static str, value: f32 },
}

/// A numeric transform was requested while symbols were still free.
///
/// This is a warning-level condition: the caller may supply the missing
/// values and evaluate again, or keep working with the symbolic matrix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transform of frame {frame} is not fully resolved; free symbols: {}", join(.missing))]
pub struct UnresolvedSymbols {
    pub frame: usize,
    pub missing: BTreeSet<String>,
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Failure reading a configuration or robot description file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// A setting is outside the range the viewer can use.
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failure while setting up the GPU for the viewer window.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("cannot create a surface for the window: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("cannot create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("the surface reports no supported texture format")]
    UnsupportedSurface,

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Failure while running the viewer window.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("cannot open window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Result type for model construction.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

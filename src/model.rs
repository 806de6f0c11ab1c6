//! The DH joint tree.
//!
//! A [`JointModel`] stores N+1 frames: frame 0 is the fixed base (world)
//! frame and frames 1..=N are joints. Each joint has a DH record, a joint
//! type, an antecedent (parent) frame and an actuation flag. Every parent is
//! declared before its children, so the links form a tree rooted at frame 0;
//! a frame may have any number of children.
//!
//! ```
//! use dhview::{DhParams, JointModel, JointType};
//!
//! let model = JointModel::build(
//!     vec![
//!         DhParams::new().theta("q1").r(1.0),
//!         DhParams::new().theta("q2").r(1.0),
//!     ],
//!     vec![JointType::Revolute, JointType::Revolute],
//!     vec![0, 1],
//! )
//! .unwrap();
//!
//! assert_eq!(model.joint_count(), 2);
//! assert_eq!(model.get_children(0), &[1]);
//! assert_eq!(model.chain(2), vec![0, 1, 2]);
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dh::{DhField, DhParams, DhValue, JointType};
use crate::error::{ModelResult, ParameterError, StructureError};

/// A joint variable exposed by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointVariable {
    /// Frame index of the joint.
    pub joint: usize,
    /// Variable name used in pose updates.
    pub name: String,
    /// Revolute variables are angles, prismatic ones are lengths.
    pub joint_type: JointType,
}

/// DH parameter table plus parent links describing one robot.
#[derive(Clone, Debug, PartialEq)]
pub struct JointModel {
    name: String,
    params: Vec<DhParams>,
    types: Vec<JointType>,
    ant: Vec<Option<usize>>,
    mu: Vec<bool>,
    children: Vec<Vec<usize>>,
    constants: BTreeMap<String, f64>,
}

impl JointModel {
    /// Builds and validates a model.
    ///
    /// `dh_table` and `joint_types` hold one entry per joint (frames 1..=N),
    /// and `parent_indices[k]` is the antecedent of joint `k + 1`, which must
    /// be smaller than `k + 1`. Fails with [`StructureError`] when a parent is
    /// out of range or not declared before its child, and with
    /// [`ParameterError`] when a row is malformed or a joint variable is
    /// reused. Nothing is returned on failure.
    pub fn build(
        dh_table: Vec<DhParams>,
        joint_types: Vec<JointType>,
        parent_indices: Vec<usize>,
    ) -> ModelResult<Self> {
        let joints = dh_table.len();
        if joint_types.len() != joints {
            return Err(ParameterError::Arity {
                what: "joint types",
                expected: joints,
                found: joint_types.len(),
            }
            .into());
        }
        if parent_indices.len() != joints {
            return Err(ParameterError::Arity {
                what: "parent indices",
                expected: joints,
                found: parent_indices.len(),
            }
            .into());
        }

        let mut ant = Vec::with_capacity(joints + 1);
        ant.push(None);
        ant.extend(parent_indices.into_iter().map(Some));
        validate_tree(&ant)?;

        let mut params = Vec::with_capacity(joints + 1);
        params.push(DhParams::new());
        params.extend(dh_table);

        let mut types = Vec::with_capacity(joints + 1);
        types.push(JointType::Fixed);
        types.extend(joint_types);

        for (joint, row) in params.iter().enumerate().skip(1) {
            validate_row(joint, row)?;
        }

        let mu = types.iter().map(|t| t.is_mobile()).collect();
        let children = adjacency(&ant);

        let model = Self {
            name: String::from("robot"),
            params,
            types,
            ant,
            mu,
            children,
            constants: BTreeMap::new(),
        };
        model.validate_variables()?;

        log::debug!(
            "built joint model '{}' with {} joints",
            model.name,
            model.joint_count()
        );
        Ok(model)
    }

    /// Sets the robot's display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Binds values for geometric constants (symbols outside joint variables).
    pub fn with_constants(mut self, constants: BTreeMap<String, f64>) -> Self {
        self.constants = constants;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound geometric constants.
    pub fn constants(&self) -> &BTreeMap<String, f64> {
        &self.constants
    }

    pub fn set_constant(&mut self, name: impl Into<String>, value: f64) {
        self.constants.insert(name.into(), value);
    }

    /// Number of frames including the base (N + 1).
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// A model always has its base frame, so it is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of joints (N).
    pub fn joint_count(&self) -> usize {
        self.params.len() - 1
    }

    pub fn params(&self, i: usize) -> Option<&DhParams> {
        self.params.get(i)
    }

    pub fn joint_type(&self, i: usize) -> Option<JointType> {
        self.types.get(i).copied()
    }

    /// Antecedent of frame `i`; `None` for the base and out-of-range indices.
    pub fn parent(&self, i: usize) -> Option<usize> {
        self.ant.get(i).copied().flatten()
    }

    /// Parent links, `ant[0]` is `None`.
    pub fn parents(&self) -> &[Option<usize>] {
        &self.ant
    }

    /// Children of frame `i` in declaration order.
    pub fn get_children(&self, i: usize) -> &[usize] {
        self.children.get(i).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_actuated(&self, i: usize) -> bool {
        self.mu.get(i).copied().unwrap_or(false)
    }

    /// Marks joint `i` as actuated or passive. The base frame cannot be changed.
    pub fn set_actuated(&mut self, i: usize, actuated: bool) -> Result<(), ParameterError> {
        self.check_joint(i)?;
        self.mu[i] = actuated;
        Ok(())
    }

    fn check_joint(&self, i: usize) -> Result<(), ParameterError> {
        if i == 0 || i >= self.len() {
            return Err(ParameterError::IndexOutOfRange {
                joint: i,
                last: self.joint_count(),
            });
        }
        Ok(())
    }

    /// Frames from the base to `i`, both inclusive. Empty if `i` is out of range.
    pub fn chain(&self, i: usize) -> Vec<usize> {
        if i >= self.len() {
            return Vec::new();
        }
        let mut path = vec![i];
        let mut current = i;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Pre-order traversal from the base, children in declaration order.
    pub fn depth_first(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.len());
        let mut stack = vec![0];
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(self.get_children(i).iter().rev());
        }
        order
    }

    /// Frames without children (tool tips).
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.get_children(i).is_empty())
            .collect()
    }

    /// Name of the variable driving joint `i`, if it is mobile.
    ///
    /// A symbol in the free slot is the variable name. A numeric free slot
    /// is a fixed offset, and the variable is named `q<i>`.
    pub fn variable_name(&self, i: usize) -> Option<String> {
        let field = self.joint_type(i)?.variable_field()?;
        let name = match self.params[i].get(field) {
            DhValue::Symbol(name) => name.clone(),
            DhValue::Number(_) => format!("q{i}"),
        };
        Some(name)
    }

    /// Joint variables of all mobile joints, in frame order.
    pub fn variables(&self) -> Vec<JointVariable> {
        (1..self.len())
            .filter_map(|joint| {
                Some(JointVariable {
                    joint,
                    name: self.variable_name(joint)?,
                    joint_type: self.types[joint],
                })
            })
            .collect()
    }

    /// Updates one DH field of joint `i` in place. The tree topology is
    /// untouched.
    ///
    /// The base frame (0) is always the identity and cannot be edited. The new
    /// value is validated like a table row; on error the model is left
    /// unchanged.
    pub fn mutate(
        &mut self,
        i: usize,
        field: DhField,
        value: impl Into<DhValue>,
    ) -> Result<(), ParameterError> {
        self.check_joint(i)?;

        let mut row = self.params[i].clone();
        row.set(field, value.into());
        validate_row(i, &row)?;

        let previous = std::mem::replace(&mut self.params[i], row);
        if let Err(e) = self.validate_variables() {
            self.params[i] = previous;
            return Err(e);
        }
        log::debug!("joint {i}: {field} = {}", self.params[i].get(field));
        Ok(())
    }

    /// Exports the model as a serialisable table.
    pub fn to_table(&self) -> RobotTable {
        RobotTable {
            name: self.name.clone(),
            joints: (1..self.len())
                .map(|i| JointRow {
                    parent: self.ant[i].unwrap_or(0),
                    joint_type: self.types[i],
                    actuated: self.mu[i],
                    params: self.params[i].clone(),
                })
                .collect(),
            constants: self.constants.clone(),
        }
    }

    /// Rebuilds a model from a table produced by [`JointModel::to_table`] or
    /// read from JSON.
    pub fn from_table(table: RobotTable) -> ModelResult<Self> {
        let RobotTable {
            name,
            joints,
            constants,
        } = table;

        let mut dh = Vec::with_capacity(joints.len());
        let mut types = Vec::with_capacity(joints.len());
        let mut parents = Vec::with_capacity(joints.len());
        let mut actuated = Vec::with_capacity(joints.len());
        for row in joints {
            dh.push(row.params);
            types.push(row.joint_type);
            parents.push(row.parent);
            actuated.push(row.actuated);
        }

        let mut model = Self::build(dh, types, parents)?
            .with_name(name)
            .with_constants(constants);
        for (k, flag) in actuated.into_iter().enumerate() {
            model.mu[k + 1] = flag;
        }
        Ok(model)
    }

    /// Joint variables must be unique and may only appear in their own
    /// joint's free slot. Any other slot would read them as constants.
    fn validate_variables(&self) -> Result<(), ParameterError> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for joint in 1..self.len() {
            let Some(name) = self.variable_name(joint) else {
                continue;
            };
            if let Some(&first) = seen.get(&name) {
                return Err(ParameterError::DuplicateVariable {
                    name,
                    first,
                    second: joint,
                });
            }
            seen.insert(name, joint);
        }

        for joint in 1..self.len() {
            let free = self.types[joint].variable_field();
            for (field, value) in self.params[joint].fields() {
                if Some(field) == free {
                    continue;
                }
                if let Some(name) = value.as_symbol().filter(|n| seen.contains_key(*n)) {
                    return Err(ParameterError::VariableInFixedSlot {
                        joint,
                        field,
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn validate_tree(ant: &[Option<usize>]) -> Result<(), StructureError> {
    let last = ant.len() - 1;
    for (joint, parent) in ant.iter().enumerate().skip(1) {
        let Some(parent) = *parent else { continue };
        if parent > last {
            return Err(StructureError::ParentOutOfRange {
                joint,
                parent,
                last,
            });
        }
        if parent == joint {
            return Err(StructureError::Cycle { joint });
        }
        // Parents precede children, so every walk up ends at frame 0.
        if parent > joint {
            return Err(StructureError::ParentNotBefore { joint, parent });
        }
    }
    Ok(())
}

fn validate_row(joint: usize, row: &DhParams) -> Result<(), ParameterError> {
    for (field, value) in row.fields() {
        match value {
            DhValue::Number(v) if !v.is_finite() => {
                return Err(ParameterError::NonFinite {
                    joint,
                    field,
                    value: *v,
                });
            }
            DhValue::Symbol(name) if !DhValue::is_identifier(name) => {
                return Err(ParameterError::InvalidSymbol {
                    joint,
                    field,
                    name: name.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn adjacency(ant: &[Option<usize>]) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::new(); ant.len()];
    for (joint, parent) in ant.iter().enumerate() {
        if let Some(parent) = parent {
            children[*parent].push(joint);
        }
    }
    children
}

/// Serialisable description of a robot: one row per joint plus bound constants.
///
/// ```json
/// {
///   "name": "Planar2R",
///   "joints": [
///     { "parent": 0, "type": "R", "theta": "q1", "r": 1.0 },
///     { "parent": 1, "type": "R", "theta": "q2", "r": 1.0 }
///   ]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotTable {
    #[serde(default = "default_name")]
    pub name: String,
    pub joints: Vec<JointRow>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<String, f64>,
}

fn default_name() -> String {
    String::from("robot")
}

/// One joint of a [`RobotTable`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointRow {
    pub parent: usize,
    #[serde(rename = "type")]
    pub joint_type: JointType,
    #[serde(default = "default_actuated")]
    pub actuated: bool,
    #[serde(flatten)]
    pub params: DhParams,
}

fn default_actuated() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    fn planar(n: usize) -> JointModel {
        let dh = (1..=n)
            .map(|i| DhParams::new().theta(DhValue::symbol(format!("q{i}"))).r(1.0))
            .collect();
        JointModel::build(dh, vec![JointType::Revolute; n], (0..n).collect()).unwrap()
    }

    #[test]
    fn base_frame_is_fixed_and_parentless() {
        let model = planar(3);
        assert_eq!(model.len(), 4);
        assert_eq!(model.joint_type(0), Some(JointType::Fixed));
        assert_eq!(model.parent(0), None);
        assert!(!model.is_actuated(0));
        assert!(model.is_actuated(1));
    }

    #[test]
    fn children_follow_declaration_order() {
        // 0 -> {1, 3}, 1 -> {2, 4}
        let dh = vec![DhParams::new(); 4];
        let model = JointModel::build(dh, vec![JointType::Revolute; 4], vec![0, 1, 0, 1]).unwrap();
        assert_eq!(model.get_children(0), &[1, 3]);
        assert_eq!(model.get_children(1), &[2, 4]);
        assert_eq!(model.depth_first(), vec![0, 1, 2, 4, 3]);
        assert_eq!(model.leaves(), vec![2, 3, 4]);
        assert_eq!(model.chain(4), vec![0, 1, 4]);
    }

    #[test]
    fn rejects_out_of_range_parent() {
        let err = JointModel::build(
            vec![DhParams::new(); 2],
            vec![JointType::Revolute; 2],
            vec![0, 5],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::Structure(StructureError::ParentOutOfRange {
                joint: 2,
                parent: 5,
                last: 2
            })
        );
    }

    #[test]
    fn rejects_self_parent() {
        let err = JointModel::build(vec![DhParams::new()], vec![JointType::Revolute], vec![1])
            .unwrap_err();
        assert_eq!(err, ModelError::Structure(StructureError::Cycle { joint: 1 }));
    }

    #[test]
    fn parents_must_precede_children() {
        let err = JointModel::build(
            vec![DhParams::new(); 2],
            vec![JointType::Revolute; 2],
            vec![2, 0],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::Structure(StructureError::ParentNotBefore { joint: 1, parent: 2 })
        );

        // a two-joint loop is caught by the same rule
        let err = JointModel::build(
            vec![DhParams::new(); 3],
            vec![JointType::Revolute; 3],
            vec![0, 3, 2],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Structure(StructureError::ParentNotBefore { joint: 2, parent: 3 })
        ));
    }

    #[test]
    fn rejects_arity_mismatch() {
        let err = JointModel::build(vec![DhParams::new(); 2], vec![JointType::Revolute], vec![0, 1])
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Parameter(ParameterError::Arity { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn rejects_malformed_rows() {
        let bad = DhParams::new().r(f64::NAN);
        let err = JointModel::build(vec![bad], vec![JointType::Revolute], vec![0]).unwrap_err();
        assert!(matches!(err, ModelError::Parameter(ParameterError::NonFinite { .. })));

        let bad = DhParams::new().d(DhValue::symbol("2x"));
        let err = JointModel::build(vec![bad], vec![JointType::Revolute], vec![0]).unwrap_err();
        assert!(matches!(err, ModelError::Parameter(ParameterError::InvalidSymbol { .. })));

        let bad = DhParams::new().theta("q1").d("q1");
        let err = JointModel::build(vec![bad], vec![JointType::Revolute], vec![0]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Parameter(ParameterError::VariableInFixedSlot { field: DhField::D, .. })
        ));
    }

    #[test]
    fn rejects_variable_in_another_rows_fixed_slot() {
        let dh = vec![
            DhParams::new().theta("q1").r(1.0),
            DhParams::new().theta("q2").r("q1"),
        ];
        let err = JointModel::build(dh, vec![JointType::Revolute; 2], vec![0, 1]).unwrap_err();
        assert_eq!(
            err,
            ModelError::Parameter(ParameterError::VariableInFixedSlot {
                joint: 2,
                field: DhField::R,
                name: "q1".into()
            })
        );

        // implicit `q<i>` names count too, and so do fixed joints
        let dh = vec![DhParams::new().theta(0.1), DhParams::new().d("q1")];
        let types = vec![JointType::Revolute, JointType::Fixed];
        let err = JointModel::build(dh, types, vec![0, 1]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Parameter(ParameterError::VariableInFixedSlot { joint: 2, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_variables() {
        let dh = vec![DhParams::new().theta("q"), DhParams::new().theta("q")];
        let err = JointModel::build(dh, vec![JointType::Revolute; 2], vec![0, 1]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Parameter(ParameterError::DuplicateVariable { first: 1, second: 2, .. })
        ));
    }

    #[test]
    fn variables_follow_free_slot() {
        let dh = vec![
            DhParams::new().theta("th1"),
            DhParams::new().theta(0.3).d("r2"),
            DhParams::new().d(0.1),
            DhParams::new(),
        ];
        let types = vec![
            JointType::Revolute,
            JointType::Prismatic,
            JointType::Prismatic,
            JointType::Fixed,
        ];
        let model = JointModel::build(dh, types, vec![0, 1, 2, 3]).unwrap();
        let names: Vec<_> = model.variables().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["th1", "r2", "q3"]);
        assert_eq!(model.variable_name(4), None);
        assert!(!model.is_actuated(4));
    }

    #[test]
    fn mutate_keeps_topology() {
        let mut model = planar(2);
        let before = model.parents().to_vec();
        model.mutate(2, DhField::R, 0.5).unwrap();
        model.mutate(1, DhField::Alpha, DhValue::symbol("a1")).unwrap();
        assert_eq!(model.params(2).unwrap().r, DhValue::Number(0.5));
        assert_eq!(model.params(1).unwrap().alpha, DhValue::symbol("a1"));
        assert_eq!(model.parents(), before.as_slice());
    }

    #[test]
    fn failed_mutation_leaves_model_untouched() {
        let mut model = planar(2);
        let snapshot = model.clone();
        assert!(model.mutate(2, DhField::Theta, "q1").is_err());
        assert!(model.mutate(9, DhField::R, 1.0).is_err());
        assert!(model.mutate(1, DhField::D, f64::INFINITY).is_err());
        assert!(model.mutate(1, DhField::R, "q2").is_err());
        assert_eq!(model, snapshot);
    }

    #[test]
    fn base_frame_is_read_only() {
        let mut model = planar(2);
        let snapshot = model.clone();
        assert_eq!(
            model.mutate(0, DhField::D, 0.5),
            Err(ParameterError::IndexOutOfRange { joint: 0, last: 2 })
        );
        assert!(model.set_actuated(0, true).is_err());
        assert_eq!(model, snapshot);

        let rebuilt = JointModel::from_table(model.to_table()).unwrap();
        assert_eq!(rebuilt, model);
    }

    #[test]
    fn table_round_trip() {
        let mut model = planar(3).with_name("Planar3R");
        model.set_constant("L1", 0.4);
        model.set_actuated(3, false).unwrap();

        let json = serde_json::to_string(&model.to_table()).unwrap();
        let table: RobotTable = serde_json::from_str(&json).unwrap();
        let rebuilt = JointModel::from_table(table).unwrap();

        assert_eq!(rebuilt, model);
        assert_eq!(rebuilt.parents(), model.parents());
    }
}

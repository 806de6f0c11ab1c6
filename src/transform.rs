//! Joint transforms: the canonical DH matrix, numeric forward kinematics and
//! the symbolic chained engine.
//!
//! [`dh_matrix`] is the only place the DH formula is written numerically.
//! The scene graph, [`forward_kinematics`] and the numeric fallback of
//! [`TransformEngine`] all call it; the symbolic [`SymMatrix::dh`] mirrors it
//! term for term and tests assert that both agree.

use std::collections::{BTreeMap, BTreeSet};

use glam::{DMat4, DVec3, DVec4};

use crate::dh::{DhField, DhParams, DhValue, JointType};
use crate::error::UnresolvedSymbols;
use crate::model::JointModel;
use crate::symbolic::{Expr, SymMatrix};

/// The standard DH transform `Rz(theta) * Trans(r, 0, d) * Rx(alpha)`.
///
/// ```
/// use dhview::transform::dh_matrix;
/// use glam::DVec3;
///
/// let t = dh_matrix(std::f64::consts::FRAC_PI_2, 0.0, 1.0, 0.0);
/// let origin = t.transform_point3(DVec3::ZERO);
/// assert!((origin - DVec3::Y).length() < 1e-12);
/// ```
pub fn dh_matrix(theta: f64, d: f64, r: f64, alpha: f64) -> DMat4 {
    let (st, ct) = theta.sin_cos();
    let (sa, ca) = alpha.sin_cos();
    // glam is column-major.
    DMat4::from_cols(
        DVec4::new(ct, st, 0.0, 0.0),
        DVec4::new(-st * ca, ct * ca, sa, 0.0),
        DVec4::new(st * sa, -ct * sa, ca, 0.0),
        DVec4::new(r * ct, r * st, d, 1.0),
    )
}

/// `Rz(gamma) * Tz(b) * dh_matrix(theta, d, r, alpha)`.
pub fn extended_dh_matrix(gamma: f64, b: f64, theta: f64, d: f64, r: f64, alpha: f64) -> DMat4 {
    let dh = dh_matrix(theta, d, r, alpha);
    if gamma == 0.0 && b == 0.0 {
        return dh;
    }
    DMat4::from_rotation_z(gamma) * DMat4::from_translation(DVec3::new(0.0, 0.0, b)) * dh
}

/// DH values of one joint with every constant resolved, excluding the joint
/// variable itself.
///
/// The free slot holds its fixed offset (0 for a symbolic slot); the joint
/// variable is added at evaluation time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResolvedDh {
    pub theta: f64,
    pub d: f64,
    pub r: f64,
    pub alpha: f64,
    pub gamma: f64,
    pub b: f64,
    pub joint_type: Option<JointType>,
}

impl ResolvedDh {
    /// Resolves `params` against `constants`.
    ///
    /// Returns the values and the set of constant symbols that were unbound
    /// and replaced by zero.
    pub fn resolve(
        params: &DhParams,
        joint_type: JointType,
        constants: &BTreeMap<String, f64>,
    ) -> (Self, BTreeSet<String>) {
        let free = joint_type.variable_field();
        let mut missing = BTreeSet::new();
        let mut value = |field: DhField| -> f64 {
            match params.get(field) {
                DhValue::Number(v) => *v,
                DhValue::Symbol(_) if Some(field) == free => 0.0,
                DhValue::Symbol(name) => constants.get(name).copied().unwrap_or_else(|| {
                    missing.insert(name.clone());
                    0.0
                }),
            }
        };
        let resolved = Self {
            theta: value(DhField::Theta),
            d: value(DhField::D),
            r: value(DhField::R),
            alpha: value(DhField::Alpha),
            gamma: value(DhField::Gamma),
            b: value(DhField::B),
            joint_type: Some(joint_type),
        };
        (resolved, missing)
    }

    /// Local transform with joint variable `q` (radians or length units).
    pub fn matrix(&self, q: f64) -> DMat4 {
        let (mut theta, mut d) = (self.theta, self.d);
        match self.joint_type {
            Some(JointType::Revolute) => theta += q,
            Some(JointType::Prismatic) => d += q,
            _ => {}
        }
        extended_dh_matrix(self.gamma, self.b, theta, d, self.r, self.alpha)
    }
}

/// Numeric local transform of frame `i` of `model`.
///
/// Unbound constants evaluate to zero and are logged.
pub fn local_transform(model: &JointModel, i: usize, q: f64) -> DMat4 {
    let (Some(params), Some(joint_type)) = (model.params(i), model.joint_type(i)) else {
        return DMat4::IDENTITY;
    };
    let (resolved, missing) = ResolvedDh::resolve(params, joint_type, model.constants());
    if !missing.is_empty() {
        log::warn!("frame {i}: unbound constants {missing:?} evaluated as 0");
    }
    resolved.matrix(q)
}

/// World transform of every frame for the joint vector `q`.
///
/// `q[k]` drives joint `k + 1` (radians for revolute, length for prismatic);
/// missing entries count as zero. Index 0 of the result is the base frame.
pub fn forward_kinematics(model: &JointModel, q: &[f64]) -> Vec<DMat4> {
    let mut world = vec![DMat4::IDENTITY; model.len()];
    for i in model.depth_first().into_iter().skip(1) {
        let qi = q.get(i - 1).copied().unwrap_or(0.0);
        let parent = model.parent(i).map_or(DMat4::IDENTITY, |p| world[p]);
        world[i] = parent * local_transform(model, i, qi);
    }
    world
}

/// Origin of every frame for the joint vector `q`.
pub fn joint_positions(model: &JointModel, q: &[f64]) -> Vec<DVec3> {
    forward_kinematics(model, q)
        .iter()
        .map(|m| m.w_axis.truncate())
        .collect()
}

/// A `{name -> value}` assignment for joint variables and constants.
///
/// Revolute joint variables are given in degrees.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JointValues(BTreeMap<String, f64>);

impl JointValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for JointValues {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Outcome of evaluating a symbolic transform.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    Resolved(DMat4),
    /// Some symbols had no value; the partially substituted matrix is kept.
    Unresolved {
        matrix: SymMatrix,
        missing: BTreeSet<String>,
    },
}

impl Evaluation {
    fn from_matrix(matrix: SymMatrix) -> Self {
        match matrix.to_numeric() {
            Some(m) => Evaluation::Resolved(m),
            None => Evaluation::Unresolved {
                missing: matrix.free_symbols(),
                matrix,
            },
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Evaluation::Resolved(_))
    }

    /// Converts to a numeric matrix or an [`UnresolvedSymbols`] warning.
    pub fn into_result(self, frame: usize) -> Result<DMat4, UnresolvedSymbols> {
        match self {
            Evaluation::Resolved(m) => Ok(m),
            Evaluation::Unresolved { missing, .. } => Err(UnresolvedSymbols { frame, missing }),
        }
    }
}

/// Symbolic local and chained transforms of a [`JointModel`].
///
/// Only the local transforms are built up front. Chained transforms are
/// composed on request, and numeric evaluation binds each local matrix
/// before multiplying, so evaluating a frame costs one small product per
/// joint on its chain however long the chain is.
///
/// The engine snapshots the model at construction; rebuild it after
/// [`JointModel::mutate`].
#[derive(Clone, Debug)]
pub struct TransformEngine {
    local: Vec<SymMatrix>,
    parents: Vec<Option<usize>>,
    revolute: BTreeSet<String>,
    constants: BTreeMap<String, f64>,
}

impl TransformEngine {
    pub fn new(model: &JointModel) -> Self {
        let local = (0..model.len())
            .map(|i| symbolic_local(model, i))
            .collect();

        let revolute = model
            .variables()
            .into_iter()
            .filter(|v| v.joint_type == JointType::Revolute)
            .map(|v| v.name)
            .collect();

        Self {
            local,
            parents: model.parents().to_vec(),
            revolute,
            constants: model.constants().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Symbolic transform of frame `i` relative to its parent.
    pub fn local(&self, i: usize) -> Option<&SymMatrix> {
        self.local.get(i)
    }

    /// Symbolic transform of frame `i` relative to the base.
    ///
    /// Fully symbolic chains grow quickly with depth; prefer
    /// [`TransformEngine::evaluate`] when numbers are wanted.
    pub fn total(&self, i: usize) -> Option<SymMatrix> {
        let chain = self.chain(i)?;
        Some(compose(&chain[1..], |f| self.local[f].clone()))
    }

    /// Symbolic transform of frame `to` expressed in frame `from`,
    /// `inverse(T0_from) * T0_to`.
    ///
    /// Only the joints below the deepest common ancestor of the two frames
    /// take part, so sibling branches never see each other's variables.
    pub fn relative(&self, from: usize, to: usize) -> Option<SymMatrix> {
        self.relative_with(from, to, |f| self.local[f].clone())
    }

    /// Substitutes `values` (and the model's bound constants) into the base
    /// to frame `i` transform.
    pub fn substitute(&self, i: usize, values: &JointValues) -> Option<SymMatrix> {
        let bindings = self.bindings(values);
        let chain = self.chain(i)?;
        Some(compose(&chain[1..], |f| self.local[f].subst(&bindings)))
    }

    /// Substitutes and evaluates the base to frame `i` transform.
    pub fn evaluate(&self, i: usize, values: &JointValues) -> Option<Evaluation> {
        self.substitute(i, values).map(Evaluation::from_matrix)
    }

    /// Substitutes and evaluates the transform of frame `to` in frame `from`.
    pub fn evaluate_relative(
        &self,
        from: usize,
        to: usize,
        values: &JointValues,
    ) -> Option<Evaluation> {
        let bindings = self.bindings(values);
        self.relative_with(from, to, |f| self.local[f].subst(&bindings))
            .map(Evaluation::from_matrix)
    }

    /// Evaluates every frame, reusing each parent's product.
    pub fn evaluate_all(&self, values: &JointValues) -> Vec<Evaluation> {
        let bindings = self.bindings(values);
        // Parents are declared before their children.
        let mut totals: Vec<SymMatrix> = Vec::with_capacity(self.len());
        for (i, local) in self.local.iter().enumerate() {
            let total = match self.parents[i] {
                Some(p) => totals[p].mul(&local.subst(&bindings)),
                None => SymMatrix::identity(),
            };
            totals.push(total);
        }
        totals.into_iter().map(Evaluation::from_matrix).collect()
    }

    /// Frames from the base to `i`, both inclusive.
    fn chain(&self, i: usize) -> Option<Vec<usize>> {
        if i >= self.len() {
            return None;
        }
        let mut chain = vec![i];
        let mut current = i;
        while let Some(parent) = self.parents[current] {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        Some(chain)
    }

    fn relative_with(
        &self,
        from: usize,
        to: usize,
        mut local: impl FnMut(usize) -> SymMatrix,
    ) -> Option<SymMatrix> {
        let up = self.chain(from)?;
        let down = self.chain(to)?;
        let shared = up.iter().zip(&down).take_while(|(a, b)| a == b).count();
        let from_ancestor = compose(&up[shared..], &mut local);
        let to_ancestor = compose(&down[shared..], &mut local);
        Some(from_ancestor.inverse_rigid().mul(&to_ancestor))
    }

    fn bindings(&self, values: &JointValues) -> BTreeMap<String, f64> {
        let mut bindings = self.constants.clone();
        for (name, value) in values.iter() {
            let value = if self.revolute.contains(name) {
                value.to_radians()
            } else {
                value
            };
            bindings.insert(name.to_string(), value);
        }
        bindings
    }
}

fn compose(frames: &[usize], mut local: impl FnMut(usize) -> SymMatrix) -> SymMatrix {
    let Some((&first, rest)) = frames.split_first() else {
        return SymMatrix::identity();
    };
    rest.iter()
        .fold(local(first), |acc, &frame| acc.mul(&local(frame)))
}

fn symbolic_local(model: &JointModel, i: usize) -> SymMatrix {
    let (Some(params), Some(joint_type)) = (model.params(i), model.joint_type(i)) else {
        return SymMatrix::identity();
    };
    let free = joint_type.variable_field();
    let variable = model.variable_name(i);

    let expr = |field: DhField| -> Expr {
        let base = match params.get(field) {
            DhValue::Number(v) => Expr::Num(*v),
            DhValue::Symbol(name) => Expr::sym(name.as_str()),
        };
        match (free == Some(field), params.get(field), &variable) {
            (true, DhValue::Number(_), Some(name)) => Expr::add(base, Expr::sym(name.as_str())),
            _ => base,
        }
    };

    let dh = SymMatrix::dh(
        expr(DhField::Theta),
        expr(DhField::D),
        expr(DhField::R),
        expr(DhField::Alpha),
    );
    let gamma = expr(DhField::Gamma);
    let b = expr(DhField::B);
    if gamma.is_zero() && b.is_zero() {
        return dh;
    }
    SymMatrix::rotation_z(gamma)
        .mul(&SymMatrix::translation_z(b))
        .mul(&dh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn assert_mat_eq(a: DMat4, b: DMat4) {
        for (x, y) in a.to_cols_array().into_iter().zip(b.to_cols_array()) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
    }

    fn planar2() -> JointModel {
        JointModel::build(
            vec![
                DhParams::new().theta("q1").r(1.0),
                DhParams::new().theta("q2").r(1.0),
            ],
            vec![JointType::Revolute; 2],
            vec![0, 1],
        )
        .unwrap()
    }

    #[test]
    fn zero_parameters_give_identity() {
        assert_eq!(dh_matrix(0.0, 0.0, 0.0, 0.0), DMat4::IDENTITY);
        assert_eq!(extended_dh_matrix(0.0, 0.0, 0.0, 0.0, 0.0, 0.0), DMat4::IDENTITY);
    }

    #[test]
    fn dh_matrix_matches_factored_form() {
        let (theta, d, r, alpha) = (0.3, 0.7, 1.1, -0.4);
        let factored = DMat4::from_rotation_z(theta)
            * DMat4::from_translation(DVec3::new(r, 0.0, d))
            * DMat4::from_rotation_x(alpha);
        assert_mat_eq(dh_matrix(theta, d, r, alpha), factored);
    }

    #[test]
    fn numeric_offset_adds_joint_variable() {
        let model = JointModel::build(
            vec![DhParams::new().theta(FRAC_PI_2).r(1.0)],
            vec![JointType::Revolute],
            vec![0],
        )
        .unwrap();
        let frames = forward_kinematics(&model, &[FRAC_PI_2]);
        let tip = frames[1].w_axis.truncate();
        assert_relative_eq!(tip.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(tip.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn planar_chain_positions() {
        let model = planar2();
        let p = joint_positions(&model, &[FRAC_PI_2, 0.0]);
        assert_relative_eq!(p[1].x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p[1].y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p[2].y, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn symbolic_agrees_with_numeric() {
        let model = JointModel::build(
            vec![
                DhParams::new().theta("q1").d(0.4).alpha(FRAC_PI_2),
                DhParams::new().theta(0.2).d("q2").r("L").alpha(-0.3),
                DhParams::new().theta("q3").r(0.5).gamma(0.1).b(0.05),
            ],
            vec![JointType::Revolute, JointType::Prismatic, JointType::Revolute],
            vec![0, 1, 1],
        )
        .unwrap()
        .with_constants(BTreeMap::from([("L".to_string(), 0.8)]));

        let engine = TransformEngine::new(&model);
        let values = JointValues::new()
            .with("q1", 30.0)
            .with("q2", 0.25)
            .with("q3", -45.0);
        let numeric = forward_kinematics(&model, &[30f64.to_radians(), 0.25, (-45f64).to_radians()]);

        for (i, evaluation) in engine.evaluate_all(&values).into_iter().enumerate() {
            assert_mat_eq(evaluation.into_result(i).unwrap(), numeric[i]);
        }
    }

    #[test]
    fn missing_values_stay_symbolic() {
        let engine = TransformEngine::new(&planar2());
        let evaluation = engine
            .evaluate(2, &JointValues::new().with("q1", 90.0))
            .unwrap();
        let err = evaluation.clone().into_result(2).unwrap_err();
        assert_eq!(err.missing.into_iter().collect::<Vec<_>>(), vec!["q2"]);

        let Evaluation::Unresolved { matrix, .. } = evaluation else {
            panic!("expected an unresolved matrix");
        };
        let resolved = matrix.subst(&BTreeMap::from([("q2".to_string(), 0.0)]));
        let m = resolved.to_numeric().unwrap();
        assert_relative_eq!(m.w_axis.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_names_are_ignored() {
        let engine = TransformEngine::new(&planar2());
        let values = JointValues::new()
            .with("q1", 0.0)
            .with("q2", 0.0)
            .with("nonsense", 3.0);
        let m = engine.evaluate(2, &values).unwrap().into_result(2).unwrap();
        assert_relative_eq!(m.w_axis.x, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn relative_transform_between_frames() {
        // base -> 1 -> 2, base -> 3
        let model = JointModel::build(
            vec![
                DhParams::new().theta("q1").r(1.0),
                DhParams::new().theta("q2").r(0.5).alpha(0.4),
                DhParams::new().theta("q3").d(0.3),
            ],
            vec![JointType::Revolute; 3],
            vec![0, 1, 0],
        )
        .unwrap();
        let engine = TransformEngine::new(&model);
        let values = JointValues::new()
            .with("q1", 40.0)
            .with("q2", -25.0)
            .with("q3", 70.0);
        let q = [40f64.to_radians(), (-25f64).to_radians(), 70f64.to_radians()];
        let world = forward_kinematics(&model, &q);

        for (from, to) in [(1, 2), (2, 1), (3, 2), (2, 2), (0, 3)] {
            let expected = world[from].inverse() * world[to];
            let m = engine
                .evaluate_relative(from, to, &values)
                .unwrap()
                .into_result(to)
                .unwrap();
            assert_mat_eq(m, expected);
        }

        // the sibling branch's variable does not leak into 1 -> 2
        let symbols = engine.relative(1, 2).unwrap().free_symbols();
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["q2"]);
        assert!(engine.relative(1, 9).is_none());
    }

    #[test]
    fn long_chain_evaluates_like_forward_kinematics() {
        let n = 24;
        let dh = (1..=n)
            .map(|i| {
                DhParams::new()
                    .theta(DhValue::symbol(format!("q{i}")))
                    .d(DhValue::symbol(format!("d{i}")))
                    .r(DhValue::symbol(format!("r{i}")))
                    .alpha(DhValue::symbol(format!("a{i}")))
            })
            .collect();
        let mut model =
            JointModel::build(dh, vec![JointType::Revolute; n], (0..n).collect()).unwrap();
        let mut values = JointValues::new();
        let mut q = Vec::new();
        for i in 1..=n {
            let k = i as f64;
            model.set_constant(format!("d{i}"), 0.05 * k);
            model.set_constant(format!("r{i}"), 0.3);
            model.set_constant(format!("a{i}"), 0.2 * k);
            values.set(format!("q{i}"), 7.0 * k);
            q.push((7.0 * k).to_radians());
        }

        let engine = TransformEngine::new(&model);
        let world = forward_kinematics(&model, &q);
        let tip = engine.evaluate(n, &values).unwrap().into_result(n).unwrap();
        assert_mat_eq(tip, world[n]);

        let all = engine.evaluate_all(&values);
        assert_eq!(all.len(), n + 1);
        assert!(all.iter().all(Evaluation::is_resolved));
    }

    #[test]
    fn constant_folding_keeps_known_entries_exact() {
        let engine = TransformEngine::new(&planar2());
        let total = engine.total(1).unwrap();
        assert_eq!(total.get(2, 2), &Expr::ONE);
        assert_eq!(total.get(3, 0), &Expr::ZERO);
    }
}

//! Denavit-Hartenberg parameter records.
//!
//! Every DH field holds a [`DhValue`]: either a concrete number or a named
//! symbol. Symbols in a joint's free slot name its joint variable; symbols in
//! any other slot are geometric constants that are bound later (see
//! [`JointModel::constants`](crate::JointModel::constants)).
//!
//! ```
//! use dhview::{DhParams, DhValue, JointType};
//!
//! let link = DhParams::new()
//!     .theta("q1".parse::<DhValue>().unwrap())
//!     .r(0.5);
//!
//! assert_eq!(JointType::Revolute.variable_field(), Some(dhview::DhField::Theta));
//! assert_eq!(link.theta.as_symbol(), Some("q1"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParameterError;

/// One DH field: a number or an unresolved symbol.
#[derive(Clone, Debug, PartialEq)]
pub enum DhValue {
    Number(f64),
    Symbol(String),
}

impl DhValue {
    pub const ZERO: DhValue = DhValue::Number(0.0);

    /// Creates a symbolic value. The name is checked by [`JointModel::build`](crate::JointModel::build).
    pub fn symbol(name: impl Into<String>) -> Self {
        DhValue::Symbol(name.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            DhValue::Number(v) => Some(*v),
            DhValue::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            DhValue::Symbol(name) => Some(name),
            DhValue::Number(_) => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, DhValue::Symbol(_))
    }

    /// Looks the value up in `bindings` if it is a symbol.
    pub fn resolve(&self, lookup: impl Fn(&str) -> Option<f64>) -> Option<f64> {
        match self {
            DhValue::Number(v) => Some(*v),
            DhValue::Symbol(name) => lookup(name),
        }
    }

    /// Returns `true` for a valid identifier: `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn is_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl Default for DhValue {
    fn default() -> Self {
        DhValue::ZERO
    }
}

impl From<f64> for DhValue {
    fn from(v: f64) -> Self {
        DhValue::Number(v)
    }
}

impl From<&str> for DhValue {
    fn from(name: &str) -> Self {
        DhValue::Symbol(name.to_string())
    }
}

impl fmt::Display for DhValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhValue::Number(v) => write!(f, "{v}"),
            DhValue::Symbol(name) => f.write_str(name),
        }
    }
}

impl FromStr for DhValue {
    type Err = ParameterError;

    /// Parses table text.
    ///
    /// Accepts an empty string (zero), decimal numbers, `pi`, `-pi`, `pi/k`,
    /// `-pi/k`, `k*pi` and identifiers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Ok(DhValue::ZERO);
        }
        if let Ok(v) = text.parse::<f64>() {
            return Ok(DhValue::Number(v));
        }
        if let Some(v) = parse_pi_multiple(text) {
            return Ok(DhValue::Number(v));
        }
        if DhValue::is_identifier(text) {
            return Ok(DhValue::Symbol(text.to_string()));
        }
        Err(ParameterError::Parse(s.to_string()))
    }
}

fn parse_pi_multiple(text: &str) -> Option<f64> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let (sign, body) = match compact.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, compact.as_str()),
    };
    let pi = std::f64::consts::PI;

    if body == "pi" {
        return Some(sign * pi);
    }
    if let Some(den) = body.strip_prefix("pi/") {
        let den: f64 = den.parse().ok()?;
        return (den != 0.0).then(|| sign * pi / den);
    }
    if let Some(num) = body.strip_suffix("*pi") {
        let num: f64 = num.parse().ok()?;
        return Some(sign * num * pi);
    }
    None
}

impl Serialize for DhValue {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            DhValue::Number(v) => s.serialize_f64(*v),
            DhValue::Symbol(name) => s.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for DhValue {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Number(v) => Ok(DhValue::Number(v)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// The kind of articulation a joint provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    /// Rotation about the joint's z axis; theta is the variable.
    #[serde(rename = "R", alias = "revolute", alias = "Revolute")]
    Revolute,
    /// Translation along the joint's z axis; d is the variable.
    #[serde(rename = "P", alias = "prismatic", alias = "Prismatic")]
    Prismatic,
    /// Immobile frame such as the robot base.
    #[serde(rename = "Fixed", alias = "fixed", alias = "F")]
    Fixed,
}

impl JointType {
    /// The DH field that carries this joint's variable.
    pub fn variable_field(self) -> Option<DhField> {
        match self {
            JointType::Revolute => Some(DhField::Theta),
            JointType::Prismatic => Some(DhField::D),
            JointType::Fixed => None,
        }
    }

    pub fn is_mobile(self) -> bool {
        !matches!(self, JointType::Fixed)
    }

    /// Maps the classic `sigma` code: 0 revolute, 1 prismatic, 2 fixed.
    pub fn from_sigma(sigma: u8) -> Option<Self> {
        match sigma {
            0 => Some(JointType::Revolute),
            1 => Some(JointType::Prismatic),
            2 => Some(JointType::Fixed),
            _ => None,
        }
    }

    pub fn sigma(self) -> u8 {
        match self {
            JointType::Revolute => 0,
            JointType::Prismatic => 1,
            JointType::Fixed => 2,
        }
    }
}

impl FromStr for JointType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" | "revolute" | "0" => Ok(JointType::Revolute),
            "p" | "prismatic" | "1" => Ok(JointType::Prismatic),
            "f" | "fixed" | "2" => Ok(JointType::Fixed),
            _ => Err(ParameterError::UnknownJointType(s.to_string())),
        }
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JointType::Revolute => "R",
            JointType::Prismatic => "P",
            JointType::Fixed => "Fixed",
        })
    }
}

/// Names one of the six fields of a [`DhParams`] record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DhField {
    Theta,
    D,
    R,
    Alpha,
    Gamma,
    B,
}

impl DhField {
    pub const ALL: [DhField; 6] = [
        DhField::Theta,
        DhField::D,
        DhField::R,
        DhField::Alpha,
        DhField::Gamma,
        DhField::B,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DhField::Theta => "theta",
            DhField::D => "d",
            DhField::R => "r",
            DhField::Alpha => "alpha",
            DhField::Gamma => "gamma",
            DhField::B => "b",
        }
    }
}

impl fmt::Display for DhField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DhField {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "theta" | "th" => Ok(DhField::Theta),
            "d" => Ok(DhField::D),
            "r" | "a" => Ok(DhField::R),
            "alpha" => Ok(DhField::Alpha),
            "gamma" => Ok(DhField::Gamma),
            "b" => Ok(DhField::B),
            _ => Err(ParameterError::UnknownField(s.to_string())),
        }
    }
}

/// The DH record of one joint.
///
/// `gamma` and `b` are the auxiliary offsets of the extended convention; they
/// default to zero, in which case the record describes a plain DH joint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DhParams {
    #[serde(default)]
    pub theta: DhValue,
    #[serde(default)]
    pub d: DhValue,
    #[serde(default)]
    pub r: DhValue,
    #[serde(default)]
    pub alpha: DhValue,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub gamma: DhValue,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub b: DhValue,
}

fn is_zero(v: &DhValue) -> bool {
    *v == DhValue::ZERO
}

impl DhParams {
    /// All-zero record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Numeric record from the four classic parameters.
    pub fn numeric(theta: f64, d: f64, r: f64, alpha: f64) -> Self {
        Self {
            theta: theta.into(),
            d: d.into(),
            r: r.into(),
            alpha: alpha.into(),
            ..Default::default()
        }
    }

    pub fn theta(mut self, v: impl Into<DhValue>) -> Self {
        self.theta = v.into();
        self
    }

    pub fn d(mut self, v: impl Into<DhValue>) -> Self {
        self.d = v.into();
        self
    }

    pub fn r(mut self, v: impl Into<DhValue>) -> Self {
        self.r = v.into();
        self
    }

    pub fn alpha(mut self, v: impl Into<DhValue>) -> Self {
        self.alpha = v.into();
        self
    }

    pub fn gamma(mut self, v: impl Into<DhValue>) -> Self {
        self.gamma = v.into();
        self
    }

    pub fn b(mut self, v: impl Into<DhValue>) -> Self {
        self.b = v.into();
        self
    }

    pub fn get(&self, field: DhField) -> &DhValue {
        match field {
            DhField::Theta => &self.theta,
            DhField::D => &self.d,
            DhField::R => &self.r,
            DhField::Alpha => &self.alpha,
            DhField::Gamma => &self.gamma,
            DhField::B => &self.b,
        }
    }

    pub fn set(&mut self, field: DhField, value: DhValue) {
        *self.field_mut(field) = value;
    }

    fn field_mut(&mut self, field: DhField) -> &mut DhValue {
        match field {
            DhField::Theta => &mut self.theta,
            DhField::D => &mut self.d,
            DhField::R => &mut self.r,
            DhField::Alpha => &mut self.alpha,
            DhField::Gamma => &mut self.gamma,
            DhField::B => &mut self.b,
        }
    }

    /// Iterates `(field, value)` pairs in canonical order.
    pub fn fields(&self) -> impl Iterator<Item = (DhField, &DhValue)> {
        DhField::ALL.into_iter().map(move |f| (f, self.get(f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn parses_numbers_symbols_and_pi() {
        assert_eq!("".parse::<DhValue>().unwrap(), DhValue::ZERO);
        assert_eq!("-0.5".parse::<DhValue>().unwrap(), DhValue::Number(-0.5));
        assert_eq!("L1".parse::<DhValue>().unwrap(), DhValue::symbol("L1"));
        assert_eq!("theta".parse::<DhValue>().unwrap(), DhValue::symbol("theta"));

        let half = "pi/2".parse::<DhValue>().unwrap().as_number().unwrap();
        assert_relative_eq!(half, PI / 2.0);
        let neg = "-pi / 2".parse::<DhValue>().unwrap().as_number().unwrap();
        assert_relative_eq!(neg, -PI / 2.0);
        let two = "2*pi".parse::<DhValue>().unwrap().as_number().unwrap();
        assert_relative_eq!(two, 2.0 * PI);
    }

    #[test]
    fn rejects_garbage() {
        assert!("1abc".parse::<DhValue>().is_err());
        assert!("q 1".parse::<DhValue>().is_err());
        assert!("pi/0".parse::<DhValue>().is_err());
    }

    #[test]
    fn json_accepts_numbers_and_text() {
        let p: DhParams =
            serde_json::from_str(r#"{"theta": "q1", "d": 0.25, "r": "pi/2", "alpha": 0}"#)
                .unwrap();
        assert_eq!(p.theta, DhValue::symbol("q1"));
        assert_eq!(p.d, DhValue::Number(0.25));
        assert_relative_eq!(p.r.as_number().unwrap(), PI / 2.0);
        assert_eq!(p.gamma, DhValue::ZERO);

        let text = serde_json::to_string(&p).unwrap();
        assert!(!text.contains("gamma"));
        let back: DhParams = serde_json::from_str(&text).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn joint_type_tags() {
        assert_eq!(JointType::Revolute.variable_field(), Some(DhField::Theta));
        assert_eq!(JointType::Prismatic.variable_field(), Some(DhField::D));
        assert_eq!(JointType::Fixed.variable_field(), None);
        assert_eq!("P".parse::<JointType>().unwrap(), JointType::Prismatic);
        assert_eq!(JointType::from_sigma(2), Some(JointType::Fixed));
        assert_eq!(
            serde_json::from_str::<JointType>("\"revolute\"").unwrap(),
            JointType::Revolute
        );
    }

    #[test]
    fn field_access_round_trips() {
        let mut p = DhParams::new();
        for (i, field) in DhField::ALL.into_iter().enumerate() {
            p.set(field, DhValue::Number(i as f64));
        }
        for (i, (field, value)) in p.fields().enumerate() {
            assert_eq!(field, DhField::ALL[i]);
            assert_eq!(value.as_number(), Some(i as f64));
        }
        assert_eq!("a".parse::<DhField>().unwrap(), DhField::R);
    }
}

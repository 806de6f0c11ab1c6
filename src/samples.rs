//! Built-in robots.
//!
//! Geometry only: DH tables, joint types and parent links, with numeric
//! values bound for the geometric constants so every sample renders as-is.

use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::dh::{DhParams, JointType};
use crate::error::ModelResult;
use crate::model::JointModel;

/// A sample name that matches none of [`Sample::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown sample '{0}' (try --list-samples)")]
pub struct UnknownSample(pub String);

/// A robot that ships with the viewer.
///
/// Samples parse from their [`name`](Sample::name), ignoring case and
/// punctuation, so `--sample Planar-2R` works from the command line.
///
/// # Example
/// ```
/// use dhview::Sample;
///
/// let sample: Sample = "rx90".parse().unwrap();
/// let model = sample.build().unwrap();
/// assert_eq!(model.joint_count(), 6);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sample {
    /// Two revolute joints with link lengths `L1 = 1.0`, `L2 = 0.8`.
    Planar2R,
    /// A prismatic cart (`q1`) carrying a revolute pole (`th2`).
    CartPole,
    /// Stäubli RX90 six-axis arm, variables `th1..th6`.
    Rx90,
    /// Eight revolute joints after the SR400 table, simplified to one
    /// frame per link.
    Sr400,
    /// A torso joint with two mirrored 2R arms: the simplest tree.
    TwoArm,
}

impl Sample {
    /// Every sample, in listing order.
    pub const ALL: [Sample; 5] = [
        Sample::Planar2R,
        Sample::CartPole,
        Sample::Rx90,
        Sample::Sr400,
        Sample::TwoArm,
    ];

    /// Lower-case key used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Sample::Planar2R => "planar2r",
            Sample::CartPole => "cartpole",
            Sample::Rx90 => "rx90",
            Sample::Sr400 => "sr400",
            Sample::TwoArm => "twoarm",
        }
    }

    /// One-line summary for `--list-samples`.
    pub fn description(self) -> &'static str {
        match self {
            Sample::Planar2R => "two revolute joints in a plane",
            Sample::CartPole => "prismatic cart carrying a revolute pole",
            Sample::Rx90 => "six-axis industrial arm (RX90)",
            Sample::Sr400 => "eight-joint serial arm (SR400, simplified)",
            Sample::TwoArm => "torso with two 2R arms (tree structure)",
        }
    }

    /// Builds the validated model with its constants bound.
    ///
    /// Samples are fixed tables, so this only fails if one of them was
    /// edited into an invalid state.
    pub fn build(self) -> ModelResult<JointModel> {
        let model = match self {
            Sample::Planar2R => planar2r(),
            Sample::CartPole => cart_pole(),
            Sample::Rx90 => rx90(),
            Sample::Sr400 => sr400(),
            Sample::TwoArm => two_arm(),
        }?;
        log::debug!("built sample '{}'", self.name());
        Ok(model)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sample {
    type Err = UnknownSample;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Sample::ALL
            .into_iter()
            .find(|sample| sample.name() == key)
            .ok_or_else(|| UnknownSample(s.to_string()))
    }
}

fn constants<const N: usize>(values: [(&str, f64); N]) -> BTreeMap<String, f64> {
    values.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn planar2r() -> ModelResult<JointModel> {
    Ok(JointModel::build(
        vec![
            DhParams::new().theta("q1").r("L1"),
            DhParams::new().theta("q2").r("L2"),
        ],
        vec![JointType::Revolute; 2],
        vec![0, 1],
    )?
    .with_name("Planar2R")
    .with_constants(constants([("L1", 1.0), ("L2", 0.8)])))
}

fn cart_pole() -> ModelResult<JointModel> {
    Ok(JointModel::build(
        vec![
            DhParams::new().theta(FRAC_PI_2).r("r1").alpha(FRAC_PI_2),
            DhParams::new().theta("th2").alpha(FRAC_PI_2),
        ],
        vec![JointType::Prismatic, JointType::Revolute],
        vec![0, 1],
    )?
    .with_name("CartPole")
    .with_constants(constants([("r1", 0.0)])))
}

fn rx90() -> ModelResult<JointModel> {
    let alpha = [0.0, FRAC_PI_2, 0.0, -FRAC_PI_2, FRAC_PI_2, -FRAC_PI_2];
    let dh = alpha
        .iter()
        .enumerate()
        .map(|(k, &alpha)| {
            let joint = k + 1;
            let mut row = DhParams::new()
                .theta(format!("th{joint}").as_str())
                .alpha(alpha);
            if joint == 3 {
                row = row.d("D3");
            }
            if joint == 4 {
                row = row.r("RL4");
            }
            row
        })
        .collect();

    Ok(
        JointModel::build(dh, vec![JointType::Revolute; 6], (0..6).collect())?
            .with_name("RX90")
            .with_constants(constants([("D3", 0.45), ("RL4", 0.45)])),
    )
}

fn sr400() -> ModelResult<JointModel> {
    let alpha = [
        0.0, -FRAC_PI_2, 0.0, -FRAC_PI_2, FRAC_PI_2, -FRAC_PI_2, -FRAC_PI_2, 0.0,
    ];
    let dh = alpha
        .iter()
        .enumerate()
        .map(|(k, &alpha)| {
            let joint = k + 1;
            let mut row = DhParams::new()
                .theta(format!("th{joint}").as_str())
                .d(format!("D{k}").as_str())
                .alpha(alpha);
            if joint == 4 {
                row = row.r("RL4");
            }
            row
        })
        .collect();

    Ok(
        JointModel::build(dh, vec![JointType::Revolute; 8], (0..8).collect())?
            .with_name("SR400")
            .with_constants(constants([
                ("D0", 0.3),
                ("D1", 0.0),
                ("D2", 0.35),
                ("D3", 0.0),
                ("D4", 0.0),
                ("D5", 0.0),
                ("D6", 0.0),
                ("D7", 0.1),
                ("RL4", 0.35),
            ])),
    )
}

fn two_arm() -> ModelResult<JointModel> {
    // Arms hang off the torso frame, offset sideways with gamma/b.
    let arm = |side: f64, upper: &str, fore: &str| {
        [
            DhParams::new()
                .gamma(side * FRAC_PI_2)
                .b(0.3)
                .theta(upper)
                .r(0.5)
                .alpha(PI / 2.0),
            DhParams::new().theta(fore).r(0.4),
        ]
    };
    let [left_upper, left_fore] = arm(1.0, "l1", "l2");
    let [right_upper, right_fore] = arm(-1.0, "r1", "r2");

    Ok(JointModel::build(
        vec![
            DhParams::new().theta("torso").d(0.6),
            left_upper,
            left_fore,
            right_upper,
            right_fore,
        ],
        vec![JointType::Revolute; 5],
        vec![0, 1, 2, 1, 4],
    )?
    .with_name("TwoArm"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{JointValues, TransformEngine, joint_positions};
    use approx::assert_relative_eq;

    #[test]
    fn every_sample_builds() {
        for sample in Sample::ALL {
            let model = sample.build().unwrap();
            assert!(model.joint_count() > 0, "{sample}");
        }
    }

    #[test]
    fn names_parse_back() {
        for sample in Sample::ALL {
            assert_eq!(sample.name().parse::<Sample>().unwrap(), sample);
        }
        assert_eq!("Planar-2R".parse::<Sample>().unwrap(), Sample::Planar2R);
        assert!("scara".parse::<Sample>().is_err());
    }

    #[test]
    fn rx90_constants_resolve() {
        let model = Sample::Rx90.build().unwrap();
        assert_eq!(model.joint_count(), 6);
        let engine = TransformEngine::new(&model);
        let values: JointValues = (1..=6).map(|i| (format!("th{i}"), 0.0)).collect();
        let tip = engine.evaluate(6, &values).unwrap().into_result(6).unwrap();
        assert!(tip.w_axis.truncate().length() > 0.5);
    }

    #[test]
    fn cart_pole_slides() {
        let model = Sample::CartPole.build().unwrap();
        let vars: Vec<_> = model.variables().into_iter().map(|v| v.name).collect();
        assert_eq!(vars, vec!["q1", "th2"]);
        let p = joint_positions(&model, &[0.5, 0.0]);
        assert_relative_eq!(p[1].z, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn two_arm_branches() {
        let model = Sample::TwoArm.build().unwrap();
        assert_eq!(model.get_children(1), &[2, 4]);
        assert_eq!(model.leaves(), vec![3, 5]);
        let p = joint_positions(&model, &[0.0; 5]);
        // arms mirror each other across the torso
        assert_relative_eq!(p[2].y, -p[4].y, epsilon = 1e-12);
        assert!(p[2].y.abs() > 0.1);
    }
}

//! Minimal symbolic algebra for chained DH transforms.
//!
//! [`Expr`] is a small expression tree with constant folding in its smart
//! constructors, which keeps chained matrices readable: multiplying by an
//! identity or by `cos(0)` collapses instead of growing the tree. Trig of a
//! constant snaps to exact `0`, `1` or `-1` when within `1e-12`, so
//! `cos(pi/2)` folds to zero.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use glam::{DMat4, DVec4};

/// Values closer than this to 0 or ±1 after a trig fold are snapped.
pub const SNAP_EPSILON: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(f64),
    Sym(String),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
}

impl Expr {
    pub const ZERO: Expr = Expr::Num(0.0);
    pub const ONE: Expr = Expr::Num(1.0);

    pub fn num(v: f64) -> Self {
        Expr::Num(v)
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Expr::Sym(name.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_number() == Some(0.0)
    }

    fn is_one(&self) -> bool {
        self.as_number() == Some(1.0)
    }

    pub fn add(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::Num(x), Expr::Num(y)) => Expr::Num(x + y),
            (a, b) if a.is_zero() => b,
            (a, b) if b.is_zero() => a,
            (a, b) => Expr::Add(Box::new(a), Box::new(b)),
        }
    }

    pub fn mul(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::Num(x), Expr::Num(y)) => Expr::Num(x * y),
            (a, b) if a.is_zero() || b.is_zero() => Expr::ZERO,
            (a, b) if a.is_one() => b,
            (a, b) if b.is_one() => a,
            (Expr::Num(x), b) if x == -1.0 => Expr::neg(b),
            (a, Expr::Num(y)) if y == -1.0 => Expr::neg(a),
            (a, b) => Expr::Mul(Box::new(a), Box::new(b)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(a: Expr) -> Expr {
        match a {
            Expr::Num(x) => Expr::Num(-x),
            Expr::Neg(inner) => *inner,
            a => Expr::Neg(Box::new(a)),
        }
    }

    pub fn sin(a: Expr) -> Expr {
        match a {
            Expr::Num(x) => Expr::Num(snap(x.sin())),
            a => Expr::Sin(Box::new(a)),
        }
    }

    pub fn cos(a: Expr) -> Expr {
        match a {
            Expr::Num(x) => Expr::Num(snap(x.cos())),
            a => Expr::Cos(Box::new(a)),
        }
    }

    /// Replaces bound symbols and refolds the tree.
    pub fn subst(&self, values: &BTreeMap<String, f64>) -> Expr {
        match self {
            Expr::Num(v) => Expr::Num(*v),
            Expr::Sym(name) => match values.get(name) {
                Some(v) => Expr::Num(*v),
                None => self.clone(),
            },
            Expr::Add(a, b) => Expr::add(a.subst(values), b.subst(values)),
            Expr::Mul(a, b) => Expr::mul(a.subst(values), b.subst(values)),
            Expr::Neg(a) => Expr::neg(a.subst(values)),
            Expr::Sin(a) => Expr::sin(a.subst(values)),
            Expr::Cos(a) => Expr::cos(a.subst(values)),
        }
    }

    /// Collects every symbol still present.
    pub fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Sym(name) => {
                out.insert(name.clone());
            }
            Expr::Add(a, b) | Expr::Mul(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            Expr::Neg(a) | Expr::Sin(a) | Expr::Cos(a) => a.collect_symbols(out),
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }
}

fn snap(v: f64) -> f64 {
    if v.abs() < SNAP_EPSILON {
        0.0
    } else if (v - 1.0).abs() < SNAP_EPSILON {
        1.0
    } else if (v + 1.0).abs() < SNAP_EPSILON {
        -1.0
    } else {
        v
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Num(v)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(v) => write!(f, "{v}"),
            Expr::Sym(name) => f.write_str(name),
            Expr::Add(a, b) => match b.as_ref() {
                Expr::Neg(inner) => write!(f, "({a} - {inner})"),
                _ => write!(f, "({a} + {b})"),
            },
            Expr::Mul(a, b) => write!(f, "{a}*{b}"),
            Expr::Neg(a) => write!(f, "-{a}"),
            Expr::Sin(a) => write!(f, "sin({a})"),
            Expr::Cos(a) => write!(f, "cos({a})"),
        }
    }
}

/// A 4x4 homogeneous transform over [`Expr`], stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct SymMatrix {
    rows: [[Expr; 4]; 4],
}

impl SymMatrix {
    pub fn identity() -> Self {
        Self::from_fn(|i, j| if i == j { Expr::ONE } else { Expr::ZERO })
    }

    pub fn from_fn(mut f: impl FnMut(usize, usize) -> Expr) -> Self {
        Self {
            rows: std::array::from_fn(|i| std::array::from_fn(|j| f(i, j))),
        }
    }

    pub fn from_rows(rows: [[Expr; 4]; 4]) -> Self {
        Self { rows }
    }

    pub fn get(&self, row: usize, col: usize) -> &Expr {
        &self.rows[row][col]
    }

    /// The standard DH matrix `Rz(theta) * Trans(r, 0, d) * Rx(alpha)`.
    pub fn dh(theta: Expr, d: Expr, r: Expr, alpha: Expr) -> Self {
        let (ct, st) = (Expr::cos(theta.clone()), Expr::sin(theta));
        let (ca, sa) = (Expr::cos(alpha.clone()), Expr::sin(alpha));
        Self::from_rows([
            [
                ct.clone(),
                Expr::neg(Expr::mul(st.clone(), ca.clone())),
                Expr::mul(st.clone(), sa.clone()),
                Expr::mul(r.clone(), ct.clone()),
            ],
            [
                st.clone(),
                Expr::mul(ct.clone(), ca.clone()),
                Expr::neg(Expr::mul(ct, sa.clone())),
                Expr::mul(r, st),
            ],
            [Expr::ZERO, sa, ca, d],
            [Expr::ZERO, Expr::ZERO, Expr::ZERO, Expr::ONE],
        ])
    }

    pub fn rotation_z(angle: Expr) -> Self {
        let (c, s) = (Expr::cos(angle.clone()), Expr::sin(angle));
        let mut m = Self::identity();
        m.rows[0][0] = c.clone();
        m.rows[0][1] = Expr::neg(s.clone());
        m.rows[1][0] = s;
        m.rows[1][1] = c;
        m
    }

    pub fn translation_z(offset: Expr) -> Self {
        let mut m = Self::identity();
        m.rows[2][3] = offset;
        m
    }

    pub fn mul(&self, rhs: &SymMatrix) -> SymMatrix {
        Self::from_fn(|i, j| {
            (0..4).fold(Expr::ZERO, |acc, k| {
                let (a, b) = (&self.rows[i][k], &rhs.rows[k][j]);
                if a.is_zero() || b.is_zero() {
                    return acc;
                }
                Expr::add(acc, Expr::mul(a.clone(), b.clone()))
            })
        })
    }

    /// Inverse of a rigid transform `[R p; 0 1]`, built as `[Rᵀ -Rᵀp; 0 1]`.
    ///
    /// Only valid when the upper-left block is a rotation, which holds for
    /// every DH transform.
    pub fn inverse_rigid(&self) -> SymMatrix {
        let r = |i: usize, j: usize| &self.rows[i][j];
        let mut inv = Self::identity();
        for i in 0..3 {
            for j in 0..3 {
                inv.rows[i][j] = r(j, i).clone();
            }
            let dot = (0..3).fold(Expr::ZERO, |acc, k| {
                Expr::add(acc, Expr::mul(r(k, i).clone(), r(k, 3).clone()))
            });
            inv.rows[i][3] = Expr::neg(dot);
        }
        inv
    }

    pub fn subst(&self, values: &BTreeMap<String, f64>) -> SymMatrix {
        Self::from_fn(|i, j| self.rows[i][j].subst(values))
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for row in &self.rows {
            for e in row {
                e.collect_symbols(&mut out);
            }
        }
        out
    }

    /// Converts to a numeric matrix when no symbol is left.
    pub fn to_numeric(&self) -> Option<DMat4> {
        let mut cols = [DVec4::ZERO; 4];
        for (j, col) in cols.iter_mut().enumerate() {
            for i in 0..4 {
                col[i] = self.rows[i][j].as_number()?;
            }
        }
        Some(DMat4::from_cols(cols[0], cols[1], cols[2], cols[3]))
    }
}

impl From<DMat4> for SymMatrix {
    fn from(m: DMat4) -> Self {
        Self::from_fn(|i, j| Expr::Num(m.col(j)[i]))
    }
}

impl fmt::Display for SymMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|e| e.to_string()).collect();
            writeln!(f, "[{}]", cells.join(", "))?;
        }
        Ok(())
    }
}

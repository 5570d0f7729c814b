// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Ident;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UnaryOp {
    Positive,
    Negative,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
}

// we use Boxes here because we walk and rewrite expression trees a number
// of times, and we want to avoid copying subexpressions all over the place.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Expr {
    /// A raw literal: original source text plus parsed value.
    Const(String, f64),
    /// A reference to a variable's identity symbol or a number symbol.
    Var(Ident),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
    App(Ident, Vec<Expr>),
    /// d(numerator)/d(denominator).
    Deriv(Box<Expr>, Box<Expr>),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Const("0.0".to_string(), 0.0)
    }
}

impl Expr {
    /// Collects every symbol referenced anywhere in this expression.
    pub fn symbols(&self, out: &mut BTreeSet<Ident>) {
        match self {
            Expr::Const(_, _) => {}
            Expr::Var(ident) => {
                out.insert(ident.clone());
            }
            Expr::Op1(_, r) => r.symbols(out),
            Expr::Op2(_, l, r) => {
                l.symbols(out);
                r.symbols(out);
            }
            Expr::App(_, args) => {
                for arg in args.iter() {
                    arg.symbols(out);
                }
            }
            Expr::Deriv(n, d) => {
                n.symbols(out);
                d.symbols(out);
            }
        }
    }

    /// Rewrites symbol references according to `subs`; symbols not present
    /// in the map are left untouched.
    pub fn substitute(self, subs: &HashMap<Ident, Ident>) -> Expr {
        match self {
            Expr::Const(s, n) => Expr::Const(s, n),
            Expr::Var(ident) => match subs.get(&ident) {
                Some(canonical) => Expr::Var(canonical.clone()),
                None => Expr::Var(ident),
            },
            Expr::Op1(op, r) => Expr::Op1(op, Box::new(r.substitute(subs))),
            Expr::Op2(op, l, r) => Expr::Op2(
                op,
                Box::new(l.substitute(subs)),
                Box::new(r.substitute(subs)),
            ),
            Expr::App(func, args) => Expr::App(
                func,
                args.into_iter().map(|arg| arg.substitute(subs)).collect(),
            ),
            Expr::Deriv(n, d) => {
                Expr::Deriv(Box::new(n.substitute(subs)), Box::new(d.substitute(subs)))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Const(s, _) => write!(f, "{s}"),
            Expr::Var(ident) => write!(f, "{ident}"),
            Expr::Op1(op, r) => {
                let op = match op {
                    UnaryOp::Positive => "+",
                    UnaryOp::Negative => "-",
                };
                write!(f, "{op}{r}")
            }
            Expr::Op2(op, l, r) => {
                let op = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Exp => "^",
                };
                write!(f, "({l} {op} {r})")
            }
            Expr::App(func, args) => {
                write!(f, "{func}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Deriv(n, d) => write!(f, "d({n})/d({d})"),
        }
    }
}

/// The pipeline position of an equation.  Connection resolution advances
/// `RawParsed` equations to `ConnectionsResolved`; unit annotation advances
/// them to `UnitsAnnotated`; a successful check marks them `Checked`.
/// Reconciliation rewrites the right-hand side and moves the equation back
/// to `UnitsAnnotated` so it can be re-checked.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EquationStage {
    RawParsed,
    ConnectionsResolved,
    UnitsAnnotated,
    Checked,
}

/// A symbolic equality `lhs = rhs`; mutated in place, never duplicated.
#[derive(Clone, PartialEq, Debug)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
    pub stage: EquationStage,
}

impl Equation {
    pub fn new(lhs: Expr, rhs: Expr) -> Equation {
        Equation {
            lhs,
            rhs,
            stage: EquationStage::RawParsed,
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

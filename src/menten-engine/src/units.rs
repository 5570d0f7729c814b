// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::fmt;

use float_cmp::approx_eq;
use lazy_static::lazy_static;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::common::{Ident, Result};
use crate::datamodel::{NumberDef, Prefix, UnitDef, UnitFragment, UnitMap};
use crate::units_err;

/// The units CellML 1.0 guarantees are available without a `<units>`
/// definition: the SI base and derived units plus a handful of conveniences.
/// Each entry is (name, base-dimension exponents, power-of-ten scale).
const CELLML_UNITS: &[(&str, &[(&str, i32)], i32)] = &[
    // Base SI units
    ("ampere", &[("ampere", 1)], 0),
    ("candela", &[("candela", 1)], 0),
    ("kelvin", &[("kelvin", 1)], 0),
    ("kilogram", &[("kilogram", 1)], 0),
    ("meter", &[("meter", 1)], 0),
    ("mole", &[("mole", 1)], 0),
    ("second", &[("second", 1)], 0),
    // Derived SI units
    ("becquerel", &[("second", -1)], 0),
    // dimensionally kelvin; affine offsets are out of scope
    ("celsius", &[("kelvin", 1)], 0),
    ("coulomb", &[("ampere", 1), ("second", 1)], 0),
    (
        "farad",
        &[("ampere", 2), ("kilogram", -1), ("meter", -2), ("second", 4)],
        0,
    ),
    ("gray", &[("meter", 2), ("second", -2)], 0),
    (
        "henry",
        &[("ampere", -2), ("kilogram", 1), ("meter", 2), ("second", -2)],
        0,
    ),
    ("hertz", &[("second", -1)], 0),
    ("joule", &[("kilogram", 1), ("meter", 2), ("second", -2)], 0),
    ("katal", &[("mole", 1), ("second", -1)], 0),
    ("lumen", &[("candela", 1)], 0),
    ("lux", &[("candela", 1), ("meter", -2)], 0),
    ("newton", &[("kilogram", 1), ("meter", 1), ("second", -2)], 0),
    (
        "ohm",
        &[("ampere", -2), ("kilogram", 1), ("meter", 2), ("second", -3)],
        0,
    ),
    ("pascal", &[("kilogram", 1), ("meter", -1), ("second", -2)], 0),
    ("radian", &[], 0),
    (
        "siemens",
        &[("ampere", 2), ("kilogram", -1), ("meter", -2), ("second", 3)],
        0,
    ),
    ("sievert", &[("meter", 2), ("second", -2)], 0),
    ("steradian", &[], 0),
    (
        "tesla",
        &[("ampere", -1), ("kilogram", 1), ("second", -2)],
        0,
    ),
    (
        "volt",
        &[("ampere", -1), ("kilogram", 1), ("meter", 2), ("second", -3)],
        0,
    ),
    ("watt", &[("kilogram", 1), ("meter", 2), ("second", -3)], 0),
    (
        "weber",
        &[("ampere", -1), ("kilogram", 1), ("meter", 2), ("second", -2)],
        0,
    ),
    // Convenience units
    ("dimensionless", &[], 0),
    ("gram", &[("kilogram", 1)], -3),
    ("liter", &[("meter", 3)], -3),
];

const ALIASES: &[(&str, &str)] = &[("metre", "meter"), ("litre", "liter")];

const PREFIXES: &[(&str, i32)] = &[
    ("yotta", 24),
    ("zetta", 21),
    ("exa", 18),
    ("peta", 15),
    ("tera", 12),
    ("giga", 9),
    ("mega", 6),
    ("kilo", 3),
    ("hecto", 2),
    ("deka", 1),
    ("deca", 1),
    ("deci", -1),
    ("centi", -2),
    ("milli", -3),
    ("micro", -6),
    ("nano", -9),
    ("pico", -12),
    ("femto", -15),
    ("atto", -18),
    ("zepto", -21),
    ("yocto", -24),
];

lazy_static! {
    static ref BUILTINS: HashMap<&'static str, Unit> = CELLML_UNITS
        .iter()
        .map(|(name, dims, pow10)| {
            let dims: UnitMap = dims
                .iter()
                .map(|(dim, exp)| (dim.to_string(), *exp))
                .collect();
            (
                *name,
                Unit {
                    names: UnitMap::single(name),
                    dims,
                    pow10: *pow10,
                    multiplier: 1.0,
                },
            )
        })
        .collect();
    static ref ALIAS_MAP: HashMap<&'static str, &'static str> =
        ALIASES.iter().cloned().collect();
    static ref PREFIX_MAP: HashMap<&'static str, i32> = PREFIXES.iter().cloned().collect();
}

fn pow10(n: i32) -> f64 {
    10f64.powi(n)
}

/// An immutable named dimensional quantity.  `names` is the display form
/// (prefixed unit names with exponents), `dims` the base-dimension
/// exponents, and `multiplier * 10^pow10` the scale relative to the
/// coherent combination of `dims`.  The power of ten is an exact integer so
/// prefix-derived scales never go through floating arithmetic.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub names: UnitMap,
    pub dims: UnitMap,
    pub pow10: i32,
    pub multiplier: f64,
}

impl Unit {
    pub fn dimensionless() -> Unit {
        Unit {
            names: UnitMap::new(),
            dims: UnitMap::new(),
            pow10: 0,
            multiplier: 1.0,
        }
    }

    /// A new base dimension, introduced by a `base_units="yes"` definition.
    fn base(name: &str) -> Unit {
        Unit {
            names: UnitMap::single(name),
            dims: UnitMap::single(name),
            pow10: 0,
            multiplier: 1.0,
        }
    }

    /// Re-labels this unit so it displays under a single name.
    fn named(mut self, name: &str) -> Unit {
        self.names = UnitMap::single(name);
        self
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn scale(&self) -> f64 {
        self.multiplier * pow10(self.pow10)
    }

    pub fn same_dimensionality(&self, other: &Unit) -> bool {
        self.dims == other.dims
    }

    /// The factor between this unit's scale and `other`'s; the power-of-ten
    /// part is computed in integer space.
    fn scale_ratio(&self, other: &Unit) -> f64 {
        (self.multiplier / other.multiplier) * pow10(self.pow10 - other.pow10)
    }

    /// Exact-scale equality: same dimensionality and a scale ratio of 1
    /// within floating tolerance.  `second` and `millisecond` are NOT equal.
    pub fn equals(&self, other: &Unit) -> bool {
        self.same_dimensionality(other) && approx_eq!(f64, self.scale_ratio(other), 1.0)
    }

    pub fn mul(self, rhs: Unit) -> Unit {
        Unit {
            names: self.names * rhs.names,
            dims: self.dims * rhs.dims,
            pow10: self.pow10 + rhs.pow10,
            multiplier: self.multiplier * rhs.multiplier,
        }
    }

    pub fn div(self, rhs: Unit) -> Unit {
        Unit {
            names: self.names / rhs.names,
            dims: self.dims / rhs.dims,
            pow10: self.pow10 - rhs.pow10,
            multiplier: self.multiplier / rhs.multiplier,
        }
    }

    pub fn powi(self, exp: i32) -> Unit {
        Unit {
            names: self.names.exp(exp),
            dims: self.dims.exp(exp),
            pow10: self.pow10 * exp,
            multiplier: self.multiplier.powi(exp),
        }
    }

    pub fn sqrt(self) -> Result<Unit> {
        if self.dims.map.values().any(|exp| exp % 2 != 0) || self.pow10 % 2 != 0 {
            return units_err!(
                IncompatibleDimensions,
                format!("cannot take the square root of {} ({})", self, self.dims)
            );
        }
        let dims: UnitMap = self
            .dims
            .map
            .iter()
            .map(|(dim, exp)| (dim.clone(), exp / 2))
            .collect();
        Ok(Unit {
            names: dims.clone(),
            dims,
            pow10: self.pow10 / 2,
            multiplier: self.multiplier.sqrt(),
        })
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.names)
    }
}

/// Distinguishes an explicit unit from the unitless-ness that comes from
/// computing on bare constants, which adopts whatever unit surrounds it.
#[derive(Clone, Debug, PartialEq)]
pub enum Units {
    Explicit(Unit),
    Constant,
}

impl Units {
    pub fn into_unit(self) -> Unit {
        match self {
            Units::Explicit(unit) => unit,
            Units::Constant => Unit::dimensionless(),
        }
    }
}

/// The registry of known units for one model: CellML built-ins plus the
/// model's own `<units>` definitions, materialized lazily and memoized.
/// Each model owns its own store; nothing here is global.
#[derive(Debug, Default)]
pub struct UnitStore {
    definitions: HashMap<String, UnitDef>,
    resolved: HashMap<String, Unit>,
}

impl UnitStore {
    pub fn new(defs: &[UnitDef]) -> Result<UnitStore> {
        let mut definitions: HashMap<String, UnitDef> = HashMap::new();
        for def in defs.iter() {
            if BUILTINS.contains_key(def.name.as_str())
                || ALIAS_MAP.contains_key(def.name.as_str())
                || definitions.contains_key(&def.name)
            {
                return units_err!(
                    DuplicateUnit,
                    format!("unit \"{}\" is already defined", def.name)
                );
            }
            definitions.insert(def.name.clone(), def.clone());
        }
        Ok(UnitStore {
            definitions,
            resolved: HashMap::new(),
        })
    }

    /// Resolves a unit name to a concrete unit: a built-in, a memoized
    /// custom, a custom built recursively from its declared fragments
    /// (declaration order does not matter), or a named SI prefix glued onto
    /// any of those (`millivolt`).
    pub fn resolve(&mut self, name: &str) -> Result<Unit> {
        let mut in_progress = Vec::new();
        self.resolve_inner(name, &mut in_progress)
    }

    fn resolve_inner(&mut self, name: &str, in_progress: &mut Vec<String>) -> Result<Unit> {
        let name = ALIAS_MAP.get(name).copied().unwrap_or(name);

        if let Some(unit) = self.resolved.get(name) {
            return Ok(unit.clone());
        }

        if let Some(unit) = BUILTINS.get(name) {
            self.resolved.insert(name.to_owned(), unit.clone());
            return Ok(unit.clone());
        }

        if let Some(def) = self.definitions.get(name).cloned() {
            if in_progress.iter().any(|n| n == name) {
                return units_err!(
                    RecursiveUnitDefinition,
                    format!("unit \"{name}\" is defined in terms of itself")
                );
            }
            in_progress.push(name.to_owned());
            let unit = self.build_custom(&def, in_progress);
            in_progress.pop();
            let unit = unit?;
            self.resolved.insert(name.to_owned(), unit.clone());
            return Ok(unit);
        }

        if let Some(unit) = self.resolve_prefixed(name, in_progress) {
            self.resolved.insert(name.to_owned(), unit.clone());
            return Ok(unit);
        }

        units_err!(
            UnknownUnit,
            format!("Cannot find the unit with name \"{name}\"")
        )
    }

    fn resolve_prefixed(&mut self, name: &str, in_progress: &mut Vec<String>) -> Option<Unit> {
        for (prefix, pow10) in PREFIXES.iter() {
            let Some(rest) = name.strip_prefix(prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            if let Ok(mut unit) = self.resolve_inner(rest, in_progress) {
                unit.pow10 += pow10;
                return Some(unit.named(name));
            }
        }
        None
    }

    fn build_custom(&mut self, def: &UnitDef, in_progress: &mut Vec<String>) -> Result<Unit> {
        if def.base_units {
            return Ok(Unit::base(&def.name));
        }

        let mut acc = Unit::dimensionless();
        for frag in def.units.iter() {
            let mut unit = self.resolve_inner(&frag.units, in_progress)?;
            if let Some(prefix) = &frag.prefix {
                unit.pow10 += prefix_pow10(prefix)?;
            }
            // the prefix scales before exponentiation: ((prefix unit) ** exp)
            unit = unit.powi(fragment_exponent(frag)?);
            if let Some(multiplier) = frag.multiplier {
                unit.multiplier *= multiplier;
            }
            acc = acc.mul(unit);
        }
        Ok(acc.named(&def.name))
    }

    pub fn units_equal(&self, a: &Unit, b: &Unit) -> bool {
        a.equals(b)
    }

    /// The multiplicative factor converting a magnitude in `from` to an
    /// equivalent magnitude in `to`; the dimensionalities must match.
    pub fn conversion_factor(&self, from: &Unit, to: &Unit) -> Result<f64> {
        if !from.same_dimensionality(to) {
            return units_err!(
                IncompatibleDimensions,
                format!(
                    "cannot convert {} ({}) to {} ({})",
                    from, from.dims, to, to.dims
                )
            );
        }
        Ok(from.scale_ratio(to))
    }

    /// Computes the unit of an expression by a post-order structural walk:
    /// products and quotients compose units, powers exponentiate (the
    /// exponent must evaluate to a constant integer), sums require matching
    /// dimensionality and pass the left unit through, and differentiation
    /// divides the numerator's unit by the denominator's.
    pub fn unit_of(
        &self,
        expr: &Expr,
        symbols: &HashMap<Ident, Unit>,
        numbers: &HashMap<Ident, NumberDef>,
    ) -> Result<Units> {
        match expr {
            Expr::Const(_, _) => Ok(Units::Constant),
            Expr::Var(ident) => match symbols.get(ident) {
                Some(unit) => Ok(Units::Explicit(unit.clone())),
                None => units_err!(UnknownSymbol, format!("{ident} not found in symbol dict")),
            },
            Expr::Op1(_, r) => self.unit_of(r, symbols, numbers),
            Expr::Op2(op, l, r) => match op {
                BinaryOp::Add | BinaryOp::Sub => {
                    let lunits = self.unit_of(l, symbols, numbers)?;
                    let runits = self.unit_of(r, symbols, numbers)?;
                    match (lunits, runits) {
                        (Units::Constant, Units::Constant) => Ok(Units::Constant),
                        (Units::Constant, Units::Explicit(unit))
                        | (Units::Explicit(unit), Units::Constant) => Ok(Units::Explicit(unit)),
                        (Units::Explicit(lu), Units::Explicit(ru)) => {
                            if !lu.same_dimensionality(&ru) {
                                return units_err!(
                                    IncompatibleDimensions,
                                    format!(
                                        "cannot add {} ({}) and {} ({})",
                                        lu, lu.dims, ru, ru.dims
                                    )
                                );
                            }
                            Ok(Units::Explicit(lu))
                        }
                    }
                }
                BinaryOp::Mul => {
                    let lunits = self.unit_of(l, symbols, numbers)?;
                    let runits = self.unit_of(r, symbols, numbers)?;
                    match (lunits, runits) {
                        (Units::Constant, Units::Constant) => Ok(Units::Constant),
                        (Units::Constant, Units::Explicit(unit))
                        | (Units::Explicit(unit), Units::Constant) => Ok(Units::Explicit(unit)),
                        (Units::Explicit(lu), Units::Explicit(ru)) => {
                            Ok(Units::Explicit(lu.mul(ru)))
                        }
                    }
                }
                BinaryOp::Div => {
                    let lunits = self.unit_of(l, symbols, numbers)?;
                    let runits = self.unit_of(r, symbols, numbers)?;
                    match (lunits, runits) {
                        (Units::Constant, Units::Constant) => Ok(Units::Constant),
                        (Units::Explicit(unit), Units::Constant) => Ok(Units::Explicit(unit)),
                        (Units::Constant, Units::Explicit(unit)) => {
                            Ok(Units::Explicit(Unit::dimensionless().div(unit)))
                        }
                        (Units::Explicit(lu), Units::Explicit(ru)) => {
                            Ok(Units::Explicit(lu.div(ru)))
                        }
                    }
                }
                BinaryOp::Exp => match self.unit_of(l, symbols, numbers)? {
                    Units::Constant => Ok(Units::Constant),
                    Units::Explicit(lu) => {
                        let exp = const_int_eval(r, numbers)?;
                        Ok(Units::Explicit(lu.powi(exp)))
                    }
                },
            },
            Expr::App(func, args) => match func.as_str() {
                "exp" | "ln" | "log" | "log10" | "sin" | "cos" | "tan" | "sec" | "csc" | "cot"
                | "sinh" | "cosh" | "tanh" | "arcsin" | "arccos" | "arctan" | "arcsinh"
                | "arccosh" | "arctanh" => Ok(Units::Explicit(Unit::dimensionless())),
                "sqrt" | "root" => match args.first() {
                    Some(arg) => match self.unit_of(arg, symbols, numbers)? {
                        Units::Constant => Ok(Units::Constant),
                        Units::Explicit(unit) => Ok(Units::Explicit(unit.sqrt()?)),
                    },
                    None => Ok(Units::Constant),
                },
                // magnitude-preserving and anything else: the unit of the
                // first argument (piecewise branches lead with a value)
                _ => match args.first() {
                    Some(arg) => self.unit_of(arg, symbols, numbers),
                    None => Ok(Units::Constant),
                },
            },
            Expr::Deriv(n, d) => {
                let n = self.unit_of(n, symbols, numbers)?.into_unit();
                let d = self.unit_of(d, symbols, numbers)?.into_unit();
                Ok(Units::Explicit(n.div(d)))
            }
        }
    }
}

fn prefix_pow10(prefix: &Prefix) -> Result<i32> {
    match prefix {
        Prefix::Power(n) => Ok(*n),
        Prefix::Named(name) => match PREFIX_MAP.get(name.as_str()) {
            Some(pow10) => Ok(*pow10),
            None => units_err!(UnknownUnit, format!("unknown metric prefix \"{name}\"")),
        },
    }
}

fn fragment_exponent(frag: &UnitFragment) -> Result<i32> {
    match frag.exponent {
        None => Ok(1),
        Some(exp) => {
            if approx_eq!(f64, exp, exp.round()) {
                Ok(exp.round() as i32)
            } else {
                units_err!(
                    BadUnitExponent,
                    format!("unit \"{}\": expected an integer exponent, got {exp}", frag.units)
                )
            }
        }
    }
}

fn const_int_eval(expr: &Expr, numbers: &HashMap<Ident, NumberDef>) -> Result<i32> {
    fn int_of(n: f64) -> Result<i32> {
        if approx_eq!(f64, n, n.round()) {
            Ok(n.round() as i32)
        } else {
            units_err!(BadUnitExponent, format!("expected an integer, got {n}"))
        }
    }

    match expr {
        Expr::Const(_, n) => int_of(*n),
        Expr::Var(ident) => match numbers.get(ident) {
            Some(num) => int_of(num.value),
            None => units_err!(
                BadUnitExponent,
                format!("expected a constant integer exponent, found symbol {ident}")
            ),
        },
        Expr::Op1(op, r) => {
            let r = const_int_eval(r, numbers)?;
            Ok(match op {
                UnaryOp::Positive => r,
                UnaryOp::Negative => -r,
            })
        }
        Expr::Op2(op, l, r) => {
            let l = const_int_eval(l, numbers)?;
            let r = const_int_eval(r, numbers)?;
            let result = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => {
                    if r == 0 {
                        0
                    } else {
                        l / r
                    }
                }
                BinaryOp::Exp => l.pow(r as u32),
            };
            Ok(result)
        }
        Expr::App(_, _) | Expr::Deriv(_, _) => units_err!(
            BadUnitExponent,
            "expected a constant integer exponent".to_string()
        ),
    }
}

// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Structural records handed to the core by the XML/MathML layer.
//!
//! The records mirror the CellML document structure one-to-one: components
//! with variable declarations, flat `<connection>` pairings, nested
//! encapsulation groups, and `<units>` definitions.  Equations arrive
//! already translated from MathML into [`Expr`] trees over
//! `component$variable` symbols, with dummified numeric literals described
//! by [`NumberDef`] records.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::iter::Iterator;

use serde::{Deserialize, Serialize};

use crate::ast::Expr;
use crate::common::{Ident, Result};

/// A map from base-dimension name to exponent; the dimensionality of a unit.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct UnitMap {
    pub map: BTreeMap<String, i32>,
}

impl UnitMap {
    pub fn new() -> UnitMap {
        Default::default()
    }

    pub fn single(name: &str) -> UnitMap {
        [(name.to_owned(), 1)].into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn reciprocal(mut self) -> Self {
        for (_id, exp) in self.map.iter_mut() {
            *exp *= -1;
        }
        self
    }

    pub fn exp(mut self, exp: i32) -> Self {
        if exp == 0 {
            return UnitMap::new();
        }
        for (_id, unit) in self.map.iter_mut() {
            *unit *= exp;
        }
        self
    }
}

impl std::ops::Div for UnitMap {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn div(self, rhs: Self) -> Self::Output {
        self * rhs.reciprocal()
    }
}

impl std::ops::Mul for UnitMap {
    type Output = Self;

    fn mul(mut self, rhs: Self) -> Self::Output {
        for (unit, n) in rhs.map.into_iter() {
            let new_value = match self.map.get(&unit) {
                None => n,
                Some(m) => n + *m,
            };

            if new_value == 0 {
                self.map.remove(&unit);
            } else {
                self.map.insert(unit, new_value);
            }
        }

        self
    }
}

// pint's rendering: positive exponents first (alphabetical, ` * `-joined),
// then ` / ` per negative exponent, `` ** n `` for |exponent| > 1.
impl Display for UnitMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut written = false;
        let mut first = true;
        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp > 0) {
            if !first {
                write!(f, " * ")?;
            }
            first = false;
            write!(f, "{unit}")?;
            if exp.abs() > 1 {
                write!(f, " ** {}", exp.abs())?;
            }
            written = true;
        }

        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp < 0) {
            if !written {
                write!(f, "1")?;
                written = true;
            }
            write!(f, " / {unit}")?;
            if exp.abs() > 1 {
                write!(f, " ** {}", exp.abs())?;
            }
        }

        if !written {
            write!(f, "dimensionless")?;
        }

        Ok(())
    }
}

impl FromIterator<(String, i32)> for UnitMap {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        UnitMap {
            map: iter.into_iter().filter(|(_, exp)| *exp != 0).collect(),
        }
    }
}

/// A metric prefix on a `<unit>` reference; CellML allows either a named SI
/// prefix or a bare power of ten.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prefix {
    Power(i32),
    Named(String),
}

/// One `<unit>` element inside a `<units>` definition.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct UnitFragment {
    pub units: String,
    #[serde(default)]
    pub prefix: Option<Prefix>,
    #[serde(default)]
    pub exponent: Option<f64>,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

/// A `<units>` definition: either a new base unit (`base_units="yes"`) or a
/// product of scaled/exponentiated references to other units.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct UnitDef {
    pub name: String,
    #[serde(default)]
    pub base_units: bool,
    #[serde(default)]
    pub units: Vec<UnitFragment>,
}

/// Per-scope interface direction declared on a variable.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    #[default]
    None,
}

/// A `<variable>` declaration inside a component.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub units: String,
    #[serde(default)]
    pub public_interface: Direction,
    #[serde(default)]
    pub private_interface: Direction,
    #[serde(default)]
    pub initial_value: Option<f64>,
    #[serde(default)]
    pub cmeta_id: Option<String>,
}

/// A single MathML equality, already translated to symbolic form.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct EquationDef {
    pub lhs: Expr,
    pub rhs: Expr,
}

/// Metadata for a dummified `<cn>` literal introduced by the MathML layer.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct NumberDef {
    pub ident: Ident,
    pub value: f64,
    #[serde(default)]
    pub units: Option<String>,
}

/// A `<component>`: variables plus the equations collected from all of its
/// `<math>` children (the producing layer concatenates multiple `<math>`
/// elements into one ordered sequence).
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ComponentDef {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub equations: Vec<EquationDef>,
    #[serde(default)]
    pub numbers: Vec<NumberDef>,
}

/// One `<map_variables>` pairing under a `<connection>`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ConnectionDef {
    pub component_1: String,
    pub variable_1: String,
    pub component_2: String,
    pub variable_2: String,
}

/// A node in a group's nested `<component_ref>` tree.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ComponentRef {
    pub component: String,
    #[serde(default)]
    pub children: Vec<ComponentRef>,
}

/// A `<group>` with its relationship kind; only `encapsulation` groups are
/// meaningful to the core, every other kind is ignored.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct GroupDef {
    pub relationship: String,
    #[serde(default)]
    pub refs: Vec<ComponentRef>,
}

/// The complete structural extraction of one CellML `<model>`.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ModelDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub units: Vec<UnitDef>,
    pub components: Vec<ComponentDef>,
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
    #[serde(default)]
    pub groups: Vec<GroupDef>,
}

impl ModelDef {
    pub fn from_json(contents: &str) -> Result<ModelDef> {
        match serde_json::from_str(contents) {
            Ok(def) => Ok(def),
            Err(err) => crate::model_err!(JsonDeserialization, err.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        match serde_json::to_string_pretty(self) {
            Ok(s) => Ok(s),
            Err(err) => crate::model_err!(JsonDeserialization, err.to_string()),
        }
    }
}

#[test]
fn test_unit_map_algebra() {
    let m2_per_s: UnitMap = [("meter".to_owned(), 2), ("second".to_owned(), -1)]
        .into_iter()
        .collect();
    let s: UnitMap = UnitMap::single("second");

    assert_eq!(
        m2_per_s.clone() * s.clone(),
        [("meter".to_owned(), 2)].into_iter().collect()
    );
    assert_eq!(
        s.clone() / s.clone(),
        UnitMap::new(),
        "self-division cancels"
    );
    assert_eq!(
        m2_per_s.clone().exp(2),
        [("meter".to_owned(), 4), ("second".to_owned(), -2)]
            .into_iter()
            .collect()
    );
    assert_eq!(m2_per_s.clone().exp(0), UnitMap::new());
    assert_eq!(
        m2_per_s.reciprocal(),
        [("meter".to_owned(), -2), ("second".to_owned(), 1)]
            .into_iter()
            .collect()
    );
}

#[test]
fn test_unit_map_display() {
    let cases: &[(&[(&str, i32)], &str)] = &[
        (&[], "dimensionless"),
        (&[("second", 1)], "second"),
        (&[("second", -1)], "1 / second"),
        (&[("meter", 2), ("second", -1)], "meter ** 2 / second"),
        (
            &[
                ("kilogram", 1),
                ("meter", 2),
                ("ampere", -1),
                ("second", -3),
            ],
            "kilogram * meter ** 2 / ampere / second ** 3",
        ),
        (&[("meter", -2), ("second", -1)], "1 / meter ** 2 / second"),
    ];

    for (map, expected) in cases {
        let map: UnitMap = map
            .iter()
            .map(|(name, exp)| (name.to_string(), *exp))
            .collect();
        assert_eq!(*expected, format!("{map}"));
    }
}

#[test]
fn test_model_def_json_roundtrip() {
    use crate::common::ErrorCode;

    let def = ModelDef {
        name: Some("ion_gate".to_owned()),
        units: vec![UnitDef {
            name: "ms".to_owned(),
            base_units: false,
            units: vec![UnitFragment {
                units: "second".to_owned(),
                prefix: Some(Prefix::Named("milli".to_owned())),
                exponent: None,
                multiplier: None,
            }],
        }],
        components: vec![ComponentDef {
            name: "environment".to_owned(),
            variables: vec![VariableDef {
                name: "time".to_owned(),
                units: "ms".to_owned(),
                public_interface: Direction::Out,
                private_interface: Direction::None,
                initial_value: None,
                cmeta_id: Some("time".to_owned()),
            }],
            equations: vec![],
            numbers: vec![],
        }],
        connections: vec![],
        groups: vec![],
    };

    let json = def.to_json().unwrap();
    let roundtripped = ModelDef::from_json(&json).unwrap();
    assert_eq!(def, roundtripped);

    assert_eq!(
        ErrorCode::JsonDeserialization,
        ModelDef::from_json("{not json").unwrap_err().code
    );
}

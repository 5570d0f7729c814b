// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Unit annotation, consistency checking, and opt-in repair of equations.
//!
//! Connection resolution must have run first: checking an unresolved
//! equation would compare per-alias units instead of the canonical
//! symbols'.  Annotation resolves every declared unit name once; checking
//! is pure; reconciliation rewrites an equation in place and is never
//! invoked automatically.

use std::result::Result as StdResult;

use crate::ast::{BinaryOp, Equation, EquationStage, Expr};
use crate::common::{Error, ErrorCode, Ident, Result};
use crate::datamodel::NumberDef;
use crate::model::Model;
use crate::units::{Unit, Units};
use crate::units_err;

/// Resolves the declared unit of every variable and number symbol into the
/// model's symbol-unit table and advances equations to `UnitsAnnotated`.
/// Calling this twice is harmless: resolution is memoized and the equations
/// are left untouched.
pub fn annotate_units(model: &mut Model) -> Result<()> {
    for component in model.components.values() {
        for eq in component.equations.iter() {
            if eq.stage == EquationStage::RawParsed {
                return units_err!(
                    UnresolvedConnections,
                    format!(
                        "connections must be resolved before units are annotated (component \"{}\")",
                        component.name
                    )
                );
            }
        }
    }

    let Model {
        components,
        numbers,
        units,
        symbol_units,
        ..
    } = model;

    for component in components.values() {
        for var in component.variables.values() {
            let unit = units.resolve(&var.units)?;
            symbol_units.insert(var.ident.clone(), unit);
        }
    }

    for (ident, number) in numbers.iter() {
        let unit = match &number.units {
            Some(name) => units.resolve(name)?,
            None => Unit::dimensionless(),
        };
        // reconciliation factors already carry a ratio unit; keep it
        symbol_units.entry(ident.clone()).or_insert(unit);
    }

    for component in components.values_mut() {
        for eq in component.equations.iter_mut() {
            if eq.stage == EquationStage::ConnectionsResolved {
                eq.stage = EquationStage::UnitsAnnotated;
            }
        }
    }

    Ok(())
}

/// Computes the units of both sides and asserts they are exactly equal --
/// same dimensionality and same scale, so `volt` and `millivolt` do not
/// pass.  Does not mutate the equation; checking is idempotent.
pub fn check_equation(model: &Model, eq: &Equation) -> Result<()> {
    match eq.stage {
        EquationStage::UnitsAnnotated | EquationStage::Checked => {}
        EquationStage::RawParsed | EquationStage::ConnectionsResolved => {
            return units_err!(
                UnannotatedEquation,
                format!("equation \"{eq}\" has not been annotated with units")
            );
        }
    }

    let lhs = model
        .units
        .unit_of(&eq.lhs, &model.symbol_units, &model.numbers)?;
    let rhs = model
        .units
        .unit_of(&eq.rhs, &model.symbol_units, &model.numbers)?;

    let (lhs, rhs) = match (lhs, rhs) {
        (Units::Explicit(lhs), Units::Explicit(rhs)) => (lhs, rhs),
        // a side made of bare constants adopts the other side's units
        _ => return Ok(()),
    };

    if !lhs.equals(&rhs) {
        return units_err!(
            UnitMismatch,
            format!(
                "Units {} ({:?}, {}) != {} ({:?}, {})",
                lhs,
                lhs.scale(),
                lhs.dims,
                rhs,
                rhs.scale(),
                rhs.dims
            )
        );
    }

    Ok(())
}

/// Checks every equation in the model.  The outer result reports a
/// sequencing failure (equations not yet annotated); the inner result
/// collects the unit problems, keyed by component name.  Equations that
/// pass are marked `Checked`.
pub fn check(model: &mut Model) -> Result<StdResult<(), Vec<(String, Error)>>> {
    let mut errors: Vec<(String, Error)> = vec![];
    let mut passing: Vec<(String, usize)> = vec![];

    let mut names: Vec<String> = model.components.keys().cloned().collect();
    names.sort_unstable();
    for name in names {
        for (i, eq) in model.components[&name].equations.iter().enumerate() {
            match check_equation(model, eq) {
                Ok(()) => passing.push((name.clone(), i)),
                Err(err) if err.code == ErrorCode::UnannotatedEquation => return Err(err),
                Err(err) => errors.push((name.clone(), err)),
            }
        }
    }

    for (name, i) in passing {
        model.components.get_mut(&name).unwrap().equations[i].stage = EquationStage::Checked;
    }

    if errors.is_empty() {
        Ok(Ok(()))
    } else {
        Ok(Err(errors))
    }
}

/// Repairs a dimensionally compatible unit mismatch by introducing a fresh
/// literal-valued symbol whose value is the scale of `lhs_units/rhs_units`
/// and whose unit is that ratio, replacing the stored equation with
/// `lhs = rhs * factor` in place.  The equation drops back to
/// `UnitsAnnotated` so it can be re-checked.  When the two sides'
/// dimensionalities are fundamentally incompatible no factor exists and
/// this fails instead of silently patching.
pub fn reconcile_equation(model: &mut Model, component: &str, index: usize) -> Result<Ident> {
    let Some(comp) = model.components.get(component) else {
        return units_err!(DoesNotExist, format!("no component named \"{component}\""));
    };
    let Some(eq) = comp.equations.get(index) else {
        return units_err!(
            DoesNotExist,
            format!("component \"{component}\" has no equation #{index}")
        );
    };
    match eq.stage {
        EquationStage::UnitsAnnotated | EquationStage::Checked => {}
        EquationStage::RawParsed | EquationStage::ConnectionsResolved => {
            return units_err!(
                UnannotatedEquation,
                format!("equation \"{eq}\" has not been annotated with units")
            );
        }
    }

    let lhs_units = model
        .units
        .unit_of(&eq.lhs, &model.symbol_units, &model.numbers)?
        .into_unit();
    let rhs_units = model
        .units
        .unit_of(&eq.rhs, &model.symbol_units, &model.numbers)?
        .into_unit();

    let factor = model.units.conversion_factor(&lhs_units, &rhs_units)?;
    let ratio = lhs_units.div(rhs_units);

    let ident = format!("_conv_{component}_{index}");
    model.numbers.insert(
        ident.clone(),
        NumberDef {
            ident: ident.clone(),
            value: factor,
            units: None,
        },
    );
    model.symbol_units.insert(ident.clone(), ratio);

    let eq = &mut model.components.get_mut(component).unwrap().equations[index];
    let rhs = std::mem::take(&mut eq.rhs);
    eq.rhs = Expr::Op2(BinaryOp::Mul, Box::new(rhs), Box::new(Expr::Var(ident.clone())));
    eq.stage = EquationStage::UnitsAnnotated;

    Ok(ident)
}

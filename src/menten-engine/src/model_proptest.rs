// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests using proptest.
//!
//! These verify:
//! 1. Connection resolution is independent of the order of the connection
//!    list (connected groups are resolved independently)
//! 2. Conversion factors round-trip: f(b, a) == 1/f(a, b)
//! 3. Reconciling a dimensionally compatible equation always yields an
//!    equation that passes checking

use proptest::prelude::*;

use crate::ast::Expr;
use crate::connections::resolve_connections;
use crate::datamodel::ModelDef;
use crate::model::Model;
use crate::test_common::TestModel;
use crate::units::UnitStore;
use crate::units_check::{annotate_units, check_equation, reconcile_equation};

fn var(ident: &str) -> Expr {
    Expr::Var(ident.to_string())
}

/// A model with two independent connection groups: `time` propagating from
/// the environment through an encapsulating relay, and `v` shared between
/// two siblings.
fn reference_def() -> ModelDef {
    TestModel::new("reference")
        .component("environment")
        .variable("time", "second", Some("out"), None)
        .component("heart")
        .variable("time", "second", Some("in"), Some("out"))
        .component("atrium")
        .variable("time", "second", Some("in"), None)
        .variable("v", "volt", Some("out"), None)
        .component("ventricle")
        .variable("time", "second", Some("in"), None)
        .variable("v", "volt", Some("in"), None)
        .equation(var("ventricle$v"), var("ventricle$time"))
        .encapsulate("heart", &["atrium", "ventricle"])
        .connect("environment", "time", "heart", "time")
        .connect("heart", "time", "atrium", "time")
        .connect("heart", "time", "ventricle", "time")
        .connect("atrium", "v", "ventricle", "v")
        .into_def()
}

fn resolved_reference() -> Model {
    let mut model = Model::new(&reference_def()).unwrap();
    resolve_connections(&mut model).unwrap();
    model
}

fn prefix_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(""),
        Just("kilo"),
        Just("centi"),
        Just("milli"),
        Just("micro"),
        Just("nano"),
    ]
}

fn base_unit_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("second"), Just("volt"), Just("meter"), Just("mole")]
}

proptest! {
    #[test]
    fn test_resolution_is_order_independent(
        connections in Just(reference_def().connections).prop_shuffle()
    ) {
        let mut def = reference_def();
        def.connections = connections;

        let mut model = Model::new(&def).unwrap();
        resolve_connections(&mut model).unwrap();

        let expected = [
            ("environment", "time", "environment$time"),
            ("heart", "time", "environment$time"),
            ("atrium", "time", "environment$time"),
            ("ventricle", "time", "environment$time"),
            ("atrium", "v", "atrium$v"),
            ("ventricle", "v", "atrium$v"),
        ];
        for (component, variable, canonical) in expected {
            prop_assert_eq!(
                Some(canonical),
                model.variable(component, variable).unwrap().assignment.as_deref()
            );
        }

        // the rewritten equation set is identical to the baseline's
        let baseline = resolved_reference();
        for (name, component) in baseline.components.iter() {
            prop_assert_eq!(&component.equations, &model.components[name].equations);
        }
    }

    #[test]
    fn test_conversion_factor_round_trip(
        p1 in prefix_strategy(),
        p2 in prefix_strategy(),
        base in base_unit_strategy()
    ) {
        let mut store = UnitStore::new(&[]).unwrap();
        let a = store.resolve(&format!("{p1}{base}")).unwrap();
        let b = store.resolve(&format!("{p2}{base}")).unwrap();

        let ab = store.conversion_factor(&a, &b).unwrap();
        let ba = store.conversion_factor(&b, &a).unwrap();
        prop_assert!((ab * ba - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_then_check_never_raises(
        p1 in prefix_strategy(),
        p2 in prefix_strategy()
    ) {
        let mut model = TestModel::new("prop")
            .component("c")
            .variable("x", &format!("{p1}volt"), None, None)
            .variable("y", &format!("{p2}volt"), None, None)
            .equation(var("c$x"), var("c$y"))
            .build()
            .unwrap();

        resolve_connections(&mut model).unwrap();
        annotate_units(&mut model).unwrap();

        reconcile_equation(&mut model, "c", 0).unwrap();

        let eq = model.components["c"].equations[0].clone();
        prop_assert!(check_equation(&model, &eq).is_ok());
    }
}

// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Common test infrastructure for building models from structural records.

use crate::ast::Expr;
use crate::common::Result;
use crate::datamodel::{
    ComponentDef, ComponentRef, ConnectionDef, Direction, EquationDef, GroupDef, ModelDef,
    NumberDef, Prefix, UnitDef, UnitFragment, VariableDef,
};
use crate::model::Model;

/// Builder for the structural records the XML layer would normally produce.
/// Variables, equations, and numbers attach to the most recently added
/// component.
pub struct TestModel {
    def: ModelDef,
}

impl TestModel {
    pub fn new(name: &str) -> Self {
        TestModel {
            def: ModelDef {
                name: Some(name.to_string()),
                units: Vec::new(),
                components: Vec::new(),
                connections: Vec::new(),
                groups: Vec::new(),
            },
        }
    }

    /// Adds a custom unit built from `(units, prefix, exponent)` fragments.
    pub fn unit(mut self, name: &str, frags: &[(&str, Option<&str>, Option<f64>)]) -> Self {
        self.def.units.push(UnitDef {
            name: name.to_string(),
            base_units: false,
            units: frags
                .iter()
                .map(|(units, prefix, exponent)| UnitFragment {
                    units: units.to_string(),
                    prefix: prefix.map(|p| Prefix::Named(p.to_string())),
                    exponent: *exponent,
                    multiplier: None,
                })
                .collect(),
        });
        self
    }

    /// Adds a single-fragment custom unit, e.g. `ms` = milli `second`.
    pub fn unit_fragment(self, name: &str, units: &str, prefix: Option<&str>) -> Self {
        self.unit(name, &[(units, prefix, None)])
    }

    #[allow(dead_code)]
    pub fn base_unit(mut self, name: &str) -> Self {
        self.def.units.push(UnitDef {
            name: name.to_string(),
            base_units: true,
            units: Vec::new(),
        });
        self
    }

    pub fn component(mut self, name: &str) -> Self {
        self.def.components.push(ComponentDef {
            name: name.to_string(),
            variables: Vec::new(),
            equations: Vec::new(),
            numbers: Vec::new(),
        });
        self
    }

    pub fn variable(
        mut self,
        name: &str,
        units: &str,
        public: Option<&str>,
        private: Option<&str>,
    ) -> Self {
        let component = self
            .def
            .components
            .last_mut()
            .expect("add a component before variables");
        component.variables.push(VariableDef {
            name: name.to_string(),
            units: units.to_string(),
            public_interface: direction(public),
            private_interface: direction(private),
            initial_value: None,
            cmeta_id: None,
        });
        self
    }

    pub fn equation(mut self, lhs: Expr, rhs: Expr) -> Self {
        let component = self
            .def
            .components
            .last_mut()
            .expect("add a component before equations");
        component.equations.push(EquationDef { lhs, rhs });
        self
    }

    #[allow(dead_code)]
    pub fn number(mut self, ident: &str, value: f64, units: Option<&str>) -> Self {
        let component = self
            .def
            .components
            .last_mut()
            .expect("add a component before numbers");
        component.numbers.push(NumberDef {
            ident: ident.to_string(),
            value,
            units: units.map(|u| u.to_string()),
        });
        self
    }

    pub fn connect(
        mut self,
        component_1: &str,
        variable_1: &str,
        component_2: &str,
        variable_2: &str,
    ) -> Self {
        self.def.connections.push(ConnectionDef {
            component_1: component_1.to_string(),
            variable_1: variable_1.to_string(),
            component_2: component_2.to_string(),
            variable_2: variable_2.to_string(),
        });
        self
    }

    pub fn encapsulate(mut self, parent: &str, children: &[&str]) -> Self {
        self.def.groups.push(GroupDef {
            relationship: "encapsulation".to_string(),
            refs: vec![ComponentRef {
                component: parent.to_string(),
                children: children
                    .iter()
                    .map(|child| ComponentRef {
                        component: child.to_string(),
                        children: Vec::new(),
                    })
                    .collect(),
            }],
        });
        self
    }

    #[allow(dead_code)]
    pub fn into_def(self) -> ModelDef {
        self.def
    }

    pub fn build(self) -> Result<Model> {
        Model::new(&self.def)
    }
}

fn direction(d: Option<&str>) -> Direction {
    match d {
        Some("in") => Direction::In,
        Some("out") => Direction::Out,
        _ => Direction::None,
    }
}

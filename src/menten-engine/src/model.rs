// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeSet, HashMap};

use crate::ast::Equation;
use crate::common::{Ident, Result};
use crate::datamodel::{
    ComponentDef, ComponentRef, ConnectionDef, Direction, ModelDef, NumberDef,
};
use crate::units::{Unit, UnitStore};
use crate::{model_err, var_err};

/// Separates the component namespace from the variable name in an identity
/// symbol, e.g. `environment$time`.
pub const SYMBOL_DELIMITER: char = '$';

/// A variable declaration, with its whole-model identity symbol and (after
/// connection resolution) the canonical symbol it has been bound to.  A
/// variable that is never an `in` keeps its own symbol as its assignment.
#[derive(Clone, PartialEq, Debug)]
pub struct Variable {
    pub name: String,
    pub ident: Ident,
    pub units: String,
    pub public_interface: Direction,
    pub private_interface: Direction,
    pub cmeta_id: Option<String>,
    pub initial_value: Option<f64>,
    pub assignment: Option<Ident>,
}

/// One CellML component: its place in the encapsulation hierarchy, its
/// variables, and the ordered equations collected from its math.
#[derive(Clone, PartialEq, Debug)]
pub struct Component {
    pub name: String,
    pub parent: Option<String>,
    pub encapsulated: BTreeSet<String>,
    pub siblings: BTreeSet<String>,
    pub variables: HashMap<String, Variable>,
    pub equations: Vec<Equation>,
}

/// The in-memory model: sole owner of its components, unit registry, raw
/// connection list, and number-symbol metadata.  Nothing in here is shared
/// between models, so independent models can be processed on independent
/// threads.
#[derive(Debug)]
pub struct Model {
    pub name: Option<String>,
    pub components: HashMap<String, Component>,
    pub connections: Vec<ConnectionDef>,
    pub numbers: HashMap<Ident, NumberDef>,
    pub units: UnitStore,
    /// Populated by unit annotation: resolved unit per identity symbol.
    pub symbol_units: HashMap<Ident, Unit>,
}

impl Model {
    pub fn new(def: &ModelDef) -> Result<Model> {
        let units = UnitStore::new(&def.units)?;

        let mut numbers: HashMap<Ident, NumberDef> = HashMap::new();
        let mut components: HashMap<String, Component> = HashMap::new();
        for component_def in def.components.iter() {
            if components.contains_key(&component_def.name) {
                return model_err!(
                    DuplicateComponent,
                    format!("duplicate component \"{}\"", component_def.name)
                );
            }
            let component = build_component(component_def, &mut numbers)?;
            components.insert(component.name.clone(), component);
        }

        let mut model = Model {
            name: def.name.clone(),
            components,
            connections: def.connections.clone(),
            numbers,
            units,
            symbol_units: HashMap::new(),
        };

        // only encapsulation groups shape the hierarchy; every other
        // relationship kind (e.g. containment) is ignored entirely
        for group in def.groups.iter() {
            if group.relationship == "encapsulation" {
                model.add_encapsulation(&group.refs, None)?;
            }
        }

        model.check_symbols()?;

        Ok(model)
    }

    fn add_encapsulation(
        &mut self,
        refs: &[ComponentRef],
        parent: Option<&str>,
    ) -> Result<()> {
        for component_ref in refs.iter() {
            let child = component_ref.component.as_str();
            if !self.components.contains_key(child) {
                return model_err!(
                    DoesNotExist,
                    format!("encapsulation references unknown component \"{child}\"")
                );
            }
            if let Some(parent) = parent {
                self.components
                    .get_mut(parent)
                    .unwrap()
                    .encapsulated
                    .insert(child.to_owned());
                self.components.get_mut(child).unwrap().parent = Some(parent.to_owned());
            }
            self.add_encapsulation(&component_ref.children, Some(child))?;
        }

        // children of the same named parent are mutual siblings
        if parent.is_some() && refs.len() > 1 {
            for a in refs.iter() {
                for b in refs.iter() {
                    if a.component != b.component {
                        self.components
                            .get_mut(&a.component)
                            .unwrap()
                            .siblings
                            .insert(b.component.clone());
                    }
                }
            }
        }

        Ok(())
    }

    /// Every symbol referenced from an equation must be a declared variable
    /// of the same component or a dummified number.
    fn check_symbols(&self) -> Result<()> {
        for component in self.components.values() {
            let declared: BTreeSet<&Ident> = component
                .variables
                .values()
                .map(|var| &var.ident)
                .collect();
            let mut referenced = BTreeSet::new();
            for eq in component.equations.iter() {
                eq.lhs.symbols(&mut referenced);
                eq.rhs.symbols(&mut referenced);
            }
            for ident in referenced.iter() {
                if !declared.contains(ident) && !self.numbers.contains_key(ident) {
                    return var_err!(UnknownSymbol, format!("{ident} not found in symbol dict"));
                }
            }
        }
        Ok(())
    }

    pub fn variable(&self, component: &str, name: &str) -> Option<&Variable> {
        self.components
            .get(component)
            .and_then(|c| c.variables.get(name))
    }

    pub fn variable_mut(&mut self, component: &str, name: &str) -> Option<&mut Variable> {
        self.components
            .get_mut(component)
            .and_then(|c| c.variables.get_mut(name))
    }

    /// CellML's interface-visibility rule: a component can connect to
    /// itself, its parent, its encapsulated children, and its siblings.
    /// Components sharing a parent (including all hierarchy roots, whose
    /// parent is nobody) are siblings.
    pub fn is_visible(&self, from: &str, to: &str) -> bool {
        let (Some(a), Some(b)) = (self.components.get(from), self.components.get(to)) else {
            return false;
        };
        from == to
            || a.parent.as_deref() == Some(to)
            || a.encapsulated.contains(to)
            || a.siblings.contains(to)
            || a.parent == b.parent
    }
}

fn build_component(
    def: &ComponentDef,
    numbers: &mut HashMap<Ident, NumberDef>,
) -> Result<Component> {
    let mut variables: HashMap<String, Variable> = HashMap::new();
    for var_def in def.variables.iter() {
        if variables.contains_key(&var_def.name) {
            return var_err!(
                DuplicateVariable,
                format!(
                    "duplicate variable \"{}\" in component \"{}\"",
                    var_def.name, def.name
                )
            );
        }
        let ident = format!("{}{}{}", def.name, SYMBOL_DELIMITER, var_def.name);
        variables.insert(
            var_def.name.clone(),
            Variable {
                name: var_def.name.clone(),
                ident,
                units: var_def.units.clone(),
                public_interface: var_def.public_interface,
                private_interface: var_def.private_interface,
                cmeta_id: var_def.cmeta_id.clone(),
                initial_value: var_def.initial_value,
                assignment: None,
            },
        );
    }

    for number in def.numbers.iter() {
        numbers.insert(number.ident.clone(), number.clone());
    }

    let equations = def
        .equations
        .iter()
        .map(|eq| Equation::new(eq.lhs.clone(), eq.rhs.clone()))
        .collect();

    Ok(Component {
        name: def.name.clone(),
        parent: None,
        encapsulated: BTreeSet::new(),
        siblings: BTreeSet::new(),
        variables,
        equations,
    })
}

// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Connection resolution: collapses the declared variable-mapping graph so
//! that every connected set of variables shares a single canonical identity
//! symbol, then rewrites every equation in terms of those canonical symbols.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::EquationStage;
use crate::common::{Ident, Result};
use crate::conn_err;
use crate::datamodel::Direction;
use crate::model::{Model, SYMBOL_DELIMITER};

/// Resolves every declared connection in the model, populating each
/// variable's `assignment` and rewriting all equations to reference only
/// canonical symbols.  Groups of connected variables are independent of one
/// another, so the outcome does not depend on the order of the connection
/// list.
pub fn resolve_connections(model: &mut Model) -> Result<()> {
    // validate the edges and build the undirected variable graph
    let mut edges: BTreeMap<Ident, BTreeSet<Ident>> = BTreeMap::new();
    for conn in model.connections.iter() {
        let endpoints = [
            (&conn.component_1, &conn.variable_1),
            (&conn.component_2, &conn.variable_2),
        ];
        let mut idents = Vec::with_capacity(2);
        for (component, variable) in endpoints {
            match model.variable(component, variable) {
                Some(var) => idents.push(var.ident.clone()),
                None => {
                    return conn_err!(
                        DoesNotExist,
                        format!(
                            "connection references unknown variable {component}{SYMBOL_DELIMITER}{variable}"
                        )
                    );
                }
            }
        }
        if !model.is_visible(&conn.component_1, &conn.component_2) {
            return conn_err!(
                InvalidConnection,
                format!(
                    "components \"{}\" and \"{}\" are not visible to each other in the encapsulation hierarchy",
                    conn.component_1, conn.component_2
                )
            );
        }
        let (a, b) = (idents.swap_remove(1), idents.swap_remove(0));
        edges.entry(a.clone()).or_default().insert(b.clone());
        edges.entry(b).or_default().insert(a);
    }

    // contract each connected set of variables onto its elected source
    let mut assignments: HashMap<Ident, Ident> = HashMap::new();
    let mut seen: BTreeSet<Ident> = BTreeSet::new();
    for start in edges.keys() {
        if seen.contains(start) {
            continue;
        }
        let mut group: BTreeSet<Ident> = BTreeSet::new();
        let mut pending = vec![start.clone()];
        while let Some(ident) = pending.pop() {
            if !group.insert(ident.clone()) {
                continue;
            }
            for next in edges[&ident].iter() {
                if !group.contains(next) {
                    pending.push(next.clone());
                }
            }
        }
        seen.extend(group.iter().cloned());

        let source = elect_source(model, &group, &edges)?;
        for ident in group {
            assignments.insert(ident, source.clone());
        }
    }

    // aliases to substitute into the equations; the source maps to itself
    // and needs no rewrite
    let subs: HashMap<Ident, Ident> = assignments
        .iter()
        .filter(|(ident, canonical)| ident != canonical)
        .map(|(ident, canonical)| (ident.clone(), canonical.clone()))
        .collect();

    for component in model.components.values_mut() {
        for var in component.variables.values_mut() {
            var.assignment = Some(
                assignments
                    .get(&var.ident)
                    .cloned()
                    .unwrap_or_else(|| var.ident.clone()),
            );
        }
        for eq in component.equations.iter_mut() {
            let lhs = std::mem::take(&mut eq.lhs);
            eq.lhs = lhs.substitute(&subs);
            let rhs = std::mem::take(&mut eq.rhs);
            eq.rhs = rhs.substitute(&subs);
            eq.stage = EquationStage::ConnectionsResolved;
        }
    }

    Ok(())
}

/// The unique variable in the group that provides the value: it declares
/// `out` toward at least one neighbor and `in` toward none.  A relay
/// variable (`in` on its public side, `out` on its private side) receives
/// and forwards, so it is not a candidate.
fn elect_source(
    model: &Model,
    group: &BTreeSet<Ident>,
    edges: &BTreeMap<Ident, BTreeSet<Ident>>,
) -> Result<Ident> {
    let mut candidates: Vec<Ident> = Vec::new();
    for ident in group.iter() {
        let (comp_name, var_name) = split_ident(ident);
        let component = &model.components[comp_name];
        let var = &component.variables[var_name];

        let mut has_in = false;
        let mut has_out = false;
        for peer in edges[ident].iter() {
            let (peer_comp, _) = split_ident(peer);
            // a parent faces its encapsulated children over its private
            // interface; everything else goes over the public one
            let facing = if component.encapsulated.contains(peer_comp) {
                var.private_interface
            } else {
                var.public_interface
            };
            match facing {
                Direction::In => has_in = true,
                Direction::Out => has_out = true,
                Direction::None => {}
            }
        }

        if has_out && !has_in {
            candidates.push(ident.clone());
        }
    }

    if candidates.len() != 1 {
        let group_desc = group
            .iter()
            .map(|ident| ident.as_str())
            .collect::<Vec<&str>>()
            .join(", ");
        return conn_err!(
            AmbiguousSource,
            format!("Cannot determine the source & target among connected variables [{group_desc}]")
        );
    }

    Ok(candidates.pop().unwrap())
}

fn split_ident(ident: &str) -> (&str, &str) {
    match ident.split_once(SYMBOL_DELIMITER) {
        Some((component, variable)) => (component, variable),
        None => (ident, ""),
    }
}

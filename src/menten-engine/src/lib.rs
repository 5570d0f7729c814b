// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod ast;
pub mod common;
mod connections;
pub mod datamodel;
mod model;
#[cfg(test)]
mod model_proptest;
#[cfg(test)]
mod test_common;
mod units;
mod units_check;

pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::connections::resolve_connections;
pub use self::model::{Component, Model, Variable, SYMBOL_DELIMITER};
pub use self::units::{Unit, UnitStore, Units};
pub use self::units_check::{annotate_units, check, check_equation, reconcile_equation};

// Copyright 2025 The Menten Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

/// An identity symbol: `component$variable` for declared variables, or the
/// ident the MathML layer assigned to a dummified number.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    JsonDeserialization,
    DuplicateComponent,
    DuplicateVariable,
    DuplicateUnit,
    UnknownUnit,
    RecursiveUnitDefinition,
    BadUnitExponent,
    UnknownSymbol,
    InvalidConnection,
    AmbiguousSource,
    UnresolvedConnections,
    UnannotatedEquation,
    UnitMismatch,
    IncompatibleDimensions,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            JsonDeserialization => "json_deserialization",
            DuplicateComponent => "duplicate_component",
            DuplicateVariable => "duplicate_variable",
            DuplicateUnit => "duplicate_unit",
            UnknownUnit => "unknown_unit",
            RecursiveUnitDefinition => "recursive_unit_definition",
            BadUnitExponent => "bad_unit_exponent",
            UnknownSymbol => "unknown_symbol",
            InvalidConnection => "invalid_connection",
            AmbiguousSource => "ambiguous_source",
            UnresolvedConnections => "unresolved_connections",
            UnannotatedEquation => "unannotated_equation",
            UnitMismatch => "unit_mismatch",
            IncompatibleDimensions => "incompatible_dimensions",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Model,
    Connection,
    Units,
    Variable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Model => "ModelError",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Units => "UnitsError",
            ErrorKind::Variable => "VariableError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Model,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[macro_export]
macro_rules! conn_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Connection,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[macro_export]
macro_rules! var_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Variable,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[macro_export]
macro_rules! units_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Units,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Units, ErrorCode::$code, None))
    }};
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Units,
        ErrorCode::UnknownUnit,
        Some("Cannot find the unit with name \"fortnight\"".to_owned()),
    );
    let display = format!("{err}");
    assert!(display.contains("unknown_unit"));
    assert!(display.contains("Cannot find the unit with name \"fortnight\""));

    let err = Error::new(ErrorKind::Connection, ErrorCode::AmbiguousSource, None);
    assert_eq!("ConnectionError{ambiguous_source}", format!("{err}"));
}

//! Closed type system for contract values.
//!
//! Contracts manipulate exactly four value kinds: `Uint64`, `String`,
//! `Address` and `Blob`. `Address` and `Blob` are opaque string payloads at
//! the VM level; the evaluator reads them as strings and the assignment
//! sites re-tag them. The `Invalid` sentinel marks "function returns
//! nothing" and is rejected by every operator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a variable, parameter or return slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vtype {
    /// No type; marks a void return slot.
    #[default]
    Invalid,
    /// Unsigned 64-bit integer with wrapping arithmetic.
    Uint64,
    /// Immutable byte string.
    String,
    /// Opaque account identifier, carried as a string.
    Address,
    /// Opaque encrypted payload, carried as a string.
    Blob,
}

impl Vtype {
    /// Parses a type name as written in contract source. Names are
    /// case-sensitive.
    pub fn parse(name: &str) -> Option<Vtype> {
        match name {
            "Uint64" => Some(Vtype::Uint64),
            "String" => Some(Vtype::String),
            "Address" => Some(Vtype::Address),
            "Blob" => Some(Vtype::Blob),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Vtype::Invalid => "Invalid",
            Vtype::Uint64 => "Uint64",
            Vtype::String => "String",
            Vtype::Address => "Address",
            Vtype::Blob => "Blob",
        }
    }

    /// Returns the pre-initialized value a `DIM` declaration produces.
    pub fn zero_value(self) -> Value {
        match self {
            Vtype::Invalid => Value::Invalid,
            Vtype::Uint64 => Value::Uint64(0),
            Vtype::String => Value::String(String::new()),
            Vtype::Address => Value::Address(String::new()),
            Vtype::Blob => Value::Blob(String::new()),
        }
    }
}

impl fmt::Display for Vtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime value. The tag always matches the declared type of the variable
/// holding it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Placeholder produced by calling a function with no return value.
    Invalid,
    Uint64(u64),
    String(String),
    Address(String),
    Blob(String),
}

impl Value {
    pub fn vtype(&self) -> Vtype {
        match self {
            Value::Invalid => Vtype::Invalid,
            Value::Uint64(_) => Vtype::Uint64,
            Value::String(_) => Vtype::String,
            Value::Address(_) => Vtype::Address,
            Value::Blob(_) => Vtype::Blob,
        }
    }

    /// Returns the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        self.vtype().as_str()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Invalid => Ok(()),
            Value::Uint64(v) => write!(f, "{v}"),
            Value::String(s) | Value::Address(s) | Value::Blob(s) => f.write_str(s),
        }
    }
}

/// A named value with a fixed declared type.
///
/// Once declared in a scope the type never changes; re-declaration is an
/// error at the site that attempts it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub vtype: Vtype,
    pub value: Value,
}

impl Variable {
    /// Creates a variable of the given type holding its zero value.
    pub fn zero(name: impl Into<String>, vtype: Vtype) -> Variable {
        Variable {
            name: name.into(),
            vtype,
            value: vtype.zero_value(),
        }
    }
}

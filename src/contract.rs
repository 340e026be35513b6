//! Parsed contract representation.
//!
//! A [`SmartContract`] is a named collection of [`Function`]s. It is
//! produced once by the parser and immutable afterwards; execution never
//! mutates it. All maps are ordered so that serialization and the
//! pretty-printer are deterministic.

use crate::types::value::{Variable, Vtype};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One executable instruction: an optional label and its code token
/// stream. String literals stay single tokens, quotes included, so their
/// contents never interfere with statement keywords.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub label: Option<String>,
    pub code: Vec<String>,
}

/// A named routine with typed parameters, a typed (or void) return and an
/// ordered line list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Ordered parameter list; the values are the zero values of the
    /// declared types.
    pub params: Vec<Variable>,
    /// `Vtype::Invalid` marks a function with no return value.
    pub return_type: Vtype,
    pub lines: Vec<Line>,
    /// Label string to index into `lines`. Numeric labels are stored under
    /// their canonical decimal rendering.
    pub labels: BTreeMap<String, usize>,
}

impl Function {
    /// Resolves a label to the index of its line.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }
}

/// A parsed contract: a collection of functions keyed by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartContract {
    pub functions: BTreeMap<String, Function>,
}

impl SmartContract {
    /// Looks up a function by name.
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Renders the contract back to canonical source.
    ///
    /// Parsing the rendered text yields a contract equal to this one.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for (i, function) in self.functions.values().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str("Function ");
            out.push_str(&function.name);
            out.push('(');
            for (j, param) in function.params.iter().enumerate() {
                if j > 0 {
                    out.push_str(", ");
                }
                out.push_str(&param.name);
                out.push(' ');
                out.push_str(param.vtype.as_str());
            }
            out.push(')');
            if function.return_type != Vtype::Invalid {
                out.push(' ');
                out.push_str(function.return_type.as_str());
            }
            out.push('\n');

            for line in &function.lines {
                let code = line.code.join(" ");
                match &line.label {
                    Some(label) if label.parse::<u64>().is_ok() => {
                        out.push_str(label);
                        if !code.is_empty() {
                            out.push(' ');
                            out.push_str(&code);
                        }
                    }
                    Some(label) => {
                        out.push_str(label);
                        out.push(':');
                        if !code.is_empty() {
                            out.push(' ');
                            out.push_str(&code);
                        }
                    }
                    None => out.push_str(&code),
                }
                out.push('\n');
            }
            out.push_str("End Function\n");
        }
        out
    }
}

impl fmt::Display for SmartContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

//! Line-driven contract parser.
//!
//! Accumulates tokens that share a source line and flushes each complete
//! logical line into [`parse_function_line`]. A line is parsed in one of
//! three modes depending on whether a function is currently open:
//!
//! - no open function: the line must be a `Function` header
//! - `End Function`: commits the open function to the contract
//! - anything else: a body line with an optional numeric or `ident:` label
//!
//! Reaching end of input with a function still open is an error.

use crate::contract::{Function, Line, SmartContract};
use crate::errors::DvmError;
use crate::lexer::{self, Token};
use crate::types::value::{Variable, Vtype};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Parses contract source into a [`SmartContract`].
///
/// Pure and idempotent; the returned contract is immutable thereafter.
/// Errors carry the 1-based source line.
pub fn parse_contract(source: &str) -> Result<SmartContract, DvmError> {
    let tokens = lexer::tokenize(source)?;

    let mut contract = SmartContract::default();
    let mut open: Option<Function> = None;
    let mut line_tokens: Vec<Token> = Vec::new();
    let mut last_line = 1u32;

    for token in tokens {
        last_line = token.line;
        if let Some(first) = line_tokens.first() {
            if first.line != token.line {
                parse_function_line(&mut contract, &mut open, &line_tokens)?;
                line_tokens.clear();
            }
        }
        line_tokens.push(token);
    }
    if !line_tokens.is_empty() {
        parse_function_line(&mut contract, &mut open, &line_tokens)?;
    }

    if let Some(function) = open {
        return Err(DvmError::Parse {
            line: last_line,
            message: format!(
                "EOF reached but End Function is missing \"{}\"",
                function.name
            ),
        });
    }

    tracing::debug!(
        functions = contract.functions.len(),
        "parsed smart contract"
    );
    Ok(contract)
}

/// Parses one logical line in the context of the currently open function.
fn parse_function_line(
    contract: &mut SmartContract,
    open: &mut Option<Function>,
    tokens: &[Token],
) -> Result<(), DvmError> {
    let line = tokens[0].line;
    let first = tokens[0].text.as_str();

    match open {
        None => {
            if !first.eq_ignore_ascii_case("Function") {
                return Err(DvmError::Parse {
                    line,
                    message: format!(
                        "expecting declaration of function but found \"{first}\""
                    ),
                });
            }
            *open = Some(parse_function_header(tokens)?);
            Ok(())
        }
        Some(function) => {
            if first.eq_ignore_ascii_case("End") {
                let closes = tokens
                    .get(1)
                    .map(|t| t.text.eq_ignore_ascii_case("Function"))
                    .unwrap_or(false);
                if !closes {
                    return Err(DvmError::Parse {
                        line,
                        message: "expecting \"End Function\"".to_string(),
                    });
                }
                let function = open.take().unwrap();
                if contract.functions.contains_key(&function.name) {
                    return Err(DvmError::Parse {
                        line,
                        message: format!("duplicate function \"{}\"", function.name),
                    });
                }
                contract.functions.insert(function.name.clone(), function);
                Ok(())
            } else if first.eq_ignore_ascii_case("Function") {
                Err(DvmError::Parse {
                    line,
                    message: "nested functions are not allowed".to_string(),
                })
            } else {
                parse_body_line(function, tokens)
            }
        }
    }
}

/// Parses a `Function <name> ( [params] ) [rtype]` header.
fn parse_function_header(tokens: &[Token]) -> Result<Function, DvmError> {
    let line = tokens[0].line;
    let parse_err = |message: String| DvmError::Parse { line, message };

    let name = match tokens.get(1) {
        Some(t) => t.text.clone(),
        None => return Err(parse_err("function name missing".to_string())),
    };
    if !lexer::is_valid_name(&name) {
        return Err(parse_err(format!(
            "function name \"{name}\" contains invalid characters"
        )));
    }
    if tokens.get(2).map(|t| t.text.as_str()) != Some("(") {
        return Err(parse_err(format!("function \"{name}\" missing '('")));
    }

    let mut params: Vec<Variable> = Vec::new();
    let mut pos = 3;
    loop {
        let tok = tokens
            .get(pos)
            .ok_or_else(|| parse_err(format!("function \"{name}\" missing function parameters")))?;
        match tok.text.as_str() {
            "," => pos += 1,
            ")" => {
                pos += 1;
                break;
            }
            _ => {
                let pname = tok.text.clone();
                if !lexer::is_valid_name(&pname) {
                    return Err(parse_err(format!(
                        "function \"{name}\", parameter name \"{pname}\" contains invalid characters"
                    )));
                }
                let ptype_tok = tokens.get(pos + 1).ok_or_else(|| {
                    parse_err(format!("function \"{name}\" missing function parameters"))
                })?;
                let ptype = Vtype::parse(&ptype_tok.text).ok_or_else(|| {
                    parse_err(format!(
                        "function \"{name}\", parameter type \"{}\" is invalid",
                        ptype_tok.text
                    ))
                })?;
                if params.iter().any(|p| p.name == pname) {
                    return Err(parse_err(format!(
                        "function \"{name}\", duplicate parameter \"{pname}\""
                    )));
                }
                params.push(Variable::zero(pname, ptype));
                pos += 2;
            }
        }
    }

    let return_type = match tokens.get(pos) {
        None => Vtype::Invalid,
        Some(t) => {
            let rtype = Vtype::parse(&t.text).ok_or_else(|| {
                parse_err(format!(
                    "function \"{name}\", return type \"{}\" is invalid",
                    t.text
                ))
            })?;
            if tokens.len() > pos + 1 {
                return Err(parse_err(format!(
                    "function \"{name}\", unexpected tokens after return type"
                )));
            }
            rtype
        }
    };

    Ok(Function {
        name,
        params,
        return_type,
        lines: Vec::new(),
        labels: BTreeMap::new(),
    })
}

/// Parses a body line: extracts the optional label and stores the rest as
/// the line's code token stream.
///
/// A leading token that parses as a decimal uint64 is a numeric label,
/// stored under its canonical decimal rendering; an identifier followed by
/// `:` is a named label. Both forms may coexist in one function.
fn parse_body_line(function: &mut Function, tokens: &[Token]) -> Result<(), DvmError> {
    let line = tokens[0].line;
    let first = tokens[0].text.as_str();

    let (label, skip) = if let Ok(n) = first.parse::<u64>() {
        (Some(n.to_string()), 1)
    } else if tokens.get(1).map(|t| t.text.as_str()) == Some(":") && lexer::is_valid_name(first) {
        (Some(first.to_string()), 2)
    } else {
        (None, 0)
    };

    if let Some(label) = &label {
        if function.labels.contains_key(label) {
            return Err(DvmError::Parse {
                line,
                message: format!(
                    "duplicate label \"{label}\" within function \"{}\"",
                    function.name
                ),
            });
        }
        function.labels.insert(label.clone(), function.lines.len());
    }

    let code = tokens[skip..].iter().map(|t| t.text.clone()).collect();
    function.lines.push(Line { label, code });
    Ok(())
}

/// Formats a compiler-style diagnostic for parse failures.
pub fn render_parse_diagnostic(file: &str, source: &str, err: &DvmError) -> String {
    let mut diag = String::new();
    if let DvmError::Parse { line, message } = err {
        let _ = writeln!(diag, "error: {message}");
        let _ = writeln!(diag, " --> {file}:{line}");
        if let Some(raw_line) = source.lines().nth((*line as usize).saturating_sub(1)) {
            let _ = writeln!(diag, "  |");
            let _ = writeln!(diag, "{:>4} | {}", line, raw_line.trim_end_matches('\r'));
            let _ = writeln!(diag, "  |");
        }
    } else {
        let _ = writeln!(diag, "error: {err}");
    }
    diag
}

//! Line interpreter and expression evaluator.
//!
//! Executes one function activation line by line. Each activation owns its
//! local variable map (pre-populated from the parameters) and a typed
//! return slot; everything else lives in the [`SharedState`] threaded
//! through the whole call tree.
//!
//! Control flow is driven by labels: a branch carries the numeric label of
//! its target line, resolved through the function's label table at jump
//! time. Every fetched line and every evaluated expression node counts
//! against the shared meters, so runaway contracts fail deterministically.
//!
//! Intra-contract calls re-enter [`run_internal`] through the evaluator,
//! with `Uint64` arguments carried as decimal strings across the call
//! boundary just like arguments arriving from outside.

use crate::contract::{Function, SmartContract};
use crate::errors::DvmError;
use crate::expr::{parse_expr, BinOp, Expr, UnaryOp};
use crate::lexer::{canonicalize, is_valid_name, parse_u64_literal};
use crate::rnd::Rnd;
use crate::state::SharedState;
use crate::types::value::{Value, Variable, Vtype};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Arguments to a contract call: parameter name to raw string value.
/// `Uint64` parameters carry decimal (or `0x`-prefixed hex) renderings.
pub type CallArgs = BTreeMap<String, String>;

/// Runs an exported function of a parsed contract.
///
/// This is the public entry: it enforces the exported-name rule (the first
/// character must be an ASCII uppercase letter), seeds the random source
/// and clears the transfer intents at the outermost entry, and traps any
/// unexpected panic into a typed error so a contract can never take down
/// the host. On success the recursion counter is verified to be back at
/// zero.
pub fn run_contract(
    contract: &SmartContract,
    entry: &str,
    args: &CallArgs,
    state: &mut SharedState<'_>,
) -> Result<Value, DvmError> {
    let exported = entry
        .chars()
        .next()
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false);
    if !exported {
        return Err(DvmError::NotExported {
            name: entry.to_string(),
        });
    }

    if state.recursion_depth == 0 {
        let rnd = Rnd::new(
            &state.chain_inputs.scid,
            &state.chain_inputs.blid,
            &state.chain_inputs.txid,
        );
        state.rnd = Some(rnd);
        state.dero_transfer.clear();
    }

    tracing::debug!(entry, "running smart contract");
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_internal(contract, entry, args, state)
    }));
    let value = match outcome {
        Ok(result) => result?,
        Err(panic) => {
            return Err(DvmError::Fault {
                message: panic_message(panic.as_ref()),
            });
        }
    };

    if state.recursion_depth != 0 {
        return Err(DvmError::RecursionImbalance {
            depth: state.recursion_depth,
        });
    }
    Ok(value)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unexpected panic".to_string()
    }
}

/// Runs any function of the contract, exported or not. Used by the public
/// entry and by the evaluator for intra-contract calls.
pub(crate) fn run_internal(
    contract: &SmartContract,
    entry: &str,
    args: &CallArgs,
    state: &mut SharedState<'_>,
) -> Result<Value, DvmError> {
    let function = contract.get(entry).ok_or_else(|| DvmError::UnknownFunction {
        name: entry.to_string(),
    })?;

    let mut locals: BTreeMap<String, Variable> = BTreeMap::new();
    for param in &function.params {
        let raw = args
            .get(&param.name)
            .ok_or_else(|| DvmError::MissingArgument {
                function: entry.to_string(),
                argument: param.name.clone(),
            })?;
        let value = match param.vtype {
            Vtype::Uint64 => Value::Uint64(parse_u64_literal(raw)?),
            Vtype::String => Value::String(raw.clone()),
            Vtype::Address => Value::Address(raw.clone()),
            Vtype::Blob => Value::Blob(raw.clone()),
            Vtype::Invalid => {
                return Err(DvmError::UnknownType {
                    name: "Invalid".to_string(),
                });
            }
        };
        locals.insert(
            param.name.clone(),
            Variable {
                name: param.name.clone(),
                vtype: param.vtype,
                value,
            },
        );
    }

    state.enter_call()?;
    let mut interpreter = Interpreter {
        contract,
        function,
        locals,
        return_value: Variable {
            name: String::new(),
            vtype: function.return_type,
            value: Value::Invalid,
        },
        state: &mut *state,
    };
    let outcome = interpreter.interpret();
    let value = interpreter.return_value.value;
    state.exit_call();
    outcome.map(|_| value)
}

/// Where execution continues after one instruction.
enum Flow {
    /// Fall through to the next line.
    Next,
    /// Jump to the line labeled with this number.
    Jump(u64),
    /// Terminate the activation.
    Return,
}

struct Interpreter<'c, 's, 'a> {
    contract: &'c SmartContract,
    function: &'c Function,
    locals: BTreeMap<String, Variable>,
    return_value: Variable,
    state: &'s mut SharedState<'a>,
}

impl<'c, 's, 'a> Interpreter<'c, 's, 'a> {
    fn interpret(&mut self) -> Result<(), DvmError> {
        let function = self.function;
        let mut ip = 0usize;
        loop {
            self.state.count_line()?;
            let Some(line) = function.lines.get(ip) else {
                // ran past the last line
                if self.return_value.vtype == Vtype::Invalid {
                    return Ok(());
                }
                return Err(DvmError::MissingReturn {
                    function: function.name.clone(),
                });
            };
            let tokens: Vec<&str> = line.code.iter().map(|t| t.as_str()).collect();
            let Some(&first) = tokens.first() else {
                // label-only line
                ip += 1;
                continue;
            };
            tracing::trace!(function = %function.name, ip, code = %line.code.join(" "), "interpreting");

            let flow = if first.eq_ignore_ascii_case("DIM") {
                self.interpret_dim(&tokens[1..])?
            } else if first.eq_ignore_ascii_case("LET") {
                self.interpret_let(&tokens[1..])?
            } else if first.eq_ignore_ascii_case("GOTO") {
                self.interpret_goto(&tokens[1..])?
            } else if first.eq_ignore_ascii_case("IF") {
                self.interpret_if(&tokens[1..])?
            } else if first.eq_ignore_ascii_case("RETURN") {
                self.interpret_return(&tokens[1..])?
            } else if first.eq_ignore_ascii_case("PRINT") || first.eq_ignore_ascii_case("PRINTF") {
                self.interpret_print(&tokens[1..])?
            } else {
                self.interpret_call_statement(&tokens)?
            };

            match flow {
                Flow::Next => ip += 1,
                Flow::Jump(target) => {
                    let label = target.to_string();
                    ip = function
                        .label_index(&label)
                        .ok_or_else(|| DvmError::UnknownLabel {
                            function: function.name.clone(),
                            label,
                        })?;
                }
                Flow::Return => return Ok(()),
            }
        }
    }

    /// `DIM v1, v2, ... as Type`
    fn interpret_dim(&mut self, rest: &[&str]) -> Result<Flow, DvmError> {
        if rest.len() < 3 || !rest[rest.len() - 2].eq_ignore_ascii_case("as") {
            return Err(DvmError::InvalidStatement {
                message: "invalid DIM syntax".to_string(),
            });
        }
        let type_name = rest[rest.len() - 1];
        let vtype = Vtype::parse(type_name).ok_or_else(|| DvmError::UnknownType {
            name: type_name.to_string(),
        })?;
        for &name in &rest[..rest.len() - 2] {
            if name == "," {
                continue;
            }
            if !is_valid_name(name) {
                return Err(DvmError::InvalidName {
                    name: name.to_string(),
                });
            }
            if self.locals.contains_key(name) {
                return Err(DvmError::Redeclared {
                    function: self.function.name.clone(),
                    name: name.to_string(),
                });
            }
            self.locals.insert(name.to_string(), Variable::zero(name, vtype));
        }
        Ok(Flow::Next)
    }

    /// `LET v = expr`
    fn interpret_let(&mut self, rest: &[&str]) -> Result<Flow, DvmError> {
        if rest.len() < 3 || rest[1] != "=" {
            return Err(DvmError::InvalidStatement {
                message: "invalid LET syntax".to_string(),
            });
        }
        let name = rest[0];
        if !self.locals.contains_key(name) {
            return Err(DvmError::UndefinedVariable {
                function: self.function.name.clone(),
                name: name.to_string(),
            });
        }
        let expr_src = canonicalize(&rest[2..].join(" "));
        let expr = parse_expr(&expr_src)?;
        let result = self.eval(&expr)?;
        match self.locals.get_mut(name) {
            Some(variable) => {
                variable.value = coerce_assign(variable.vtype, result)?;
                Ok(Flow::Next)
            }
            None => Err(DvmError::UndefinedVariable {
                function: self.function.name.clone(),
                name: name.to_string(),
            }),
        }
    }

    /// `GOTO n`
    fn interpret_goto(&mut self, rest: &[&str]) -> Result<Flow, DvmError> {
        if rest.len() != 1 {
            return Err(DvmError::InvalidStatement {
                message: "GOTO takes exactly one line number".to_string(),
            });
        }
        Ok(Flow::Jump(parse_jump_target(rest[0])?))
    }

    /// `IF expr THEN GOTO n [ELSE GOTO m]`, matched from the end of the
    /// token list so the condition may contain any tokens.
    fn interpret_if(&mut self, rest: &[&str]) -> Result<Flow, DvmError> {
        let n = rest.len();
        let (cond_len, then_target, else_target) = if n >= 4
            && rest[n - 3].eq_ignore_ascii_case("THEN")
            && rest[n - 2].eq_ignore_ascii_case("GOTO")
        {
            (n - 3, parse_jump_target(rest[n - 1])?, None)
        } else if n >= 7
            && rest[n - 6].eq_ignore_ascii_case("THEN")
            && rest[n - 5].eq_ignore_ascii_case("GOTO")
            && rest[n - 3].eq_ignore_ascii_case("ELSE")
            && rest[n - 2].eq_ignore_ascii_case("GOTO")
        {
            (
                n - 6,
                parse_jump_target(rest[n - 4])?,
                Some(parse_jump_target(rest[n - 1])?),
            )
        } else {
            return Err(DvmError::InvalidStatement {
                message: "invalid IF syntax".to_string(),
            });
        };

        let expr_src = canonicalize(&rest[..cond_len].join(" "));
        let expr = parse_expr(&expr_src)?;
        match self.eval(&expr)? {
            Value::Uint64(0) => Ok(match else_target {
                Some(target) => Flow::Jump(target),
                None => Flow::Next,
            }),
            Value::Uint64(_) => Ok(Flow::Jump(then_target)),
            other => Err(DvmError::TypeMismatch {
                expected: "Uint64",
                actual: other.type_name(),
            }),
        }
    }

    /// `RETURN [expr]`
    fn interpret_return(&mut self, rest: &[&str]) -> Result<Flow, DvmError> {
        if self.return_value.vtype == Vtype::Invalid {
            if !rest.is_empty() {
                return Err(DvmError::InvalidStatement {
                    message: format!(
                        "function \"{}\" cannot return a value",
                        self.function.name
                    ),
                });
            }
            return Ok(Flow::Return);
        }
        if rest.is_empty() {
            return Err(DvmError::InvalidStatement {
                message: format!("function \"{}\" must return a value", self.function.name),
            });
        }
        let expr_src = canonicalize(&rest.join(" "));
        let expr = parse_expr(&expr_src)?;
        let result = self.eval(&expr)?;
        self.return_value.value = coerce_assign(self.return_value.vtype, result)?;
        Ok(Flow::Return)
    }

    /// `PRINT "fmt" v1 v2 ...` - debug only, never fatal.
    fn interpret_print(&mut self, rest: &[&str]) -> Result<Flow, DvmError> {
        let Some(&format) = rest.first() else {
            return Ok(Flow::Next);
        };
        let format = format.trim_matches('"');
        let mut params = Vec::with_capacity(rest.len().saturating_sub(1));
        for &name in &rest[1..] {
            match self.locals.get(name) {
                Some(variable) => params.push(variable.value.to_string()),
                None => params.push(format!("unknown variable {name}")),
            }
        }
        let text = format_print(format, &params);
        tracing::debug!(target: "dvm::print", "{text}");
        self.state.debug_log.push(text);
        Ok(Flow::Next)
    }

    /// Any other line must be a pure call expression, evaluated for its
    /// side effects.
    fn interpret_call_statement(&mut self, tokens: &[&str]) -> Result<Flow, DvmError> {
        let expr_src = canonicalize(&tokens.join(" "));
        let expr = parse_expr(&expr_src)?;
        if !matches!(expr, Expr::Call { .. }) {
            return Err(DvmError::InvalidStatement {
                message: format!("not a function call: \"{expr_src}\""),
            });
        }
        self.eval(&expr)?;
        Ok(Flow::Next)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, DvmError> {
        self.state.count_eval()?;
        match expr {
            Expr::Uint(v) => Ok(Value::Uint64(*v)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Ident(name) => match self.locals.get(name) {
                Some(variable) => Ok(normalize(variable.value.clone())),
                None => Err(DvmError::UndefinedVariable {
                    function: self.function.name.clone(),
                    name: name.clone(),
                }),
            },
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                eval_unary(*op, value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.eval_binary(*op, left, right)
            }
            Expr::Call { name, args } => self.eval_call(name, args),
        }
    }

    /// Dispatches a call: host internal functions first, then functions of
    /// the same contract. Arguments are evaluated left to right.
    fn eval_call(&mut self, name: &str, args: &[Expr]) -> Result<Value, DvmError> {
        if let Some(handler) = self.state.internals.lookup(name) {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(self.eval(arg)?);
            }
            return handler(self.state, &values);
        }

        let callee = self
            .contract
            .get(name)
            .ok_or_else(|| DvmError::UnknownFunction {
                name: name.to_string(),
            })?;
        if callee.params.len() != args.len() {
            return Err(DvmError::ArityMismatch {
                function: name.to_string(),
                expected: callee.params.len(),
                actual: args.len(),
            });
        }

        let mut call_args = CallArgs::new();
        for (param, arg) in callee.params.iter().zip(args) {
            let value = self.eval(arg)?;
            let raw = match param.vtype {
                Vtype::Uint64 => match value {
                    Value::Uint64(v) => v.to_string(),
                    other => {
                        return Err(DvmError::TypeMismatch {
                            expected: "Uint64",
                            actual: other.type_name(),
                        });
                    }
                },
                Vtype::String | Vtype::Address | Vtype::Blob => match value {
                    Value::String(s) => s,
                    other => {
                        return Err(DvmError::TypeMismatch {
                            expected: "String",
                            actual: other.type_name(),
                        });
                    }
                },
                Vtype::Invalid => {
                    return Err(DvmError::UnknownType {
                        name: "Invalid".to_string(),
                    });
                }
            };
            call_args.insert(param.name.clone(), raw);
        }

        let result = run_internal(self.contract, name, &call_args, self.state)?;
        if callee.return_type == Vtype::Invalid {
            Ok(Value::Invalid)
        } else {
            Ok(normalize(result))
        }
    }

    fn eval_binary(&self, op: BinOp, left: Value, right: Value) -> Result<Value, DvmError> {
        if matches!(left, Value::Invalid) || matches!(right, Value::Invalid) {
            return Err(DvmError::VoidInExpression);
        }
        // the one cross-type form: appending a Uint64 to a String
        if let (Value::String(l), Value::Uint64(r)) = (&left, &right) {
            if op == BinOp::Add {
                return self.concat(l, &r.to_string());
            }
        }
        if left.vtype() != right.vtype() {
            return Err(DvmError::OperandTypeMismatch {
                left: left.type_name(),
                right: right.type_name(),
            });
        }

        if matches!(op, BinOp::LogicalAnd | BinOp::LogicalOr) {
            let l = is_nonzero(&left)?;
            let r = is_nonzero(&right)?;
            let result = match op {
                BinOp::LogicalAnd => l && r,
                _ => l || r,
            };
            return Ok(Value::Uint64(result as u64));
        }

        match (left, right) {
            (Value::String(l), Value::String(r)) => match op {
                BinOp::Add => self.concat(&l, &r),
                BinOp::Eq => Ok(Value::Uint64((l == r) as u64)),
                BinOp::Ne => Ok(Value::Uint64((l != r) as u64)),
                other => Err(DvmError::UnsupportedOperator {
                    op: other.as_str(),
                    ty: "String",
                }),
            },
            (Value::Uint64(l), Value::Uint64(r)) => eval_uint_binary(op, l, r),
            _ => Err(DvmError::VoidInExpression),
        }
    }

    fn concat(&self, left: &str, right: &str) -> Result<Value, DvmError> {
        let len = left.len() + right.len();
        if len > self.state.max_string_len {
            return Err(DvmError::StringTooLong {
                len,
                limit: self.state.max_string_len,
            });
        }
        Ok(Value::String(format!("{left}{right}")))
    }
}

/// Reads of `Address` and `Blob` locals surface as plain strings; the
/// typed wrapper is re-applied at assignment sites.
fn normalize(value: Value) -> Value {
    match value {
        Value::Address(s) | Value::Blob(s) => Value::String(s),
        other => other,
    }
}

/// Checks an evaluator result against a declared type and re-tags string
/// payloads destined for `Address`/`Blob` slots.
fn coerce_assign(vtype: Vtype, value: Value) -> Result<Value, DvmError> {
    match (vtype, value) {
        (Vtype::Uint64, v @ Value::Uint64(_)) => Ok(v),
        (Vtype::String, v @ Value::String(_)) => Ok(v),
        (Vtype::Address, Value::String(s)) => Ok(Value::Address(s)),
        (Vtype::Blob, Value::String(s)) => Ok(Value::Blob(s)),
        (expected, actual) => Err(DvmError::TypeMismatch {
            expected: expected.as_str(),
            actual: actual.type_name(),
        }),
    }
}

/// Parses and validates a branch target: a decimal line number that is
/// neither zero nor the return sentinel.
fn parse_jump_target(text: &str) -> Result<u64, DvmError> {
    let target: u64 = text.parse().map_err(|_| DvmError::InvalidIntegerLiteral {
        literal: text.to_string(),
    })?;
    if target == 0 || target == u64::MAX {
        return Err(DvmError::InvalidJumpTarget { target });
    }
    Ok(target)
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, DvmError> {
    match (op, value) {
        (UnaryOp::BitNot, Value::Uint64(v)) => Ok(Value::Uint64(!v)),
        (UnaryOp::Not, Value::Uint64(v)) => Ok(Value::Uint64((v == 0) as u64)),
        (UnaryOp::Not, Value::String(s)) => Ok(Value::Uint64(s.is_empty() as u64)),
        (UnaryOp::BitNot, other) => Err(DvmError::UnsupportedOperator {
            op: "^",
            ty: other.type_name(),
        }),
        (UnaryOp::Not, other) => Err(DvmError::UnsupportedOperator {
            op: "!",
            ty: other.type_name(),
        }),
    }
}

fn eval_uint_binary(op: BinOp, l: u64, r: u64) -> Result<Value, DvmError> {
    let value = match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div => {
            if r == 0 {
                return Err(DvmError::DivisionByZero);
            }
            l / r
        }
        BinOp::Rem => {
            if r == 0 {
                return Err(DvmError::DivisionByZero);
            }
            l % r
        }
        BinOp::BitAnd => l & r,
        BinOp::BitOr => l | r,
        BinOp::BitXor => l ^ r,
        // shifts by 64 or more bits drain to zero
        BinOp::Shl => {
            if r >= 64 {
                0
            } else {
                l << r
            }
        }
        BinOp::Shr => {
            if r >= 64 {
                0
            } else {
                l >> r
            }
        }
        BinOp::Eq => (l == r) as u64,
        BinOp::Ne => (l != r) as u64,
        BinOp::Lt => (l < r) as u64,
        BinOp::Le => (l <= r) as u64,
        BinOp::Gt => (l > r) as u64,
        BinOp::Ge => (l >= r) as u64,
        BinOp::LogicalAnd | BinOp::LogicalOr => {
            return Err(DvmError::UnsupportedOperator {
                op: op.as_str(),
                ty: "Uint64",
            });
        }
    };
    Ok(Value::Uint64(value))
}

/// Non-zero test used by the logical operators: `Uint64 != 0`,
/// `String != ""`.
fn is_nonzero(value: &Value) -> Result<bool, DvmError> {
    match value {
        Value::Uint64(v) => Ok(*v != 0),
        Value::String(s) | Value::Address(s) | Value::Blob(s) => Ok(!s.is_empty()),
        Value::Invalid => Err(DvmError::VoidInExpression),
    }
}

/// Minimal `%`-verb substitution for `PRINT`: every verb other than `%%`
/// consumes the next parameter.
fn format_print(format: &str, params: &[String]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut params = params.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(_) => match params.next() {
                Some(param) => out.push_str(param),
                None => out.push_str("%!missing"),
            },
            None => out.push('%'),
        }
    }
    out
}

use thiserror::Error;

/// Errors that can occur while parsing or executing a contract.
///
/// Every failure inside a call aborts that call and, transitively, the
/// top-level call; there is no in-language recovery. One value of this type
/// is the entire user-visible error surface of a call.
#[derive(Debug, Error)]
pub enum DvmError {
    /// Malformed source rejected by the parser, with the 1-based line.
    #[error("line {line}: {message}")]
    Parse { line: u32, message: String },
    /// Call to a function the contract does not define.
    #[error("function \"{name}\" is not available in contract")]
    UnknownFunction { name: String },
    /// Entry point name is not exported (first character must be an ASCII
    /// uppercase letter).
    #[error("entry point \"{name}\" is not exported")]
    NotExported { name: String },
    /// Call with the wrong number of arguments.
    #[error("function \"{function}\" called with {actual} arguments, expected {expected}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },
    /// A declared parameter is missing from the argument map.
    #[error("argument \"{argument}\" is missing while invoking \"{function}\"")]
    MissingArgument { function: String, argument: String },
    /// Identifier referenced before any declaration.
    #[error("variable \"{name}\" is used without definition in function \"{function}\"")]
    UndefinedVariable { function: String, name: String },
    /// `DIM` of a name that already exists in the local scope.
    #[error("variable \"{name}\" is already defined in function \"{function}\"")]
    Redeclared { function: String, name: String },
    /// A name does not start with a letter.
    #[error("name \"{name}\" contains invalid characters")]
    InvalidName { name: String },
    /// A type name outside the closed type system.
    #[error("no such data type \"{name}\"")]
    UnknownType { name: String },
    /// Value of one type where another was required.
    #[error("expected {expected} value, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Binary operator applied to operands of different types.
    #[error("operands have different types: {left} vs {right}")]
    OperandTypeMismatch {
        left: &'static str,
        right: &'static str,
    },
    /// Operator that the operand type does not support.
    #[error("operator {op} is not supported on {ty}")]
    UnsupportedOperator { op: &'static str, ty: &'static str },
    /// Result of a void call used inside an expression.
    #[error("void function result used in expression")]
    VoidInExpression,
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Integer literal that is malformed or overflows Uint64.
    #[error("invalid Uint64 literal \"{literal}\"")]
    InvalidIntegerLiteral { literal: String },
    /// Malformed expression source.
    #[error("invalid expression: {message}")]
    InvalidExpression { message: String },
    /// Statement that does not match any instruction form.
    #[error("invalid statement: {message}")]
    InvalidStatement { message: String },
    /// Jump to a label the function does not define.
    #[error("undefined label \"{label}\" in function \"{function}\"")]
    UnknownLabel { function: String, label: String },
    /// `GOTO 0` or `GOTO 18446744073709551615`.
    #[error("GOTO has invalid line number \"{target}\"")]
    InvalidJumpTarget { target: u64 },
    /// Execution ran past the last line of a function that declares a
    /// return value.
    #[error("function \"{function}\" ended without RETURN")]
    MissingReturn { function: String },
    /// Line meter exceeded.
    #[error("{count} lines interpreted, reached limit {limit}")]
    LineLimit { count: u64, limit: u64 },
    /// Expression-evaluation meter exceeded.
    #[error("{count} expressions evaluated, reached limit {limit}")]
    EvalLimit { count: u64, limit: u64 },
    /// Intra-contract call nesting exceeded the ceiling.
    #[error("recursion depth {depth} reached limit {limit}")]
    RecursionLimit { depth: u64, limit: u64 },
    /// Recursion counter did not return to zero after the top-level call.
    #[error("invalid recursion level {depth} after top-level return")]
    RecursionImbalance { depth: u64 },
    /// Evaluator produced a string longer than the host allows.
    #[error("string length {len} exceeds limit {limit}")]
    StringTooLong { len: usize, limit: usize },
    /// Storage read of a key that does not exist.
    #[error("key not found in storage: {key}")]
    KeyNotFound { key: String },
    /// Failure signaled by a host internal function.
    #[error("internal function \"{function}\": {message}")]
    Host { function: String, message: String },
    /// Unexpected fault trapped at the top-level entry.
    #[error("internal fault: {message}")]
    Fault { message: String },
}

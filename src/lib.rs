//! Deterministic virtual machine for line-numbered smart-contract source.
//!
//! Contracts are written in a BASIC-like dialect, parsed into an immutable
//! function table and executed line by line as part of transaction
//! validation. Execution is strictly deterministic: arithmetic wraps,
//! every map is ordered, resource meters bound CPU work and recursion, and
//! all side effects are buffered per call and committed atomically by the
//! host on success.
//!
//! # Architecture
//!
//! - [`lexer`]: token stream with source lines, comments, canonicalization
//! - [`parser`]: line-driven parser producing a [`SmartContract`]
//! - [`expr`]: infix expression grammar over the closed type system
//! - [`interpreter`]: statement dispatch, evaluator and entry points
//! - [`internal`]: host internal-function dispatch table
//! - [`state`]: per-call shared state, chain inputs and meters
//! - [`storage`]: transactional view over the host key-value store
//!
//! # Embedding
//!
//! ```
//! use dvm::{parse_contract, run_contract, ChainInputs, MemoryStore, SharedState, Value};
//!
//! let contract = parse_contract(
//!     "Function Add(a Uint64, b Uint64) Uint64\n10 RETURN a + b\nEnd Function",
//! )
//! .unwrap();
//! let store = MemoryStore::new();
//! let mut state = SharedState::new(ChainInputs::default(), &store);
//! let args = [("a".to_string(), "7".to_string()), ("b".to_string(), "8".to_string())]
//!     .into_iter()
//!     .collect();
//! let result = run_contract(&contract, "Add", &args, &mut state).unwrap();
//! assert_eq!(result, Value::Uint64(15));
//! ```

pub mod contract;
pub mod errors;
pub mod expr;
pub mod internal;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod rnd;
pub mod state;
pub mod storage;
pub mod types;

pub use contract::{Function, Line, SmartContract};
pub use errors::DvmError;
pub use internal::{InternalFn, InternalTable};
pub use interpreter::{run_contract, CallArgs};
pub use parser::parse_contract;
pub use state::{
    ChainInputs, SharedState, LIMIT_EVALS, LIMIT_INTERPRETED_LINES, LIMIT_RECURSION,
};
pub use storage::{MemoryStore, StateStore, TxStorage};
pub use types::key::Key;
pub use types::value::{Value, Variable, Vtype};

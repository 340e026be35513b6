//! Per-call shared execution state.
//!
//! One [`SharedState`] is created at each top-level call boundary and
//! threaded through every interpreter and evaluator entry point; nothing
//! about a call lives in process-wide state, so independent calls can run
//! in parallel on separate states. On success the host commits the
//! buffered storage writes and transfer intents; on failure it drops the
//! whole value and nothing becomes observable.

use crate::errors::DvmError;
use crate::internal::InternalTable;
use crate::rnd::Rnd;
use crate::storage::{StateStore, TxStorage};
use crate::types::key::Key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hard ceiling on lines fetched during one top-level call.
pub const LIMIT_INTERPRETED_LINES: u64 = 2_000;
/// Hard ceiling on expression nodes evaluated during one top-level call.
pub const LIMIT_EVALS: u64 = 11_000;
/// Hard ceiling on intra-contract call nesting.
pub const LIMIT_RECURSION: u64 = 64;
/// Default ceiling on evaluator-produced string lengths.
pub const MAX_STRING_LEN: usize = 64 * 1024;

/// Read-only blockchain inputs available to a contract call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInputs {
    /// Contract being executed.
    pub scid: Key,
    /// Block under which the transaction was found.
    pub blid: Key,
    /// Transaction under which this call executes.
    pub txid: Key,
    /// Address that signed the transaction.
    pub signer: String,
    /// Chain height under which the transaction is valid.
    pub bl_height: u64,
    /// Topographic height pinpointing the block.
    pub bl_topoheight: u64,
}

/// Mutable state shared by every function activation of one top-level call.
///
/// Recursive intra-contract calls all see the same instance, so the meters
/// bound the whole call tree and storage behaves like a delegate call.
pub struct SharedState<'a> {
    /// Whether a successful completion should be committed by the host.
    pub persistence: bool,
    pub chain_inputs: ChainInputs,
    /// Contract balance, inclusive of the amount arriving with this call.
    pub dero_balance: u64,
    /// Amount of DERO received with this call.
    pub dero_received: u64,
    /// Outgoing transfer intents, applied only on successful return.
    pub dero_transfer: BTreeMap<String, u64>,
    /// Random source; seeded at the outermost entry.
    pub rnd: Option<Rnd>,
    /// Transactional storage view.
    pub store: TxStorage<'a>,
    /// Internal-function dispatch table.
    pub internals: InternalTable,
    pub recursion_depth: u64,
    pub lines_interpreted: u64,
    pub ops_evaluated: u64,
    /// Diagnostic sink for `PRINT`; the host may read it after the call.
    pub debug_log: Vec<String>,
    /// Ceiling for evaluator-produced string lengths.
    pub max_string_len: usize,
}

impl<'a> SharedState<'a> {
    /// Creates a fresh state over the given chain inputs and storage
    /// backend, with the canonical internal-function table.
    pub fn new(chain_inputs: ChainInputs, base: &'a dyn StateStore) -> Self {
        Self {
            persistence: false,
            chain_inputs,
            dero_balance: 0,
            dero_received: 0,
            dero_transfer: BTreeMap::new(),
            rnd: None,
            store: TxStorage::new(base),
            internals: InternalTable::canonical(),
            recursion_depth: 0,
            lines_interpreted: 0,
            ops_evaluated: 0,
            debug_log: Vec::new(),
            max_string_len: MAX_STRING_LEN,
        }
    }

    /// Enters a function activation, enforcing the recursion ceiling.
    pub(crate) fn enter_call(&mut self) -> Result<(), DvmError> {
        if self.recursion_depth >= LIMIT_RECURSION {
            return Err(DvmError::RecursionLimit {
                depth: self.recursion_depth,
                limit: LIMIT_RECURSION,
            });
        }
        self.recursion_depth += 1;
        Ok(())
    }

    /// Leaves a function activation. Runs on success and on unwind alike so
    /// the depth counter is always restored.
    pub(crate) fn exit_call(&mut self) {
        self.recursion_depth -= 1;
    }

    /// Counts one fetched line against the line meter.
    pub(crate) fn count_line(&mut self) -> Result<(), DvmError> {
        self.lines_interpreted += 1;
        if self.lines_interpreted > LIMIT_INTERPRETED_LINES {
            return Err(DvmError::LineLimit {
                count: self.lines_interpreted,
                limit: LIMIT_INTERPRETED_LINES,
            });
        }
        Ok(())
    }

    /// Counts one evaluated expression node against the op meter.
    pub(crate) fn count_eval(&mut self) -> Result<(), DvmError> {
        self.ops_evaluated += 1;
        if self.ops_evaluated > LIMIT_EVALS {
            return Err(DvmError::EvalLimit {
                count: self.ops_evaluated,
                limit: LIMIT_EVALS,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn enter_exit_balance() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        state.enter_call().unwrap();
        state.enter_call().unwrap();
        assert_eq!(state.recursion_depth, 2);
        state.exit_call();
        state.exit_call();
        assert_eq!(state.recursion_depth, 0);
    }

    #[test]
    fn recursion_ceiling_is_enforced() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        for _ in 0..LIMIT_RECURSION {
            state.enter_call().unwrap();
        }
        assert!(matches!(
            state.enter_call(),
            Err(DvmError::RecursionLimit { .. })
        ));
    }

    #[test]
    fn line_meter_trips_past_the_limit() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        for _ in 0..LIMIT_INTERPRETED_LINES {
            state.count_line().unwrap();
        }
        assert!(matches!(state.count_line(), Err(DvmError::LineLimit { .. })));
    }

    #[test]
    fn eval_meter_trips_past_the_limit() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        for _ in 0..LIMIT_EVALS {
            state.count_eval().unwrap();
        }
        assert!(matches!(state.count_eval(), Err(DvmError::EvalLimit { .. })));
    }
}

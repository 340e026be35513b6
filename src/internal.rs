//! Host-provided internal functions.
//!
//! The evaluator consults this dispatch table before looking for a
//! contract-defined function, so contracts can never override a host
//! function. Handlers receive the already-evaluated arguments and the
//! shared state; each one validates its own arity and argument types.
//!
//! The canonical table covers storage access, balance queries, chain
//! inspection, deterministic randomness, digest derivation and outgoing
//! transfer registration. Hosts may register additional entries or replace
//! existing ones before running a contract.

use crate::errors::DvmError;
use crate::state::SharedState;
use crate::types::key::Key;
use crate::types::value::Value;
use std::collections::BTreeMap;

/// Signature of an internal-function handler.
pub type InternalFn = fn(&mut SharedState, &[Value]) -> Result<Value, DvmError>;

/// Name to handler dispatch table.
#[derive(Clone, Debug)]
pub struct InternalTable {
    entries: BTreeMap<String, InternalFn>,
}

impl InternalTable {
    /// Creates a table with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Creates the canonical host table.
    pub fn canonical() -> Self {
        let mut table = Self::empty();
        table.register("STORE", store_fn);
        table.register("LOAD", load_fn);
        table.register("EXISTS", exists_fn);
        table.register("DELETE", delete_fn);
        table.register("RANDOM", random_fn);
        table.register("SCID", scid_fn);
        table.register("BLID", blid_fn);
        table.register("TXID", txid_fn);
        table.register("SIGNER", signer_fn);
        table.register("BL_HEIGHT", bl_height_fn);
        table.register("BL_TOPOHEIGHT", bl_topoheight_fn);
        table.register("DERO_BALANCE", dero_balance_fn);
        table.register("DEROVALUE", derovalue_fn);
        table.register("SEND_DERO_TO_ADDRESS", send_dero_fn);
        table.register("SHA3", sha3_fn);
        table
    }

    /// Registers a handler, replacing any existing entry of the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: InternalFn) {
        self.entries.insert(name.into(), handler);
    }

    /// Looks up a handler by name.
    pub fn lookup(&self, name: &str) -> Option<InternalFn> {
        self.entries.get(name).copied()
    }
}

fn host_err(function: &str, message: impl Into<String>) -> DvmError {
    DvmError::Host {
        function: function.to_string(),
        message: message.into(),
    }
}

fn want_arity(function: &str, args: &[Value], expected: usize) -> Result<(), DvmError> {
    if args.len() != expected {
        return Err(DvmError::ArityMismatch {
            function: function.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn arg_u64(function: &str, args: &[Value], index: usize) -> Result<u64, DvmError> {
    match &args[index] {
        Value::Uint64(v) => Ok(*v),
        other => Err(host_err(
            function,
            format!("argument {index} must be Uint64, got {}", other.type_name()),
        )),
    }
}

fn arg_str<'v>(function: &str, args: &'v [Value], index: usize) -> Result<&'v str, DvmError> {
    match &args[index] {
        Value::String(s) => Ok(s),
        other => Err(host_err(
            function,
            format!("argument {index} must be String, got {}", other.type_name()),
        )),
    }
}

// ==================== Storage encoding ====================

const TAG_UINT64: u8 = 0x01;
const TAG_STRING: u8 = 0x02;

/// Encodes a storage key or value: a tag byte plus the payload, so Uint64
/// and String data never collide and decode losslessly.
fn encode_value(function: &str, value: &Value) -> Result<Vec<u8>, DvmError> {
    match value {
        Value::Uint64(v) => {
            let mut out = Vec::with_capacity(9);
            out.push(TAG_UINT64);
            out.extend_from_slice(&v.to_le_bytes());
            Ok(out)
        }
        Value::String(s) => {
            let mut out = Vec::with_capacity(1 + s.len());
            out.push(TAG_STRING);
            out.extend_from_slice(s.as_bytes());
            Ok(out)
        }
        other => Err(host_err(
            function,
            format!("cannot use {} as storage data", other.type_name()),
        )),
    }
}

fn decode_value(function: &str, bytes: &[u8]) -> Result<Value, DvmError> {
    match bytes.first() {
        Some(&TAG_UINT64) if bytes.len() == 9 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[1..]);
            Ok(Value::Uint64(u64::from_le_bytes(raw)))
        }
        Some(&TAG_STRING) => String::from_utf8(bytes[1..].to_vec())
            .map(Value::String)
            .map_err(|_| host_err(function, "stored string is not valid utf-8")),
        _ => Err(host_err(function, "invalid storage value format")),
    }
}

// ==================== Handlers ====================

fn store_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("STORE", args, 2)?;
    let key = encode_value("STORE", &args[0])?;
    let value = encode_value("STORE", &args[1])?;
    state.store.put(key, value);
    Ok(Value::Invalid)
}

fn load_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("LOAD", args, 1)?;
    let key = encode_value("LOAD", &args[0])?;
    match state.store.get(&key) {
        Some(bytes) => decode_value("LOAD", &bytes),
        None => Err(DvmError::KeyNotFound {
            key: args[0].to_string(),
        }),
    }
}

fn exists_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("EXISTS", args, 1)?;
    let key = encode_value("EXISTS", &args[0])?;
    Ok(Value::Uint64(state.store.exists(&key) as u64))
}

fn delete_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("DELETE", args, 1)?;
    let key = encode_value("DELETE", &args[0])?;
    state.store.delete(key);
    Ok(Value::Invalid)
}

fn random_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    if args.len() > 1 {
        return Err(DvmError::ArityMismatch {
            function: "RANDOM".to_string(),
            expected: 1,
            actual: args.len(),
        });
    }
    let limit = match args.first() {
        Some(_) => {
            let limit = arg_u64("RANDOM", args, 0)?;
            if limit == 0 {
                return Err(DvmError::DivisionByZero);
            }
            Some(limit)
        }
        None => None,
    };
    let rnd = state
        .rnd
        .as_mut()
        .ok_or_else(|| host_err("RANDOM", "random source not initialized"))?;
    let drawn = match limit {
        Some(limit) => rnd.next_below(limit),
        None => rnd.next_u64(),
    };
    Ok(Value::Uint64(drawn))
}

fn scid_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("SCID", args, 0)?;
    Ok(Value::String(state.chain_inputs.scid.to_string()))
}

fn blid_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("BLID", args, 0)?;
    Ok(Value::String(state.chain_inputs.blid.to_string()))
}

fn txid_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("TXID", args, 0)?;
    Ok(Value::String(state.chain_inputs.txid.to_string()))
}

fn signer_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("SIGNER", args, 0)?;
    Ok(Value::String(state.chain_inputs.signer.clone()))
}

fn bl_height_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("BL_HEIGHT", args, 0)?;
    Ok(Value::Uint64(state.chain_inputs.bl_height))
}

fn bl_topoheight_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("BL_TOPOHEIGHT", args, 0)?;
    Ok(Value::Uint64(state.chain_inputs.bl_topoheight))
}

fn dero_balance_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("DERO_BALANCE", args, 0)?;
    Ok(Value::Uint64(state.dero_balance))
}

fn derovalue_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("DEROVALUE", args, 0)?;
    Ok(Value::Uint64(state.dero_received))
}

fn send_dero_fn(state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("SEND_DERO_TO_ADDRESS", args, 2)?;
    let address = arg_str("SEND_DERO_TO_ADDRESS", args, 0)?.to_string();
    let amount = arg_u64("SEND_DERO_TO_ADDRESS", args, 1)?;
    let pending = state.dero_transfer.entry(address).or_insert(0);
    *pending = pending
        .checked_add(amount)
        .ok_or_else(|| host_err("SEND_DERO_TO_ADDRESS", "transfer amount overflow"))?;
    Ok(Value::Uint64(amount))
}

fn sha3_fn(_state: &mut SharedState, args: &[Value]) -> Result<Value, DvmError> {
    want_arity("SHA3", args, 1)?;
    let data = arg_str("SHA3", args, 0)?;
    let digest = Key::sha3().chain(data.as_bytes()).finalize();
    Ok(Value::String(digest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rnd::Rnd;
    use crate::state::ChainInputs;
    use crate::storage::MemoryStore;

    fn call(
        state: &mut SharedState,
        name: &str,
        args: &[Value],
    ) -> Result<Value, DvmError> {
        let handler = state.internals.lookup(name).expect("unknown internal");
        handler(state, args)
    }

    fn uint(v: u64) -> Value {
        Value::Uint64(v)
    }

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    // ==================== Storage ====================

    #[test]
    fn store_then_load_roundtrips_both_kinds() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        call(&mut state, "STORE", &[s("count"), uint(7)]).unwrap();
        call(&mut state, "STORE", &[uint(5), s("five")]).unwrap();
        assert_eq!(call(&mut state, "LOAD", &[s("count")]).unwrap(), uint(7));
        assert_eq!(call(&mut state, "LOAD", &[uint(5)]).unwrap(), s("five"));
    }

    #[test]
    fn uint_and_string_keys_never_collide() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        call(&mut state, "STORE", &[uint(49), uint(1)]).unwrap();
        // "1" as a string key is distinct from 49 ('1' = 0x31)
        assert_eq!(
            call(&mut state, "EXISTS", &[s("1")]).unwrap(),
            uint(0)
        );
    }

    #[test]
    fn load_missing_key_is_an_error() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        assert!(matches!(
            call(&mut state, "LOAD", &[s("absent")]),
            Err(DvmError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn exists_and_delete() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        assert_eq!(call(&mut state, "EXISTS", &[s("k")]).unwrap(), uint(0));
        call(&mut state, "STORE", &[s("k"), uint(1)]).unwrap();
        assert_eq!(call(&mut state, "EXISTS", &[s("k")]).unwrap(), uint(1));
        call(&mut state, "DELETE", &[s("k")]).unwrap();
        assert_eq!(call(&mut state, "EXISTS", &[s("k")]).unwrap(), uint(0));
    }

    #[test]
    fn store_returns_void() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        assert_eq!(
            call(&mut state, "STORE", &[s("k"), uint(1)]).unwrap(),
            Value::Invalid
        );
    }

    // ==================== Randomness ====================

    #[test]
    fn random_is_deterministic_per_seed() {
        let inputs = ChainInputs::default();
        let base = MemoryStore::new();
        let mut a = SharedState::new(inputs.clone(), &base);
        let mut b = SharedState::new(inputs, &base);
        a.rnd = Some(Rnd::new(
            &a.chain_inputs.scid,
            &a.chain_inputs.blid,
            &a.chain_inputs.txid,
        ));
        b.rnd = Some(Rnd::new(
            &b.chain_inputs.scid,
            &b.chain_inputs.blid,
            &b.chain_inputs.txid,
        ));
        assert_eq!(
            call(&mut a, "RANDOM", &[]).unwrap(),
            call(&mut b, "RANDOM", &[]).unwrap()
        );
    }

    #[test]
    fn random_limit_zero_is_division_by_zero() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        state.rnd = Some(Rnd::new(&Key::zero(), &Key::zero(), &Key::zero()));
        assert!(matches!(
            call(&mut state, "RANDOM", &[uint(0)]),
            Err(DvmError::DivisionByZero)
        ));
        let Value::Uint64(v) = call(&mut state, "RANDOM", &[uint(10)]).unwrap() else {
            panic!("expected Uint64");
        };
        assert!(v < 10);
    }

    // ==================== Chain inspection ====================

    #[test]
    fn chain_inspection_values() {
        let base = MemoryStore::new();
        let inputs = ChainInputs {
            signer: "deto1qxsigner".to_string(),
            bl_height: 4242,
            bl_topoheight: 4243,
            ..ChainInputs::default()
        };
        let mut state = SharedState::new(inputs, &base);
        state.dero_balance = 100;
        state.dero_received = 25;
        assert_eq!(
            call(&mut state, "SIGNER", &[]).unwrap(),
            s("deto1qxsigner")
        );
        assert_eq!(call(&mut state, "BL_HEIGHT", &[]).unwrap(), uint(4242));
        assert_eq!(call(&mut state, "BL_TOPOHEIGHT", &[]).unwrap(), uint(4243));
        assert_eq!(call(&mut state, "DERO_BALANCE", &[]).unwrap(), uint(100));
        assert_eq!(call(&mut state, "DEROVALUE", &[]).unwrap(), uint(25));
        let Value::String(scid) = call(&mut state, "SCID", &[]).unwrap() else {
            panic!("expected String");
        };
        assert_eq!(scid.len(), 64);
    }

    // ==================== Transfers ====================

    #[test]
    fn send_accumulates_per_destination() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        call(&mut state, "SEND_DERO_TO_ADDRESS", &[s("dst"), uint(10)]).unwrap();
        call(&mut state, "SEND_DERO_TO_ADDRESS", &[s("dst"), uint(5)]).unwrap();
        call(&mut state, "SEND_DERO_TO_ADDRESS", &[s("other"), uint(1)]).unwrap();
        assert_eq!(state.dero_transfer.get("dst"), Some(&15));
        assert_eq!(state.dero_transfer.get("other"), Some(&1));
    }

    #[test]
    fn send_overflow_is_a_host_error() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        call(&mut state, "SEND_DERO_TO_ADDRESS", &[s("dst"), uint(u64::MAX)]).unwrap();
        assert!(matches!(
            call(&mut state, "SEND_DERO_TO_ADDRESS", &[s("dst"), uint(1)]),
            Err(DvmError::Host { .. })
        ));
    }

    // ==================== Misc ====================

    #[test]
    fn sha3_hex_digest() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        let Value::String(a) = call(&mut state, "SHA3", &[s("data")]).unwrap() else {
            panic!("expected String");
        };
        let Value::String(b) = call(&mut state, "SHA3", &[s("data")]).unwrap() else {
            panic!("expected String");
        };
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn arity_and_type_rejections() {
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        assert!(matches!(
            call(&mut state, "LOAD", &[]),
            Err(DvmError::ArityMismatch { .. })
        ));
        assert!(matches!(
            call(&mut state, "SEND_DERO_TO_ADDRESS", &[uint(1), uint(1)]),
            Err(DvmError::Host { .. })
        ));
        assert!(matches!(
            call(&mut state, "STORE", &[Value::Invalid, uint(1)]),
            Err(DvmError::Host { .. })
        ));
    }

    #[test]
    fn register_replaces_entries() {
        fn stub(_: &mut SharedState, _: &[Value]) -> Result<Value, DvmError> {
            Ok(Value::Uint64(99))
        }
        let base = MemoryStore::new();
        let mut state = SharedState::new(ChainInputs::default(), &base);
        state.internals.register("BL_HEIGHT", stub);
        assert_eq!(call(&mut state, "BL_HEIGHT", &[]).unwrap(), uint(99));
        assert!(state.internals.lookup("NOPE").is_none());
    }
}

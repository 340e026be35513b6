//! End-to-end contract scenarios.

use dvm::{
    parse_contract, run_contract, CallArgs, ChainInputs, DvmError, MemoryStore, SharedState,
    Value, LIMIT_INTERPRETED_LINES,
};

fn args(pairs: &[(&str, &str)]) -> CallArgs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn run(source: &str, entry: &str, pairs: &[(&str, &str)]) -> Result<Value, DvmError> {
    let contract = parse_contract(source).expect("parse failed");
    let store = MemoryStore::new();
    let mut state = SharedState::new(ChainInputs::default(), &store);
    run_contract(&contract, entry, &args(pairs), &mut state)
}

const ADD: &str = "\
Function Add(a Uint64, b Uint64) Uint64
10 DIM s as Uint64
20 LET s = a + b
30 IF s == 15 THEN GOTO 50 ELSE GOTO 60
50 RETURN 111
60 RETURN 222
End Function
";

#[test]
fn arithmetic_and_branch() {
    assert_eq!(
        run(ADD, "Add", &[("a", "7"), ("b", "8")]).unwrap(),
        Value::Uint64(111)
    );
    assert_eq!(
        run(ADD, "Add", &[("a", "1"), ("b", "2")]).unwrap(),
        Value::Uint64(222)
    );
}

#[test]
fn recursion_and_return_type() {
    let source = "\
Function Fact(n Uint64) Uint64
10 IF n == 0 THEN GOTO 30
20 RETURN n * Fact(n - 1)
30 RETURN 1
End Function
";
    assert_eq!(
        run(source, "Fact", &[("n", "5")]).unwrap(),
        Value::Uint64(120)
    );
    assert_eq!(
        run(source, "Fact", &[("n", "0")]).unwrap(),
        Value::Uint64(1)
    );
}

#[test]
fn string_concat_with_int_append() {
    let source = "\
Function Greet(name String, k Uint64) String
10 DIM out as String
20 LET out = \"hi \" + name + \" \" + k
30 RETURN out
End Function
";
    assert_eq!(
        run(source, "Greet", &[("name", "bob"), ("k", "3")]).unwrap(),
        Value::String("hi bob 3".to_string())
    );
}

#[test]
fn lowercase_entry_point_is_rejected_before_execution() {
    let contract = parse_contract(ADD).unwrap();
    let store = MemoryStore::new();
    let mut state = SharedState::new(ChainInputs::default(), &store);
    let err = run_contract(&contract, "add", &args(&[("a", "7"), ("b", "8")]), &mut state)
        .unwrap_err();
    assert!(matches!(err, DvmError::NotExported { .. }));
    assert_eq!(state.lines_interpreted, 0);
}

#[test]
fn tight_loop_exhausts_the_line_meter() {
    let source = "\
Function Loop() Uint64
10 GOTO 10
End Function
";
    let err = run(source, "Loop", &[]).unwrap_err();
    match err {
        DvmError::LineLimit { count, limit } => {
            assert_eq!(limit, LIMIT_INTERPRETED_LINES);
            assert_eq!(count, LIMIT_INTERPRETED_LINES + 1);
        }
        other => panic!("expected LineLimit, got {other:?}"),
    }
}

#[test]
fn division_by_zero_variable() {
    let source = "\
Function Bad() Uint64
10 DIM z as Uint64
20 RETURN 5 / z
End Function
";
    assert!(matches!(
        run(source, "Bad", &[]),
        Err(DvmError::DivisionByZero)
    ));
}

// ==================== Storage and transfer flows ====================

const OWNER: &str = "\
Function Init() Uint64
10 STORE(\"owner\", SIGNER())
20 RETURN 0
End Function

Function SetOwner(newowner String) Uint64
10 IF LOAD(\"owner\") == SIGNER() THEN GOTO 30
20 RETURN 1
30 STORE(\"owner\", newowner)
40 RETURN 0
End Function
";

#[test]
fn storage_commit_survives_across_calls() {
    let contract = parse_contract(OWNER).unwrap();
    let mut store = MemoryStore::new();
    let inputs = ChainInputs {
        signer: "deto1alice".to_string(),
        ..ChainInputs::default()
    };

    // first transaction: initialize and commit
    let mut state = SharedState::new(inputs.clone(), &store);
    assert_eq!(
        run_contract(&contract, "Init", &CallArgs::new(), &mut state).unwrap(),
        Value::Uint64(0)
    );
    let writes = state.store.into_writes();
    assert_eq!(writes.len(), 1);
    store.apply(writes);

    // the owner can hand off, a stranger cannot
    let mut state = SharedState::new(inputs, &store);
    assert_eq!(
        run_contract(
            &contract,
            "SetOwner",
            &args(&[("newowner", "deto1bob")]),
            &mut state
        )
        .unwrap(),
        Value::Uint64(0)
    );
    let writes = state.store.into_writes();
    store.apply(writes);

    let stranger = ChainInputs {
        signer: "deto1mallory".to_string(),
        ..ChainInputs::default()
    };
    let mut state = SharedState::new(stranger, &store);
    assert_eq!(
        run_contract(
            &contract,
            "SetOwner",
            &args(&[("newowner", "deto1mallory")]),
            &mut state
        )
        .unwrap(),
        Value::Uint64(1)
    );
    // the refused call buffered nothing
    assert!(state.store.writes().is_empty());
}

#[test]
fn failed_calls_leave_no_observable_writes() {
    let source = "\
Function Broken() Uint64
10 STORE(\"k\", 1)
20 RETURN 1 / 0
End Function
";
    let contract = parse_contract(source).unwrap();
    let store = MemoryStore::new();
    let mut state = SharedState::new(ChainInputs::default(), &store);
    run_contract(&contract, "Broken", &CallArgs::new(), &mut state).unwrap_err();
    // the host discards the state on error; the backing store never saw
    // the buffered write
    assert!(store.entries().is_empty());
}

#[test]
fn transfers_accumulate_until_successful_return() {
    let source = "\
Function Payout(dst Address, amount Uint64) Uint64
10 SEND_DERO_TO_ADDRESS(dst, amount)
20 SEND_DERO_TO_ADDRESS(dst, amount)
30 RETURN DERO_BALANCE()
End Function
";
    let contract = parse_contract(source).unwrap();
    let store = MemoryStore::new();
    let mut state = SharedState::new(ChainInputs::default(), &store);
    state.dero_balance = 500;
    let result = run_contract(
        &contract,
        "Payout",
        &args(&[("dst", "deto1dst"), ("amount", "40")]),
        &mut state,
    )
    .unwrap();
    assert_eq!(result, Value::Uint64(500));
    assert_eq!(state.dero_transfer.get("deto1dst"), Some(&80));
}

#[test]
fn random_draws_are_stable_for_fixed_chain_inputs() {
    let source = "\
Function Draw() Uint64
10 RETURN RANDOM(1000)
End Function
";
    let contract = parse_contract(source).unwrap();
    let store = MemoryStore::new();

    let mut first = SharedState::new(ChainInputs::default(), &store);
    let mut second = SharedState::new(ChainInputs::default(), &store);
    let a = run_contract(&contract, "Draw", &CallArgs::new(), &mut first).unwrap();
    let b = run_contract(&contract, "Draw", &CallArgs::new(), &mut second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn blob_parameters_pass_through_opaquely() {
    let source = "\
Function Swap(payload Blob) Blob
10 DIM copy as Blob
20 LET copy = payload
30 RETURN copy
End Function
";
    assert_eq!(
        run(source, "Swap", &[("payload", "0a0b0c")]).unwrap(),
        Value::Blob("0a0b0c".to_string())
    );
}

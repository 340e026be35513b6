//! Contract runner.
//!
//! Parses a contract source file and runs one exported entry point against
//! an in-memory store, printing the result, the buffered storage writes,
//! the transfer intents and the debug log.
//!
//! # Usage
//! ```text
//! dvm <contract-file> <EntryPoint> [OPTIONS] [name=value ...]
//! ```
//!
//! # Options
//! - `--balance <n>`: contract DERO balance visible to the call
//! - `--received <n>`: DERO arriving with the call
//! - `--signer <addr>`: signer address reported by `SIGNER()`
//! - `--persist`: mark the call as persistent
//!
//! Arguments are passed as `name=value` pairs; `Uint64` parameters take
//! decimal or `0x`-prefixed values.

use dvm::parser::render_parse_diagnostic;
use dvm::{parse_contract, run_contract, CallArgs, ChainInputs, Key, MemoryStore, SharedState};
use std::env;
use std::fs;
use std::process;

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 3 { 1 } else { 0 });
    }

    let path = &args[1];
    let entry = &args[2];

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("cannot read {path}: {err}");
            process::exit(1);
        }
    };

    let mut call_args = CallArgs::new();
    let mut balance = 0u64;
    let mut received = 0u64;
    let mut signer = String::new();
    let mut persistence = false;

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--balance" | "--received" => {
                let flag = args[i].clone();
                i += 1;
                let value = match args.get(i).and_then(|v| v.parse::<u64>().ok()) {
                    Some(value) => value,
                    None => {
                        eprintln!("{flag} requires an unsigned integer argument");
                        process::exit(1);
                    }
                };
                if flag == "--balance" {
                    balance = value;
                } else {
                    received = value;
                }
            }
            "--signer" => {
                i += 1;
                match args.get(i) {
                    Some(value) => signer = value.clone(),
                    None => {
                        eprintln!("--signer requires an argument");
                        process::exit(1);
                    }
                }
            }
            "--persist" => persistence = true,
            pair => match pair.split_once('=') {
                Some((name, value)) => {
                    call_args.insert(name.to_string(), value.to_string());
                }
                None => {
                    eprintln!("unrecognized argument: {pair}");
                    process::exit(1);
                }
            },
        }
        i += 1;
    }

    let contract = match parse_contract(&source) {
        Ok(contract) => contract,
        Err(err) => {
            eprint!("{}", render_parse_diagnostic(path, &source, &err));
            process::exit(1);
        }
    };

    // a demo chain context: the contract id is the digest of its source
    let inputs = ChainInputs {
        scid: Key::sha3().chain(source.as_bytes()).finalize(),
        blid: Key::zero(),
        txid: Key::sha3().chain(b"local-run").finalize(),
        signer,
        bl_height: 1,
        bl_topoheight: 1,
    };

    let store = MemoryStore::new();
    let mut state = SharedState::new(inputs, &store);
    state.persistence = persistence;
    state.dero_balance = balance.saturating_add(received);
    state.dero_received = received;

    match run_contract(&contract, entry, &call_args, &mut state) {
        Ok(result) => {
            println!("result: {:?}", result);
            println!(
                "meters: lines={} ops={}",
                state.lines_interpreted, state.ops_evaluated
            );
            for line in &state.debug_log {
                println!("print:  {line}");
            }
            for (address, amount) in &state.dero_transfer {
                println!("send:   {amount} -> {address}");
            }
            for (key, write) in state.store.writes() {
                match write {
                    Some(value) => {
                        println!("store:  {} = {}", hex::encode(key), hex::encode(value));
                    }
                    None => println!("delete: {}", hex::encode(key)),
                }
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <contract-file> <EntryPoint> [OPTIONS] [name=value ...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --balance <n>    contract DERO balance visible to the call");
    eprintln!("  --received <n>   DERO arriving with the call");
    eprintln!("  --signer <addr>  signer address reported by SIGNER()");
    eprintln!("  --persist        mark the call as persistent");
}

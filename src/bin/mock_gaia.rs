//! Mock gaiad/gaiacli binary for integration testing
//!
//! Implements just enough of both command lines for the harness to launch
//! against it without a real chain:
//!
//! - `init --home H ...` reads the owner password, writes `H/config/config.toml`
//!   and prints the genesis JSON
//! - `start --home H` writes `H/gaiad.pid`, prints a startup line and runs
//!   until killed
//! - `version` prints a version string
//! - `keys add NAME [--recover] --home H --output json` reads the passphrase
//!   (and seed), records what it read in `H/stdin-NAME.log` and prints the key
//!
//! Key names starting with `noisy` print a prompt before the JSON.

use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const GENESIS_SECRET: &str = "abandon abandon abandon abandon abandon abandon \
abandon abandon abandon abandon abandon about";

const GENERATED_SEED: &str = "zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong";

const CONFIG_TOML: &str = r#"# This is a TOML config file.
proxy_app = "tcp://127.0.0.1:26658"
moniker = "local"

##### consensus configuration options #####
[consensus]

wal_file = "data/cs.wal/wal"

timeout_propose = 3000
timeout_propose_delta = 500
timeout_prevote = 1000
timeout_prevote_delta = 500
timeout_precommit = 1000
timeout_precommit_delta = 500
timeout_commit = 5000

[p2p]
flush_throttle_timeout = 100
"#;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match args.first().map(String::as_str) {
        Some("init") => init(&args),
        Some("start") => start(&args),
        Some("version") => {
            emit("0.33.0-mock\n");
            0
        }
        Some("keys") if args.get(1).map(String::as_str) == Some("add") => keys_add(&args),
        _ => {
            eprintln!("mock_gaia: unsupported command {:?}", args);
            2
        }
    };
    std::process::exit(code);
}

fn init(args: &[String]) -> i32 {
    let Some(home) = flag_value(args, "--home") else {
        eprintln!("init requires --home");
        return 1;
    };
    let _password = read_line();

    let config_dir = home.join("config");
    if let Err(e) = std::fs::create_dir_all(&config_dir)
        .and_then(|_| std::fs::write(config_dir.join("config.toml"), CONFIG_TOML))
    {
        emit(&format!("Error: could not write config: {}\n", e));
        return 1;
    }

    let genesis = json!({
        "chain_id": "test-chain-mock",
        "node_id": "mocknode",
        "app_message": {
            "secret": GENESIS_SECRET,
            "addr": address_for("genesis"),
        }
    });
    emit(&format!("{}\n", genesis));
    0
}

fn start(args: &[String]) -> i32 {
    let Some(home) = flag_value(args, "--home") else {
        eprintln!("start requires --home");
        return 1;
    };
    if !home.join("config").join("config.toml").exists() {
        emit("Error: node home is not initialized\n");
        return 1;
    }
    if let Err(e) = std::fs::write(home.join("gaiad.pid"), std::process::id().to_string()) {
        emit(&format!("Error: could not write pid file: {}\n", e));
        return 1;
    }

    emit("I[2019-01-01|00:00:00.000] Starting ABCI with Tendermint module=main\n");
    // keep producing blocks until the harness goes away
    loop {
        std::thread::sleep(Duration::from_secs(1));
        if !emit("I[2019-01-01|00:00:01.000] Executed block module=state\n") {
            return 0;
        }
    }
}

fn keys_add(args: &[String]) -> i32 {
    let Some(name) = args.get(2) else {
        eprintln!("keys add requires a name");
        return 1;
    };
    let Some(home) = flag_value(args, "--home") else {
        eprintln!("keys add requires --home");
        return 1;
    };
    let recover = args.iter().any(|a| a == "--recover");

    if name.starts_with("noisy") {
        emit("Enter a passphrase to encrypt your key to disk:\n");
        std::thread::sleep(Duration::from_millis(200));
    }

    let mut received = vec![read_line()];
    if recover {
        received.push(read_line());
    }

    if let Err(e) = std::fs::create_dir_all(&home) {
        eprintln!("Error: {}", e);
        return 1;
    }
    let log = home.join(format!("stdin-{}.log", name));
    if let Err(e) = std::fs::write(&log, received.join("\n") + "\n") {
        eprintln!("Error: {}", e);
        return 1;
    }

    let key_file = home.join(format!("{}.json", name));
    if key_file.exists() {
        eprintln!("ERROR: cannot overwrite key: {}", name);
        return 1;
    }

    let seed_source = if recover { received[1].as_str() } else { name.as_str() };
    let mut key = json!({
        "name": name,
        "type": "local",
        "address": address_for(seed_source),
        "pub_key": format!("cosmospub1{}", digest(seed_source)),
    });
    if !recover {
        key["seed"] = json!(GENERATED_SEED);
    }

    if let Err(e) = std::fs::write(&key_file, key.to_string()) {
        eprintln!("Error: {}", e);
        return 1;
    }
    emit(&format!("{}\n", key));
    0
}

fn flag_value(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|v| Path::new(v).to_path_buf())
}

fn read_line() -> String {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).ok();
    line.trim_end_matches(['\r', '\n']).to_string()
}

/// Write and flush in one go so the harness sees a single chunk
fn emit(text: &str) -> bool {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .is_ok()
}

fn digest(input: &str) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn address_for(input: &str) -> String {
    format!("cosmos1{}", digest(input))
}

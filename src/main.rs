//! Wallet Ledger CLI
//!
//! Replays a journal of wallet operations against an in-memory ledger and
//! prints the resulting balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- journal.csv > balances.csv
//! cargo run -- --strategy sync journal.csv > balances.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 journal.csv > balances.csv
//! cargo run -- --config ledger.json --operator 0 --output balances.csv journal.csv
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid configuration, file not found, output not writable, etc.)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;
use tracing::error;
use wallet_ledger::config::AppConfig;
use wallet_ledger::types::LedgerError;
use wallet_ledger::{cli, strategy, telemetry};

fn main() {
    telemetry::init_tracing();
    let args = cli::parse_args();

    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            process::exit(1);
        }
    };
    args.apply_overrides(&mut config);

    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Cannot create output file");
                process::exit(1);
            }
        },
        None => Box::new(io::stdout().lock()),
    };

    let strategy = strategy::create_strategy(args.strategy, args.batch_config(), config);
    let result = strategy
        .process(&args.journal, &mut output)
        .and_then(|()| output.flush().map_err(LedgerError::from));
    if let Err(e) = result {
        error!(error = %e, "Replay failed");
        process::exit(1);
    }
}

//! Sequential replay strategy
//!
//! Orchestrates a single-threaded replay, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Ledger operations to `JournalReplayer`
//! - CSV output to `csv_format::write_balances_csv`
//!
//! Records are streamed one at a time, so memory grows with the ledger, not
//! with the journal file.

use crate::config::AppConfig;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{JournalReplayer, ReplayStrategy};
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Sequential replay strategy
///
/// ```no_run
/// use wallet_ledger::config::AppConfig;
/// use wallet_ledger::strategy::{ReplayStrategy, SyncReplayStrategy};
/// use std::path::Path;
///
/// let strategy = SyncReplayStrategy::new(AppConfig::default());
/// strategy
///     .process(Path::new("journal.csv"), &mut std::io::stdout())
///     .expect("Replay failed");
/// ```
#[derive(Debug, Clone)]
pub struct SyncReplayStrategy {
    config: AppConfig,
}

impl SyncReplayStrategy {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl ReplayStrategy for SyncReplayStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), LedgerError> {
        let reader = SyncReader::new(input_path)?;
        let replayer = JournalReplayer::new(&self.config)?;

        let mut applied = 0usize;
        let mut skipped = 0usize;
        for result in reader {
            match result.and_then(|record| replayer.apply(record)) {
                Ok(_) => applied += 1,
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, "Skipping journal record");
                }
            }
        }

        info!(applied, skipped, "Journal replayed");
        replayer.write_balances(output)
    }
}

//! Replay strategy module
//!
//! This module defines the Strategy pattern for complete journal replay
//! pipelines, encompassing both CSV parsing and ledger processing. This allows
//! different implementations (sequential, concurrent batch) to be selected at
//! runtime.

use crate::cli::StrategyType;
use crate::config::AppConfig;
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod replayer;
pub mod sync;

pub use self::r#async::{AsyncReplayStrategy, BatchConfig};
pub use replayer::JournalReplayer;
pub use sync::SyncReplayStrategy;

/// Replay strategy trait for complete journal pipelines
pub trait ReplayStrategy: Send + Sync {
    /// Replay a journal file and write the resulting balances to output
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the journal CSV file
    /// * `output` - Writer receiving the balance CSV
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - The ledger cannot be set up from the configuration
    /// - Output cannot be written
    ///
    /// Malformed rows and rejected operations are logged and skipped; they
    /// never fail the replay as a whole.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), LedgerError>;
}

/// Create a replay strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of strategy to create (Sync or Async)
/// * `batch` - Optional batch configuration (ignored for sync)
/// * `config` - Ledger and replay settings
pub fn create_strategy(
    strategy_type: StrategyType,
    batch: Option<BatchConfig>,
    config: AppConfig,
) -> Box<dyn ReplayStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncReplayStrategy::new(config)),
        StrategyType::Async => {
            Box::new(AsyncReplayStrategy::new(batch.unwrap_or_default(), config))
        }
    }
}

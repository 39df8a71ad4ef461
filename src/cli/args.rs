use crate::config::AppConfig;
use crate::strategy::BatchConfig;
use crate::types::UserId;
use clap::{Args, Parser, ValueEnum};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Replay a wallet ledger journal and print the resulting balances
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger", version, long_about = None)]
pub struct CliArgs {
    /// Journal CSV with `type,user,counterparty,amount` rows
    #[arg(value_name = "JOURNAL")]
    pub journal: PathBuf,

    /// Ledger and replay settings as JSON; built-in defaults when omitted
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the balance CSV to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// User whose account collects withdrawal fees, overriding the config file
    #[arg(long, value_name = "USER")]
    pub operator: Option<UserId>,

    /// Replay records one by one, or in concurrent batches
    #[arg(short, long, value_enum, default_value_t = StrategyType::Async)]
    pub strategy: StrategyType,

    #[command(flatten)]
    pub batch: BatchArgs,
}

/// Tuning of the concurrent strategy; ignored by `sync`
#[derive(Args, Debug, Default, Clone, Copy)]
pub struct BatchArgs {
    /// Journal records read per batch [default: 1000]
    #[arg(long, value_name = "SIZE")]
    pub batch_size: Option<NonZeroUsize>,

    /// Groups of linked users replayed at once [default: CPU cores]
    #[arg(long = "max-concurrent", value_name = "COUNT")]
    pub max_concurrent: Option<NonZeroUsize>,
}

/// Available replay strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Batch settings for the concurrent strategy, `None` for `sync`
    pub fn batch_config(&self) -> Option<BatchConfig> {
        match self.strategy {
            StrategyType::Sync => None,
            StrategyType::Async => {
                let default = BatchConfig::default();
                Some(BatchConfig::new(
                    self.batch
                        .batch_size
                        .map_or(default.batch_size, NonZeroUsize::get),
                    self.batch
                        .max_concurrent
                        .map_or(default.max_concurrent_batches, NonZeroUsize::get),
                ))
            }
        }
    }

    /// Layer command-line settings over the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(operator) = self.operator {
            config.replay.operator_user = Some(operator);
        }
    }
}

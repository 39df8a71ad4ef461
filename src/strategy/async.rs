//! Concurrent batch replay strategy
//!
//! ```text
//! AsyncReplayStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── JournalReplayer (shared, lock-protected ledger)
//! ```
//!
//! Batches are read and replayed one after another. Within a batch, records
//! are split into groups of linked users and each group is replayed on a
//! blocking worker thread. A send links its sender and receiver, and a
//! withdrawal links its user with the fee-collecting operator, so every
//! record that can affect another user's balance replays in journal order
//! with it. Groups share no account and proceed in parallel.

use crate::config::AppConfig;
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::{JournalOp, JournalRecord};
use crate::strategy::{JournalReplayer, ReplayStrategy};
use crate::types::{LedgerError, UserId};
use futures::future::join_all;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Configuration for batch processing
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of journal records per batch
    pub batch_size: usize,
    /// Maximum number of user groups replaying concurrently
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig; zero values fall back to the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(batch_size, default = default.batch_size, "Invalid batch size, using default");
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "Invalid concurrency, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Split a batch into groups of linked users, preserving record order
///
/// Users end up in the same group when a record moves value between them:
/// a send links sender and receiver, and a withdrawal links the user with
/// `operator`, who collects the fee. Groups come out in order of first
/// appearance in the batch.
pub fn partition_by_linked_users(
    batch: Vec<JournalRecord>,
    operator: Option<UserId>,
) -> Vec<Vec<JournalRecord>> {
    let mut links = UserLinks::default();
    for record in &batch {
        links.add(record.user);
        match &record.op {
            JournalOp::Send { to } => links.join(record.user, *to),
            JournalOp::Withdraw { .. } => {
                if let Some(operator) = operator {
                    links.join(record.user, operator);
                }
            }
            JournalOp::Deposit { .. } => {}
        }
    }

    let mut slots: HashMap<UserId, usize> = HashMap::new();
    let mut groups: Vec<Vec<JournalRecord>> = Vec::new();
    for record in batch {
        let root = links.root(record.user);
        let slot = *slots.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(record);
    }
    groups
}

/// Union-find over user ids
#[derive(Default)]
struct UserLinks {
    parent: HashMap<UserId, UserId>,
}

impl UserLinks {
    fn add(&mut self, user: UserId) {
        self.parent.entry(user).or_insert(user);
    }

    fn root(&mut self, user: UserId) -> UserId {
        let mut root = user;
        while let Some(&parent) = self.parent.get(&root) {
            if parent == root {
                break;
            }
            root = parent;
        }

        // Path compression
        let mut current = user;
        while current != root {
            match self.parent.insert(current, root) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        root
    }

    fn join(&mut self, a: UserId, b: UserId) {
        self.add(a);
        self.add(b);
        let (a, b) = (self.root(a), self.root(b));
        if a != b {
            self.parent.insert(a.max(b), a.min(b));
        }
    }
}

/// Concurrent batch replay strategy
#[derive(Debug, Clone)]
pub struct AsyncReplayStrategy {
    batch: BatchConfig,
    config: AppConfig,
}

impl AsyncReplayStrategy {
    pub fn new(batch: BatchConfig, config: AppConfig) -> Self {
        Self { batch, config }
    }

    /// Replay one batch and wait for every group to finish
    async fn replay_batch(
        replayer: &Arc<JournalReplayer>,
        batch: Vec<JournalRecord>,
        operator: Option<UserId>,
    ) -> (usize, usize) {
        let tasks = partition_by_linked_users(batch, operator).into_iter().map(|records| {
            let replayer = Arc::clone(replayer);
            tokio::task::spawn_blocking(move || {
                let mut applied = 0usize;
                let mut skipped = 0usize;
                for record in records {
                    match replayer.apply(record) {
                        Ok(_) => applied += 1,
                        Err(e) => {
                            skipped += 1;
                            warn!(error = %e, "Skipping journal record");
                        }
                    }
                }
                (applied, skipped)
            })
        });

        let mut totals = (0, 0);
        for result in join_all(tasks).await {
            match result {
                Ok((applied, skipped)) => {
                    totals.0 += applied;
                    totals.1 += skipped;
                }
                Err(e) => error!(error = %e, "Replay worker failed"),
            }
        }
        totals
    }
}

impl ReplayStrategy for AsyncReplayStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), LedgerError> {
        let workers = self.batch.max_concurrent_batches;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .build()
            .map_err(|e| LedgerError::Io {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        runtime.block_on(async {
            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| LedgerError::Io {
                    message: format!("Failed to open file '{}': {}", input_path.display(), e),
                })?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);
            let replayer = Arc::new(JournalReplayer::new(&self.config)?);

            let operator = self.config.replay.operator_user;
            let (mut applied, mut skipped) = (0, 0);
            loop {
                let batch = reader.read_batch(self.batch.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                let (a, s) = Self::replay_batch(&replayer, batch, operator).await;
                applied += a;
                skipped += s;
            }

            info!(applied, skipped, "Journal replayed");
            replayer.write_balances(output)
        })
    }
}

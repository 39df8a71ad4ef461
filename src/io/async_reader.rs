//! Asynchronous CSV reader with batch interface
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - futures streams to pull records lazily
//! - batch reading so the replay strategy can partition work
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of JournalRecords
//!                  ↓
//!           csv_format module
//!           (CsvRecord, convert_csv_record)
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord, JournalRecord};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous journal reader
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read a batch of journal records
    ///
    /// Reads up to `batch_size` records. Invalid records are logged and
    /// skipped. An empty vector means the end of the file was reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<JournalRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(csv_record)) => match convert_csv_record(csv_record) {
                    Ok(record) => batch.push(record),
                    Err(e) => warn!(error = %e, "Skipping journal record"),
                },
                Some(Err(e)) => warn!(error = %e, "Skipping unreadable journal row"),
                None => break,
            }
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv_format::JournalOp;
    use futures::io::Cursor;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_async_reader_read_batch() {
        let csv_content = "type,user,counterparty,amount\n\
            deposit,1,,1.0\n\
            send,1,2,0.5\n\
            deposit,2,,2.0\n";
        let mut reader = AsyncReader::new(Cursor::new(csv_content.as_bytes()));

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].user, 1);
        assert_eq!(batch[1].op, JournalOp::Send { to: 2 });

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].user, 2);
        assert_eq!(batch[0].amount, Decimal::from(2));

        assert!(reader.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_empty_csv() {
        let mut reader = AsyncReader::new(Cursor::new(&b"type,user,counterparty,amount\n"[..]));

        assert!(reader.read_batch(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_skips_invalid_record() {
        let csv_content = "type,user,counterparty,amount\n\
            refund,1,,1.0\n\
            withdraw,1,,1.0\n\
            deposit,1,tx-1,0.5\n";
        let mut reader = AsyncReader::new(Cursor::new(csv_content.as_bytes()));

        let batch = reader.read_batch(10).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch[0].op,
            JournalOp::Deposit {
                tx_id: Some("tx-1".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_async_reader_whitespace_and_case() {
        let csv_content = "type,user,counterparty,amount\n  DEPOSIT  ,  4  ,  ,  0.1  \n";
        let mut reader = AsyncReader::new(Cursor::new(csv_content.as_bytes()));

        let batch = reader.read_batch(10).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].user, 4);
        assert_eq!(batch[0].op, JournalOp::Deposit { tx_id: None });
    }
}

//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over journal records from a CSV file.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Design
//!
//! The SyncReader uses csv::Reader to read and deserialize CSV records
//! sequentially, delegating parsing and conversion to the csv_format module.
//! Records are read one at a time; the file is never loaded whole.
//!
//! ```no_run
//! use wallet_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("journal.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(record) => println!("Replaying: {:?}", record),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found) are returned from `new()`
//! - Individual record errors are yielded as `LedgerError::Parse` carrying
//!   the line number (the header is line 1)

use crate::io::csv_format::{convert_csv_record, CsvRecord, JournalRecord};
use crate::types::LedgerError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// Synchronous journal reader
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl SyncReader {
    /// Create a new SyncReader from a file path
    ///
    /// The CSV reader is configured to:
    /// - Trim whitespace from all fields
    /// - Allow flexible field counts (for the optional counterparty)
    /// - Use an 8KB buffer for efficient I/O
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the journal file
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if file opened successfully
    /// * `Err(LedgerError::Io)` if file could not be opened
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| LedgerError::Io {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<JournalRecord, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();
        let next = deserializer.next()?;
        self.line_num += 1;
        let line = Some(self.line_num);

        Some(match next {
            Ok(csv_record) => convert_csv_record(csv_record).map_err(|e| match e {
                LedgerError::Parse { message, .. } => LedgerError::Parse { line, message },
                other => other,
            }),
            Err(e) => Err(LedgerError::Parse {
                line,
                message: format!("CSV parse error: {}", e),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv_format::JournalOp;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));
        assert!(matches!(result, Err(LedgerError::Io { .. })));
    }

    #[test]
    fn test_sync_reader_iterates_all_operation_types() {
        let csv_content = "type,user,counterparty,amount\n\
            deposit,1,,1.5\n\
            send,1,2,0.5\n\
            withdraw,2,bc1qdest,0.1\n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].op, JournalOp::Deposit { tx_id: None });
        assert_eq!(records[0].amount, Decimal::new(15, 1));
        assert_eq!(records[1].op, JournalOp::Send { to: 2 });
        assert_eq!(
            records[2].op,
            JournalOp::Withdraw {
                address: "bc1qdest".to_string()
            }
        );
    }

    #[test]
    fn test_sync_reader_reports_line_numbers() {
        let csv_content = "type,user,counterparty,amount\n\
            deposit,1,,1.0\n\
            deposit,2,,invalid\n\
            deposit,3,,0.5\n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(matches!(
            records[1],
            Err(LedgerError::Parse { line: Some(3), .. })
        ));
        assert!(records[2].is_ok());
    }

    #[test]
    fn test_sync_reader_handles_whitespace() {
        let csv_content = "type,user,counterparty,amount\n  send  ,  1  ,  2  ,  0.25  \n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        let record = records[0].as_ref().unwrap();
        assert_eq!(record.user, 1);
        assert_eq!(record.op, JournalOp::Send { to: 2 });
        assert_eq!(record.amount, Decimal::new(25, 2));
    }

    #[test]
    fn test_sync_reader_handles_empty_file_after_header() {
        let file = create_temp_csv("type,user,counterparty,amount\n");

        assert_eq!(SyncReader::new(file.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sync_reader_skips_bad_user_column() {
        let csv_content = "type,user,counterparty,amount\n\
            deposit,abc,,1.0\n\
            deposit,3,,0.5\n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert!(matches!(
            records[0],
            Err(LedgerError::Parse { line: Some(2), .. })
        ));
        assert_eq!(records[1].as_ref().unwrap().user, 3);
    }
}

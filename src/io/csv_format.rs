//! CSV format handling for journal records and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to journal records
//! - Balance output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{LedgerError, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the journal format with columns: type, user, counterparty, amount.
/// The meaning of `counterparty` depends on the type: the receiving user of a
/// `send`, the destination address of a `withdraw`, and the optional
/// blockchain transaction id of a `deposit`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub op_type: String,
    pub user: UserId,
    pub counterparty: Option<String>,
    pub amount: Option<String>,
}

/// Operation replayed from one journal row
#[derive(Debug, Clone, PartialEq)]
pub enum JournalOp {
    /// Confirmed blockchain credit; a missing transaction id gets a fresh one
    Deposit { tx_id: Option<String> },
    /// Internal transfer to another user of the same wallet
    Send { to: UserId },
    /// Outgoing blockchain transfer
    Withdraw { address: String },
}

/// One validated journal row, amount in human units
#[derive(Debug, Clone, PartialEq)]
pub struct JournalRecord {
    pub user: UserId,
    pub amount: Decimal,
    pub op: JournalOp,
}

/// Balances of one account as written to the output
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRow {
    pub user: UserId,
    pub received: Decimal,
    pub sent: Decimal,
    pub balance: Decimal,
    pub available: Decimal,
}

/// Convert a CsvRecord to a JournalRecord
///
/// This function:
/// - Parses the type string into a [`JournalOp`]
/// - Parses the amount string into a Decimal
/// - Validates that `send` and `withdraw` name a counterparty
///
/// # Arguments
///
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// Result containing either:
/// - Ok(JournalRecord) - Successfully converted record
/// - Err(LedgerError::Parse) - Description of the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<JournalRecord, LedgerError> {
    let counterparty = csv_record
        .counterparty
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let amount = match csv_record.amount.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Decimal::from_str(raw).map_err(|_| {
            parse_error(format!(
                "invalid amount '{}' for user {}",
                raw, csv_record.user
            ))
        })?,
        _ => {
            return Err(parse_error(format!(
                "{} for user {} requires an amount",
                csv_record.op_type, csv_record.user
            )))
        }
    };

    let op = match csv_record.op_type.to_lowercase().as_str() {
        "deposit" => JournalOp::Deposit {
            tx_id: counterparty,
        },
        "send" => {
            let raw = counterparty.ok_or_else(|| {
                parse_error(format!("send from user {} requires a recipient", csv_record.user))
            })?;
            let to = raw.parse::<UserId>().map_err(|_| {
                parse_error(format!("invalid recipient '{}' for user {}", raw, csv_record.user))
            })?;
            JournalOp::Send { to }
        }
        "withdraw" | "withdrawal" => JournalOp::Withdraw {
            address: counterparty.ok_or_else(|| {
                parse_error(format!(
                    "withdraw from user {} requires an address",
                    csv_record.user
                ))
            })?,
        },
        other => {
            return Err(parse_error(format!(
                "invalid operation type '{}' for user {}",
                other, csv_record.user
            )))
        }
    };

    Ok(JournalRecord {
        user: csv_record.user,
        amount,
        op,
    })
}

fn parse_error(message: String) -> LedgerError {
    LedgerError::Parse {
        line: None,
        message,
    }
}

/// Write account balances to CSV format
///
/// Writes balances in CSV format with columns: user, received, sent, balance,
/// available. Rows are sorted by user for deterministic output and every
/// value is rendered with `precision` decimal places.
///
/// # Arguments
///
/// * `rows` - Balances to write
/// * `precision` - Decimal places of the coin being reported
/// * `output` - Mutable reference to a writer for outputting CSV
pub fn write_balances_csv(
    rows: &[BalanceRow],
    precision: u32,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["user", "received", "sent", "balance", "available"])?;

    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|row| row.user);

    let precision = precision as usize;
    for row in sorted {
        writer.write_record(&[
            row.user.to_string(),
            format!("{:.*}", precision, row.received),
            format!("{:.*}", precision, row.sent),
            format!("{:.*}", precision, row.balance),
            format!("{:.*}", precision, row.available),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn csv_record(op_type: &str, user: UserId, counterparty: &str, amount: &str) -> CsvRecord {
        let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());
        CsvRecord {
            op_type: op_type.to_string(),
            user,
            counterparty: optional(counterparty),
            amount: optional(amount),
        }
    }

    #[rstest]
    #[case::deposit("deposit", "", JournalOp::Deposit { tx_id: None })]
    #[case::deposit_with_tx("deposit", "tx-9", JournalOp::Deposit { tx_id: Some("tx-9".to_string()) })]
    #[case::send("send", "2", JournalOp::Send { to: 2 })]
    #[case::withdraw("withdraw", "bc1qdest", JournalOp::Withdraw { address: "bc1qdest".to_string() })]
    #[case::uppercase("SEND", " 7 ", JournalOp::Send { to: 7 })]
    fn test_convert_valid_records(
        #[case] op_type: &str,
        #[case] counterparty: &str,
        #[case] expected: JournalOp,
    ) {
        let record = convert_csv_record(csv_record(op_type, 1, counterparty, "0.5")).unwrap();

        assert_eq!(record.user, 1);
        assert_eq!(record.amount, Decimal::from_str("0.5").unwrap());
        assert_eq!(record.op, expected);
    }

    #[rstest]
    #[case::unknown_type("refund", "", "1.0")]
    #[case::missing_amount("deposit", "", "")]
    #[case::bad_amount("deposit", "", "abc")]
    #[case::send_without_recipient("send", "", "1.0")]
    #[case::send_to_address("send", "bc1qdest", "1.0")]
    #[case::withdraw_without_address("withdraw", "", "1.0")]
    fn test_convert_invalid_records(
        #[case] op_type: &str,
        #[case] counterparty: &str,
        #[case] amount: &str,
    ) {
        let result = convert_csv_record(csv_record(op_type, 1, counterparty, amount));
        assert!(matches!(result, Err(LedgerError::Parse { .. })));
    }

    #[test]
    fn test_write_balances_sorted_with_precision() {
        let row = |user, balance: &str| BalanceRow {
            user,
            received: Decimal::from_str(balance).unwrap(),
            sent: Decimal::ZERO,
            balance: Decimal::from_str(balance).unwrap(),
            available: Decimal::from_str(balance).unwrap(),
        };
        let mut output = Vec::new();

        write_balances_csv(&[row(2, "0.5"), row(1, "1.25")], 8, &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "user,received,sent,balance,available\n\
             1,1.25000000,0.00000000,1.25000000,1.25000000\n\
             2,0.50000000,0.00000000,0.50000000,0.50000000\n"
        );
    }
}

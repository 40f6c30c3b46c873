use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tallyfeed_core::{CanonicalTransaction, Money};
use thiserror::Error;

/// Column layout of the ledger import file.
pub const LEDGER_HEADER: [&str; 6] = ["Date", "Payee", "Category", "Memo", "Outflow", "Inflow"];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Writes the header and one row per transaction, in the given order.
pub fn write_ledger<W: Write>(writer: W, transactions: &[CanonicalTransaction]) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(LEDGER_HEADER)?;

    for tx in transactions {
        writer.write_record([
            tx.formatted_date(),
            tx.payee().to_string(),
            tx.category().to_string(),
            tx.memo().to_string(),
            amount_field(tx.outflow()),
            amount_field(tx.inflow()),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Replaces `path` with a ledger file, creating missing parent directories.
pub fn export_file(path: &Path, transactions: &[CanonicalTransaction]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_ledger(File::create(path)?, transactions)
}

fn amount_field(amount: Option<Money>) -> String {
    amount.map(|m| m.to_string()).unwrap_or_default()
}

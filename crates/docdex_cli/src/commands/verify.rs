//! Verify command implementation.

use docdex_storage::{EnvironmentDir, FileJournal, JournalReader, JournalRecord};
use std::path::Path;

/// Verification result for one journal.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of complete records read.
    pub records_checked: usize,
    /// Commit records among them.
    pub commits: usize,
    /// Snapshot records among them.
    pub snapshots: usize,
    /// Highest transaction id seen.
    pub last_txid: u64,
    /// Offset of a torn trailing record, which the next open drops.
    pub torn_at: Option<u64>,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying data directory at {}", root.display());
    println!();

    let environments = super::environments(root)?;
    if environments.is_empty() {
        return Err(format!("No docdex data found at {}", root.display()).into());
    }

    let mut failed = 0;
    for (label, path) in environments {
        println!("Checking {label}...");
        let result = verify_environment(&path)?;
        print_result(&label, &result);
        if !result.is_ok() {
            failed += 1;
        }
    }

    println!();
    if failed == 0 {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed for {failed} environment(s)");
        Err("Verification failed".into())
    }
}

/// Reads every record of the journal in `path`.
///
/// Holds the environment lock while reading, so it fails on an
/// environment that is open elsewhere.
pub fn verify_environment(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let dir = EnvironmentDir::open(path, false)?;
    let mut result = VerifyResult::default();
    if !dir.journal_path().exists() {
        return Ok(result);
    }

    let journal = FileJournal::open(&dir.journal_path())?;
    let mut reader = JournalReader::new(&journal)?;
    loop {
        match reader.next_record() {
            Ok(Some((offset, record))) => {
                result.records_checked += 1;
                let txid = match record {
                    JournalRecord::Commit { txid, .. } => {
                        result.commits += 1;
                        txid
                    }
                    JournalRecord::Snapshot { txid, .. } => {
                        result.snapshots += 1;
                        txid
                    }
                };
                if txid < result.last_txid {
                    result.errors.push(format!(
                        "Transaction id {txid} at offset {offset} is below {}",
                        result.last_txid
                    ));
                }
                result.last_txid = result.last_txid.max(txid);
            }
            Ok(None) => break,
            Err(e) => {
                result
                    .errors
                    .push(format!("Unreadable record after offset {}: {e}", reader.valid_len()));
                break;
            }
        }
    }
    result.torn_at = reader.torn_at();
    Ok(result)
}

fn print_result(label: &str, result: &VerifyResult) {
    println!("  {label} results:");
    println!("    Records checked: {}", result.records_checked);
    println!("    Commits:         {}", result.commits);
    println!("    Snapshots:       {}", result.snapshots);
    println!("    Last txid:       {}", result.last_txid);
    if let Some(offset) = result.torn_at {
        println!("    Torn tail at:    {offset} (dropped on next open)");
    }

    if !result.errors.is_empty() {
        println!("    Errors:");
        for error in result.errors.iter().take(10) {
            println!("      - {error}");
        }
        if result.errors.len() > 10 {
            println!("      ... and {} more", result.errors.len() - 10);
        }
    }
}

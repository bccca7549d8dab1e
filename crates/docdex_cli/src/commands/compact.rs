//! Compact command implementation.

use docdex_storage::{CompactionReport, Environment, EnvironmentOptions};
use std::path::Path;

/// Runs the compact command.
pub fn run(root: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let environments = super::environments(root)?;
    if environments.is_empty() {
        return Err(format!("No docdex data found at {}", root.display()).into());
    }

    if dry_run {
        println!("Dry run - no changes will be made");
        println!();
    }

    let mut before_total = 0;
    let mut after_total = 0;
    for (label, path) in environments {
        let report = compact_environment(&path, dry_run)?;
        before_total += report.bytes_before;
        after_total += report.bytes_after;
        if dry_run {
            println!("  {label}: {} bytes", report.bytes_before);
        } else {
            println!(
                "  {label}: {} -> {} bytes",
                report.bytes_before, report.bytes_after
            );
        }
    }

    if !dry_run {
        println!();
        println!(
            "Reclaimed {} bytes",
            before_total.saturating_sub(after_total)
        );
    }
    Ok(())
}

/// Compacts one environment. A dry run only reports its current size.
pub fn compact_environment(
    path: &Path,
    dry_run: bool,
) -> Result<CompactionReport, Box<dyn std::error::Error>> {
    let env = Environment::open(path, EnvironmentOptions::new().create_if_missing(false))?;
    let report = if dry_run {
        let len = env.journal_len()?;
        CompactionReport {
            bytes_before: len,
            bytes_after: len,
        }
    } else {
        env.compact()?
    };
    env.close()?;
    tracing::debug!(
        path = %path.display(),
        before = report.bytes_before,
        after = report.bytes_after,
        dry_run,
        "compacted environment"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docdex_storage::Readable;

    fn overwrite_many(path: &Path) {
        let env = Environment::open(path, EnvironmentOptions::default()).unwrap();
        for i in 0..20u8 {
            let mut tx = env.write_transaction().unwrap();
            tx.create_tree("t").unwrap();
            tx.put("t", &b"key"[..], vec![i; 32]).unwrap();
            tx.commit().unwrap();
        }
    }

    #[test]
    fn compaction_shrinks_and_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        overwrite_many(dir.path());

        let report = compact_environment(dir.path(), false).unwrap();
        assert!(report.bytes_after < report.bytes_before);

        let env = Environment::open(dir.path(), EnvironmentOptions::default()).unwrap();
        let value = env.read_transaction().unwrap().get("t", b"key").unwrap();
        assert_eq!(value.as_ref(), &[19u8; 32][..]);
    }

    #[test]
    fn dry_run_leaves_the_journal_alone() {
        let dir = tempfile::tempdir().unwrap();
        overwrite_many(dir.path());

        let report = compact_environment(dir.path(), true).unwrap();
        assert_eq!(report.bytes_before, report.bytes_after);
        let again = compact_environment(dir.path(), true).unwrap();
        assert_eq!(again.bytes_before, report.bytes_before);
    }
}

//! Terminal output for batch results and run history.

use rookery_core::{BatchResult, HistoryRecord, RecordOutcome};

/// ANSI color codes for terminal output.
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
}

/// One report line: `✓ record -> path` or `✗ record - reason`.
pub fn outcome_line(outcome: &RecordOutcome) -> String {
    let record = outcome.record.id();
    if outcome.is_success() {
        let mut line = match &outcome.output_path {
            Some(path) => format!("✓ {record} -> {}", path.display()),
            None => format!("✓ {record}"),
        };
        if let Some(reason) = outcome.reason {
            line.push_str(&format!(" ({reason})"));
        }
        line
    } else {
        let reason = outcome
            .reason
            .map_or_else(|| "failed".to_string(), |r| r.to_string());
        let mut line = format!("✗ {record} - {reason}");
        if let Some(stage) = outcome.failed_stage {
            line.push_str(&format!(" at {stage}"));
        }
        if let Some(detail) = &outcome.detail {
            line.push_str(&format!(": {}", truncate(detail, 120)));
        }
        line
    }
}

/// Prints one line per record followed by the totals.
pub fn print_report(result: &BatchResult, use_colors: bool) {
    use colors::*;

    for outcome in &result.outcomes {
        let line = outcome_line(outcome);
        if !use_colors {
            println!("{line}");
        } else if outcome.is_success() {
            println!("{GREEN}{line}{RESET}");
        } else {
            println!("{RED}{line}{RESET}");
        }
    }

    let totals = format!(
        "{} records: {} succeeded, {} failed",
        result.total, result.succeeded, result.failed
    );
    if !use_colors {
        println!("\n{totals}");
    } else if result.is_success() {
        println!("\n{BOLD}{GREEN}{totals}{RESET}");
    } else {
        println!("\n{BOLD}{YELLOW}{totals}{RESET}");
    }
}

/// Prints history records as a table.
pub fn print_history_table(records: &[HistoryRecord], use_colors: bool) {
    use colors::*;

    let header = format!(
        "{:>3} | {:<19} | {:<24} | {:<9} | {:<22} | {}",
        "#", "Time", "Record", "Status", "Reason", "Output"
    );
    if use_colors {
        println!("{BOLD}{DIM}{header}{RESET}");
    } else {
        println!("{header}");
    }
    println!("{}", "-".repeat(header.chars().count().max(100)));

    for (i, record) in records.iter().enumerate() {
        let time = record.ts.get(..19).unwrap_or(&record.ts).replace('T', " ");
        let reason = record.reason.as_deref().unwrap_or("-");
        let output = record.output_path.as_deref().unwrap_or("-");
        let status = format!("{:<9}", record.status);
        let status = if !use_colors {
            status
        } else if record.is_failure() {
            format!("{RED}{status}{RESET}")
        } else {
            format!("{GREEN}{status}{RESET}")
        };
        println!(
            "{:>3} | {:<19} | {:<24} | {} | {:<22} | {}",
            i + 1,
            time,
            truncate(&record.record, 24),
            status,
            reason,
            output
        );
    }
}

/// Shortens `s` to at most `max_len` characters, marking the cut with `...`.
pub fn truncate(s: &str, max_len: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max_len {
        flat
    } else {
        let kept: String = flat.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

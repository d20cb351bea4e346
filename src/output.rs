//! Console output and styling.
//!
//! Everything the user reads on the terminal goes through [`OutputFormatter`];
//! diagnostics go through `tracing` instead.

use crate::summary::RunSummary;
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use dlsort::output::OutputFormatter;
    /// OutputFormatter::success("Downloads organized");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// One line per planned or completed move.
    pub fn file_line(file_name: &str, target: &str, dry_run: bool) {
        if dry_run {
            println!("  {} → {}", file_name, target.yellow());
        } else {
            println!("  {} {} → {}", "✓".green(), file_name, target);
        }
    }

    /// Progress bar for a one-shot run over `total` files.
    ///
    /// indicatif hides the bar when stderr is not a terminal.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Per-category table followed by the one-line summary.
    pub fn summary_table(summary: &RunSummary) {
        Self::header(if summary.dry_run {
            "DRY RUN SUMMARY"
        } else {
            "SUMMARY"
        });

        if !summary.moved.is_empty() {
            let width = summary
                .moved
                .keys()
                .map(|name| name.len())
                .max()
                .unwrap_or(0)
                .max("Category".len());

            println!(
                "{:<width$} | {}",
                "Category".bold(),
                "Files".bold(),
                width = width
            );
            println!("{}", "-".repeat(width + 10));
            for (category, count) in &summary.moved {
                println!(
                    "{:<width$} | {}",
                    category,
                    count.to_string().green(),
                    width = width
                );
            }
            println!("{}", "-".repeat(width + 10));
            println!(
                "{:<width$} | {}",
                "Total".bold(),
                summary.total_moved().to_string().green().bold(),
                width = width
            );
        }

        if summary.has_failures() {
            Self::warning(&summary.to_string());
        } else {
            Self::plain(&summary.to_string());
        }
    }

    pub fn undo_report(report: &UndoReport, dry_run: bool) {
        let Some(session) = &report.session else {
            Self::info("Nothing to undo.");
            return;
        };

        if dry_run {
            Self::dry_run_notice(&format!("Undo of session {} would restore:", session));
        } else {
            Self::header(&format!("Undoing session {}", session));
        }
        println!(
            "  {}: {}",
            if dry_run { "Would restore" } else { "Restored" },
            report.restored_files.to_string().green()
        );

        if !report.skipped_files.is_empty() {
            println!("  Skipped: {}", report.skipped_files.len());
            for (path, reason) in &report.skipped_files {
                println!("    - {}: {}", path.display(), reason);
            }
        }

        if !report.failed_restores.is_empty() {
            Self::error(&format!("Failed: {}", report.failed_restores.len()));
            for (path, reason) in &report.failed_restores {
                eprintln!("    - {}: {}", path.display(), reason);
            }
            Self::warning("Failed entries stay in the log; run --undo again once they are fixed.");
        }
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

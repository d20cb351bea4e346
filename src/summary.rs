//! Per-run tallies used for the console summary and notifications.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dry_run: bool,
    /// Files moved (or planned) per category folder.
    pub moved: BTreeMap<String, usize>,
    pub duplicates_skipped: usize,
    pub quarantined: usize,
    pub failed: usize,
    pub deleted: usize,
    pub trashed: usize,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    pub fn record_move(&mut self, category: &str) {
        *self.moved.entry(category.to_string()).or_insert(0) += 1;
    }

    pub fn total_moved(&self) -> usize {
        self.moved.values().sum()
    }

    /// True when nothing happened worth telling anyone about.
    pub fn is_empty(&self) -> bool {
        self.total_moved() == 0
            && self.duplicates_skipped == 0
            && self.quarantined == 0
            && self.failed == 0
            && self.deleted == 0
            && self.trashed == 0
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Folds another batch's counts into this one.
    pub fn merge(&mut self, other: &RunSummary) {
        for (category, count) in &other.moved {
            *self.moved.entry(category.clone()).or_insert(0) += count;
        }
        self.duplicates_skipped += other.duplicates_skipped;
        self.quarantined += other.quarantined;
        self.failed += other.failed;
        self.deleted += other.deleted;
        self.trashed += other.trashed;
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Nothing to organize");
        }

        let mut parts = Vec::new();
        let total = self.total_moved();
        if total > 0 {
            let categories: Vec<String> = self
                .moved
                .iter()
                .map(|(category, count)| format!("{}: {}", category, count))
                .collect();
            parts.push(format!(
                "{} {} ({})",
                if self.dry_run { "Would move" } else { "Moved" },
                plural(total, "file"),
                categories.join(", ")
            ));
        }
        if self.duplicates_skipped > 0 {
            parts.push(format!("{} skipped", plural(self.duplicates_skipped, "duplicate")));
        }
        if self.quarantined > 0 {
            parts.push(format!("{} quarantined", plural(self.quarantined, "duplicate")));
        }
        if self.deleted > 0 {
            parts.push(format!("{} expired", plural(self.deleted, "file")));
        }
        if self.trashed > 0 {
            parts.push(format!("{} trashed", plural(self.trashed, "file")));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        f.write_str(&parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let summary = RunSummary::new(false);
        assert!(summary.is_empty());
        assert_eq!(summary.to_string(), "Nothing to organize");
    }

    #[test]
    fn test_summary_text() {
        let mut summary = RunSummary::new(false);
        summary.record_move("Documents");
        summary.record_move("Documents");
        summary.record_move("Images");
        summary.duplicates_skipped = 1;
        summary.failed = 2;

        assert_eq!(
            summary.to_string(),
            "Moved 3 files (Documents: 2, Images: 1); 1 duplicate skipped; 2 failed"
        );
        assert!(summary.has_failures());
    }

    #[test]
    fn test_dry_run_wording() {
        let mut summary = RunSummary::new(true);
        summary.record_move("Other");
        assert_eq!(summary.to_string(), "Would move 1 file (Other: 1)");
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut total = RunSummary::new(false);
        total.record_move("Images");

        let mut batch = RunSummary::new(false);
        batch.record_move("Images");
        batch.record_move("Music");
        batch.deleted = 3;

        total.merge(&batch);
        assert_eq!(total.moved.get("Images"), Some(&2));
        assert_eq!(total.moved.get("Music"), Some(&1));
        assert_eq!(total.deleted, 3);
    }
}

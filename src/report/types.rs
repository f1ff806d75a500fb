/// Result of summarizing one PR from the command line.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    /// "owner/repo#number"
    pub pr: String,
    pub pr_title: String,
    /// Paths that went into the per-file stage, in order
    pub files: Vec<String>,
    /// Files that had no patch text (binary or too large)
    pub files_without_patch: usize,
    pub summary: String,
}

impl SummaryReport {
    pub fn files_considered(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_considered() {
        let report = SummaryReport {
            pr: "o/r#1".to_string(),
            pr_title: "T".to_string(),
            files: vec!["a.rs".to_string(), "b.rs".to_string()],
            files_without_patch: 1,
            summary: "S".to_string(),
        };
        assert_eq!(report.files_considered(), 2);
    }
}

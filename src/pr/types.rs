use std::fmt;

/// Identifies one pull request on GitHub.
/// Built once per webhook delivery (or CLI invocation) and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    /// GitHub App installation the delivery came from, if any.
    pub installation_id: Option<u64>,
}

impl PullRequestRef {
    /// Build from a `owner/repo` full name as found in webhook payloads.
    /// Returns None when the name is not exactly two non-empty segments.
    pub fn from_full_name(
        full_name: &str,
        number: u64,
        installation_id: Option<u64>,
    ) -> Option<Self> {
        let (owner, repo) = full_name.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
            installation_id,
        })
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// The parts of a pull request this service reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// GitHub returns null for an empty description.
    pub body: Option<String>,
}

/// One file of a PR diff, as reported by the files endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    /// File path (e.g., "src/auth/config.rs")
    pub path: String,
    /// Unified diff text; empty for binary or oversized files.
    pub patch: String,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            patch: patch.into(),
        }
    }

    /// Render as a standalone prompt block.
    pub fn render(&self) -> String {
        format!("File: {}\n\n{}\n\n\n\n", self.path, self.patch)
    }
}

/// Reaction kinds the bot places on PRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Eyes,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Eyes => "eyes",
        }
    }
}

pub type ReactionId = u64;

/// Parsed components of a GitHub PR URL, used by the CLI.
#[derive(Debug, Clone)]
pub struct PrUrl {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}

impl From<PrUrl> for PullRequestRef {
    fn from(url: PrUrl) -> Self {
        Self {
            owner: url.owner,
            repo: url.repo,
            number: url.pr_number,
            installation_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_from_full_name() {
        let pr = PullRequestRef::from_full_name("octo/widgets", 7, Some(99)).unwrap();
        assert_eq!(pr.owner, "octo");
        assert_eq!(pr.repo, "widgets");
        assert_eq!(pr.installation_id, Some(99));
        assert_eq!(pr.to_string(), "octo/widgets#7");
    }

    #[test]
    fn test_ref_rejects_bad_full_name() {
        assert!(PullRequestRef::from_full_name("widgets", 1, None).is_none());
        assert!(PullRequestRef::from_full_name("/widgets", 1, None).is_none());
        assert!(PullRequestRef::from_full_name("a/b/c", 1, None).is_none());
    }

    #[test]
    fn test_render_embeds_path_and_patch() {
        let file = ChangedFile::new("src/lib.rs", "@@ -1 +1 @@\n-a\n+b");
        assert_eq!(file.render(), "File: src/lib.rs\n\n@@ -1 +1 @@\n-a\n+b\n\n\n\n");
    }

    #[test]
    fn test_render_with_empty_patch() {
        let file = ChangedFile::new("logo.png", "");
        assert!(file.render().starts_with("File: logo.png\n\n"));
    }
}

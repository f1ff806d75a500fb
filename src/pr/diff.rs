use tracing::{debug, info, instrument};

use super::github::{GitHubError, PullRequestApi};
use super::types::{ChangedFile, PullRequestRef};

/// Fetch the changed files of a pull request, capped at `limit`.
///
/// Files come back in whatever order GitHub lists them; anything past the
/// cap is dropped. Binary or oversized files keep their entry with an empty
/// patch. Platform errors are returned untouched.
#[instrument(skip(api), fields(pr = %pr))]
pub async fn collect(
    api: &dyn PullRequestApi,
    pr: &PullRequestRef,
    limit: usize,
) -> Result<Vec<ChangedFile>, GitHubError> {
    let mut files = api.list_files(pr, limit).await?;

    if files.len() > limit {
        debug!(dropped = files.len() - limit, limit, "dropping files past the cap");
        files.truncate(limit);
    }

    let without_patch = files.iter().filter(|f| f.patch.is_empty()).count();
    info!(files = files.len(), without_patch, "collected changed files");
    Ok(files)
}

//! Edits of the PR description and the progress reaction.
//!
//! The description doubles as the job state: trigger phrase present means
//! idle, the in-progress marker means a summary is being written, neither
//! means done. Body edits and reaction calls are separate requests, so a
//! crash in between can leave a stale reaction or marker behind; both are
//! best effort.

use tracing::{info, instrument, warn};

use crate::pr::{GitHubError, PullRequestApi, PullRequestRef, ReactionId, ReactionKind};
use crate::trigger::SUMMARY_MAGIC_PHRASE;

pub const SUMMARY_IN_PROGRESS_MESSAGE: &str = "AI Generating summary...";
pub const AI_SUMMARY_BANNER: &str = "\n🤖 AI generated summary";
/// Written in place of a summary when the PR has no changed files.
pub const NOTHING_TO_SUMMARIZE: &str = "No changed files to summarize.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    Idle,
    InProgress,
    Done,
}

/// What a finalize call did to the description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyUpdate {
    /// The marker was replaced.
    Written,
    /// No marker left; the body was not touched.
    Unchanged,
}

impl BodyState {
    pub fn of(body: &str) -> Self {
        if body.contains(SUMMARY_IN_PROGRESS_MESSAGE) {
            BodyState::InProgress
        } else if body.contains(SUMMARY_MAGIC_PHRASE) {
            BodyState::Idle
        } else {
            BodyState::Done
        }
    }
}

/// Swap the first trigger phrase for the in-progress marker.
pub fn begin_body(body: &str) -> String {
    body.replacen(SUMMARY_MAGIC_PHRASE, SUMMARY_IN_PROGRESS_MESSAGE, 1)
}

/// Swap the in-progress marker for the finished text. Unchanged when the
/// marker is gone.
pub fn complete_body(body: &str, text: &str) -> String {
    body.replacen(SUMMARY_IN_PROGRESS_MESSAGE, text, 1)
}

/// Mark a PR as being summarized and put the eyes reaction on it.
///
/// `body` is the description the trigger decision was made on.
#[instrument(skip(api, body), fields(pr = %pr))]
pub async fn mark_in_progress(
    api: &dyn PullRequestApi,
    pr: &PullRequestRef,
    body: &str,
) -> Result<ReactionId, GitHubError> {
    let marked = begin_body(body);
    if marked.contains(SUMMARY_MAGIC_PHRASE) {
        // Our own edit fires another `edited` event; the webhook ignores it
        // while the marker is present, then the leftover phrase triggers again.
        warn!("description repeats the trigger phrase, only the first is consumed");
    }
    api.update_body(pr, &marked).await?;
    let reaction_id = api.create_reaction(pr, ReactionKind::Eyes).await?;
    info!(reaction_id, "marked PR as in progress");
    Ok(reaction_id)
}

/// Write the summary over the in-progress marker and drop the reaction.
///
/// Safe to repeat: a body without the marker is left alone and a reaction
/// that is already gone counts as removed.
#[instrument(skip(api, summary), fields(pr = %pr))]
pub async fn finalize(
    api: &dyn PullRequestApi,
    pr: &PullRequestRef,
    summary: &str,
    reaction_id: ReactionId,
) -> Result<BodyUpdate, GitHubError> {
    let text = format!("{}{}", summary, AI_SUMMARY_BANNER);
    let update = replace_marker(api, pr, &text).await?;
    remove_reaction(api, pr, reaction_id).await?;
    Ok(update)
}

/// Like [`finalize`], but with a fixed note instead of a summary.
#[instrument(skip(api), fields(pr = %pr))]
pub async fn finalize_empty(
    api: &dyn PullRequestApi,
    pr: &PullRequestRef,
    reaction_id: ReactionId,
) -> Result<BodyUpdate, GitHubError> {
    let update = replace_marker(api, pr, NOTHING_TO_SUMMARIZE).await?;
    remove_reaction(api, pr, reaction_id).await?;
    Ok(update)
}

async fn replace_marker(
    api: &dyn PullRequestApi,
    pr: &PullRequestRef,
    text: &str,
) -> Result<BodyUpdate, GitHubError> {
    let current = api.get_pull(pr).await?.body.unwrap_or_default();
    let updated = complete_body(&current, text);

    if updated == current {
        warn!("in-progress marker not found, leaving body untouched");
        return Ok(BodyUpdate::Unchanged);
    }
    api.update_body(pr, &updated).await?;
    Ok(BodyUpdate::Written)
}

async fn remove_reaction(
    api: &dyn PullRequestApi,
    pr: &PullRequestRef,
    reaction_id: ReactionId,
) -> Result<(), GitHubError> {
    match api.delete_reaction(pr, reaction_id).await {
        Ok(()) => {}
        Err(GitHubError::NotFound { .. }) => {
            warn!(reaction_id, "reaction already removed");
        }
        Err(e) => return Err(e),
    }
    info!(reaction_id, "finalized PR body");
    Ok(())
}

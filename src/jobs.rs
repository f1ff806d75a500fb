//! Background summary jobs and the queue that runs them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, instrument, warn, Instrument};

use crate::pr::{diff, GitHubClients, GitHubError, PullRequestRef, ReactionId};
use crate::state::{self, BodyUpdate};
use crate::summary::{SummaryError, Summarizer};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Summary(#[from] SummaryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Summarized,
    NothingToSummarize,
}

/// Everything a job needs besides its own PR.
pub struct JobContext {
    pub github: Arc<dyn GitHubClients>,
    pub summarizer: Arc<Summarizer>,
    pub max_files: usize,
}

/// One PR whose description is already marked in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryJob {
    pub pr: PullRequestRef,
    pub title: String,
    /// Eyes reaction created when the job was accepted; the job removes it.
    pub reaction_id: ReactionId,
}

impl SummaryJob {
    /// Collect, summarize, finalize. On error the description keeps its
    /// in-progress marker and the reaction stays.
    #[instrument(skip(self, ctx), fields(pr = %self.pr, reaction_id = self.reaction_id))]
    pub async fn run(&self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let client = ctx.github.client_for(&self.pr).await?;
        let github = client.as_ref();
        let files = diff::collect(github, &self.pr, ctx.max_files).await?;

        if files.is_empty() {
            let update = state::finalize_empty(github, &self.pr, self.reaction_id).await?;
            log_update(update);
            return Ok(JobOutcome::NothingToSummarize);
        }

        let summary = ctx.summarizer.summarize(&self.title, &files).await?;
        let update = state::finalize(github, &self.pr, &summary, self.reaction_id).await?;
        log_update(update);
        Ok(JobOutcome::Summarized)
    }
}

fn log_update(update: BodyUpdate) {
    if update == BodyUpdate::Unchanged {
        warn!("description changed while summarizing, summary was not written");
    }
}

/// Hands jobs off to run in the background. Submitters get no result back;
/// the outcome shows up in the PR description and the logs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn submit(&self, job: SummaryJob);

    /// Wait up to `grace` for running jobs, then give up on the rest and
    /// return them.
    async fn shutdown(&self, _grace: Duration) -> Vec<SummaryJob> {
        Vec::new()
    }
}

/// Runs every job as its own tokio task, tracked until it finishes.
pub struct TokioJobQueue {
    ctx: Arc<JobContext>,
    tasks: Mutex<JoinSet<()>>,
    running: Arc<Mutex<HashMap<u64, SummaryJob>>>,
    next_id: AtomicU64,
}

impl TokioJobQueue {
    pub fn new(ctx: Arc<JobContext>) -> Self {
        Self {
            ctx,
            tasks: Mutex::new(JoinSet::new()),
            running: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    fn submit(&self, job: SummaryJob) {
        let ctx = self.ctx.clone();
        let running = self.running.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let span = info_span!(
            "summary_job",
            pr = %job.pr,
            installation_id = ?job.pr.installation_id,
            job_id = id
        );
        lock(&self.running).insert(id, job.clone());

        let mut tasks = lock(&self.tasks);
        // Reap finished tasks so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(
            async move {
                match job.run(&ctx).await {
                    Ok(outcome) => info!(?outcome, "summary job finished"),
                    Err(e) => error!(
                        error = %e,
                        pr = %job.pr,
                        reaction_id = job.reaction_id,
                        "summary job failed, PR description left in progress"
                    ),
                }
                lock(&running).remove(&id);
            }
            .instrument(span),
        );
    }

    async fn shutdown(&self, grace: Duration) -> Vec<SummaryJob> {
        let mut tasks = std::mem::take(&mut *lock(&self.tasks));
        if !tasks.is_empty() {
            info!(jobs = tasks.len(), grace_secs = grace.as_secs(), "waiting for summary jobs");
        }

        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_ok() {
            return Vec::new();
        }

        tasks.abort_all();
        let abandoned: Vec<SummaryJob> = lock(&self.running).drain().map(|(_, job)| job).collect();
        for job in &abandoned {
            error!(
                pr = %job.pr,
                reaction_id = job.reaction_id,
                "summary job abandoned at shutdown, PR description left in progress"
            );
        }
        abandoned
    }
}

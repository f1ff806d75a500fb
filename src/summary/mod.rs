//! Two-stage pull request summarization: one LLM call per changed file,
//! then one call folding the useful file summaries into a PR summary.

pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::{LlmConfig, SummaryConfig};
use crate::llm::{ChatCompletion, CompletionOptions, LlmError};
use crate::pr::ChangedFile;

/// Reply the per-file prompt asks for when a file has nothing worth reporting.
pub const NO_MAJOR_CHANGES: &str = "No major changes";
/// Joins surviving file summaries into the aggregation input.
pub const SUMMARY_SEPARATOR: &str = "\n\n";
/// Length cap the aggregation prompt imposes on the final summary.
pub const MAX_SUMMARY_SENTENCES: usize = 2;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summarizing {path} failed: {source}")]
    File {
        path: String,
        #[source]
        source: LlmError,
    },

    #[error("Aggregating file summaries failed: {0}")]
    Aggregate(#[source] LlmError),
}

/// True when a file summary carries the no-op sentinel anywhere in it.
pub fn is_no_op(summary: &str) -> bool {
    summary.contains(NO_MAJOR_CHANGES)
}

/// Drop no-op and empty file summaries, keep the rest in input order.
pub fn combine_partials(partials: &[String]) -> String {
    partials
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !is_no_op(s))
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR)
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// Per-file requests in flight at once.
    pub concurrency: usize,
    pub call_timeout: Duration,
    pub temperature: f32,
    /// Token cap for the aggregation call only.
    pub max_tokens: Option<u32>,
}

impl SummarizerSettings {
    pub fn from_config(summary: &SummaryConfig, llm: &LlmConfig) -> Self {
        Self {
            concurrency: summary.concurrency.max(1),
            call_timeout: Duration::from_secs(summary.call_timeout_secs),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        }
    }
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self::from_config(&SummaryConfig::default(), &LlmConfig::default())
    }
}

pub struct Summarizer {
    llm: Arc<dyn ChatCompletion>,
    settings: SummarizerSettings,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn ChatCompletion>, settings: SummarizerSettings) -> Self {
        Self { llm, settings }
    }

    /// Summarize a pull request from its changed files.
    ///
    /// Fails as a whole if any single call fails or times out; a partial
    /// summary is never produced. When every file comes back as a no-op the
    /// aggregation call is skipped and the sentinel itself is returned.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn summarize(
        &self,
        pr_title: &str,
        files: &[ChangedFile],
    ) -> Result<String, SummaryError> {
        let partials = self.summarize_files(pr_title, files).await?;
        let combined = combine_partials(&partials);

        if combined.is_empty() {
            info!("no file had major changes, skipping aggregation");
            return Ok(NO_MAJOR_CHANGES.to_string());
        }

        debug!(combined_len = combined.len(), "aggregating file summaries");
        let user = prompts::final_summary_prompt(pr_title, &combined);
        let options = CompletionOptions {
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let summary = self
            .call(prompts::PR_SYSTEM_PROMPT, &user, options)
            .await
            .map_err(SummaryError::Aggregate)?;

        let summary = summary.trim().to_string();
        info!(summary = %summary, "final summary");
        Ok(summary)
    }

    /// Per-file stage. Results come back in the order of `files` no matter
    /// which request finishes first.
    async fn summarize_files(
        &self,
        pr_title: &str,
        files: &[ChangedFile],
    ) -> Result<Vec<String>, SummaryError> {
        let pending: Vec<_> = files
            .iter()
            .map(|file| self.summarize_file(pr_title, file))
            .collect();

        stream::iter(pending)
            .buffered(self.settings.concurrency)
            .try_collect()
            .await
    }

    async fn summarize_file(
        &self,
        pr_title: &str,
        file: &ChangedFile,
    ) -> Result<String, SummaryError> {
        let user = prompts::file_summary_prompt(pr_title, &file.render());
        let options = CompletionOptions::with_temperature(self.settings.temperature);
        let summary = self
            .call(prompts::FILE_SYSTEM_PROMPT, &user, options)
            .await
            .map_err(|source| SummaryError::File {
                path: file.path.clone(),
                source,
            })?;

        let summary = summary.trim().to_string();
        info!(path = %file.path, summary = %summary, "file summary");
        Ok(summary)
    }

    async fn call(
        &self,
        system: &str,
        user: &str,
        options: CompletionOptions,
    ) -> Result<String, LlmError> {
        tokio::time::timeout(
            self.settings.call_timeout,
            self.llm.complete(system, user, options),
        )
        .await
        .unwrap_or(Err(LlmError::Timeout))
    }
}

//! In-memory doubles for the GitHub and LLM collaborators, plus a local
//! HTTP server for exercising the real clients.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::jobs::{JobQueue, SummaryJob};
use crate::llm::{ChatCompletion, CompletionOptions, LlmError};
use crate::pr::{
    ChangedFile, GitHubError, PullRequest, PullRequestApi, PullRequestRef, ReactionId,
    ReactionKind,
};

struct PrState {
    title: String,
    body: Option<String>,
    reactions: Vec<ReactionId>,
    next_reaction: ReactionId,
    body_writes: usize,
}

/// A single pull request held in memory.
pub struct FakeGitHub {
    state: Mutex<PrState>,
    files: Vec<ChangedFile>,
    honor_limit: bool,
    fail_list: bool,
    fail_update: bool,
    calls: AtomicUsize,
}

impl FakeGitHub {
    pub fn new(body: &str) -> Self {
        Self {
            state: Mutex::new(PrState {
                title: "Test PR".to_string(),
                body: Some(body.to_string()),
                reactions: Vec::new(),
                next_reaction: 1000,
                body_writes: 0,
            }),
            files: Vec::new(),
            honor_limit: true,
            fail_list: false,
            fail_update: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_title(self, title: &str) -> Self {
        self.state.lock().unwrap().title = title.to_string();
        self
    }

    pub fn without_body(self) -> Self {
        self.state.lock().unwrap().body = None;
        self
    }

    pub fn with_files(mut self, files: Vec<ChangedFile>) -> Self {
        self.files = files;
        self
    }

    /// Return every file regardless of the requested limit.
    pub fn ignoring_list_limit(mut self) -> Self {
        self.honor_limit = false;
        self
    }

    pub fn failing_list_files(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_update = true;
        self
    }

    pub fn body(&self) -> Option<String> {
        self.state.lock().unwrap().body.clone()
    }

    pub fn set_body(&self, body: &str) {
        self.state.lock().unwrap().body = Some(body.to_string());
    }

    pub fn reactions(&self) -> Vec<ReactionId> {
        self.state.lock().unwrap().reactions.clone()
    }

    pub fn body_writes(&self) -> usize {
        self.state.lock().unwrap().body_writes
    }

    /// Total API calls of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn not_found(what: &str) -> GitHubError {
        GitHubError::NotFound {
            url: format!("fake://{what}"),
        }
    }
}

#[async_trait]
impl PullRequestApi for FakeGitHub {
    async fn get_pull(&self, pr: &PullRequestRef) -> Result<PullRequest, GitHubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(PullRequest {
            number: pr.number,
            title: state.title.clone(),
            body: state.body.clone(),
        })
    }

    async fn list_files(
        &self,
        _pr: &PullRequestRef,
        limit: usize,
    ) -> Result<Vec<ChangedFile>, GitHubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(Self::not_found("files"));
        }
        let take = if self.honor_limit { limit } else { usize::MAX };
        Ok(self.files.iter().take(take).cloned().collect())
    }

    async fn update_body(&self, _pr: &PullRequestRef, body: &str) -> Result<(), GitHubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update {
            return Err(GitHubError::Unauthorized {
                status: 403,
                url: "fake://pulls".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.body = Some(body.to_string());
        state.body_writes += 1;
        Ok(())
    }

    async fn create_reaction(
        &self,
        _pr: &PullRequestRef,
        _kind: ReactionKind,
    ) -> Result<ReactionId, GitHubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.next_reaction += 1;
        let id = state.next_reaction;
        state.reactions.push(id);
        Ok(id)
    }

    async fn delete_reaction(
        &self,
        _pr: &PullRequestRef,
        id: ReactionId,
    ) -> Result<(), GitHubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let before = state.reactions.len();
        state.reactions.retain(|r| *r != id);
        if state.reactions.len() == before {
            return Err(Self::not_found("reaction"));
        }
        Ok(())
    }
}

enum Reply {
    Text(String, Duration),
    Fail,
    Hang,
}

/// LLM double answering by the first rule whose needle occurs in the user prompt.
pub struct ScriptedLlm {
    rules: Vec<(String, Reply)>,
    fallback: Option<String>,
    prompts: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn reply(self, needle: &str, text: &str) -> Self {
        self.reply_after(needle, text, Duration::ZERO)
    }

    pub fn reply_after(mut self, needle: &str, text: &str, delay: Duration) -> Self {
        self.rules
            .push((needle.to_string(), Reply::Text(text.to_string(), delay)));
        self
    }

    pub fn fail(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Fail));
        self
    }

    pub fn hang(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Hang));
        self
    }

    pub fn default_reply(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    /// (system, user) pairs in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn answer(&self, user: &str) -> Result<String, LlmError> {
        let rule = self.rules.iter().find(|(needle, _)| user.contains(needle.as_str()));
        match rule.map(|(_, reply)| reply) {
            Some(Reply::Text(text, delay)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(text.clone())
            }
            Some(Reply::Fail) => Err(LlmError::HttpStatus {
                status: 500,
                url: "fake://llm".to_string(),
                snippet: "scripted failure".to_string(),
            }),
            Some(Reply::Hang) => std::future::pending().await,
            None => self.fallback.clone().ok_or(LlmError::EmptyChoices),
        }
    }
}

#[async_trait]
impl ChatCompletion for ScriptedLlm {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        _options: CompletionOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.answer(user).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Job queue that keeps submitted jobs instead of running them.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<SummaryJob>>,
}

impl RecordingQueue {
    pub fn jobs(&self) -> Vec<SummaryJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl JobQueue for RecordingQueue {
    fn submit(&self, job: SummaryJob) {
        self.jobs.lock().unwrap().push(job);
    }
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

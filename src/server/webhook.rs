use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use super::error::{AppError, AppResult};
use super::signature::{self, SIGNATURE_HEADER};
use super::AppState;
use crate::jobs::SummaryJob;
use crate::pr::{GitHubClients, PullRequestRef};
use crate::state::{mark_in_progress, BodyState};
use crate::trigger::should_summarize;

/// The slice of a GitHub webhook payload the bot reads.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub action: Option<String>,
    pub repository: Option<Repository>,
    pub pull_request: Option<PullRequestPayload>,
    pub installation: Option<Installation>,
    pub comment: Option<Comment>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
}

#[derive(Debug, Deserialize)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct Comment {
    pub id: u64,
}

impl WebhookEvent {
    /// Action and PR coordinates; every handled event must carry them.
    fn target(&self) -> AppResult<(&str, PullRequestRef)> {
        let (Some(action), Some(repository), Some(pull_request)) = (
            self.action.as_deref(),
            self.repository.as_ref(),
            self.pull_request.as_ref(),
        ) else {
            return Err(AppError::BadRequest(
                "Invalid payload - missing action, repository name or PR number".to_string(),
            ));
        };

        let pr = PullRequestRef::from_full_name(
            &repository.full_name,
            pull_request.number,
            self.installation.as_ref().map(|i| i.id),
        )
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid repository name: {}",
                repository.full_name
            ))
        })?;

        Ok((action, pr))
    }
}

/// What the bot did with a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Outcome {
    Handled(String),
    Ignored(String),
    Failed(String),
}

impl Outcome {
    fn status_code(&self) -> StatusCode {
        match self {
            Outcome::Handled(_) => StatusCode::ACCEPTED,
            Outcome::Ignored(_) => StatusCode::OK,
            Outcome::Failed(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// POST /webhook
///
/// The signature is checked against the raw body before anything else;
/// the summary itself runs after the response is sent.
#[instrument(name = "webhook", skip_all, fields(delivery = tracing::field::Empty))]
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Outcome>)> {
    if let Some(id) = headers.get("x-github-delivery").and_then(|h| h.to_str().ok()) {
        tracing::Span::current().record("delivery", id);
    }

    let provided = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());
    if let Err(e) = signature::verify(&state.webhook_secret, &body, provided) {
        error!(error = %e, "rejecting webhook");
        return Err(e.into());
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON payload: {e}")))?;
    let (action, pr) = event.target()?;
    info!(action, pr = %pr, installation_id = ?pr.installation_id, "received webhook");

    let outcome = if let Some(comment) = &event.comment {
        debug!(comment_id = comment.id, "ignoring comment event");
        Outcome::Ignored("Comment events are not handled.".to_string())
    } else {
        process_pull_request(&state, action, pr).await
    };

    debug!(?outcome, "webhook processed");
    Ok((outcome.status_code(), Json(outcome)))
}

async fn process_pull_request(state: &AppState, action: &str, pr: PullRequestRef) -> Outcome {
    let client = match state.github.client_for(&pr).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, pr = %pr, installation_id = ?pr.installation_id, "no GitHub client for PR");
            return Outcome::Failed(e.to_string());
        }
    };
    let github = client.as_ref();

    let pull = match github.get_pull(&pr).await {
        Ok(pull) => pull,
        Err(e) => {
            error!(error = %e, pr = %pr, "failed to fetch PR");
            return Outcome::Failed(e.to_string());
        }
    };

    let body = pull.body.unwrap_or_default();
    if !should_summarize(action, Some(&body)) {
        debug!(body_state = ?BodyState::of(&body), "no summary requested");
        return Outcome::Ignored("Webhook received, but no action taken.".to_string());
    }
    if BodyState::of(&body) == BodyState::InProgress {
        info!(pr = %pr, "summary already in progress, leaving remaining trigger phrase for later");
        return Outcome::Ignored("A summary is already in progress.".to_string());
    }

    let reaction_id = match mark_in_progress(github, &pr, &body).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, pr = %pr, "failed to mark PR in progress");
            return Outcome::Failed(e.to_string());
        }
    };

    state.jobs.submit(SummaryJob {
        pr,
        title: pull.title,
        reaction_id,
    });
    Outcome::Handled("Sent PR to background summarize.".to_string())
}

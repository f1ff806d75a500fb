mod config;
mod jobs;
mod llm;
mod pr;
mod report;
mod server;
mod state;
mod summary;
#[cfg(test)]
mod testing;
mod trigger;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use crate::llm::OpenAiClient;
use crate::pr::{GitHubClients, PullRequestApi, PullRequestRef};
use crate::summary::{Summarizer, SummarizerSettings};

/// PR Helper — GitHub webhook bot that replaces `ai:summary` in a pull
/// request description with an AI-written summary of its changes.
#[derive(Parser, Debug)]
#[command(name = "pr-helper", version, about)]
struct Cli {
    /// Config file (defaults to .pr-helper.toml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server
    Serve {
        /// Listen address, overrides server.addr
        #[arg(long)]
        addr: Option<String>,
    },

    /// Summarize one PR and print the result without editing it
    Summarize {
        /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42)
        pr_url: String,

        /// Optional output file path for a markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; everything can come from the real environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let mut config = config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { addr } => {
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            server::start(&config).await?;
        }
        Command::Summarize { pr_url, output } => {
            let span = info_span!("pr_summarize", pr_url = %pr_url);
            summarize_once(&config, &pr_url, output)
                .instrument(span)
                .await?;
        }
    }

    Ok(())
}

/// Run collection and summarization for one PR, leaving the PR untouched.
async fn summarize_once(
    config: &config::Config,
    pr_url: &str,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("parsing PR URL");
    let pr: PullRequestRef = pr::parse_pr_url(pr_url)?.into();
    debug!(owner = %pr.owner, repo = %pr.repo, pr = pr.number, "parsed PR URL");

    let github = pr::clients_from_config(&config.github, config.github_auth()?)?
        .client_for(&pr)
        .await?;
    let llm = Arc::new(OpenAiClient::new(&config.llm, config.llm_api_key()?)?);
    let summarizer = Summarizer::new(
        llm,
        SummarizerSettings::from_config(&config.summary, &config.llm),
    );

    info!("fetching pull request from GitHub");
    let pull = github.get_pull(&pr).await?;
    let files = pr::diff::collect(github.as_ref(), &pr, config.summary.max_files).await?;

    let summary = if files.is_empty() {
        state::NOTHING_TO_SUMMARIZE.to_string()
    } else {
        info!(files = files.len(), "summarizing");
        summarizer.summarize(&pull.title, &files).await?
    };

    let built_report = report::build(&pr, &pull, &files, summary);
    report::output(&built_report, output.as_deref())?;
    info!("done");
    Ok(())
}

//! Prompt text for the two summarization stages.

use super::{MAX_SUMMARY_SENTENCES, NO_MAJOR_CHANGES};

pub const FILE_SYSTEM_PROMPT: &str = "You are an expert programmer, and you are trying to \
summarize the changes made to one file of a pull request.";

pub const PR_SYSTEM_PROMPT: &str =
    "You are an expert programmer, and you are trying to summarize a pull request.";

/// User prompt for one file. `file_diff` is a rendered [`crate::pr::ChangedFile`].
pub fn file_summary_prompt(pr_title: &str, file_diff: &str) -> String {
    format!(
        "Take a look at this PR file changes.
Summarize the rationale behind the changes in this file in up to 3 sentences, addressing major changes only.
Import changes and renaming of variables, functions or classes are not important - don't summarize them.
If there are major changes, start with writing the file path.
If there are no major changes, return just the string \"{sentinel}\".
The PR title is: {title}

The file diff is:
{diff}",
        sentinel = NO_MAJOR_CHANGES,
        title = pr_title,
        diff = file_diff,
    )
}

/// User prompt for the aggregation call over the surviving file summaries.
pub fn final_summary_prompt(pr_title: &str, combined: &str) -> String {
    format!(
        "Based on the following summaries of the files changed in a PR,
write in not more than {max} sentences what the main goal of the PR is.
Focus on the main objectives; leave out implementation details, naming and import changes.
Do not repeat the PR title.

The PR title is: {title}

The partial summaries are:
'''{combined}'''",
        max = MAX_SUMMARY_SENTENCES,
        title = pr_title,
        combined = combined,
    )
}

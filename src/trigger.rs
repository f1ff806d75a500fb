/// Phrase a user puts in a PR description to ask for a summary.
pub const SUMMARY_MAGIC_PHRASE: &str = "ai:summary";

/// Webhook actions that may start a summary.
pub const TRIGGER_ACTIONS: [&str; 3] = ["opened", "edited", "created"];

/// Decide whether an event should start summarization.
///
/// Pure check over the event action and the current description. Once a
/// summary starts the phrase is replaced, so a second delivery of the same
/// edit sees no phrase and is declined here.
pub fn should_summarize(action: &str, body: Option<&str>) -> bool {
    TRIGGER_ACTIONS.contains(&action)
        && body.is_some_and(|body| body.contains(SUMMARY_MAGIC_PHRASE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggers_on_allowed_actions() {
        for action in TRIGGER_ACTIONS {
            assert!(should_summarize(action, Some("Please review.\nai:summary")));
        }
    }

    #[test]
    fn test_ignores_other_actions() {
        assert!(!should_summarize("closed", Some("ai:summary")));
        assert!(!should_summarize("synchronize", Some("ai:summary")));
    }

    #[test]
    fn test_requires_phrase_in_body() {
        assert!(!should_summarize("opened", Some("Please review.")));
        assert!(!should_summarize("opened", None));
        assert!(!should_summarize("edited", Some("AI Generating summary...")));
    }

    #[test]
    fn test_phrase_may_be_embedded() {
        assert!(should_summarize("edited", Some("notes (ai:summary) here")));
    }
}

//! Parsing of the in-conversation "clear history" command.
//!
//! The phrase is matched case-insensitively and may be followed by an agent
//! name, a number of messages to preserve, or both. Trailing punctuation on
//! the arguments is tolerated. The phrase and the arguments it consumed are
//! cut out of the reply before it carries over into the chat.

use once_cell::sync::Lazy;
use regex::Regex;

static CLEAR_HISTORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(CLEAR\s+HISTORY)\b(?:\s+(\S+))?(?:\s+(\S+))?").unwrap());

/// A parsed command. `agent: None` scopes the clear to every participant and
/// the shared transcript; `keep_last: None` clears everything in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearHistoryCommand {
    pub agent: Option<String>,
    pub keep_last: Option<usize>,
}

fn strip_punctuation(token: &str) -> &str {
    token.trim_end_matches(['.', ',', '!', '?', ';', ':'])
}

fn cut_span(text: &str, start: usize, end: usize) -> String {
    let before = text[..start].trim_end();
    let after = text[end..].trim_start();
    match (before.is_empty(), after.is_empty()) {
        (true, true) => String::new(),
        (true, false) => after.to_string(),
        (false, true) => before.to_string(),
        (false, false) => format!("{before} {after}"),
    }
}

/// Scan `text` for the command. `known_agents` disambiguates an agent-name
/// argument from free text; an unrecognized first argument means a bare
/// clear-all command. Returns the command together with the reply text minus
/// the phrase and whichever arguments it consumed.
pub fn parse_clear_history(
    text: &str,
    known_agents: &[&str],
) -> Option<(ClearHistoryCommand, String)> {
    let captures = CLEAR_HISTORY_RE.captures(text)?;
    let phrase = captures.get(1)?;

    let first = captures.get(2);
    let second = captures.get(3);

    let Some(first) = first else {
        let command = ClearHistoryCommand {
            agent: None,
            keep_last: None,
        };
        return Some((command, cut_span(text, phrase.start(), phrase.end())));
    };

    let first_token = strip_punctuation(first.as_str());
    if let Ok(count) = first_token.parse::<usize>() {
        let command = ClearHistoryCommand {
            agent: None,
            keep_last: Some(count),
        };
        return Some((command, cut_span(text, phrase.start(), first.end())));
    }

    if known_agents.contains(&first_token) {
        let count = second.and_then(|m| strip_punctuation(m.as_str()).parse::<usize>().ok());
        let consumed_end = match (count, second) {
            (Some(_), Some(m)) => m.end(),
            _ => first.end(),
        };
        let command = ClearHistoryCommand {
            agent: Some(first_token.to_string()),
            keep_last: count,
        };
        return Some((command, cut_span(text, phrase.start(), consumed_end)));
    }

    // The phrase appeared but the argument is neither a count nor a known
    // agent; treat it as a bare clear-all and leave the argument in place.
    let command = ClearHistoryCommand {
        agent: None,
        keep_last: None,
    };
    Some((command, cut_span(text, phrase.start(), phrase.end())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENTS: &[&str] = &["coder", "critic"];

    #[test]
    fn bare_command_clears_everything() {
        let (cmd, rest) = parse_clear_history("Let's start over. CLEAR HISTORY", AGENTS).unwrap();
        assert_eq!(
            cmd,
            ClearHistoryCommand {
                agent: None,
                keep_last: None
            }
        );
        assert_eq!(rest, "Let's start over.");
    }

    #[test]
    fn count_only_preserves_the_tail() {
        let (cmd, rest) = parse_clear_history("CLEAR HISTORY 3", AGENTS).unwrap();
        assert_eq!(cmd.agent, None);
        assert_eq!(cmd.keep_last, Some(3));
        assert_eq!(rest, "");
    }

    #[test]
    fn agent_scope_is_recognized() {
        let (cmd, rest) = parse_clear_history("CLEAR HISTORY coder", AGENTS).unwrap();
        assert_eq!(cmd.agent.as_deref(), Some("coder"));
        assert_eq!(cmd.keep_last, None);
        assert_eq!(rest, "");
    }

    #[test]
    fn agent_and_count_combine() {
        let (cmd, rest) =
            parse_clear_history("please CLEAR HISTORY critic 2 thanks", AGENTS).unwrap();
        assert_eq!(cmd.agent.as_deref(), Some("critic"));
        assert_eq!(cmd.keep_last, Some(2));
        assert_eq!(rest, "please thanks");
    }

    #[test]
    fn trailing_punctuation_is_tolerated() {
        let (cmd, _) = parse_clear_history("CLEAR HISTORY coder.", AGENTS).unwrap();
        assert_eq!(cmd.agent.as_deref(), Some("coder"));

        let (cmd, _) = parse_clear_history("CLEAR HISTORY 5!", AGENTS).unwrap();
        assert_eq!(cmd.keep_last, Some(5));
    }

    #[test]
    fn unknown_argument_falls_back_to_clear_all() {
        let (cmd, rest) = parse_clear_history("CLEAR HISTORY everything", AGENTS).unwrap();
        assert_eq!(cmd.agent, None);
        assert_eq!(cmd.keep_last, None);
        // An unconsumed argument stays in the reply.
        assert_eq!(rest, "everything");
    }

    #[test]
    fn phrase_matches_case_insensitively() {
        let (cmd, rest) = parse_clear_history("fine, clear history critic 2", AGENTS).unwrap();
        assert_eq!(cmd.agent.as_deref(), Some("critic"));
        assert_eq!(cmd.keep_last, Some(2));
        assert_eq!(rest, "fine,");

        assert!(parse_clear_history("Clear History", AGENTS).is_some());
    }

    #[test]
    fn absent_phrase_parses_to_none() {
        assert!(parse_clear_history("nothing to see here", AGENTS).is_none());
        assert!(parse_clear_history("clearly historic", AGENTS).is_none());
    }
}

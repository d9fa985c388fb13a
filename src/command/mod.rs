//! Voice command classification
//!
//! Recognizes conversation-management phrases in a transcript. Anything
//! else is an ordinary request for the active agent.

use std::sync::LazyLock;

use regex::Regex;

/// What a transcript asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a fresh conversation and make it active
    NewConversation,
    /// Make the n-th (1-based) conversation active
    SwitchConversation(usize),
    /// Send the text to the active conversation's agent
    Request,
}

static NEW_CONVERSATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:(?:start|create|open|begin) (?:a )?)?new conversation\b")
        .expect("valid new-conversation pattern")
});

static SWITCH_CONVERSATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:switch to|go to|open|use) (?:conversation|session) (\d+|one|two|three|four|five|six|seven|eight|nine|ten)\b",
    )
    .expect("valid switch-conversation pattern")
});

/// Classify a transcript. Never fails; unmatched text is a request.
pub fn classify(transcript: &str) -> Command {
    if NEW_CONVERSATION.is_match(transcript) {
        return Command::NewConversation;
    }

    if let Some(n) = SWITCH_CONVERSATION
        .captures(transcript)
        .and_then(|caps| parse_number(&caps[1]))
    {
        return Command::SwitchConversation(n);
    }

    Command::Request
}

fn parse_number(word: &str) -> Option<usize> {
    if let Ok(n) = word.parse() {
        return Some(n);
    }

    let n = match word.to_ascii_lowercase().as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        _ => return None,
    };
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_phrases() {
        for phrase in [
            "new conversation",
            "Start a new conversation please",
            "create new conversation",
            "OPEN A NEW CONVERSATION",
            "let's begin new conversation.",
        ] {
            assert_eq!(classify(phrase), Command::NewConversation, "{phrase}");
        }
    }

    #[test]
    fn test_switch_with_digits() {
        assert_eq!(
            classify("Switch to conversation 2"),
            Command::SwitchConversation(2)
        );
        assert_eq!(classify("go to session 12"), Command::SwitchConversation(12));
    }

    #[test]
    fn test_switch_with_words() {
        assert_eq!(
            classify("switch to conversation two."),
            Command::SwitchConversation(2)
        );
        assert_eq!(classify("Use session Ten"), Command::SwitchConversation(10));
        assert_eq!(
            classify("open conversation three"),
            Command::SwitchConversation(3)
        );
    }

    #[test]
    fn test_new_checked_before_switch() {
        assert_eq!(
            classify("open new conversation and switch to conversation 1"),
            Command::NewConversation
        );
    }

    #[test]
    fn test_ordinary_requests() {
        for phrase in [
            "find cats",
            "switch to conversation eleven",
            "what's new in the conversation",
            "go to the session",
            "",
        ] {
            assert_eq!(classify(phrase), Command::Request, "{phrase}");
        }
    }
}

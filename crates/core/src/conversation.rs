//! Conversation turn history (§3).

use serde::{Deserialize, Serialize};

/// One completed exchange. Per-session history is mutated only when a
/// pipeline run completes successfully; filtered or errored runs leave it
/// unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

/// Renders prior turns as `User: …\nAssistant: …\n` blocks, the format the
/// LLM client family prefixes onto the new user line (§4.9 uses the same
/// convention for the RAG system-prompt injection).
pub fn render_history(history: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for turn in history {
        out.push_str("User: ");
        out.push_str(&turn.user);
        out.push('\n');
        out.push_str("Assistant: ");
        out.push_str(&turn.assistant);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_multiple_turns_in_order() {
        let history = vec![
            ConversationTurn { user: "hi".into(), assistant: "hello".into() },
            ConversationTurn { user: "bye".into(), assistant: "goodbye".into() },
        ];
        assert_eq!(
            render_history(&history),
            "User: hi\nAssistant: hello\nUser: bye\nAssistant: goodbye\n"
        );
    }

    #[test]
    fn renders_empty_history_as_empty_string() {
        assert_eq!(render_history(&[]), "");
    }
}

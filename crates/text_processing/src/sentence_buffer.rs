//! Streaming sentence boundary detection (§4.9).
//!
//! A sentence is the longest prefix of buffered text ending at the latest
//! clause boundary. The boundary search runs in priority order on every
//! `add`, so a later, stronger boundary always wins over an earlier, weaker
//! one within the same buffered text.

const EM_DASH: char = '\u{2014}';

/// Accumulates streamed text and peels off complete sentences as boundaries
/// appear.
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    buf: String,
}

fn find_boundary(text: &str) -> Option<usize> {
    find_terminator_boundary(text)
        .or_else(|| find_semicolon_or_dash_boundary(text))
        .or_else(|| find_long_comma_boundary(text))
}

/// Last `[.!?]` followed by whitespace; boundary is right after the
/// terminator.
fn find_terminator_boundary(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for i in (0..chars.len()).rev() {
        let (byte_idx, ch) = chars[i];
        if matches!(ch, '.' | '!' | '?') {
            let after = byte_idx + ch.len_utf8();
            if bytes.get(after).map(|b| b.is_ascii_whitespace()).unwrap_or(false)
                || text[after..].chars().next().map(|c| c.is_whitespace()).unwrap_or(false)
            {
                return Some(after);
            }
        }
    }
    None
}

/// Last `;` or em-dash followed by whitespace.
fn find_semicolon_or_dash_boundary(text: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for i in (0..chars.len()).rev() {
        let (byte_idx, ch) = chars[i];
        if ch == ';' || ch == EM_DASH {
            let after = byte_idx + ch.len_utf8();
            if text[after..].chars().next().map(|c| c.is_whitespace()).unwrap_or(false) {
                return Some(after);
            }
        }
    }
    None
}

/// Last comma occurring after more than 15 whitespace-separated tokens.
fn find_long_comma_boundary(text: &str) -> Option<usize> {
    let mut token_count = 0usize;
    let mut in_token = false;
    let mut last_qualifying_comma: Option<usize> = None;

    for (byte_idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_token = false;
        } else {
            if !in_token {
                token_count += 1;
                in_token = true;
            }
            if ch == ',' && token_count > 15 {
                last_qualifying_comma = Some(byte_idx + ch.len_utf8());
            }
        }
    }
    last_qualifying_comma
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and returns a complete sentence if a boundary is now
    /// present in the accumulated buffer.
    pub fn add(&mut self, text: &str) -> Option<String> {
        self.buf.push_str(text);
        let boundary = find_boundary(&self.buf)?;
        let sentence = self.buf[..boundary].trim().to_string();
        self.buf = self.buf[boundary..].to_string();
        if sentence.is_empty() {
            None
        } else {
            Some(sentence)
        }
    }

    /// Returns and clears any remaining buffered text, trimmed.
    pub fn flush(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buf);
        let trimmed = remainder.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_sentence_on_terminator_followed_by_whitespace() {
        let mut buf = SentenceBuffer::new();
        assert_eq!(buf.add("Hello. World"), Some("Hello.".to_string()));
    }

    #[test]
    fn no_boundary_without_trailing_whitespace() {
        let mut buf = SentenceBuffer::new();
        assert_eq!(buf.add("Hello.World"), None);
    }

    #[test]
    fn semicolon_boundary_used_when_no_terminator() {
        let mut buf = SentenceBuffer::new();
        assert_eq!(buf.add("first part; second part"), Some("first part;".to_string()));
    }

    #[test]
    fn long_comma_boundary_requires_over_15_tokens() {
        let mut buf = SentenceBuffer::new();
        let long_clause: String = (0..16).map(|i| format!("w{} ", i)).collect();
        let input = format!("{}, more text", long_clause.trim());
        let sentence = buf.add(&input);
        assert!(sentence.is_some());
        assert!(sentence.unwrap().ends_with(','));
    }

    #[test]
    fn short_comma_clause_is_not_a_boundary() {
        let mut buf = SentenceBuffer::new();
        assert_eq!(buf.add("a, b, c no boundary yet"), None);
    }

    #[test]
    fn flush_returns_remaining_trimmed_text() {
        let mut buf = SentenceBuffer::new();
        buf.add("partial remainder without terminator");
        assert_eq!(
            buf.flush(),
            Some("partial remainder without terminator".to_string())
        );
        assert_eq!(buf.flush(), None);
    }
}

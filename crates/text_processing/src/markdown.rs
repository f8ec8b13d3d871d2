//! Markdown stripper (§4.9): removes structural markup before text reaches
//! the TTS synthesizer, which only ever receives plain spoken prose.

use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    heading: Regex,
    bold_italic: Regex,
    strikethrough: Regex,
    inline_code: Regex,
    image: Regex,
    link: Regex,
    bullet: Regex,
    numbered: Regex,
    blockquote: Regex,
    horizontal_rule: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        heading: Regex::new(r"(?m)^#{1,6}\s+").unwrap(),
        bold_italic: Regex::new(r"\*\*\*|___|\*\*|__|\*|_").unwrap(),
        strikethrough: Regex::new(r"~~").unwrap(),
        inline_code: Regex::new(r"`([^`]*)`").unwrap(),
        image: Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap(),
        link: Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap(),
        bullet: Regex::new(r"(?m)^\s*[-*+]\s+").unwrap(),
        numbered: Regex::new(r"(?m)^\s*\d+[.)]\s+").unwrap(),
        blockquote: Regex::new(r"(?m)^\s*>\s?").unwrap(),
        horizontal_rule: Regex::new(r"(?m)^\s*([-*_])\s*(?:\1\s*){2,}$").unwrap(),
    })
}

/// Strips headings, emphasis, strikethrough, inline code, link/image
/// wrappers (keeping link text), bullets, numbered markers, blockquotes and
/// horizontal rules.
pub fn strip_markdown(text: &str) -> String {
    let p = patterns();
    let mut out = text.to_string();
    out = p.image.replace_all(&out, "").to_string();
    out = p.link.replace_all(&out, "$1").to_string();
    out = p.inline_code.replace_all(&out, "$1").to_string();
    out = p.heading.replace_all(&out, "").to_string();
    out = p.horizontal_rule.replace_all(&out, "").to_string();
    out = p.blockquote.replace_all(&out, "").to_string();
    out = p.bullet.replace_all(&out, "").to_string();
    out = p.numbered.replace_all(&out, "").to_string();
    out = p.strikethrough.replace_all(&out, "").to_string();
    out = p.bold_italic.replace_all(&out, "").to_string();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_heading_markers() {
        assert_eq!(strip_markdown("## Title"), "Title");
    }

    #[test]
    fn strips_bold_and_italic() {
        assert_eq!(strip_markdown("**bold** and *italic*"), "bold and italic");
    }

    #[test]
    fn keeps_link_text_drops_url() {
        assert_eq!(strip_markdown("[click here](http://example.com)"), "click here");
    }

    #[test]
    fn drops_images_entirely() {
        assert_eq!(strip_markdown("before ![alt](img.png) after"), "before  after");
    }

    #[test]
    fn strips_bullets_and_numbered_markers() {
        assert_eq!(strip_markdown("- one\n1. two"), "one\ntwo");
    }

    #[test]
    fn strips_blockquote_marker() {
        assert_eq!(strip_markdown("> quoted text"), "quoted text");
    }
}

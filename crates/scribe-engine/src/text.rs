//! Small text helpers: prompt rendering, the word-count precondition
//! metric, and cosmetic normalization of generated summaries.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Runs of whitespace, including newlines.
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("valid regex");

    /// Leading bullet or list markers models sometimes prepend.
    static ref LEADING_MARKER: Regex = Regex::new(r"^[\-\*\u{2022}]+\s*").expect("valid regex");
}

/// Render a prompt template by substituting its `{}` placeholder.
///
/// Only the first placeholder is substituted; templates without one are
/// returned unchanged.
pub fn render_template(template: &str, contents: &str) -> String {
    template.replacen("{}", contents, 1)
}

/// Whitespace-separated word count, the metric for the prompt-size
/// precondition.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Normalize a generated summary into one clean sentence.
///
/// Collapses whitespace runs, strips wrapping quotes/backticks and leading
/// list markers, and ensures terminal punctuation. Cosmetic only; the
/// model's wording is untouched.
pub fn format_sentence(raw: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(raw.trim(), " ");
    let mut text = collapsed
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string();

    if let Some(stripped) = LEADING_MARKER.find(&text) {
        text = text[stripped.end()..].to_string();
    }

    if !text.is_empty() && !text.ends_with(['.', '!', '?']) {
        text.push('.');
    }

    text
}

/// Derive a generation budget from the prompt's own length.
///
/// Shorter prompts get a larger budget: the word count is subtracted from
/// the ceiling, then clamped to `[floor, default_budget]`.
pub fn derive_token_budget(default_budget: u32, ceiling: u32, floor: u32, prompt: &str) -> u32 {
    let words = word_count(prompt) as u32;
    ceiling
        .saturating_sub(words)
        .min(default_budget)
        .max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        assert_eq!(
            render_template("Summarize this code:\n{}", "fn main() {}"),
            "Summarize this code:\nfn main() {}"
        );
        // Only the first placeholder is filled.
        assert_eq!(render_template("{} and {}", "a"), "a and {}");
        assert_eq!(render_template("no placeholder", "x"), "no placeholder");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("one"), 1);
        assert_eq!(word_count("  spaced\tout\nwords  "), 3);
    }

    #[test]
    fn test_format_sentence_collapses_whitespace() {
        assert_eq!(
            format_sentence("  This file\n\n  defines   the parser. "),
            "This file defines the parser."
        );
    }

    #[test]
    fn test_format_sentence_strips_wrapping() {
        assert_eq!(
            format_sentence("\"A quoted summary\""),
            "A quoted summary."
        );
        assert_eq!(format_sentence("- A bullet summary."), "A bullet summary.");
        assert_eq!(format_sentence("`code-ish summary`"), "code-ish summary.");
    }

    #[test]
    fn test_format_sentence_adds_terminal_punctuation() {
        assert_eq!(format_sentence("Implements the cache"), "Implements the cache.");
        assert_eq!(format_sentence("Really?"), "Really?");
        assert_eq!(format_sentence(""), "");
    }

    #[test]
    fn test_format_sentence_idempotent_on_clean_input() {
        let clean = "Implements the response cache.";
        assert_eq!(format_sentence(clean), clean);
        assert_eq!(format_sentence(&format_sentence(clean)), clean);
    }

    #[test]
    fn test_derive_token_budget_shrinks_with_length() {
        // 4000-word ceiling, 650 default, 50 floor.
        let short = derive_token_budget(650, 4000, 50, "short prompt");
        assert_eq!(short, 650);

        let long_prompt = "word ".repeat(3900);
        let long = derive_token_budget(650, 4000, 50, &long_prompt);
        assert_eq!(long, 100);

        let huge_prompt = "word ".repeat(5000);
        let huge = derive_token_budget(650, 4000, 50, &huge_prompt);
        assert_eq!(huge, 50);
    }
}

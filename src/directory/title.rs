//! Chat title normalization
//!
//! Titles are generated by a model and often arrive wrapped in quotes,
//! prefixed with "Title:", or followed by stray numbering.

use regex::Regex;
use std::sync::OnceLock;

/// Title shown when nothing usable remains
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum number of words kept in a title
pub const MAX_TITLE_WORDS: usize = 10;

const QUOTES: &[char] = &['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

/// Rules applied when normalizing titles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitlePolicy {
    /// Replacement for titles with no alphanumeric content
    pub default_title: String,
    /// Word cap
    pub max_words: usize,
}

impl Default for TitlePolicy {
    fn default() -> Self {
        Self {
            default_title: DEFAULT_TITLE.to_string(),
            max_words: MAX_TITLE_WORDS,
        }
    }
}

fn trailing_number_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\s*\n\s*\d+)+\s*$").expect("valid regex"))
}

fn quote_then_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(["'`\u{201D}\u{2019}])\d+\s*$"#).expect("valid regex"))
}

fn title_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:title|conversation start)\s*[:\-\u{2013}]?\s*").expect("valid regex")
    })
}

impl TitlePolicy {
    /// Normalizes a raw title
    ///
    /// # Examples
    ///
    /// ```
    /// use pqsync::directory::TitlePolicy;
    ///
    /// let policy = TitlePolicy::default();
    /// assert_eq!(policy.sanitize("Title: \"Hello World\"\n0"), "Hello World");
    /// assert_eq!(policy.sanitize("?!..."), "New Chat");
    /// ```
    pub fn sanitize(&self, raw: &str) -> String {
        let mut title = raw.trim().to_string();
        title = trailing_number_lines().replace(&title, "").into_owned();
        title = quote_then_number().replace(&title, "$1").into_owned();

        // Prefixes and quotes can nest in either order
        for _ in 0..3 {
            let stripped = title_prefix().replace(&title, "");
            let stripped = stripped.trim().trim_matches(QUOTES).trim().to_string();
            if stripped == title {
                break;
            }
            title = stripped;
        }

        let title = title
            .split_whitespace()
            .take(self.max_words)
            .collect::<Vec<_>>()
            .join(" ");

        if title.chars().any(char::is_alphanumeric) {
            title
        } else {
            self.default_title.clone()
        }
    }
}

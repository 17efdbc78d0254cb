//! Extraction of embedded reasoning segments
//!
//! Models that stream their reasoning inline wrap it in `<thinking>` or
//! `<think>` tags. The enclosed text is moved out of the displayed content.
//! An unterminated tag consumes everything up to the end of the content.

/// Delimiter pairs recognised as reasoning blocks
const TAGS: [(&str, &str); 2] = [("<thinking>", "</thinking>"), ("<think>", "</think>")];

/// Content with reasoning segments separated out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingSplit {
    /// Content with every reasoning block removed
    pub content: String,
    /// Reasoning segments joined by blank lines, if any were found
    pub reasoning: Option<String>,
}

/// Splits `<thinking>`/`<think>` blocks out of `content`
///
/// # Examples
///
/// ```
/// use pqsync::messages::extract_thinking;
///
/// let split = extract_thinking("<think>plan the answer</think>The answer is 4.");
/// assert_eq!(split.content, "The answer is 4.");
/// assert_eq!(split.reasoning.as_deref(), Some("plan the answer"));
/// ```
pub fn extract_thinking(content: &str) -> ThinkingSplit {
    let mut display = String::with_capacity(content.len());
    let mut segments: Vec<String> = Vec::new();
    let mut rest = content;
    let mut found = false;

    while let Some((start, open, close)) = next_open_tag(rest) {
        found = true;
        display.push_str(&rest[..start]);
        let inner_start = start + open.len();

        let (inner, remainder) = match rest[inner_start..].find(close) {
            Some(offset) => (
                &rest[inner_start..inner_start + offset],
                &rest[inner_start + offset + close.len()..],
            ),
            None => (&rest[inner_start..], ""),
        };

        let inner = inner.trim();
        if !inner.is_empty() {
            segments.push(inner.to_string());
        }
        rest = remainder;
    }
    display.push_str(rest);

    if !found {
        return ThinkingSplit {
            content: content.to_string(),
            reasoning: None,
        };
    }

    ThinkingSplit {
        content: display.trim().to_string(),
        reasoning: (!segments.is_empty()).then(|| segments.join("\n\n")),
    }
}

/// Finds the earliest opening tag in `text`
fn next_open_tag(text: &str) -> Option<(usize, &'static str, &'static str)> {
    TAGS.iter()
        .filter_map(|(open, close)| text.find(open).map(|pos| (pos, *open, *close)))
        .min_by_key(|(pos, _, _)| *pos)
}

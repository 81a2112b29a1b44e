//! Inline emphasis markup.
//!
//! Markers are applied one pattern at a time, most specific first. A segment
//! styled by an earlier pattern is never rescanned, so markers do not nest.

use crate::models::{EmphasisStyle, StyledSpan};
use regex::Regex;
use std::sync::OnceLock;

const PATTERNS: [(&str, EmphasisStyle); 4] = [
    (r"(?s)\*\*\*(.+?)\*\*\*", EmphasisStyle::BoldItalic),
    (r"(?s)\*\*(.+?)\*\*", EmphasisStyle::Bold),
    (r"(?s)\*(.+?)\*", EmphasisStyle::Italic),
    (r"(?s)_(.+?)_", EmphasisStyle::Underline),
];

fn compiled_patterns() -> &'static [(Regex, EmphasisStyle)] {
    static COMPILED: OnceLock<Vec<(Regex, EmphasisStyle)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|(pattern, style)| {
                // Literal patterns above; a failure here is a programming error.
                let regex = Regex::new(pattern).expect("emphasis pattern compiles");
                (regex, *style)
            })
            .collect()
    })
}

/// Splits `input` into styled runs. Never fails; unbalanced markers stay literal.
pub fn parse_markup(input: &str) -> Vec<StyledSpan> {
    if input.is_empty() {
        return Vec::new();
    }

    let mut segments = vec![StyledSpan::plain(input)];

    for (pattern, style) in compiled_patterns() {
        segments = segments
            .into_iter()
            .flat_map(|segment| {
                if segment.style.is_some() {
                    vec![segment]
                } else {
                    split_segment(&segment.text, pattern, *style)
                }
            })
            .collect();
    }

    segments
}

fn split_segment(text: &str, pattern: &Regex, style: EmphasisStyle) -> Vec<StyledSpan> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    for captures in pattern.captures_iter(text) {
        let (Some(whole), Some(content)) = (captures.get(0), captures.get(1)) else {
            continue;
        };

        if whole.start() > cursor {
            spans.push(StyledSpan::plain(&text[cursor..whole.start()]));
        }
        spans.push(StyledSpan::styled(content.as_str(), style));
        cursor = whole.end();
    }

    if cursor < text.len() {
        spans.push(StyledSpan::plain(&text[cursor..]));
    }

    spans
}

/// Re-emits markup for parsed spans. `render_markup(&parse_markup(s)) == s`.
pub fn render_markup(spans: &[StyledSpan]) -> String {
    spans.iter().map(StyledSpan::to_markup).collect()
}

pub fn plain_text(spans: &[StyledSpan]) -> String {
    spans.iter().map(|span| span.text.as_str()).collect()
}

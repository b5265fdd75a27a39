//! Field-value cleanup shared by the company and label heuristics.

use crate::keywords::{Keywords, TAG_MARKERS};

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4e00}'..='\u{9fff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{f900}'..='\u{faff}'
        | '\u{20000}'..='\u{2a6df}')
}

fn is_kept_char(c: char) -> bool {
    c.is_alphanumeric()
        || c.is_whitespace()
        || is_cjk_ideograph(c)
        || matches!(c, ':' | '：' | '.' | '-' | '(' | ')' | '+')
}

/// Cut at the first tag marker, drop symbols and emoji, strip a leading
/// role/posting label, then trim.
///
/// The cut happens first: filtering before it would let the body of a
/// trailing hashtag survive as plain text.
pub fn clean(text: &str, keywords: &Keywords) -> String {
    let head = match text.find(&TAG_MARKERS[..]) {
        Some(idx) => &text[..idx],
        None => text,
    };
    let filtered = head.chars().filter(|c| is_kept_char(*c)).collect::<String>();
    keywords.strip_label(filtered.trim_start()).trim().to_string()
}

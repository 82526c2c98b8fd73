//! Canonicalization of extracted text before tokenization.
//!
//! PDF extraction leaves layout artifacts: non-breaking spaces, blank-line
//! runs, and hard line wraps in the middle of sentences. [`normalize_text`]
//! rejoins wrapped prose while keeping numbered clauses (`12.3 Payment ...`)
//! on their own lines.

const NBSP: char = '\u{a0}';

/// Normalize raw extracted text.
///
/// 1. Non-breaking spaces become ordinary spaces.
/// 2. Runs of consecutive `\n` collapse to one.
/// 3. A `\n` immediately preceded or followed by an ASCII digit is kept;
///    every other `\n` becomes a single space.
/// 4. Leading and trailing whitespace is stripped.
///
/// Pure and infallible.
pub fn normalize_text(raw: &str) -> String {
    let mut collapsed: Vec<char> = Vec::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c == NBSP { ' ' } else { c };
        if c == '\n' && collapsed.last() == Some(&'\n') {
            continue;
        }
        collapsed.push(c);
    }

    let mut out = String::with_capacity(collapsed.len());
    for (i, &c) in collapsed.iter().enumerate() {
        if c != '\n' {
            out.push(c);
            continue;
        }
        let prev_digit = i > 0 && collapsed[i - 1].is_ascii_digit();
        let next_digit = collapsed
            .get(i + 1)
            .is_some_and(|n| n.is_ascii_digit());
        out.push(if prev_digit || next_digit { '\n' } else { ' ' });
    }

    out.trim().to_string()
}

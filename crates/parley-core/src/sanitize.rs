//! Cleaning of user-supplied names and message text.
//!
//! Markup characters are HTML-escaped and control characters are dropped.
//! Length limits count characters and are applied before escaping, so an
//! entity is never cut in half.
//!
//! "Characters" are Unicode scalar values, not UTF-16 code units: a name of
//! 20 emoji is kept whole even though it spans 40 UTF-16 units.

pub const MAX_NAME_LEN: usize = 20;
pub const DEFAULT_NICKNAME: &str = "Guest";

fn escape_char(c: char, out: &mut String) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#x27;"),
        c => out.push(c),
    }
}

fn clean(raw: &str, max_len: usize, keep_newlines: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    raw.chars()
        .filter(|c| !c.is_control() || (keep_newlines && (*c == '\n' || *c == '\t')))
        .take(max_len)
        .for_each(|c| escape_char(c, &mut out));
    out
}

/// Sanitize a candidate display name. Never returns an empty string.
pub fn display_name(raw: &str, max_len: usize, fallback: &str) -> String {
    let name = clean(raw.trim(), max_len, false);
    let name = name.trim();
    if name.is_empty() {
        fallback.to_owned()
    } else {
        name.to_owned()
    }
}

/// Sanitize message text. Returns `None` when nothing printable remains.
pub fn message_content(raw: &str, max_len: usize) -> Option<String> {
    let content = clean(raw, max_len, true);
    if content.trim().is_empty() {
        None
    } else {
        Some(content)
    }
}

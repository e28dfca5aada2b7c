//! Logging helpers that keep every log record on a single line.
//! Message text and sender names come off the air and may contain anything.

const MAX_PREVIEW: usize = 120;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - other control characters => `\\xNN`
///
/// Long strings are cut at [`MAX_PREVIEW`] characters with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Compact repeater chain for logs: `8D>A8`, or `direct` for an empty chain.
pub fn fmt_chain<S: AsRef<str>>(hashes: &[S]) -> String {
    if hashes.is_empty() {
        return "direct".to_string();
    }
    hashes
        .iter()
        .map(|h| h.as_ref().to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(">")
}

//! Literal syntax detection.
//!
//! A command line ending in `{N}` or `{N+}` declares a following literal of
//! exactly `N` octets. `LITERAL+` (the non-synchronizing `{N+}` form that
//! skips the `+ ` continuation) is out of scope; a `{N+}` suffix is still
//! recognized syntactically but always answered with a synchronizing
//! continuation rather than rejecting the syntax outright.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralSpec {
    pub size: u32,
    pub non_synchronizing: bool,
}

/// If `line` ends with a `{N}` or `{N+}` literal marker, returns the literal
/// size and the line with the marker stripped.
pub fn detect_trailing_literal(line: &str) -> Option<(LiteralSpec, &str)> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let body = trimmed.strip_suffix('}')?;
    let open = body.rfind('{')?;
    let inner = &body[open + 1..];
    let (digits, non_synchronizing) = match inner.strip_suffix('+') {
        Some(d) => (d, true),
        None => (inner, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let size: u32 = digits.parse().ok()?;
    Some((LiteralSpec { size, non_synchronizing }, &trimmed[..open]))
}

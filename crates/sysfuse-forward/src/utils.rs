/// Maximum length of a response body kept in an error.
pub const MAX_BODY_LENGTH: usize = 512;

/// Truncate a string to at most `max_len` bytes, snapping to a char boundary.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

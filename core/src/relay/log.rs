//! Log helpers shared by the relay: bounded message content for `content=` fields.

use std::borrow::Cow;

const CONTENT_LOG_MAX_LEN: usize = 120;

/// Truncate message content for logging (avoid huge dumps). Cuts on a char boundary.
#[inline]
pub fn truncate_content(content: &str, max_len: usize) -> Cow<'_, str> {
    if content.len() <= max_len {
        return Cow::Borrowed(content);
    }
    let mut cut = max_len;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    Cow::Owned(format!("{}... ({} bytes)", &content[..cut], content.len()))
}

#[inline]
pub fn truncate_content_default(content: &str) -> Cow<'_, str> {
    truncate_content(content, CONTENT_LOG_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_borrowed() {
        assert!(matches!(truncate_content_default("hi"), Cow::Borrowed("hi")));
    }

    #[test]
    fn long_content_reports_size() {
        assert_eq!(truncate_content("abcdef", 3), "abc... (6 bytes)");
        assert_eq!(truncate_content("aé", 2), "a... (3 bytes)");
    }
}

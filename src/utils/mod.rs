//! Utility functions and helpers.

pub mod http;
pub mod time;
pub mod url;

/// Truncate a string to at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Reduce a keyword to a short filesystem-safe prefix for debug files.
pub fn safe_name(s: &str, max_len: usize) -> String {
    let cleaned: String = s.chars().filter(|c| c.is_alphanumeric()).take(max_len).collect();
    if cleaned.is_empty() {
        "kw".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("自动化学会成立", 4), "自动化学");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("王飞跃", 20), "王飞跃");
        assert_eq!(safe_name("a/b:c", 20), "abc");
        assert_eq!(safe_name("!!!", 20), "kw");
    }
}

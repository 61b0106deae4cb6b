//! Text and clock helpers for config parsing, delivery errors and listings.

/// Longest server message kept on a failed queue item
pub const MAX_MESSAGE_CHARS: usize = 180;

/// Trimmed text, or `None` when nothing but whitespace was given.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Trimmed, non-empty value of `name` read through an env-style lookup
pub fn lookup_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Collapse whitespace runs (HTML error pages, multi-line bodies) and cap the
/// result at [`MAX_MESSAGE_CHARS`].
pub fn clip_message(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_MESSAGE_CHARS)
        .collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn blank_text_normalizes_to_none() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t\n".to_string())), None);
        assert_eq!(
            normalize_text_option(Some("  reports ".to_string())),
            Some("reports".to_string())
        );
    }

    #[test]
    fn lookup_trimmed_skips_blank_variables() {
        let lookup = |name: &str| match name {
            "SET" => Some(" value ".to_string()),
            "BLANK" => Some("   ".to_string()),
            _ => None,
        };
        assert_eq!(lookup_trimmed(lookup, "SET"), Some("value".to_string()));
        assert_eq!(lookup_trimmed(lookup, "BLANK"), None);
        assert_eq!(lookup_trimmed(lookup, "UNSET"), None);
    }

    #[test]
    fn clip_message_flattens_and_caps() {
        assert_eq!(
            clip_message("<html>\n  <body>Bad   Gateway</body>\n</html>"),
            "<html> <body>Bad Gateway</body> </html>"
        );
        assert_eq!(clip_message(&"x".repeat(500)).len(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn http_url_needs_scheme() {
        assert!(is_http_url("https://api.example.com"));
        assert!(!is_http_url("ftp://api.example.com"));
    }
}

/// HTML and data sanitization utilities

/// Sanitizes HTML content for the `cleanedContent.html` field of a webhook
/// payload, stripping scripts/event handlers while keeping safe formatting
/// tags intact.
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_html() {
        let cleaned = sanitize_html("<script>alert('xss')</script><p>hello</p>");
        assert!(!cleaned.contains("<script>"));
        assert!(cleaned.contains("hello"));
        assert!(cleaned.contains("<p>"));
    }

    #[test]
    fn test_sanitize_html_strips_event_handlers() {
        let cleaned = sanitize_html(r#"<a href="#" onclick="evil()">link</a>"#);
        assert!(!cleaned.contains("onclick"));
        assert!(cleaned.contains("link"));
    }
}

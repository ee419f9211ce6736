//! Predicates backing the nutype constructors in [`crate::types`].

/// Stream ids end up in `TEXT` columns and in single-line log records. Postgres
/// refuses NUL in text values, and a newline would split a log line, so no
/// control character is allowed anywhere in the id.
pub(crate) fn printable_stream_id(raw: &str) -> bool {
    !raw.chars().any(char::is_control)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_ids_are_printable() {
        assert!(printable_stream_id("orders-42"));
        assert!(printable_stream_id("contract::basic::stream::0190a7d2"));
        assert!(printable_stream_id("tenant/orders/Zürich"));
    }

    #[test]
    fn nul_and_line_breaks_are_refused() {
        assert!(!printable_stream_id("orders\0"));
        assert!(!printable_stream_id("orders\n42"));
        assert!(!printable_stream_id("orders\t42"));
    }
}

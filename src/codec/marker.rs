//! Scalar metadata codec and marker-line grammar.
//!
//! A marker line is a single HTML comment of the form
//! `<!-- <ns>:task:<field>:<value> -->`. The value is passed through
//! [`encode`], which base64-escapes anything that cannot survive the line
//! grammar (newlines, the `-->` terminator, leading or trailing
//! whitespace) or that would be mistaken for an already-encoded blob.
//! [`decode`] inverts this unconditionally, so arbitrary values always
//! round-trip exactly.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Prefix marking a base64-escaped value.
pub const ENCODED_PREFIX: &str = "base64:";

/// Marker namespace for the root task of a document.
pub const NS_ROOT: &str = "taskmirror";

/// Marker namespace for descendant tasks embedded in a document.
pub const NS_SUB: &str = "taskmirror.sub";

/// Prefix of the legacy single-line id marker written before the full
/// metadata block existed.
pub const LEGACY_ID_PREFIX: &str = "<!-- taskmirror-id:";

/// Encode a scalar value for embedding in a marker line.
///
/// Values containing a newline or the comment terminator would break the
/// line grammar, values with leading or trailing whitespace would lose it
/// to the parser's trimming, and values that already start with the
/// encoded prefix would be mis-decoded; all of those are escaped.
/// Everything else is returned unchanged.
pub fn encode(value: &str) -> String {
    let unsafe_value = value.contains('\n')
        || value.contains('\r')
        || value.contains("-->")
        || value.starts_with(ENCODED_PREFIX)
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if unsafe_value {
        format!("{}{}", ENCODED_PREFIX, BASE64.encode(value.as_bytes()))
    } else {
        value.to_string()
    }
}

/// Invert [`encode`]. Decoding a non-prefixed token is the identity; an
/// undecodable blob after the prefix falls back to the raw remainder.
pub fn decode(token: &str) -> String {
    match token.strip_prefix(ENCODED_PREFIX) {
        Some(blob) => BASE64
            .decode(blob.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| blob.to_string()),
        None => token.to_string(),
    }
}

/// Render one marker line for a task field.
pub fn marker_line(ns: &str, field: &str, value: &str) -> String {
    format!("<!-- {}:task:{}:{} -->", ns, field, encode(value))
}

/// Parse a marker line in the given namespace, returning the field name and
/// the decoded value. Lines that are not markers of that namespace yield
/// `None`.
pub fn parse_marker(line: &str, ns: &str) -> Option<(String, String)> {
    let inner = line.trim().strip_prefix("<!--")?.strip_suffix("-->")?.trim();
    let rest = inner.strip_prefix(ns)?.strip_prefix(":task:")?;
    let (field, raw) = rest.split_once(':')?;
    Some((field.to_string(), decode(raw)))
}

/// Parse the legacy single-line id marker, `<!-- taskmirror-id: <id> -->`.
pub fn parse_legacy_id(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(LEGACY_ID_PREFIX)?;
    let id = rest.strip_suffix("-->")?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(encode("abc-123"), "abc-123");
        assert_eq!(decode("abc-123"), "abc-123");
    }

    #[test]
    fn unsafe_values_are_escaped_and_round_trip() {
        for value in [
            "line one\nline two",
            "ends a comment --> here",
            "base64:already",
            "\r\n",
            " leading space",
            "trailing spaces   ",
        ] {
            let token = encode(value);
            assert!(token.starts_with(ENCODED_PREFIX), "{value:?} should be escaped");
            assert!(!token.contains('\n'));
            assert_eq!(decode(&token), value);
        }
    }

    #[test]
    fn marker_line_round_trips_colons_in_value() {
        let line = marker_line(NS_ROOT, "commit_url", "https://example.com/c/1");
        let (field, value) = parse_marker(&line, NS_ROOT).unwrap();
        assert_eq!(field, "commit_url");
        assert_eq!(value, "https://example.com/c/1");
    }

    #[test]
    fn namespaces_do_not_cross_match() {
        let line = marker_line(NS_SUB, "id", "t1");
        assert!(parse_marker(&line, NS_ROOT).is_none());
        assert!(parse_marker(&line, NS_SUB).is_some());
    }

    #[test]
    fn legacy_id_marker_parses() {
        assert_eq!(parse_legacy_id("<!-- taskmirror-id: abc -->").as_deref(), Some("abc"));
        assert_eq!(parse_legacy_id("<!-- taskmirror:task:id:abc -->"), None);
    }
}

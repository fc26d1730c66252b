//! JSON encoding for request payloads.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;

/// Compact formatter that optionally escapes HTML-significant characters.
///
/// U+2028 and U+2029 are always escaped so the output is safe to embed in
/// JavaScript source.
#[derive(Debug, Clone, Copy)]
struct EscapingFormatter {
    escape_html: bool,
}

impl Formatter for EscapingFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' if self.escape_html => "\\u003c",
                '>' if self.escape_html => "\\u003e",
                '&' if self.escape_html => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..index].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize `value` as compact JSON.
///
/// # Errors
///
/// Fails when `value` cannot be represented as JSON, e.g. a map with
/// non-string keys.
pub fn to_vec<T: Serialize + ?Sized>(value: &T, escape_html: bool) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(128);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, EscapingFormatter { escape_html });
    value.serialize(&mut serializer)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Data;

    #[test]
    fn escapes_html_when_asked() {
        let data = Data::from([("msg", "hi&hello<b>")]);
        let encoded = String::from_utf8(to_vec(&data, true).unwrap()).unwrap();
        assert_eq!(encoded, r#"{"msg":"hi\u0026hello\u003cb\u003e"}"#);
    }

    #[test]
    fn keeps_html_literal_otherwise() {
        let data = Data::from([("msg", "hi&hello<b>")]);
        let encoded = String::from_utf8(to_vec(&data, false).unwrap()).unwrap();
        assert_eq!(encoded, r#"{"msg":"hi&hello<b>"}"#);
    }

    #[test]
    fn line_separators_always_escaped() {
        let encoded = String::from_utf8(to_vec("a\u{2028}b", false).unwrap()).unwrap();
        assert_eq!(encoded, r#""a\u2028b""#);
    }

    #[test]
    fn escaped_output_decodes_to_original() {
        let data = Data::from([("msg", "hi&hello")]);
        let encoded = to_vec(&data, true).unwrap();
        let decoded: Data = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn non_string_keys_fail() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1_u8], 1);
        assert!(to_vec(&map, false).is_err());
    }
}

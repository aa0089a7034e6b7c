//! Parsed message headers.

use mailparse::MailParseError;
use std::collections::HashMap;

/// Header set of one message.
///
/// Lookups are case-insensitive. When a header occurs more than once the
/// last occurrence wins. Values are decoded (RFC 2047 encoded words,
/// unfolded continuation lines).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    values: HashMap<String, String>,
}

impl Headers {
    /// Parses a raw header block (or a whole message; parsing stops at the
    /// first empty line).
    ///
    /// # Errors
    ///
    /// Returns the parse error if the block is not a valid header section.
    pub fn parse(raw: &[u8]) -> Result<Self, MailParseError> {
        let (parsed, _) = mailparse::parse_headers(raw)?;
        Ok(parsed
            .iter()
            .map(|header| (header.get_key(), header.get_value()))
            .collect())
    }

    /// Returns the value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    /// Sets a header, replacing any earlier value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Returns the `From` header.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.get("From")
    }

    /// Returns the `Subject` header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get("Subject")
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(lowercased name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::default();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        let raw = b"From: a@example.org\r\nSUBJECT: hi\r\n\r\nbody text";
        let headers = Headers::parse(raw).unwrap();

        assert_eq!(headers.get("from"), Some("a@example.org"));
        assert_eq!(headers.get("FROM"), Some("a@example.org"));
        assert_eq!(headers.subject(), Some("hi"));
        assert_eq!(headers.len(), 2);
        assert!(headers.get("body text").is_none());
    }

    #[test]
    fn test_last_value_wins() {
        let raw = b"Received: first\r\nreceived: second\r\n\r\n";
        let headers = Headers::parse(raw).unwrap();
        assert_eq!(headers.get("Received"), Some("second"));
    }

    #[test]
    fn test_decodes_encoded_words() {
        let raw = "Subject: =?UTF-8?B?0J/RgNC40LLQtdGC?=\r\n\r\n".as_bytes();
        let headers = Headers::parse(raw).unwrap();
        assert_eq!(headers.subject(), Some("Привет"));
    }

    #[test]
    fn test_from_iterator() {
        let headers: Headers = [("From", "a@x"), ("from", "b@x")].into_iter().collect();
        assert_eq!(headers.sender(), Some("b@x"));
        assert!(headers.contains("FROM"));
    }
}

//! Bounce-address extraction.
//!
//! The scanner hands every included message to a [`BounceExtractor`]. The
//! default [`DsnExtractor`] understands delivery status notifications and the
//! common non-delivery report layouts; [`RegexExtractor`] and
//! [`ClosureExtractor`] let callers plug in their own heuristics.
//!
//! ```
//! use fail_email_extractor::extractor::{BounceExtractor, DsnExtractor};
//! use fail_email_extractor::Headers;
//!
//! let raw = b"From: MAILER-DAEMON@mx.example.org\r\n\
//! Subject: Undelivered Mail Returned to Sender\r\n\
//! \r\n\
//! <bob@y.com>: host mx.y.com said: 550 5.1.1 User unknown\r\n";
//!
//! let headers = Headers::parse(raw).unwrap();
//! assert_eq!(DsnExtractor.extract(&headers, raw).as_deref(), Some("bob@y.com"));
//! ```

use crate::headers::Headers;
use crate::parser::{self, MessageText};
use email_address::EmailAddress;
use regex::Regex;
use std::sync::LazyLock;

/// Extracts the failing recipient from one message.
///
/// Returning `None` means "not a bounce" and is not an error.
pub trait BounceExtractor: Send + Sync {
    /// Inspects a message given its headers and raw content.
    fn extract(&self, headers: &Headers, raw: &[u8]) -> Option<String>;

    /// Returns a human-readable description used in logs.
    fn description(&self) -> &str;
}

static FINAL_RECIPIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*final-recipient[ \t]*:[ \t]*(?:[a-z0-9-]+[ \t]*;)?[ \t]*<?([^\s<>;]+@[^\s<>;]+)")
        .expect("valid regex")
});

static ORIGINAL_RECIPIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*original-recipient[ \t]*:[ \t]*(?:[a-z0-9-]+[ \t]*;)?[ \t]*<?([^\s<>;]+@[^\s<>;]+)")
        .expect("valid regex")
});

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+")
        .expect("valid regex")
});

/// Subjects MTAs put on non-delivery reports. Anchored, so replies and
/// forwards (`Re:`, `Fwd:`) do not match.
static BOUNCE_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:undelivered mail returned to sender|mail delivery failed|failure notice|returned mail|undeliverable|delivery failure)\b|delivery status notification \(failure\))",
    )
    .expect("valid regex")
});

/// Diagnostic wording found in the body of non-delivery reports.
static NDR_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)could ?n[o']t be delivered|delivery (?:has )?failed|permanent (?:error|failure)|failed permanently|user unknown|no such (?:user|mailbox)|mailbox (?:unavailable|not found|does not exist)|recipient address rejected|\b5\.[0-7]\.[0-9]{1,3}\b",
    )
    .expect("valid regex")
});

/// Where the quoted original message starts in common NDR layouts.
static ORIGINAL_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^.*(?:this is a copy of the message|below this line is a copy|original message follows|-----\s*original message\s*-----|the header of the original message|^\s*return-path:).*$",
    )
    .expect("valid regex")
});

const DAEMON_LOCAL_PARTS: [&str; 3] = ["mailer-daemon", "postmaster", "mail-daemon"];

/// Default extractor for delivery status notifications.
///
/// Tried in order:
/// 1. the `X-Failed-Recipients` header;
/// 2. `Final-Recipient`, then `Original-Recipient`, in delivery-status text;
/// 3. for messages that look like bounces (daemon sender, `multipart/report`,
///    or a failure subject backed by delivery-failure wording in the body),
///    the first address in the notice text before the quoted original,
///    ignoring the notice's own `From` and `To`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DsnExtractor;

impl DsnExtractor {
    fn looks_like_bounce(headers: &Headers, text: &MessageText) -> bool {
        let daemon_sender = headers
            .sender()
            .and_then(single_address)
            .is_some_and(|addr| is_daemon(&addr));

        if daemon_sender || text.content_type == "multipart/report" {
            return true;
        }

        // A subject alone is too weak: people write "undeliverable" too.
        headers.subject().is_some_and(|s| BOUNCE_SUBJECT.is_match(s))
            && NDR_PHRASE.is_match(&text.notice)
    }

    fn from_notice(headers: &Headers, text: &MessageText) -> Option<String> {
        let notice = match ORIGINAL_MESSAGE.find(&text.notice) {
            Some(marker) => &text.notice[..marker.start()],
            None => text.notice.as_str(),
        };

        let own: Vec<String> = ["From", "To", "Sender", "Return-Path"]
            .iter()
            .filter_map(|name| headers.get(name))
            .flat_map(|value| ADDRESS.find_iter(value).map(|m| m.as_str().to_ascii_lowercase()))
            .collect();

        ADDRESS
            .find_iter(notice)
            .map(|m| m.as_str().trim_end_matches('.'))
            .filter(|addr| !own.contains(&addr.to_ascii_lowercase()))
            .filter(|addr| !is_daemon(addr))
            .find_map(validated)
    }
}

impl BounceExtractor for DsnExtractor {
    fn extract(&self, headers: &Headers, raw: &[u8]) -> Option<String> {
        let text = parser::message_text(raw);

        let failed_header = headers
            .get("X-Failed-Recipients")
            .or(text.failed_recipients.as_deref());
        if let Some(addr) = failed_header.and_then(first_listed) {
            return Some(addr);
        }

        // Some servers send the status fields as text/plain instead of a
        // delivery-status part.
        for haystack in [&text.delivery_status, &text.notice] {
            for field in [&*FINAL_RECIPIENT, &*ORIGINAL_RECIPIENT] {
                let found = field
                    .captures_iter(haystack)
                    .filter_map(|caps| caps.get(1))
                    .find_map(|m| validated(m.as_str()));
                if found.is_some() {
                    return found;
                }
            }
        }

        if Self::looks_like_bounce(headers, &text) {
            return Self::from_notice(headers, &text);
        }

        None
    }

    fn description(&self) -> &str {
        "delivery status notification"
    }
}

/// Extracts the first capture group (or the whole match) of a regex over the
/// message text.
#[derive(Debug, Clone)]
pub struct RegexExtractor {
    regex: Regex,
    description: String,
}

impl RegexExtractor {
    /// Creates a regex extractor.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::with_description(pattern, format!("regex pattern: {pattern}"))
    }

    /// Creates a regex extractor with a custom description.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn with_description(
        pattern: &str,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            description: description.into(),
        })
    }
}

impl BounceExtractor for RegexExtractor {
    fn extract(&self, _headers: &Headers, raw: &[u8]) -> Option<String> {
        let text = parser::message_text(raw).combined();
        let caps = self.regex.captures(&text)?;
        let found = caps.get(1).or_else(|| caps.get(0))?;
        Some(found.as_str().trim().to_string())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Extractor backed by a closure over the headers and message text.
pub struct ClosureExtractor<F>
where
    F: Fn(&Headers, &str) -> Option<String> + Send + Sync,
{
    extract_fn: F,
    description: String,
}

impl<F> ClosureExtractor<F>
where
    F: Fn(&Headers, &str) -> Option<String> + Send + Sync,
{
    /// Creates a closure-based extractor.
    #[must_use]
    pub fn new(extract_fn: F, description: impl Into<String>) -> Self {
        Self {
            extract_fn,
            description: description.into(),
        }
    }
}

impl<F> BounceExtractor for ClosureExtractor<F>
where
    F: Fn(&Headers, &str) -> Option<String> + Send + Sync,
{
    fn extract(&self, headers: &Headers, raw: &[u8]) -> Option<String> {
        (self.extract_fn)(headers, &parser::message_text(raw).combined())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<F> std::fmt::Debug for ClosureExtractor<F>
where
    F: Fn(&Headers, &str) -> Option<String> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureExtractor")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

fn validated(candidate: &str) -> Option<String> {
    let candidate = candidate.trim().trim_matches(|c| c == '<' || c == '>');
    EmailAddress::is_valid(candidate).then(|| candidate.to_string())
}

fn first_listed(value: &str) -> Option<String> {
    value.split([',', ' ', '\t']).find_map(validated)
}

fn single_address(value: &str) -> Option<String> {
    mailparse::addrparse(value)
        .ok()?
        .extract_single_info()
        .map(|info| info.addr)
}

fn is_daemon(addr: &str) -> bool {
    let local = addr.split('@').next().unwrap_or(addr);
    DAEMON_LOCAL_PARTS
        .iter()
        .any(|daemon| local.eq_ignore_ascii_case(daemon))
}

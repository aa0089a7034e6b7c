//! Inclusion filters.
//!
//! A filter sees each message's position and headers before its body is
//! fetched and answers with an explicit [`Decision`].
//!
//! ```
//! use fail_email_extractor::filter::{Decision, MessageFilter, SenderFilter};
//! use fail_email_extractor::{Headers, MessageRef};
//!
//! let mut filter = SenderFilter::new("MAILER-DAEMON@example.org");
//! let headers: Headers = [("From", "Mail Delivery System <MAILER-DAEMON@example.org>")]
//!     .into_iter()
//!     .collect();
//!
//! let message = MessageRef { index: 0, uid: 1 };
//! assert_eq!(filter.decide(&message, &headers), Decision::Include);
//! ```

use crate::headers::Headers;
use crate::transport::MessageRef;

/// What to do with a message after looking at its headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Fetch the body and run bounce extraction.
    Include,
    /// Move on to the next message.
    Skip,
}

impl From<bool> for Decision {
    fn from(include: bool) -> Self {
        if include {
            Decision::Include
        } else {
            Decision::Skip
        }
    }
}

/// Decides, per message, whether the body is worth fetching.
///
/// Filters take `&mut self` so they can also record what they observe.
pub trait MessageFilter {
    /// Inspects one message.
    fn decide(&mut self, message: &MessageRef, headers: &Headers) -> Decision;
}

impl<F> MessageFilter for F
where
    F: FnMut(&MessageRef, &Headers) -> Decision,
{
    fn decide(&mut self, message: &MessageRef, headers: &Headers) -> Decision {
        self(message, headers)
    }
}

/// No filter configured: every message is included.
impl<T: MessageFilter> MessageFilter for Option<T> {
    fn decide(&mut self, message: &MessageRef, headers: &Headers) -> Decision {
        match self {
            Some(filter) => filter.decide(message, headers),
            None => Decision::Include,
        }
    }
}

/// Includes every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl MessageFilter for AcceptAll {
    fn decide(&mut self, _message: &MessageRef, _headers: &Headers) -> Decision {
        Decision::Include
    }
}

/// Includes only messages sent by one identity.
///
/// A message matches when its `From` header, trimmed, equals the identity
/// exactly, or when the header holds a single mailbox whose address equals
/// the identity ignoring ASCII case. Messages without `From` are skipped.
#[derive(Debug, Clone)]
pub struct SenderFilter {
    identity: String,
}

impl SenderFilter {
    /// Creates a filter for `identity`.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into().trim().to_string(),
        }
    }

    /// The configured sender identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn matches(&self, from: &str) -> bool {
        let from = from.trim();
        if from == self.identity {
            return true;
        }

        match mailparse::addrparse(from) {
            Ok(list) => match list.extract_single_info() {
                Some(single) => single.addr.eq_ignore_ascii_case(&self.identity),
                None => false,
            },
            Err(_) => false,
        }
    }
}

impl MessageFilter for SenderFilter {
    fn decide(&mut self, _message: &MessageRef, headers: &Headers) -> Decision {
        headers
            .sender()
            .is_some_and(|from| self.matches(from))
            .into()
    }
}

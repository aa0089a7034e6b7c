//! Internal module for turning a raw message into inspectable text.

use mailparse::{parse_mail, ParsedMail};
use tracing::debug;

/// Textual view of one message.
#[derive(Debug, Default)]
pub(crate) struct MessageText {
    /// Top-level `Content-Type` mimetype, lowercased.
    pub content_type: String,
    /// `X-Failed-Recipients` from the top-level headers, if any.
    pub failed_recipients: Option<String>,
    /// Human-readable parts, in document order.
    pub notice: String,
    /// `message/delivery-status` parts, in document order.
    pub delivery_status: String,
}

impl MessageText {
    /// Notice and delivery-status text joined, for free-form matching.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.notice, self.delivery_status)
    }
}

/// Walks the MIME tree and collects the parts bounce detection cares about.
///
/// Attached original messages (`message/rfc822`, `text/rfc822-headers`) are
/// not descended into, so their headers cannot be mistaken for diagnostics.
/// Unparseable messages fall back to the raw bytes as notice text.
pub(crate) fn message_text(raw: &[u8]) -> MessageText {
    let parsed = match parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Unparseable message, inspecting raw text");
            return MessageText {
                notice: String::from_utf8_lossy(raw).into_owned(),
                ..MessageText::default()
            };
        }
    };

    let mut text = MessageText {
        content_type: parsed.ctype.mimetype.to_ascii_lowercase(),
        failed_recipients: parsed
            .headers
            .iter()
            .rev()
            .find(|h| h.get_key().eq_ignore_ascii_case("X-Failed-Recipients"))
            .map(mailparse::MailHeader::get_value),
        ..MessageText::default()
    };
    collect_parts(&parsed, &mut text);
    text
}

fn collect_parts(part: &ParsedMail<'_>, out: &mut MessageText) {
    let mimetype = part.ctype.mimetype.to_ascii_lowercase();

    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, out);
        }
        return;
    }

    let target = match mimetype.as_str() {
        "message/delivery-status" | "message/global-delivery-status" => &mut out.delivery_status,
        "message/rfc822" | "text/rfc822-headers" | "message/rfc822-headers" => return,
        m if m.starts_with("text/") => &mut out.notice,
        _ => return,
    };

    match part.get_body() {
        Ok(body) => {
            target.push_str(&body);
            target.push('\n');
        }
        Err(e) => debug!(mimetype = %mimetype, error = %e, "Skipping undecodable part"),
    }
}

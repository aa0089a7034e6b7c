//! Scan pipeline tests against a scripted in-memory mailbox.

use async_trait::async_trait;
use fail_email_extractor::transport::index_uids;
use fail_email_extractor::{
    AcceptAll, BounceScanner, Connect, Credentials, Decision, Error, FetchStep, Headers,
    MailTransport, MessageFilter, MessageRef, RegexExtractor, Result, ScanOutcome, ScanStage,
    SenderFilter, SessionState,
};
use secrecy::SecretString;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Scripted transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Connect,
    Authenticate,
    List,
    Headers(u32),
    Body(u32),
    Close,
}

#[derive(Clone)]
struct Message {
    uid: u32,
    raw: &'static [u8],
    fail_headers: bool,
    fail_body: bool,
}

impl Message {
    fn new(uid: u32, raw: &'static [u8]) -> Self {
        Self {
            uid,
            raw,
            fail_headers: false,
            fail_body: false,
        }
    }

    fn failing_headers(mut self) -> Self {
        self.fail_headers = true;
        self
    }

    fn failing_body(mut self) -> Self {
        self.fail_body = true;
        self
    }
}

#[derive(Clone, Default)]
struct Mailbox {
    messages: Vec<Message>,
    refuse_connect: bool,
    reject_login: bool,
    fail_list: bool,
    cancel_after_headers: Option<(u32, CancellationToken)>,
    log: Arc<Mutex<Vec<Call>>>,
}

impl Mailbox {
    fn with(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn message(&self, uid: u32) -> &Message {
        self.messages.iter().find(|m| m.uid == uid).unwrap()
    }
}

struct Session {
    mailbox: Mailbox,
    state: SessionState,
}

#[async_trait]
impl Connect for Mailbox {
    type Transport = Session;

    async fn connect(&self) -> Result<Session> {
        self.record(Call::Connect);
        if self.refuse_connect {
            return Err(Error::ConnectTimeout {
                target: "imap.example.org:993".into(),
                timeout: Duration::from_secs(30),
            });
        }
        Ok(Session {
            mailbox: self.clone(),
            state: SessionState::Connected,
        })
    }
}

#[async_trait]
impl MailTransport for Session {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        self.mailbox.record(Call::Authenticate);
        if self.mailbox.reject_login {
            return Err(Error::AuthTimeout {
                login: credentials.login().to_string(),
                timeout: Duration::from_secs(30),
            });
        }
        self.state = SessionState::Authenticated;
        Ok(())
    }

    async fn list_messages(&mut self) -> Result<Vec<MessageRef>> {
        self.mailbox.record(Call::List);
        if self.mailbox.fail_list {
            return Err(Error::ListTimeout {
                timeout: Duration::from_secs(30),
            });
        }
        Ok(index_uids(self.mailbox.messages.iter().map(|m| m.uid)))
    }

    async fn fetch_headers(&mut self, message: &MessageRef) -> Result<Headers> {
        assert_eq!(self.state, SessionState::Authenticated);
        self.mailbox.record(Call::Headers(message.uid));

        if let Some((uid, token)) = &self.mailbox.cancel_after_headers {
            if *uid == message.uid {
                token.cancel();
            }
        }

        let scripted = self.mailbox.message(message.uid);
        if scripted.fail_headers {
            return Err(Error::FetchTimeout {
                uid: message.uid,
                part: "header",
                timeout: Duration::from_secs(30),
            });
        }
        Ok(Headers::parse(scripted.raw).unwrap())
    }

    async fn fetch_body(&mut self, message: &MessageRef) -> Result<Vec<u8>> {
        assert_eq!(self.state, SessionState::Authenticated);
        self.mailbox.record(Call::Body(message.uid));

        let scripted = self.mailbox.message(message.uid);
        if scripted.fail_body {
            return Err(Error::MissingData {
                uid: message.uid,
                part: "body",
            });
        }
        Ok(scripted.raw.to_vec())
    }

    async fn close(&mut self) {
        self.mailbox.record(Call::Close);
        self.state = SessionState::Closed;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

const BOUNCE_BOB: &[u8] = b"From: a@x.org\r\n\
To: news@example.org\r\n\
Subject: Undelivered Mail Returned to Sender\r\n\
\r\n\
This is the mail system at host mx.example.org.\r\n\
\r\n\
<bob@y.com>: host mx.y.com said: 550 5.1.1 User unknown\r\n";

const REGULAR: &[u8] = b"From: b@x.org\r\n\
To: news@example.org\r\n\
Subject: Lunch\r\n\
\r\n\
See you at noon.\r\n";

const DSN_CAROL: &[u8] = b"From: MAILER-DAEMON@mx.example.org\r\n\
Subject: Delivery Status Notification (Failure)\r\n\
Content-Type: multipart/report; report-type=delivery-status; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: text/plain\r\n\
\r\n\
Delivery to the following recipient failed permanently.\r\n\
--B\r\n\
Content-Type: message/delivery-status\r\n\
\r\n\
Reporting-MTA: dns; mx.example.org\r\n\
\r\n\
Final-Recipient: rfc822; carol@z.org\r\n\
Action: failed\r\n\
Status: 5.1.1\r\n\
--B--\r\n";

const FAILED_HEADER_DAVE: &[u8] = b"From: MAILER-DAEMON@mx.example.org\r\n\
X-Failed-Recipients: dave@w.org\r\n\
Subject: Mail delivery failed: returning message to sender\r\n\
\r\n\
A message that you sent could not be delivered.\r\n";

fn credentials() -> Credentials {
    Credentials::new("news@example.org", SecretString::from("secret".to_string()))
}

fn scanner(mailbox: &Mailbox) -> BounceScanner<Mailbox> {
    BounceScanner::new(mailbox.clone(), credentials())
}

async fn collect<F: MessageFilter>(
    scanner: &BounceScanner<Mailbox>,
    filter: F,
) -> (Vec<String>, ScanOutcome) {
    let mut addresses = Vec::new();
    let outcome = scanner.scan(filter, |a| addresses.push(a)).await;
    (addresses, outcome)
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sender_filter_scenario() {
    let mailbox = Mailbox::with(vec![Message::new(1, BOUNCE_BOB), Message::new(2, REGULAR)]);

    let filter = Some(SenderFilter::new("a@x.org"));
    let (addresses, outcome) = collect(&scanner(&mailbox), filter).await;

    assert_eq!(addresses, vec!["bob@y.com"]);
    assert!(outcome.is_success());
    assert_eq!(mailbox.count(|c| *c == Call::Body(2)), 0);
    assert_eq!(
        mailbox.calls(),
        vec![
            Call::Connect,
            Call::Authenticate,
            Call::List,
            Call::Headers(1),
            Call::Body(1),
            Call::Headers(2),
            Call::Close,
        ]
    );

    let report = outcome.report().unwrap();
    assert_eq!(report.listed, 2);
    assert_eq!(report.visited, 2);
    assert_eq!(report.included, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.addresses, 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_empty_mailbox_completes() {
    let mailbox = Mailbox::default();

    let (addresses, outcome) = collect(&scanner(&mailbox), AcceptAll).await;

    assert!(addresses.is_empty());
    assert!(outcome.is_success());
    assert_eq!(
        mailbox.calls(),
        vec![Call::Connect, Call::Authenticate, Call::List, Call::Close]
    );
}

#[tokio::test]
async fn test_list_failure_is_fatal() {
    let mailbox = Mailbox {
        fail_list: true,
        ..Mailbox::with(vec![Message::new(1, BOUNCE_BOB)])
    };

    let (addresses, outcome) = collect(&scanner(&mailbox), AcceptAll).await;

    assert!(addresses.is_empty());
    assert!(matches!(
        outcome,
        ScanOutcome::Failed {
            stage: ScanStage::Listing,
            error: Error::ListTimeout { .. }
        }
    ));
    assert_eq!(
        mailbox.count(|c| matches!(c, Call::Headers(_) | Call::Body(_))),
        0
    );
    assert_eq!(mailbox.count(|c| *c == Call::Close), 1);
}

#[tokio::test]
async fn test_auth_failure_fetches_nothing_and_closes() {
    let mailbox = Mailbox {
        reject_login: true,
        ..Mailbox::with(vec![Message::new(1, BOUNCE_BOB), Message::new(2, DSN_CAROL)])
    };

    let (addresses, outcome) = collect(&scanner(&mailbox), AcceptAll).await;

    assert!(addresses.is_empty());
    match &outcome {
        ScanOutcome::Failed { stage, error } => {
            assert_eq!(*stage, ScanStage::Authenticating);
            assert_eq!(error.category(), fail_email_extractor::ErrorCategory::Auth);
        }
        other => panic!("expected auth failure, got {other:?}"),
    }
    assert_eq!(
        mailbox.calls(),
        vec![Call::Connect, Call::Authenticate, Call::Close]
    );
}

#[tokio::test]
async fn test_connect_failure_does_not_close() {
    let mailbox = Mailbox {
        refuse_connect: true,
        ..Mailbox::default()
    };

    let (_, outcome) = collect(&scanner(&mailbox), AcceptAll).await;

    assert!(matches!(
        outcome,
        ScanOutcome::Failed {
            stage: ScanStage::Connecting,
            ..
        }
    ));
    assert_eq!(mailbox.calls(), vec![Call::Connect]);
}

#[tokio::test]
async fn test_message_failure_does_not_stop_scan() {
    let mailbox = Mailbox::with(vec![
        Message::new(1, BOUNCE_BOB).failing_headers(),
        Message::new(2, DSN_CAROL).failing_body(),
        Message::new(3, FAILED_HEADER_DAVE),
    ]);

    let (addresses, outcome) = collect(&scanner(&mailbox), AcceptAll).await;

    assert_eq!(addresses, vec!["dave@w.org"]);
    assert!(outcome.is_success());

    let report = outcome.report().unwrap();
    assert_eq!(report.visited, 3);
    assert_eq!(report.included, 2);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].message.uid, 1);
    assert_eq!(report.failures[0].step, FetchStep::Headers);
    assert_eq!(report.failures[1].message.uid, 2);
    assert_eq!(report.failures[1].step, FetchStep::Body);
    assert_eq!(mailbox.count(|c| *c == Call::Body(1)), 0);
}

#[tokio::test]
async fn test_addresses_follow_listed_order() {
    let forward = Mailbox::with(vec![
        Message::new(1, BOUNCE_BOB),
        Message::new(2, DSN_CAROL),
        Message::new(3, FAILED_HEADER_DAVE),
    ]);
    let reversed = Mailbox::with(forward.messages.iter().rev().cloned().collect());

    let (first, _) = collect(&scanner(&forward), AcceptAll).await;
    let (second, _) = collect(&scanner(&reversed), AcceptAll).await;

    assert_eq!(first, vec!["bob@y.com", "carol@z.org", "dave@w.org"]);
    assert_eq!(second, vec!["dave@w.org", "carol@z.org", "bob@y.com"]);
}

#[tokio::test]
async fn test_absent_filter_includes_every_message() {
    let mailbox = Mailbox::with(vec![
        Message::new(1, BOUNCE_BOB),
        Message::new(2, REGULAR),
        Message::new(3, DSN_CAROL),
    ]);

    let (addresses, outcome) = collect(&scanner(&mailbox), None::<SenderFilter>).await;

    assert_eq!(addresses.len(), 2);
    assert_eq!(outcome.report().unwrap().included, 3);
    assert_eq!(mailbox.count(|c| matches!(c, Call::Body(_))), 3);
}

#[tokio::test]
async fn test_addresses_never_exceed_included_messages() {
    let mailbox = Mailbox::with(vec![
        Message::new(1, DSN_CAROL),
        Message::new(2, DSN_CAROL),
        Message::new(3, REGULAR),
        Message::new(4, FAILED_HEADER_DAVE),
    ]);

    let mut included = 0;
    let filter = |message: &MessageRef, _: &Headers| {
        let decision = Decision::from(message.index % 2 == 0);
        if decision == Decision::Include {
            included += 1;
        }
        decision
    };

    let (addresses, outcome) = collect(&scanner(&mailbox), filter).await;

    assert_eq!(included, 2);
    assert!(addresses.len() <= included);
    assert_eq!(addresses, vec!["carol@z.org"]);
    assert_eq!(outcome.report().unwrap().skipped, 2);
}

#[tokio::test]
async fn test_observing_filter_skips_everything() {
    let mailbox = Mailbox::with(vec![Message::new(1, BOUNCE_BOB), Message::new(2, DSN_CAROL)]);

    let mut subjects = Vec::new();
    let filter = |_: &MessageRef, headers: &Headers| {
        subjects.push(headers.subject().unwrap_or_default().to_string());
        Decision::Skip
    };

    let (addresses, outcome) = collect(&scanner(&mailbox), filter).await;

    assert!(addresses.is_empty());
    assert!(outcome.is_success());
    assert_eq!(
        subjects,
        vec![
            "Undelivered Mail Returned to Sender",
            "Delivery Status Notification (Failure)"
        ]
    );
    assert_eq!(mailbox.count(|c| matches!(c, Call::Body(_))), 0);
}

#[tokio::test]
async fn test_final_callback_runs_once_after_addresses() {
    let mailbox = Mailbox::with(vec![
        Message::new(1, BOUNCE_BOB).failing_body(),
        Message::new(2, DSN_CAROL),
        Message::new(3, REGULAR).failing_headers(),
    ]);

    let events = Mutex::new(Vec::new());
    scanner(&mailbox)
        .run(
            AcceptAll,
            |address| events.lock().unwrap().push(format!("address:{address}")),
            |outcome| {
                events
                    .lock()
                    .unwrap()
                    .push(format!("final:{}", outcome.is_success()))
            },
        )
        .await;

    assert_eq!(
        events.into_inner().unwrap(),
        vec!["address:carol@z.org", "final:true"]
    );
}

#[tokio::test]
async fn test_cancellation_stops_before_next_message() {
    let token = CancellationToken::new();
    let mailbox = Mailbox {
        cancel_after_headers: Some((2, token.clone())),
        ..Mailbox::with(vec![
            Message::new(1, BOUNCE_BOB),
            Message::new(2, DSN_CAROL),
            Message::new(3, FAILED_HEADER_DAVE),
        ])
    };

    let scanner = scanner(&mailbox).with_cancellation(token);
    let (addresses, outcome) = collect(&scanner, AcceptAll).await;

    assert_eq!(addresses, vec!["bob@y.com", "carol@z.org"]);
    match &outcome {
        ScanOutcome::Cancelled(report) => assert_eq!(report.visited, 2),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(mailbox.count(|c| *c == Call::Headers(3)), 0);
    assert_eq!(mailbox.calls().last(), Some(&Call::Close));
}

#[tokio::test]
async fn test_cancelled_before_start_never_connects() {
    let token = CancellationToken::new();
    token.cancel();
    let mailbox = Mailbox::with(vec![Message::new(1, BOUNCE_BOB)]);

    let scanner = scanner(&mailbox).with_cancellation(token);
    let (_, outcome) = collect(&scanner, AcceptAll).await;

    assert!(matches!(outcome, ScanOutcome::Cancelled(_)));
    assert!(mailbox.calls().is_empty());
}

#[tokio::test]
async fn test_custom_extractor_keeps_iteration() {
    let mailbox = Mailbox::with(vec![Message::new(1, REGULAR), Message::new(2, BOUNCE_BOB)]);

    let scanner = scanner(&mailbox)
        .with_extractor(RegexExtractor::new(r"(?i)see you at (\w+)").unwrap());

    let mut found = Vec::new();
    let outcome = scanner.scan(AcceptAll, |a| found.push(a)).await;

    assert!(outcome.is_success());
    assert_eq!(found, vec!["noon"]);
    assert_eq!(mailbox.count(|c| matches!(c, Call::Body(_))), 2);
}

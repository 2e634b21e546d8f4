use super::common::*;
use crate::monitor::domain::Source;
use crate::monitor::notify::{Delivery, Digest, DigestNotifier, NotifyError};
use crate::monitor::retry::RetryPolicy;
use crate::monitor::sources::{FetchFailure, SourceError};

fn notifier(relay: &RecordingRelay) -> DigestNotifier {
    DigestNotifier::new(Box::new(relay.clone()), recipients()).with_retry(RetryPolicy::new(2, 0))
}

#[test]
fn empty_digest_is_not_sent_by_default() {
    let relay = RecordingRelay::default();
    let property = property();
    let digest = Digest {
        property: &property,
        monitored: &Source::ordered(),
        records: &[],
        unavailable: &[],
        generated_on: generated_on(),
    };

    let delivery = notifier(&relay).notify(&digest).expect("nothing to do");

    assert_eq!(delivery, Delivery::NothingToSend);
    assert_eq!(relay.attempts(), 0);
}

#[test]
fn all_clear_digest_can_be_enabled() {
    let relay = RecordingRelay::default();
    let property = property();
    let digest = Digest {
        property: &property,
        monitored: &Source::ordered(),
        records: &[],
        unavailable: &[],
        generated_on: generated_on(),
    };

    let delivery = notifier(&relay)
        .send_when_empty(true)
        .notify(&digest)
        .expect("all clear sent");

    assert!(matches!(delivery, Delivery::Sent { recipients: 1, .. }));
    let sent = relay.sent();
    assert!(sent[0].0.text_body.contains("All clear"));
    assert_eq!(sent[0].0.record_count, 0);
}

#[test]
fn digest_groups_records_by_source_in_canonical_order() {
    let relay = RecordingRelay::default();
    let property = property();
    let records = vec![
        record(Source::Hpd, "H456"),
        record(Source::Dob, "D1"),
        record(Source::Hpd, "H789"),
    ];
    let digest = Digest {
        property: &property,
        monitored: &[Source::Dob, Source::Hpd, Source::Complaints311],
        records: &records,
        unavailable: &[],
        generated_on: generated_on(),
    };

    notifier(&relay).notify(&digest).expect("digest sent");

    let (message, to) = relay.sent().remove(0);
    assert_eq!(to, recipients());
    assert_eq!(message.subject, "NYC Property Violations - Block 01234, Lot 0056");
    assert_eq!(message.record_count, 3);

    let text = &message.text_body;
    let complaints = text.find("311 Complaints").expect("311 section");
    let hpd = text.find("HPD Violations").expect("hpd section");
    let dob = text.find("DOB Violations").expect("dob section");
    assert!(complaints < hpd && hpd < dob);
    assert!(!text.contains("OATH Violations"), "unmonitored feeds are omitted");
    assert!(text.contains("- 2025-03-01 | H456 | hpd finding H456"));
    assert!(text[hpd..dob].contains("H789"));
    assert!(text[complaints..hpd].contains("No new violations found"));
    assert!(message.html_body.contains("<td>D1</td>"));
}

#[test]
fn html_body_escapes_upstream_text() {
    let relay = RecordingRelay::default();
    let property = property();
    let mut hostile = record(Source::Oath, "0001");
    hostile.description = "<script>alert('x')</script> & more".to_string();
    let records = vec![hostile];
    let digest = Digest {
        property: &property,
        monitored: &[Source::Oath],
        records: &records,
        unavailable: &[],
        generated_on: generated_on(),
    };

    notifier(&relay).notify(&digest).expect("digest sent");

    let html = &relay.sent()[0].0.html_body;
    assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"));
    assert!(!html.contains("<script>"));
}

#[test]
fn failed_sources_are_listed_as_unavailable() {
    let relay = RecordingRelay::default();
    let property = property();
    let records = vec![record(Source::Hpd, "H1")];
    let unavailable = vec![SourceError::new(Source::Dob, FetchFailure::Timeout, 3)];
    let digest = Digest {
        property: &property,
        monitored: &[Source::Hpd, Source::Dob],
        records: &records,
        unavailable: &unavailable,
        generated_on: generated_on(),
    };

    notifier(&relay).notify(&digest).expect("digest sent");

    let text = &relay.sent()[0].0.text_body;
    assert!(text.contains("Unavailable sources"));
    assert!(text.contains("DOB Violations unavailable after 3 attempt(s): request timed out"));
    assert!(!text.contains("\nDOB Violations\n"), "failed feeds get no empty section");
}

#[test]
fn transport_failure_is_retried_once() {
    let relay = RecordingRelay::failing_with(vec![NotifyError::Transport(
        "421 try again later".to_string(),
    )]);
    let property = property();
    let records = vec![record(Source::Hpd, "H1")];
    let digest = Digest {
        property: &property,
        monitored: &[Source::Hpd],
        records: &records,
        unavailable: &[],
        generated_on: generated_on(),
    };

    let delivery = notifier(&relay).notify(&digest).expect("second attempt succeeds");

    assert_eq!(
        delivery,
        Delivery::Sent {
            recipients: 1,
            attempts: 2
        }
    );
    assert_eq!(relay.attempts(), 2);
}

#[test]
fn persistent_failure_surfaces_after_capped_retry() {
    let relay = RecordingRelay::failing_with(vec![
        NotifyError::Transport("connection refused".to_string()),
        NotifyError::Transport("connection refused".to_string()),
        NotifyError::Transport("connection refused".to_string()),
    ]);
    let property = property();
    let records = vec![record(Source::Hpd, "H1")];
    let digest = Digest {
        property: &property,
        monitored: &[Source::Hpd],
        records: &records,
        unavailable: &[],
        generated_on: generated_on(),
    };

    let error = notifier(&relay).notify(&digest).expect_err("relay stays down");

    assert!(matches!(error, NotifyError::Transport(_)));
    assert_eq!(relay.attempts(), 2);
}

#[test]
fn missing_recipients_skip_the_relay() {
    let relay = RecordingRelay::default();
    let property = property();
    let records = vec![record(Source::Hpd, "H1")];
    let digest = Digest {
        property: &property,
        monitored: &[Source::Hpd],
        records: &records,
        unavailable: &[],
        generated_on: generated_on(),
    };

    let delivery = DigestNotifier::new(Box::new(relay.clone()), Vec::new())
        .notify(&digest)
        .expect("skipped");

    assert_eq!(delivery, Delivery::NoRecipients);
    assert_eq!(relay.attempts(), 0);
}

mod common;

use calsched_core::{
    AttendeeSpec, Decision, MessageKind, ParticipationStatus, ReconcileOutcome, SchedError,
};
use common::{Office, inbox, meeting};

#[tokio::test]
async fn test_invite_accept_decline_reconcile() {
    let office = Office::new();
    let alice = office.coordinator(&office.alice);

    let dispatched = alice
        .dispatch_invite(
            meeting("Quarterly review"),
            &[
                AttendeeSpec::Address("bob@example.com".into()),
                AttendeeSpec::Principal(office.carol.href.clone()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(dispatched.delivered_count(), 2);

    let bob = office.coordinator(&office.bob);
    let bob_summary = bob
        .process_inbox(|item| item.is_invite().then_some(Decision::Accepted))
        .await
        .unwrap();
    assert_eq!(bob_summary.invites_answered, 1);

    let carol = office.coordinator(&office.carol);
    let carol_items = inbox(&carol).await;
    let declined = carol
        .respond_to_invite(&carol_items[0], Decision::Declined)
        .await
        .unwrap();
    assert_eq!(declined.outcome, ReconcileOutcome::Applied);
    assert!(declined.inbox_item_removed);

    let replies = inbox(&alice).await;
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r.kind == MessageKind::Reply));

    let summary = alice.process_inbox(|_| None).await.unwrap();
    assert_eq!(summary.replies_applied, 2);
    assert!(summary.failures.is_empty());

    let copy = office.calendar_copy(&office.alice, &dispatched.uid);
    assert_eq!(
        copy.attendee("bob@example.com").unwrap().partstat,
        ParticipationStatus::Accepted
    );
    assert_eq!(
        copy.attendee("carol@example.com").unwrap().partstat,
        ParticipationStatus::Declined
    );

    assert!(inbox(&alice).await.is_empty());
    assert!(inbox(&bob).await.is_empty());
    assert!(inbox(&carol).await.is_empty());

    // Attendee copies carry their own answers
    let bob_copy = office.calendar_copy(&office.bob, &dispatched.uid);
    assert_eq!(
        bob_copy.attendee("bob@example.com").unwrap().partstat,
        ParticipationStatus::Accepted
    );
}

#[tokio::test]
async fn test_answering_twice_sends_one_reply() {
    let office = Office::new();
    office
        .coordinator(&office.alice)
        .dispatch_invite(
            meeting("1:1"),
            &[AttendeeSpec::Address("bob@example.com".into())],
        )
        .await
        .unwrap();

    let bob = office.coordinator(&office.bob);
    let items = inbox(&bob).await;
    let first = bob
        .respond_to_invite(&items[0], Decision::Tentative)
        .await
        .unwrap();
    let second = bob
        .respond_to_invite(&items[0], Decision::Tentative)
        .await
        .unwrap();

    assert_eq!(first.outcome, ReconcileOutcome::Applied);
    assert_eq!(second.outcome, ReconcileOutcome::Duplicate);
    assert_eq!(inbox(&office.coordinator(&office.alice)).await.len(), 1);
}

#[tokio::test]
async fn test_only_invited_principals_can_answer() {
    let office = Office::new();
    office
        .coordinator(&office.alice)
        .dispatch_invite(
            meeting("Design"),
            &[AttendeeSpec::Address("bob@example.com".into())],
        )
        .await
        .unwrap();

    let items = inbox(&office.coordinator(&office.bob)).await;
    let err = office
        .coordinator(&office.dave)
        .respond_to_invite(&items[0], Decision::Accepted)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedError::AttendeeNotFound { .. }));
}

#[tokio::test]
async fn test_unreadable_inbox_item_does_not_stop_triage() {
    use calsched_core::{Precondition, ResourceStore};

    let office = Office::new();
    office
        .coordinator(&office.alice)
        .dispatch_invite(
            meeting("Retro"),
            &[AttendeeSpec::Address("bob@example.com".into())],
        )
        .await
        .unwrap();
    office
        .store(&office.bob)
        .put(
            &format!("{}garbage.ics", office.bob.inbox_href),
            "not a calendar".to_string(),
            Precondition::IfNoneMatch,
        )
        .await
        .unwrap();

    let bob = office.coordinator(&office.bob);
    let mut triage = bob.triage_inbox();
    let mut good = 0;
    let mut bad = 0;
    while let Some(next) = triage.next().await {
        match next {
            Ok(item) => {
                assert!(item.is_invite());
                good += 1;
            }
            Err(SchedError::IcsParse(_)) => bad += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!((good, bad), (1, 1));

    // Restartable, and still side-effect free
    triage.rewind();
    let mut seen = 0;
    while triage.next().await.is_some() {
        seen += 1;
    }
    assert_eq!(seen, 2);

    let summary = bob.process_inbox(|_| None).await.unwrap();
    assert_eq!(summary.left_untouched, 1);
    assert_eq!(summary.failures.len(), 1);
}

#[tokio::test]
async fn test_invite_with_endless_duration_is_reported_not_fatal() {
    use calsched_core::{Precondition, ResourceStore};

    let office = Office::new();
    office
        .coordinator(&office.alice)
        .dispatch_invite(
            meeting("Retro"),
            &[AttendeeSpec::Address("bob@example.com".into())],
        )
        .await
        .unwrap();
    let endless = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
METHOD:REQUEST\r\n\
BEGIN:VEVENT\r\n\
UID:endless@example.com\r\n\
DTSTAMP:20250301T120000Z\r\n\
DTSTART:20250320T100000Z\r\n\
DURATION:P99999999D\r\n\
ORGANIZER:mailto:alice@example.com\r\n\
ATTENDEE;PARTSTAT=NEEDS-ACTION:mailto:bob@example.com\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
    office
        .store(&office.bob)
        .put(
            &format!("{}endless.ics", office.bob.inbox_href),
            endless.to_string(),
            Precondition::IfNoneMatch,
        )
        .await
        .unwrap();

    let bob = office.coordinator(&office.bob);
    let summary = bob
        .process_inbox(|item| item.is_invite().then_some(Decision::Accepted))
        .await
        .unwrap();
    assert_eq!(summary.invites_answered, 1);
    assert_eq!(summary.failures.len(), 1);
}

mod common;

use std::sync::Arc;

use calsched_core::config::InboxRetention;
use calsched_core::ics::generate_ics;
use calsched_core::{
    AttendeeSpec, Decision, InboxItem, ItipMethod, ParticipationStatus, Precondition,
    ReconcileOutcome, ResourceStore, SchedError,
};
use chrono::{DateTime, Utc};
use common::{ContendedStore, GatedStore, Office, at, inbox, meeting};

/// Alice invites `attendees`; returns the event UID.
async fn invite(office: &Office, attendees: &[&str]) -> String {
    let specs: Vec<AttendeeSpec> = attendees
        .iter()
        .map(|a| AttendeeSpec::Address(a.to_string()))
        .collect();
    office
        .coordinator(&office.alice)
        .dispatch_invite(meeting("Planning"), &specs)
        .await
        .unwrap()
        .uid
}

/// Answer the single pending invite in `principal`'s inbox.
async fn answer(office: &Office, principal: &calsched_core::Principal, decision: Decision) {
    let coordinator = office.coordinator(principal);
    let items = inbox(&coordinator).await;
    assert_eq!(items.len(), 1);
    coordinator
        .respond_to_invite(&items[0], decision)
        .await
        .unwrap();
}

/// Drop a hand-made REPLY from bob into alice's inbox.
async fn post_reply(
    office: &Office,
    uid: &str,
    partstat: ParticipationStatus,
    dtstamp: DateTime<Utc>,
) -> String {
    let mut reply = office.calendar_copy(&office.alice, uid);
    reply.attendees.retain(|a| a.email == "bob@example.com");
    reply.attendees[0].partstat = partstat;
    reply.attendees[0].schedule_status = None;
    reply.dtstamp = dtstamp;

    let href = format!("{}{}.ics", office.alice.inbox_href, uuid::Uuid::new_v4());
    office
        .store(&office.alice)
        .put(
            &href,
            generate_ics(&reply, Some(&ItipMethod::Reply)).unwrap(),
            Precondition::IfNoneMatch,
        )
        .await
        .unwrap();
    href
}

async fn item_at(office: &Office, href: &str) -> InboxItem {
    inbox(&office.coordinator(&office.alice))
        .await
        .into_iter()
        .find(|i| i.href == href)
        .expect("reply in inbox")
}

#[tokio::test]
async fn test_replaying_a_reply_is_a_no_op() {
    let office = Office::new();
    let uid = invite(&office, &["bob@example.com"]).await;
    answer(&office, &office.bob, Decision::Accepted).await;

    let alice = office.coordinator_with(&office.alice, InboxRetention::Retain);
    let items = inbox(&alice).await;
    assert_eq!(items.len(), 1);
    assert!(items[0].is_reply());

    let first = alice.reconcile_reply(&items[0]).await.unwrap();
    assert_eq!(first.outcome, ReconcileOutcome::Applied);
    assert_eq!(first.attempts, 1);
    assert!(!first.inbox_item_removed);

    let second = alice.reconcile_reply(&items[0]).await.unwrap();
    assert_eq!(second.outcome, ReconcileOutcome::Duplicate);
    assert_eq!(second.attempts, 0);
    assert_eq!(second.revision, first.revision);

    let copy = office.calendar_copy(&office.alice, &uid);
    assert_eq!(
        copy.attendee("bob@example.com").unwrap().partstat,
        ParticipationStatus::Accepted
    );
    // Retained as configured
    assert_eq!(inbox(&alice).await.len(), 1);
}

#[tokio::test]
async fn test_replay_after_deletion_is_harmless() {
    let office = Office::new();
    invite(&office, &["bob@example.com"]).await;
    answer(&office, &office.bob, Decision::Tentative).await;

    let alice = office.coordinator(&office.alice);
    let items = inbox(&alice).await;
    let first = alice.reconcile_reply(&items[0]).await.unwrap();
    assert!(first.inbox_item_removed);
    assert!(inbox(&alice).await.is_empty());

    let again = alice.reconcile_reply(&items[0]).await.unwrap();
    assert_eq!(again.outcome, ReconcileOutcome::Duplicate);
}

#[tokio::test]
async fn test_older_reply_is_discarded_and_later_one_supersedes() {
    let office = Office::new();
    let uid = invite(&office, &["bob@example.com"]).await;
    let alice = office.coordinator(&office.alice);
    let bob_status = || {
        office
            .calendar_copy(&office.alice, &uid)
            .attendee("bob@example.com")
            .unwrap()
            .partstat
    };

    let accepted = post_reply(&office, &uid, ParticipationStatus::Accepted, at(12, 1)).await;
    let declined_earlier =
        post_reply(&office, &uid, ParticipationStatus::Declined, at(12, 0)).await;

    let applied = alice
        .reconcile_reply(&item_at(&office, &accepted).await)
        .await
        .unwrap();
    assert_eq!(applied.outcome, ReconcileOutcome::Applied);

    let stale = alice
        .reconcile_reply(&item_at(&office, &declined_earlier).await)
        .await
        .unwrap();
    assert_eq!(stale.outcome, ReconcileOutcome::Stale);
    assert!(stale.inbox_item_removed);
    assert_eq!(bob_status(), ParticipationStatus::Accepted);

    let declined_later = post_reply(&office, &uid, ParticipationStatus::Declined, at(12, 2)).await;
    let superseded = alice
        .reconcile_reply(&item_at(&office, &declined_later).await)
        .await
        .unwrap();
    assert_eq!(superseded.outcome, ReconcileOutcome::Applied);
    assert_eq!(bob_status(), ParticipationStatus::Declined);
    assert!(inbox(&alice).await.is_empty());
}

#[tokio::test]
async fn test_reply_with_needs_action_is_rejected() {
    let office = Office::new();
    let uid = invite(&office, &["bob@example.com"]).await;
    let href = post_reply(&office, &uid, ParticipationStatus::NeedsAction, at(12, 0)).await;

    let alice = office.coordinator(&office.alice);
    let err = alice
        .reconcile_reply(&item_at(&office, &href).await)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedError::InvalidTransition(_)));
    // Not applied, so not consumed
    assert_eq!(inbox(&alice).await.len(), 1);
}

#[tokio::test]
async fn test_racing_reconciliations_both_survive() {
    let office = Office::new();
    let uid = invite(&office, &["bob@example.com", "carol@example.com"]).await;
    answer(&office, &office.bob, Decision::Accepted).await;
    answer(&office, &office.carol, Decision::Declined).await;

    let target = office.alice.calendar_object_href(&uid);
    let gated = Arc::new(GatedStore::new(office.store(&office.alice), target));
    let alice = office.coordinator_on(gated, &office.alice, InboxRetention::Delete);

    let items = inbox(&alice).await;
    assert_eq!(items.len(), 2);

    let (first, second) = tokio::join!(
        alice.reconcile_reply(&items[0]),
        alice.reconcile_reply(&items[1])
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    let mut attempts = vec![first.attempts, second.attempts];
    attempts.sort();
    assert_eq!(attempts, vec![1, 2]);
    assert_eq!(first.outcome, ReconcileOutcome::Applied);
    assert_eq!(second.outcome, ReconcileOutcome::Applied);

    let copy = office.calendar_copy(&office.alice, &uid);
    assert_eq!(
        copy.attendee("bob@example.com").unwrap().partstat,
        ParticipationStatus::Accepted
    );
    assert_eq!(
        copy.attendee("carol@example.com").unwrap().partstat,
        ParticipationStatus::Declined
    );
    assert!(inbox(&alice).await.is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_keep_the_inbox_item() {
    let office = Office::new();
    let uid = invite(&office, &["bob@example.com"]).await;
    answer(&office, &office.bob, Decision::Accepted).await;

    let contended = Arc::new(ContendedStore {
        inner: office.store(&office.alice),
        href: office.alice.calendar_object_href(&uid),
    });
    let alice = office.coordinator_on(contended, &office.alice, InboxRetention::Delete);
    let items = inbox(&alice).await;

    let err = alice.reconcile_reply(&items[0]).await.unwrap_err();
    match err {
        SchedError::ReconciliationFailed {
            uid: failed_uid,
            attendee,
            last_revision,
            attempts,
        } => {
            assert_eq!(failed_uid, uid);
            assert_eq!(attendee, "bob@example.com");
            assert!(last_revision.is_some());
            assert_eq!(attempts, 4);
        }
        other => panic!("expected ReconciliationFailed, got {:?}", other),
    }

    assert_eq!(inbox(&alice).await.len(), 1);
    assert_eq!(
        office
            .calendar_copy(&office.alice, &uid)
            .attendee("bob@example.com")
            .unwrap()
            .partstat,
        ParticipationStatus::NeedsAction
    );
}

#[tokio::test]
async fn test_reconcile_rejects_invites() {
    let office = Office::new();
    invite(&office, &["bob@example.com"]).await;
    let bob = office.coordinator(&office.bob);
    let items = inbox(&bob).await;

    let err = bob.reconcile_reply(&items[0]).await.unwrap_err();
    assert!(matches!(err, SchedError::UnexpectedMessage { .. }));
}

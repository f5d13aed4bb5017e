mod common;

use calsched_core::ics::generate_ics;
use calsched_core::{
    Availability, BusyInterval, CalendarUser, Event, EventStatus, EventTime, Precondition,
    ResourceStore, SchedError, TimeRange, Transparency,
};
use common::{Office, at};

async fn add_event(office: &Office, principal: &calsched_core::Principal, event: Event) {
    office
        .store(principal)
        .put(
            &principal.calendar_object_href(&event.uid),
            generate_ics(&event, None).unwrap(),
            Precondition::IfNoneMatch,
        )
        .await
        .unwrap();
}

fn block(summary: &str, start: (u32, u32), end: (u32, u32)) -> Event {
    Event::new(
        summary,
        EventTime::DateTimeUtc(at(start.0, start.1)),
        EventTime::DateTimeUtc(at(end.0, end.1)),
    )
}

#[tokio::test]
async fn test_busy_period_is_clipped_to_the_query() {
    let office = Office::new();
    add_event(&office, &office.bob, block("Focus", (10, 0), (12, 0))).await;

    let range = TimeRange::new(at(11, 0), at(13, 0)).unwrap();
    let reports = office
        .coordinator(&office.alice)
        .query_freebusy(range, &[office.bob.user()])
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].availability,
        Availability::Known(vec![BusyInterval::busy(at(11, 0), at(12, 0))])
    );
}

#[tokio::test]
async fn test_every_participant_gets_a_report() {
    let office = Office::new();
    office.server.set_private("carol@example.com", true);
    add_event(&office, &office.bob, block("Lunch", (12, 0), (13, 0))).await;
    add_event(&office, &office.bob, block("Standup", (9, 0), (9, 15))).await;

    let range = TimeRange::new(at(8, 0), at(18, 0)).unwrap();
    let participants = vec![
        office.bob.user(),
        office.carol.user(),
        office.dave.user(),
        CalendarUser::new(None, "ghost@example.com"),
    ];
    let reports = office
        .coordinator(&office.alice)
        .freebusy_engine()
        .query(range, &participants)
        .await
        .unwrap();

    assert_eq!(reports.len(), 4);
    assert_eq!(
        reports[0].busy().unwrap(),
        &[
            BusyInterval::busy(at(9, 0), at(9, 15)),
            BusyInterval::busy(at(12, 0), at(13, 0)),
        ]
    );
    assert!(reports[1].is_unknown(), "private calendar");
    // Known and free
    assert_eq!(reports[2].busy(), Some(&[][..]));
    assert!(reports[3].is_unknown(), "unknown user");
    assert_eq!(reports[3].participant.email, "ghost@example.com");
}

#[tokio::test]
async fn test_free_and_cancelled_events_do_not_block_time() {
    let office = Office::new();
    let mut free = block("Working from home", (9, 0), (17, 0));
    free.transparency = Transparency::Transparent;
    let mut cancelled = block("Cancelled review", (14, 0), (15, 0));
    cancelled.status = EventStatus::Cancelled;
    let mut maybe = block("Maybe coffee", (15, 0), (15, 30));
    maybe.status = EventStatus::Tentative;
    add_event(&office, &office.dave, free).await;
    add_event(&office, &office.dave, cancelled).await;
    add_event(&office, &office.dave, maybe).await;

    let range = TimeRange::new(at(8, 0), at(18, 0)).unwrap();
    let reports = office
        .coordinator(&office.alice)
        .query_freebusy(range, &[office.dave.user()])
        .await
        .unwrap();

    let busy = reports[0].busy().unwrap();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].start, at(15, 0));
    assert_eq!(busy[0].kind, calsched_core::BusyKind::BusyTentative);
}

#[tokio::test]
async fn test_no_participants_means_no_request() {
    let office = Office::new();
    let range = TimeRange::new(at(8, 0), at(18, 0)).unwrap();
    let reports = office
        .coordinator(&office.alice)
        .query_freebusy(range, &[])
        .await
        .unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn test_posting_to_someone_elses_outbox_fails_whole_query() {
    let office = Office::new();
    let store = office.store(&office.alice);
    let err = store
        .schedule_post(&office.bob.outbox_href, String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedError::Transport(_)));
}

#[test]
fn test_invalid_range_is_rejected() {
    assert!(matches!(
        TimeRange::new(at(13, 0), at(11, 0)),
        Err(SchedError::InvalidTimeRange(_))
    ));
}

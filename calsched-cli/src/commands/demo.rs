//! A full scheduling round between three users of an in-memory server.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, DurationRound, Utc};
use owo_colors::OwoColorize;

use calsched_core::ics::generate_ics;
use calsched_core::memory::MemoryServer;
use calsched_core::{
    AttendeeSpec, Decision, Event, EventTime, Principal, SchedulingCoordinator, TimeRange,
};

use crate::render::Render;

fn coordinator(server: &Arc<MemoryServer>, principal: &Principal) -> SchedulingCoordinator {
    SchedulingCoordinator::new(
        Arc::new(server.store_for(principal)),
        principal.clone(),
        Arc::new(server.resolver()),
    )
}

fn step(title: &str) {
    println!("\n{}", title.bold());
}

pub async fn run() -> Result<()> {
    let server = MemoryServer::new();
    let organizer = server.register("Test User 1", "testuser1@example.com");
    let accepting = server.register("Test User 2", "testuser2@example.com");
    let declining = server.register("Test User 3", "testuser3@example.com");

    let start = (Utc::now() + Duration::days(4000)).duration_trunc(Duration::minutes(1))?;
    let mut event = Event::new(
        "Some test event made to test scheduling",
        EventTime::DateTimeUtc(start),
        EventTime::DateTimeUtc(start + Duration::hours(1)),
    );
    event.location = Some("Meeting room 1".to_string());

    step("Here is our test event:");
    print!("{}", generate_ics(&event, None)?);

    // The organizer invites itself by address, the second user by name and
    // address, and the third by principal URL through its own resolver.
    step("Test User 1 sends the invitation");
    let attendees = vec![
        AttendeeSpec::Address(organizer.user().mailto()),
        AttendeeSpec::Named {
            name: "Test User 2".to_string(),
            email: accepting.address.clone(),
        },
        AttendeeSpec::from(&declining),
    ];
    let dispatched = coordinator(&server, &organizer)
        .dispatch_invite(event, &attendees)
        .await?;
    println!("{}", dispatched.render());

    step("Test User 2 accepts");
    let summary = coordinator(&server, &accepting)
        .process_inbox(|item| item.is_invite().then_some(Decision::Accepted))
        .await?;
    println!("{}", summary.render());

    step("Test User 3 is unavailable");
    let summary = coordinator(&server, &declining)
        .process_inbox(|item| item.is_invite().then_some(Decision::Declined))
        .await?;
    println!("{}", summary.render());

    step("Test User 1 collects the replies");
    let organizer_coordinator = coordinator(&server, &organizer);
    for item in organizer_coordinator.triage_inbox().collect_items().await? {
        println!("{}", item.render());
    }
    let summary = organizer_coordinator
        .process_inbox(|item| item.is_invite().then_some(Decision::Accepted))
        .await?;
    println!("{}", summary.render());

    if let Some(data) = server.resource(&dispatched.href) {
        let copy = calsched_core::ics::parse_schedule_object(&data)?.event;
        for attendee in &copy.attendees {
            println!("   {} {}", attendee.email, attendee.partstat.render());
        }
    }

    step("Test User 1 checks free/busy");
    let range = TimeRange::new(start - Duration::days(1), start + Duration::days(1))?;
    let reports = organizer_coordinator
        .query_freebusy(range, &[accepting.user(), declining.user()])
        .await?;
    for report in reports {
        println!("{}", report.render());
    }

    Ok(())
}

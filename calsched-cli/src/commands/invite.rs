use anyhow::Result;
use owo_colors::OwoColorize;

use calsched_core::{AttendeeSpec, Event, EventTime};

use crate::render::Render;
use crate::utils::tui::create_spinner;

pub async fn run(
    account: Option<&str>,
    summary: String,
    (start, end): (EventTime, EventTime),
    location: Option<String>,
    attendees: &[String],
) -> Result<()> {
    let specs = attendees
        .iter()
        .map(|a| a.parse::<AttendeeSpec>())
        .collect::<Result<Vec<_>, _>>()?;

    let connected = super::connect(account).await?;

    let mut event = Event::new(summary, start, end);
    event.location = location.filter(|l| !l.is_empty());

    let spinner = create_spinner(format!("Inviting {} attendees", specs.len()));
    let result = connected.coordinator.dispatch_invite(event, &specs).await;
    spinner.finish_and_clear();
    let result = result?;

    println!("{} {}", "Sent:".green(), result.uid.dimmed());
    println!("{}", result.render());
    Ok(())
}

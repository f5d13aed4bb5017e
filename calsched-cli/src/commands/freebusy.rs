use anyhow::Result;
use owo_colors::OwoColorize;

use calsched_core::{AttendeeSpec, TimeRange};

use crate::render::Render;
use crate::utils::tui::create_spinner;

pub async fn run(account: Option<&str>, range: TimeRange, participants: &[String]) -> Result<()> {
    let connected = super::connect(account).await?;
    let resolver = connected.session.resolver();

    let mut users = Vec::new();
    for participant in participants {
        let spec: AttendeeSpec = participant.parse()?;
        match spec.resolve(&resolver).await {
            Ok(user) => users.push(user),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }

    let spinner = create_spinner(format!("Querying {}", range));
    let reports = connected.coordinator.query_freebusy(range, &users).await;
    spinner.finish_and_clear();

    for report in reports? {
        println!("{}", report.render());
    }
    Ok(())
}

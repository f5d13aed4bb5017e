use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::Render;

pub async fn run(account: Option<&str>) -> Result<()> {
    let connected = super::connect(account).await?;
    let mut triage = connected.coordinator.triage_inbox();

    let mut count = 0;
    while let Some(next) = triage.next().await {
        match next {
            Ok(item) => {
                count += 1;
                println!("{}", item.render());
            }
            Err(e) => println!("{}", e.to_string().red()),
        }
    }

    if count == 0 {
        println!("{}", "Inbox is empty".dimmed());
    }
    Ok(())
}

use anyhow::Result;
use owo_colors::OwoColorize;

use calsched_core::Decision;

use crate::render::Render;

/// The full href, or just its last path segment as printed by `calsched inbox`.
fn refers_to(item_href: &str, arg: &str) -> bool {
    let arg = arg.trim_end_matches('/');
    item_href == arg || item_href.trim_end_matches('/').rsplit('/').next() == Some(arg)
}

pub async fn run(account: Option<&str>, href: &str, decision: Decision) -> Result<()> {
    let connected = super::connect(account).await?;
    let coordinator = &connected.coordinator;

    let mut triage = coordinator.triage_inbox();
    let mut found = None;
    while let Some(next) = triage.next().await {
        if let Ok(item) = next
            && refers_to(&item.href, href)
        {
            found = Some(item);
            break;
        }
    }
    let Some(item) = found else {
        anyhow::bail!("No inbox item at {}. Run `calsched inbox` to list them.", href);
    };

    let result = coordinator.respond_to_invite(&item, decision).await?;
    println!(
        "{} {} {}",
        decision.to_string().bold(),
        item.event.summary,
        result.render()
    );
    Ok(())
}

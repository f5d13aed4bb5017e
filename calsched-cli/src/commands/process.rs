use anyhow::Result;

use calsched_core::Decision;

use crate::render::Render;
use crate::utils::tui::create_spinner;

pub async fn run(account: Option<&str>, accept_all: bool) -> Result<()> {
    let connected = super::connect(account).await?;

    let spinner = create_spinner("Processing inbox".to_string());
    let summary = connected
        .coordinator
        .process_inbox(|item| (accept_all && item.is_invite()).then_some(Decision::Accepted))
        .await;
    spinner.finish_and_clear();

    println!("{}", summary?.render());
    Ok(())
}

pub mod check;
pub mod demo;
pub mod freebusy;
pub mod inbox;
pub mod invite;
pub mod process;
pub mod respond;

use anyhow::{Context, Result};

use calsched_caldav::Session;
use calsched_core::SchedulingCoordinator;
use calsched_core::config::SchedConfig;

use crate::utils::tui::create_spinner;

/// A connected account and a coordinator acting for it.
pub struct Connected {
    pub session: Session,
    pub coordinator: SchedulingCoordinator,
}

/// Load the config, connect to the chosen account and discover its principal.
pub async fn connect(account: Option<&str>) -> Result<Connected> {
    let config = SchedConfig::load()?;
    let (name, account) = config.account(account)?;
    let policy = config.scheduling.policy()?;

    let spinner = create_spinner(format!("Connecting to {}", name));
    let session = Session::connect(account).await;
    spinner.finish_and_clear();

    let session = session.with_context(|| format!("Could not connect account '{}'", name))?;
    let coordinator = session.coordinator(policy);
    Ok(Connected {
        session,
        coordinator,
    })
}

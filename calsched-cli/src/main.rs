mod commands;
mod render;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use calsched_core::Decision;

#[derive(Parser)]
#[command(name = "calsched")]
#[command(about = "Send meeting invitations, answer them and check free/busy over CalDAV")]
struct Cli {
    /// Account from the config file (defaults to `default_account`)
    #[arg(short, long, global = true)]
    account: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the discovered principal and whether the server schedules
    Check,
    /// Invite attendees to a new meeting
    Invite {
        /// Meeting title
        #[arg(long)]
        summary: String,

        /// Start date/time (e.g., "2025-03-20 15:00", "tomorrow 3pm")
        #[arg(short, long)]
        start: String,

        /// End date/time
        #[arg(short, long, conflicts_with = "duration")]
        end: Option<String>,

        /// Duration (e.g., "30m", "1h 30m"); defaults to one hour
        #[arg(short, long)]
        duration: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        /// `Name <address>`, a bare address, or a principal URL
        #[arg(required = true)]
        attendees: Vec<String>,
    },
    /// List scheduling messages in the inbox
    Inbox,
    /// Answer an invitation in the inbox
    Respond {
        /// Href of the inbox item, as shown by `calsched inbox`
        href: String,

        /// accept, decline or tentative
        decision: Decision,
    },
    /// Reconcile replies and optionally answer pending invitations
    Process {
        /// Accept every pending invitation
        #[arg(long)]
        accept_all: bool,
    },
    /// Query free/busy for participants
    Freebusy {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Addresses or principal URLs
        #[arg(required = true)]
        participants: Vec<String>,
    },
    /// Run an invite/accept/decline/free-busy round against an in-memory server
    Demo,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "calsched=debug" } else { "calsched=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let account = cli.account.as_deref();

    match cli.command {
        Commands::Check => commands::check::run(account).await,
        Commands::Invite {
            summary,
            start,
            end,
            duration,
            location,
            attendees,
        } => {
            let times = utils::time::meeting_times(&start, end.as_deref(), duration.as_deref())?;
            commands::invite::run(account, summary, times, location, &attendees).await
        }
        Commands::Inbox => commands::inbox::run(account).await,
        Commands::Respond { href, decision } => {
            commands::respond::run(account, &href, decision).await
        }
        Commands::Process { accept_all } => commands::process::run(account, accept_all).await,
        Commands::Freebusy {
            from,
            to,
            participants,
        } => {
            let range = utils::time::parse_range(&from, &to)?;
            commands::freebusy::run(account, range, &participants).await
        }
        Commands::Demo => commands::demo::run().await,
    }
}

//! TUI rendering traits for calsched types.
//!
//! Extension traits that add colored terminal rendering to calsched-core
//! types using owo_colors.

use owo_colors::OwoColorize;

use calsched_core::{
    Availability, DeliveryOutcome, DeliveryStatus, DispatchResult, FreeBusyReport, InboxItem,
    InboxSummary, MessageKind, ParticipationStatus, Principal, ReconcileOutcome, ReconcileResult,
};

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for Principal {
    fn render(&self) -> String {
        let mut lines = vec![format!("👤 {}", self.to_string().bold())];
        lines.push(format!("   {} {}", "principal".dimmed(), self.href));
        lines.push(format!("   {} {}", "calendar ".dimmed(), self.calendar_href));
        lines.push(format!("   {} {}", "inbox    ".dimmed(), self.inbox_href));
        lines.push(format!("   {} {}", "outbox   ".dimmed(), self.outbox_href));
        lines.join("\n")
    }
}

impl Render for ParticipationStatus {
    fn render(&self) -> String {
        let label = self.as_ics_str();
        match self {
            ParticipationStatus::Accepted => label.green().to_string(),
            ParticipationStatus::Declined => label.red().to_string(),
            ParticipationStatus::Tentative => label.yellow().to_string(),
            _ => label.dimmed().to_string(),
        }
    }
}

impl Render for DeliveryOutcome {
    fn render(&self) -> String {
        let who = match &self.address {
            Some(address) if address.as_str() != self.attendee => {
                format!("{} ({})", self.attendee, address)
            }
            _ => self.attendee.clone(),
        };
        match &self.status {
            DeliveryStatus::Delivered => format!("{} {}", "✓".green(), who),
            DeliveryStatus::AddressUnresolvable { reason } => {
                format!("{} {} {}", "✗".red(), who, reason.dimmed())
            }
            DeliveryStatus::TransportError { reason } => {
                format!("{} {} {}", "!".yellow(), who, reason.dimmed())
            }
        }
    }
}

impl Render for DispatchResult {
    fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| format!("   {}", o.render()))
            .collect();
        lines.push(format!(
            "\nInvited {} of {} attendees",
            self.delivered_count(),
            self.outcomes.len()
        ));
        lines.join("\n")
    }
}

impl Render for InboxItem {
    fn render(&self) -> String {
        let kind = match self.kind {
            MessageKind::Invite => "invite".cyan().to_string(),
            MessageKind::Reply => "reply ".green().to_string(),
            MessageKind::Cancellation => "cancel".red().to_string(),
            MessageKind::Other => "other ".dimmed().to_string(),
        };
        let from = match self.kind {
            MessageKind::Reply => self
                .event
                .attendees
                .iter()
                .map(|a| format!("{} {}", a.email, a.partstat.render()))
                .collect::<Vec<_>>()
                .join(", "),
            _ => self
                .event
                .organizer
                .as_ref()
                .map(|o| o.to_string())
                .unwrap_or_default(),
        };
        format!(
            "{} {} {} {}\n         {}",
            kind,
            self.event.summary.bold(),
            self.event.start.to_string().dimmed(),
            from,
            self.href.dimmed()
        )
    }
}

impl Render for ReconcileResult {
    fn render(&self) -> String {
        let outcome = match self.outcome {
            ReconcileOutcome::Applied => "applied".green().to_string(),
            ReconcileOutcome::Duplicate => "already applied".dimmed().to_string(),
            ReconcileOutcome::Stale => "out of date, ignored".yellow().to_string(),
        };
        let attempts = match self.attempts {
            0 | 1 => String::new(),
            n => format!(" after {} attempts", n),
        };
        let removed = if self.inbox_item_removed {
            ", removed from inbox"
        } else {
            ""
        };
        format!("{} {}{}{}", self.uid.dimmed(), outcome, attempts, removed)
    }
}

impl Render for InboxSummary {
    fn render(&self) -> String {
        let mut lines = vec![format!(
            "{} applied, {} discarded, {} answered, {} left in inbox",
            self.replies_applied.green(),
            self.replies_discarded,
            self.invites_answered.green(),
            self.left_untouched
        )];
        for failure in &self.failures {
            lines.push(format!("   {}", failure.red()));
        }
        lines.join("\n")
    }
}

impl Render for FreeBusyReport {
    fn render(&self) -> String {
        let mut lines = vec![format!("📅 {}", self.participant)];
        match &self.availability {
            Availability::Unknown { reason } => {
                lines.push(format!("   {} {}", "unknown".yellow(), reason.dimmed()));
            }
            Availability::Known(busy) if busy.is_empty() => {
                lines.push(format!("   {}", "free".green()));
            }
            Availability::Known(busy) => {
                for interval in busy {
                    lines.push(format!(
                        "   {} {} - {}",
                        interval.kind.as_fbtype().red(),
                        interval.start.format("%Y-%m-%d %H:%M"),
                        interval.end.format("%H:%M UTC")
                    ));
                }
            }
        }
        lines.join("\n")
    }
}

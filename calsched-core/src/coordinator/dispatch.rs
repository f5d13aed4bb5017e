use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::SchedulingCoordinator;
use crate::error::{SchedError, SchedResult};
use crate::event::{Attendee, AttendeeRole, CalendarUser, Event, same_address};
use crate::participation::ParticipationStatus;
use crate::principal::AttendeeSpec;
use crate::store::{Precondition, RevisionToken};

/// Delivery state of one invited attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Delivered,
    AddressUnresolvable { reason: String },
    TransportError { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// The attendee as given by the caller
    pub attendee: String,
    /// Resolved scheduling address, if resolution succeeded
    pub address: Option<String>,
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub uid: String,
    /// Organizer's copy of the event
    pub href: String,
    pub revision: RevisionToken,
    /// One outcome per attendee spec, in input order
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchResult {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }
}

impl SchedulingCoordinator {
    /// Invite `attendees` to `event`, organized by this principal.
    ///
    /// The event is created in the organizer's calendar; the server delivers
    /// a REQUEST to each attendee and records the result in SCHEDULE-STATUS,
    /// which is read back into per-attendee outcomes. Attendees that cannot
    /// be resolved are reported and left out of the event.
    pub async fn dispatch_invite(
        &self,
        mut event: Event,
        attendees: &[AttendeeSpec],
    ) -> SchedResult<DispatchResult> {
        let organizer = AttendeeSpec::from(self.principal.user())
            .resolve(self.resolver.as_ref())
            .await?;

        let mut outcomes: Vec<DeliveryOutcome> = Vec::with_capacity(attendees.len());
        let mut invited: Vec<Attendee> = Vec::with_capacity(attendees.len());
        // Index into `outcomes` for each entry of `invited`
        let mut pending: Vec<usize> = Vec::with_capacity(attendees.len());

        for spec in attendees {
            let label = spec.label();
            match spec.resolve(self.resolver.as_ref()).await {
                Ok(user) if invited.iter().any(|a| same_address(&a.email, &user.email)) => {
                    outcomes.push(DeliveryOutcome {
                        attendee: label,
                        address: Some(user.email),
                        status: DeliveryStatus::AddressUnresolvable {
                            reason: "listed more than once".to_string(),
                        },
                    });
                }
                Ok(user) => {
                    let is_organizer = same_address(&user.email, &organizer.email);
                    outcomes.push(DeliveryOutcome {
                        attendee: label,
                        address: Some(user.email.clone()),
                        // Nothing is sent to the organizer; it holds the event already
                        status: DeliveryStatus::Delivered,
                    });
                    invited.push(if is_organizer {
                        organizer_attendee(user)
                    } else {
                        pending.push(outcomes.len() - 1);
                        Attendee::invited(user)
                    });
                }
                Err(e) => {
                    tracing::warn!(attendee = %label, error = %e, "skipping attendee");
                    let reason = e.to_string();
                    let status = match e {
                        SchedError::Transport(_) => DeliveryStatus::TransportError { reason },
                        _ => DeliveryStatus::AddressUnresolvable { reason },
                    };
                    outcomes.push(DeliveryOutcome {
                        attendee: label,
                        address: None,
                        status,
                    });
                }
            }
        }

        event.organizer = Some(organizer);
        event.attendees = invited;
        event.dtstamp = Utc::now();

        let href = self.principal.calendar_object_href(&event.uid);
        let data = self.codec.serialize(&event, None)?;
        let created = self.store.put(&href, data, Precondition::IfNoneMatch).await?;
        tracing::info!(uid = %event.uid, href = %href, attendees = pending.len(), "created scheduled event");

        let revision = match self.fetch_event(&href).await {
            Ok((stored, stored_event)) => {
                for &index in &pending {
                    let outcome = &mut outcomes[index];
                    let address = outcome.address.as_deref().unwrap_or_default();
                    let schedule_status = stored_event
                        .attendee(address)
                        .and_then(|a| a.schedule_status.as_deref());
                    outcome.status = delivery_status(schedule_status);
                    tracing::debug!(
                        uid = %event.uid,
                        attendee = %address,
                        status = ?outcome.status,
                        "delivery outcome"
                    );
                }
                stored.revision
            }
            Err(e) => {
                tracing::warn!(uid = %event.uid, error = %e, "could not read back delivery status");
                for &index in &pending {
                    outcomes[index].status = DeliveryStatus::TransportError {
                        reason: format!("delivery status unavailable: {}", e),
                    };
                }
                created
            }
        };

        Ok(DispatchResult {
            uid: event.uid,
            href,
            revision,
            outcomes,
        })
    }
}

fn organizer_attendee(user: CalendarUser) -> Attendee {
    let mut attendee = Attendee::invited(user);
    attendee.partstat = ParticipationStatus::Accepted;
    attendee.role = AttendeeRole::Chair;
    attendee.rsvp = false;
    attendee
}

/// Map SCHEDULE-STATUS (RFC 6638 §3.2.9) to a delivery outcome. The value
/// may list several codes; any success code counts as delivered.
fn delivery_status(schedule_status: Option<&str>) -> DeliveryStatus {
    let Some(value) = schedule_status else {
        return DeliveryStatus::TransportError {
            reason: "server reported no delivery status".to_string(),
        };
    };

    let codes: Vec<&str> = value.split(',').map(str::trim).collect();
    if codes.iter().any(|c| c.starts_with("1.") || c.starts_with("2.")) {
        DeliveryStatus::Delivered
    } else if codes.iter().any(|c| c.starts_with("3.")) {
        DeliveryStatus::AddressUnresolvable {
            reason: format!("server status {}", value),
        }
    } else {
        DeliveryStatus::TransportError {
            reason: format!("server status {}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_status_mapping() {
        assert_eq!(delivery_status(Some("1.2")), DeliveryStatus::Delivered);
        assert_eq!(delivery_status(Some("2.0")), DeliveryStatus::Delivered);
        assert!(matches!(
            delivery_status(Some("3.7")),
            DeliveryStatus::AddressUnresolvable { .. }
        ));
        assert!(matches!(
            delivery_status(Some("5.1")),
            DeliveryStatus::TransportError { .. }
        ));
        assert!(matches!(
            delivery_status(None),
            DeliveryStatus::TransportError { .. }
        ));
        assert_eq!(delivery_status(Some("3.8, 1.1")), DeliveryStatus::Delivered);
    }
}

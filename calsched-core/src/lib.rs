//! CalDAV scheduling (RFC 6638 / RFC 5546) for calsched.
//!
//! This crate holds everything that does not depend on HTTP:
//! - `SchedulingCoordinator` for sending invites, answering them, and
//!   reconciling replies with conditional writes
//! - the participation state machine and scheduling message types
//! - `FreeBusyQueryEngine` for free/busy lookups
//! - the `ResourceStore` and `EventCodec` seams, with an iCalendar codec and
//!   an in-process scheduling server
//!
//! The `calsched-caldav` crate implements `ResourceStore` over WebDAV.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod freebusy;
pub mod ics;
pub mod memory;
pub mod message;
pub mod participation;
pub mod principal;
pub mod store;

pub use coordinator::{
    DeliveryOutcome, DeliveryStatus, DispatchResult, InboxSummary, InboxTriage, ReconcileOutcome,
    ReconcileResult, SchedulingCoordinator,
};
pub use error::{SchedError, SchedResult};
pub use event::*;
pub use freebusy::{Availability, BusyInterval, BusyKind, FreeBusyQueryEngine, FreeBusyReport, TimeRange};
pub use message::{InboxItem, ItipMethod, MessageKind};
pub use participation::{Decision, ParticipationStatus};
pub use principal::{AttendeeSpec, Principal};
pub use store::{Precondition, ResourceStore, RevisionToken, SharedStore};

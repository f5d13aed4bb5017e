//! The storage seam: an authenticated CalDAV server as seen by the scheduler.
//!
//! Implementations translate these calls to WebDAV requests (see the
//! `calsched-caldav` crate) or serve them in-process ([`crate::memory`]).
//! Delivery of scheduling messages between inboxes happens behind this
//! trait, on the server side.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SchedResult;

/// Opaque version identifier of a stored object (an ETag).
pub type RevisionToken = String;

/// A calendar object fetched from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    pub href: String,
    pub revision: RevisionToken,
    pub data: String,
}

/// Condition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Only replace the object if it is still at this revision (If-Match).
    IfMatch(RevisionToken),
    /// Only create; fail if anything exists at the href (If-None-Match: *).
    IfNoneMatch,
}

/// One recipient's answer to a POST to the scheduling outbox
/// (a CALDAV:response inside CALDAV:schedule-response).
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientResponse {
    /// Recipient calendar user address, usually `mailto:...`
    pub recipient: String,
    /// REQUEST-STATUS text, e.g. `2.0;Success` or `3.7;Invalid calendar user`
    pub request_status: String,
    pub calendar_data: Option<String>,
}

impl RecipientResponse {
    /// The numeric part of the request status ("2.0", "3.7", ...).
    pub fn status_code(&self) -> &str {
        self.request_status
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
    }

    pub fn is_success(&self) -> bool {
        self.status_code().starts_with("2.")
    }
}

/// Storage operations the scheduler needs.
///
/// This allows running the coordinator against an in-memory server in tests.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch an object and its current revision. Missing objects are
    /// `SchedError::NotFound`.
    async fn get(&self, href: &str) -> SchedResult<StoredResource>;

    /// Conditionally write an object and return its new revision. A failed
    /// precondition is `SchedError::Conflict`.
    async fn put(
        &self,
        href: &str,
        data: String,
        precondition: Precondition,
    ) -> SchedResult<RevisionToken>;

    /// Hrefs of the objects directly inside a collection.
    async fn list_children(&self, collection_href: &str) -> SchedResult<Vec<String>>;

    /// Delete an object if it is still at `if_match`.
    async fn delete(&self, href: &str, if_match: &RevisionToken) -> SchedResult<()>;

    /// Submit a scheduling request to an outbox (RFC 6638 §5, free/busy).
    async fn schedule_post(
        &self,
        outbox_href: &str,
        data: String,
    ) -> SchedResult<Vec<RecipientResponse>>;
}

/// Thread-safe shared store.
pub type SharedStore = Arc<dyn ResourceStore>;

/// Build the href of an object inside a collection, named after its UID.
pub fn object_href(collection_href: &str, uid: &str) -> String {
    let base = collection_href.trim_end_matches('/');
    let name: String = uid
        .chars()
        .map(|c| if c == '/' || c == '?' || c == '#' { '_' } else { c })
        .collect();
    format!("{}/{}.ics", base, name)
}

use super::SchedulingCoordinator;
use crate::error::{SchedError, SchedResult};
use crate::message::{InboxItem, ScheduleObject};

/// Lazy walk over the principal's scheduling inbox.
///
/// The inbox is listed on the first call to [`next`](Self::next) and each
/// message is fetched as it is reached. Reading never modifies the inbox.
/// A message that cannot be read yields an error for that message only;
/// iteration continues with the next one.
pub struct InboxTriage<'a> {
    coordinator: &'a SchedulingCoordinator,
    hrefs: Option<Vec<String>>,
    position: usize,
}

impl<'a> InboxTriage<'a> {
    pub(super) fn new(coordinator: &'a SchedulingCoordinator) -> Self {
        InboxTriage {
            coordinator,
            hrefs: None,
            position: 0,
        }
    }

    pub async fn next(&mut self) -> Option<SchedResult<InboxItem>> {
        let coordinator = self.coordinator;

        if self.hrefs.is_none() {
            let inbox = &coordinator.principal.inbox_href;
            match coordinator.store.list_children(inbox).await {
                Ok(hrefs) => {
                    tracing::debug!(inbox = %inbox, count = hrefs.len(), "listed inbox");
                    self.hrefs = Some(hrefs);
                }
                Err(e) => {
                    self.hrefs = Some(Vec::new());
                    return Some(Err(e));
                }
            }
        }

        loop {
            let href = self.hrefs.as_ref()?.get(self.position)?.clone();
            self.position += 1;

            let stored = match coordinator.store.get(&href).await {
                Ok(stored) => stored,
                // Consumed since listing
                Err(SchedError::NotFound(_)) => continue,
                Err(e) => return Some(Err(e)),
            };

            let object: ScheduleObject = match coordinator.codec.parse(&stored.data) {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!(href = %href, error = %e, "unreadable inbox item");
                    return Some(Err(e));
                }
            };

            return Some(Ok(InboxItem::new(href, stored.revision, object)));
        }
    }

    /// Start over; the inbox is listed again on the next call.
    pub fn rewind(&mut self) {
        self.hrefs = None;
        self.position = 0;
    }

    /// Read all remaining items, skipping unreadable ones. Listing or
    /// transport failures are returned.
    pub async fn collect_items(mut self) -> SchedResult<Vec<InboxItem>> {
        let mut items = Vec::new();
        while let Some(result) = self.next().await {
            match result {
                Ok(item) => items.push(item),
                Err(SchedError::IcsParse(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }
}

impl SchedulingCoordinator {
    /// Pending scheduling messages for this principal, classified.
    pub fn triage_inbox(&self) -> InboxTriage<'_> {
        InboxTriage::new(self)
    }
}

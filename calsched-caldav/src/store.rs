//! [`ResourceStore`] over a CalDAV server.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use calsched_core::store::{Precondition, RecipientResponse, ResourceStore, StoredResource};
use calsched_core::{RevisionToken, SchedError, SchedResult};

use crate::caldav::{DavClient, DeleteObject, GetObject, Propfind, PutObject, SchedulePost};

/// Map a non-success status to the scheduler's error taxonomy.
pub(crate) fn status_error(method: &str, href: &str, status: StatusCode, revision: &str) -> SchedError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => SchedError::NotFound(href.to_string()),
        StatusCode::PRECONDITION_FAILED => SchedError::Conflict {
            href: href.to_string(),
            revision: revision.to_string(),
        },
        _ => SchedError::Transport(format!("{} {} returned {}", method, href, status)),
    }
}

pub(crate) fn transport(context: &str, err: impl std::fmt::Display) -> SchedError {
    SchedError::Transport(format!("{}: {}", context, err))
}

/// Calendar objects on a CalDAV server, accessed with one account's
/// credentials.
#[derive(Clone)]
pub struct DavStore {
    client: Arc<DavClient>,
}

impl DavStore {
    pub fn new(client: Arc<DavClient>) -> Self {
        DavStore { client }
    }

    async fn fetch(&self, href: &str) -> SchedResult<StoredResource> {
        let response = self
            .client
            .request(GetObject::new(href))
            .await
            .map_err(|e| transport(&format!("GET {}", href), e))?;

        if !response.status.is_success() {
            return Err(status_error("GET", href, response.status, ""));
        }
        let revision = response
            .etag
            .ok_or_else(|| SchedError::Transport(format!("GET {} returned no ETag", href)))?;

        Ok(StoredResource {
            href: href.to_string(),
            revision,
            data: response.data,
        })
    }
}

#[async_trait]
impl ResourceStore for DavStore {
    async fn get(&self, href: &str) -> SchedResult<StoredResource> {
        debug!(href = %href, "GET");
        self.fetch(href).await
    }

    async fn put(
        &self,
        href: &str,
        data: String,
        precondition: Precondition,
    ) -> SchedResult<RevisionToken> {
        debug!(href = %href, precondition = ?precondition, "PUT");
        let response = self
            .client
            .request(PutObject::new(href, &data, &precondition))
            .await
            .map_err(|e| transport(&format!("PUT {}", href), e))?;

        if !response.status.is_success() {
            let revision = match &precondition {
                Precondition::IfMatch(etag) => etag.as_str(),
                Precondition::IfNoneMatch => "*",
            };
            return Err(status_error("PUT", href, response.status, revision));
        }

        match response.etag {
            Some(etag) => Ok(etag),
            // Scheduling servers rewrite the object (SCHEDULE-STATUS) and
            // then withhold the ETag, so read it back
            None => Ok(self.fetch(href).await?.revision),
        }
    }

    async fn list_children(&self, collection_href: &str) -> SchedResult<Vec<String>> {
        debug!(href = %collection_href, "PROPFIND");
        let response = self
            .client
            .request(Propfind::new(collection_href, 1, "<d:resourcetype/><d:getetag/>"))
            .await
            .map_err(|e| transport(&format!("PROPFIND {}", collection_href), e))?;

        if response.status != StatusCode::MULTI_STATUS {
            return Err(status_error("PROPFIND", collection_href, response.status, ""));
        }

        let base = collection_href.trim_end_matches('/');
        Ok(response
            .responses
            .into_iter()
            .filter(|r| !r.is_collection)
            .map(|r| r.href)
            .filter(|href| crate::caldav::url_to_href(href).trim_end_matches('/') != base)
            .collect())
    }

    async fn delete(&self, href: &str, if_match: &RevisionToken) -> SchedResult<()> {
        debug!(href = %href, "DELETE");
        let status = self
            .client
            .request(DeleteObject::new(href, if_match))
            .await
            .map_err(|e| transport(&format!("DELETE {}", href), e))?;

        if status.is_success() {
            Ok(())
        } else {
            Err(status_error("DELETE", href, status, if_match))
        }
    }

    async fn schedule_post(
        &self,
        outbox_href: &str,
        data: String,
    ) -> SchedResult<Vec<RecipientResponse>> {
        debug!(href = %outbox_href, "POST");
        let response = self
            .client
            .request(SchedulePost::new(outbox_href, &data))
            .await
            .map_err(|e| transport(&format!("POST {}", outbox_href), e))?;

        if !response.status.is_success() {
            // A missing outbox is a server problem, not a missing object
            return Err(SchedError::Transport(format!(
                "POST {} returned {}",
                outbox_href, response.status
            )));
        }
        Ok(response.recipients)
    }
}

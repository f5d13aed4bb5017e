//! Principal discovery and address resolution over CalDAV.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use calsched_core::event::{CalendarUser, strip_mailto};
use calsched_core::principal::{AddressResolver, Principal};
use calsched_core::{SchedError, SchedResult};

use crate::caldav::{DavClient, Options, PropResponse, Propfind, url_to_href};
use crate::store::{status_error, transport};

const PRINCIPAL_PROPS: &str = "<d:displayname/>\
<c:calendar-home-set/>\
<c:schedule-inbox-URL/>\
<c:schedule-outbox-URL/>\
<c:calendar-user-address-set/>";

const ADDRESS_PROPS: &str = "<d:displayname/><c:calendar-user-address-set/>";

const DEFAULT_CALENDAR_PROPS: &str = "<c:schedule-default-calendar-URL/>";

/// First `mailto:` entry of a calendar-user-address-set, without the scheme.
fn scheduling_address(props: &PropResponse) -> Option<String> {
    props
        .hrefs_of("calendar-user-address-set")
        .iter()
        .find(|a| a.to_ascii_lowercase().starts_with("mailto:"))
        .map(|a| strip_mailto(a).to_string())
}

fn required_href(props: &PropResponse, name: &str) -> Result<String> {
    props
        .hrefs_of(name)
        .first()
        .map(|href| url_to_href(href))
        .with_context(|| format!("Principal {} has no {}", props.href, name))
}

/// Discover the authenticated user's principal and scheduling collections.
///
/// The calendar that holds scheduled copies is the Inbox's
/// schedule-default-calendar-URL when the server reports one, otherwise
/// `<calendar-home>/calendar/`.
pub async fn discover_principal(client: &DavClient) -> Result<Principal> {
    let principal_uri = client
        .find_current_user_principal()
        .await
        .context("Failed to find current user principal")?
        .ok_or_else(|| anyhow::anyhow!("Server did not report a current-user-principal. Check the credentials."))?;
    let principal_href = principal_uri.path().to_string();
    debug!(href = %principal_href, "found principal");

    let response = client
        .request(Propfind::new(&principal_href, 0, PRINCIPAL_PROPS))
        .await
        .with_context(|| format!("Failed to read principal {}", principal_href))?;
    if response.status != StatusCode::MULTI_STATUS {
        anyhow::bail!("PROPFIND {} returned {}", principal_href, response.status);
    }
    let props = response
        .responses
        .into_iter()
        .next()
        .with_context(|| format!("Empty PROPFIND response for {}", principal_href))?;

    let home = required_href(&props, "calendar-home-set")?;
    let inbox_href = required_href(&props, "schedule-inbox-URL")?;
    let outbox_href = required_href(&props, "schedule-outbox-URL")?;
    let address = scheduling_address(&props)
        .with_context(|| format!("Principal {} has no mailto: calendar user address", principal_href))?;

    let calendar_href = match default_calendar(client, &inbox_href).await {
        Some(href) => href,
        None => format!("{}/calendar/", home.trim_end_matches('/')),
    };

    Ok(Principal {
        href: principal_href,
        display_name: props.text_of("displayname").map(|s| s.to_string()),
        address,
        calendar_href,
        inbox_href,
        outbox_href,
    })
}

async fn default_calendar(client: &DavClient, inbox_href: &str) -> Option<String> {
    let response = client
        .request(Propfind::new(inbox_href, 0, DEFAULT_CALENDAR_PROPS))
        .await
        .ok()?;
    response
        .responses
        .first()?
        .hrefs_of("schedule-default-calendar-URL")
        .first()
        .map(|href| url_to_href(href))
}

/// Whether the server advertises RFC 6638 implicit scheduling.
pub async fn supports_scheduling(client: &DavClient, href: &str) -> SchedResult<bool> {
    let response = client
        .request(Options::new(href))
        .await
        .map_err(|e| transport(&format!("OPTIONS {}", href), e))?;
    if !response.status.is_success() {
        return Err(status_error("OPTIONS", href, response.status, ""));
    }
    Ok(response.supports_scheduling())
}

/// Resolves principal URLs with the calling account's own credentials.
pub struct DavAddressResolver {
    client: Arc<DavClient>,
}

impl DavAddressResolver {
    pub fn new(client: Arc<DavClient>) -> Self {
        DavAddressResolver { client }
    }
}

#[async_trait]
impl AddressResolver for DavAddressResolver {
    async fn resolve(&self, principal_href: &str) -> SchedResult<CalendarUser> {
        let href = url_to_href(principal_href);
        let unresolvable = |reason: String| SchedError::AddressResolution {
            address: principal_href.to_string(),
            reason,
        };

        let response = self
            .client
            .request(Propfind::new(&href, 0, ADDRESS_PROPS))
            .await
            .map_err(|e| transport(&format!("PROPFIND {}", href), e))?;

        match response.status {
            StatusCode::MULTI_STATUS => {}
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(unresolvable(format!("server returned {}", response.status)));
            }
            status => return Err(status_error("PROPFIND", &href, status, "")),
        }

        let props = response
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| unresolvable("empty PROPFIND response".into()))?;
        let address = scheduling_address(&props)
            .ok_or_else(|| unresolvable("no mailto: calendar user address".into()))?;

        Ok(CalendarUser::new(
            props.text_of("displayname").map(|s| s.to_string()),
            &address,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caldav::{OptionsResponse, parse_multistatus};

    fn props(xml: &str) -> PropResponse {
        parse_multistatus(xml.as_bytes()).unwrap().remove(0)
    }

    #[test]
    fn test_scheduling_address_prefers_mailto() {
        let props = props(
            r#"<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/principals/bob/</href>
    <propstat>
      <prop>
        <C:calendar-user-address-set>
          <href>/principals/bob/</href>
          <href>MAILTO:bob@example.com</href>
        </C:calendar-user-address-set>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#,
        );
        assert_eq!(scheduling_address(&props).as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_required_href_is_made_relative() {
        let props = props(
            r#"<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/principals/bob/</href>
    <propstat>
      <prop>
        <C:schedule-inbox-URL><href>https://dav.example.com/calendars/bob/inbox/</href></C:schedule-inbox-URL>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#,
        );
        assert_eq!(
            required_href(&props, "schedule-inbox-URL").unwrap(),
            "/calendars/bob/inbox/"
        );
        assert!(required_href(&props, "schedule-outbox-URL").is_err());
    }

    #[test]
    fn test_scheduling_detected_from_dav_header() {
        let response = OptionsResponse {
            status: StatusCode::OK,
            dav: vec!["1".into(), "access-control".into(), "calendar-access".into()],
        };
        assert!(!response.supports_scheduling());

        let response = OptionsResponse {
            status: StatusCode::OK,
            dav: vec!["calendar-access".into(), "calendar-auto-schedule".into()],
        };
        assert!(response.supports_scheduling());
    }
}

//! CalDAV client construction and the raw WebDAV requests calsched needs.
//!
//! libdav's stock requests cover discovery and plain resource access, but
//! scheduling needs conditional writes whose failure is an answer rather
//! than an error, plus the RFC 6638 Outbox POST. Those are implemented here
//! as custom [`DavRequest`]s that hand the status code back to the caller.

use anyhow::{Context, Result};
use http::{Method, StatusCode, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use libdav::CalDavClient;
use libdav::dav::WebDavClient;
use libdav::requests::{DavRequest, ParseResponseError, PreparedRequest};
use tower::ServiceBuilder;
use tower_http::{auth::AddAuthorization, follow_redirect::FollowRedirect};

use calsched_core::store::{Precondition, RecipientResponse};

/// Type alias for the HTTP client with auth and redirect following.
type HttpClient = FollowRedirect<
    AddAuthorization<
        Client<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>, String>,
    >,
>;

/// Type alias for our CalDAV client.
pub type DavClient = CalDavClient<HttpClient>;

const CALENDAR_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";
const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Create a libdav CalDavClient with basic authentication.
///
/// Redirects are followed, so the base URL may be a well-known or
/// load-balancer address.
pub fn create_caldav_client(base_url: &str, username: &str, password: &str) -> Result<DavClient> {
    let uri: Uri = base_url
        .parse()
        .with_context(|| format!("Invalid base URL: {}", base_url))?;

    let https_connector = HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("Failed to load native TLS roots")?
        .https_or_http()
        .enable_http1()
        .build();

    let http_client = Client::builder(TokioExecutor::new()).build(https_connector);
    let auth_client = AddAuthorization::basic(http_client, username, password);

    let client = ServiceBuilder::new()
        .layer(tower_http::follow_redirect::FollowRedirectLayer::new())
        .service(auth_client);

    let webdav = WebDavClient::new(uri, client);
    Ok(CalDavClient::new(webdav))
}

/// Extract the href path from a full URL.
///
/// Converts "https://dav.example.com/calendars/alice/" to "/calendars/alice/"
pub fn url_to_href(url: &str) -> String {
    if let Ok(uri) = url.parse::<Uri>() {
        uri.path().to_string()
    } else {
        url.to_string()
    }
}

fn header_value(parts: &http::response::Parts, name: http::header::HeaderName) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

// ============================================================================
// Resource access
// ============================================================================

/// GET a single calendar object.
pub struct GetObject<'a> {
    href: &'a str,
}

impl<'a> GetObject<'a> {
    pub fn new(href: &'a str) -> Self {
        Self { href }
    }
}

/// Status, ETag and body of a [`GetObject`] request.
#[derive(Debug)]
pub struct GetObjectResponse {
    pub status: StatusCode,
    pub etag: Option<String>,
    pub data: String,
}

impl DavRequest for GetObject<'_> {
    type Response = GetObjectResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        Ok(PreparedRequest {
            method: Method::GET,
            path: self.href.to_string(),
            body: String::new(),
            headers: Vec::new(),
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        let data = if parts.status.is_success() {
            std::str::from_utf8(body)?.to_string()
        } else {
            String::new()
        };
        Ok(GetObjectResponse {
            status: parts.status,
            etag: header_value(parts, http::header::ETAG),
            data,
        })
    }
}

/// Conditional PUT of a calendar object.
pub struct PutObject<'a> {
    href: &'a str,
    data: &'a str,
    precondition: &'a Precondition,
}

impl<'a> PutObject<'a> {
    pub fn new(href: &'a str, data: &'a str, precondition: &'a Precondition) -> Self {
        Self {
            href,
            data,
            precondition,
        }
    }
}

/// Status and new ETag of a [`PutObject`] request. Servers that rewrite the
/// object may omit the ETag.
#[derive(Debug)]
pub struct PutObjectResponse {
    pub status: StatusCode,
    pub etag: Option<String>,
}

impl DavRequest for PutObject<'_> {
    type Response = PutObjectResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        let condition = match self.precondition {
            Precondition::IfMatch(etag) => ("If-Match".to_string(), etag.clone()),
            Precondition::IfNoneMatch => ("If-None-Match".to_string(), "*".to_string()),
        };
        Ok(PreparedRequest {
            method: Method::PUT,
            path: self.href.to_string(),
            body: self.data.to_string(),
            headers: vec![
                ("Content-Type".to_string(), CALENDAR_CONTENT_TYPE.to_string()),
                condition,
            ],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        _body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        Ok(PutObjectResponse {
            status: parts.status,
            etag: header_value(parts, http::header::ETAG),
        })
    }
}

/// DELETE guarded by If-Match.
pub struct DeleteObject<'a> {
    href: &'a str,
    etag: &'a str,
}

impl<'a> DeleteObject<'a> {
    pub fn new(href: &'a str, etag: &'a str) -> Self {
        Self { href, etag }
    }
}

impl DavRequest for DeleteObject<'_> {
    type Response = StatusCode;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        Ok(PreparedRequest {
            method: Method::DELETE,
            path: self.href.to_string(),
            body: String::new(),
            headers: vec![("If-Match".to_string(), self.etag.to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        _body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        Ok(parts.status)
    }
}

// ============================================================================
// PROPFIND
// ============================================================================

/// A PROPFIND with a caller-supplied `<prop>` body.
pub struct Propfind<'a> {
    href: &'a str,
    depth: u8,
    props: &'a str,
}

impl<'a> Propfind<'a> {
    /// `props` is the inner XML of `<d:prop>`, using the `d` (DAV:) and `c`
    /// (CalDAV) prefixes.
    pub fn new(href: &'a str, depth: u8, props: &'a str) -> Self {
        Self { href, depth, props }
    }
}

/// One `<response>` of a multistatus body.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PropResponse {
    pub href: String,
    pub is_collection: bool,
    /// Properties whose value is one or more `<href>` elements
    pub hrefs: Vec<(String, Vec<String>)>,
    /// Properties with a plain text value
    pub texts: Vec<(String, String)>,
}

impl PropResponse {
    pub fn hrefs_of(&self, prop: &str) -> &[String] {
        self.hrefs
            .iter()
            .find(|(name, _)| name == prop)
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }

    pub fn text_of(&self, prop: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|(name, _)| name == prop)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
pub struct PropfindResponse {
    pub status: StatusCode,
    pub responses: Vec<PropResponse>,
}

impl DavRequest for Propfind<'_> {
    type Response = PropfindResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
    <d:prop>{}</d:prop>
</d:propfind>"#,
            self.props
        );
        Ok(PreparedRequest {
            method: Method::from_bytes(b"PROPFIND")?,
            path: self.href.to_string(),
            body,
            headers: vec![
                ("Content-Type".to_string(), XML_CONTENT_TYPE.to_string()),
                ("Depth".to_string(), self.depth.to_string()),
            ],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        let responses = if parts.status == StatusCode::MULTI_STATUS {
            parse_multistatus(body)?
        } else {
            Vec::new()
        };
        Ok(PropfindResponse {
            status: parts.status,
            responses,
        })
    }
}

fn child_named<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|n| n.tag_name().name() == name)
}

fn trimmed_text(node: roxmltree::Node) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Parse a DAV multistatus body. Only properties reported with a 2xx
/// propstat status are kept.
pub fn parse_multistatus(body: &[u8]) -> std::result::Result<Vec<PropResponse>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();

    let mut responses = Vec::new();

    for response in root.children().filter(|n| n.tag_name().name() == "response") {
        let Some(href) = child_named(response, "href").and_then(trimmed_text) else {
            continue;
        };
        let mut parsed = PropResponse {
            href,
            ..Default::default()
        };

        for propstat in response.children().filter(|n| n.tag_name().name() == "propstat") {
            let ok = child_named(propstat, "status")
                .and_then(|s| s.text())
                .is_none_or(|s| s.split_whitespace().nth(1).is_some_and(|c| c.starts_with('2')));
            if !ok {
                continue;
            }
            let Some(prop) = child_named(propstat, "prop") else {
                continue;
            };

            for property in prop.children().filter(|n| n.is_element()) {
                let name = property.tag_name().name().to_string();
                if name == "resourcetype" {
                    parsed.is_collection = child_named(property, "collection").is_some();
                    continue;
                }
                let hrefs: Vec<String> = property
                    .descendants()
                    .filter(|n| n.tag_name().name() == "href")
                    .filter_map(trimmed_text)
                    .collect();
                if !hrefs.is_empty() {
                    parsed.hrefs.push((name, hrefs));
                } else if let Some(value) = trimmed_text(property) {
                    parsed.texts.push((name, value));
                }
            }
        }

        responses.push(parsed);
    }

    Ok(responses)
}

// ============================================================================
// Scheduling
// ============================================================================

/// OPTIONS request; reports the `DAV` compliance classes.
pub struct Options<'a> {
    href: &'a str,
}

impl<'a> Options<'a> {
    pub fn new(href: &'a str) -> Self {
        Self { href }
    }
}

#[derive(Debug)]
pub struct OptionsResponse {
    pub status: StatusCode,
    pub dav: Vec<String>,
}

impl OptionsResponse {
    /// Whether the server performs implicit scheduling (RFC 6638).
    pub fn supports_scheduling(&self) -> bool {
        self.dav.iter().any(|class| class == "calendar-auto-schedule")
    }
}

impl DavRequest for Options<'_> {
    type Response = OptionsResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        Ok(PreparedRequest {
            method: Method::OPTIONS,
            path: self.href.to_string(),
            body: String::new(),
            headers: Vec::new(),
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        _body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        let dav = parts
            .headers
            .get_all("DAV")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|class| class.trim().to_string())
            .filter(|class| !class.is_empty())
            .collect();
        Ok(OptionsResponse {
            status: parts.status,
            dav,
        })
    }
}

/// POST of an iTIP message to a scheduling Outbox (RFC 6638 §5).
pub struct SchedulePost<'a> {
    outbox_href: &'a str,
    data: &'a str,
}

impl<'a> SchedulePost<'a> {
    pub fn new(outbox_href: &'a str, data: &'a str) -> Self {
        Self { outbox_href, data }
    }
}

#[derive(Debug)]
pub struct SchedulePostResponse {
    pub status: StatusCode,
    pub recipients: Vec<RecipientResponse>,
}

impl DavRequest for SchedulePost<'_> {
    type Response = SchedulePostResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        Ok(PreparedRequest {
            method: Method::POST,
            path: self.outbox_href.to_string(),
            body: self.data.to_string(),
            headers: vec![("Content-Type".to_string(), CALENDAR_CONTENT_TYPE.to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        let recipients = if parts.status.is_success() {
            parse_schedule_response(body)?
        } else {
            Vec::new()
        };
        Ok(SchedulePostResponse {
            status: parts.status,
            recipients,
        })
    }
}

/// Parse a CALDAV:schedule-response body into one entry per recipient.
pub fn parse_schedule_response(
    body: &[u8],
) -> std::result::Result<Vec<RecipientResponse>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();

    let mut recipients = Vec::new();

    for response in root.children().filter(|n| n.tag_name().name() == "response") {
        // <recipient> wraps an <href> in RFC 6638, older servers put the text inline
        let recipient = child_named(response, "recipient").and_then(|r| {
            child_named(r, "href")
                .and_then(trimmed_text)
                .or_else(|| trimmed_text(r))
        });
        let Some(recipient) = recipient else { continue };

        let request_status = child_named(response, "request-status")
            .and_then(trimmed_text)
            .unwrap_or_default();

        let calendar_data = child_named(response, "calendar-data").and_then(|n| n.text().map(|s| s.to_string()));

        recipients.push(RecipientResponse {
            recipient,
            request_status,
            calendar_data,
        });
    }

    Ok(recipients)
}

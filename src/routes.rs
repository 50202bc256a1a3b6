//! Network request interception and fixture responses
//!
//! Route rules are an ordered list of (matcher, responder) pairs evaluated
//! top-down against every request the page issues. The first matching rule
//! applies; a request no rule matches proceeds to the real network. Rules are
//! registered before navigation and never mutated mid-run.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FulfillRequestParams, HeaderEntry,
    RequestPattern,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A canned response substituted for a real backend call.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Fixture {
    pub fn json(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }
}

/// What to do with an intercepted request.
#[derive(Debug, Clone)]
pub enum RouteAction {
    Fulfill(Fixture),
    PassThrough,
}

/// An intercepted request, as seen by responders.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
}

/// Response-fulfillment policy for one rule.
///
/// `Dynamic` lets a single rule branch on the intercepted request (for
/// example, fulfill a GET with a fixture but pass a POST through).
#[derive(Clone)]
pub enum Responder {
    Fulfill(Fixture),
    PassThrough,
    Dynamic(Arc<dyn Fn(&InterceptedRequest) -> RouteAction + Send + Sync>),
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fulfill(fx) => f.debug_tuple("Fulfill").field(fx).finish(),
            Self::PassThrough => write!(f, "PassThrough"),
            Self::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

/// One registered interception rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pattern: String,
    regex: Regex,
    method: Option<String>,
    responder: Responder,
}

impl RouteRule {
    /// Whether this rule matches the given request.
    fn matches(&self, req: &InterceptedRequest) -> bool {
        if let Some(ref method) = self.method {
            if !method.eq_ignore_ascii_case(&req.method) {
                return false;
            }
        }
        // Match against the URL without any query string or fragment, so
        // `**/api/settings` also catches `/api/settings?refresh=1`.
        let path = req
            .url
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or(&req.url);
        self.regex.is_match(path)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Ordered route table for one session.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule intercepting any request whose URL matches `pattern`
    /// (glob-style: `*` matches within a path segment, `**` across segments)
    /// and, if given, whose HTTP method matches.
    pub fn register(
        &mut self,
        pattern: &str,
        method: Option<&str>,
        responder: Responder,
    ) -> Result<()> {
        let regex = glob_to_regex(pattern).map_err(|e| Error::RoutePattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.rules.push(RouteRule {
            pattern: pattern.to_string(),
            regex,
            method: method.map(|m| m.to_ascii_uppercase()),
            responder,
        });
        Ok(())
    }

    /// Resolve a request against the table.
    ///
    /// Matching policy: first-registered-wins. Returns `None` when no rule
    /// matches, which the interception task treats as pass-through.
    pub fn matching(&self, req: &InterceptedRequest) -> Option<RouteAction> {
        for rule in &self.rules {
            if rule.matches(req) {
                return Some(match &rule.responder {
                    Responder::Fulfill(fx) => RouteAction::Fulfill(fx.clone()),
                    Responder::PassThrough => RouteAction::PassThrough,
                    Responder::Dynamic(f) => f(req),
                });
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Compile a glob pattern to an anchored regex.
///
/// `**` matches any run of characters, `*` matches within one path segment,
/// `?` matches a single non-slash character.
fn glob_to_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    re.push_str(".*");
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c if "\\.+()[]{}^$|".contains(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }

    re.push('$');
    Regex::new(&re)
}

/// Enable Fetch-domain interception on the page and spawn the dispatch task.
///
/// Every paused request is resolved against the table: a `Fulfill` action
/// answers it from the fixture without contacting the real server, anything
/// else continues to the network unmodified.
pub async fn install(page: &Page, table: RouteTable) -> Result<JoinHandle<()>> {
    page.execute(EnableParams {
        patterns: Some(vec![RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_type: None,
            request_stage: None,
        }]),
        handle_auth_requests: None,
    })
    .await?;

    let mut events = page.event_listener::<EventRequestPaused>().await?;
    let page = page.clone();

    let handle = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let req = InterceptedRequest {
                url: event.request.url.clone(),
                method: event.request.method.clone(),
            };

            match table.matching(&req) {
                Some(RouteAction::Fulfill(fixture)) => {
                    debug!("Fulfilling {} {} from fixture", req.method, req.url);
                    if let Err(e) = fulfill(&page, &event, &fixture).await {
                        warn!("Failed to fulfill {}: {}", req.url, e);
                    }
                }
                _ => {
                    if let Err(e) = pass_through(&page, &event).await {
                        warn!("Failed to continue {}: {}", req.url, e);
                    }
                }
            }
        }
    });

    Ok(handle)
}

async fn fulfill(page: &Page, event: &EventRequestPaused, fixture: &Fixture) -> Result<()> {
    // Fetch.fulfillRequest takes the body base64-encoded
    let body = BASE64.encode(serde_json::to_vec(&fixture.body)?);
    let mut params = FulfillRequestParams::builder()
        .request_id(event.request_id.clone())
        .response_code(i64::from(fixture.status))
        .body(body)
        .build()
        .map_err(Error::Protocol)?;
    params.response_headers = Some(vec![HeaderEntry {
        name: "content-type".to_string(),
        value: "application/json".to_string(),
    }]);
    page.execute(params).await?;
    Ok(())
}

async fn pass_through(page: &Page, event: &EventRequestPaused) -> Result<()> {
    let params = ContinueRequestParams::builder()
        .request_id(event.request_id.clone())
        .build()
        .map_err(Error::Protocol)?;
    page.execute(params).await?;
    Ok(())
}

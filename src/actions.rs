//! Locator resolution, DOM assertions, interactions, and evidence capture
//!
//! Locators resolve against the live DOM at check time, never cached: each
//! probe runs injected JS that finds the target, filters to visible
//! elements, and tags the first hit with a unique attribute the harness then
//! fetches an element handle by. Every wait is bounded; there are no
//! retries beyond the single poll loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::error::{Error, Result};
use crate::session::Session;

/// How often resolution polls the DOM while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bound used when resolving a screenshot scope; evidence capture should not
/// stall a scenario the way a real assertion may.
const CAPTURE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// A target in the live DOM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Element whose text content contains the given string
    Text(String),
    /// CSS selector
    Css(String),
    /// Element id (`#id` scoped)
    Id(String),
    /// Accessibility role plus accessible-name substring
    Role { role: String, name: String },
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(t) => write!(f, "text={:?}", t),
            Self::Css(s) => write!(f, "css={}", s),
            Self::Id(id) => write!(f, "#{}", id),
            Self::Role { role, name } => write!(f, "role={}[name={:?}]", role, name),
        }
    }
}

/// Monotonic token source so concurrent probes never collide on the tag
/// attribute.
static PROBE_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Build the injected probe script for a locator.
///
/// The script clears any previous tag, finds the first visible match, tags
/// it with `data-wv-hit="<token>"`, and returns whether a match was found.
fn probe_js(locator: &Locator, token: &str) -> String {
    let find = match locator {
        Locator::Css(selector) => format!(
            r#"
            let hit = null;
            for (const el of document.querySelectorAll({sel})) {{
                if (vis(el)) {{ hit = el; break; }}
            }}"#,
            sel = js_string(selector),
        ),
        Locator::Id(id) => format!(
            r#"
            const el = document.getElementById({id});
            let hit = (el && vis(el)) ? el : null;"#,
            id = js_string(id),
        ),
        Locator::Text(needle) => format!(
            r#"
            const needle = {needle};
            let hit = null;
            for (const el of document.querySelectorAll('body, body *')) {{
                if (!vis(el)) continue;
                if (!(el.textContent || '').includes(needle)) continue;
                let deeper = false;
                for (const c of el.children) {{
                    if ((c.textContent || '').includes(needle)) {{ deeper = true; break; }}
                }}
                if (!deeper) {{ hit = el; break; }}
            }}"#,
            needle = js_string(needle),
        ),
        Locator::Role { role, name } => format!(
            r#"
            const selectors = {{
                'link': 'a[href], [role="link"]',
                'button': 'button, input[type="button"], input[type="submit"], [role="button"]',
                'heading': 'h1, h2, h3, h4, h5, h6, [role="heading"]',
                'textbox': 'input[type="text"], input:not([type]), textarea, [role="textbox"]'
            }};
            const role = {role};
            const wanted = {name}.trim().toLowerCase();
            const sel = selectors[role] || '[role="' + role + '"]';
            let hit = null;
            for (const el of document.querySelectorAll(sel)) {{
                if (!vis(el)) continue;
                const name = (el.getAttribute('aria-label') || el.textContent || '')
                    .trim().toLowerCase();
                if (name.includes(wanted)) {{ hit = el; break; }}
            }}"#,
            role = js_string(role),
            name = js_string(name),
        ),
    };

    format!(
        r#"(function() {{
            function vis(el) {{
                if (!(el instanceof Element)) return false;
                const s = window.getComputedStyle(el);
                if (s.display === 'none' || s.visibility === 'hidden') return false;
                return el.getClientRects().length > 0;
            }}
            for (const el of document.querySelectorAll('[data-wv-hit]')) {{
                el.removeAttribute('data-wv-hit');
            }}
            {find}
            if (!hit) return false;
            hit.setAttribute('data-wv-hit', {token});
            return true;
        }})()"#,
        find = find,
        token = js_string(token),
    )
}

/// Quote a Rust string as a JS string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Resolve a locator to a visible element, or `None` if nothing matches
/// right now. Re-queries the DOM on every call.
pub async fn try_resolve(page: &Page, locator: &Locator) -> Result<Option<Element>> {
    let token = format!("wv{}", PROBE_TOKEN.fetch_add(1, Ordering::Relaxed));
    let js = probe_js(locator, &token);

    let found = page
        .evaluate(js)
        .await?
        .into_value::<bool>()
        .unwrap_or(false);
    if !found {
        return Ok(None);
    }

    // The tag was set by the probe above; a failed fetch means the DOM moved
    // underneath us, which the caller's poll loop handles.
    match page
        .find_element(format!("[data-wv-hit=\"{}\"]", token))
        .await
    {
        Ok(element) => Ok(Some(element)),
        Err(_) => Ok(None),
    }
}

/// Poll the DOM for the target; fail with `AssertionTimeout` if it is not
/// visible within the bound.
pub async fn assert_visible(session: &Session, locator: &Locator, within: Duration) -> Result<()> {
    let deadline = Instant::now() + within;
    loop {
        if try_resolve(session.page(), locator).await?.is_some() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::AssertionTimeout {
                target: locator.to_string(),
                waited: within,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Wait for the target to be actionable (present and visible), bounded.
async fn wait_actionable(
    session: &Session,
    locator: &Locator,
    action: &'static str,
    within: Duration,
) -> Result<Element> {
    let deadline = Instant::now() + within;
    loop {
        if let Some(element) = try_resolve(session.page(), locator).await? {
            return Ok(element);
        }
        if Instant::now() >= deadline {
            return Err(Error::InteractionTimeout {
                action,
                target: locator.to_string(),
                waited: within,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Click the target once it is actionable.
pub async fn click(session: &Session, locator: &Locator, within: Duration) -> Result<()> {
    let element = wait_actionable(session, locator, "click", within).await?;
    element.click().await?;
    Ok(())
}

/// Clear the target input and type the given value.
pub async fn fill(
    session: &Session,
    locator: &Locator,
    value: &str,
    within: Duration,
) -> Result<()> {
    let element = wait_actionable(session, locator, "fill", within).await?;
    element.click().await?;
    element
        .call_js_fn(
            "function() { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); }",
            false,
        )
        .await?;
    element.type_str(value).await?;
    Ok(())
}

/// Scroll the target into the viewport.
pub async fn scroll_into_view(
    session: &Session,
    locator: &Locator,
    within: Duration,
) -> Result<()> {
    let element = wait_actionable(session, locator, "scroll_into_view", within).await?;
    element.scroll_into_view().await?;
    Ok(())
}

/// Capture a PNG screenshot at `path`, overwriting any existing file.
///
/// Scoped to the locator's bounding region when given, otherwise the
/// viewport (or full page). Evidence capture is best-effort: failures are
/// logged and never fail the run.
pub async fn capture_screenshot(
    session: &Session,
    scope: Option<&Locator>,
    full_page: bool,
    path: &Path,
) -> Option<PathBuf> {
    match capture_inner(session, scope, full_page, path).await {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            warn!("Screenshot capture failed for {}: {}", path.display(), e);
            None
        }
    }
}

async fn capture_inner(
    session: &Session,
    scope: Option<&Locator>,
    full_page: bool,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match scope {
        Some(locator) => {
            let element =
                wait_actionable(session, locator, "screenshot", CAPTURE_RESOLVE_TIMEOUT).await?;
            element
                .save_screenshot(CaptureScreenshotFormat::Png, path)
                .await?;
        }
        None => {
            session
                .page()
                .save_screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(full_page)
                        .build(),
                    path,
                )
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        assert_eq!(
            Locator::Text("No Active Search".into()).to_string(),
            "text=\"No Active Search\""
        );
        assert_eq!(Locator::Id("status".into()).to_string(), "#status");
        assert_eq!(
            Locator::Css("button[title=\"Admin Settings\"]".into()).to_string(),
            "css=button[title=\"Admin Settings\"]"
        );
        assert_eq!(
            Locator::Role {
                role: "link".into(),
                name: "No Connection?".into()
            }
            .to_string(),
            "role=link[name=\"No Connection?\"]"
        );
    }

    #[test]
    fn test_probe_js_quotes_needles() {
        let js = probe_js(&Locator::Text("it's \"quoted\"".into()), "wv1");
        assert!(js.contains(r#""it's \"quoted\"""#));
        assert!(js.contains("data-wv-hit"));
    }

    #[test]
    fn test_probe_js_id_uses_get_element_by_id() {
        let js = probe_js(&Locator::Id("status".into()), "wv2");
        assert!(js.contains("getElementById(\"status\")"));
    }

    #[test]
    fn test_probe_js_role_falls_back_to_role_attribute() {
        let js = probe_js(
            &Locator::Role {
                role: "tab".into(),
                name: "Billing".into(),
            },
            "wv3",
        );
        assert!(js.contains("'[role=\"' + role + '\"]'"));
        assert!(js.contains("\"tab\""));
    }

    #[test]
    fn test_probe_tokens_are_unique() {
        let a = PROBE_TOKEN.fetch_add(1, Ordering::Relaxed);
        let b = PROBE_TOKEN.fetch_add(1, Ordering::Relaxed);
        assert_ne!(a, b);
    }
}

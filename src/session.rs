//! Browser session lifecycle and navigation control

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, RequestId,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::routes::{self, RouteTable};

/// Configuration for one browser session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the application under test; relative scenario URLs
    /// resolve against this
    pub base_url: String,

    /// Viewport dimensions
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Run the browser headless
    pub headless: bool,

    /// Run with the Chromium sandbox (disable for containers/CI)
    pub sandbox: bool,

    /// Path to a chromium binary (None = auto-detect)
    pub chrome_path: Option<String>,

    /// Maximum wait for a navigation to stabilize
    pub nav_timeout: Duration,

    /// Quiet window with no in-flight requests before a page counts as idle
    pub quiet_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            viewport_width: 1280,
            viewport_height: 720,
            headless: true,
            sandbox: false,
            chrome_path: None,
            nav_timeout: Duration::from_secs(15),
            quiet_window: Duration::from_millis(500),
        }
    }
}

/// An isolated browser execution context.
///
/// Owned exclusively by one running scenario; created at scenario start and
/// torn down on every exit path. Background CDP tasks are aborted on drop and
/// the browser process is killed with it, so an early `?` cannot leak a
/// chromium instance.
pub struct Session {
    config: SessionConfig,
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    /// Requests currently in flight, maintained by the network monitor tasks
    inflight: Arc<InflightTracker<RequestId>>,
    monitor_tasks: Vec<JoinHandle<()>>,
    route_task: Option<JoinHandle<()>>,
}

/// In-flight request accounting keyed by request id.
///
/// CDP re-emits `requestWillBeSent` with the same id for every redirect hop,
/// while `loadingFinished`/`loadingFailed` fire once per request, so each id
/// is counted at most once.
#[derive(Debug)]
struct InflightTracker<K> {
    seen: Mutex<HashSet<K>>,
    count: AtomicI64,
}

impl<K: Eq + Hash> InflightTracker<K> {
    fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            count: AtomicI64::new(0),
        }
    }

    fn started(&self, id: K) {
        let mut seen = match self.seen.lock() {
            Ok(seen) => seen,
            Err(_) => return,
        };
        if seen.insert(id) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn settled(&self, id: &K) {
        let mut seen = match self.seen.lock() {
            Ok(seen) => seen,
            Err(_) => return,
        };
        if seen.remove(id) {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn in_flight(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Session {
    /// Launch an isolated, non-persistent browsing context.
    pub async fn launch(config: SessionConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                ..Viewport::default()
            });

        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(Error::Launch)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| Error::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        page.execute(NetworkEnableParams::default()).await?;

        let inflight = Arc::new(InflightTracker::new());
        let monitor_tasks = Self::spawn_network_monitor(&page, Arc::clone(&inflight)).await?;

        debug!(
            "Session launched ({}x{}, headless={})",
            config.viewport_width, config.viewport_height, config.headless
        );

        Ok(Self {
            config,
            browser,
            page,
            handler_task,
            inflight,
            monitor_tasks,
            route_task: None,
        })
    }

    /// Track in-flight request count via Network domain events.
    async fn spawn_network_monitor(
        page: &Page,
        tracker: Arc<InflightTracker<RequestId>>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut started = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut finished = page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = page.event_listener::<EventLoadingFailed>().await?;

        let up = Arc::clone(&tracker);
        let t1 = tokio::spawn(async move {
            while let Some(event) = started.next().await {
                up.started(event.request_id.clone());
            }
        });

        let down = Arc::clone(&tracker);
        let t2 = tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                down.settled(&event.request_id);
            }
        });

        let down = Arc::clone(&tracker);
        let t3 = tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                down.settled(&event.request_id);
            }
        });

        Ok(vec![t1, t2, t3])
    }

    /// Install route interception rules.
    ///
    /// Must be called before the first `navigate`; rules stay active for the
    /// session's lifetime and apply to every subsequent request, including
    /// those triggered by later interactions.
    pub async fn install_routes(&mut self, table: RouteTable) -> Result<()> {
        let task = routes::install(&self.page, table).await?;
        self.route_task = Some(task);
        Ok(())
    }

    /// Load a URL and block until the page reports network idleness (no
    /// in-flight requests for the quiet window) or the navigation timeout
    /// elapses, whichever comes first.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let url = self.resolve_url(url);
        info!("Navigating to {}", url);

        let started = Instant::now();
        tokio::time::timeout(self.config.nav_timeout, self.page.goto(url.clone()))
            .await
            .map_err(|_| Error::NavigationTimeout {
                url: url.clone(),
                waited: self.config.nav_timeout,
            })??;

        self.wait_for_network_idle(&url, started).await
    }

    async fn wait_for_network_idle(&self, url: &str, started: Instant) -> Result<()> {
        let deadline = started + self.config.nav_timeout;
        let mut quiet_since: Option<Instant> = None;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NavigationTimeout {
                    url: url.to_string(),
                    waited: self.config.nav_timeout,
                });
            }

            if self.inflight.in_flight() <= 0 {
                match quiet_since {
                    Some(t) if now.duration_since(t) >= self.config.quiet_window => {
                        debug!("Network idle after {:?}", started.elapsed());
                        return Ok(());
                    }
                    None => quiet_since = Some(now),
                    _ => {}
                }
            } else {
                quiet_since = None;
            }

            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Resolve a scenario URL against the configured base URL.
    fn resolve_url(&self, url: &str) -> String {
        join_url(&self.config.base_url, url)
    }

    /// The session's single page.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Release all browser resources. Invoked on every exit path.
    pub async fn teardown(&mut self) -> Result<()> {
        debug!("Tearing down session");

        if let Some(task) = self.route_task.take() {
            task.abort();
        }
        for task in self.monitor_tasks.drain(..) {
            task.abort();
        }

        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();

        Ok(())
    }
}

/// Join a possibly-relative URL onto a base URL. Absolute URLs pass through.
fn join_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Backstop for early-return paths; the browser process itself dies
        // with the Browser handle.
        if let Some(task) = self.route_task.take() {
            task.abort();
        }
        for task in self.monitor_tasks.drain(..) {
            task.abort();
        }
        self.handler_task.abort();
    }
}

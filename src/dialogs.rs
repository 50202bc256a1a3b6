//! Native dialog interception
//!
//! A page raising alert/confirm/prompt blocks its own script execution until
//! the dialog is resolved, so dialogs raised by a single action arrive here
//! strictly in the order the page raises them. The watcher resolves each one
//! per its policy before the page can raise the next, and appends every
//! observation to an ordered log the scenario drains afterwards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::{
    DialogType, EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Kind of native dialog raised by page script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Alert,
    Confirm,
    Prompt,
    BeforeUnload,
}

impl From<&DialogType> for DialogKind {
    fn from(t: &DialogType) -> Self {
        match t {
            DialogType::Alert => Self::Alert,
            DialogType::Confirm => Self::Confirm,
            DialogType::Prompt => Self::Prompt,
            DialogType::Beforeunload => Self::BeforeUnload,
        }
    }
}

impl std::fmt::Display for DialogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alert => write!(f, "alert"),
            Self::Confirm => write!(f, "confirm"),
            Self::Prompt => write!(f, "prompt"),
            Self::BeforeUnload => write!(f, "beforeunload"),
        }
    }
}

/// One observed dialog.
#[derive(Debug, Clone)]
pub struct DialogEvent {
    pub kind: DialogKind,
    pub message: String,
}

/// How the watcher resolves each dialog.
///
/// The handler must never leave a dialog unresolved; an unresolved dialog
/// blocks the page forever.
#[derive(Debug, Clone)]
pub struct DialogPolicy {
    /// Accept (OK) rather than dismiss (Cancel)
    pub accept: bool,
    /// Input text supplied when accepting a prompt
    pub prompt_text: Option<String>,
}

impl Default for DialogPolicy {
    fn default() -> Self {
        Self {
            accept: true,
            prompt_text: None,
        }
    }
}

/// Ordered, signal-backed observation log shared between the event task and
/// the scenario draining it.
#[derive(Clone, Default)]
pub struct ObservationLog {
    entries: Arc<Mutex<Vec<DialogEvent>>>,
    notify: Arc<Notify>,
}

impl ObservationLog {
    pub fn push(&self, event: DialogEvent) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(event);
        }
        self.notify.notify_waiters();
    }

    /// Snapshot of the log, in arrival order.
    pub fn snapshot(&self) -> Vec<DialogEvent> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Take all entries out of the log, in arrival order.
    ///
    /// Consuming lets a second expectation in the same scenario start from
    /// a clean log instead of re-counting earlier dialogs.
    pub fn drain(&self) -> Vec<DialogEvent> {
        self.entries
            .lock()
            .map(|mut entries| entries.drain(..).collect())
            .unwrap_or_default()
    }

    /// Event-driven wait for at least `count` entries.
    ///
    /// Returns whatever was observed by the deadline; the caller compares the
    /// log against its expectations. Returning early when the count is
    /// reached avoids the fixed-sleep race a timed wait would carry.
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<DialogEvent> {
        let deadline = Instant::now() + within;

        loop {
            let notified = self.notify.notified();

            let observed = self.snapshot();
            if observed.len() >= count {
                return observed;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                return self.snapshot();
            }
        }
    }
}

/// Session-scoped dialog handler.
///
/// One watcher per session; created before the triggering interaction and
/// dropped with the scenario.
pub struct DialogWatcher {
    log: ObservationLog,
    task: JoinHandle<()>,
}

impl DialogWatcher {
    /// Register the watcher on a page.
    pub async fn install(page: &Page, policy: DialogPolicy) -> crate::Result<Self> {
        let mut events = page.event_listener::<EventJavascriptDialogOpening>().await?;

        let log = ObservationLog::default();
        let task_log = log.clone();
        let page = page.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let observed = DialogEvent {
                    kind: DialogKind::from(&event.r#type),
                    message: event.message.clone(),
                };
                debug!("Dialog ({}): {}", observed.kind, observed.message);

                // Resolve before recording completion so the page can raise
                // the next dialog. Prompt text is only meaningful for
                // prompts; Chrome ignores it for alert/confirm.
                let params = HandleJavaScriptDialogParams {
                    accept: policy.accept,
                    prompt_text: policy.prompt_text.clone(),
                };
                if let Err(e) = page.execute(params).await {
                    warn!("Failed to resolve dialog: {}", e);
                }

                task_log.push(observed);
            }
        });

        Ok(Self { log, task })
    }

    /// Snapshot of the observation log, in arrival order.
    pub fn observed(&self) -> Vec<DialogEvent> {
        self.log.snapshot()
    }

    /// Observed dialog messages, in arrival order.
    pub fn messages(&self) -> Vec<String> {
        self.observed().into_iter().map(|d| d.message).collect()
    }

    /// Event-driven wait for at least `count` observed dialogs.
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<DialogEvent> {
        self.log.wait_for(count, within).await
    }

    /// Take all observed dialogs out of the log.
    pub fn drain(&self) -> Vec<DialogEvent> {
        self.log.drain()
    }

    /// Fixed settling wait, then snapshot.
    ///
    /// Kept for scripts ported from timed-wait harnesses; `wait_for` is the
    /// preferred drain.
    pub async fn settle(&self, duration: Duration) -> Vec<DialogEvent> {
        tokio::time::sleep(duration).await;
        self.observed()
    }
}

impl Drop for DialogWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: DialogKind, message: &str) -> DialogEvent {
        DialogEvent {
            kind,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_log_preserves_arrival_order() {
        let log = ObservationLog::default();
        log.push(event(DialogKind::Prompt, "Enter Server Address or Domain:"));
        log.push(event(
            DialogKind::Confirm,
            "This will apply the following settings",
        ));

        let observed = log.snapshot();
        assert_eq!(observed.len(), 2);
        assert_eq!(observed[0].kind, DialogKind::Prompt);
        assert!(observed[0].message.contains("Enter Server Address"));
        assert_eq!(observed[1].kind, DialogKind::Confirm);
        assert!(observed[1]
            .message
            .contains("This will apply the following settings"));
    }

    #[tokio::test]
    async fn test_wait_for_returns_early_once_count_reached() {
        let log = ObservationLog::default();
        let writer = log.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.push(event(DialogKind::Prompt, "first"));
            writer.push(event(DialogKind::Confirm, "second"));
        });

        let started = Instant::now();
        let observed = log.wait_for(2, Duration::from_secs(5)).await;
        assert_eq!(observed.len(), 2);
        // Event-driven: returns well before the 5s bound.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_drain_resets_log_between_expectations() {
        let log = ObservationLog::default();
        log.push(event(DialogKind::Prompt, "Enter Server Address"));
        log.push(event(
            DialogKind::Confirm,
            "This will apply the following settings",
        ));

        let first = log.wait_for(2, Duration::from_millis(50)).await;
        assert_eq!(first.len(), 2);
        assert_eq!(log.drain().len(), 2);

        // A second expectation only sees dialogs raised after the drain.
        log.push(event(DialogKind::Alert, "Full configuration pushed"));
        let second = log.drain();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, DialogKind::Alert);
        assert!(log.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_is_bounded_when_dialogs_never_arrive() {
        let log = ObservationLog::default();

        let started = Instant::now();
        let observed = log.wait_for(1, Duration::from_millis(50)).await;
        assert!(observed.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_default_policy_accepts() {
        let policy = DialogPolicy::default();
        assert!(policy.accept);
        assert!(policy.prompt_text.is_none());
    }

    #[test]
    fn test_dialog_kind_display() {
        assert_eq!(DialogKind::Prompt.to_string(), "prompt");
        assert_eq!(DialogKind::Confirm.to_string(), "confirm");
        assert_eq!(DialogKind::Alert.to_string(), "alert");
    }
}
